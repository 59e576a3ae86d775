//! Identifiers and records produced by resolution

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ResolutionError, Result};

pub const NAME_SEPARATOR: char = '.';
pub const ADDRESS_PREFIX: &str = "0x";
pub const ADDRESS_LEN: usize = 42;

/// A validated, lower-cased human-readable name (e.g. `alice.eth`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ResolutionError::InvalidFormat("empty name".to_string()));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(ResolutionError::InvalidFormat(format!(
                "name contains whitespace: {normalized}"
            )));
        }
        if !normalized.contains(NAME_SEPARATOR) {
            return Err(ResolutionError::InvalidFormat(format!(
                "name has no '{NAME_SEPARATOR}' separator: {normalized}"
            )));
        }
        if normalized.split(NAME_SEPARATOR).any(str::is_empty) {
            return Err(ResolutionError::InvalidFormat(format!(
                "name has an empty label: {normalized}"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated account address: `0x` followed by 40 hex digits.
///
/// The original casing is kept for display; [`Address::key`] gives the
/// lower-cased form used for lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.len() != ADDRESS_LEN {
            return Err(ResolutionError::InvalidFormat(format!(
                "address must be {ADDRESS_LEN} characters, got {}",
                trimmed.len()
            )));
        }
        let Some(digits) = trimmed
            .strip_prefix(ADDRESS_PREFIX)
            .or_else(|| trimmed.strip_prefix("0X"))
        else {
            return Err(ResolutionError::InvalidFormat(format!(
                "address must start with {ADDRESS_PREFIX}: {trimmed}"
            )));
        };
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ResolutionError::InvalidFormat(format!(
                "address contains non-hex characters: {trimmed}"
            )));
        }
        Ok(Self(format!("{ADDRESS_PREFIX}{digits}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The reference a caller asks about; the other side is the goal of resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionRequest {
    Name(Name),
    Address(Address),
}

impl ResolutionRequest {
    /// Classify raw input: anything with the address prefix is treated as an address
    pub fn parse_any(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.starts_with(ADDRESS_PREFIX) || trimmed.starts_with("0X") {
            Address::parse(trimmed).map(Self::Address)
        } else {
            Name::parse(trimmed).map(Self::Name)
        }
    }

    /// Normalized cache key for this request
    pub fn lookup_key(&self) -> String {
        match self {
            Self::Name(name) => name.as_str().to_string(),
            Self::Address(address) => address.key(),
        }
    }

    /// A record holding only the literal input, used as fallback on failure
    pub fn bare_record(&self) -> ResolutionRecord {
        let mut record = ResolutionRecord::new();
        match self {
            Self::Name(name) => record.name = Some(name.to_string()),
            Self::Address(address) => record.address = Some(address.to_string()),
        }
        record
    }
}

/// Combined result of resolution and enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRecord {
    pub address: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub biography: Option<String>,
    pub social_links: BTreeMap<String, String>,
    pub keywords: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl ResolutionRecord {
    pub fn new() -> Self {
        Self {
            address: None,
            name: None,
            avatar_url: None,
            biography: None,
            social_links: BTreeMap::new(),
            keywords: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// True once both sides of the name/address pair are known
    pub fn is_resolved(&self) -> bool {
        is_present(&self.address) && is_present(&self.name)
    }

    /// True when neither record names a different address or name than the
    /// other. Records that disagree describe different accounts and must not
    /// be merged.
    pub fn same_identity(&self, other: &ResolutionRecord) -> bool {
        agrees(&self.address, &other.address) && agrees(&self.name, &other.name)
    }

    /// Merge `other` into `self`, non-empty wins.
    ///
    /// A field already holding a non-empty value is never replaced, and an
    /// empty incoming value never clears anything. Merging the same data in
    /// either order gives the same populated fields. Only meaningful for
    /// records where [`Self::same_identity`] holds.
    pub fn merge(&mut self, other: &ResolutionRecord) {
        fill(&mut self.address, &other.address);
        fill(&mut self.name, &other.name);
        fill(&mut self.avatar_url, &other.avatar_url);
        fill(&mut self.biography, &other.biography);

        for (platform, value) in &other.social_links {
            if value.is_empty() {
                continue;
            }
            let slot = self.social_links.entry(platform.clone()).or_default();
            if slot.is_empty() {
                slot.clone_from(value);
            }
        }

        for keyword in &other.keywords {
            if !keyword.is_empty() && !self.keywords.contains(keyword) {
                self.keywords.push(keyword.clone());
            }
        }

        self.fetched_at = self.fetched_at.max(other.fetched_at);
    }

    /// Take newer enrichment from `other`: its non-empty values replace the
    /// current ones, empty values never clear anything. Identity fields are
    /// only filled, never rewritten.
    pub fn refresh(&mut self, other: &ResolutionRecord) {
        fill(&mut self.address, &other.address);
        fill(&mut self.name, &other.name);
        replace(&mut self.avatar_url, &other.avatar_url);
        replace(&mut self.biography, &other.biography);

        for (platform, value) in &other.social_links {
            if !value.is_empty() {
                self.social_links.insert(platform.clone(), value.clone());
            }
        }

        let keywords: Vec<String> = other
            .keywords
            .iter()
            .filter(|k| !k.is_empty())
            .cloned()
            .collect();
        if !keywords.is_empty() {
            self.keywords = keywords;
        }

        self.fetched_at = self.fetched_at.max(other.fetched_at);
    }

    /// Apply a partial update; fields carried by the patch replace current values
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(address) = patch.address {
            self.address = Some(address);
        }
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(avatar_url) = patch.avatar_url {
            self.avatar_url = Some(avatar_url);
        }
        if let Some(biography) = patch.biography {
            self.biography = Some(biography);
        }
        if let Some(social_links) = patch.social_links {
            self.social_links = social_links;
        }
        if let Some(keywords) = patch.keywords {
            self.keywords = keywords;
        }
    }
}

impl Default for ResolutionRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A partial record, applied shallowly as enrichment pieces arrive
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub address: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub biography: Option<String>,
    pub social_links: Option<BTreeMap<String, String>>,
    pub keywords: Option<Vec<String>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Shortened form for display when no name is known, e.g. `0xabcd…1234`
pub fn shorten_address(address: &str) -> String {
    if address.len() <= 10 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}…{}", &address[..6], &address[address.len() - 4..])
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn replace(slot: &mut Option<String>, incoming: &Option<String>) {
    if is_present(incoming) {
        slot.clone_from(incoming);
    }
}

fn agrees(a: &Option<String>, b: &Option<String>) -> bool {
    match (a.as_deref(), b.as_deref()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a.eq_ignore_ascii_case(b),
        _ => true,
    }
}

fn fill(slot: &mut Option<String>, incoming: &Option<String>) {
    if !is_present(slot) && is_present(incoming) {
        slot.clone_from(incoming);
    }
}
