//! Social link extraction from raw text records

use std::collections::BTreeMap;

pub const KEYWORDS_KEY: &str = "keywords";

/// Canonical platform keys used in `ResolutionRecord::social_links`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Twitter,
    Github,
    Discord,
    Telegram,
    Reddit,
    Linkedin,
    Instagram,
    Youtube,
    Lens,
    Farcaster,
    Website,
    Email,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Github => "github",
            Self::Discord => "discord",
            Self::Telegram => "telegram",
            Self::Reddit => "reddit",
            Self::Linkedin => "linkedin",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Lens => "lens",
            Self::Farcaster => "farcaster",
            Self::Website => "website",
            Self::Email => "email",
        }
    }
}

const KEY_ALIASES: &[(&str, Platform)] = &[
    ("com.twitter", Platform::Twitter),
    ("vnd.twitter", Platform::Twitter),
    ("twitter", Platform::Twitter),
    ("com.x", Platform::Twitter),
    ("x", Platform::Twitter),
    ("com.github", Platform::Github),
    ("vnd.github", Platform::Github),
    ("github", Platform::Github),
    ("com.discord", Platform::Discord),
    ("discord", Platform::Discord),
    ("org.telegram", Platform::Telegram),
    ("telegram", Platform::Telegram),
    ("com.reddit", Platform::Reddit),
    ("reddit", Platform::Reddit),
    ("com.linkedin", Platform::Linkedin),
    ("linkedin", Platform::Linkedin),
    ("com.instagram", Platform::Instagram),
    ("instagram", Platform::Instagram),
    ("com.youtube", Platform::Youtube),
    ("youtube", Platform::Youtube),
    ("xyz.lens", Platform::Lens),
    ("lens", Platform::Lens),
    ("xyz.farcaster", Platform::Farcaster),
    ("farcaster", Platform::Farcaster),
    ("url", Platform::Website),
    ("website", Platform::Website),
    ("email", Platform::Email),
];

// Ordered so that longer, more specific fragments match first
const HOST_MARKERS: &[(&str, Platform)] = &[
    ("twitter.com/", Platform::Twitter),
    ("x.com/", Platform::Twitter),
    ("github.com/", Platform::Github),
    ("discord.gg/", Platform::Discord),
    ("discord.com/", Platform::Discord),
    ("t.me/", Platform::Telegram),
    ("reddit.com/user/", Platform::Reddit),
    ("reddit.com/u/", Platform::Reddit),
    ("linkedin.com/in/", Platform::Linkedin),
    ("instagram.com/", Platform::Instagram),
    ("youtube.com/@", Platform::Youtube),
    ("youtube.com/c/", Platform::Youtube),
    ("hey.xyz/u/", Platform::Lens),
    ("lenster.xyz/u/", Platform::Lens),
    ("warpcast.com/", Platform::Farcaster),
];

/// Links and keywords extracted from one batch of text records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocialProfile {
    pub links: BTreeMap<String, String>,
    pub keywords: Vec<String>,
}

/// Map raw text records onto canonical platforms.
///
/// Records are visited in order and the first non-empty value for a platform
/// wins; later duplicates are ignored.
pub fn normalize(records: &[(String, String)]) -> SocialProfile {
    let mut profile = SocialProfile::default();

    for (key, value) in records {
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        if key == KEYWORDS_KEY {
            for keyword in split_keywords(value) {
                if !profile.keywords.contains(&keyword) {
                    profile.keywords.push(keyword);
                }
            }
            continue;
        }

        let Some(platform) = classify(&key, value) else {
            continue;
        };
        let Some(canonical) = canonical_value(platform, value) else {
            continue;
        };
        profile
            .links
            .entry(platform.as_str().to_string())
            .or_insert(canonical);
    }

    profile
}

/// Decide which platform a record belongs to.
///
/// Known keys win, except generic website keys whose value points at a
/// recognizable platform host.
pub fn classify(key: &str, value: &str) -> Option<Platform> {
    let by_key = platform_for_key(key);
    match by_key {
        Some(Platform::Website) | None => platform_for_value(value).or(by_key),
        Some(platform) => Some(platform),
    }
}

pub fn platform_for_key(key: &str) -> Option<Platform> {
    KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, platform)| *platform)
}

pub fn platform_for_value(value: &str) -> Option<Platform> {
    let lower = value.to_lowercase();
    HOST_MARKERS
        .iter()
        .find(|(marker, _)| host_matches(&lower, marker))
        .map(|(_, platform)| *platform)
}

/// Reduce a raw value to its canonical form for the platform
pub fn canonical_value(platform: Platform, value: &str) -> Option<String> {
    let value = value.trim();
    let canonical = match platform {
        Platform::Email => {
            let email = value.strip_prefix("mailto:").unwrap_or(value);
            (email.contains('@') && !email.starts_with('@')).then(|| email.to_string())?
        }
        Platform::Website => {
            if value.contains("://") {
                value.to_string()
            } else {
                format!("https://{value}")
            }
        }
        Platform::Discord if value.contains("discord.gg/") || value.contains("discord.com/") => {
            value.to_string()
        }
        _ => extract_handle(platform, value)?,
    };

    (!canonical.is_empty()).then_some(canonical)
}

// A URL for another platform's host is not a handle for this one
fn extract_handle(platform: Platform, value: &str) -> Option<String> {
    // Byte offsets found in the lower-cased copy must be valid in the source
    let source = if value.is_ascii() {
        value.to_string()
    } else {
        value.to_lowercase()
    };
    let lower = source.to_lowercase();
    let own_host = HOST_MARKERS
        .iter()
        .filter(|(_, owner)| *owner == platform)
        .find_map(|(marker, _)| {
            find_host(&lower, marker).map(|idx| &source[idx + marker.len()..])
        });
    let after_host = match own_host {
        Some(rest) => rest,
        None if platform_for_value(&lower).is_some() => return None,
        None => source.as_str(),
    };

    let handle = after_host
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('@')
        .trim();

    (!handle.is_empty()).then(|| handle.to_string())
}

fn host_matches(lower: &str, marker: &str) -> bool {
    find_host(lower, marker).is_some()
}

// A marker only counts at a host boundary so `x.com/` does not match `dropbox.com/`
fn find_host(lower: &str, marker: &str) -> Option<usize> {
    lower.match_indices(marker).map(|(idx, _)| idx).find(|&idx| {
        idx == 0 || matches!(lower.as_bytes()[idx - 1], b'/' | b'.' | b'@')
    })
}

fn split_keywords(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
