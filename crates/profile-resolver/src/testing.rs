//! In-memory providers for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::enrichment::EnrichmentProvider;
use crate::error::ProviderError;
use crate::gateway::NamingProvider;

pub(crate) const ALICE_ADDRESS: &str = "0xAbCd000000000000000000000000000000001234";
pub(crate) const BOB_ADDRESS: &str = "0x000000000000000000000000000000000000b0b0";
pub(crate) const CAROL_ADDRESS: &str = "0xCa11000000000000000000000000000000005678";

#[derive(Default)]
pub(crate) struct MockNaming {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    flaky: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl MockNaming {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_pair(mut self, name: &str, address: &str) -> Self {
        self.forward
            .insert(name.to_lowercase(), address.to_string());
        self.reverse
            .insert(address.to_lowercase(), name.to_string());
        self
    }

    /// A reverse record with no matching forward entry
    pub(crate) fn with_reverse(mut self, address: &str, name: &str) -> Self {
        self.reverse
            .insert(address.to_lowercase(), name.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_lowercase(), delay);
        self
    }

    pub(crate) fn with_failure(mut self, key: &str) -> Self {
        self.failures.insert(key.to_lowercase());
        self
    }

    /// Fail the first `times` calls for `key`, then answer normally
    pub(crate) fn with_flaky(mut self, key: &str, times: usize) -> Self {
        self.flaky
            .get_mut()
            .unwrap()
            .insert(key.to_lowercase(), times);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(
        &self,
        key: &str,
        table: &HashMap<String, String>,
    ) -> Result<Option<String>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = key.to_lowercase();

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.contains(&key) {
            return Err(ProviderError::Api(format!("mock failure for {key}")));
        }
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ProviderError::Api(format!("transient failure for {key}")));
                }
            }
        }
        Ok(table.get(&key).cloned())
    }
}

#[async_trait]
impl NamingProvider for MockNaming {
    async fn resolve_name(&self, name: &str) -> Result<Option<String>, ProviderError> {
        self.answer(name, &self.forward).await
    }

    async fn lookup_address(&self, address: &str) -> Result<Option<String>, ProviderError> {
        self.answer(address, &self.reverse).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Piece {
    Avatar,
    Biography,
    TextRecords,
}

#[derive(Default)]
pub(crate) struct MockEnrichment {
    avatars: HashMap<String, String>,
    biographies: HashMap<String, String>,
    texts: HashMap<String, Vec<(String, String)>>,
    failing: HashSet<Piece>,
    piece_delays: HashMap<Piece, Duration>,
    calls: AtomicUsize,
}

impl MockEnrichment {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_avatar(mut self, name: &str, url: &str) -> Self {
        self.avatars.insert(name.to_string(), url.to_string());
        self
    }

    pub(crate) fn with_biography(mut self, name: &str, bio: &str) -> Self {
        self.biographies.insert(name.to_string(), bio.to_string());
        self
    }

    pub(crate) fn with_text(mut self, name: &str, key: &str, value: &str) -> Self {
        self.texts
            .entry(name.to_string())
            .or_default()
            .push((key.to_string(), value.to_string()));
        self
    }

    pub(crate) fn failing(mut self, piece: Piece) -> Self {
        self.failing.insert(piece);
        self
    }

    pub(crate) fn with_piece_delay(mut self, piece: Piece, delay: Duration) -> Self {
        self.piece_delays.insert(piece, delay);
        self
    }

    /// Total fetches across all three pieces
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, piece: Piece) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.piece_delays.get(&piece) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&piece) {
            return Err(ProviderError::Api(format!("{piece:?} backend unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl EnrichmentProvider for MockEnrichment {
    async fn fetch_avatar(&self, name: &str) -> Result<Option<String>, ProviderError> {
        self.enter(Piece::Avatar).await?;
        Ok(self.avatars.get(name).cloned())
    }

    async fn fetch_biography(&self, name: &str) -> Result<Option<String>, ProviderError> {
        self.enter(Piece::Biography).await?;
        Ok(self.biographies.get(name).cloned())
    }

    async fn fetch_text_records(&self, name: &str) -> Result<Vec<(String, String)>, ProviderError> {
        self.enter(Piece::TextRecords).await?;
        Ok(self.texts.get(name).cloned().unwrap_or_default())
    }
}
