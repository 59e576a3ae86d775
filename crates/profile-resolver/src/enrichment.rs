//! Enrichment fetchers
//!
//! Avatar, biography and text-record lookups for a resolved name. Each fetch
//! degrades to "no data" on failure so one broken backend never blocks the
//! others.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::social::{self, SocialProfile};
use crate::types::{Name, RecordPatch, ResolutionRecord};

/// Backends serving profile data for a resolved name
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn fetch_avatar(&self, name: &str) -> Result<Option<String>, ProviderError>;

    async fn fetch_biography(&self, name: &str) -> Result<Option<String>, ProviderError>;

    /// Raw text records as `(key, value)` pairs, in backend order
    async fn fetch_text_records(&self, name: &str) -> Result<Vec<(String, String)>, ProviderError>;
}

#[derive(Clone)]
pub struct Enricher {
    provider: Arc<dyn EnrichmentProvider>,
}

impl Enricher {
    pub fn new(provider: Arc<dyn EnrichmentProvider>) -> Self {
        Self { provider }
    }

    pub async fn avatar(&self, name: &Name) -> Option<String> {
        match self.provider.fetch_avatar(name.as_str()).await {
            Ok(avatar) => avatar.filter(|a| !a.trim().is_empty()),
            Err(e) => {
                warn!(name = %name, error = %e, "Avatar fetch failed");
                None
            }
        }
    }

    pub async fn biography(&self, name: &Name) -> Option<String> {
        match self.provider.fetch_biography(name.as_str()).await {
            Ok(bio) => bio
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty()),
            Err(e) => {
                warn!(name = %name, error = %e, "Biography fetch failed");
                None
            }
        }
    }

    pub async fn social(&self, name: &Name) -> SocialProfile {
        match self.provider.fetch_text_records(name.as_str()).await {
            Ok(records) => {
                let profile = social::normalize(&records);
                debug!(
                    name = %name,
                    records = records.len(),
                    links = profile.links.len(),
                    "Normalized text records"
                );
                profile
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Text record fetch failed");
                SocialProfile::default()
            }
        }
    }

    /// Run all three fetchers concurrently and merge whatever succeeded
    pub async fn enrich(&self, name: &Name) -> ResolutionRecord {
        let (avatar, biography, social) =
            tokio::join!(self.avatar(name), self.biography(name), self.social(name));

        let mut record = ResolutionRecord::new();
        record.name = Some(name.to_string());
        record.apply(avatar_patch(avatar));
        record.apply(biography_patch(biography));
        record.apply(social_patch(social));
        record.fetched_at = Utc::now();
        record
    }
}

pub(crate) fn avatar_patch(avatar: Option<String>) -> RecordPatch {
    RecordPatch {
        avatar_url: avatar,
        ..Default::default()
    }
}

pub(crate) fn biography_patch(biography: Option<String>) -> RecordPatch {
    RecordPatch {
        biography,
        ..Default::default()
    }
}

pub(crate) fn social_patch(social: SocialProfile) -> RecordPatch {
    RecordPatch {
        social_links: (!social.links.is_empty()).then_some(social.links),
        keywords: (!social.keywords.is_empty()).then_some(social.keywords),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockEnrichment, Piece};

    fn alice() -> Name {
        Name::parse("alice.eth").unwrap()
    }

    fn mock() -> MockEnrichment {
        MockEnrichment::new()
            .with_avatar("alice.eth", "https://img.example/alice.png")
            .with_biography("alice.eth", "  builder  ")
            .with_text("alice.eth", "com.twitter", "@alice")
            .with_text("alice.eth", "keywords", "rust,dao")
    }

    #[tokio::test]
    async fn test_enrich_merges_all_pieces() {
        let enricher = Enricher::new(Arc::new(mock()));
        let record = enricher.enrich(&alice()).await;
        assert_eq!(record.name.as_deref(), Some("alice.eth"));
        assert_eq!(
            record.avatar_url.as_deref(),
            Some("https://img.example/alice.png")
        );
        assert_eq!(record.biography.as_deref(), Some("builder"));
        assert_eq!(record.social_links["twitter"], "alice");
        assert_eq!(record.keywords, vec!["rust", "dao"]);
    }

    #[tokio::test]
    async fn test_failed_biography_does_not_block_others() {
        let enricher = Enricher::new(Arc::new(mock().failing(Piece::Biography)));
        let record = enricher.enrich(&alice()).await;
        assert!(record.biography.is_none());
        assert!(record.avatar_url.is_some());
        assert_eq!(record.social_links["twitter"], "alice");
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_record() {
        let enricher = Enricher::new(Arc::new(
            mock()
                .failing(Piece::Avatar)
                .failing(Piece::Biography)
                .failing(Piece::TextRecords),
        ));
        let record = enricher.enrich(&alice()).await;
        assert!(record.avatar_url.is_none());
        assert!(record.biography.is_none());
        assert!(record.social_links.is_empty());
        assert!(record.keywords.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetchers_run_concurrently() {
        let slow = std::time::Duration::from_secs(1);
        let enricher = Enricher::new(Arc::new(
            mock()
                .with_piece_delay(Piece::Avatar, slow)
                .with_piece_delay(Piece::Biography, slow)
                .with_piece_delay(Piece::TextRecords, slow),
        ));
        let started = tokio::time::Instant::now();
        enricher.enrich(&alice()).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(1500));
    }

    #[test]
    fn test_empty_social_patch_carries_nothing() {
        assert!(social_patch(SocialProfile::default()).is_empty());
    }
}
