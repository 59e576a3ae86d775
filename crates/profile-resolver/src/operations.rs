//! Resolution orchestration
//!
//! Given a name or address: serve from the cache when possible, otherwise
//! resolve through the gateway, run the three enrichment fetchers together,
//! merge, write the cache in both directions and publish to the state store.
//! Every state mutation is gated on the query handle, so a superseded query
//! finishes silently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ResolutionCache;
use crate::config::ResolverConfig;
use crate::enrichment::{avatar_patch, biography_patch, social_patch, Enricher};
use crate::error::{ResolutionError, Result};
use crate::gateway::NamingGateway;
use crate::http::{HttpEnrichmentProvider, HttpNamingProvider};
use crate::state::{QueryHandle, ResolutionStateStore};
use crate::types::{Address, Name, RecordPatch, ResolutionRecord, ResolutionRequest};

/// Caller-side retry for retryable gateway failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const NONE: Self = Self {
        retries: 0,
        backoff: Duration::ZERO,
    };

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt)
    }
}

#[derive(Clone)]
pub struct ResolutionOperations {
    gateway: Arc<NamingGateway>,
    enricher: Enricher,
    cache: Arc<ResolutionCache>,
    store: Arc<ResolutionStateStore>,
    retry: RetryPolicy,
    refresh_stale: bool,
    refreshing: Arc<Mutex<HashSet<String>>>,
}

impl ResolutionOperations {
    pub fn new(
        gateway: Arc<NamingGateway>,
        enricher: Enricher,
        cache: Arc<ResolutionCache>,
        store: Arc<ResolutionStateStore>,
    ) -> Self {
        Self {
            gateway,
            enricher,
            cache,
            store,
            retry: RetryPolicy::NONE,
            refresh_stale: true,
            refreshing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Wire HTTP backends, cache and a fresh state store from configuration
    pub fn from_config(config: &ResolverConfig) -> Self {
        let naming = Arc::new(HttpNamingProvider::with_timeout(
            &config.naming_service_url,
            config.http_timeout,
        ));
        let enrichment = Arc::new(HttpEnrichmentProvider::with_timeout(
            &config.avatar_service_url,
            &config.records_service_url,
            config.http_timeout,
        ));

        let cache = Arc::new(ResolutionCache::from_config(config));
        cache.init();

        Self::new(
            Arc::new(NamingGateway::new(naming, config.resolve_timeout)),
            Enricher::new(enrichment),
            cache,
            Arc::new(ResolutionStateStore::new()),
        )
        .with_retry(RetryPolicy {
            retries: config.resolve_retries,
            backoff: config.resolve_backoff,
        })
        .with_refresh_stale(config.refresh_stale)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_refresh_stale(mut self, refresh_stale: bool) -> Self {
        self.refresh_stale = refresh_stale;
        self
    }

    /// Sibling operations for another consuming context: same gateway,
    /// fetchers and cache, its own state store.
    pub fn for_context(&self) -> Self {
        Self {
            store: Arc::new(ResolutionStateStore::new()),
            ..self.clone()
        }
    }

    pub fn store(&self) -> &Arc<ResolutionStateStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Resolve either kind of input; addresses are recognized by prefix
    pub async fn resolve(&self, input: &str) {
        match ResolutionRequest::parse_any(input) {
            Ok(request) => self.run(request).await,
            Err(error) => self.reject(input, error),
        }
    }

    pub async fn resolve_name(&self, input: &str) {
        match Name::parse(input) {
            Ok(name) => self.run(ResolutionRequest::Name(name)).await,
            Err(error) => self.reject(input, error),
        }
    }

    pub async fn resolve_address(&self, input: &str) {
        match Address::parse(input) {
            Ok(address) => self.run(ResolutionRequest::Address(address)).await,
            Err(error) => self.reject(input, error),
        }
    }

    pub fn spawn_resolve(&self, input: impl Into<String>) -> JoinHandle<()> {
        let ops = self.clone();
        let input = input.into();
        tokio::spawn(async move { ops.resolve(&input).await })
    }

    pub fn spawn_resolve_name(&self, input: impl Into<String>) -> JoinHandle<()> {
        let ops = self.clone();
        let input = input.into();
        tokio::spawn(async move { ops.resolve_name(&input).await })
    }

    pub fn spawn_resolve_address(&self, input: impl Into<String>) -> JoinHandle<()> {
        let ops = self.clone();
        let input = input.into();
        tokio::spawn(async move { ops.resolve_address(&input).await })
    }

    // Malformed input still supersedes whatever was in flight
    fn reject(&self, input: &str, error: ResolutionError) {
        debug!(input = %input, error = %error, "Rejected input");
        let handle = self.store.begin(input.trim());
        self.store.fail(&handle, error, ResolutionRecord::new());
    }

    async fn run(&self, request: ResolutionRequest) {
        let key = request.lookup_key();

        if let Some(cached) = self.cache.get(&key).await {
            let handle = self.store.begin(&key);
            self.store.resolve(&handle, cached.as_ref().clone());
            if self.refresh_stale && self.cache.is_stale(&cached) {
                self.spawn_refresh(cached);
            }
            return;
        }

        let handle = self.store.begin(&key);

        let (name, address) = match self.resolve_pair(&request, &handle).await {
            Ok(pair) => pair,
            Err(error) => {
                if self.store.fail(&handle, error.clone(), request.bare_record()) {
                    warn!(query = %key, kind = error.kind(), error = %error, "Resolution failed");
                }
                return;
            }
        };

        if handle.is_cancelled() {
            debug!(query = %key, "Superseded after gateway, dropping result");
            return;
        }

        self.store.update_state(
            &handle,
            RecordPatch {
                address: Some(address.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
        );

        let record = self.enrich(&name, &address, &handle).await;

        if handle.is_cancelled() {
            debug!(query = %key, "Superseded during enrichment, dropping result");
            return;
        }

        // A cancel landing during the write below does not undo it
        let stored = self.cache.write_through(&key, &record).await;
        if self.store.resolve(&handle, stored.as_ref().clone()) {
            info!(name = %name, address = %address, "Resolved profile");
        }
    }

    /// Run the gateway step, retrying retryable failures per policy
    async fn resolve_pair(
        &self,
        request: &ResolutionRequest,
        handle: &QueryHandle,
    ) -> Result<(Name, Address)> {
        let mut attempt = 0;
        loop {
            let result = match request {
                ResolutionRequest::Name(name) => self
                    .gateway
                    .resolve_name_to_address(name)
                    .await
                    .map(|address| (name.clone(), address)),
                ResolutionRequest::Address(address) => self
                    .gateway
                    .resolve_address_to_name(address)
                    .await
                    .map(|name| (name, address.clone())),
            };

            match result {
                Err(error)
                    if error.is_retryable()
                        && attempt < self.retry.retries
                        && !handle.is_cancelled() =>
                {
                    let delay = self.retry.delay(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max = self.retry.retries,
                        error = %error,
                        "Retrying resolution in {:?}",
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = handle.cancelled() => return Err(error),
                    }
                }
                other => return other,
            }
        }
    }

    /// Fetch all enrichment concurrently, publishing each piece as it lands
    async fn enrich(
        &self,
        name: &Name,
        address: &Address,
        handle: &QueryHandle,
    ) -> ResolutionRecord {
        let store = &self.store;
        let (avatar, biography, social) = tokio::join!(
            async {
                let patch = avatar_patch(self.enricher.avatar(name).await);
                store.update_state(handle, patch.clone());
                patch
            },
            async {
                let patch = biography_patch(self.enricher.biography(name).await);
                store.update_state(handle, patch.clone());
                patch
            },
            async {
                let patch = social_patch(self.enricher.social(name).await);
                store.update_state(handle, patch.clone());
                patch
            },
        );

        let mut record = ResolutionRecord::new();
        record.address = Some(address.to_string());
        record.name = Some(name.to_string());
        record.apply(avatar);
        record.apply(biography);
        record.apply(social);
        record.fetched_at = Utc::now();
        record
    }

    /// Re-fetch enrichment for a stale entry and write it into the cache only.
    /// At most one refresh per name is in flight.
    fn spawn_refresh(&self, stale: Arc<ResolutionRecord>) {
        let Some(name) = stale.name.as_deref().and_then(|n| Name::parse(n).ok()) else {
            return;
        };
        let Some(claim) = RefreshClaim::acquire(&self.refreshing, name.as_str()) else {
            debug!(name = %name, "Refresh already in flight");
            return;
        };
        let enricher = self.enricher.clone();
        let cache = self.cache.clone();

        tokio::spawn(async move {
            let _claim = claim;
            debug!(name = %name, "Refreshing stale profile");
            let mut fresh = enricher.enrich(&name).await;
            fresh.address.clone_from(&stale.address);
            cache.refresh(name.as_str(), &fresh).await;
        });
    }
}

/// Marks a name as being refreshed until dropped
struct RefreshClaim {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RefreshClaim {
    fn acquire(in_flight: &Arc<Mutex<HashSet<String>>>, key: &str) -> Option<Self> {
        let claimed = lock_set(in_flight).insert(key.to_string());
        claimed.then(|| Self {
            key: key.to_string(),
            in_flight: in_flight.clone(),
        })
    }
}

impl Drop for RefreshClaim {
    fn drop(&mut self) {
        lock_set(&self.in_flight).remove(&self.key);
    }
}

fn lock_set(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}
