//! Decentralized Profile Resolver
//!
//! Resolves human-readable names to account addresses and back, enriches the
//! result with avatar, biography and social links from independent backends,
//! and caches the combined record under both identifiers so a later lookup
//! from either direction needs no network round-trip.
//!
//! Results are published through a [`ResolutionStateStore`]; issuing a new
//! query supersedes the previous one, whose late completion is discarded.

mod cache;
mod config;
mod enrichment;
mod error;
mod gateway;
mod http;
mod operations;
mod social;
mod state;
mod types;

#[cfg(test)]
mod testing;

pub use cache::{CacheStats, ResolutionCache};
pub use config::ResolverConfig;
pub use enrichment::{Enricher, EnrichmentProvider};
pub use error::{ProviderError, ResolutionError, Result};
pub use gateway::{NamingGateway, NamingProvider};
pub use http::{HttpEnrichmentProvider, HttpNamingProvider};
pub use operations::{ResolutionOperations, RetryPolicy};
pub use social::{Platform, SocialProfile};
pub use state::{QueryHandle, ResolutionPhase, ResolutionState, ResolutionStateStore};
pub use types::{
    shorten_address, Address, Name, RecordPatch, ResolutionRecord, ResolutionRequest,
};
