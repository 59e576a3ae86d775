//! Naming provider gateway
//!
//! Thin transport wrapper that turns a [`NamingProvider`] into validated
//! name ↔ address lookups raced against a fixed timeout. No caching and no
//! retries happen here; both belong to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ProviderError, ResolutionError, Result};
use crate::types::{Address, Name};

/// Backend capable of forward and reverse name resolution.
///
/// `Ok(None)` is an explicit empty mapping and becomes `NotFound`.
#[async_trait]
pub trait NamingProvider: Send + Sync {
    async fn resolve_name(&self, name: &str) -> std::result::Result<Option<String>, ProviderError>;

    async fn lookup_address(
        &self,
        address: &str,
    ) -> std::result::Result<Option<String>, ProviderError>;
}

pub struct NamingGateway {
    provider: Arc<dyn NamingProvider>,
    timeout: Duration,
}

impl NamingGateway {
    pub fn new(provider: Arc<dyn NamingProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve a name to the address it points at
    pub async fn resolve_name_to_address(&self, name: &Name) -> Result<Address> {
        let resolved = self.race(self.provider.resolve_name(name.as_str())).await?;

        match non_blank(resolved) {
            Some(raw) => {
                debug!(name = %name, address = %raw, "Resolved name");
                Address::parse(&raw).map_err(|_| {
                    ResolutionError::Provider(format!("provider returned malformed address {raw}"))
                })
            }
            None => Err(ResolutionError::NotFound(name.to_string())),
        }
    }

    /// Reverse-resolve an address to its primary name
    pub async fn resolve_address_to_name(&self, address: &Address) -> Result<Name> {
        let resolved = self
            .race(self.provider.lookup_address(address.as_str()))
            .await?;

        match non_blank(resolved) {
            Some(raw) => {
                debug!(address = %address, name = %raw, "Reverse-resolved address");
                Name::parse(&raw).map_err(|_| {
                    ResolutionError::Provider(format!("provider returned malformed name {raw}"))
                })
            }
            None => Err(ResolutionError::NotFound(address.to_string())),
        }
    }

    async fn race<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ResolutionError::Timeout(self.timeout)),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
