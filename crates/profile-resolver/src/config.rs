use std::env;
use std::time::Duration;

const DEFAULT_NAMING_SERVICE_URL: &str = "http://localhost:3010";
const DEFAULT_AVATAR_SERVICE_URL: &str = "http://localhost:3011";
const DEFAULT_RECORDS_SERVICE_URL: &str = "http://localhost:3012";

/// Resolver configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub naming_service_url: String,
    pub avatar_service_url: String,
    pub records_service_url: String,
    /// Budget for a single gateway call before it fails with `Timeout`
    pub resolve_timeout: Duration,
    /// Extra attempts for retryable gateway failures
    pub resolve_retries: u32,
    pub resolve_backoff: Duration,
    pub cache_max_capacity: u64,
    pub cache_ttl: Duration,
    /// Age after which a cache hit counts as stale
    pub freshness_window: Duration,
    pub refresh_stale: bool,
    pub http_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            naming_service_url: DEFAULT_NAMING_SERVICE_URL.to_string(),
            avatar_service_url: DEFAULT_AVATAR_SERVICE_URL.to_string(),
            records_service_url: DEFAULT_RECORDS_SERVICE_URL.to_string(),
            resolve_timeout: Duration::from_millis(5000),
            resolve_retries: 0,
            resolve_backoff: Duration::from_millis(250),
            cache_max_capacity: 10_000,
            cache_ttl: Duration::from_secs(3600),
            freshness_window: Duration::from_secs(300),
            refresh_stale: true,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ResolverConfig {
    /// Parse configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            naming_service_url: env::var("NAMING_SERVICE_URL")
                .unwrap_or(defaults.naming_service_url),
            avatar_service_url: env::var("AVATAR_SERVICE_URL")
                .unwrap_or(defaults.avatar_service_url),
            records_service_url: env::var("RECORDS_SERVICE_URL")
                .unwrap_or(defaults.records_service_url),
            resolve_timeout: env_parse("RESOLVE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.resolve_timeout),
            resolve_retries: env_parse("RESOLVE_RETRIES").unwrap_or(defaults.resolve_retries),
            resolve_backoff: env_parse("RESOLVE_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.resolve_backoff),
            cache_max_capacity: env_parse("CACHE_MAX_CAPACITY")
                .unwrap_or(defaults.cache_max_capacity),
            cache_ttl: env_parse("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            freshness_window: env_parse("FRESHNESS_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.freshness_window),
            refresh_stale: env::var("REFRESH_STALE")
                .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.refresh_stale),
            http_timeout: env_parse("HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_five_seconds() {
        let config = ResolverConfig::default();
        assert_eq!(config.resolve_timeout, Duration::from_millis(5000));
        assert_eq!(config.resolve_retries, 0);
        assert!(config.refresh_stale);
    }

    #[test]
    fn test_env_parse_ignores_garbage() {
        env::set_var("PROFILE_RESOLVER_TEST_NUMBER", "not-a-number");
        assert_eq!(env_parse::<u64>("PROFILE_RESOLVER_TEST_NUMBER"), None);
        env::set_var("PROFILE_RESOLVER_TEST_NUMBER", " 42 ");
        assert_eq!(env_parse::<u64>("PROFILE_RESOLVER_TEST_NUMBER"), Some(42));
        env::remove_var("PROFILE_RESOLVER_TEST_NUMBER");
    }
}
