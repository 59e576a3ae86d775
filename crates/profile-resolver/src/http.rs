//! HTTP transports for the naming and enrichment backends

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::enrichment::EnrichmentProvider;
use crate::error::ProviderError;
use crate::gateway::NamingProvider;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const BIOGRAPHY_RECORD: &str = "description";

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveNameResponse {
    pub(crate) address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReverseResponse {
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvatarResponse {
    pub(crate) url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextValueResponse {
    pub(crate) value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextRecordsResponse {
    #[serde(default)]
    pub(crate) records: Vec<TextRecordEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextRecordEntry {
    pub(crate) key: String,
    pub(crate) value: Option<String>,
}

/// Naming backend speaking `GET /resolve/{name}` and `GET /reverse/{address}`
pub struct HttpNamingProvider {
    client: Client,
    base_url: String,
}

impl HttpNamingProvider {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn resolve_url(&self, name: &str) -> String {
        format!("{}/resolve/{}", self.base_url, urlencoding::encode(name))
    }

    fn reverse_url(&self, address: &str) -> String {
        format!("{}/reverse/{}", self.base_url, urlencoding::encode(address))
    }
}

#[async_trait]
impl NamingProvider for HttpNamingProvider {
    async fn resolve_name(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let data: Option<ResolveNameResponse> =
            get_json(&self.client, &self.resolve_url(name)).await?;
        Ok(data.and_then(|d| d.address))
    }

    async fn lookup_address(&self, address: &str) -> Result<Option<String>, ProviderError> {
        let data: Option<ReverseResponse> =
            get_json(&self.client, &self.reverse_url(address)).await?;
        Ok(data.and_then(|d| d.name))
    }
}

/// Avatar and text-record backends
pub struct HttpEnrichmentProvider {
    client: Client,
    avatar_url: String,
    records_url: String,
}

impl HttpEnrichmentProvider {
    pub fn new(avatar_url: &str, records_url: &str) -> Self {
        Self::with_timeout(avatar_url, records_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(avatar_url: &str, records_url: &str, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            avatar_url: avatar_url.trim_end_matches('/').to_string(),
            records_url: records_url.trim_end_matches('/').to_string(),
        }
    }

    fn avatar_endpoint(&self, name: &str) -> String {
        format!("{}/avatar/{}", self.avatar_url, urlencoding::encode(name))
    }

    fn text_endpoint(&self, name: &str, key: &str) -> String {
        format!(
            "{}/{}/text/{}",
            self.records_url,
            urlencoding::encode(name),
            urlencoding::encode(key)
        )
    }

    fn texts_endpoint(&self, name: &str) -> String {
        format!("{}/{}/texts", self.records_url, urlencoding::encode(name))
    }
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichmentProvider {
    async fn fetch_avatar(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let data: Option<AvatarResponse> =
            get_json(&self.client, &self.avatar_endpoint(name)).await?;
        Ok(data.and_then(|d| d.url))
    }

    async fn fetch_biography(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let data: Option<TextValueResponse> =
            get_json(&self.client, &self.text_endpoint(name, BIOGRAPHY_RECORD)).await?;
        Ok(data.and_then(|d| d.value))
    }

    async fn fetch_text_records(&self, name: &str) -> Result<Vec<(String, String)>, ProviderError> {
        let data: Option<TextRecordsResponse> =
            get_json(&self.client, &self.texts_endpoint(name)).await?;
        Ok(data.map(flatten_records).unwrap_or_default())
    }
}

fn flatten_records(response: TextRecordsResponse) -> Vec<(String, String)> {
    response
        .records
        .into_iter()
        .filter_map(|r| r.value.map(|v| (r.key, v)))
        .collect()
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

/// GET a JSON body; 404 is an empty answer, other failures are errors
async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
) -> Result<Option<T>, ProviderError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        debug!(url = %url, "Backend has no record");
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ProviderError::Api(format!("{url} returned status {status}")));
    }

    let body = response.bytes().await?;
    Ok(Some(serde_json::from_slice(&body)?))
}
