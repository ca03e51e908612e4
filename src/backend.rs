//! Dispatch backend HTTP adapter.
//!
//! One client serves every collaborator contract of the pipeline. Failures
//! are classified here, from status code and error body, into
//! [`DistanceError`] variants.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, DistanceError, GENERIC_FAILURE};
use crate::model::{CacheCheckResponse, Destination, DistanceResult, Origin, OriginId};
use crate::stats::StatsReport;
use crate::traits::{DistanceCache, LockJanitor, PermissionSource, RoutingProvider, StatsSink};

pub const PERMISSIONS_PATH: &str = "/api/permissions";
pub const CHECK_CACHE_PATH: &str = "/api/distances/check-cache";
pub const PROVIDER_BATCH_PATH: &str = "/api/distances/provider-batch";
pub const STATS_PATH: &str = "/api/distances/stats";
pub const CLEANUP_EXPIRED_LOCKS_PATH: &str = "/api/holds/cleanup-expired";

/// Error code the backend uses when the provider credential is rejected.
pub const CODE_TOKEN_INVALID: &str = "PROVIDER_TOKEN_INVALID";
/// Error code the backend uses when the provider is throttling.
pub const CODE_RATE_LIMITED: &str = "PROVIDER_RATE_LIMITED";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            auth_token: None,
            timeout_secs: 15,
        }
    }
}

impl BackendConfig {
    /// Defaults overlaid with `DISPATCH_API_URL`, `DISPATCH_API_TOKEN` and
    /// `DISPATCH_API_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup("DISPATCH_API_URL") {
            config.base_url = url;
        }
        if let Some(token) = lookup("DISPATCH_API_TOKEN").filter(|token| !token.is_empty()) {
            config.auth_token = Some(token);
        }
        if let Some(raw) = lookup("DISPATCH_API_TIMEOUT_SECS") {
            config.timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "DISPATCH_API_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    config: BackendConfig,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DistanceError> {
        let request = self.authorize(self.client.get(self.url(path)));
        Self::send(request, path).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, DistanceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.client.post(self.url(path)).json(body));
        Self::send(request, path).await
    }

    /// Sends `request` and expects only a success status back.
    async fn acknowledge(
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<(), DistanceError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.unwrap_or_default();
        let err = classify_failure(status, &body);
        debug!(path, %status, error = %err, "backend call not acknowledged");
        Err(err)
    }

    async fn send<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<T, DistanceError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let err = classify_failure(status, &body);
            warn!(path, %status, error = %err, "backend request failed");
            return Err(err);
        }
        debug!(path, %status, "backend request succeeded");
        Ok(response.json::<T>().await?)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Maps a non-success response to the failure taxonomy.
pub fn classify_failure(status: StatusCode, body: &[u8]) -> DistanceError {
    let body: ErrorBody = serde_json::from_slice(body).unwrap_or_default();

    match body.code.as_deref() {
        Some(CODE_TOKEN_INVALID) => return DistanceError::TokenInvalid,
        Some(CODE_RATE_LIMITED) => return DistanceError::RateLimited,
        _ => {}
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => DistanceError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DistanceError::Unauthorized,
        _ => DistanceError::generic(body.message.unwrap_or_else(|| GENERIC_FAILURE.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct PermissionsResponse {
    #[serde(default)]
    permissions: Vec<String>,
}

#[derive(Serialize)]
struct CacheCheckRequest<'a> {
    destination: &'a str,
}

#[derive(Serialize)]
struct ProviderBatchRequest<'a> {
    destination: &'a str,
    origins: &'a [Origin],
}

impl PermissionSource for BackendClient {
    async fn permissions(&self) -> Result<HashSet<String>, DistanceError> {
        let body: PermissionsResponse = self.get_json(PERMISSIONS_PATH).await?;
        Ok(body.permissions.into_iter().collect())
    }
}

impl DistanceCache for BackendClient {
    async fn check(&self, destination: &str) -> Result<CacheCheckResponse, DistanceError> {
        self.post_json(CHECK_CACHE_PATH, &CacheCheckRequest { destination })
            .await
    }
}

impl RoutingProvider for BackendClient {
    async fn distances(
        &self,
        destination: &Destination,
        origins: &[Origin],
    ) -> Result<HashMap<OriginId, DistanceResult>, DistanceError> {
        let request = ProviderBatchRequest {
            destination: &destination.address,
            origins,
        };
        self.post_json(PROVIDER_BATCH_PATH, &request).await
    }
}

impl StatsSink for BackendClient {
    async fn log_stats(&self, report: &StatsReport) -> Result<(), DistanceError> {
        let request = self.authorize(self.client.post(self.url(STATS_PATH)).json(report));
        Self::acknowledge(request, STATS_PATH).await
    }
}

impl LockJanitor for BackendClient {
    async fn cleanup_expired(&self) -> Result<(), DistanceError> {
        let request = self.authorize(self.client.post(self.url(CLEANUP_EXPIRED_LOCKS_PATH)));
        Self::acknowledge(request, CLEANUP_EXPIRED_LOCKS_PATH).await
    }
}
