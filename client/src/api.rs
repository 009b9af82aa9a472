//! Remote API client.
//!
//! The sync pass only needs to know which class a failure belongs to, so
//! every HTTP status is folded into an [`ErrorClass`] at this boundary.

use async_trait::async_trait;
use brewsync_engine::{EntityKind, RemoteEntity, StaticDataset, StaticVersions, Version};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the sync pass reacts to a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// No response, timeout, server error. Retried on the next pass
    Network,
    /// The server refused the payload. Never retried
    Validation,
    /// Credentials rejected. Aborts the pass
    Authorization,
    /// The entity does not exist remotely
    NotFound,
    /// The remote copy moved past the local base version
    Conflict,
}

/// Remote API errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {message}")]
    Conflict {
        remote_version: Option<Version>,
        message: String,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid API configuration: {0}")]
    InvalidConfiguration(String),
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Network(_) => ErrorClass::Network,
            // The server answered, so a mutation may already have applied.
            ApiError::Validation(_)
            | ApiError::InvalidResponse(_)
            | ApiError::InvalidConfiguration(_) => ErrorClass::Validation,
            ApiError::Authorization(_) => ErrorClass::Authorization,
            ApiError::NotFound(_) => ErrorClass::NotFound,
            ApiError::Conflict { .. } => ErrorClass::Conflict,
        }
    }

    /// Map a non-success HTTP response.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = parse_api_error(status, body);
        match status.as_u16() {
            400 | 422 => ApiError::Validation(message),
            401 | 403 => ApiError::Authorization(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict {
                remote_version: serde_json::from_str::<ConflictBody>(body)
                    .ok()
                    .and_then(|b| b.version),
                message,
            },
            408 | 429 => ApiError::Network(message),
            s if s >= 500 => ApiError::Network(message),
            _ => ApiError::Validation(message),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A full reference dataset as served by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticDataPayload {
    pub version: String,
    #[serde(alias = "items")]
    pub data: Vec<serde_json::Value>,
}

/// The backend as seen by the sync layer.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_entity(
        &self,
        kind: EntityKind,
        payload: &serde_json::Value,
    ) -> ApiResult<RemoteEntity>;

    async fn update_entity(
        &self,
        kind: EntityKind,
        id: &str,
        payload: &serde_json::Value,
        base_version: Option<Version>,
    ) -> ApiResult<RemoteEntity>;

    async fn delete_entity(
        &self,
        kind: EntityKind,
        id: &str,
        base_version: Option<Version>,
    ) -> ApiResult<()>;

    async fn list_entities(&self, kind: EntityKind) -> ApiResult<Vec<RemoteEntity>>;

    async fn fetch_static_versions(&self) -> ApiResult<StaticVersions>;

    async fn fetch_static_data(&self, dataset: StaticDataset) -> ApiResult<StaticDataPayload>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationBody<'a> {
    data: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_version: Option<Version>,
}

#[derive(Debug, Deserialize)]
struct ConflictBody {
    version: Option<Version>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// [`RemoteApi`] over HTTP + JSON.
#[derive(Clone)]
pub struct HttpApi {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApi")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpApi {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfiguration(e.to_string()))?;
        Ok(Self {
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    fn collection_path(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Recipe => "recipes",
            EntityKind::BrewSession => "brew-sessions",
        }
    }

    fn dataset_path(dataset: StaticDataset) -> &'static str {
        match dataset {
            StaticDataset::Ingredients => "ingredients",
            StaticDataset::BeerStyles => "beer-styles",
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn create_entity(
        &self,
        kind: EntityKind,
        payload: &serde_json::Value,
    ) -> ApiResult<RemoteEntity> {
        let body = MutationBody {
            data: payload,
            base_version: None,
        };
        let builder = self
            .request(reqwest::Method::POST, Self::collection_path(kind))
            .json(&body);
        Ok(self.send(builder).await?.json().await?)
    }

    async fn update_entity(
        &self,
        kind: EntityKind,
        id: &str,
        payload: &serde_json::Value,
        base_version: Option<Version>,
    ) -> ApiResult<RemoteEntity> {
        let path = format!("{}/{}", Self::collection_path(kind), id);
        let body = MutationBody {
            data: payload,
            base_version,
        };
        let builder = self.request(reqwest::Method::PUT, &path).json(&body);
        Ok(self.send(builder).await?.json().await?)
    }

    async fn delete_entity(
        &self,
        kind: EntityKind,
        id: &str,
        base_version: Option<Version>,
    ) -> ApiResult<()> {
        let path = format!("{}/{}", Self::collection_path(kind), id);
        let mut builder = self.request(reqwest::Method::DELETE, &path);
        if let Some(version) = base_version {
            builder = builder.query(&[("baseVersion", version)]);
        }
        self.send(builder).await?;
        Ok(())
    }

    async fn list_entities(&self, kind: EntityKind) -> ApiResult<Vec<RemoteEntity>> {
        let builder = self.request(reqwest::Method::GET, Self::collection_path(kind));
        Ok(self.send(builder).await?.json().await?)
    }

    async fn fetch_static_versions(&self) -> ApiResult<StaticVersions> {
        let builder = self.request(reqwest::Method::GET, "static-data/versions");
        Ok(self.send(builder).await?.json().await?)
    }

    async fn fetch_static_data(&self, dataset: StaticDataset) -> ApiResult<StaticDataPayload> {
        let builder = self.request(reqwest::Method::GET, Self::dataset_path(dataset));
        Ok(self.send(builder).await?.json().await?)
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> ApiResult<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ApiError::InvalidConfiguration(
            "base URL must not be empty".to_string(),
        ));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(ApiError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}
