//! HTTP implementation of the remote backend

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::{Entity, EntityRef, FieldMap, OfflineAction};
use crate::util::{compact_text, is_http_url, normalize_text_option};

use super::{RemoteBackend, RemoteError, RemoteResult};

/// Backend client over the wishlist HTTP API.
///
/// Request timeouts are bounded and classified as transient; the queue
/// has no way to abort an in-flight call, so the timeout is the only
/// thing keeping a drain from hanging on a dead connection.
pub struct HttpBackend {
    endpoint: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(settings: &SyncSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("sync endpoint is not configured".to_string()))?;
        let endpoint = normalize_endpoint(endpoint)?;

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            endpoint,
            auth_token: settings.auth_token.clone(),
            client,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl RemoteBackend for HttpBackend {
    async fn fetch_entity(&self, entity: &EntityRef) -> RemoteResult<Option<Entity>> {
        let url = format!(
            "{}/v1/{}/{}",
            self.endpoint,
            entity.kind.path_segment(),
            entity.id
        );

        let response = self
            .authorize(self.client.get(&url))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let fields = response
            .json::<FieldMap>()
            .await
            .map_err(|error| RemoteError::Transient(format!("malformed entity body: {error}")))?;

        Ok(Some(Entity::new(entity.clone(), fields)))
    }

    async fn submit_mutation(&self, action: &OfflineAction) -> RemoteResult<()> {
        let url = format!("{}/v1/sync/actions", self.endpoint);

        let response = self
            .authorize(self.client.post(&url))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(action)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// Normalize and validate a configured endpoint URL
pub(crate) fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    // Connect failures and timeouts are exactly the "user walked out of
    // coverage" cases the queue exists for.
    RemoteError::Transient(error.to_string())
}

/// Map an HTTP status to the backend error taxonomy
fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        RemoteError::Transient(message)
    } else {
        RemoteError::Rejected(message)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
