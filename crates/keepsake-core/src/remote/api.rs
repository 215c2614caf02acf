//! HTTP/WebSocket client for the managed record API.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::{Error, Result};
use crate::models::{ChangeEvent, EntityKind, OwnerId, RemoteRecord};
use crate::util::{compact_text, is_http_url};

use super::{FeedScope, RecordStore};

const ENV_API_URL: &str = "KEEPSAKE_API_URL";
const ENV_API_TOKEN: &str = "KEEPSAKE_API_TOKEN";

const HTTP_TIMEOUT_SECS: u64 = 10;
const FEED_CHANNEL_CAPACITY: usize = 64;

/// Record API endpoint configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Bearer token; absent means signed out.
    pub auth_token: Option<String>,
}

impl ApiConfig {
    /// Load the API configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no API URL is set.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<ApiConfig>> {
    let Some(base_url) = crate::util::normalize_text_option(lookup(ENV_API_URL)) else {
        return Ok(None);
    };

    if !is_http_url(&base_url) {
        return Err(Error::InvalidInput(format!(
            "{ENV_API_URL} must start with http:// or https://"
        )));
    }

    Ok(Some(ApiConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        auth_token: crate::util::normalize_text_option(lookup(ENV_API_TOKEN)),
    }))
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    owner_id: String,
}

/// [`RecordStore`] backed by the managed REST API plus its WebSocket change
/// feed.
pub struct HttpRecordStore {
    config: ApiConfig,
    http: reqwest::Client,
}

impl HttpRecordStore {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| Error::Transport(format!("failed to build HTTP client: {error}")))?;

        Ok(Self { config, http })
    }

    fn table_url(&self, entity: EntityKind) -> String {
        format!("{}/v1/{}", self.config.base_url, entity.table())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let token = self
            .config
            .auth_token
            .as_ref()
            .ok_or(Error::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    /// WebSocket endpoint for a feed scope, derived from the API base URL.
    fn feed_url(&self, scope: &FeedScope) -> String {
        let base = self
            .config
            .base_url
            .replacen("http://", "ws://", 1)
            .replacen("https://", "wss://", 1);

        match scope {
            FeedScope::Owned { entity, owner } => format!(
                "{base}/v1/live?table={}&scope=owned&owner_id={}",
                entity.table(),
                owner.as_str()
            ),
            FeedScope::Shared { entity } => {
                format!("{base}/v1/live?table={}&scope=shared", entity.table())
            }
        }
    }

    async fn decode_record(
        entity: EntityKind,
        response: reqwest::Response,
    ) -> Result<RemoteRecord> {
        let payload: serde_json::Value = response.json().await?;
        RemoteRecord::from_json(entity, payload)
    }
}

/// Fail on non-success statuses, carrying a compacted response body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::NotAuthenticated);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Transport(format!(
        "API returned HTTP {}: {}",
        status.as_u16(),
        compact_text(&body)
    )))
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn current_identity(&self) -> Result<Option<OwnerId>> {
        let Some(token) = self.config.auth_token.as_ref() else {
            return Ok(None);
        };

        let response = self
            .http
            .get(format!("{}/v1/identity", self.config.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }

        let identity: IdentityResponse = check_status(response).await?.json().await?;
        Ok(Some(OwnerId::from(identity.owner_id)))
    }

    async fn upsert(&self, record: RemoteRecord) -> Result<RemoteRecord> {
        let entity = record.entity();
        let payload = match &record {
            RemoteRecord::Item(item) => serde_json::to_value(item)?,
            RemoteRecord::Collection(collection) => serde_json::to_value(collection)?,
        };

        let request = self.authorize(self.http.post(self.table_url(entity)))?;
        let response = check_status(request.json(&payload).send().await?).await?;
        Self::decode_record(entity, response).await
    }

    async fn changed_since(
        &self,
        entity: EntityKind,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteRecord>> {
        let mut request = self
            .authorize(self.http.get(self.table_url(entity)))?
            .query(&[("owner_id", owner.as_str())]);
        if let Some(since) = since {
            request = request.query(&[("updated_after", since.to_rfc3339())]);
        }

        let response = check_status(request.send().await?).await?;
        let payloads: Vec<serde_json::Value> = response.json().await?;

        // A single malformed row must not wedge incremental pulls forever.
        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match RemoteRecord::from_json(entity, payload) {
                Ok(record) => records.push(record),
                Err(error) => {
                    tracing::warn!("Skipping undecodable {entity} record: {error}");
                }
            }
        }
        Ok(records)
    }

    async fn delete(&self, entity: EntityKind, id: &str) -> Result<()> {
        let request = self
            .authorize(self.http.delete(format!("{}/{id}", self.table_url(entity))))?;
        let response = request.send().await?;

        // Delete-of-absent is success.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    async fn subscribe(&self, scope: FeedScope) -> Result<mpsc::Receiver<ChangeEvent>> {
        let mut request = self
            .feed_url(&scope)
            .into_client_request()
            .map_err(|error| Error::Transport(format!("invalid feed URL: {error}")))?;

        if let Some(token) = self.config.auth_token.as_ref() {
            let value = format!("Bearer {token}")
                .parse()
                .map_err(|_| Error::InvalidInput("auth token is not header-safe".to_string()))?;
            request
                .headers_mut()
                .insert(reqwest::header::AUTHORIZATION, value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|error| Error::Transport(format!("feed connect failed: {error}")))?;

        let (sender, receiver) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stream = stream;
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ChangeEvent>(&text) {
                            Ok(event) => {
                                if sender.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(error) => {
                                tracing::warn!("Skipping undecodable change event: {error}");
                            }
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            // Dropping the sender closes the channel; the listener treats
            // that as a disconnect.
        });

        Ok(receiver)
    }
}
