//! Update sources: one `poll` is one long-poll request

use crate::config::EndpointConfig;
use crate::error::PollError;
use crate::update::Update;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// Producer side of the session
///
/// `offset` is one above the highest update id seen so far; the source returns updates
/// with ids at or above it, in ascending order.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn poll(&self, offset: i64) -> Result<Vec<Update>, PollError>;
}

/// Response envelope of the `getUpdates` method
#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

/// `getUpdates` long-poll client for the Telegram Bot API
pub struct HttpUpdateSource {
    client: Client,
    endpoint: EndpointConfig,
    token: String,
}

impl HttpUpdateSource {
    pub fn new(endpoint: EndpointConfig, token: impl Into<String>) -> Result<Self, PollError> {
        let client = Client::builder()
            .timeout(endpoint.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: token.into(),
        })
    }

    pub fn url(&self, offset: i64) -> String {
        format!(
            "{}/bot{}/getUpdates?timeout={}&limit={}&offset={}",
            self.endpoint.base_url.trim_end_matches('/'),
            self.token,
            self.endpoint.poll_timeout_secs,
            self.endpoint.limit,
            offset
        )
    }
}

#[async_trait]
impl UpdateSource for HttpUpdateSource {
    async fn poll(&self, offset: i64) -> Result<Vec<Update>, PollError> {
        let response = self.client.get(self.url(offset)).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let parsed: GetUpdatesResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(PollError::api_status(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("request failed"),
                ));
            }
            Err(e) => return Err(PollError::Decode(e)),
        };

        if !status.is_success() || !parsed.ok {
            return Err(PollError::Api {
                status: Some(status.as_u16()),
                description: parsed
                    .description
                    .unwrap_or_else(|| "getUpdates returned ok=false".to_string()),
            });
        }

        debug!(
            offset,
            count = parsed.result.len(),
            "[HttpUpdateSource] getUpdates returned"
        );
        Ok(parsed.result)
    }
}

impl fmt::Debug for HttpUpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpUpdateSource")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish()
    }
}
