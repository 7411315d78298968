//! Conferencing service client (Zoom-style).
//!
//! Sessions are created with a bearer credential obtained through the
//! client-credentials grant. The token lives in an owned cache with an
//! explicit expiry and is refreshed 60 seconds before it lapses — a
//! check-then-refresh method, not an ambient singleton.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::ZoomConfig;
use crate::error::CollaboratorError;
use crate::scheduling::TimeWindow;

/// A bookable virtual meeting room with a join link.
#[derive(Debug, Clone)]
pub struct ConferenceSession {
    pub join_url: String,
    pub session_id: String,
}

/// External conferencing service.
#[async_trait]
pub trait ConferencingService: Send + Sync {
    async fn create_session(
        &self,
        window: &TimeWindow,
    ) -> Result<ConferenceSession, CollaboratorError>;
}

// ── Token cache ─────────────────────────────────────────────────────

/// Refresh this long before the declared expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

impl CachedToken {
    fn from_exchange(token: String, expires_in_secs: u64) -> Self {
        let lifetime = Duration::from_secs(expires_in_secs).saturating_sub(EXPIRY_MARGIN);
        Self {
            token: SecretString::from(token),
            expires_at: Instant::now() + lifetime,
        }
    }

    fn fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Meeting ids arrive as a number or a string depending on API version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MeetingId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for MeetingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MeetingResponse {
    id: MeetingId,
    join_url: String,
}

// ── Client ──────────────────────────────────────────────────────────

pub struct ZoomClient {
    http: reqwest::Client,
    config: ZoomConfig,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl ZoomClient {
    pub fn new(config: ZoomConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: tokio::sync::Mutex::new(None),
        }
    }

    /// Return the cached bearer token, refreshing it when stale.
    async fn bearer_token(&self) -> Result<String, CollaboratorError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.fresh()
        {
            return Ok(cached.token.expose_secret().to_string());
        }

        tracing::debug!("Refreshing conferencing access token");
        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.config.account_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CollaboratorError::TokenExchange {
                service: "zoom".to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CollaboratorError::TokenExchange {
                service: "zoom".to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    service: "zoom".to_string(),
                    reason: format!("token response: {e}"),
                })?;

        let cached = CachedToken::from_exchange(token.access_token, token.expires_in);
        let bearer = cached.token.expose_secret().to_string();
        *guard = Some(cached);
        Ok(bearer)
    }
}

#[async_trait]
impl ConferencingService for ZoomClient {
    async fn create_session(
        &self,
        window: &TimeWindow,
    ) -> Result<ConferenceSession, CollaboratorError> {
        let bearer = self.bearer_token().await?;

        let minutes = window.duration().num_minutes().max(1);
        let body = serde_json::json!({
            "topic": "Meeting",
            "type": 2,
            "start_time": window.start().with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "duration": minutes,
            "timezone": window.start().timezone().name(),
        });

        let response = self
            .http
            .post(format!("{}/users/me/meetings", self.config.base_url))
            .bearer_auth(bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Http {
                service: "zoom".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api {
                service: "zoom".to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let meeting: MeetingResponse =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    service: "zoom".to_string(),
                    reason: format!("meeting response: {e}"),
                })?;

        tracing::info!(session_id = %meeting.id, "Conference session created");
        Ok(ConferenceSession {
            join_url: meeting.join_url,
            session_id: meeting.id.to_string(),
        })
    }
}
