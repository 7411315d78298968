//! Language capability — the two narrow LLM-backed collaborators the
//! orchestrator consumes: `classify_intent` and `generate_body`.
//!
//! Both are prompt → JSON/text → parse, so the orchestrator's control flow
//! stays deterministic and testable with stub implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::CollaboratorError;
use crate::llm::LlmProvider;
use crate::scheduling::TimeWindow;

/// Assumed meeting length when the request names a start but no end.
const DEFAULT_MEETING_MINUTES: i64 = 60;

/// What intent classification extracted from a message.
#[derive(Debug, Clone)]
pub struct IntentAssessment {
    pub is_meeting_request: bool,
    /// Model confidence in [0, 1]. The orchestrator compares it against
    /// the configured threshold.
    pub confidence: f32,
    /// The requested slot, when one could be extracted.
    pub requested_window: Option<TimeWindow>,
    /// Language the message is written in, mirrored in replies.
    pub language: String,
}

/// Natural-language capability boundary.
#[async_trait]
pub trait Language: Send + Sync {
    /// Decide whether a message is a meeting request and extract the
    /// requested time window.
    async fn classify_intent(
        &self,
        subject: &str,
        body: &str,
    ) -> Result<IntentAssessment, CollaboratorError>;

    /// Render a resolved template skeleton as polite email prose in the
    /// target language.
    async fn generate_body(
        &self,
        skeleton: &str,
        facts: &serde_json::Value,
        language: &str,
    ) -> Result<String, CollaboratorError>;
}

// ── LLM-backed implementation ───────────────────────────────────────

const CLASSIFY_SYSTEM: &str = "\
You are a meeting assistant. Decide whether an email is a request for a \
meeting, a call, or an online discussion, and extract the requested time. \
Reply with JSON only, no prose, matching exactly:
{
  \"is_meeting_request\": true|false,
  \"confidence\": 0.0-1.0,
  \"start\": \"RFC 3339 timestamp or null\",
  \"end\": \"RFC 3339 timestamp or null\",
  \"language\": \"name of the language the email is written in\"
}
If the email names a start but no end, leave end null. If no concrete time \
is requested, leave both null.";

const GENERATE_SYSTEM: &str = "\
You are a meeting assistant writing an email on behalf of your user. \
Rewrite the skeleton below as a polite, professional email body in the \
requested language. Keep every date, time and link exactly as given. Do \
not invent details, do not add placeholders like [name], and reply with \
the email body only.";

/// JSON shape returned by the classification prompt.
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    is_meeting_request: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

/// LLM-backed [`Language`] implementation.
pub struct LanguageCapability {
    llm: Arc<dyn LlmProvider>,
    /// Timezone extracted windows are normalized into (the policy zone).
    timezone: Tz,
    /// Language used when detection yields nothing.
    fallback_language: String,
}

impl LanguageCapability {
    pub fn new(llm: Arc<dyn LlmProvider>, timezone: Tz, fallback_language: String) -> Self {
        Self {
            llm,
            timezone,
            fallback_language,
        }
    }

    fn parse_window(&self, response: &ClassifyResponse) -> Option<TimeWindow> {
        let start = parse_timestamp(response.start.as_deref()?)?.with_timezone(&self.timezone);
        let end = match response.end.as_deref().and_then(parse_timestamp) {
            Some(end) => end.with_timezone(&self.timezone),
            None => start + chrono::Duration::minutes(DEFAULT_MEETING_MINUTES),
        };
        TimeWindow::new(start, end).ok()
    }
}

#[async_trait]
impl Language for LanguageCapability {
    async fn classify_intent(
        &self,
        subject: &str,
        body: &str,
    ) -> Result<IntentAssessment, CollaboratorError> {
        let prompt = format!("Subject: {subject}\n\n{body}");
        let raw = self.llm.complete(CLASSIFY_SYSTEM, &prompt).await?;

        let response: ClassifyResponse =
            serde_json::from_str(extract_json(&raw)).map_err(|e| {
                CollaboratorError::InvalidResponse {
                    service: self.llm.model_name().to_string(),
                    reason: format!("classification is not valid JSON: {e}"),
                }
            })?;

        let requested_window = self.parse_window(&response);
        let language = response
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.fallback_language.clone());

        Ok(IntentAssessment {
            is_meeting_request: response.is_meeting_request,
            confidence: response.confidence.clamp(0.0, 1.0),
            requested_window,
            language,
        })
    }

    async fn generate_body(
        &self,
        skeleton: &str,
        facts: &serde_json::Value,
        language: &str,
    ) -> Result<String, CollaboratorError> {
        let prompt = format!(
            "Language: {language}\n\nFacts (authoritative, do not alter):\n{facts}\n\nSkeleton:\n{skeleton}"
        );
        self.llm.complete(GENERATE_SYSTEM, &prompt).await
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok()
}

/// Strip Markdown code fences models sometimes wrap JSON in.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end_matches('`').trim()
}
