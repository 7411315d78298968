//! Process configuration, read once at startup from environment variables.
//!
//! Mandatory credentials (mailbox, Zoom, Cal.com, LLM key) fail fast with
//! `ConfigError::MissingEnvVar`. Everything else has a default matching the
//! restriction policy the assistant ships with.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::scheduling::RestrictionPolicy;

/// Full agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mail: MailConfig,
    pub zoom: ZoomConfig,
    pub calcom: CalComConfig,
    pub llm: LlmConfig,
    pub policy: RestrictionPolicy,
    /// Sleep between orchestration cycles.
    pub poll_interval: Duration,
    /// Mailbox fetch attempts per cycle before degrading to an empty batch.
    pub fetch_max_attempts: u32,
    /// Sleep between fetch attempts.
    pub fetch_retry_delay: Duration,
    /// Minimum intent-classification confidence to treat a message as a
    /// meeting request. Deliberately configurable, not hard-coded.
    pub intent_confidence_threshold: f32,
    /// Language used when detection finds nothing to mirror.
    pub fallback_language: String,
    /// Extra no-reply/service sender patterns beyond the built-in list.
    pub extra_service_senders: Vec<String>,
}

/// Mailbox transport configuration (IMAP in, SMTP out).
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub address: String,
    pub password: SecretString,
    /// Display name used in the From header and email signatures.
    pub display_name: String,
}

/// Zoom-style conferencing credentials (client-credentials grant).
#[derive(Debug, Clone)]
pub struct ZoomConfig {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub base_url: String,
    pub token_url: String,
}

/// Cal.com-style scheduling service configuration.
#[derive(Debug, Clone)]
pub struct CalComConfig {
    pub api_key: SecretString,
    pub event_type_id: i64,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let address = required("EMAIL_ADDRESS")?;
        let imap_host = required("IMAP_SERVER")?;

        let mail = MailConfig {
            smtp_host: std::env::var("SMTP_SERVER")
                .unwrap_or_else(|_| imap_host.replace("imap", "smtp")),
            smtp_port: parse_or("SMTP_PORT", 465)?,
            imap_port: parse_or("IMAP_PORT", 993)?,
            imap_host,
            password: SecretString::from(required("EMAIL_PASSWORD")?),
            display_name: std::env::var("USER_NAME").unwrap_or_else(|_| address.clone()),
            address,
        };

        let zoom = ZoomConfig {
            account_id: required("ZOOM_ACCOUNT_ID")?,
            client_id: required("ZOOM_CLIENT_ID")?,
            client_secret: SecretString::from(required("ZOOM_CLIENT_SECRET")?),
            base_url: std::env::var("ZOOM_BASE_URL")
                .unwrap_or_else(|_| "https://api.zoom.us/v2".to_string()),
            token_url: std::env::var("ZOOM_TOKEN_URL")
                .unwrap_or_else(|_| "https://zoom.us/oauth/token".to_string()),
        };

        let calcom = CalComConfig {
            api_key: SecretString::from(required("CALCOM_API_KEY")?),
            event_type_id: parse_required("CALCOM_EVENT_TYPE_ID")?,
            base_url: std::env::var("CALCOM_BASE_URL")
                .unwrap_or_else(|_| "https://api.cal.com/v1".to_string()),
        };

        let llm = llm_from_env()?;
        let policy = policy_from_env()?;

        Ok(Self {
            mail,
            zoom,
            calcom,
            llm,
            policy,
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 30)?),
            fetch_max_attempts: parse_or("FETCH_MAX_ATTEMPTS", 3)?,
            fetch_retry_delay: Duration::from_secs(parse_or("FETCH_RETRY_DELAY_SECS", 5)?),
            intent_confidence_threshold: parse_or("INTENT_CONFIDENCE_THRESHOLD", 0.6)?,
            fallback_language: std::env::var("EMAIL_LANGUAGE")
                .unwrap_or_else(|_| "English".to_string()),
            extra_service_senders: list_var("SERVICE_SENDERS"),
        })
    }
}

fn llm_from_env() -> Result<LlmConfig, ConfigError> {
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        return Ok(LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: SecretString::from(key),
            model: std::env::var("MEETING_ASSIST_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
        });
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        return Ok(LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: SecretString::from(key),
            model: std::env::var("MEETING_ASSIST_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        });
    }
    Err(ConfigError::MissingEnvVar(
        "ANTHROPIC_API_KEY or OPENAI_API_KEY".to_string(),
    ))
}

fn policy_from_env() -> Result<RestrictionPolicy, ConfigError> {
    let defaults = RestrictionPolicy::default();

    let timezone: Tz = match std::env::var("CALCOM_USER_TIMEZONE") {
        Ok(name) => name.parse().map_err(|_| ConfigError::InvalidValue {
            key: "CALCOM_USER_TIMEZONE".to_string(),
            message: format!("unknown timezone: {name}"),
        })?,
        Err(_) => defaults.timezone,
    };

    Ok(RestrictionPolicy {
        timezone,
        day_start: time_or("BUSINESS_DAY_START", defaults.day_start)?,
        day_end: time_or("BUSINESS_DAY_END", defaults.day_end)?,
        blackout_start: time_or("BLACKOUT_START", defaults.blackout_start)?,
        blackout_end: time_or("BLACKOUT_END", defaults.blackout_end)?,
        blocked_weekdays: match std::env::var("BLOCKED_WEEKDAYS") {
            Ok(raw) => parse_weekdays(&raw)?,
            Err(_) => defaults.blocked_weekdays,
        },
        blocked_dates: parse_dates(&list_var("HOLIDAY_DATES"))?,
    })
}

// ── Parse helpers ───────────────────────────────────────────────────

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_required<T: std::str::FromStr>(key: &str) -> Result<T, ConfigError> {
    let raw = required(key)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse {raw:?}"),
    })
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn time_or(key: &str, default: NaiveTime) -> Result<NaiveTime, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_time(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected HH:MM, got {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn list_var(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse "HH:MM" into a NaiveTime.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Parse a comma-separated weekday list ("sat,sun").
pub fn parse_weekdays(raw: &str) -> Result<Vec<Weekday>, ConfigError> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Weekday>().map_err(|_| ConfigError::InvalidValue {
                key: "BLOCKED_WEEKDAYS".to_string(),
                message: format!("unknown weekday: {s}"),
            })
        })
        .collect()
}

/// Parse ISO dates ("2026-01-01") into a holiday set.
pub fn parse_dates(raw: &[String]) -> Result<HashSet<NaiveDate>, ConfigError> {
    raw.iter()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ConfigError::InvalidValue {
                key: "HOLIDAY_DATES".to_string(),
                message: format!("expected YYYY-MM-DD, got {s:?}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_valid() {
        assert_eq!(parse_time("09:00"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_time(" 13:30 "), NaiveTime::from_hms_opt(13, 30, 0));
    }

    #[test]
    fn parse_time_invalid() {
        assert!(parse_time("9am").is_none());
        assert!(parse_time("25:00").is_none());
    }

    #[test]
    fn parse_weekdays_mixed_case() {
        let days = parse_weekdays("Sat, sun").unwrap();
        assert_eq!(days, vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn parse_weekdays_rejects_unknown() {
        assert!(parse_weekdays("caturday").is_err());
    }

    #[test]
    fn parse_weekdays_empty_is_empty() {
        assert!(parse_weekdays("").unwrap().is_empty());
    }

    #[test]
    fn parse_dates_iso() {
        let raw = vec!["2026-01-01".to_string(), "2026-05-05".to_string()];
        let dates = parse_dates(&raw).unwrap();
        assert!(dates.contains(&NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        assert_eq!(dates.len(), 2);
    }

    #[test]
    fn parse_dates_rejects_garbage() {
        let raw = vec!["Jan 1".to_string()];
        assert!(parse_dates(&raw).is_err());
    }
}
