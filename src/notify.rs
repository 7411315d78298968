//! Notification composer — outcome templates, placeholder substitution,
//! language-mirrored prose.
//!
//! Substitution fails loudly: a missing fact or a leftover `[token]` turns
//! the compose into an error instead of sending malformed content. Prose
//! rendering is delegated to the language capability; the composer
//! re-checks its output for placeholder tokens before letting it out.

use std::sync::LazyLock;
use std::sync::Arc;

use regex::Regex;

use crate::error::{CompositionError, Error};
use crate::llm::Language;
use crate::mail::InboundMessage;
use crate::scheduling::{BookingRecord, TimeWindow, UnavailableReason};

/// Terminal artifact of one orchestration pass.
#[derive(Debug, Clone)]
pub struct OutboundNotification {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

const CONFIRM_TEMPLATE: &str = "\
Dear [recipient],

Your meeting is confirmed.

Time: [slot]
Join link: [join_url]

Looking forward to speaking with you.

Best regards,
[assistant]";

const DECLINE_TEMPLATE: &str = "\
Dear [recipient],

Thank you for reaching out. Unfortunately the requested time ([slot]) is \
not available: [reason].

Would one of these alternatives work instead?

[alternatives]

Apologies for the inconvenience, and please let me know which time suits \
you best.

Best regards,
[assistant]";

const FAILURE_TEMPLATE: &str = "\
Dear [recipient],

Thank you for your message. Something went wrong on our side while \
scheduling your meeting, so it has not been booked yet. Please accept our \
apologies; we will follow up as soon as possible.

Best regards,
[assistant]";

/// Composes one outbound notification per terminal outcome.
pub struct Composer {
    language: Arc<dyn Language>,
    /// Name signed under every email.
    assistant_name: String,
}

impl Composer {
    pub fn new(language: Arc<dyn Language>, assistant_name: String) -> Self {
        Self {
            language,
            assistant_name,
        }
    }

    /// Confirmation for a booked meeting. Carries the exact slot and join
    /// link.
    pub async fn confirm(
        &self,
        msg: &InboundMessage,
        booking: &BookingRecord,
        lang: &str,
    ) -> Result<OutboundNotification, Error> {
        let facts = vec![
            ("recipient", recipient_name(msg)),
            ("slot", booking.slot.to_string()),
            ("join_url", booking.conference_link.clone()),
            ("assistant", self.assistant_name.clone()),
        ];
        self.render(msg, CONFIRM_TEMPLATE, &facts, lang).await
    }

    /// Polite decline with up to three alternative slots.
    pub async fn decline(
        &self,
        msg: &InboundMessage,
        requested: &TimeWindow,
        reason: UnavailableReason,
        alternatives: &[TimeWindow],
        lang: &str,
    ) -> Result<OutboundNotification, Error> {
        let listed = if alternatives.is_empty() {
            "(no alternative slots were found in the coming weeks)".to_string()
        } else {
            alternatives
                .iter()
                .enumerate()
                .map(|(i, w)| format!("{}. {w}", i + 1))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let facts = vec![
            ("recipient", recipient_name(msg)),
            ("slot", requested.to_string()),
            ("reason", reason.describe().to_string()),
            ("alternatives", listed),
            ("assistant", self.assistant_name.clone()),
        ];
        self.render(msg, DECLINE_TEMPLATE, &facts, lang).await
    }

    /// Best-effort apology when a collaborator failed mid-flow. Falls back
    /// to the plain skeleton if prose generation itself fails.
    pub async fn failure(
        &self,
        msg: &InboundMessage,
        lang: &str,
    ) -> Result<OutboundNotification, Error> {
        let facts = vec![
            ("recipient", recipient_name(msg)),
            ("assistant", self.assistant_name.clone()),
        ];
        let skeleton = resolve(FAILURE_TEMPLATE, &facts)?;

        let body = match self
            .language
            .generate_body(&skeleton, &facts_json(&facts), lang)
            .await
        {
            Ok(prose) if unresolved_placeholders(&prose).is_empty() => prose,
            Ok(_) | Err(_) => skeleton,
        };

        Ok(OutboundNotification {
            to: vec![msg.sender_address.clone()],
            subject: reply_subject(&msg.subject),
            body,
        })
    }

    async fn render(
        &self,
        msg: &InboundMessage,
        template: &str,
        facts: &[(&str, String)],
        lang: &str,
    ) -> Result<OutboundNotification, Error> {
        let skeleton = resolve(template, facts)?;
        let body = self
            .language
            .generate_body(&skeleton, &facts_json(facts), lang)
            .await?;

        let leftover = unresolved_placeholders(&body);
        if !leftover.is_empty() {
            return Err(CompositionError::UnresolvedPlaceholders { tokens: leftover }.into());
        }

        Ok(OutboundNotification {
            to: vec![msg.sender_address.clone()],
            subject: reply_subject(&msg.subject),
            body,
        })
    }
}

/// Substitute every `[key]` with its fact, failing on empty facts and on
/// tokens left unresolved.
fn resolve(template: &str, facts: &[(&str, String)]) -> Result<String, CompositionError> {
    let mut out = template.to_string();
    for (key, value) in facts {
        if value.trim().is_empty() {
            return Err(CompositionError::MissingFact {
                fact: (*key).to_string(),
            });
        }
        out = out.replace(&format!("[{key}]"), value);
    }

    let leftover = unresolved_placeholders(&out);
    if leftover.is_empty() {
        Ok(out)
    } else {
        Err(CompositionError::UnresolvedPlaceholders { tokens: leftover })
    }
}

/// Find `[token]`-shaped placeholders remaining in text.
fn unresolved_placeholders(text: &str) -> Vec<String> {
    static PLACEHOLDER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[[A-Za-z_][A-Za-z0-9_ ]*\]").expect("static regex"));
    PLACEHOLDER
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn recipient_name(msg: &InboundMessage) -> String {
    msg.sender_name
        .clone()
        .unwrap_or_else(|| msg.sender_address.clone())
}

fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        "Your meeting request".to_string()
    } else if trimmed.to_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

fn facts_json(facts: &[(&str, String)]) -> serde_json::Value {
    serde_json::Value::Object(
        facts
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::error::CollaboratorError;
    use crate::llm::IntentAssessment;
    use crate::scheduling::TimeWindow;

    /// Language stub: generation echoes the skeleton (already resolved).
    struct EchoLanguage;

    #[async_trait]
    impl Language for EchoLanguage {
        async fn classify_intent(
            &self,
            _subject: &str,
            _body: &str,
        ) -> Result<IntentAssessment, CollaboratorError> {
            unreachable!("composer never classifies");
        }

        async fn generate_body(
            &self,
            skeleton: &str,
            _facts: &serde_json::Value,
            _language: &str,
        ) -> Result<String, CollaboratorError> {
            Ok(skeleton.to_string())
        }
    }

    /// Language stub whose generation leaves a placeholder behind.
    struct SloppyLanguage;

    #[async_trait]
    impl Language for SloppyLanguage {
        async fn classify_intent(
            &self,
            _subject: &str,
            _body: &str,
        ) -> Result<IntentAssessment, CollaboratorError> {
            unreachable!();
        }

        async fn generate_body(
            &self,
            _skeleton: &str,
            _facts: &serde_json::Value,
            _language: &str,
        ) -> Result<String, CollaboratorError> {
            Ok("Dear [recipient], see you at [Meeting Time]".to_string())
        }
    }

    fn window() -> TimeWindow {
        let start = chrono_tz::Asia::Tokyo
            .with_ymd_and_hms(2026, 3, 3, 10, 0, 0)
            .unwrap();
        TimeWindow::new(start, start + chrono::Duration::minutes(30)).unwrap()
    }

    fn message() -> InboundMessage {
        InboundMessage {
            uid: "1".into(),
            sender_name: Some("Alice".into()),
            sender_address: "alice@example.com".into(),
            subject: "Meeting next week".into(),
            body: "Can we meet?".into(),
            received_at: chrono::Utc::now(),
        }
    }

    fn composer(language: impl Language + 'static) -> Composer {
        Composer::new(Arc::new(language), "Meeting Assist".into())
    }

    #[tokio::test]
    async fn confirm_contains_slot_and_link() {
        let booking = BookingRecord {
            slot: window(),
            conference_link: "https://zoom.example/j/123".into(),
            attendee_name: "Alice".into(),
            attendee_address: "alice@example.com".into(),
        };
        let note = composer(EchoLanguage)
            .confirm(&message(), &booking, "English")
            .await
            .unwrap();
        assert_eq!(note.to, vec!["alice@example.com".to_string()]);
        assert_eq!(note.subject, "Re: Meeting next week");
        assert!(note.body.contains("https://zoom.example/j/123"));
        assert!(note.body.contains("10:00"));
        assert!(unresolved_placeholders(&note.body).is_empty());
    }

    #[tokio::test]
    async fn decline_lists_exactly_the_alternatives() {
        let alts = vec![
            window(),
            TimeWindow::new(
                window().start() + chrono::Duration::days(1),
                window().end() + chrono::Duration::days(1),
            )
            .unwrap(),
        ];
        let note = composer(EchoLanguage)
            .decline(
                &message(),
                &window(),
                UnavailableReason::Weekend,
                &alts,
                "English",
            )
            .await
            .unwrap();
        assert!(note.body.contains("weekend"));
        assert!(note.body.contains("1. "));
        assert!(note.body.contains("2. "));
        assert!(!note.body.contains("3. "));
    }

    #[tokio::test]
    async fn decline_with_no_alternatives_still_composes() {
        let note = composer(EchoLanguage)
            .decline(
                &message(),
                &window(),
                UnavailableReason::Conflict,
                &[],
                "English",
            )
            .await
            .unwrap();
        assert!(note.body.contains("no alternative slots"));
    }

    #[tokio::test]
    async fn sloppy_generation_is_rejected() {
        let booking = BookingRecord {
            slot: window(),
            conference_link: "https://zoom.example/j/123".into(),
            attendee_name: "Alice".into(),
            attendee_address: "alice@example.com".into(),
        };
        let result = composer(SloppyLanguage)
            .confirm(&message(), &booking, "English")
            .await;
        assert!(matches!(
            result,
            Err(Error::Composition(CompositionError::UnresolvedPlaceholders { .. }))
        ));
    }

    #[tokio::test]
    async fn failure_falls_back_to_skeleton_when_generation_fails() {
        struct BrokenLanguage;

        #[async_trait]
        impl Language for BrokenLanguage {
            async fn classify_intent(
                &self,
                _s: &str,
                _b: &str,
            ) -> Result<IntentAssessment, CollaboratorError> {
                unreachable!();
            }
            async fn generate_body(
                &self,
                _skeleton: &str,
                _facts: &serde_json::Value,
                _language: &str,
            ) -> Result<String, CollaboratorError> {
                Err(CollaboratorError::Http {
                    service: "llm".into(),
                    reason: "down".into(),
                })
            }
        }

        let note = composer(BrokenLanguage)
            .failure(&message(), "English")
            .await
            .unwrap();
        assert!(note.body.contains("apologies"));
        assert!(unresolved_placeholders(&note.body).is_empty());
    }

    #[test]
    fn resolve_rejects_empty_fact() {
        let facts = vec![("recipient", String::new())];
        assert!(matches!(
            resolve("Dear [recipient]", &facts),
            Err(CompositionError::MissingFact { .. })
        ));
    }

    #[test]
    fn resolve_rejects_leftover_token() {
        let facts = vec![("recipient", "Alice".to_string())];
        let err = resolve("Dear [recipient], join at [join_url]", &facts).unwrap_err();
        match err {
            CompositionError::UnresolvedPlaceholders { tokens } => {
                assert_eq!(tokens, vec!["[join_url]".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reply_subject_forms() {
        assert_eq!(reply_subject("Meeting"), "Re: Meeting");
        assert_eq!(reply_subject("Re: Meeting"), "Re: Meeting");
        assert_eq!(reply_subject("RE: Meeting"), "RE: Meeting");
        assert_eq!(reply_subject("  "), "Your meeting request");
    }

    #[test]
    fn recipient_falls_back_to_address() {
        let mut msg = message();
        msg.sender_name = None;
        assert_eq!(recipient_name(&msg), "alice@example.com");
    }
}
