//! Message normalizer — raw mail payload → `InboundMessage`.
//!
//! Decoding is lossy by construction: mail-parser substitutes on charset
//! mismatches instead of failing, so one mis-declared message never aborts
//! a batch. Messages from no-reply/service senders are filtered out here
//! and never reach the orchestrator.

use std::sync::LazyLock;

use chrono::Utc;
use mail_parser::MessageParser;
use regex::Regex;

use crate::error::DecodeError;
use crate::mail::{InboundMessage, RawMail};

/// Sender prefixes that identify automated/service mail.
const SERVICE_PREFIXES: &[&str] = &[
    "noreply@",
    "no-reply@",
    "donotreply@",
    "do-not-reply@",
    "mailer-daemon@",
    "postmaster@",
];

/// Sender domains whose mail is always automated (e.g. the scheduling
/// service's own confirmation emails).
const SERVICE_DOMAINS: &[&str] = &["cal.com"];

/// Decode a single raw message.
pub fn normalize(raw: &RawMail) -> Result<InboundMessage, DecodeError> {
    let parsed = MessageParser::default()
        .parse(&raw.bytes)
        .ok_or(DecodeError::UnparseableMessage)?;

    let (sender_name, sender_address) = extract_sender(&parsed).ok_or_else(|| {
        DecodeError::MissingSender {
            id: raw.uid.clone(),
        }
    })?;

    let subject = parsed.subject().unwrap_or_default().to_string();

    // First text/plain part for multipart; direct payload otherwise.
    // No plain-text part means an empty body, not an error.
    let body = parsed
        .body_text(0)
        .map(|t| t.to_string())
        .unwrap_or_default();

    let received_at = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    Ok(InboundMessage {
        uid: raw.uid.clone(),
        sender_name,
        sender_address,
        subject,
        body,
        received_at,
    })
}

/// Decode a batch, skipping undecodable messages and service senders.
///
/// A per-message decode failure is logged and skipped; it never aborts
/// the rest of the batch.
pub fn normalize_batch(raws: &[RawMail], extra_service_senders: &[String]) -> Vec<InboundMessage> {
    let mut out = Vec::new();
    for raw in raws {
        match normalize(raw) {
            Ok(msg) => {
                if is_service_sender(&msg.sender_address, extra_service_senders) {
                    tracing::debug!(sender = %msg.sender_address, "Skipping service sender");
                    continue;
                }
                out.push(msg);
            }
            Err(e) => {
                tracing::warn!(uid = %raw.uid, error = %e, "Skipping undecodable message");
            }
        }
    }
    out
}

/// Sender name/address from the parsed From header.
///
/// Falls back to regex-matching a `"Name <address>"` form against the raw
/// header text when the parser yields no structured address; if nothing
/// matches, the raw header text stands in as the address.
fn extract_sender(parsed: &mail_parser::Message) -> Option<(Option<String>, String)> {
    if let Some(addr) = parsed.from().and_then(|a| a.first()) {
        if let Some(address) = addr.address() {
            let name = addr
                .name()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());
            return Some((name, address.to_string()));
        }
    }

    let raw = parsed
        .header_raw("From")
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())?;
    Some(split_display_form(&raw))
}

/// Split a `"Name <address>"` header into its parts.
pub fn split_display_form(raw: &str) -> (Option<String>, String) {
    static DISPLAY_FORM: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(.*)<(.+)>\s*$").expect("static regex"));
    match DISPLAY_FORM.captures(raw) {
        Some(caps) => {
            let name = caps[1].trim().trim_matches('"').to_string();
            let address = caps[2].trim().to_string();
            let name = (!name.is_empty()).then_some(name);
            (name, address)
        }
        None => (None, raw.to_string()),
    }
}

/// Check a sender address against the built-in service list plus any
/// configured extras (exact email, `@domain` or bare domain).
pub fn is_service_sender(address: &str, extra: &[String]) -> bool {
    let lower = address.to_lowercase();

    if SERVICE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    if SERVICE_DOMAINS
        .iter()
        .any(|d| lower.ends_with(&format!("@{d}")) || lower.ends_with(&format!(".{d}")))
    {
        return true;
    }

    extra.iter().any(|e| {
        let e = e.to_lowercase();
        if e.starts_with('@') {
            lower.ends_with(&e)
        } else if e.contains('@') {
            lower == e
        } else {
            lower.ends_with(&format!("@{e}"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(bytes: &[u8]) -> RawMail {
        RawMail {
            uid: "42".into(),
            bytes: bytes.to_vec(),
        }
    }

    const SIMPLE: &[u8] = b"From: Alice Example <alice@example.com>\r\n\
Subject: Meeting request\r\n\
Date: Tue, 3 Mar 2026 10:00:00 +0900\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Could we meet Tuesday at 10am?\r\n";

    #[test]
    fn normalize_simple_message() {
        let msg = normalize(&raw(SIMPLE)).unwrap();
        assert_eq!(msg.uid, "42");
        assert_eq!(msg.sender_name.as_deref(), Some("Alice Example"));
        assert_eq!(msg.sender_address, "alice@example.com");
        assert_eq!(msg.subject, "Meeting request");
        assert!(msg.body.contains("Tuesday at 10am"));
    }

    #[test]
    fn normalize_bare_address_has_no_name() {
        let msg = normalize(&raw(
            b"From: bob@example.com\r\nSubject: Hi\r\n\r\nHello\r\n",
        ))
        .unwrap();
        assert_eq!(msg.sender_name, None);
        assert_eq!(msg.sender_address, "bob@example.com");
    }

    #[test]
    fn normalize_multipart_picks_plain_text() {
        let multipart: &[u8] = b"From: alice@example.com\r\n\
Subject: Multi\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain body here\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html body here</p>\r\n\
--b1--\r\n";
        let msg = normalize(&raw(multipart)).unwrap();
        assert!(msg.body.contains("plain body here"));
        assert!(!msg.body.contains("<p>"));
    }

    #[test]
    fn normalize_misdeclared_charset_is_lossy_not_fatal() {
        // Declares utf-8 but carries an invalid continuation byte (the
        // recurring 0xe3 failure class). Must decode lossily.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(
            b"From: alice@example.com\r\nSubject: Bad bytes\r\n\
Content-Type: text/plain; charset=utf-8\r\n\r\n",
        );
        bytes.extend_from_slice(&[0xe3, 0x20]);
        bytes.extend_from_slice(b"rest of body\r\n");

        let msg = normalize(&raw(&bytes)).unwrap();
        assert!(msg.body.contains("rest of body"));
    }

    #[test]
    fn normalize_missing_from_is_error() {
        assert!(matches!(
            normalize(&raw(b"Subject: orphan\r\n\r\nbody\r\n")),
            Err(DecodeError::MissingSender { .. })
        ));
    }

    #[test]
    fn split_display_form_matches() {
        let (name, addr) = split_display_form("Alice Example <alice@example.com>");
        assert_eq!(name.as_deref(), Some("Alice Example"));
        assert_eq!(addr, "alice@example.com");
    }

    #[test]
    fn split_display_form_no_match_keeps_raw() {
        let (name, addr) = split_display_form("alice@example.com");
        assert_eq!(name, None);
        assert_eq!(addr, "alice@example.com");
    }

    #[test]
    fn service_sender_noreply_variants() {
        assert!(is_service_sender("noreply@shop.example", &[]));
        assert!(is_service_sender("No-Reply@Corp.example", &[]));
        assert!(is_service_sender("donotreply@x.y", &[]));
        assert!(!is_service_sender("alice@example.com", &[]));
    }

    #[test]
    fn service_sender_cal_com_domain() {
        assert!(is_service_sender("hello@cal.com", &[]));
        assert!(is_service_sender("notifications@mail.cal.com", &[]));
    }

    #[test]
    fn service_sender_extra_patterns() {
        let extra = vec!["@bots.example".to_string(), "ci@corp.example".to_string()];
        assert!(is_service_sender("x@bots.example", &extra));
        assert!(is_service_sender("CI@corp.example", &extra));
        assert!(!is_service_sender("human@corp.example", &extra));
    }

    #[test]
    fn batch_filters_service_senders_and_bad_messages() {
        let raws = vec![
            raw(SIMPLE),
            RawMail {
                uid: "43".into(),
                bytes: b"From: noreply@cal.com\r\nSubject: booked\r\n\r\nok\r\n".to_vec(),
            },
            RawMail {
                uid: "44".into(),
                bytes: b"Subject: no sender\r\n\r\nbody\r\n".to_vec(),
            },
        ];
        let batch = normalize_batch(&raws, &[]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].sender_address, "alice@example.com");
    }
}
