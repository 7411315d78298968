//! Mailbox I/O — transport traits, message normalization, IMAP/SMTP shims.

pub mod imap;
pub mod normalizer;
pub mod smtp;

pub use imap::ImapMailbox;
pub use smtp::SmtpMailer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TransportError;
use crate::notify::OutboundNotification;

/// A raw message as fetched from the mailbox, before normalization.
#[derive(Debug, Clone)]
pub struct RawMail {
    /// Mailbox UID, stable across sessions; used for `mark_seen`.
    pub uid: String,
    /// Full RFC 822 payload.
    pub bytes: Vec<u8>,
}

/// A normalized inbound message. Immutable; discarded after one
/// orchestration pass.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Transport-level id, kept so the orchestrator can mark the message
    /// seen only after its full pass completes.
    pub uid: String,
    pub sender_name: Option<String>,
    pub sender_address: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Inbound mailbox transport.
#[async_trait]
pub trait MailboxTransport: Send + Sync {
    /// Fetch all unread messages without changing their seen state.
    async fn fetch_unread(&self) -> Result<Vec<RawMail>, TransportError>;

    /// Mark a message seen. Called only after full successful processing,
    /// so an interrupted pass gets the message again next cycle.
    async fn mark_seen(&self, uid: &str) -> Result<(), TransportError>;
}

/// Outbound mail transport.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, notification: &OutboundNotification) -> Result<(), TransportError>;
}
