//! IMAP fetch transport — raw IMAP over rustls, blocking, run in
//! `spawn_blocking`.
//!
//! Fetches use `BODY.PEEK[]` so the unseen flag survives until the
//! orchestrator finishes a message and calls `mark_seen` explicitly.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::MailConfig;
use crate::error::TransportError;
use crate::mail::{MailboxTransport, RawMail};
use secrecy::ExposeSecret;

/// IMAP mailbox transport. Stateless: every operation opens a fresh
/// session, which keeps the blocking code simple and retry-friendly.
pub struct ImapMailbox {
    config: MailConfig,
}

impl ImapMailbox {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxTransport for ImapMailbox {
    async fn fetch_unread(&self) -> Result<Vec<RawMail>, TransportError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_unread_blocking(&config))
            .await
            .map_err(|e| TransportError::Imap(format!("fetch task panicked: {e}")))?
    }

    async fn mark_seen(&self, uid: &str) -> Result<(), TransportError> {
        let config = self.config.clone();
        let uid = uid.to_string();
        tokio::task::spawn_blocking(move || mark_seen_blocking(&config, &uid))
            .await
            .map_err(|e| TransportError::Imap(format!("store task panicked: {e}")))?
    }
}

// ── Blocking session ────────────────────────────────────────────────

struct ImapSession {
    tls: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    tag: u32,
}

impl ImapSession {
    /// Connect, authenticate and select INBOX.
    fn open(config: &MailConfig) -> Result<Self, TransportError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(|e| {
            TransportError::ConnectFailed {
                host: config.imap_host.clone(),
                port: config.imap_port,
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))
            .map_err(|e| TransportError::Imap(e.to_string()))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
        };

        let _greeting = session.read_line()?;

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            config.address,
            config.password.expose_secret()
        ))?;
        if !tagged_ok(&login) {
            return Err(TransportError::AuthFailed {
                user: config.address.clone(),
            });
        }

        let select = session.command("SELECT \"INBOX\"")?;
        if !tagged_ok(&select) {
            return Err(TransportError::Imap("SELECT INBOX failed".into()));
        }

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err(TransportError::Imap("connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(TransportError::Imap(e.to_string())),
            }
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        self.tls
            .read_exact(&mut buf)
            .map_err(|e| TransportError::Imap(e.to_string()))?;
        Ok(buf)
    }

    /// Send a tagged command and read lines until the tagged completion.
    ///
    /// A line announcing a literal (`{size}` suffix) is followed by exactly
    /// `size` raw bytes, consumed as one entry regardless of content — a
    /// body line that happens to start with the tag cannot end the command
    /// early.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, TransportError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let full = format!("{tag} {cmd}\r\n");
        self.tls
            .write_all(full.as_bytes())
            .and_then(|_| self.tls.flush())
            .map_err(|e| TransportError::Imap(e.to_string()))?;

        let completion = format!("{tag} ");
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_len(&line) {
                let raw = self.read_exact(len)?;
                lines.push(line);
                lines.push(String::from_utf8_lossy(&raw).to_string());
                continue;
            }
            let done = line.starts_with(&completion);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn logout(&mut self) {
        let _ = self.command("LOGOUT");
    }
}

fn tagged_ok(lines: &[String]) -> bool {
    lines
        .last()
        .is_some_and(|l| l.split_whitespace().nth(1) == Some("OK"))
}

/// Size of a literal announced at the end of a response line (`... {123}`).
fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end().strip_suffix('}')?;
    let open = trimmed.rfind('{')?;
    trimmed[open + 1..].parse().ok()
}

/// UIDs from the untagged `* SEARCH` line(s) of a `UID SEARCH` response.
fn parse_search_uids(lines: &[String]) -> Vec<String> {
    let mut uids = Vec::new();
    for line in lines {
        if line.starts_with("* SEARCH") {
            uids.extend(line.split_whitespace().skip(2).map(str::to_string));
        }
    }
    uids
}

/// The literal payload of a FETCH response: the entry following the line
/// that announced the literal size.
fn literal_payload(lines: &[String]) -> Option<&String> {
    let at = lines.iter().position(|l| literal_len(l).is_some())?;
    lines.get(at + 1)
}

fn fetch_unread_blocking(config: &MailConfig) -> Result<Vec<RawMail>, TransportError> {
    let mut session = ImapSession::open(config)?;

    // UID variants throughout: sequence numbers are session-scoped and
    // shift on expunge, while mark_seen runs in a later session.
    let search = session.command("UID SEARCH UNSEEN")?;
    let uids = parse_search_uids(&search);

    let mut results = Vec::new();
    for uid in &uids {
        // PEEK keeps the message unseen until mark_seen.
        let fetch = session.command(&format!("UID FETCH {uid} (BODY.PEEK[])"))?;
        if !tagged_ok(&fetch) {
            tracing::warn!(uid = %uid, "FETCH failed, skipping message");
            continue;
        }

        let Some(payload) = literal_payload(&fetch) else {
            tracing::warn!(uid = %uid, "FETCH returned no literal, skipping message");
            continue;
        };

        results.push(RawMail {
            uid: uid.clone(),
            bytes: payload.clone().into_bytes(),
        });
    }

    session.logout();
    Ok(results)
}

fn mark_seen_blocking(config: &MailConfig, uid: &str) -> Result<(), TransportError> {
    let mut session = ImapSession::open(config)?;
    let resp = session.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
    session.logout();
    if tagged_ok(&resp) {
        Ok(())
    } else {
        Err(TransportError::Imap(format!("STORE {uid} failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_ok_accepts_completion() {
        let lines = vec!["* 2 EXISTS\r\n".to_string(), "A3 OK done\r\n".to_string()];
        assert!(tagged_ok(&lines));
    }

    #[test]
    fn tagged_ok_rejects_no() {
        let lines = vec!["A3 NO [AUTHENTICATIONFAILED]\r\n".to_string()];
        assert!(!tagged_ok(&lines));
    }

    #[test]
    fn tagged_ok_rejects_empty() {
        assert!(!tagged_ok(&[]));
    }

    #[test]
    fn literal_len_parses_announcement() {
        assert_eq!(literal_len("* 1 FETCH (BODY[] {342}\r\n"), Some(342));
        assert_eq!(literal_len("A2 OK done\r\n"), None);
        assert_eq!(literal_len("* 1 FETCH (FLAGS (\\Seen))\r\n"), None);
    }

    #[test]
    fn search_uids_come_from_untagged_line() {
        let lines = vec![
            "* SEARCH 4823 4901\r\n".to_string(),
            "A2 OK SEARCH completed\r\n".to_string(),
        ];
        assert_eq!(parse_search_uids(&lines), vec!["4823", "4901"]);
    }

    #[test]
    fn search_uids_empty_mailbox() {
        let lines = vec![
            "* SEARCH\r\n".to_string(),
            "A2 OK SEARCH completed\r\n".to_string(),
        ];
        assert!(parse_search_uids(&lines).is_empty());
    }

    #[test]
    fn fetch_payload_is_the_literal_entry() {
        // The payload contains a line starting with the next command tag;
        // it must come through intact, not truncated at that line.
        let body = "From: a@example.com\r\nSubject: Hi\r\n\r\nA3 is our room number\r\n";
        let lines = vec![
            format!("* 12 FETCH (UID 4823 BODY[] {{{}}}\r\n", body.len()),
            body.to_string(),
            ")\r\n".to_string(),
            "A3 OK FETCH completed\r\n".to_string(),
        ];
        assert_eq!(literal_payload(&lines).map(String::as_str), Some(body));
    }

    #[test]
    fn fetch_without_literal_yields_none() {
        let lines = vec![
            "* 12 FETCH (FLAGS (\\Seen))\r\n".to_string(),
            "A3 OK FETCH completed\r\n".to_string(),
        ];
        assert!(literal_payload(&lines).is_none());
    }
}
