//! Ingestion retrier — bounded retry with injectable delay around the
//! mailbox fetch.
//!
//! Transient transport failures are collapsed into an empty batch after
//! `max_attempts`; the poll loop never crashes on a bad cycle. A
//! successful empty fetch is not an error and consumes no retry.

use std::time::Duration;

use async_trait::async_trait;

use crate::mail::{InboundMessage, MailboxTransport, normalizer};

/// Injectable delay between retry attempts.
#[async_trait]
pub trait RetryDelay: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Real clock delay.
pub struct SleepDelay;

#[async_trait]
impl RetryDelay for SleepDelay {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Fetch and normalize unread messages, retrying transient failures.
///
/// Returns the normalized batch on the first successful fetch. After
/// `max_attempts` failures, degrades to an empty batch.
pub async fn fetch_with_retry(
    transport: &dyn MailboxTransport,
    extra_service_senders: &[String],
    max_attempts: u32,
    delay: Duration,
    sleeper: &dyn RetryDelay,
) -> Vec<InboundMessage> {
    for attempt in 1..=max_attempts {
        match transport.fetch_unread().await {
            Ok(raws) => {
                if raws.is_empty() {
                    tracing::debug!("No unread messages");
                    return Vec::new();
                }
                return normalizer::normalize_batch(&raws, extra_service_senders);
            }
            Err(e) => {
                tracing::warn!(attempt, max_attempts, error = %e, "Mailbox fetch failed");
                if attempt < max_attempts {
                    sleeper.wait(delay).await;
                }
            }
        }
    }

    tracing::error!(max_attempts, "Mailbox fetch attempts exhausted, skipping cycle");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::TransportError;
    use crate::mail::RawMail;

    /// Fails the first `failures` fetches, then returns `payload`.
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
        payload: Vec<RawMail>,
    }

    impl FlakyTransport {
        fn new(failures: u32, payload: Vec<RawMail>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                payload,
            }
        }
    }

    #[async_trait]
    impl MailboxTransport for FlakyTransport {
        async fn fetch_unread(&self) -> Result<Vec<RawMail>, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TransportError::Imap("transient".into()))
            } else {
                Ok(self.payload.clone())
            }
        }

        async fn mark_seen(&self, _uid: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Records every requested wait instead of sleeping.
    struct RecordingDelay {
        waits: Mutex<Vec<Duration>>,
    }

    impl RecordingDelay {
        fn new() -> Self {
            Self {
                waits: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RetryDelay for RecordingDelay {
        async fn wait(&self, delay: Duration) {
            self.waits.lock().unwrap().push(delay);
        }
    }

    fn one_message() -> Vec<RawMail> {
        vec![RawMail {
            uid: "1".into(),
            bytes: b"From: alice@example.com\r\nSubject: Hi\r\n\r\nMeet?\r\n".to_vec(),
        }]
    }

    #[tokio::test]
    async fn empty_fetch_returns_immediately() {
        let transport = FlakyTransport::new(0, vec![]);
        let delay = RecordingDelay::new();
        let batch =
            fetch_with_retry(&transport, &[], 3, Duration::from_secs(5), &delay).await;
        assert!(batch.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(delay.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        // N failures with max_attempts = N+1 → true result.
        let transport = FlakyTransport::new(2, one_message());
        let delay = RecordingDelay::new();
        let batch =
            fetch_with_retry(&transport, &[], 3, Duration::from_secs(5), &delay).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].sender_address, "alice@example.com");
        assert_eq!(delay.waits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_degrade_to_empty() {
        // N failures with max_attempts = N → empty batch, no crash.
        let transport = FlakyTransport::new(3, one_message());
        let delay = RecordingDelay::new();
        let batch =
            fetch_with_retry(&transport, &[], 3, Duration::from_secs(5), &delay).await;
        assert!(batch.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        // No sleep after the final attempt.
        assert_eq!(delay.waits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delay_value_is_passed_through() {
        let transport = FlakyTransport::new(1, one_message());
        let delay = RecordingDelay::new();
        fetch_with_retry(&transport, &[], 2, Duration::from_millis(123), &delay).await;
        assert_eq!(
            delay.waits.lock().unwrap().as_slice(),
            &[Duration::from_millis(123)]
        );
    }

    #[tokio::test]
    async fn zero_attempts_never_fetches() {
        let transport = FlakyTransport::new(0, one_message());
        let delay = RecordingDelay::new();
        let batch =
            fetch_with_retry(&transport, &[], 0, Duration::from_secs(1), &delay).await;
        assert!(batch.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
