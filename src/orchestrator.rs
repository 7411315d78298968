//! Decision orchestrator — the state machine that turns one inbound
//! message plus live availability into exactly one outcome.
//!
//! ```text
//! START → CLASSIFY_INTENT → (not a meeting request) → IGNORE
//! CLASSIFY_INTENT → (meeting request) → CHECK_AVAILABILITY
//! CHECK_AVAILABILITY → (available) → BOOK_CONFERENCE → CREATE_BOOKING → NOTIFY_CONFIRM
//! CHECK_AVAILABILITY → (unavailable) → NOTIFY_DECLINE
//! any step → (collaborator error) → NOTIFY_FAILURE
//! ```
//!
//! Conference creation strictly precedes booking creation: the booking
//! embeds the join link. If booking fails afterwards the session is
//! orphaned and only cleaned up out of band.
//!
//! One cycle (fetch → decide → notify, per message in order) runs to
//! completion before the loop sleeps. Messages are marked seen only once
//! their pass reaches a terminal state, so an interrupted pass replays
//! the message next cycle (at-least-once).

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::conferencing::ConferencingService;
use crate::error::Error;
use crate::ingest::{self, RetryDelay, SleepDelay};
use crate::llm::Language;
use crate::mail::{InboundMessage, MailSender, MailboxTransport};
use crate::notify::{Composer, OutboundNotification};
use crate::scheduling::{
    AvailabilityResult, BookingRecord, RestrictionPolicy, SchedulingService, classifier,
};

/// Terminal state of one message pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not a meeting request (or below the confidence threshold).
    Ignored,
    /// Booked and confirmation sent.
    Confirmed,
    /// Declined with alternatives.
    Declined,
    /// A collaborator failed; apology attempted.
    Failed,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
            Self::Failed => "failed",
        }
    }
}

/// External collaborators, all behind traits so the state machine is
/// testable with stubs.
pub struct Collaborators {
    pub mailbox: Arc<dyn MailboxTransport>,
    pub mail_sender: Arc<dyn MailSender>,
    pub scheduling: Arc<dyn SchedulingService>,
    pub conferencing: Arc<dyn ConferencingService>,
    pub language: Arc<dyn Language>,
}

/// Orchestrator tuning, read-only during operation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub policy: RestrictionPolicy,
    pub poll_interval: Duration,
    pub fetch_max_attempts: u32,
    pub fetch_retry_delay: Duration,
    pub intent_confidence_threshold: f32,
    pub fallback_language: String,
    pub extra_service_senders: Vec<String>,
    pub assistant_name: String,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: config.policy.clone(),
            poll_interval: config.poll_interval,
            fetch_max_attempts: config.fetch_max_attempts,
            fetch_retry_delay: config.fetch_retry_delay,
            intent_confidence_threshold: config.intent_confidence_threshold,
            fallback_language: config.fallback_language.clone(),
            extra_service_senders: config.extra_service_senders.clone(),
            assistant_name: config.mail.display_name.clone(),
        }
    }
}

pub struct Orchestrator {
    collaborators: Collaborators,
    settings: Settings,
    composer: Composer,
    delay: Arc<dyn RetryDelay>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, settings: Settings) -> Self {
        let composer = Composer::new(
            Arc::clone(&collaborators.language),
            settings.assistant_name.clone(),
        );
        Self {
            collaborators,
            settings,
            composer,
            delay: Arc::new(SleepDelay),
        }
    }

    /// Swap the retry delay (tests inject a no-op clock).
    pub fn with_retry_delay(mut self, delay: Arc<dyn RetryDelay>) -> Self {
        self.delay = delay;
        self
    }

    /// Run forever: one cycle, then sleep the poll interval.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            "Orchestrator started"
        );
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// One full orchestration cycle: fetch, then decide and notify for
    /// every fetched message, sequentially and in fetch order.
    pub async fn run_cycle(&self) -> Vec<Outcome> {
        let batch = ingest::fetch_with_retry(
            &*self.collaborators.mailbox,
            &self.settings.extra_service_senders,
            self.settings.fetch_max_attempts,
            self.settings.fetch_retry_delay,
            &*self.delay,
        )
        .await;

        if batch.is_empty() {
            return Vec::new();
        }
        tracing::info!(count = batch.len(), "Processing unread messages");

        let mut outcomes = Vec::with_capacity(batch.len());
        for msg in &batch {
            let outcome = self.process_message(msg).await;
            tracing::info!(
                uid = %msg.uid,
                sender = %msg.sender_address,
                outcome = outcome.label(),
                "Message processed"
            );

            // Seen only after the pass reached a terminal state; a failed
            // mark leaves the message for reprocessing next cycle.
            if let Err(e) = self.collaborators.mailbox.mark_seen(&msg.uid).await {
                tracing::warn!(uid = %msg.uid, error = %e, "Failed to mark message seen");
            }

            outcomes.push(outcome);
        }
        outcomes
    }

    /// Drive one message through the state machine. Infallible: every
    /// error path terminates in `Outcome::Failed` after a best-effort
    /// apology.
    pub async fn process_message(&self, msg: &InboundMessage) -> Outcome {
        // CLASSIFY_INTENT
        let assessment = match self
            .collaborators
            .language
            .classify_intent(&msg.subject, &msg.body)
            .await
        {
            Ok(a) => a,
            Err(e) => {
                return self
                    .notify_failure(msg, &self.settings.fallback_language, &e.into())
                    .await;
            }
        };

        if !assessment.is_meeting_request
            || assessment.confidence < self.settings.intent_confidence_threshold
        {
            tracing::debug!(
                sender = %msg.sender_address,
                confidence = assessment.confidence,
                "Not a meeting request"
            );
            return Outcome::Ignored;
        }

        let lang = assessment.language;

        // A meeting request the model could not pin to a concrete window
        // cannot proceed deterministically; apologize rather than guess.
        let Some(window) = assessment.requested_window else {
            tracing::warn!(sender = %msg.sender_address, "Meeting request without extractable window");
            return self.notify_failure_plain(msg, &lang).await;
        };

        // CHECK_AVAILABILITY
        let availability = match classifier::classify(
            &window,
            &self.settings.policy,
            &*self.collaborators.scheduling,
        )
        .await
        {
            Ok(a) => a,
            Err(e) => return self.notify_failure(msg, &lang, &e.into()).await,
        };

        match availability {
            AvailabilityResult::Unavailable {
                reason,
                alternatives,
            } => {
                // NOTIFY_DECLINE
                match self
                    .composer
                    .decline(msg, &window, reason, &alternatives, &lang)
                    .await
                {
                    Ok(note) => self.dispatch(msg, note, Outcome::Declined).await,
                    Err(e) => self.notify_failure(msg, &lang, &e).await,
                }
            }
            AvailabilityResult::Available(slot) => {
                // BOOK_CONFERENCE — must precede CREATE_BOOKING, which
                // embeds the join link.
                let session = match self.collaborators.conferencing.create_session(&slot).await {
                    Ok(s) => s,
                    Err(e) => return self.notify_failure(msg, &lang, &e.into()).await,
                };

                // CREATE_BOOKING
                let record = BookingRecord {
                    slot,
                    conference_link: session.join_url.clone(),
                    attendee_name: msg
                        .sender_name
                        .clone()
                        .unwrap_or_else(|| msg.sender_address.clone()),
                    attendee_address: msg.sender_address.clone(),
                };
                if let Err(e) = self.collaborators.scheduling.create_booking(&record).await {
                    // The session has no booking to anchor it now; cleanup
                    // is out of band.
                    tracing::warn!(
                        session_id = %session.session_id,
                        "Booking failed after session creation; session orphaned"
                    );
                    return self.notify_failure(msg, &lang, &e.into()).await;
                }

                // NOTIFY_CONFIRM
                match self.composer.confirm(msg, &record, &lang).await {
                    Ok(note) => self.dispatch(msg, note, Outcome::Confirmed).await,
                    Err(e) => self.notify_failure(msg, &lang, &e).await,
                }
            }
        }
    }

    /// Send the terminal notification. A send failure is logged, not
    /// escalated — the pass already reached its terminal state and must
    /// not emit a second notification.
    async fn dispatch(
        &self,
        msg: &InboundMessage,
        note: OutboundNotification,
        outcome: Outcome,
    ) -> Outcome {
        if let Err(e) = self.collaborators.mail_sender.send(&note).await {
            tracing::error!(
                uid = %msg.uid,
                outcome = outcome.label(),
                error = %e,
                "Failed to send notification"
            );
        }
        outcome
    }

    async fn notify_failure(&self, msg: &InboundMessage, lang: &str, cause: &Error) -> Outcome {
        tracing::error!(uid = %msg.uid, error = %cause, "Message flow failed");
        self.notify_failure_plain(msg, lang).await
    }

    /// NOTIFY_FAILURE: best-effort apology. If composing or sending the
    /// apology itself fails, log and move on — the cycle proceeds to the
    /// next message either way.
    async fn notify_failure_plain(&self, msg: &InboundMessage, lang: &str) -> Outcome {
        match self.composer.failure(msg, lang).await {
            Ok(note) => {
                if let Err(e) = self.collaborators.mail_sender.send(&note).await {
                    tracing::error!(uid = %msg.uid, error = %e, "Failed to send apology");
                }
            }
            Err(e) => {
                tracing::error!(uid = %msg.uid, error = %e, "Failed to compose apology");
            }
        }
        Outcome::Failed
    }
}
