use std::sync::Arc;

use meeting_assist::conferencing::{ConferencingService, ZoomClient};
use meeting_assist::config::Config;
use meeting_assist::llm::{Language, LanguageCapability, create_provider};
use meeting_assist::mail::imap::ImapMailbox;
use meeting_assist::mail::smtp::SmtpMailer;
use meeting_assist::mail::{MailSender, MailboxTransport};
use meeting_assist::orchestrator::{Collaborators, Orchestrator, Settings};
use meeting_assist::scheduling::SchedulingService;
use meeting_assist::scheduling::calcom::CalComClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📅 Meeting Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}", config.mail.address);
    eprintln!("   Model: {}", config.llm.model);
    eprintln!(
        "   Poll interval: {}s\n",
        config.poll_interval.as_secs()
    );

    let llm = create_provider(&config.llm)?;
    let language: Arc<dyn Language> = Arc::new(LanguageCapability::new(
        llm,
        config.policy.timezone,
        config.fallback_language.clone(),
    ));

    let mailbox: Arc<dyn MailboxTransport> = Arc::new(ImapMailbox::new(config.mail.clone()));
    let mail_sender: Arc<dyn MailSender> = Arc::new(SmtpMailer::new(config.mail.clone()));
    let scheduling: Arc<dyn SchedulingService> = Arc::new(CalComClient::new(config.calcom.clone()));
    let conferencing: Arc<dyn ConferencingService> = Arc::new(ZoomClient::new(config.zoom.clone()));

    let orchestrator = Orchestrator::new(
        Collaborators {
            mailbox,
            mail_sender,
            scheduling,
            conferencing,
            language,
        },
        Settings::from_config(&config),
    );

    orchestrator.run().await;
    Ok(())
}
