//! Meeting Assist — mail-triggered meeting scheduling.

pub mod conferencing;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod mail;
pub mod notify;
pub mod orchestrator;
pub mod scheduling;
