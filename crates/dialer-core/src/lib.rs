//! # Dialer Core - Outbound Call Queue Sequencing
//!
//! This crate drives bulk outbound calling from an uploaded contact sheet:
//! - **import**: CSV parsing with phone normalisation
//! - **queue**: contact status tracking with a forward-only cursor
//! - **sequencer**: one-call-at-a-time dialing with pause, skip, reset and transfer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dialer_core::{CallSequencer, DialerConfig, HttpBackend, SequencerEvent};
//! use dialer_core::import::parse_contacts;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DialerConfig::load(None)?;
//!     let backend = Arc::new(HttpBackend::new(&config.backend)?);
//!
//!     let sequencer = CallSequencer::builder(backend)
//!         .campaign(config.campaign.clone())
//!         .config(config.sequencer.clone())
//!         .build();
//!
//!     let file = std::fs::File::open("contacts.csv")?;
//!     let report = parse_contacts(file, &config.campaign.country_code)?;
//!     sequencer.load_contacts(report.contacts).await?;
//!
//!     let mut events = sequencer.subscribe();
//!     sequencer.start().await?;
//!     while let Ok(event) = events.recv().await {
//!         if let SequencerEvent::Finished { completed, failed, .. } = event {
//!             println!("{completed} completed, {failed} failed");
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Calling modes
//!
//! 1. **IVR blast**: the backend places each call and plays the campaign script
//! 2. **Power dialer**: the operator's voice device connects, with an IVR menu
//! 3. **Direct call**: the operator's voice device connects, no IVR
//!
//! The backend and voice device are traits ([`CampaignBackend`],
//! [`VoiceDevice`]) so the sequencer can be driven by any telephony stack.

pub mod backend;
pub mod config;
pub mod contact;
pub mod device;
pub mod error;
pub mod events;
pub mod feedback;
pub mod http;
pub mod import;
pub mod logging;
pub mod phone;
pub mod queue;
pub mod recovery;
pub mod sequencer;

// Re-export main types
pub use backend::{
    CallSid, CampaignBackend, FromNumber, IvrCallRequest, IvrScript, RedirectRequest,
    RemoteCallStatus,
};
pub use config::{
    BackendConfig, CallMode, CampaignConfig, DialerConfig, LoggingSettings, SequencerConfig,
};
pub use contact::{CallOutcome, Contact, ContactId, ContactStatus};
pub use device::{ConnectParams, ConnectionEvent, ConnectionHandle, VoiceConnection, VoiceDevice};
pub use error::{DialerError, DialerResult, ErrorContext};
pub use events::{EventBus, SequencerEvent};
pub use feedback::{FeedbackSink, NoFeedback, TerminalBell, Tone};
pub use http::HttpBackend;
pub use logging::{setup_logging, LoggingConfig};
pub use phone::{format_phone, CountryCode};
pub use queue::{CallQueue, QueueStats};
pub use sequencer::{
    CallSequencer, QueueSnapshot, RunState, SequencerBuilder, SequencerDeps, TransferTarget,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
