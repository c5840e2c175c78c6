//! Voice device collaborator
//!
//! Power-dialer and direct-call modes connect the operator's own voice
//! client to the contact. The device is built and registered by the
//! application and handed to the sequencer; the sequencer never creates one.
//!
//! A connection reports its lifecycle on an mpsc channel. The sender side is
//! owned by the device implementation; dropping it is treated as an abrupt
//! end of the call.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backend::{CallSid, IvrScript};
use crate::error::DialerResult;

/// Lifecycle events of a single voice connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Remote side is ringing
    Ringing,
    /// Remote side answered
    Accepted,
    /// Either side hung up
    Disconnected,
    /// Remote side rejected the call
    Rejected,
    /// Call was canceled before being answered
    Canceled,
    /// Connection error with the SDK's message
    Error(String),
}

impl ConnectionEvent {
    /// Whether the connection is over after this event
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionEvent::Ringing | ConnectionEvent::Accepted)
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Ringing => write!(f, "ringing"),
            ConnectionEvent::Accepted => write!(f, "accepted"),
            ConnectionEvent::Disconnected => write!(f, "disconnected"),
            ConnectionEvent::Rejected => write!(f, "rejected"),
            ConnectionEvent::Canceled => write!(f, "canceled"),
            ConnectionEvent::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Parameters for an outbound device connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Normalised number to dial
    pub to: String,
    /// Caller-ID number
    pub caller_id: String,
    /// Skip any IVR step and bridge straight to the operator
    pub bypass_ivr: bool,
    /// IVR menu available during a power-dialer call
    pub ivr: Option<IvrScript>,
}

/// A live voice connection
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Backend identifier of the call, once known
    fn call_sid(&self) -> Option<CallSid>;

    /// Hang up; must be safe to call more than once
    async fn disconnect(&self);
}

/// A connection plus its event stream
pub struct ConnectionHandle {
    pub connection: Arc<dyn VoiceConnection>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("call_sid", &self.connection.call_sid())
            .finish()
    }
}

/// The operator's registered voice client
#[async_trait]
pub trait VoiceDevice: Send + Sync {
    /// Registration has completed and calls can be placed
    fn is_ready(&self) -> bool;

    /// Open an outbound connection
    ///
    /// Errors for which [`DialerError::halts_sequence`](crate::DialerError::halts_sequence)
    /// is true (for example a denied microphone) stop the whole sequence.
    async fn connect(&self, params: ConnectParams) -> DialerResult<ConnectionHandle>;
}
