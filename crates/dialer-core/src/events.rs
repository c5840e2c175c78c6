//! Sequencer events
//!
//! Every observable change of the sequencer is broadcast so a console can
//! render progress without polling. Events are fire-and-forget: a slow
//! subscriber that lags behind loses the oldest events, and sending with no
//! subscribers is not an error.
//!
//! ```rust
//! use dialer_core::events::SequencerEvent;
//!
//! fn describe(event: &SequencerEvent) -> String {
//!     match event {
//!         SequencerEvent::ContactStatusChanged { index, status, .. } => {
//!             format!("#{index} is now {status}")
//!         }
//!         SequencerEvent::Finished { completed, failed, .. } => {
//!             format!("done: {completed} completed, {failed} failed")
//!         }
//!         other => format!("{other:?}"),
//!     }
//! }
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::backend::CallSid;
use crate::config::CallMode;
use crate::contact::{ContactId, ContactStatus};

/// Default capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something the operator can observe
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    /// A run started or resumed at `index`
    Started {
        mode: CallMode,
        index: usize,
        timestamp: DateTime<Utc>,
    },
    /// A contact changed status
    ContactStatusChanged {
        index: usize,
        contact_id: ContactId,
        status: ContactStatus,
        timestamp: DateTime<Utc>,
    },
    /// The callee answered a device call
    CallConnected {
        index: usize,
        sid: Option<CallSid>,
    },
    /// Live duration of a direct call
    DurationTick {
        index: usize,
        elapsed: Duration,
    },
    /// The cursor moved
    CursorAdvanced {
        index: usize,
    },
    /// Redirecting the active call failed; the call continues
    TransferFailed {
        reason: String,
    },
    /// The operator paused the run
    Paused {
        index: usize,
    },
    /// The queue was reset
    Reset,
    /// The run stopped on a blocking error
    Halted {
        reason: String,
    },
    /// Every contact has been settled
    Finished {
        completed: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast sender for sequencer events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SequencerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.tx.subscribe()
    }

    /// Send to all current subscribers
    pub fn emit(&self, event: SequencerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn contact_status(&self, index: usize, contact_id: ContactId, status: ContactStatus) {
        self.emit(SequencerEvent::ContactStatusChanged {
            index,
            contact_id,
            status,
            timestamp: Utc::now(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
