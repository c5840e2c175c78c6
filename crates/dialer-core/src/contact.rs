//! Contacts and their per-call status machine
//!
//! A contact moves through `Pending → Calling → {Completed | Failed}`. The
//! only other legal move is an operator skip, which fails a pending or
//! calling contact outright. All transitions go through
//! [`ContactStatus::transition`]; there is no other way to change a status.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DialerError, DialerResult};

/// Failure reason recorded when the operator skips a contact
pub const SKIPPED_REASON: &str = "skipped by operator";

/// Failure reason recorded when a pause interrupts a call in progress
pub const INTERRUPTED_REASON: &str = "interrupted: sequence paused";

/// 1-based position of the contact in the uploaded sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub usize);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a contact is in its call lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContactStatus {
    /// Waiting to be dialed
    Pending,
    /// The one contact currently being dialed
    Calling,
    /// Call reached a successful terminal state
    Completed,
    /// Call failed, was skipped, or was interrupted
    Failed {
        /// Raw error text shown to the operator
        error: String,
    },
}

/// Something that happens to a contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEvent {
    /// The sequencer starts dialing the contact
    Dial,
    /// The call finished successfully
    Succeed,
    /// The call failed with a reason
    Fail(String),
    /// The operator skipped the contact
    Skip,
}

impl fmt::Display for ContactEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactEvent::Dial => write!(f, "dial"),
            ContactEvent::Succeed => write!(f, "succeed"),
            ContactEvent::Fail(_) => write!(f, "fail"),
            ContactEvent::Skip => write!(f, "skip"),
        }
    }
}

/// How a single call attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Call reached a successful terminal state
    Completed,
    /// Call failed; the reason is recorded on the contact
    Failed(String),
}

impl CallOutcome {
    /// The contact event this outcome applies
    pub fn event(&self) -> ContactEvent {
        match self {
            CallOutcome::Completed => ContactEvent::Succeed,
            CallOutcome::Failed(reason) => ContactEvent::Fail(reason.clone()),
        }
    }
}

impl ContactStatus {
    /// The single transition function for contact statuses
    pub fn transition(
        &self,
        event: ContactEvent,
    ) -> Result<ContactStatus, (ContactStatus, ContactEvent)> {
        match (self, event) {
            (ContactStatus::Pending, ContactEvent::Dial) => Ok(ContactStatus::Calling),
            (ContactStatus::Calling, ContactEvent::Succeed) => Ok(ContactStatus::Completed),
            (ContactStatus::Calling, ContactEvent::Fail(error)) => {
                Ok(ContactStatus::Failed { error })
            }
            (ContactStatus::Pending | ContactStatus::Calling, ContactEvent::Skip) => {
                Ok(ContactStatus::Failed {
                    error: SKIPPED_REASON.to_string(),
                })
            }
            (from, event) => Err((from.clone(), event)),
        }
    }

    /// Completed or failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContactStatus::Completed | ContactStatus::Failed { .. })
    }

    /// Short lowercase label
    pub fn label(&self) -> &'static str {
        match self {
            ContactStatus::Pending => "pending",
            ContactStatus::Calling => "calling",
            ContactStatus::Completed => "completed",
            ContactStatus::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the call queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    /// Normalised number that is actually dialed
    pub phone: String,
    /// Number exactly as it appeared in the sheet
    pub original_phone: String,
    pub status: ContactStatus,
}

impl Contact {
    /// Create a pending contact
    pub fn new(
        id: ContactId,
        name: impl Into<String>,
        phone: impl Into<String>,
        original_phone: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            phone: phone.into(),
            original_phone: original_phone.into(),
            status: ContactStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ContactStatus::Pending
    }

    /// Error text attached to a failed contact
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ContactStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Apply an event, rejecting illegal moves
    pub fn apply(&mut self, event: ContactEvent) -> DialerResult<()> {
        match self.status.transition(event) {
            Ok(next) => {
                self.status = next;
                Ok(())
            }
            Err((from, event)) => Err(DialerError::InvalidTransition {
                contact_id: self.id.0,
                from: from.label().to_string(),
                event: event.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        Contact::new(ContactId(1), "Ada", "+15551234567", "555-123-4567")
    }

    #[test]
    fn test_happy_path() {
        let mut c = contact();
        c.apply(ContactEvent::Dial).unwrap();
        assert_eq!(c.status, ContactStatus::Calling);
        c.apply(ContactEvent::Succeed).unwrap();
        assert_eq!(c.status, ContactStatus::Completed);
        assert_eq!(c.error(), None);
    }

    #[test]
    fn test_failure_carries_error() {
        let mut c = contact();
        c.apply(ContactEvent::Dial).unwrap();
        c.apply(ContactEvent::Fail("busy".to_string())).unwrap();
        assert_eq!(c.error(), Some("busy"));
    }

    #[test]
    fn test_skip_from_pending_and_calling() {
        let mut c = contact();
        c.apply(ContactEvent::Skip).unwrap();
        assert_eq!(c.error(), Some(SKIPPED_REASON));

        let mut c = contact();
        c.apply(ContactEvent::Dial).unwrap();
        c.apply(ContactEvent::Skip).unwrap();
        assert_eq!(c.error(), Some(SKIPPED_REASON));
    }

    #[test]
    fn test_illegal_moves_rejected() {
        let mut c = contact();
        let err = c.apply(ContactEvent::Succeed).unwrap_err();
        assert!(matches!(err, DialerError::InvalidTransition { contact_id: 1, .. }));
        assert!(c.is_pending());

        c.apply(ContactEvent::Dial).unwrap();
        assert!(c.apply(ContactEvent::Dial).is_err());

        c.apply(ContactEvent::Succeed).unwrap();
        assert!(c.apply(ContactEvent::Skip).is_err());
        assert!(c.apply(ContactEvent::Fail("late".into())).is_err());
    }
}
