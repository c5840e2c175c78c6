//! The call queue: an ordered contact list with a forward-only cursor
//!
//! Only the contact under the cursor is ever moved into `Calling`, and
//! `begin_current` refuses to do so while any other contact is calling, so at
//! most one contact is calling at any time.

use serde::Serialize;

use crate::contact::{CallOutcome, Contact, ContactEvent, ContactStatus};
use crate::error::{DialerError, DialerResult};

/// Per-status counts over the whole queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub calling: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Ordered contacts, cursor and settled count
#[derive(Debug, Clone, Default)]
pub struct CallQueue {
    contacts: Vec<Contact>,
    current_index: usize,
    completed_count: usize,
}

impl CallQueue {
    /// Build a queue; every contact starts pending
    pub fn new(mut contacts: Vec<Contact>) -> Self {
        for contact in &mut contacts {
            contact.status = ContactStatus::Pending;
        }
        Self {
            contacts,
            current_index: 0,
            completed_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn get(&self, index: usize) -> Option<&Contact> {
        self.contacts.get(index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Contacts settled (completed, failed or skipped) since the last reset
    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    /// Contact under the cursor
    pub fn current(&self) -> Option<&Contact> {
        self.contacts.get(self.current_index)
    }

    /// The cursor has moved past the last contact
    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.contacts.len()
    }

    /// Index of the contact currently calling, if any
    pub fn calling_index(&self) -> Option<usize> {
        self.contacts
            .iter()
            .position(|c| c.status == ContactStatus::Calling)
    }

    /// Move the current contact into `Calling`
    pub fn begin_current(&mut self) -> DialerResult<&Contact> {
        if let Some(calling) = self.calling_index() {
            return Err(DialerError::invalid_state(format!(
                "contact at index {calling} is already calling"
            )));
        }
        let index = self.current_index;
        let contact = self
            .contacts
            .get_mut(index)
            .ok_or(DialerError::QueueExhausted)?;
        contact.apply(ContactEvent::Dial)?;
        Ok(&self.contacts[index])
    }

    /// Record the outcome of the current contact's call
    pub fn settle_current(&mut self, outcome: &CallOutcome) -> DialerResult<&Contact> {
        self.apply_current(outcome.event())
    }

    /// Fail the current contact as skipped by the operator
    pub fn skip_current(&mut self) -> DialerResult<&Contact> {
        self.apply_current(ContactEvent::Skip)
    }

    fn apply_current(&mut self, event: ContactEvent) -> DialerResult<&Contact> {
        let index = self.current_index;
        let contact = self
            .contacts
            .get_mut(index)
            .ok_or(DialerError::QueueExhausted)?;
        contact.apply(event)?;
        if contact.status.is_terminal() {
            self.completed_count += 1;
        }
        Ok(&self.contacts[index])
    }

    /// Move the cursor forward by one, never past the end
    pub fn advance(&mut self) -> usize {
        if self.current_index < self.contacts.len() {
            self.current_index += 1;
        }
        self.current_index
    }

    /// Move the cursor forward past settled contacts
    ///
    /// Returns the index of the next pending contact, or `None` once the
    /// queue is exhausted.
    pub fn seek_pending(&mut self) -> Option<usize> {
        while let Some(contact) = self.current() {
            if contact.is_pending() {
                return Some(self.current_index);
            }
            self.advance();
        }
        None
    }

    /// Cursor to 0, count to 0, every contact back to pending
    pub fn reset(&mut self) {
        for contact in &mut self.contacts {
            contact.status = ContactStatus::Pending;
        }
        self.current_index = 0;
        self.completed_count = 0;
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.contacts.len(),
            ..Default::default()
        };
        for contact in &self.contacts {
            match contact.status {
                ContactStatus::Pending => stats.pending += 1,
                ContactStatus::Calling => stats.calling += 1,
                ContactStatus::Completed => stats.completed += 1,
                ContactStatus::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }
}
