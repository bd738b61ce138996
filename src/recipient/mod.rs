//! Per-recipient copies of a message and their two state machines.
//!
//! A [`Recipient`] tracks two independent axes:
//!
//! - **read state** (`unread -> read`), which only advances once the owning
//!   message has been sent, and
//! - **visibility** (`visible <-> hidden`), which is unconstrained and scoped
//!   to this one receiver's copy.
//!
//! Visibility is not stored as a flag. A copy is hidden exactly when
//! `hidden_at` holds a timestamp.

pub mod ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MessagingError;
use crate::message::{Envelope, Message};
use crate::types::{EntityRef, ReadState, RecipientKind, Visibility};

/// One receiver's copy of a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    /// Store-assigned id.
    pub id: i64,
    /// Owning message.
    pub message_id: i64,
    /// Receiving entity.
    pub receiver: EntityRef,
    /// Kind the receiver was addressed under.
    pub kind: RecipientKind,
    /// 1-based rank within `(message_id, kind)`; `None` until assigned.
    pub position: Option<u32>,
    /// Read axis.
    pub state: ReadState,
    /// When this copy was hidden; `None` while visible.
    pub hidden_at: Option<DateTime<Utc>>,
}

/// Result of a `view` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum ViewOutcome {
    /// The copy moved from unread to read.
    Read,
    /// The copy was already read; nothing changed.
    AlreadyRead,
    /// The event did not fire and the copy stays unread.
    Rejected(Rejection),
}

impl ViewOutcome {
    /// Returns `true` unless the view was rejected.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Why a `view` event was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The owning message is still a draft.
    NotSent,
}

impl Recipient {
    /// A fresh, unpositioned, unread and visible copy.
    pub fn new(id: i64, message_id: i64, receiver: EntityRef, kind: RecipientKind) -> Self {
        Self {
            id,
            message_id,
            receiver,
            kind,
            position: None,
            state: ReadState::Unread,
            hidden_at: None,
        }
    }

    /// Mark this copy read, provided its message has been sent.
    ///
    /// Viewing an unsent message is an expected outcome, not an error: the
    /// returned [`ViewOutcome::Rejected`] leaves the copy unread.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Validation`] if `message` is not this copy's message.
    pub fn view(&mut self, message: &Message) -> Result<ViewOutcome, MessagingError> {
        if message.id != self.message_id {
            return Err(MessagingError::Validation {
                field: "message",
                reason: format!(
                    "recipient {} belongs to message {}, not {}",
                    self.id, self.message_id, message.id
                ),
            });
        }
        match self.state {
            ReadState::Read => Ok(ViewOutcome::AlreadyRead),
            ReadState::Unread if !message.is_sent() => {
                Ok(ViewOutcome::Rejected(Rejection::NotSent))
            }
            ReadState::Unread => {
                self.state = ReadState::Read;
                Ok(ViewOutcome::Read)
            }
        }
    }

    /// Returns `true` once the copy has been read.
    pub fn is_read(&self) -> bool {
        self.state == ReadState::Read
    }

    /// Hide this copy from the receiver's inbox, stamped with the current time.
    pub fn hide(&mut self) {
        self.hide_at(Utc::now());
    }

    /// Hide this copy, stamped with `now`.
    ///
    /// An already-hidden copy keeps its original timestamp.
    pub fn hide_at(&mut self, now: DateTime<Utc>) {
        if self.hidden_at.is_none() {
            self.hidden_at = Some(now);
        }
    }

    /// Make this copy visible again.
    pub fn unhide(&mut self) {
        self.hidden_at = None;
    }

    /// Current visibility, derived from `hidden_at`.
    pub fn visibility(&self) -> Visibility {
        if self.hidden_at.is_some() {
            Visibility::Hidden
        } else {
            Visibility::Visible
        }
    }

    /// Returns `true` while the copy is visible.
    pub fn is_visible(&self) -> bool {
        self.visibility() == Visibility::Visible
    }
}

/// Keep only visible copies, in their original order.
pub fn list_visible(recipients: &[Recipient]) -> Vec<&Recipient> {
    recipients.iter().filter(|r| r.is_visible()).collect()
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// A recipient seen through its owning message.
///
/// Message fields are read from the envelope on each call rather than copied
/// onto the recipient.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    recipient: &'a Recipient,
    envelope: &'a Envelope,
}

impl<'a> Delivery<'a> {
    /// Pair a recipient with the envelope of its message.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Validation`] if the recipient belongs to another message.
    pub fn new(recipient: &'a Recipient, envelope: &'a Envelope) -> Result<Self, MessagingError> {
        if recipient.message_id != envelope.message.id {
            return Err(MessagingError::Validation {
                field: "message",
                reason: format!(
                    "recipient {} belongs to message {}, not {}",
                    recipient.id, recipient.message_id, envelope.message.id
                ),
            });
        }
        Ok(Self {
            recipient,
            envelope,
        })
    }

    /// The recipient record.
    pub fn recipient(&self) -> &'a Recipient {
        self.recipient
    }

    /// The receiving entity acting on this copy.
    pub fn receiver(&self) -> &'a EntityRef {
        &self.recipient.receiver
    }

    /// The owning message.
    pub fn message(&self) -> &'a Message {
        &self.envelope.message
    }

    /// Sender of the owning message.
    pub fn sender(&self) -> &'a EntityRef {
        &self.envelope.message.sender
    }

    /// Subject of the owning message.
    pub fn subject(&self) -> Option<&'a str> {
        self.envelope.message.subject.as_deref()
    }

    /// Body of the owning message.
    pub fn body(&self) -> Option<&'a str> {
        self.envelope.message.body.as_deref()
    }

    /// Creation time of the owning message.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.envelope.message.created_at
    }

    /// Every recipient of the owning message.
    pub fn recipients(&self) -> &'a [Recipient] {
        &self.envelope.recipients
    }

    /// Direct recipients of the owning message, in position order.
    pub fn to(&self) -> Vec<&'a Recipient> {
        self.envelope.recipients_of(RecipientKind::To)
    }

    /// Carbon-copy recipients of the owning message, in position order.
    pub fn cc(&self) -> Vec<&'a Recipient> {
        self.envelope.recipients_of(RecipientKind::Cc)
    }

    /// Blind carbon-copy recipients of the owning message, in position order.
    pub fn bcc(&self) -> Vec<&'a Recipient> {
        self.envelope.recipients_of(RecipientKind::Bcc)
    }
}
