//! Messages, the aggregate that owns their recipients, and unsent drafts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MessagingError;
use crate::recipient::{ordering, Delivery, Recipient};
use crate::types::{EntityRef, RecipientKind, SendState, Visibility};

/// Maximum subject length in bytes.
pub const MAX_SUBJECT_SIZE: usize = 1024;

/// Maximum body length in bytes.
///
/// Keeps a single message from growing without bound; 64 KiB is generous
/// for text.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// A message authored by a sender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Store-assigned id.
    pub id: i64,
    /// Authoring entity.
    pub sender: EntityRef,
    /// Optional subject line.
    pub subject: Option<String>,
    /// Optional body text.
    pub body: Option<String>,
    /// Send state; only ever moves forward.
    pub state: SendState,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// When the sender hid the message from their own listings; `None` while
    /// visible. Recipients' copies are unaffected.
    pub hidden_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a new unsent message.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Validation`] if the subject or body is too large.
    pub fn new(
        id: i64,
        sender: EntityRef,
        subject: Option<String>,
        body: Option<String>,
    ) -> Result<Self, MessagingError> {
        validate_content(subject.as_deref(), body.as_deref())?;
        Ok(Self {
            id,
            sender,
            subject,
            body,
            state: SendState::Unsent,
            created_at: Utc::now(),
            hidden_at: None,
        })
    }

    /// Returns `true` once the message has been dispatched.
    pub fn is_sent(&self) -> bool {
        self.state == SendState::Sent
    }

    /// Mark the message as dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidTransition`] if the message was already sent.
    pub fn mark_sent(&mut self) -> Result<(), MessagingError> {
        if self.is_sent() {
            return Err(MessagingError::InvalidTransition {
                from: self.state.as_str().to_owned(),
                to: SendState::Sent.as_str().to_owned(),
            });
        }
        self.state = SendState::Sent;
        Ok(())
    }

    /// Hide the message from the sender's listings, stamped with `now`.
    ///
    /// An already-hidden message keeps its original timestamp.
    pub fn hide_at(&mut self, now: DateTime<Utc>) {
        if self.hidden_at.is_none() {
            self.hidden_at = Some(now);
        }
    }

    /// Make the message visible to its sender again.
    pub fn unhide(&mut self) {
        self.hidden_at = None;
    }

    /// Sender-side visibility, derived from `hidden_at`.
    pub fn visibility(&self) -> Visibility {
        if self.hidden_at.is_some() {
            Visibility::Hidden
        } else {
            Visibility::Visible
        }
    }
}

/// Check subject and body against the content size limits.
///
/// # Errors
///
/// Returns [`MessagingError::Validation`] naming the oversized field.
pub fn validate_content(subject: Option<&str>, body: Option<&str>) -> Result<(), MessagingError> {
    if let Some(subject) = subject {
        if subject.len() > MAX_SUBJECT_SIZE {
            return Err(MessagingError::Validation {
                field: "subject",
                reason: format!(
                    "{} bytes exceeds {MAX_SUBJECT_SIZE} byte limit",
                    subject.len()
                ),
            });
        }
    }
    if let Some(body) = body {
        if body.len() > MAX_BODY_SIZE {
            return Err(MessagingError::Validation {
                field: "body",
                reason: format!("{} bytes exceeds {MAX_BODY_SIZE} byte limit", body.len()),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A message together with every recipient attached to it.
///
/// Deleting the envelope's message removes all of its recipients with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// The owning message.
    pub message: Message,
    /// Its recipients, across all kinds.
    pub recipients: Vec<Recipient>,
}

impl Envelope {
    /// Wrap a message that has no recipients yet.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            recipients: Vec::new(),
        }
    }

    /// Recipients of one kind, in position order.
    pub fn recipients_of(&self, kind: RecipientKind) -> Vec<&Recipient> {
        let mut bucket: Vec<&Recipient> = self
            .recipients
            .iter()
            .filter(|r| r.kind == kind)
            .collect();
        bucket.sort_by_key(|r| r.position);
        bucket
    }

    /// Attach a new recipient at the end of its kind bucket.
    ///
    /// `id` is the identity the caller assigned to the new record.
    pub fn add_recipient(&mut self, id: i64, receiver: EntityRef, kind: RecipientKind) -> &Recipient {
        let mut recipient = Recipient::new(id, self.message.id, receiver, kind);
        ordering::assign_position(&self.recipients, &mut recipient);
        let index = self.recipients.len();
        self.recipients.push(recipient);
        &self.recipients[index]
    }

    /// Remove a recipient and close the gap it leaves in its bucket.
    ///
    /// Returns the removed recipient, or `None` if no recipient has that id.
    pub fn remove_recipient(&mut self, recipient_id: i64) -> Option<Recipient> {
        ordering::remove(&mut self.recipients, recipient_id)
    }

    /// Look up a recipient by id.
    pub fn recipient(&self, recipient_id: i64) -> Option<&Recipient> {
        self.recipients.iter().find(|r| r.id == recipient_id)
    }

    /// Pair one of this envelope's recipients with the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] if the id is not on this message.
    pub fn delivery(&self, recipient_id: i64) -> Result<Delivery<'_>, MessagingError> {
        let recipient = self
            .recipient(recipient_id)
            .ok_or(MessagingError::RecipientNotFound(recipient_id))?;
        Delivery::new(recipient, self)
    }
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// An unsaved, unsent message with its intended recipient lists.
///
/// Produced by forward/reply derivation or assembled by hand before saving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageDraft {
    /// Authoring entity.
    pub sender: EntityRef,
    /// Subject line.
    pub subject: Option<String>,
    /// Body text.
    pub body: Option<String>,
    /// Direct recipients in order.
    pub to: Vec<EntityRef>,
    /// Carbon-copy recipients in order.
    pub cc: Vec<EntityRef>,
    /// Blind carbon-copy recipients in order.
    pub bcc: Vec<EntityRef>,
}

impl MessageDraft {
    /// Start a draft with no recipients.
    pub fn new(sender: EntityRef, subject: Option<String>, body: Option<String>) -> Self {
        Self {
            sender,
            subject,
            body,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
        }
    }

    /// The list for one kind.
    pub fn list(&self, kind: RecipientKind) -> &[EntityRef] {
        match kind {
            RecipientKind::To => &self.to,
            RecipientKind::Cc => &self.cc,
            RecipientKind::Bcc => &self.bcc,
        }
    }

    /// Append a receiver to the list for `kind`.
    pub fn push(&mut self, kind: RecipientKind, receiver: EntityRef) {
        match kind {
            RecipientKind::To => self.to.push(receiver),
            RecipientKind::Cc => self.cc.push(receiver),
            RecipientKind::Bcc => self.bcc.push(receiver),
        }
    }

    /// Every `(kind, receiver)` pair, `to` first, then `cc`, then `bcc`.
    pub fn addressed(&self) -> impl Iterator<Item = (RecipientKind, &EntityRef)> {
        RecipientKind::ALL
            .into_iter()
            .flat_map(move |kind| self.list(kind).iter().map(move |r| (kind, r)))
    }

    /// Returns `true` if no receiver is addressed under any kind.
    pub fn has_no_recipients(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty()
    }
}
