//! Core value types shared by messages, recipients and the store.
//!
//! Every enum here is persisted as lowercase text, so each carries an
//! `as_str`/`parse` pair mirroring the SQLite representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MessagingError;

// ---------------------------------------------------------------------------
// Entity references
// ---------------------------------------------------------------------------

/// Opaque reference to an account-like entity (a sender or a receiver).
///
/// The messaging core never looks inside the referenced entity. Two references
/// are the same party when both the type tag and the id match.
///
/// Serialized as its `type:id` text, and deserialized through the same checks
/// as [`EntityRef::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityRef {
    kind: String,
    id: i64,
}

impl EntityRef {
    /// Build a reference from a type tag (e.g. `"user"`) and an id.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Validation`] if the tag is blank or contains `:`.
    pub fn new(kind: impl Into<String>, id: i64) -> Result<Self, MessagingError> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(MessagingError::Validation {
                field: "entity_type",
                reason: "must not be blank".to_owned(),
            });
        }
        if kind.contains(':') {
            return Err(MessagingError::Validation {
                field: "entity_type",
                reason: format!("{kind:?} must not contain ':'"),
            });
        }
        Ok(Self { kind, id })
    }

    /// The type tag of the referenced entity.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The id of the referenced entity within its type.
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = MessagingError;

    /// Parse the `type:id` form produced by [`Display`](fmt::Display).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.rsplit_once(':').ok_or_else(|| MessagingError::Validation {
            field: "entity",
            reason: format!("{s:?} is not in type:id form"),
        })?;
        let id = id.parse::<i64>().map_err(|_| MessagingError::Validation {
            field: "entity",
            reason: format!("{id:?} is not a numeric id"),
        })?;
        Self::new(kind, id)
    }
}

impl TryFrom<String> for EntityRef {
    type Error = MessagingError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityRef> for String {
    fn from(entity: EntityRef) -> Self {
        entity.to_string()
    }
}

// ---------------------------------------------------------------------------
// Recipient kind
// ---------------------------------------------------------------------------

/// Category a recipient was addressed under. Positions are ranked per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    /// Direct recipient.
    To,
    /// Carbon copy.
    Cc,
    /// Blind carbon copy.
    Bcc,
}

impl RecipientKind {
    /// All kinds in display order.
    pub const ALL: [RecipientKind; 3] = [Self::To, Self::Cc, Self::Bcc];

    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::To => "to",
            Self::Cc => "cc",
            Self::Bcc => "bcc",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised kind.
    pub fn parse(s: &str) -> Result<Self, MessagingError> {
        match s {
            "to" => Ok(Self::To),
            "cc" => Ok(Self::Cc),
            "bcc" => Ok(Self::Bcc),
            other => Err(MessagingError::InvalidValue {
                field: "kind",
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// State axes
// ---------------------------------------------------------------------------

/// Whether a message has been dispatched. Moves `Unsent -> Sent` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    /// Still a draft.
    Unsent,
    /// Dispatched to its recipients.
    Sent,
}

impl SendState {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsent => "unsent",
            Self::Sent => "sent",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised send state.
    pub fn parse(s: &str) -> Result<Self, MessagingError> {
        match s {
            "unsent" => Ok(Self::Unsent),
            "sent" => Ok(Self::Sent),
            other => Err(MessagingError::InvalidValue {
                field: "message state",
                value: other.to_owned(),
            }),
        }
    }
}

/// Read axis of a recipient's copy. `Read` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadState {
    /// Not yet viewed.
    Unread,
    /// Viewed after the message was sent.
    Read,
}

impl ReadState {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised read state.
    pub fn parse(s: &str) -> Result<Self, MessagingError> {
        match s {
            "unread" => Ok(Self::Unread),
            "read" => Ok(Self::Read),
            other => Err(MessagingError::InvalidValue {
                field: "recipient state",
                value: other.to_owned(),
            }),
        }
    }
}

/// Visibility axis of a recipient's copy.
///
/// Never stored directly: it is derived from whether `hidden_at` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Shown in the receiver's inbox.
    Visible,
    /// Hidden from the receiver's inbox only.
    Hidden,
}
