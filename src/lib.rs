//! Mailroom — multi-recipient messaging for account-like entities.
//!
//! Any entity can send a message to receivers addressed as `to`, `cc` or
//! `bcc`. Each receiver gets their own copy with an independent read state
//! and visibility, and any copy can be forwarded or replied to.
//!
//! The pure core ([`message`], [`recipient`], [`derive`]) decides every state
//! transition and ordering rule; [`store`] persists it in SQLite.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod derive;
pub mod error;
pub mod logging;
pub mod message;
pub mod recipient;
pub mod store;
pub mod types;

pub use error::MessagingError;
pub use message::{Envelope, Message, MessageDraft};
pub use recipient::{Delivery, Recipient, ViewOutcome};
pub use store::MessageStore;
pub use types::{EntityRef, ReadState, RecipientKind, SendState, Visibility};
