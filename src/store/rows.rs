//! Raw SQLite row shapes and their conversion into domain types.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::MessagingError;
use crate::message::Message;
use crate::recipient::Recipient;
use crate::types::{EntityRef, ReadState, RecipientKind, SendState};

/// Column list matching [`MessageRow`].
pub(crate) const MESSAGE_COLUMNS: &str =
    "id, sender_type, sender_id, subject, body, state, created_at, hidden_at";

/// Column list matching [`RecipientRow`], qualified with the `r` alias.
pub(crate) const RECIPIENT_COLUMNS: &str =
    "r.id, r.message_id, r.receiver_type, r.receiver_id, r.kind, r.position, r.state, r.hidden_at";

/// Unqualified [`RECIPIENT_COLUMNS`], for `RETURNING` clauses.
pub(crate) const RECIPIENT_RETURNING: &str =
    "id, message_id, receiver_type, receiver_id, kind, position, state, hidden_at";

/// Raw row tuple from the `messages` table.
pub(crate) type MessageRow = (
    i64,
    String,
    i64,
    Option<String>,
    Option<String>,
    String,
    String,
    Option<String>,
);

/// Raw row tuple from the `message_recipients` table.
pub(crate) type RecipientRow = (
    i64,
    i64,
    String,
    i64,
    String,
    Option<u32>,
    String,
    Option<String>,
);

/// Format a timestamp the way every column stores it.
///
/// Fixed-width UTC with microseconds, so text ordering matches time ordering.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp.
pub(crate) fn parse_timestamp(field: &'static str, s: &str) -> Result<DateTime<Utc>, MessagingError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| MessagingError::InvalidValue {
            field,
            value: s.to_owned(),
        })
}

fn parse_optional_timestamp(
    field: &'static str,
    s: Option<&str>,
) -> Result<Option<DateTime<Utc>>, MessagingError> {
    s.map(|s| parse_timestamp(field, s)).transpose()
}

/// Convert a raw `messages` row into a [`Message`].
pub(crate) fn message_from_row(row: MessageRow) -> Result<Message, MessagingError> {
    let (id, sender_type, sender_id, subject, body, state, created_at, hidden_at) = row;
    Ok(Message {
        id,
        sender: EntityRef::new(sender_type, sender_id)?,
        subject,
        body,
        state: SendState::parse(&state)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        hidden_at: parse_optional_timestamp("hidden_at", hidden_at.as_deref())?,
    })
}

/// Convert a raw `message_recipients` row into a [`Recipient`].
pub(crate) fn recipient_from_row(row: RecipientRow) -> Result<Recipient, MessagingError> {
    let (id, message_id, receiver_type, receiver_id, kind, position, state, hidden_at) = row;
    Ok(Recipient {
        id,
        message_id,
        receiver: EntityRef::new(receiver_type, receiver_id)?,
        kind: RecipientKind::parse(&kind)?,
        position,
        state: ReadState::parse(&state)?,
        hidden_at: parse_optional_timestamp("hidden_at", hidden_at.as_deref())?,
    })
}
