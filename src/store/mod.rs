//! SQLite persistence for messages and recipients.
//!
//! The [`MessageStore`] is the durable home of every [`Message`] and
//! [`Recipient`]. Each public operation runs inside a single transaction:
//!
//! - adding a recipient computes `MAX(position) + 1` and inserts in one
//!   statement, with the unique `(message_id, kind, position)` index as a
//!   backstop that surfaces as [`MessagingError::Conflict`];
//! - deleting a recipient and compacting its siblings commit together, so no
//!   reader ever sees a gap or a duplicate position;
//! - `mark_sent`, `view`, `hide` and `unhide` are one conditional `UPDATE`
//!   each, guarded the same way as the pure methods on [`Message`] and
//!   [`Recipient`]. When the guard matches nothing, the current rows are read
//!   back and the pure method explains why.
//!
//! Every transaction writes before it reads, so SQLite takes the write lock
//! up front and waits out `busy_timeout` instead of failing on a lock
//! upgrade. Contention that outlasts the timeout surfaces as
//! [`MessagingError::Busy`].

mod rows;

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, trace, warn};

use self::rows::{
    format_timestamp, message_from_row, recipient_from_row, MessageRow, RecipientRow,
    MESSAGE_COLUMNS, RECIPIENT_COLUMNS, RECIPIENT_RETURNING,
};
use crate::config::DatabaseConfig;
use crate::derive;
use crate::error::MessagingError;
use crate::message::{validate_content, Envelope, Message, MessageDraft};
use crate::recipient::{list_visible, Recipient, ViewOutcome};
use crate::types::{EntityRef, ReadState, RecipientKind, SendState};

/// Schema migration, applied idempotently on open.
const SCHEMA_SQL: &str = include_str!("../../migrations/001_schema.sql");

/// Orders a recipient listing by kind (`to`, `cc`, `bcc`) and then position.
const KIND_POSITION_ORDER: &str =
    "ORDER BY CASE r.kind WHEN 'to' THEN 0 WHEN 'cc' THEN 1 ELSE 2 END, r.position";

/// Durable store for messages and their recipients.
#[derive(Debug, Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Open (or create) the database described by `config` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migration fails.
    pub async fn open(config: &DatabaseConfig) -> anyhow::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .foreign_keys(true)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {}", config.path.display()))?;

        Self::from_pool(pool)
            .await
            .context("failed to apply mailroom schema migration")
    }

    /// Wrap an existing pool and apply the schema.
    ///
    /// The pool must have foreign keys enabled for message deletion to cascade.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Database`] if the migration fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MessagingError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        info!("message store ready");
        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
        info!("message store closed");
    }

    // -- Messages --

    /// Create a new unsent message.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Validation`] if the subject or body is too large,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn create_message(
        &self,
        sender: &EntityRef,
        subject: Option<&str>,
        body: Option<&str>,
    ) -> Result<Message, MessagingError> {
        let mut conn = self.pool.acquire().await?;
        insert_message(&mut conn, sender, subject, body).await
    }

    /// Mark a message as sent. Happens exactly once per message.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidTransition`] if the message was already sent,
    /// [`MessagingError::MessageNotFound`] if it does not exist,
    /// [`MessagingError::Busy`] under lock contention,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn mark_sent(&self, message_id: i64) -> Result<Message, MessagingError> {
        let sent: Option<MessageRow> = sqlx::query_as(&format!(
            "UPDATE messages SET state = ?1, updated_at = ?2 WHERE id = ?3 AND state = ?4 \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(SendState::Sent.as_str())
        .bind(format_timestamp(Utc::now()))
        .bind(message_id)
        .bind(SendState::Unsent.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = sent {
            debug!(message_id, "message sent");
            return message_from_row(row);
        }

        let mut current = self.load_message(message_id).await?;
        current.mark_sent()?;
        // Unreachable unless the row went back to unsent, which nothing does.
        Err(MessagingError::InvalidTransition {
            from: SendState::Unsent.as_str().to_owned(),
            to: SendState::Sent.as_str().to_owned(),
        })
    }

    /// Hide a message from its sender's sent and unsent listings.
    ///
    /// Recipients' copies are untouched. Hiding an already-hidden message keeps
    /// its original `hidden_at`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::MessageNotFound`] if no message matches,
    /// [`MessagingError::Busy`] under lock contention,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn hide_message(&self, message_id: i64) -> Result<Message, MessagingError> {
        self.set_message_hidden_at(message_id, Some(Utc::now())).await
    }

    /// Return a hidden message to its sender's listings.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::MessageNotFound`] if no message matches,
    /// [`MessagingError::Busy`] under lock contention,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn unhide_message(&self, message_id: i64) -> Result<Message, MessagingError> {
        self.set_message_hidden_at(message_id, None).await
    }

    /// `Some(now)` hides unless already hidden; `None` unhides.
    async fn set_message_hidden_at(
        &self,
        message_id: i64,
        now: Option<DateTime<Utc>>,
    ) -> Result<Message, MessagingError> {
        let row: MessageRow = sqlx::query_as(&format!(
            "UPDATE messages SET hidden_at = CASE WHEN ?1 IS NULL THEN NULL \
                                               ELSE COALESCE(hidden_at, ?1) END \
             WHERE id = ?2 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(now.map(format_timestamp))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(MessagingError::MessageNotFound(message_id))?;

        let message = message_from_row(row)?;
        trace!(
            message_id,
            visibility = ?message.visibility(),
            "message visibility updated"
        );
        Ok(message)
    }

    /// Load a message by id.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::MessageNotFound`] if no message matches,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn load_message(&self, message_id: i64) -> Result<Message, MessagingError> {
        let mut conn = self.pool.acquire().await?;
        fetch_message(&mut conn, message_id).await
    }

    /// Delete a message together with all of its recipients.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::MessageNotFound`] if no message matches,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn delete_message(&self, message_id: i64) -> Result<(), MessagingError> {
        let deleted = sqlx::query("DELETE FROM messages WHERE id = ?1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(MessagingError::MessageNotFound(message_id));
        }
        debug!(message_id, "message deleted");
        Ok(())
    }

    /// Load a message and all of its recipients.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::MessageNotFound`] if no message matches,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn load_envelope(&self, message_id: i64) -> Result<Envelope, MessagingError> {
        let mut tx = self.pool.begin().await?;
        let envelope = fetch_envelope(&mut tx, message_id).await?;
        tx.commit().await?;
        Ok(envelope)
    }

    /// Sent messages authored by `sender` and not hidden by them, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Database`] on SQLite failure.
    pub async fn sent_messages(&self, sender: &EntityRef) -> Result<Vec<Message>, MessagingError> {
        self.messages_by(sender, SendState::Sent).await
    }

    /// Unsent drafts authored by `sender` and not hidden by them, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Database`] on SQLite failure.
    pub async fn unsent_messages(
        &self,
        sender: &EntityRef,
    ) -> Result<Vec<Message>, MessagingError> {
        self.messages_by(sender, SendState::Unsent).await
    }

    async fn messages_by(
        &self,
        sender: &EntityRef,
        state: SendState,
    ) -> Result<Vec<Message>, MessagingError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE sender_type = ?1 AND sender_id = ?2 AND state = ?3 AND hidden_at IS NULL \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(sender.kind())
        .bind(sender.id())
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    // -- Recipients --

    /// Attach a receiver to a message at the end of its kind bucket.
    ///
    /// Allowed whether or not the message has been sent.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Conflict`] if a concurrent writer took the same
    /// position, [`MessagingError::MessageNotFound`] if the message does not
    /// exist, or [`MessagingError::Database`] on SQLite failure.
    pub async fn add_recipient(
        &self,
        message_id: i64,
        receiver: &EntityRef,
        kind: RecipientKind,
    ) -> Result<Recipient, MessagingError> {
        let mut tx = self.pool.begin().await?;
        let recipient = insert_recipient(&mut tx, message_id, receiver, kind).await?;
        tx.commit().await?;
        Ok(recipient)
    }

    /// Load a recipient by id.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] if no recipient matches,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn load_recipient(&self, recipient_id: i64) -> Result<Recipient, MessagingError> {
        let mut conn = self.pool.acquire().await?;
        fetch_recipient(&mut conn, recipient_id).await
    }

    /// All recipients of a message, ordered by kind then position.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Database`] on SQLite failure.
    pub async fn recipients_for(&self, message_id: i64) -> Result<Vec<Recipient>, MessagingError> {
        let mut conn = self.pool.acquire().await?;
        fetch_recipients(&mut conn, message_id).await
    }

    /// Fire the `view` event on a recipient.
    ///
    /// A copy of an unsent message is left unread and reported as
    /// [`ViewOutcome::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] or
    /// [`MessagingError::MessageNotFound`] if either record is gone,
    /// [`MessagingError::Busy`] under lock contention,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn view(&self, recipient_id: i64) -> Result<ViewOutcome, MessagingError> {
        loop {
            let updated = sqlx::query(
                "UPDATE message_recipients SET state = ?1 \
                 WHERE id = ?2 AND state = ?3 AND EXISTS ( \
                     SELECT 1 FROM messages m \
                     WHERE m.id = message_recipients.message_id AND m.state = ?4)",
            )
            .bind(ReadState::Read.as_str())
            .bind(recipient_id)
            .bind(ReadState::Unread.as_str())
            .bind(SendState::Sent.as_str())
            .execute(&self.pool)
            .await?;
            if updated.rows_affected() > 0 {
                trace!(recipient_id, "recipient read");
                return Ok(ViewOutcome::Read);
            }

            let mut tx = self.pool.begin().await?;
            let mut recipient = fetch_recipient(&mut tx, recipient_id).await?;
            let message = fetch_message(&mut tx, recipient.message_id).await?;
            tx.commit().await?;

            match recipient.view(&message)? {
                ViewOutcome::AlreadyRead => {
                    trace!(recipient_id, "recipient already read");
                    return Ok(ViewOutcome::AlreadyRead);
                }
                ViewOutcome::Rejected(reason) => {
                    debug!(recipient_id, message_id = message.id, ?reason, "view rejected");
                    return Ok(ViewOutcome::Rejected(reason));
                }
                // Sent between the update and the read; the next update lands.
                ViewOutcome::Read => continue,
            }
        }
    }

    /// Hide a recipient's copy from their inbox.
    ///
    /// Hiding an already-hidden copy keeps its original `hidden_at`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] if no recipient matches,
    /// [`MessagingError::Busy`] under lock contention,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn hide(&self, recipient_id: i64) -> Result<Recipient, MessagingError> {
        self.set_hidden_at(recipient_id, Some(Utc::now())).await
    }

    /// Make a recipient's copy visible again.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] if no recipient matches,
    /// [`MessagingError::Busy`] under lock contention,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn unhide(&self, recipient_id: i64) -> Result<Recipient, MessagingError> {
        self.set_hidden_at(recipient_id, None).await
    }

    /// `Some(now)` hides unless already hidden; `None` unhides.
    async fn set_hidden_at(
        &self,
        recipient_id: i64,
        now: Option<DateTime<Utc>>,
    ) -> Result<Recipient, MessagingError> {
        let row: RecipientRow = sqlx::query_as(&format!(
            "UPDATE message_recipients SET hidden_at = CASE WHEN ?1 IS NULL THEN NULL \
                                                         ELSE COALESCE(hidden_at, ?1) END \
             WHERE id = ?2 RETURNING {RECIPIENT_RETURNING}"
        ))
        .bind(now.map(format_timestamp))
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(MessagingError::RecipientNotFound(recipient_id))?;

        let recipient = recipient_from_row(row)?;
        trace!(
            recipient_id,
            visibility = ?recipient.visibility(),
            "recipient visibility updated"
        );
        Ok(recipient)
    }

    /// Delete a recipient and shift its later siblings down by one.
    ///
    /// Both effects commit together.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] if no recipient matches,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn delete_recipient(&self, recipient_id: i64) -> Result<(), MessagingError> {
        let mut tx = self.pool.begin().await?;

        let removed: Option<(i64, String, Option<u32>)> = sqlx::query_as(
            "DELETE FROM message_recipients WHERE id = ?1 RETURNING message_id, kind, position",
        )
        .bind(recipient_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (message_id, kind, position) =
            removed.ok_or(MessagingError::RecipientNotFound(recipient_id))?;
        let kind = RecipientKind::parse(&kind)?;

        let shifted = match position {
            Some(gap) => compact_bucket(&mut tx, message_id, kind, gap).await?,
            None => 0,
        };

        tx.commit().await?;
        debug!(
            recipient_id,
            message_id,
            kind = kind.as_str(),
            shifted,
            "recipient deleted"
        );
        Ok(())
    }

    /// Every copy addressed to `receiver` on sent messages, hidden ones
    /// included, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Database`] on SQLite failure.
    pub async fn received(&self, receiver: &EntityRef) -> Result<Vec<Recipient>, MessagingError> {
        let rows: Vec<RecipientRow> = sqlx::query_as(&format!(
            "SELECT {RECIPIENT_COLUMNS} FROM message_recipients r \
             JOIN messages m ON m.id = r.message_id \
             WHERE r.receiver_type = ?1 AND r.receiver_id = ?2 AND m.state = ?3 \
             ORDER BY m.created_at DESC, r.id DESC"
        ))
        .bind(receiver.kind())
        .bind(receiver.id())
        .bind(SendState::Sent.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(recipient_from_row).collect()
    }

    /// Visible copies addressed to `receiver` on sent messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Database`] on SQLite failure.
    pub async fn inbox(&self, receiver: &EntityRef) -> Result<Vec<Recipient>, MessagingError> {
        let received = self.received(receiver).await?;
        Ok(list_visible(&received).into_iter().cloned().collect())
    }

    // -- Derivation --

    /// Draft a forward of the message behind `recipient_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] if no recipient matches,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn forward(&self, recipient_id: i64) -> Result<MessageDraft, MessagingError> {
        let envelope = self.envelope_for_recipient(recipient_id).await?;
        Ok(derive::forward(&envelope.delivery(recipient_id)?))
    }

    /// Draft a reply to the sender of the message behind `recipient_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] if no recipient matches,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn reply(&self, recipient_id: i64) -> Result<MessageDraft, MessagingError> {
        let envelope = self.envelope_for_recipient(recipient_id).await?;
        Ok(derive::reply(&envelope.delivery(recipient_id)?))
    }

    /// Draft a reply to everyone on the message behind `recipient_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::RecipientNotFound`] if no recipient matches,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn reply_to_all(&self, recipient_id: i64) -> Result<MessageDraft, MessagingError> {
        let envelope = self.envelope_for_recipient(recipient_id).await?;
        Ok(derive::reply_to_all(&envelope.delivery(recipient_id)?))
    }

    /// Persist a draft as a new unsent message with its recipients.
    ///
    /// Recipients are added in list order, so each kind keeps the draft's order
    /// as its positions.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Validation`] if the content is too large,
    /// [`MessagingError::Conflict`] on a concurrent position race,
    /// or [`MessagingError::Database`] on SQLite failure.
    pub async fn save_draft(&self, draft: &MessageDraft) -> Result<Envelope, MessagingError> {
        let mut tx = self.pool.begin().await?;
        let message = insert_message(
            &mut tx,
            &draft.sender,
            draft.subject.as_deref(),
            draft.body.as_deref(),
        )
        .await?;

        let mut envelope = Envelope::new(message);
        for (kind, receiver) in draft.addressed() {
            let recipient = insert_recipient(&mut tx, envelope.message.id, receiver, kind).await?;
            envelope.recipients.push(recipient);
        }

        tx.commit().await?;
        debug!(
            message_id = envelope.message.id,
            recipients = envelope.recipients.len(),
            "draft saved"
        );
        Ok(envelope)
    }

    async fn envelope_for_recipient(&self, recipient_id: i64) -> Result<Envelope, MessagingError> {
        let mut tx = self.pool.begin().await?;
        let recipient = fetch_recipient(&mut tx, recipient_id).await?;
        let envelope = fetch_envelope(&mut tx, recipient.message_id).await?;
        tx.commit().await?;
        Ok(envelope)
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

async fn insert_message(
    conn: &mut SqliteConnection,
    sender: &EntityRef,
    subject: Option<&str>,
    body: Option<&str>,
) -> Result<Message, MessagingError> {
    validate_content(subject, body)?;
    let now = Utc::now();
    let stamp = format_timestamp(now);

    let result = sqlx::query(
        "INSERT INTO messages (sender_type, sender_id, subject, body, state, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
    )
    .bind(sender.kind())
    .bind(sender.id())
    .bind(subject)
    .bind(body)
    .bind(SendState::Unsent.as_str())
    .bind(&stamp)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    trace!(message_id = id, sender = %sender, "message created");
    Ok(Message {
        id,
        sender: sender.clone(),
        subject: subject.map(str::to_owned),
        body: body.map(str::to_owned),
        state: SendState::Unsent,
        created_at: now,
        hidden_at: None,
    })
}

/// Insert a recipient at `MAX(position) + 1` of its bucket in one statement.
async fn insert_recipient(
    conn: &mut SqliteConnection,
    message_id: i64,
    receiver: &EntityRef,
    kind: RecipientKind,
) -> Result<Recipient, MessagingError> {
    let inserted: Result<(i64, Option<u32>), sqlx::Error> = sqlx::query_as(
        "INSERT INTO message_recipients \
             (message_id, receiver_type, receiver_id, kind, position, state) \
         SELECT ?1, ?2, ?3, ?4, COALESCE(MAX(position), 0) + 1, 'unread' \
         FROM message_recipients WHERE message_id = ?1 AND kind = ?4 \
         RETURNING id, position",
    )
    .bind(message_id)
    .bind(receiver.kind())
    .bind(receiver.id())
    .bind(kind.as_str())
    .fetch_one(&mut *conn)
    .await;

    let (id, position) = inserted.map_err(|err| classify_insert_error(err, message_id, kind))?;
    trace!(
        recipient_id = id,
        message_id,
        kind = kind.as_str(),
        ?position,
        "recipient added"
    );

    let mut recipient = Recipient::new(id, message_id, receiver.clone(), kind);
    recipient.position = position;
    Ok(recipient)
}

fn classify_insert_error(err: sqlx::Error, message_id: i64, kind: RecipientKind) -> MessagingError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            warn!(message_id, kind = kind.as_str(), "recipient position conflict");
            return MessagingError::Conflict {
                message_id,
                kind,
                position: None,
            };
        }
        if db_err.is_foreign_key_violation() {
            return MessagingError::MessageNotFound(message_id);
        }
    }
    MessagingError::from(err)
}

/// Shift every position above `gap` in the bucket down by one.
///
/// Goes through negated values first: SQLite checks the unique index row by
/// row, and rows are not visited in position order.
async fn compact_bucket(
    conn: &mut SqliteConnection,
    message_id: i64,
    kind: RecipientKind,
    gap: u32,
) -> Result<u64, MessagingError> {
    let shifted = sqlx::query(
        "UPDATE message_recipients SET position = -(position - 1) \
         WHERE message_id = ?1 AND kind = ?2 AND position > ?3",
    )
    .bind(message_id)
    .bind(kind.as_str())
    .bind(gap)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE message_recipients SET position = -position \
         WHERE message_id = ?1 AND kind = ?2 AND position < 0",
    )
    .bind(message_id)
    .bind(kind.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(shifted.rows_affected())
}

async fn fetch_message(
    conn: &mut SqliteConnection,
    message_id: i64,
) -> Result<Message, MessagingError> {
    let row: MessageRow = sqlx::query_as(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
    ))
    .bind(message_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(MessagingError::MessageNotFound(message_id))?;

    message_from_row(row)
}

async fn fetch_recipient(
    conn: &mut SqliteConnection,
    recipient_id: i64,
) -> Result<Recipient, MessagingError> {
    let row: RecipientRow = sqlx::query_as(&format!(
        "SELECT {RECIPIENT_COLUMNS} FROM message_recipients r WHERE r.id = ?1"
    ))
    .bind(recipient_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(MessagingError::RecipientNotFound(recipient_id))?;

    recipient_from_row(row)
}

async fn fetch_recipients(
    conn: &mut SqliteConnection,
    message_id: i64,
) -> Result<Vec<Recipient>, MessagingError> {
    let rows: Vec<RecipientRow> = sqlx::query_as(&format!(
        "SELECT {RECIPIENT_COLUMNS} FROM message_recipients r \
         WHERE r.message_id = ?1 {KIND_POSITION_ORDER}"
    ))
    .bind(message_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(recipient_from_row).collect()
}

async fn fetch_envelope(
    conn: &mut SqliteConnection,
    message_id: i64,
) -> Result<Envelope, MessagingError> {
    let message = fetch_message(conn, message_id).await?;
    let recipients = fetch_recipients(conn, message_id).await?;
    Ok(Envelope {
        message,
        recipients,
    })
}
