//! Mailroom CLI entry point.
//!
//! Drives a [`MessageStore`] from the command line. Every command prints its
//! result as JSON on stdout.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use mailroom::config::Config;
use mailroom::logging::{self, LoggingGuard};
use mailroom::{EntityRef, MessageDraft, MessageStore, RecipientKind};

/// Mailroom — multi-recipient messaging with per-recipient state.
#[derive(Parser)]
#[command(name = "mailroom", version, about)]
struct Cli {
    /// Config file (defaults to `$MAILROOM_CONFIG` or `./mailroom.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Create the database and apply the schema.
    Init,
    /// Compose a new message.
    Compose {
        /// Authoring entity, as `type:id`.
        #[arg(long = "from")]
        sender: EntityRef,
        /// Subject line.
        #[arg(long)]
        subject: Option<String>,
        /// Body text.
        #[arg(long)]
        body: Option<String>,
        /// Receivers.
        #[command(flatten)]
        addresses: Addresses,
        /// Mark the message sent right away.
        #[arg(long)]
        send: bool,
    },
    /// Mark a message sent.
    Send {
        /// Message id.
        message_id: i64,
    },
    /// Show a message with all of its recipients.
    Show {
        /// Message id.
        message_id: i64,
    },
    /// Delete a message and all of its recipients.
    Delete {
        /// Message id.
        message_id: i64,
    },
    /// Hide a message from its sender's outbox and drafts.
    HideMessage {
        /// Message id.
        message_id: i64,
    },
    /// Return a hidden message to its sender's outbox and drafts.
    UnhideMessage {
        /// Message id.
        message_id: i64,
    },
    /// List visible copies received by an entity.
    Inbox {
        /// Receiving entity, as `type:id`.
        receiver: EntityRef,
        /// Include hidden copies.
        #[arg(long)]
        all: bool,
    },
    /// List messages authored by an entity.
    Outbox {
        /// Authoring entity, as `type:id`.
        sender: EntityRef,
        /// List unsent drafts instead of sent messages.
        #[arg(long)]
        drafts: bool,
    },
    /// Mark a recipient's copy read.
    View {
        /// Recipient id.
        recipient_id: i64,
    },
    /// Hide a recipient's copy from their inbox.
    Hide {
        /// Recipient id.
        recipient_id: i64,
    },
    /// Make a hidden copy visible again.
    Unhide {
        /// Recipient id.
        recipient_id: i64,
    },
    /// Remove a recipient from a message.
    Remove {
        /// Recipient id.
        recipient_id: i64,
    },
    /// Forward a received copy to new receivers.
    Forward {
        /// Recipient id of the copy being forwarded.
        recipient_id: i64,
        /// Receivers.
        #[command(flatten)]
        addresses: Addresses,
        /// Mark the forward sent right away.
        #[arg(long)]
        send: bool,
    },
    /// Reply to a received copy.
    Reply {
        /// Recipient id of the copy being replied to.
        recipient_id: i64,
        /// Reply to everyone on the original message.
        #[arg(long)]
        all: bool,
        /// Replacement body for the reply.
        #[arg(long)]
        body: Option<String>,
        /// Mark the reply sent right away.
        #[arg(long)]
        send: bool,
    },
}

/// Receivers grouped by kind, each given as `type:id`.
#[derive(Args)]
struct Addresses {
    /// Direct receivers.
    #[arg(long = "to")]
    to: Vec<EntityRef>,
    /// Carbon-copy receivers.
    #[arg(long = "cc")]
    cc: Vec<EntityRef>,
    /// Blind carbon-copy receivers.
    #[arg(long = "bcc")]
    bcc: Vec<EntityRef>,
}

impl Addresses {
    fn extend_draft(self, draft: &mut MessageDraft) {
        let grouped = [
            (RecipientKind::To, self.to),
            (RecipientKind::Cc, self.cc),
            (RecipientKind::Bcc, self.bcc),
        ];
        for (kind, receivers) in grouped {
            for receiver in receivers {
                draft.push(kind, receiver);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let _logging_guard = init_logging(&config)?;

    let store = MessageStore::open(&config.database)
        .await
        .context("failed to open message store")?;
    info!(path = %config.database.path.display(), "message store opened");

    let result = run(&store, cli.command).await;
    store.close().await;
    result
}

fn init_logging(config: &Config) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.logging.dir {
        Some(dir) => logging::init_production(dir, &config.logging.level).map(Some),
        None => logging::init_cli(&config.logging.level).map(|()| None),
    }
}

async fn run(store: &MessageStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init => print_json(&serde_json::json!({ "status": "ok" })),
        Command::Compose {
            sender,
            subject,
            body,
            addresses,
            send,
        } => {
            let mut draft = MessageDraft::new(sender, subject, body);
            addresses.extend_draft(&mut draft);
            save_and_maybe_send(store, &draft, send).await
        }
        Command::Send { message_id } => print_json(&store.mark_sent(message_id).await?),
        Command::Show { message_id } => print_json(&store.load_envelope(message_id).await?),
        Command::Delete { message_id } => {
            store.delete_message(message_id).await?;
            print_json(&serde_json::json!({ "deleted": message_id }))
        }
        Command::HideMessage { message_id } => print_json(&store.hide_message(message_id).await?),
        Command::UnhideMessage { message_id } => {
            print_json(&store.unhide_message(message_id).await?)
        }
        Command::Inbox { receiver, all } => {
            let copies = if all {
                store.received(&receiver).await?
            } else {
                store.inbox(&receiver).await?
            };
            print_json(&copies)
        }
        Command::Outbox { sender, drafts } => {
            let messages = if drafts {
                store.unsent_messages(&sender).await?
            } else {
                store.sent_messages(&sender).await?
            };
            print_json(&messages)
        }
        Command::View { recipient_id } => print_json(&store.view(recipient_id).await?),
        Command::Hide { recipient_id } => print_json(&store.hide(recipient_id).await?),
        Command::Unhide { recipient_id } => print_json(&store.unhide(recipient_id).await?),
        Command::Remove { recipient_id } => {
            store.delete_recipient(recipient_id).await?;
            print_json(&serde_json::json!({ "removed": recipient_id }))
        }
        Command::Forward {
            recipient_id,
            addresses,
            send,
        } => {
            let mut draft = store.forward(recipient_id).await?;
            addresses.extend_draft(&mut draft);
            save_and_maybe_send(store, &draft, send).await
        }
        Command::Reply {
            recipient_id,
            all,
            body,
            send,
        } => {
            let mut draft = if all {
                store.reply_to_all(recipient_id).await?
            } else {
                store.reply(recipient_id).await?
            };
            if body.is_some() {
                draft.body = body;
            }
            save_and_maybe_send(store, &draft, send).await
        }
    }
}

async fn save_and_maybe_send(
    store: &MessageStore,
    draft: &MessageDraft,
    send: bool,
) -> anyhow::Result<()> {
    let mut envelope = store.save_draft(draft).await?;
    if send {
        envelope.message = store.mark_sent(envelope.message.id).await?;
    }
    debug!(message_id = envelope.message.id, sent = send, "draft stored");
    print_json(&envelope)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
