//! Tests for `src/store/` — persistence, ordering and cascade behaviour.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use mailroom::recipient::ordering::is_dense;
use mailroom::recipient::{Rejection, ViewOutcome};
use mailroom::{
    EntityRef, MessageDraft, MessageStore, MessagingError, ReadState, RecipientKind, SendState,
    Visibility,
};

async fn setup_store() -> MessageStore {
    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("pool should connect");

    MessageStore::from_pool(pool)
        .await
        .expect("schema should apply")
}

fn user(id: i64) -> EntityRef {
    EntityRef::new("user", id).expect("valid entity ref")
}

fn positions(recipients: &[mailroom::Recipient], kind: RecipientKind) -> Vec<(i64, Option<u32>)> {
    recipients
        .iter()
        .filter(|r| r.kind == kind)
        .map(|r| (r.receiver.id(), r.position))
        .collect()
}

#[tokio::test]
async fn schema_applies_twice() {
    let store = setup_store().await;
    let again = MessageStore::from_pool(store.pool().clone()).await;
    assert!(again.is_ok(), "migration must be idempotent");
}

#[tokio::test]
async fn create_message_persists_unsent() {
    let store = setup_store().await;
    let created = store
        .create_message(&user(1), Some("Hello"), Some("World"))
        .await
        .expect("create should succeed");

    let loaded = store.load_message(created.id).await.expect("load");
    assert_eq!(loaded.sender, user(1));
    assert_eq!(loaded.subject.as_deref(), Some("Hello"));
    assert_eq!(loaded.body.as_deref(), Some("World"));
    assert_eq!(loaded.state, SendState::Unsent);
}

#[tokio::test]
async fn create_message_rejects_oversized_body() {
    let store = setup_store().await;
    let body = "x".repeat(mailroom::message::MAX_BODY_SIZE + 1);
    let err = store
        .create_message(&user(1), None, Some(&body))
        .await
        .expect_err("oversized body must fail");
    assert!(matches!(err, MessagingError::Validation { field: "body", .. }));
}

#[tokio::test]
async fn load_unknown_message_is_not_found() {
    let store = setup_store().await;
    let err = store.load_message(404).await.expect_err("must fail");
    assert!(matches!(err, MessagingError::MessageNotFound(404)));
}

#[tokio::test]
async fn add_recipient_appends_per_kind() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");

    let a = store.add_recipient(msg.id, &user(2), RecipientKind::To).await.expect("a");
    let c = store.add_recipient(msg.id, &user(4), RecipientKind::Cc).await.expect("c");
    let b = store.add_recipient(msg.id, &user(3), RecipientKind::To).await.expect("b");

    assert_eq!(a.position, Some(1));
    assert_eq!(b.position, Some(2));
    assert_eq!(c.position, Some(1));
    assert_eq!(a.state, ReadState::Unread);
    assert!(a.is_visible());
}

#[tokio::test]
async fn add_recipient_to_missing_message_fails() {
    let store = setup_store().await;
    let err = store
        .add_recipient(999, &user(2), RecipientKind::To)
        .await
        .expect_err("must fail");
    assert!(matches!(err, MessagingError::MessageNotFound(999)));
}

#[tokio::test]
async fn add_recipient_after_send_is_allowed() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    store.mark_sent(msg.id).await.expect("send");

    let late = store
        .add_recipient(msg.id, &user(2), RecipientKind::Bcc)
        .await
        .expect("late recipient");
    assert_eq!(late.position, Some(1));
}

#[tokio::test]
async fn recipients_for_orders_by_kind_then_position() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    for (id, kind) in [
        (2, RecipientKind::Bcc),
        (3, RecipientKind::To),
        (4, RecipientKind::Cc),
        (5, RecipientKind::To),
    ] {
        store.add_recipient(msg.id, &user(id), kind).await.expect("add");
    }

    let order: Vec<(RecipientKind, i64)> = store
        .recipients_for(msg.id)
        .await
        .expect("list")
        .iter()
        .map(|r| (r.kind, r.receiver.id()))
        .collect();
    assert_eq!(
        order,
        vec![
            (RecipientKind::To, 3),
            (RecipientKind::To, 5),
            (RecipientKind::Cc, 4),
            (RecipientKind::Bcc, 2),
        ]
    );
}

#[tokio::test]
async fn delete_recipient_compacts_bucket() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    let mut ids = Vec::new();
    for id in 2..=5 {
        let r = store.add_recipient(msg.id, &user(id), RecipientKind::To).await.expect("add");
        ids.push(r.id);
    }
    store.add_recipient(msg.id, &user(9), RecipientKind::Cc).await.expect("cc");

    // Middle, then first, then last.
    store.delete_recipient(ids[1]).await.expect("delete middle");
    let after = store.recipients_for(msg.id).await.expect("list");
    assert_eq!(
        positions(&after, RecipientKind::To),
        vec![(2, Some(1)), (4, Some(2)), (5, Some(3))]
    );

    store.delete_recipient(ids[0]).await.expect("delete first");
    store.delete_recipient(ids[3]).await.expect("delete last");
    let after = store.recipients_for(msg.id).await.expect("list");
    assert_eq!(positions(&after, RecipientKind::To), vec![(4, Some(1))]);
    assert_eq!(positions(&after, RecipientKind::Cc), vec![(9, Some(1))]);
}

#[tokio::test]
async fn delete_unknown_recipient_is_not_found() {
    let store = setup_store().await;
    let err = store.delete_recipient(77).await.expect_err("must fail");
    assert!(matches!(err, MessagingError::RecipientNotFound(77)));
}

#[tokio::test]
async fn positions_stay_dense_through_mixed_operations() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");

    for round in 0..4_i64 {
        for kind in RecipientKind::ALL {
            store
                .add_recipient(msg.id, &user(100 + round), kind)
                .await
                .expect("add");
        }
        let current = store.recipients_for(msg.id).await.expect("list");
        if let Some(first_to) = current.iter().find(|r| r.kind == RecipientKind::To) {
            store.delete_recipient(first_to.id).await.expect("delete");
        }

        let current = store.recipients_for(msg.id).await.expect("list");
        for kind in RecipientKind::ALL {
            assert!(is_dense(&current, msg.id, kind), "{kind} has a gap");
        }
    }
}

#[tokio::test]
async fn unique_position_index_rejects_duplicates() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    store.add_recipient(msg.id, &user(2), RecipientKind::To).await.expect("add");

    let dup = sqlx::query(
        "INSERT INTO message_recipients (message_id, receiver_type, receiver_id, kind, position, state) \
         VALUES (?1, 'user', 3, 'to', 1, 'unread')",
    )
    .bind(msg.id)
    .execute(store.pool())
    .await;
    let err = dup.expect_err("duplicate position must be rejected");
    let is_unique = err
        .as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation());
    assert!(is_unique, "expected unique violation, got {err}");
}

#[tokio::test]
async fn position_collision_surfaces_as_retryable_conflict() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    store.add_recipient(msg.id, &user(2), RecipientKind::Cc).await.expect("add");

    // Another writer slips a row into the slot this insert computed.
    sqlx::raw_sql(
        "CREATE TRIGGER steal_slot BEFORE INSERT ON message_recipients \
         WHEN NEW.receiver_id = 666 BEGIN \
             INSERT INTO message_recipients \
                 (message_id, receiver_type, receiver_id, kind, position, state) \
             VALUES (NEW.message_id, 'user', 7, NEW.kind, NEW.position, 'unread'); \
         END",
    )
    .execute(store.pool())
    .await
    .expect("trigger should install");

    let err = store
        .add_recipient(msg.id, &user(666), RecipientKind::Cc)
        .await
        .expect_err("slot was taken");
    assert!(
        matches!(
            err,
            MessagingError::Conflict {
                kind: RecipientKind::Cc,
                ..
            }
        ),
        "expected conflict, got {err}"
    );
    assert!(err.is_retryable());

    let cc = store.recipients_for(msg.id).await.expect("list");
    assert_eq!(cc.len(), 1, "failed insert must roll back");
    assert!(is_dense(&cc, msg.id, RecipientKind::Cc));
}

#[tokio::test]
async fn not_found_is_not_retryable() {
    let store = setup_store().await;
    let err = store.mark_sent(31).await.expect_err("must fail");
    assert!(matches!(err, MessagingError::MessageNotFound(31)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn delete_message_cascades_to_recipients() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    let r = store.add_recipient(msg.id, &user(2), RecipientKind::To).await.expect("add");

    store.delete_message(msg.id).await.expect("delete");

    assert!(store.recipients_for(msg.id).await.expect("list").is_empty());
    let err = store.load_recipient(r.id).await.expect_err("gone");
    assert!(matches!(err, MessagingError::RecipientNotFound(_)));
    let err = store.delete_message(msg.id).await.expect_err("second delete");
    assert!(matches!(err, MessagingError::MessageNotFound(_)));
}

#[tokio::test]
async fn mark_sent_is_one_way() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");

    let sent = store.mark_sent(msg.id).await.expect("first send");
    assert!(sent.is_sent());
    let err = store.mark_sent(msg.id).await.expect_err("second send");
    assert!(matches!(err, MessagingError::InvalidTransition { .. }));
    assert!(store.load_message(msg.id).await.expect("load").is_sent());
}

#[tokio::test]
async fn view_is_guarded_by_send_state() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    let r = store.add_recipient(msg.id, &user(2), RecipientKind::To).await.expect("add");

    let outcome = store.view(r.id).await.expect("view");
    assert_eq!(outcome, ViewOutcome::Rejected(Rejection::NotSent));
    assert_eq!(store.load_recipient(r.id).await.expect("load").state, ReadState::Unread);

    store.mark_sent(msg.id).await.expect("send");
    assert_eq!(store.view(r.id).await.expect("view"), ViewOutcome::Read);
    assert_eq!(store.view(r.id).await.expect("view"), ViewOutcome::AlreadyRead);
    assert_eq!(store.load_recipient(r.id).await.expect("load").state, ReadState::Read);
}

#[tokio::test]
async fn view_unknown_recipient_is_not_found() {
    let store = setup_store().await;
    let err = store.view(12).await.expect_err("must fail");
    assert!(matches!(err, MessagingError::RecipientNotFound(12)));
}

#[tokio::test]
async fn hide_and_unhide_persist() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    let r = store.add_recipient(msg.id, &user(2), RecipientKind::To).await.expect("add");

    store.hide(r.id).await.expect("hide");
    let loaded = store.load_recipient(r.id).await.expect("load");
    assert_eq!(loaded.visibility(), Visibility::Hidden);
    let first_stamp = loaded.hidden_at;
    assert!(first_stamp.is_some());

    let again = store.hide(r.id).await.expect("hide again");
    assert_eq!(again.hidden_at, first_stamp, "repeat hide keeps timestamp");

    store.unhide(r.id).await.expect("unhide");
    let loaded = store.load_recipient(r.id).await.expect("load");
    assert!(loaded.is_visible());
    assert!(loaded.hidden_at.is_none());
    assert_eq!(loaded.state, ReadState::Unread);
}

#[tokio::test]
async fn hide_unknown_recipient_is_not_found() {
    let store = setup_store().await;
    let err = store.hide(5).await.expect_err("must fail");
    assert!(matches!(err, MessagingError::RecipientNotFound(5)));
}

#[tokio::test]
async fn inbox_lists_visible_copies_of_sent_messages() {
    let store = setup_store().await;
    let sent = store.create_message(&user(1), Some("sent"), None).await.expect("create");
    let draft = store.create_message(&user(1), Some("draft"), None).await.expect("create");
    let hidden = store.create_message(&user(1), Some("hidden"), None).await.expect("create");

    let keep = store.add_recipient(sent.id, &user(2), RecipientKind::To).await.expect("add");
    store.add_recipient(draft.id, &user(2), RecipientKind::To).await.expect("add");
    let gone = store.add_recipient(hidden.id, &user(2), RecipientKind::Cc).await.expect("add");
    store.add_recipient(sent.id, &user(3), RecipientKind::To).await.expect("add");

    store.mark_sent(sent.id).await.expect("send");
    store.mark_sent(hidden.id).await.expect("send");
    store.hide(gone.id).await.expect("hide");

    let inbox: Vec<i64> = store
        .inbox(&user(2))
        .await
        .expect("inbox")
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(inbox, vec![keep.id]);

    let received = store.received(&user(2)).await.expect("received");
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn sent_and_unsent_listings_split_by_state() {
    let store = setup_store().await;
    let a = store.create_message(&user(1), Some("a"), None).await.expect("create");
    store.create_message(&user(1), Some("b"), None).await.expect("create");
    store.create_message(&user(2), Some("other"), None).await.expect("create");
    store.mark_sent(a.id).await.expect("send");

    let sent = store.sent_messages(&user(1)).await.expect("sent");
    let unsent = store.unsent_messages(&user(1)).await.expect("unsent");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject.as_deref(), Some("a"));
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].subject.as_deref(), Some("b"));
}

#[tokio::test]
async fn hidden_messages_drop_out_of_sender_listings() {
    let store = setup_store().await;
    let sent = store.create_message(&user(1), Some("sent"), None).await.expect("create");
    let draft = store.create_message(&user(1), Some("draft"), None).await.expect("create");
    let copy = store.add_recipient(sent.id, &user(2), RecipientKind::To).await.expect("add");
    store.mark_sent(sent.id).await.expect("send");

    let hidden = store.hide_message(sent.id).await.expect("hide sent");
    assert_eq!(hidden.visibility(), Visibility::Hidden);
    store.hide_message(draft.id).await.expect("hide draft");

    assert!(store.sent_messages(&user(1)).await.expect("sent").is_empty());
    assert!(store.unsent_messages(&user(1)).await.expect("unsent").is_empty());
    // The receiver's copy is independent of the sender's view.
    let inbox = store.inbox(&user(2)).await.expect("inbox");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].id, copy.id);

    let again = store.hide_message(sent.id).await.expect("hide again");
    assert_eq!(again.hidden_at, store.load_message(sent.id).await.expect("load").hidden_at);

    let shown = store.unhide_message(sent.id).await.expect("unhide");
    assert!(shown.hidden_at.is_none());
    assert_eq!(store.sent_messages(&user(1)).await.expect("sent").len(), 1);
    assert!(shown.is_sent(), "visibility does not touch send state");
}

#[tokio::test]
async fn hide_unknown_message_is_not_found() {
    let store = setup_store().await;
    let err = store.hide_message(8).await.expect_err("must fail");
    assert!(matches!(err, MessagingError::MessageNotFound(8)));
    let err = store.unhide_message(8).await.expect_err("must fail");
    assert!(matches!(err, MessagingError::MessageNotFound(8)));
}

#[tokio::test]
async fn entity_refs_compare_type_and_id() {
    let store = setup_store().await;
    let msg = store.create_message(&user(1), None, None).await.expect("create");
    let group = EntityRef::new("group", 2).expect("valid ref");
    store.add_recipient(msg.id, &group, RecipientKind::To).await.expect("add");
    store.mark_sent(msg.id).await.expect("send");

    assert!(store.inbox(&user(2)).await.expect("inbox").is_empty());
    assert_eq!(store.inbox(&group).await.expect("inbox").len(), 1);
}

#[tokio::test]
async fn save_draft_keeps_list_order_as_positions() {
    let store = setup_store().await;
    let mut draft = MessageDraft::new(user(1), Some("Plan".to_owned()), None);
    draft.push(RecipientKind::To, user(3));
    draft.push(RecipientKind::To, user(2));
    draft.push(RecipientKind::Bcc, user(4));

    let envelope = store.save_draft(&draft).await.expect("save");
    assert!(!envelope.message.is_sent());
    assert_eq!(
        positions(&envelope.recipients, RecipientKind::To),
        vec![(3, Some(1)), (2, Some(2))]
    );

    let loaded = store.load_envelope(envelope.message.id).await.expect("load");
    assert_eq!(loaded.recipients, envelope.recipients);
    assert_eq!(loaded.message.subject.as_deref(), Some("Plan"));
}

#[tokio::test]
async fn failed_draft_leaves_nothing_behind() {
    let store = setup_store().await;
    let draft = MessageDraft::new(user(1), Some("x".repeat(2_000)), None);
    let err = store.save_draft(&draft).await.expect_err("oversized subject");
    assert!(matches!(err, MessagingError::Validation { .. }));
    assert!(store.unsent_messages(&user(1)).await.expect("list").is_empty());
}

#[tokio::test]
async fn derivations_load_through_the_store() {
    let store = setup_store().await;
    let mut draft = MessageDraft::new(user(1), Some("Hi".to_owned()), Some("there".to_owned()));
    draft.push(RecipientKind::To, user(2));
    draft.push(RecipientKind::Cc, user(3));
    let envelope = store.save_draft(&draft).await.expect("save");
    let copy = envelope.recipients[0].id;

    let fwd = store.forward(copy).await.expect("forward");
    assert_eq!(fwd.sender, user(2));
    assert!(fwd.has_no_recipients());

    let rep = store.reply(copy).await.expect("reply");
    assert_eq!(rep.to, vec![user(1)]);

    let all = store.reply_to_all(copy).await.expect("reply all");
    assert_eq!(all.to, vec![user(1)]);
    assert_eq!(all.cc, vec![user(3)]);

    let err = store.forward(9_999).await.expect_err("unknown recipient");
    assert!(matches!(err, MessagingError::RecipientNotFound(9_999)));
}
