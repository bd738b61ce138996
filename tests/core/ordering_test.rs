//! Tests for `src/recipient/ordering.rs` — dense positions per bucket.

use mailroom::message::{Envelope, Message};
use mailroom::recipient::ordering::{compact_after_removal, is_dense, next_position, remove};
use mailroom::recipient::Recipient;
use mailroom::{EntityRef, RecipientKind};

fn user(id: i64) -> EntityRef {
    EntityRef::new("user", id).expect("valid entity ref")
}

fn envelope() -> Envelope {
    let msg = Message::new(1, user(1), None, None).expect("message should build");
    Envelope::new(msg)
}

fn positions(envelope: &Envelope, kind: RecipientKind) -> Vec<(i64, Option<u32>)> {
    envelope
        .recipients_of(kind)
        .iter()
        .map(|r| (r.id, r.position))
        .collect()
}

#[test]
fn empty_bucket_starts_at_one() {
    assert_eq!(next_position(&[], 1, RecipientKind::To), 1);
}

#[test]
fn next_position_ignores_other_messages_and_kinds() {
    let mut a = Recipient::new(1, 1, user(2), RecipientKind::To);
    a.position = Some(3);
    let mut b = Recipient::new(2, 2, user(3), RecipientKind::Cc);
    b.position = Some(9);
    let siblings = vec![a, b];

    assert_eq!(next_position(&siblings, 1, RecipientKind::To), 4);
    assert_eq!(next_position(&siblings, 1, RecipientKind::Cc), 1);
    assert_eq!(next_position(&siblings, 2, RecipientKind::Cc), 10);
}

#[test]
fn removing_middle_shifts_later_siblings_down() {
    let mut env = envelope();
    for id in 10..13 {
        env.add_recipient(id, user(id), RecipientKind::To);
    }

    let removed = env.remove_recipient(11).expect("recipient exists");
    assert_eq!(removed.position, Some(2));
    assert_eq!(positions(&env, RecipientKind::To), vec![(10, Some(1)), (12, Some(2))]);
}

#[test]
fn removing_first_and_last_keeps_bucket_dense() {
    let mut env = envelope();
    for id in 10..14 {
        env.add_recipient(id, user(id), RecipientKind::To);
    }

    env.remove_recipient(10).expect("first exists");
    assert_eq!(
        positions(&env, RecipientKind::To),
        vec![(11, Some(1)), (12, Some(2)), (13, Some(3))]
    );

    env.remove_recipient(13).expect("last exists");
    assert_eq!(positions(&env, RecipientKind::To), vec![(11, Some(1)), (12, Some(2))]);
}

#[test]
fn removal_leaves_other_kinds_alone() {
    let mut env = envelope();
    env.add_recipient(10, user(2), RecipientKind::To);
    env.add_recipient(11, user(3), RecipientKind::Cc);
    env.add_recipient(12, user(4), RecipientKind::Cc);

    env.remove_recipient(10).expect("exists");
    assert_eq!(positions(&env, RecipientKind::Cc), vec![(11, Some(1)), (12, Some(2))]);
}

#[test]
fn unpositioned_removal_shifts_nothing() {
    let mut sibling = Recipient::new(1, 1, user(2), RecipientKind::To);
    sibling.position = Some(2);
    let removed = Recipient::new(2, 1, user(3), RecipientKind::To);

    let mut siblings = vec![sibling];
    assert_eq!(compact_after_removal(&mut siblings, &removed), 0);
    assert_eq!(siblings[0].position, Some(2));
}

#[test]
fn remove_unknown_id_returns_none() {
    let mut recipients = vec![Recipient::new(1, 1, user(2), RecipientKind::To)];
    assert!(remove(&mut recipients, 42).is_none());
    assert_eq!(recipients.len(), 1);
}

#[test]
fn mixed_adds_and_removes_stay_dense() {
    let mut env = envelope();
    let mut next_id = 100_i64;
    let script: &[(bool, RecipientKind)] = &[
        (true, RecipientKind::To),
        (true, RecipientKind::To),
        (true, RecipientKind::Cc),
        (true, RecipientKind::To),
        (false, RecipientKind::To),
        (true, RecipientKind::Cc),
        (true, RecipientKind::To),
        (false, RecipientKind::Cc),
        (true, RecipientKind::Bcc),
        (false, RecipientKind::To),
    ];

    for (add, kind) in script {
        if *add {
            env.add_recipient(next_id, user(next_id), *kind);
            next_id += 1;
        } else {
            let first = env.recipients_of(*kind).first().map(|r| r.id);
            if let Some(id) = first {
                env.remove_recipient(id);
            }
        }
        for kind in RecipientKind::ALL {
            assert!(is_dense(&env.recipients, 1, kind), "{kind} bucket has a gap");
        }
    }

    assert_eq!(env.recipients_of(RecipientKind::To).len(), 2);
    assert_eq!(env.recipients_of(RecipientKind::Cc).len(), 1);
    assert_eq!(env.recipients_of(RecipientKind::Bcc).len(), 1);
}

#[test]
fn gap_is_not_dense() {
    let mut a = Recipient::new(1, 1, user(2), RecipientKind::To);
    a.position = Some(1);
    let mut b = Recipient::new(2, 1, user(3), RecipientKind::To);
    b.position = Some(3);
    assert!(!is_dense(&[a, b], 1, RecipientKind::To));
}
