//! Forward, reply and reply-to-all.
//!
//! Each derivation reads a [`Delivery`] and returns a brand-new
//! [`MessageDraft`] authored by the delivery's receiver. The source message and
//! its recipients are never touched.

use crate::message::MessageDraft;
use crate::recipient::{Delivery, Recipient};
use crate::types::EntityRef;

fn draft_from(delivery: &Delivery<'_>) -> MessageDraft {
    MessageDraft::new(
        delivery.receiver().clone(),
        delivery.subject().map(str::to_owned),
        delivery.body().map(str::to_owned),
    )
}

/// Forward the message: same subject and body, no recipients yet.
pub fn forward(delivery: &Delivery<'_>) -> MessageDraft {
    draft_from(delivery)
}

/// Reply to the original sender only.
pub fn reply(delivery: &Delivery<'_>) -> MessageDraft {
    let mut draft = draft_from(delivery);
    draft.to.push(delivery.sender().clone());
    draft
}

/// Reply to the sender and every other recipient.
///
/// `to` keeps the original direct recipients in position order and appends
/// the original sender; `cc` and `bcc` carry over as they were. The replying
/// receiver is dropped from all three lists.
pub fn reply_to_all(delivery: &Delivery<'_>) -> MessageDraft {
    let acting = delivery.receiver();
    let mut draft = reply(delivery);

    let mut to: Vec<EntityRef> = Vec::new();
    let originals = delivery.to();
    let candidates = originals
        .iter()
        .map(|r| &r.receiver)
        .chain(std::iter::once(delivery.sender()));
    for candidate in candidates {
        if candidate != acting && !to.contains(candidate) {
            to.push(candidate.clone());
        }
    }

    draft.to = to;
    draft.cc = without(&delivery.cc(), acting);
    draft.bcc = without(&delivery.bcc(), acting);
    draft
}

fn without(recipients: &[&Recipient], acting: &EntityRef) -> Vec<EntityRef> {
    recipients
        .iter()
        .map(|r| &r.receiver)
        .filter(|receiver| *receiver != acting)
        .cloned()
        .collect()
}
