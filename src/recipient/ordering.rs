//! Dense positional ordering of recipients within a `(message, kind)` bucket.
//!
//! Positions in a bucket are always exactly `1..=N`. New recipients go to the
//! end; removing one shifts every later sibling down by one.

use crate::recipient::Recipient;
use crate::types::RecipientKind;

fn in_bucket(recipient: &Recipient, message_id: i64, kind: RecipientKind) -> bool {
    recipient.message_id == message_id && recipient.kind == kind
}

/// Position the next recipient in the bucket should take.
pub fn next_position(siblings: &[Recipient], message_id: i64, kind: RecipientKind) -> u32 {
    siblings
        .iter()
        .filter(|r| in_bucket(r, message_id, kind))
        .filter_map(|r| r.position)
        .max()
        .unwrap_or(0)
        .saturating_add(1)
}

/// Give `recipient` the next free position in its bucket.
pub fn assign_position(siblings: &[Recipient], recipient: &mut Recipient) {
    recipient.position = Some(next_position(siblings, recipient.message_id, recipient.kind));
}

/// Close the gap left by `removed` among its former siblings.
///
/// Returns how many siblings were shifted. A removed recipient that never had
/// a position leaves nothing to compact.
pub fn compact_after_removal(siblings: &mut [Recipient], removed: &Recipient) -> usize {
    let Some(gap) = removed.position else {
        return 0;
    };
    let mut shifted = 0_usize;
    for sibling in siblings
        .iter_mut()
        .filter(|r| r.id != removed.id && in_bucket(r, removed.message_id, removed.kind))
    {
        if let Some(position) = sibling.position.filter(|p| *p > gap) {
            sibling.position = Some(position.saturating_sub(1));
            shifted = shifted.saturating_add(1);
        }
    }
    shifted
}

/// Remove the recipient with `recipient_id` and compact its bucket.
pub fn remove(recipients: &mut Vec<Recipient>, recipient_id: i64) -> Option<Recipient> {
    let index = recipients.iter().position(|r| r.id == recipient_id)?;
    let removed = recipients.remove(index);
    compact_after_removal(recipients, &removed);
    Some(removed)
}

/// Returns `true` if the bucket's positions are exactly `1..=N`.
pub fn is_dense(recipients: &[Recipient], message_id: i64, kind: RecipientKind) -> bool {
    let mut positions: Vec<Option<u32>> = recipients
        .iter()
        .filter(|r| in_bucket(r, message_id, kind))
        .map(|r| r.position)
        .collect();
    positions.sort_unstable();
    positions
        .iter()
        .zip(1_u32..)
        .all(|(position, expected)| *position == Some(expected))
}
