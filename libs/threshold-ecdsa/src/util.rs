//! Roster bookkeeping shared by the init exchange and the signing rounds.

use thiserror::Error;

/// A collected message list does not cover the group exactly once.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    /// Wrong number of messages.
    #[error("collected {got} messages, expected {expected}")]
    WrongCount {
        /// Messages received.
        got: usize,
        /// Group size.
        expected: usize,
    },
    /// A sender index is zero or beyond the group size.
    #[error("sender index {0} outside the group")]
    UnknownSender(u16),
    /// Two messages claim the same sender.
    #[error("duplicate message from sender {0}")]
    DuplicateSender(u16),
}

/// Order `items` by their 1-based index, requiring exactly one entry per
/// member of a group of `parties`.
pub(crate) fn ordered_by_index<T>(
    items: &[T],
    parties: u16,
    index_of: impl Fn(&T) -> u16,
) -> Result<Vec<&T>, RosterError> {
    if items.len() != usize::from(parties) {
        return Err(RosterError::WrongCount { got: items.len(), expected: usize::from(parties) });
    }
    let mut slots: Vec<Option<&T>> = vec![None; usize::from(parties)];
    for item in items {
        let index = index_of(item);
        if index == 0 || index > parties {
            return Err(RosterError::UnknownSender(index));
        }
        let slot = &mut slots[usize::from(index) - 1];
        if slot.is_some() {
            return Err(RosterError::DuplicateSender(index));
        }
        *slot = Some(item);
    }
    // Every slot is filled: the counts match and no slot was taken twice.
    Ok(slots.into_iter().flatten().collect())
}
