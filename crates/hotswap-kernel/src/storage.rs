//! Journaled dispatcher storage
//!
//! Every write records the value it overwrote. Rolling back to a checkpoint
//! replays the journal in reverse, so aborted invocations leave storage
//! exactly as they found it. Zero words are never stored.

use hotswap_module::Word;
use std::collections::BTreeMap;

/// Position in the undo journal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checkpoint(usize);

#[derive(Debug, Default)]
pub(crate) struct Storage {
    slots: BTreeMap<u64, Word>,
    journal: Vec<(u64, Option<Word>)>,
}

impl Storage {
    pub(crate) fn load(&self, slot: u64) -> Word {
        self.slots.get(&slot).copied().unwrap_or_default()
    }

    pub(crate) fn store(&mut self, slot: u64, value: Word) {
        let previous = if value.is_zero() {
            self.slots.remove(&slot)
        } else {
            self.slots.insert(slot, value)
        };
        self.journal.push((slot, previous));
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    pub(crate) fn revert_to(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.0 {
            let Some((slot, previous)) = self.journal.pop() else {
                break;
            };
            match previous {
                Some(value) => {
                    self.slots.insert(slot, value);
                }
                None => {
                    self.slots.remove(&slot);
                }
            }
        }
    }

    /// Forget undo history once a top-level invocation succeeds
    pub(crate) fn commit(&mut self) {
        self.journal.clear();
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<u64, Word> {
        self.slots.clone()
    }
}
