//! Per-document storage for `xsl:key` indexes.
//!
//! The tree only stores indexes; building them is the job of whoever owns the key
//! definitions. A slot moves from empty to "under construction" to "built". A thread that
//! finds a slot under construction by another thread waits for it; finding it under
//! construction by itself means the key's definition is circular.

use crate::names::NameId;
use crate::node::NodeId;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

/// A built index: key value to matching nodes in document order.
#[derive(Debug, Default, Clone)]
pub struct KeyIndex {
    entries: HashMap<String, Vec<NodeId>>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` under `value`, skipping it if it is already the last entry there.
    pub fn insert(&mut self, value: String, node: NodeId) {
        let list = self.entries.entry(value).or_default();
        if list.last() != Some(&node) {
            list.push(node);
        }
    }

    /// Puts every list into document order. Definitions sharing a name may interleave.
    pub fn finish(&mut self) {
        for list in self.entries.values_mut() {
            list.sort_unstable();
            list.dedup();
        }
    }

    pub fn get(&self, value: &str) -> &[NodeId] {
        self.entries.get(value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum Slot {
    UnderConstruction(ThreadId),
    Built(Arc<KeyIndex>),
}

type SlotKey = (u64, NameId);

#[derive(Default)]
pub struct KeyIndexSlots {
    slots: Mutex<HashMap<SlotKey, Slot>>,
    ready: Condvar,
}

/// Outcome of asking for an index.
pub enum IndexClaim<'a> {
    Ready(Arc<KeyIndex>),
    /// The caller must build the index and publish it through the guard.
    Build(IndexBuildGuard<'a>),
    /// The calling thread is already building this index.
    Circular,
}

impl KeyIndexSlots {
    /// `owner` identifies the set of key definitions (one per compiled stylesheet).
    pub fn claim(&self, owner: u64, key: NameId) -> IndexClaim<'_> {
        let slot_key = (owner, key);
        let me = thread::current().id();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let builder = match slots.get(&slot_key) {
                Some(Slot::Built(index)) => return IndexClaim::Ready(Arc::clone(index)),
                Some(Slot::UnderConstruction(thread)) => *thread,
                None => {
                    slots.insert(slot_key, Slot::UnderConstruction(me));
                    return IndexClaim::Build(IndexBuildGuard {
                        slots: self,
                        key: slot_key,
                        published: false,
                    });
                }
            };
            if builder == me {
                return IndexClaim::Circular;
            }
            slots = self
                .ready
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn is_built(&self, owner: u64, key: NameId) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(slots.get(&(owner, key)), Some(Slot::Built(_)))
    }
}

/// Held while an index is being built. Dropping it unpublished releases the slot.
pub struct IndexBuildGuard<'a> {
    slots: &'a KeyIndexSlots,
    key: SlotKey,
    published: bool,
}

impl IndexBuildGuard<'_> {
    pub fn publish(mut self, mut index: KeyIndex) -> Arc<KeyIndex> {
        index.finish();
        let index = Arc::new(index);
        let mut slots = self
            .slots
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.insert(self.key, Slot::Built(Arc::clone(&index)));
        self.published = true;
        self.slots.ready.notify_all();
        index
    }
}

impl Drop for IndexBuildGuard<'_> {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let mut slots = self
            .slots
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.remove(&self.key);
        self.slots.ready.notify_all();
    }
}
