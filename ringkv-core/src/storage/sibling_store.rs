use crate::error::Result;
use crate::object::SiblingSet;
use crate::ring::PartitionId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Address of one storage slot: the key's partition plus the key itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub partition: PartitionId,
    pub key: String,
}

impl SlotKey {
    pub fn new(partition: PartitionId, key: impl Into<String>) -> Self {
        Self {
            partition,
            key: key.into(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.key)
    }
}

type Slot = Arc<Mutex<Option<SiblingSet>>>;

/// Process-local sibling sets, one slot per key.
///
/// Each slot has its own mutex so the read-merge-write of a put is atomic
/// per key while writes to other keys proceed independently.
#[derive(Default)]
pub struct SiblingStore {
    slots: RwLock<HashMap<SlotKey, Slot>>,
}

impl SiblingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, slot_key: &SlotKey) -> Option<SiblingSet> {
        let slot = self.slots.read().await.get(slot_key).cloned()?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Applies `merge` to the current contents and stores its output.
    ///
    /// `merge` sees an empty set when nothing is stored yet. If it fails the
    /// slot keeps its previous contents.
    pub async fn update<F>(&self, slot_key: &SlotKey, merge: F) -> Result<SiblingSet>
    where
        F: FnOnce(&SiblingSet) -> Result<SiblingSet>,
    {
        let slot = self.slot(slot_key).await;
        let mut guard = slot.lock().await;

        let empty = SiblingSet::new();
        let current = guard.as_ref().unwrap_or(&empty);
        let next = merge(current)?;

        *guard = Some(next.clone());
        Ok(next)
    }

    /// Overwrites a slot without merging.
    pub async fn replace(&self, slot_key: &SlotKey, siblings: SiblingSet) {
        let slot = self.slot(slot_key).await;
        *slot.lock().await = Some(siblings);
    }

    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        let mut stored = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                stored += 1;
            }
        }
        stored
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot(&self, slot_key: &SlotKey) -> Slot {
        if let Some(slot) = self.slots.read().await.get(slot_key) {
            return slot.clone();
        }

        let mut slots = self.slots.write().await;
        slots
            .entry(slot_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}
