use super::snapshot::Snapshot;

/// Bounded ring of recent snapshots, indexed by timestamp. A new entry
/// overwrites whatever shared its slot, so the window slides forward on its
/// own; `prune_before` drops entries explicitly once a base has been
/// acknowledged.
#[derive(Debug)]
pub struct SnapshotHistory {
    snapshots: Vec<Option<Snapshot>>,
    capacity: usize,
}

impl SnapshotHistory {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        Self {
            snapshots: (0..capacity).map(|_| None).collect(),
            capacity,
        }
    }

    pub fn insert(&mut self, snapshot: Snapshot) {
        let index = (snapshot.timestamp as usize) % self.capacity;
        self.snapshots[index] = Some(snapshot);
    }

    pub fn get(&self, timestamp: u32) -> Option<&Snapshot> {
        let index = (timestamp as usize) % self.capacity;
        self.snapshots[index]
            .as_ref()
            .filter(|snap| snap.timestamp == timestamp)
    }

    pub fn prune_before(&mut self, timestamp: u32) {
        for slot in &mut self.snapshots {
            if slot.as_ref().is_some_and(|s| s.timestamp < timestamp) {
                *slot = None;
            }
        }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .filter_map(|s| s.as_ref())
            .max_by_key(|s| s.timestamp)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.snapshots {
            *slot = None;
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
