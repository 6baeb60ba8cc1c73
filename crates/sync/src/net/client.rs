use std::sync::Arc;

use super::history::SnapshotHistory;
use super::reader::SceneReader;
use super::registry::ClassRegistry;
use super::snapshot::Snapshot;
use super::stats::SyncStats;
use super::sync::Synchronizable;
use super::wire::{Serializer, WireError};

/// Replica endpoint. Decodes an incoming delta, rebuilds the new snapshot
/// on top of the cached base, and mutates the live scene to match. A delta
/// whose base is no longer in history is dropped whole — the scene stays on
/// its last good state and catches up on the next delta the server bases on
/// something this client still holds.
pub struct ReplicationClient {
    reader: SceneReader,
    serializer: Serializer,
    history: SnapshotHistory,
    stats: SyncStats,
}

impl ReplicationClient {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self::with_history_capacity(registry, SnapshotHistory::DEFAULT_CAPACITY)
    }

    pub fn with_history_capacity(registry: Arc<ClassRegistry>, capacity: usize) -> Self {
        Self {
            reader: SceneReader::new(registry.clone()),
            serializer: Serializer::new(registry),
            history: SnapshotHistory::new(capacity),
            stats: SyncStats::default(),
        }
    }

    /// Applies one delta payload to the scene. Returns the new snapshot's
    /// timestamp on success — the caller acknowledges it through its back
    /// channel — or `None` when the delta was undeliverable.
    pub fn update(
        &mut self,
        scene: &mut dyn Synchronizable,
        payload: &[u8],
    ) -> Result<Option<u32>, WireError> {
        self.stats.deltas_received += 1;
        self.stats.bytes_received += payload.len() as u64;
        let delta = self.serializer.read(payload)?;

        let base = if delta.base_timestamp == 0 {
            Snapshot::default()
        } else {
            match self.history.get(delta.base_timestamp) {
                Some(base) => base.clone(),
                None => {
                    log::warn!(
                        "no snapshot with timestamp {} in history, dropping delta {}",
                        delta.base_timestamp,
                        delta.timestamp
                    );
                    self.stats.deltas_dropped += 1;
                    return Ok(None);
                }
            }
        };

        let snapshot = Snapshot::apply(&base, &delta);
        let timestamp = snapshot.timestamp;
        self.reader.apply(scene, &snapshot);

        self.history.insert(snapshot);
        self.history.prune_before(delta.base_timestamp);
        self.stats.deltas_applied += 1;
        Ok(Some(timestamp))
    }

    /// The newest snapshot this client holds.
    pub fn latest_timestamp(&self) -> Option<u32> {
        self.history.latest().map(|s| s.timestamp)
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }
}
