use std::sync::Arc;

use super::history::SnapshotHistory;
use super::registry::ClassRegistry;
use super::snapshot::Snapshot;
use super::stats::SyncStats;
use super::sync::Synchronizable;
use super::wire::{Serializer, WireError};
use super::writer::SceneWriter;

/// One serialized delta addressed to one client, handed to the caller's
/// transport.
#[derive(Debug, Clone)]
pub struct ClientUpdate {
    pub client_id: u32,
    pub timestamp: u32,
    pub payload: Vec<u8>,
}

struct ClientData {
    history: SnapshotHistory,
    last_acked: u32,
}

impl ClientData {
    fn new(history_capacity: usize) -> Self {
        Self {
            history: SnapshotHistory::new(history_capacity),
            last_acked: 0,
        }
    }
}

/// Authoritative endpoint. Once per update interval it snapshots the scene,
/// diffs it per client against that client's last acknowledged snapshot
/// (or the empty base while none is acknowledged), and serializes the
/// deltas. Delivery is the caller's problem: the transport stays external.
pub struct ReplicationServer {
    writer: SceneWriter,
    serializer: Serializer,
    clients: Vec<ClientData>,
    history_capacity: usize,
    timestamp: u32,
    acc_time: f32,
    update_interval: f32,
    stats: SyncStats,
}

impl ReplicationServer {
    pub const DEFAULT_UPDATE_INTERVAL: f32 = 1.0 / 20.0;

    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self::with_interval(registry, Self::DEFAULT_UPDATE_INTERVAL)
    }

    pub fn with_interval(registry: Arc<ClassRegistry>, update_interval: f32) -> Self {
        assert!(update_interval > 0.0, "update interval must be positive");
        Self {
            writer: SceneWriter::new(registry.clone()),
            serializer: Serializer::new(registry),
            clients: Vec::new(),
            history_capacity: SnapshotHistory::DEFAULT_CAPACITY,
            timestamp: 0,
            acc_time: 0.0,
            update_interval,
            stats: SyncStats::default(),
        }
    }

    pub fn add_client(&mut self) -> u32 {
        let client_id = self.clients.len() as u32;
        self.clients.push(ClientData::new(self.history_capacity));
        client_id
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Marks `timestamp` as the newest snapshot this client is known to
    /// hold; later deltas for it are based there. Acknowledgements for
    /// timestamps the server no longer holds are ignored with a warning.
    pub fn acknowledge(&mut self, client_id: u32, timestamp: u32) {
        let Some(client) = self.clients.get_mut(client_id as usize) else {
            log::warn!("ack from unknown client {}", client_id);
            return;
        };
        if client.history.get(timestamp).is_none() {
            log::warn!(
                "client {} acked timestamp {} which is not in history",
                client_id,
                timestamp
            );
            return;
        }
        client.last_acked = timestamp;
        client.history.prune_before(timestamp);
    }

    /// Accumulates frame time and produces updates once per interval;
    /// between intervals it returns an empty list.
    pub fn update(
        &mut self,
        scene: &mut dyn Synchronizable,
        dt: f32,
    ) -> Result<Vec<ClientUpdate>, WireError> {
        self.acc_time += dt;
        if self.acc_time < self.update_interval {
            return Ok(Vec::new());
        }
        self.acc_time = 0.0;
        self.force_update(scene)
    }

    /// Snapshot, diff, and serialize for every client, bypassing the
    /// interval gate.
    pub fn force_update(
        &mut self,
        scene: &mut dyn Synchronizable,
    ) -> Result<Vec<ClientUpdate>, WireError> {
        self.timestamp += 1;
        let snapshot = self.writer.write_scene(scene, self.timestamp);
        self.stats.snapshots_written += 1;

        let mut updates = Vec::with_capacity(self.clients.len());
        for (index, client) in self.clients.iter_mut().enumerate() {
            let base = if client.last_acked == 0 {
                None
            } else {
                client.history.get(client.last_acked)
            };
            let delta = match base {
                Some(base) => Snapshot::diff(base, &snapshot),
                None => {
                    if client.last_acked != 0 {
                        // the acked base aged out of the ring while the
                        // client went quiet; start over from a full sync
                        log::warn!(
                            "acked snapshot {} fell out of history for client {}, resyncing",
                            client.last_acked,
                            index
                        );
                        client.last_acked = 0;
                    }
                    Snapshot::diff(&Snapshot::default(), &snapshot)
                }
            };

            let payload = self.serializer.write(&delta)?;
            self.stats.deltas_sent += 1;
            self.stats.bytes_sent += payload.len() as u64;

            client.history.insert(snapshot.clone());
            updates.push(ClientUpdate {
                client_id: index as u32,
                timestamp: snapshot.timestamp,
                payload,
            });
        }
        Ok(updates)
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }
}
