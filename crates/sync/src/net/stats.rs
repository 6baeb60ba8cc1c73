#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    pub snapshots_written: u64,
    pub deltas_sent: u64,
    pub deltas_received: u64,
    pub deltas_applied: u64,
    pub deltas_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}
