use std::collections::BTreeMap;

use super::registry::ClassId;
use super::types::{FieldValue, ObjectId};

/// Flat record of one object: its stable id, its class, and the ordered
/// field values. Nested synchronizables appear as `FieldValue::Object`
/// references; the referenced object has its own record.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectState {
    pub id: ObjectId,
    pub class_id: ClassId,
    pub fields: Vec<FieldValue>,
}

/// Point-in-time capture of the whole reachable scene, flattened into an
/// id-keyed table. Immutable once sealed: applying a delta produces a new
/// snapshot, the base stays intact for late or duplicate deltas.
///
/// Timestamp 0 is reserved for the empty initial state; live snapshots are
/// stamped from 1 upward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub timestamp: u32,
    objects: BTreeMap<ObjectId, ObjectState>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeltaRecord {
    Added(ObjectState),
    Modified {
        id: ObjectId,
        class_id: ClassId,
        changes: Vec<(u8, FieldValue)>,
    },
    Removed {
        id: ObjectId,
        class_id: ClassId,
    },
}

/// Difference between two snapshots, sufficient to rebuild the newer one
/// from the older. `base_timestamp == 0` marks a full sync against the
/// empty initial state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDelta {
    pub base_timestamp: u32,
    pub timestamp: u32,
    pub records: Vec<DeltaRecord>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Snapshot {
    pub fn new(timestamp: u32) -> Self {
        Self {
            timestamp,
            objects: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, state: ObjectState) {
        self.objects.insert(state.id, state);
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectState> {
        self.objects.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<ObjectState> {
        self.objects.remove(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectState> {
        self.objects.values()
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Field-level difference from `base` to `next`. Unchanged objects are
    /// omitted entirely; changed ones carry only their changed slots.
    /// Comparison is exact, floats included.
    pub fn diff(base: &Snapshot, next: &Snapshot) -> SnapshotDelta {
        debug_assert!(
            base.timestamp != 0 || base.is_empty(),
            "timestamp 0 is reserved for the empty base"
        );

        let mut records = Vec::new();

        for state in next.objects() {
            match base.get(state.id) {
                None => records.push(DeltaRecord::Added(state.clone())),
                Some(old) => {
                    assert_eq!(
                        old.class_id, state.class_id,
                        "object {} changed class between snapshots",
                        state.id
                    );
                    assert_eq!(
                        old.fields.len(),
                        state.fields.len(),
                        "object {} changed field count between snapshots",
                        state.id
                    );
                    let changes: Vec<(u8, FieldValue)> = state
                        .fields
                        .iter()
                        .enumerate()
                        .filter(|(i, value)| old.fields[*i] != **value)
                        .map(|(i, value)| (i as u8, value.clone()))
                        .collect();
                    if !changes.is_empty() {
                        records.push(DeltaRecord::Modified {
                            id: state.id,
                            class_id: state.class_id,
                            changes,
                        });
                    }
                }
            }
        }

        for state in base.objects() {
            if !next.contains(state.id) {
                records.push(DeltaRecord::Removed {
                    id: state.id,
                    class_id: state.class_id,
                });
            }
        }

        SnapshotDelta {
            base_timestamp: base.timestamp,
            timestamp: next.timestamp,
            records,
        }
    }

    /// Rebuild the newer snapshot from `base` and a delta computed against
    /// it. The delta must have been computed against this exact base; the
    /// caller resolves the base from history before calling.
    pub fn apply(base: &Snapshot, delta: &SnapshotDelta) -> Snapshot {
        assert_eq!(
            base.timestamp, delta.base_timestamp,
            "delta base {} applied to snapshot {}",
            delta.base_timestamp, base.timestamp
        );

        let mut next = base.clone();
        next.timestamp = delta.timestamp;

        for record in &delta.records {
            match record {
                DeltaRecord::Added(state) => {
                    assert!(
                        !next.contains(state.id),
                        "added object {} already present",
                        state.id
                    );
                    next.insert(state.clone());
                }
                DeltaRecord::Modified {
                    id,
                    class_id,
                    changes,
                } => {
                    let state = next
                        .objects
                        .get_mut(id)
                        .unwrap_or_else(|| panic!("modified object {} not in base", id));
                    assert_eq!(
                        state.class_id, *class_id,
                        "modified object {} class mismatch",
                        id
                    );
                    for (index, value) in changes {
                        let slot = *index as usize;
                        assert!(
                            slot < state.fields.len(),
                            "field index {} out of range for object {}",
                            index,
                            id
                        );
                        state.fields[slot] = value.clone();
                    }
                }
                DeltaRecord::Removed { id, .. } => {
                    assert!(
                        next.remove(*id).is_some(),
                        "removed object {} not in base",
                        id
                    );
                }
            }
        }

        next
    }
}
