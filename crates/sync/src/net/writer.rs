use std::mem;
use std::sync::Arc;

use super::registry::{ClassId, ClassRegistry};
use super::snapshot::{ObjectState, Snapshot};
use super::sync::{SyncMode, Synchronizable, Synchronizer};
use super::types::{FieldFlags, FieldValue, ObjectId, WireType, NULL_OBJECT};

struct Frame {
    id: ObjectId,
    class_id: ClassId,
    fields: Vec<FieldValue>,
    index: usize,
}

/// Server-side pass: walks the live scene graph from its root, binds a
/// stable id to every reachable synchronizable, and flattens the graph into
/// a `Snapshot` of one record per object. Nested references are written as
/// ids; each child gets its own top-level record, depth-first, once per
/// pass.
///
/// Ids stick to their objects across passes. A fresh object takes the
/// lowest id the previous pass left unused, so ids stay small and are only
/// ever reused after their previous holder has disappeared.
pub struct SceneWriter {
    registry: Arc<ClassRegistry>,
    last: Snapshot,
    snapshot: Snapshot,
    stack: Vec<Frame>,
    next_free: u32,
}

impl SceneWriter {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            last: Snapshot::default(),
            snapshot: Snapshot::default(),
            stack: Vec::new(),
            next_free: 0,
        }
    }

    pub fn write_scene(&mut self, scene: &mut dyn Synchronizable, timestamp: u32) -> Snapshot {
        assert!(timestamp > 0, "timestamp 0 is reserved for the empty base");
        self.snapshot = Snapshot::new(timestamp);
        self.stack.clear();
        self.next_free = 0;

        let root_id = self.bind_id(scene);
        assert_eq!(root_id, 0, "scene root must bind object id 0");
        self.write_object(scene, root_id);

        let snapshot = mem::replace(&mut self.snapshot, Snapshot::default());
        self.last = snapshot.clone();
        snapshot
    }

    /// The snapshot produced by the previous pass.
    pub fn last_snapshot(&self) -> &Snapshot {
        &self.last
    }

    fn bind_id(&mut self, object: &mut dyn Synchronizable) -> ObjectId {
        if let Some(id) = object.object_id() {
            return id;
        }
        let id = self.find_free_id();
        object.set_object_id(Some(id));
        id
    }

    fn find_free_id(&mut self) -> ObjectId {
        while self.last.contains(self.next_free as ObjectId) {
            self.next_free += 1;
        }
        let id = self.next_free;
        self.next_free += 1;
        assert!(id < NULL_OBJECT as u32, "object id space exhausted");
        id as ObjectId
    }

    fn write_object(&mut self, object: &mut dyn Synchronizable, id: ObjectId) {
        assert!(
            !self.snapshot.contains(id),
            "object {} reached twice in one pass (shared objects are not supported)",
            id
        );
        let class_id = self.registry.class_id(object.class_name());
        self.stack.push(Frame {
            id,
            class_id,
            fields: Vec::new(),
            index: 0,
        });
        object.synchronize(self);
        let frame = self.stack.pop().expect("writer stack underflow");

        let expected = self.registry.get(frame.class_id).field_count();
        assert_eq!(
            frame.index,
            expected,
            "class '{}' traversal visited {} of {} fields",
            object.class_name(),
            frame.index,
            expected
        );

        self.snapshot.insert(ObjectState {
            id: frame.id,
            class_id: frame.class_id,
            fields: frame.fields,
        });
    }

    fn check_field(&self, ty: WireType, flags: FieldFlags) {
        let frame = self.stack.last().expect("field synchronized outside an object");
        self.registry.get(frame.class_id).check_field(frame.index, ty, flags);
    }

    fn push_field(&mut self, value: FieldValue) {
        let frame = self.stack.last_mut().expect("field synchronized outside an object");
        frame.fields.push(value);
        frame.index += 1;
    }
}

impl Synchronizer for SceneWriter {
    fn mode(&self) -> SyncMode {
        SyncMode::Write
    }

    fn sync_value(&mut self, value: FieldValue, ty: WireType, flags: FieldFlags) -> FieldValue {
        self.check_field(ty, flags);
        assert!(
            value.matches(ty, flags),
            "value {:?} does not match declared ({:?}, {:?})",
            value,
            ty,
            flags
        );
        self.push_field(value.clone());
        value
    }

    fn sync_object(
        &mut self,
        child: Option<Box<dyn Synchronizable>>,
    ) -> Option<Box<dyn Synchronizable>> {
        self.check_field(WireType::Object, FieldFlags::empty());
        match child {
            None => {
                self.push_field(FieldValue::Object(None));
                None
            }
            Some(mut child) => {
                let id = self.bind_id(&mut *child);
                self.push_field(FieldValue::Object(Some(id)));
                if !self.snapshot.contains(id) {
                    self.write_object(&mut *child, id);
                }
                Some(child)
            }
        }
    }

    fn sync_object_array(
        &mut self,
        mut children: Vec<Box<dyn Synchronizable>>,
    ) -> Vec<Box<dyn Synchronizable>> {
        self.check_field(WireType::Object, FieldFlags::ARRAY);

        let mut refs = Vec::with_capacity(children.len());
        for child in &mut children {
            let id = self.bind_id(&mut **child);
            refs.push(FieldValue::Object(Some(id)));
        }
        self.push_field(FieldValue::Array(refs));

        for child in &mut children {
            let id = child.object_id().expect("child id bound above");
            if !self.snapshot.contains(id) {
                self.write_object(&mut **child, id);
            }
        }
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::sync::SynchronizerExt;

    struct Leaf {
        id: Option<ObjectId>,
        value: u16,
    }

    impl Leaf {
        fn boxed(value: u16) -> Box<dyn Synchronizable> {
            Box::new(Leaf { id: None, value })
        }
    }

    impl Synchronizable for Leaf {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
        fn class_name(&self) -> &'static str {
            "Leaf"
        }
        fn object_id(&self) -> Option<ObjectId> {
            self.id
        }
        fn set_object_id(&mut self, id: Option<ObjectId>) {
            self.id = id;
        }
        fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
            self.value = sync.sync_u16(self.value);
        }
    }

    struct Root {
        id: Option<ObjectId>,
        counter: u32,
        items: Vec<Box<dyn Synchronizable>>,
    }

    impl Root {
        fn boxed() -> Box<dyn Synchronizable> {
            Box::new(Root {
                id: None,
                counter: 0,
                items: Vec::new(),
            })
        }
    }

    impl Synchronizable for Root {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
        fn class_name(&self) -> &'static str {
            "Root"
        }
        fn object_id(&self) -> Option<ObjectId> {
            self.id
        }
        fn set_object_id(&mut self, id: Option<ObjectId>) {
            self.id = id;
        }
        fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
            self.counter = sync.sync_u32(self.counter);
            self.items = sync.sync_object_array(std::mem::take(&mut self.items));
        }
    }

    fn registry() -> Arc<ClassRegistry> {
        let mut registry = ClassRegistry::new();
        registry.register(Root::boxed);
        registry.register(|| Leaf::boxed(0));
        Arc::new(registry)
    }

    #[test]
    fn test_flattens_graph_into_records() {
        let mut root = Root {
            id: None,
            counter: 3,
            items: vec![Leaf::boxed(10), Leaf::boxed(20)],
        };

        let mut writer = SceneWriter::new(registry());
        let snapshot = writer.write_scene(&mut root, 1);

        assert_eq!(snapshot.len(), 3);
        let record = snapshot.get(0).unwrap();
        assert_eq!(record.class_id, 0);
        assert_eq!(record.fields[0], FieldValue::UInt32(3));
        assert_eq!(
            record.fields[1],
            FieldValue::Array(vec![
                FieldValue::Object(Some(1)),
                FieldValue::Object(Some(2))
            ])
        );
        assert_eq!(snapshot.get(1).unwrap().fields[0], FieldValue::UInt16(10));
        assert_eq!(snapshot.get(2).unwrap().fields[0], FieldValue::UInt16(20));
    }

    #[test]
    fn test_ids_stay_stable_across_passes() {
        let mut root = Root {
            id: None,
            counter: 0,
            items: vec![Leaf::boxed(1), Leaf::boxed(2)],
        };

        let mut writer = SceneWriter::new(registry());
        writer.write_scene(&mut root, 1);
        let first_ids: Vec<_> = root.items.iter().map(|c| c.object_id()).collect();

        root.counter = 1;
        writer.write_scene(&mut root, 2);
        let second_ids: Vec<_> = root.items.iter().map(|c| c.object_id()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_freed_ids_are_reused_after_a_pass() {
        let mut root = Root {
            id: None,
            counter: 0,
            items: vec![Leaf::boxed(1), Leaf::boxed(2)],
        };

        let mut writer = SceneWriter::new(registry());
        writer.write_scene(&mut root, 1);

        // drop leaf id 1, keep id 2
        root.items.remove(0);
        writer.write_scene(&mut root, 2);

        // id 1 is free again now that a pass completed without it
        root.items.push(Leaf::boxed(3));
        writer.write_scene(&mut root, 3);
        assert_eq!(root.items[1].object_id(), Some(1));
    }
}
