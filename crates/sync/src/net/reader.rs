use std::sync::Arc;

use super::registry::{ClassId, ClassRegistry};
use super::snapshot::Snapshot;
use super::sync::{SyncMode, Synchronizable, Synchronizer};
use super::types::{FieldFlags, FieldValue, ObjectId, WireType};

struct Frame {
    class_id: ClassId,
    fields: Vec<FieldValue>,
    index: usize,
}

/// Client-side pass: applies a `Snapshot` to the live scene graph in place.
/// Known objects are mutated so their identity survives across ticks;
/// unknown ids are instantiated through the class factory; objects that a
/// record no longer references are destroyed (callback first, then their
/// reachable children, then dropped), which releases their id for reuse.
pub struct SceneReader {
    registry: Arc<ClassRegistry>,
    snapshot: Snapshot,
    stack: Vec<Frame>,
}

impl SceneReader {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            snapshot: Snapshot::default(),
            stack: Vec::new(),
        }
    }

    pub fn apply(&mut self, scene: &mut dyn Synchronizable, snapshot: &Snapshot) {
        assert!(
            snapshot.contains(0),
            "snapshot has no record for the scene root"
        );
        match scene.object_id() {
            None => scene.set_object_id(Some(0)),
            Some(id) => assert_eq!(id, 0, "scene root must be object 0"),
        }

        self.snapshot = snapshot.clone();
        self.stack.clear();
        self.read_object(scene, 0);
        self.snapshot = Snapshot::default();
    }

    fn read_object(&mut self, object: &mut dyn Synchronizable, id: ObjectId) {
        let record = self
            .snapshot
            .get(id)
            .unwrap_or_else(|| panic!("snapshot has no record for object {}", id))
            .clone();
        let class_id = self.registry.class_id(object.class_name());
        assert_eq!(
            record.class_id,
            class_id,
            "object {} is a '{}' but its record says class {}",
            id,
            object.class_name(),
            record.class_id
        );

        self.stack.push(Frame {
            class_id,
            fields: record.fields,
            index: 0,
        });
        object.synchronize(self);
        let frame = self.stack.pop().expect("reader stack underflow");
        assert_eq!(
            frame.index,
            frame.fields.len(),
            "class '{}' traversal consumed {} of {} recorded fields",
            object.class_name(),
            frame.index,
            frame.fields.len()
        );
    }

    fn create_object(&self, id: ObjectId) -> Box<dyn Synchronizable> {
        let record = self
            .snapshot
            .get(id)
            .unwrap_or_else(|| panic!("snapshot has no record for object {}", id));
        let mut object = self.registry.get(record.class_id).create();
        object.set_object_id(Some(id));
        object
    }

    fn reconcile(
        &mut self,
        child: Option<Box<dyn Synchronizable>>,
        id: ObjectId,
    ) -> Box<dyn Synchronizable> {
        let mut child = match child {
            Some(existing) if existing.object_id() == Some(id) => existing,
            Some(mut replaced) => {
                destroy_object(&self.registry, &mut *replaced);
                self.create_object(id)
            }
            None => self.create_object(id),
        };
        self.read_object(&mut *child, id);
        child
    }

    fn check_field(&self, ty: WireType, flags: FieldFlags) {
        let frame = self.stack.last().expect("field synchronized outside an object");
        self.registry.get(frame.class_id).check_field(frame.index, ty, flags);
    }

    fn next_field(&mut self) -> FieldValue {
        let frame = self.stack.last_mut().expect("field synchronized outside an object");
        assert!(
            frame.index < frame.fields.len(),
            "record exhausted at field {}",
            frame.index
        );
        let value = frame.fields[frame.index].clone();
        frame.index += 1;
        value
    }
}

impl Synchronizer for SceneReader {
    fn mode(&self) -> SyncMode {
        SyncMode::Read
    }

    fn sync_value(&mut self, _value: FieldValue, ty: WireType, flags: FieldFlags) -> FieldValue {
        self.check_field(ty, flags);
        let value = self.next_field();
        assert!(
            value.matches(ty, flags),
            "recorded {:?} does not match declared ({:?}, {:?})",
            value,
            ty,
            flags
        );
        value
    }

    fn sync_object(
        &mut self,
        child: Option<Box<dyn Synchronizable>>,
    ) -> Option<Box<dyn Synchronizable>> {
        self.check_field(WireType::Object, FieldFlags::empty());
        let target = match self.next_field() {
            FieldValue::Object(target) => target,
            other => panic!("recorded {:?} where an object was declared", other),
        };

        match target {
            None => {
                if let Some(mut removed) = child {
                    destroy_object(&self.registry, &mut *removed);
                }
                None
            }
            Some(id) => Some(self.reconcile(child, id)),
        }
    }

    fn sync_object_array(
        &mut self,
        children: Vec<Box<dyn Synchronizable>>,
    ) -> Vec<Box<dyn Synchronizable>> {
        self.check_field(WireType::Object, FieldFlags::ARRAY);
        let ids: Vec<ObjectId> = match self.next_field() {
            FieldValue::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    FieldValue::Object(Some(id)) => id,
                    other => panic!("recorded {:?} inside an object array", other),
                })
                .collect(),
            other => panic!("recorded {:?} where an object array was declared", other),
        };

        let mut existing = children.into_iter();
        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            result.push(self.reconcile(existing.next(), id));
        }
        for mut leftover in existing {
            destroy_object(&self.registry, &mut *leftover);
        }
        result
    }
}

/// Runs the destroy callback for `object`, releases its id, then does the
/// same for every synchronizable it still references. The original only
/// notified the object itself and left its children to the garbage
/// collector; with owned children the whole subtree goes at once, so the
/// whole subtree gets notified.
fn destroy_object(registry: &Arc<ClassRegistry>, object: &mut dyn Synchronizable) {
    let class_id = registry.class_id(object.class_name());
    registry.get(class_id).destroy(object);
    object.set_object_id(None);

    let mut walker = DestroyWalker { registry };
    object.synchronize(&mut walker);
}

struct DestroyWalker<'a> {
    registry: &'a Arc<ClassRegistry>,
}

impl Synchronizer for DestroyWalker<'_> {
    fn mode(&self) -> SyncMode {
        SyncMode::Read
    }

    fn sync_value(&mut self, value: FieldValue, _ty: WireType, _flags: FieldFlags) -> FieldValue {
        value
    }

    fn sync_object(
        &mut self,
        child: Option<Box<dyn Synchronizable>>,
    ) -> Option<Box<dyn Synchronizable>> {
        if let Some(mut child) = child {
            destroy_object(self.registry, &mut *child);
        }
        None
    }

    fn sync_object_array(
        &mut self,
        children: Vec<Box<dyn Synchronizable>>,
    ) -> Vec<Box<dyn Synchronizable>> {
        for mut child in children {
            destroy_object(self.registry, &mut *child);
        }
        Vec::new()
    }
}
