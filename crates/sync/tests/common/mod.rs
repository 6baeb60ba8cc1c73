#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Vec3;
use scenelink::{
    ClassRegistry, ObjectId, Snapshot, Synchronizable, Synchronizer, SynchronizerExt,
};

/// The minimal two-field class from the protocol's reference scenario.
pub struct Alpha {
    pub id: Option<ObjectId>,
    pub a: u8,
    pub b: Vec<f32>,
}

impl Alpha {
    pub fn new(a: u8, b: Vec<f32>) -> Self {
        Self { id: None, a, b }
    }

    pub fn boxed() -> Box<dyn Synchronizable> {
        Box::new(Self::new(0, Vec::new()))
    }
}

impl Synchronizable for Alpha {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn class_name(&self) -> &'static str {
        "Alpha"
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_object_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
        self.a = sync.sync_u8(self.a);
        self.b = sync.sync_f32_array(std::mem::take(&mut self.b));
    }
}

pub fn alpha_registry() -> Arc<ClassRegistry> {
    let mut registry = ClassRegistry::new();
    registry.register(Alpha::boxed);
    Arc::new(registry)
}

/// Scene root: a tick counter and a roster of actors.
pub struct World {
    pub id: Option<ObjectId>,
    pub tick: u32,
    pub actors: Vec<Box<dyn Synchronizable>>,
}

impl World {
    pub fn new() -> Self {
        Self {
            id: None,
            tick: 0,
            actors: Vec::new(),
        }
    }

    pub fn boxed() -> Box<dyn Synchronizable> {
        Box::new(Self::new())
    }
}

impl Synchronizable for World {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn class_name(&self) -> &'static str {
        "World"
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_object_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
        self.tick = sync.sync_u32(self.tick);
        self.actors = sync.sync_object_array(std::mem::take(&mut self.actors));
    }
}

pub struct Actor {
    pub id: Option<ObjectId>,
    pub health: u8,
    pub position: Vec3,
    pub tag: String,
    pub gadget: Option<Box<dyn Synchronizable>>,
}

impl Actor {
    pub fn new(health: u8, position: Vec3, tag: &str) -> Self {
        Self {
            id: None,
            health,
            position,
            tag: tag.to_owned(),
            gadget: None,
        }
    }

    pub fn boxed_empty() -> Box<dyn Synchronizable> {
        Box::new(Self::new(0, Vec3::ZERO, ""))
    }
}

impl Synchronizable for Actor {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn class_name(&self) -> &'static str {
        "Actor"
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_object_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
        self.health = sync.sync_u8(self.health);
        self.position = sync.sync_vec3(self.position);
        self.tag = sync.sync_str8(std::mem::take(&mut self.tag));
        self.gadget = sync.sync_object(self.gadget.take());
    }
}

pub struct Gadget {
    pub id: Option<ObjectId>,
    pub kind: u8,
    pub charge: u16,
}

impl Gadget {
    pub fn new(kind: u8, charge: u16) -> Self {
        Self {
            id: None,
            kind,
            charge,
        }
    }

    pub fn boxed_empty() -> Box<dyn Synchronizable> {
        Box::new(Self::new(0, 0))
    }
}

impl Synchronizable for Gadget {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn class_name(&self) -> &'static str {
        "Gadget"
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_object_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
        self.kind = sync.sync_u8(self.kind);
        self.charge = sync.sync_u16(self.charge);
    }
}

/// Per-class destroy counters so tests can assert the callback fired
/// exactly once per departed object.
#[derive(Default)]
pub struct DestroyCounts {
    pub actors: AtomicUsize,
    pub gadgets: AtomicUsize,
}

impl DestroyCounts {
    pub fn actors(&self) -> usize {
        self.actors.load(Ordering::SeqCst)
    }

    pub fn gadgets(&self) -> usize {
        self.gadgets.load(Ordering::SeqCst)
    }
}

/// World/Actor/Gadget registry. Registration order is part of the protocol:
/// both ends of a test must build it through this one function.
pub fn world_registry() -> (Arc<ClassRegistry>, Arc<DestroyCounts>) {
    let counts = Arc::new(DestroyCounts::default());
    let mut registry = ClassRegistry::new();
    registry.register(World::boxed);
    let actor_counts = counts.clone();
    registry.register_with_destroy(Actor::boxed_empty, move |_| {
        actor_counts.actors.fetch_add(1, Ordering::SeqCst);
    });
    let gadget_counts = counts.clone();
    registry.register_with_destroy(Gadget::boxed_empty, move |_| {
        gadget_counts.gadgets.fetch_add(1, Ordering::SeqCst);
    });
    (Arc::new(registry), counts)
}

/// The `(object id -> (class id, fields))` view two snapshots are compared
/// by; timestamps are allowed to differ.
pub fn record_view(snapshot: &Snapshot) -> Vec<(u16, u16, Vec<scenelink::FieldValue>)> {
    snapshot
        .objects()
        .map(|state| (state.id, state.class_id, state.fields.clone()))
        .collect()
}
