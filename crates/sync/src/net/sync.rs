use std::any::Any;
use std::mem;

use super::types::{FieldFlags, FieldValue, ObjectId, WireType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Write,
    Read,
}

/// An entity that can be replicated. `synchronize` must visit every field in
/// a fixed, unconditional order: order is the wire contract, and the class
/// descriptor harvested at registration is checked against every later
/// traversal.
pub trait Synchronizable {
    fn class_name(&self) -> &'static str;
    fn object_id(&self) -> Option<ObjectId>;
    fn set_object_id(&mut self, id: Option<ObjectId>);
    fn synchronize(&mut self, sync: &mut dyn Synchronizer);

    /// Concrete access for hosts that hold children behind the trait.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One traversal pass over a synchronizable. The same `synchronize` body
/// serves writing (record values) and reading (replay values) because every
/// hook takes the field value and hands one back.
pub trait Synchronizer {
    fn mode(&self) -> SyncMode;

    fn sync_value(&mut self, value: FieldValue, ty: WireType, flags: FieldFlags) -> FieldValue;

    fn sync_object(
        &mut self,
        child: Option<Box<dyn Synchronizable>>,
    ) -> Option<Box<dyn Synchronizable>>;

    fn sync_object_array(
        &mut self,
        children: Vec<Box<dyn Synchronizable>>,
    ) -> Vec<Box<dyn Synchronizable>>;
}

macro_rules! typed_sync {
    ($name:ident, $ty:ty, $variant:ident, $wire:ident) => {
        fn $name(&mut self, value: $ty) -> $ty {
            match self.sync_value(
                FieldValue::$variant(value),
                WireType::$wire,
                FieldFlags::empty(),
            ) {
                FieldValue::$variant(v) => v,
                other => panic!(
                    "synchronizer returned {:?} for a {} field",
                    other,
                    stringify!($wire)
                ),
            }
        }
    };
}

macro_rules! typed_sync_array {
    ($name:ident, $ty:ty, $variant:ident, $wire:ident) => {
        fn $name(&mut self, values: Vec<$ty>) -> Vec<$ty> {
            let wrapped = FieldValue::Array(values.into_iter().map(FieldValue::$variant).collect());
            match self.sync_value(wrapped, WireType::$wire, FieldFlags::ARRAY) {
                FieldValue::Array(items) => items
                    .into_iter()
                    .map(|v| match v {
                        FieldValue::$variant(v) => v,
                        other => panic!(
                            "synchronizer returned {:?} inside a {} array",
                            other,
                            stringify!($wire)
                        ),
                    })
                    .collect(),
                other => panic!("synchronizer returned {:?} for an array field", other),
            }
        }
    };
}

/// Typed wrappers over `sync_value` so `synchronize` bodies read like plain
/// field lists.
pub trait SynchronizerExt: Synchronizer {
    typed_sync!(sync_i8, i8, Int8, Int8);
    typed_sync!(sync_i16, i16, Int16, Int16);
    typed_sync!(sync_i32, i32, Int32, Int32);
    typed_sync!(sync_u8, u8, UInt8, UInt8);
    typed_sync!(sync_u16, u16, UInt16, UInt16);
    typed_sync!(sync_u32, u32, UInt32, UInt32);
    typed_sync!(sync_f32, f32, Float32, Float32);
    typed_sync!(sync_vec3, glam::Vec3, Vec3, Vec3);
    typed_sync!(sync_mtx4, glam::Affine3A, Mtx4, Mtx4);
    typed_sync!(sync_char8, u8, Char8, Char8);
    typed_sync!(sync_str8, String, Str8, Str8);
    typed_sync!(sync_char16, char, Char16, Char16);
    typed_sync!(sync_str16, String, Str16, Str16);

    typed_sync_array!(sync_u8_array, u8, UInt8, UInt8);
    typed_sync_array!(sync_u16_array, u16, UInt16, UInt16);
    typed_sync_array!(sync_u32_array, u32, UInt32, UInt32);
    typed_sync_array!(sync_f32_array, f32, Float32, Float32);
    typed_sync_array!(sync_vec3_array, glam::Vec3, Vec3, Vec3);

    /// Unit-direction field: same storage as `sync_vec3` but flagged so the
    /// wire layer may quantize it.
    fn sync_normal(&mut self, value: glam::Vec3) -> glam::Vec3 {
        match self.sync_value(
            FieldValue::Vec3(value),
            WireType::Vec3,
            FieldFlags::NORMAL_VECTOR,
        ) {
            FieldValue::Vec3(v) => v,
            other => panic!("synchronizer returned {:?} for a normal field", other),
        }
    }
}

impl<S: Synchronizer + ?Sized> SynchronizerExt for S {}

/// Linear recording of one write pass, replayable by a read pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueBuffer(pub(crate) Vec<FieldValue>);

impl ValueBuffer {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }
}

/// Generic record/replay pass over an object graph. WRITE records every
/// synchronized value into a linear buffer in call order; READ replays the
/// buffer in the same order. It carries no class registry, so replay cannot
/// create objects: the graph shape must match the recorded one.
pub struct GraphSynchronizer {
    mode: SyncMode,
    values: Vec<FieldValue>,
    cursor: usize,
}

impl Default for GraphSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphSynchronizer {
    pub fn new() -> Self {
        Self {
            mode: SyncMode::Write,
            values: Vec::new(),
            cursor: 0,
        }
    }

    /// The two parameters are mutually exclusive by design: WRITE starts
    /// from an empty buffer, READ consumes a previously recorded one.
    pub fn reset(&mut self, mode: SyncMode, buffer: Option<ValueBuffer>) {
        assert!(
            (mode == SyncMode::Write && buffer.is_none())
                || (mode == SyncMode::Read && buffer.is_some()),
            "reset({:?}) with {} buffer",
            mode,
            if buffer.is_some() { "a" } else { "no" }
        );
        self.mode = mode;
        self.values = buffer.map(|b| b.0).unwrap_or_default();
        self.cursor = 0;
    }

    pub fn run(&mut self, root: &mut dyn Synchronizable) {
        root.synchronize(self);
        if self.mode == SyncMode::Read {
            assert_eq!(
                self.cursor,
                self.values.len(),
                "read pass left {} unconsumed values",
                self.values.len() - self.cursor
            );
        }
    }

    /// Hand over the recording of a completed write pass.
    pub fn take_buffer(&mut self) -> ValueBuffer {
        assert_eq!(self.mode, SyncMode::Write, "take_buffer in read mode");
        self.cursor = 0;
        ValueBuffer(mem::take(&mut self.values))
    }

    fn next_value(&mut self) -> FieldValue {
        assert!(
            self.cursor < self.values.len(),
            "value buffer exhausted at slot {}",
            self.cursor
        );
        let value = self.values[self.cursor].clone();
        self.cursor += 1;
        value
    }
}

impl Synchronizer for GraphSynchronizer {
    fn mode(&self) -> SyncMode {
        self.mode
    }

    fn sync_value(&mut self, value: FieldValue, ty: WireType, flags: FieldFlags) -> FieldValue {
        match self.mode {
            SyncMode::Write => {
                assert!(
                    value.matches(ty, flags),
                    "value {:?} does not match declared ({:?}, {:?})",
                    value,
                    ty,
                    flags
                );
                self.values.push(value.clone());
                value
            }
            SyncMode::Read => {
                let next = self.next_value();
                assert!(
                    next.matches(ty, flags),
                    "recorded {:?} does not match declared ({:?}, {:?})",
                    next,
                    ty,
                    flags
                );
                next
            }
        }
    }

    fn sync_object(
        &mut self,
        child: Option<Box<dyn Synchronizable>>,
    ) -> Option<Box<dyn Synchronizable>> {
        match self.mode {
            SyncMode::Write => {
                let marker = child.as_ref().and_then(|c| c.object_id());
                self.values.push(FieldValue::Object(marker));
                match child {
                    Some(mut c) => {
                        c.synchronize(self);
                        Some(c)
                    }
                    None => None,
                }
            }
            SyncMode::Read => {
                let marker = match self.next_value() {
                    FieldValue::Object(marker) => marker.is_some(),
                    other => panic!("recorded {:?} where an object was declared", other),
                };
                // Recorded Object(None) means the child was absent at write
                // time; real ids and bare presence markers both read as Some.
                match (marker, child) {
                    (true, Some(mut c)) => {
                        c.synchronize(self);
                        Some(c)
                    }
                    (false, None) => None,
                    (recorded, _) => panic!(
                        "object graph shape differs from recording: child {} but recording says {}",
                        if recorded { "missing" } else { "present" },
                        if recorded { "present" } else { "missing" }
                    ),
                }
            }
        }
    }

    fn sync_object_array(
        &mut self,
        mut children: Vec<Box<dyn Synchronizable>>,
    ) -> Vec<Box<dyn Synchronizable>> {
        match self.mode {
            SyncMode::Write => {
                let markers = children
                    .iter()
                    .map(|c| FieldValue::Object(c.object_id()))
                    .collect();
                self.values.push(FieldValue::Array(markers));
                for child in &mut children {
                    child.synchronize(self);
                }
                children
            }
            SyncMode::Read => {
                let recorded_len = match self.next_value() {
                    FieldValue::Array(items) => items.len(),
                    other => panic!("recorded {:?} where an object array was declared", other),
                };
                assert_eq!(
                    recorded_len,
                    children.len(),
                    "object array length differs from recording"
                );
                for child in &mut children {
                    child.synchronize(self);
                }
                children
            }
        }
    }
}
