use std::collections::HashMap;

use super::sync::{SyncMode, Synchronizable, Synchronizer};
use super::types::{FieldFlags, FieldValue, WireType};

pub type ClassId = u16;

type Factory = Box<dyn Fn() -> Box<dyn Synchronizable> + Send + Sync>;
type DestroyCallback = Box<dyn Fn(&mut dyn Synchronizable) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub ty: WireType,
    pub flags: FieldFlags,
}

/// Schema metadata for one synchronizable class: the ordered field
/// descriptor list plus the factory and destroy hooks. Built once at
/// registration and never mutated afterwards.
pub struct ClassInfo {
    id: ClassId,
    name: &'static str,
    fields: Vec<FieldDef>,
    factory: Factory,
    destroy: Option<DestroyCallback>,
}

impl ClassInfo {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> FieldDef {
        self.fields[index]
    }

    /// Validates one traversal step against the descriptor list. Any drift
    /// between the registered field order and a later traversal is a
    /// programming error and panics at the drift site.
    pub fn check_field(&self, index: usize, ty: WireType, flags: FieldFlags) {
        assert!(
            index < self.fields.len(),
            "class '{}': traversal visited more than {} declared fields",
            self.name,
            self.fields.len()
        );
        let def = self.fields[index];
        assert!(
            def.ty == ty && def.flags == flags,
            "class '{}' field {}: declared ({:?}, {:?}) but traversed as ({:?}, {:?})",
            self.name,
            index,
            def.ty,
            def.flags,
            ty,
            flags
        );
    }

    pub fn create(&self) -> Box<dyn Synchronizable> {
        (self.factory)()
    }

    pub fn destroy(&self, object: &mut dyn Synchronizable) {
        if let Some(destroy) = &self.destroy {
            destroy(object);
        }
    }
}

/// Harvests the field descriptor list by driving a sample instance's
/// `synchronize` once. Values pass through unchanged; only (type, flags)
/// are recorded.
struct SchemaBuilder {
    fields: Vec<FieldDef>,
}

impl Synchronizer for SchemaBuilder {
    fn mode(&self) -> SyncMode {
        SyncMode::Write
    }

    fn sync_value(&mut self, value: FieldValue, ty: WireType, flags: FieldFlags) -> FieldValue {
        self.fields.push(FieldDef { ty, flags });
        value
    }

    fn sync_object(
        &mut self,
        child: Option<Box<dyn Synchronizable>>,
    ) -> Option<Box<dyn Synchronizable>> {
        self.fields.push(FieldDef {
            ty: WireType::Object,
            flags: FieldFlags::empty(),
        });
        child
    }

    fn sync_object_array(
        &mut self,
        children: Vec<Box<dyn Synchronizable>>,
    ) -> Vec<Box<dyn Synchronizable>> {
        self.fields.push(FieldDef {
            ty: WireType::Object,
            flags: FieldFlags::ARRAY,
        });
        children
    }
}

/// Class table shared by writer, reader, serializer, and endpoints. Ids are
/// dense and assigned in registration order, so both ends must register the
/// same classes in the same order before any traffic flows. Write-once
/// during startup, read-only afterwards; share via `Arc`.
#[derive(Default)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
    by_name: HashMap<&'static str, ClassId>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, factory: F) -> ClassId
    where
        F: Fn() -> Box<dyn Synchronizable> + Send + Sync + 'static,
    {
        self.register_inner(Box::new(factory), None)
    }

    pub fn register_with_destroy<F, D>(&mut self, factory: F, destroy: D) -> ClassId
    where
        F: Fn() -> Box<dyn Synchronizable> + Send + Sync + 'static,
        D: Fn(&mut dyn Synchronizable) + Send + Sync + 'static,
    {
        self.register_inner(Box::new(factory), Some(Box::new(destroy)))
    }

    fn register_inner(&mut self, factory: Factory, destroy: Option<DestroyCallback>) -> ClassId {
        let mut sample = factory();
        let name = sample.class_name();
        assert!(
            !self.by_name.contains_key(name),
            "class '{}' registered twice",
            name
        );

        let mut builder = SchemaBuilder { fields: Vec::new() };
        sample.synchronize(&mut builder);
        assert!(
            !builder.fields.is_empty(),
            "class '{}' declares no fields",
            name
        );
        assert!(
            builder.fields.len() <= u8::MAX as usize,
            "class '{}' declares more than {} fields",
            name,
            u8::MAX
        );

        let id = self.classes.len() as ClassId;
        self.classes.push(ClassInfo {
            id,
            name,
            fields: builder.fields,
            factory,
            destroy,
        });
        self.by_name.insert(name, id);
        id
    }

    /// O(1) lookup. An out-of-range id is a programming error: registries
    /// must be fully and identically populated on both ends before any
    /// traffic flows.
    pub fn get(&self, id: ClassId) -> &ClassInfo {
        self.try_get(id)
            .unwrap_or_else(|| panic!("unknown class id {}", id))
    }

    /// Non-panicking lookup for the wire decoder, where a bad id is data.
    pub fn try_get(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id as usize)
    }

    pub fn class_id(&self, name: &str) -> ClassId {
        *self
            .by_name
            .get(name)
            .unwrap_or_else(|| panic!("class '{}' is not registered", name))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
