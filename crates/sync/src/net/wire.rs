use std::sync::Arc;

use glam::{Affine3A, Vec3};
use thiserror::Error;

use super::registry::{ClassRegistry, FieldDef};
use super::snapshot::{DeltaRecord, ObjectState, SnapshotDelta};
use super::types::{FieldFlags, FieldValue, WireType, NULL_OBJECT};

/*
 * Delta binary format, all integers and floats little-endian:
 *
 * |  u32 base_timestamp  |  u32 timestamp  |  u16 record_count  |
 * then per record:
 * |  u16 object_id  |  u16 class_id  |  u8 kind  |
 *   kind 0 (added)    : every field in class order
 *   kind 1 (modified) : u8 changed_count, then (u8 field_index, value)*
 *   kind 2 (removed)  : nothing further
 *
 * Values are packed by their declared type: scalars at their fixed width,
 * VEC3 as 3 x f32 (or 3 x i16 when the field is flagged as a unit vector),
 * MTX4 as 12 x f32, strings as u8 length + payload, object references as a
 * u16 id with 0xFFFF meaning none. ARRAY fields are a u16 length followed
 * by the elements. Field order is implied by the class descriptor and is
 * never re-sent.
 */

const KIND_ADDED: u8 = 0;
const KIND_MODIFIED: u8 = 1;
const KIND_REMOVED: u8 = 2;

const NORMAL_SCALE: f32 = 32767.0;
const MAX_STRING_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("buffer truncated at offset {0}")]
    Truncated(usize),
    #[error("unknown record kind {0}")]
    UnknownKind(u8),
    #[error("unknown class id {0}")]
    UnknownClass(u16),
    #[error("field index {index} out of range for class {class}")]
    FieldIndex { index: u8, class: u16 },
    #[error("{0} records exceed the u16 record count")]
    TooManyRecords(usize),
    #[error("string of {0} bytes exceeds the u8 length prefix")]
    StringTooLong(usize),
    #[error("array of {0} elements exceeds the u16 length prefix")]
    ArrayTooLong(usize),
    #[error("non-ascii payload in a Str8 field")]
    NonAsciiString,
    #[error("code point U+{0:04X} does not fit a single u16 unit")]
    NonBmpChar(u32),
    #[error("u16 unit {0:#06x} is not a valid code point")]
    InvalidChar(u16),
    #[error("{0} trailing bytes after the last record")]
    TrailingBytes(usize),
}

/// Encodes a `SnapshotDelta` to the wire layout above and back. Purely
/// mechanical given the class descriptors; the byte layout is frozen.
pub struct Serializer {
    registry: Arc<ClassRegistry>,
}

impl Serializer {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self { registry }
    }

    pub fn write(&self, delta: &SnapshotDelta) -> Result<Vec<u8>, WireError> {
        let mut w = ByteWriter::default();
        w.put_u32(delta.base_timestamp);
        w.put_u32(delta.timestamp);
        if delta.records.len() > u16::MAX as usize {
            return Err(WireError::TooManyRecords(delta.records.len()));
        }
        w.put_u16(delta.records.len() as u16);

        for record in &delta.records {
            match record {
                DeltaRecord::Added(state) => {
                    w.put_u16(state.id);
                    w.put_u16(state.class_id);
                    w.put_u8(KIND_ADDED);
                    let info = self.registry.get(state.class_id);
                    assert_eq!(
                        state.fields.len(),
                        info.field_count(),
                        "added record for class '{}' has the wrong field count",
                        info.name()
                    );
                    for (index, value) in state.fields.iter().enumerate() {
                        write_value(&mut w, value, info.field(index))?;
                    }
                }
                DeltaRecord::Modified {
                    id,
                    class_id,
                    changes,
                } => {
                    w.put_u16(*id);
                    w.put_u16(*class_id);
                    w.put_u8(KIND_MODIFIED);
                    let info = self.registry.get(*class_id);
                    w.put_u8(changes.len() as u8);
                    for (index, value) in changes {
                        assert!(
                            (*index as usize) < info.field_count(),
                            "change index {} out of range for class '{}'",
                            index,
                            info.name()
                        );
                        w.put_u8(*index);
                        write_value(&mut w, value, info.field(*index as usize))?;
                    }
                }
                DeltaRecord::Removed { id, class_id } => {
                    w.put_u16(*id);
                    w.put_u16(*class_id);
                    w.put_u8(KIND_REMOVED);
                }
            }
        }
        Ok(w.into_vec())
    }

    pub fn read(&self, buffer: &[u8]) -> Result<SnapshotDelta, WireError> {
        let mut r = ByteReader::new(buffer);
        let base_timestamp = r.read_u32()?;
        let timestamp = r.read_u32()?;
        let count = r.read_u16()? as usize;

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let id = r.read_u16()?;
            let class_id = r.read_u16()?;
            let kind = r.read_u8()?;
            let info = self
                .registry
                .try_get(class_id)
                .ok_or(WireError::UnknownClass(class_id))?;

            match kind {
                KIND_ADDED => {
                    let mut fields = Vec::with_capacity(info.field_count());
                    for index in 0..info.field_count() {
                        fields.push(read_value(&mut r, info.field(index))?);
                    }
                    records.push(DeltaRecord::Added(ObjectState {
                        id,
                        class_id,
                        fields,
                    }));
                }
                KIND_MODIFIED => {
                    let changed = r.read_u8()? as usize;
                    let mut changes = Vec::with_capacity(changed);
                    for _ in 0..changed {
                        let index = r.read_u8()?;
                        if index as usize >= info.field_count() {
                            return Err(WireError::FieldIndex {
                                index,
                                class: class_id,
                            });
                        }
                        changes.push((index, read_value(&mut r, info.field(index as usize))?));
                    }
                    records.push(DeltaRecord::Modified {
                        id,
                        class_id,
                        changes,
                    });
                }
                KIND_REMOVED => {
                    records.push(DeltaRecord::Removed { id, class_id });
                }
                other => return Err(WireError::UnknownKind(other)),
            }
        }

        if r.remaining() != 0 {
            return Err(WireError::TrailingBytes(r.remaining()));
        }
        Ok(SnapshotDelta {
            base_timestamp,
            timestamp,
            records,
        })
    }
}

fn write_value(w: &mut ByteWriter, value: &FieldValue, def: FieldDef) -> Result<(), WireError> {
    if def.flags.contains(FieldFlags::ARRAY) {
        let FieldValue::Array(items) = value else {
            panic!("array field holds {:?}", value);
        };
        if items.len() > u16::MAX as usize {
            return Err(WireError::ArrayTooLong(items.len()));
        }
        w.put_u16(items.len() as u16);
        let element = FieldDef {
            ty: def.ty,
            flags: def.flags.difference(FieldFlags::ARRAY),
        };
        for item in items {
            write_scalar(w, item, element)?;
        }
        Ok(())
    } else {
        write_scalar(w, value, def)
    }
}

fn write_scalar(w: &mut ByteWriter, value: &FieldValue, def: FieldDef) -> Result<(), WireError> {
    match (value, def.ty) {
        (FieldValue::Int8(v), WireType::Int8) => w.put_i8(*v),
        (FieldValue::Int16(v), WireType::Int16) => w.put_i16(*v),
        (FieldValue::Int32(v), WireType::Int32) => w.put_i32(*v),
        (FieldValue::UInt8(v), WireType::UInt8) => w.put_u8(*v),
        (FieldValue::UInt16(v), WireType::UInt16) => w.put_u16(*v),
        (FieldValue::UInt32(v), WireType::UInt32) => w.put_u32(*v),
        (FieldValue::Float32(v), WireType::Float32) => w.put_f32(*v),
        (FieldValue::Vec3(v), WireType::Vec3) => {
            if def.flags.contains(FieldFlags::NORMAL_VECTOR) {
                w.put_i16(quantize_unit(v.x));
                w.put_i16(quantize_unit(v.y));
                w.put_i16(quantize_unit(v.z));
            } else {
                w.put_f32(v.x);
                w.put_f32(v.y);
                w.put_f32(v.z);
            }
        }
        (FieldValue::Mtx4(m), WireType::Mtx4) => {
            for component in m.to_cols_array() {
                w.put_f32(component);
            }
        }
        (FieldValue::Char8(v), WireType::Char8) => w.put_u8(*v),
        (FieldValue::Str8(s), WireType::Str8) => {
            if !s.is_ascii() {
                return Err(WireError::NonAsciiString);
            }
            if s.len() > MAX_STRING_LEN {
                return Err(WireError::StringTooLong(s.len()));
            }
            w.put_u8(s.len() as u8);
            w.put_bytes(s.as_bytes());
        }
        (FieldValue::Char16(c), WireType::Char16) => {
            w.put_u16(unit16(*c)?);
        }
        (FieldValue::Str16(s), WireType::Str16) => {
            let count = s.chars().count();
            if count > MAX_STRING_LEN {
                return Err(WireError::StringTooLong(count));
            }
            w.put_u8(count as u8);
            for c in s.chars() {
                w.put_u16(unit16(c)?);
            }
        }
        (FieldValue::Object(reference), WireType::Object) => {
            w.put_u16(reference.unwrap_or(NULL_OBJECT));
        }
        (value, ty) => panic!("field declared {:?} holds {:?}", ty, value),
    }
    Ok(())
}

fn read_value(r: &mut ByteReader<'_>, def: FieldDef) -> Result<FieldValue, WireError> {
    if def.flags.contains(FieldFlags::ARRAY) {
        let len = r.read_u16()? as usize;
        let element = FieldDef {
            ty: def.ty,
            flags: def.flags.difference(FieldFlags::ARRAY),
        };
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(read_scalar(r, element)?);
        }
        Ok(FieldValue::Array(items))
    } else {
        read_scalar(r, def)
    }
}

fn read_scalar(r: &mut ByteReader<'_>, def: FieldDef) -> Result<FieldValue, WireError> {
    Ok(match def.ty {
        WireType::Int8 => FieldValue::Int8(r.read_i8()?),
        WireType::Int16 => FieldValue::Int16(r.read_i16()?),
        WireType::Int32 => FieldValue::Int32(r.read_i32()?),
        WireType::UInt8 => FieldValue::UInt8(r.read_u8()?),
        WireType::UInt16 => FieldValue::UInt16(r.read_u16()?),
        WireType::UInt32 => FieldValue::UInt32(r.read_u32()?),
        WireType::Float32 => FieldValue::Float32(r.read_f32()?),
        WireType::Vec3 => {
            if def.flags.contains(FieldFlags::NORMAL_VECTOR) {
                FieldValue::Vec3(Vec3::new(
                    r.read_i16()? as f32 / NORMAL_SCALE,
                    r.read_i16()? as f32 / NORMAL_SCALE,
                    r.read_i16()? as f32 / NORMAL_SCALE,
                ))
            } else {
                FieldValue::Vec3(Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?))
            }
        }
        WireType::Mtx4 => {
            let mut components = [0.0f32; 12];
            for component in &mut components {
                *component = r.read_f32()?;
            }
            FieldValue::Mtx4(Affine3A::from_cols_array(&components))
        }
        WireType::Char8 => FieldValue::Char8(r.read_u8()?),
        WireType::Str8 => {
            let len = r.read_u8()? as usize;
            let bytes = r.take(len)?;
            if !bytes.is_ascii() {
                return Err(WireError::NonAsciiString);
            }
            FieldValue::Str8(String::from_utf8(bytes.to_vec()).expect("ascii is utf-8"))
        }
        WireType::Char16 => FieldValue::Char16(decode_unit16(r.read_u16()?)?),
        WireType::Str16 => {
            let count = r.read_u8()? as usize;
            let mut s = String::with_capacity(count);
            for _ in 0..count {
                s.push(decode_unit16(r.read_u16()?)?);
            }
            FieldValue::Str16(s)
        }
        WireType::Object => {
            let raw = r.read_u16()?;
            FieldValue::Object((raw != NULL_OBJECT).then_some(raw))
        }
    })
}

fn quantize_unit(component: f32) -> i16 {
    (component.clamp(-1.0, 1.0) * NORMAL_SCALE) as i16
}

fn unit16(c: char) -> Result<u16, WireError> {
    let code = c as u32;
    if code > u16::MAX as u32 {
        return Err(WireError::NonBmpChar(code));
    }
    Ok(code as u16)
}

fn decode_unit16(unit: u16) -> Result<char, WireError> {
    char::from_u32(unit as u32).ok_or(WireError::InvalidChar(unit))
}

#[derive(Default)]
struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::Truncated(self.offset));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn read_i8(&mut self) -> Result<i8, WireError> {
        Ok(self.take(1)?[0] as i8)
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_i16(&mut self) -> Result<i16, WireError> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::sync::{Synchronizable, Synchronizer, SynchronizerExt};
    use crate::net::types::ObjectId;

    struct Sample {
        id: Option<ObjectId>,
        health: u8,
        position: Vec3,
        aim: Vec3,
        name: String,
        samples: Vec<f32>,
    }

    impl Sample {
        fn boxed() -> Box<dyn Synchronizable> {
            Box::new(Sample {
                id: None,
                health: 0,
                position: Vec3::ZERO,
                aim: Vec3::Z,
                name: String::new(),
                samples: Vec::new(),
            })
        }
    }

    impl Synchronizable for Sample {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
        fn class_name(&self) -> &'static str {
            "Sample"
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
            self.aim = sync.sync_normal(self.aim);
            self.name = sync.sync_str8(std::mem::take(&mut self.name));
            self.samples = sync.sync_f32_array(std::mem::take(&mut self.samples));
        }
    }

    fn registry() -> Arc<ClassRegistry> {
        let mut registry = ClassRegistry::new();
        registry.register(Sample::boxed);
        Arc::new(registry)
    }

    fn sample_delta() -> SnapshotDelta {
        SnapshotDelta {
            base_timestamp: 0,
            timestamp: 1,
            records: vec![DeltaRecord::Added(ObjectState {
                id: 0,
                class_id: 0,
                fields: vec![
                    FieldValue::UInt8(42),
                    FieldValue::Vec3(Vec3::new(1.0, -2.5, 3.25)),
                    FieldValue::Vec3(Vec3::new(0.0, 0.0, 1.0)),
                    FieldValue::Str8("railgun".to_owned()),
                    FieldValue::Array(vec![FieldValue::Float32(1.5), FieldValue::Float32(-0.5)]),
                ],
            })],
        }
    }

    #[test]
    fn test_delta_roundtrip() {
        let serializer = Serializer::new(registry());
        let delta = sample_delta();
        let bytes = serializer.write(&delta).unwrap();
        let decoded = serializer.read(&bytes).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn test_modified_and_removed_roundtrip() {
        let serializer = Serializer::new(registry());
        let delta = SnapshotDelta {
            base_timestamp: 5,
            timestamp: 6,
            records: vec![
                DeltaRecord::Modified {
                    id: 0,
                    class_id: 0,
                    changes: vec![
                        (0, FieldValue::UInt8(7)),
                        (3, FieldValue::Str8("shotgun".to_owned())),
                    ],
                },
                DeltaRecord::Removed { id: 4, class_id: 0 },
            ],
        };
        let bytes = serializer.write(&delta).unwrap();
        assert_eq!(serializer.read(&bytes).unwrap(), delta);
    }

    #[test]
    fn test_normal_vector_is_quantized() {
        let serializer = Serializer::new(registry());
        let mut delta = sample_delta();
        let aim = Vec3::new(0.267_261_24, 0.534_522_5, 0.801_783_7);
        if let DeltaRecord::Added(state) = &mut delta.records[0] {
            state.fields[2] = FieldValue::Vec3(aim);
        }

        let bytes = serializer.write(&delta).unwrap();
        let decoded = serializer.read(&bytes).unwrap();
        let DeltaRecord::Added(state) = &decoded.records[0] else {
            panic!("expected Added");
        };
        let FieldValue::Vec3(read_back) = state.fields[2] else {
            panic!("expected Vec3");
        };
        for (a, b) in aim.to_array().iter().zip(read_back.to_array()) {
            assert!((a - b).abs() <= 1.0 / NORMAL_SCALE);
        }
    }

    #[test]
    fn test_truncated_buffer_is_an_error() {
        let serializer = Serializer::new(registry());
        let bytes = serializer.write(&sample_delta()).unwrap();
        for len in [0, 4, 9, bytes.len() - 1] {
            assert!(matches!(
                serializer.read(&bytes[..len]),
                Err(WireError::Truncated(_))
            ));
        }
    }

    #[test]
    fn test_trailing_bytes_are_an_error() {
        let serializer = Serializer::new(registry());
        let mut bytes = serializer.write(&sample_delta()).unwrap();
        bytes.push(0);
        assert!(matches!(
            serializer.read(&bytes),
            Err(WireError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_unknown_class_is_an_error() {
        let serializer = Serializer::new(registry());
        // encoded by hand: the encoder itself treats an unknown class as a bug
        let mut w = ByteWriter::default();
        w.put_u32(0);
        w.put_u32(1);
        w.put_u16(1);
        w.put_u16(1);
        w.put_u16(9);
        w.put_u8(KIND_REMOVED);
        assert!(matches!(
            serializer.read(&w.into_vec()),
            Err(WireError::UnknownClass(9))
        ));
    }

    #[test]
    fn test_oversized_string_is_an_error() {
        let serializer = Serializer::new(registry());
        let mut delta = sample_delta();
        if let DeltaRecord::Added(state) = &mut delta.records[0] {
            state.fields[3] = FieldValue::Str8("x".repeat(300));
        }
        assert!(matches!(
            serializer.write(&delta),
            Err(WireError::StringTooLong(300))
        ));
    }
}
