use bitflags::bitflags;
use glam::{Affine3A, Vec3};

pub type ObjectId = u16;

/// Wire encoding of an absent object reference.
pub const NULL_OBJECT: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Int8 = 0,
    Int16 = 1,
    Int32 = 2,
    UInt8 = 3,
    UInt16 = 4,
    UInt32 = 5,
    Float32 = 6,
    Vec3 = 7,
    Mtx4 = 8,
    Char8 = 9,
    Str8 = 10,
    Char16 = 11,
    Str16 = 12,
    Object = 13,
}

impl WireType {
    pub fn from_u8(value: u8) -> Option<WireType> {
        match value {
            0 => Some(WireType::Int8),
            1 => Some(WireType::Int16),
            2 => Some(WireType::Int32),
            3 => Some(WireType::UInt8),
            4 => Some(WireType::UInt16),
            5 => Some(WireType::UInt32),
            6 => Some(WireType::Float32),
            7 => Some(WireType::Vec3),
            8 => Some(WireType::Mtx4),
            9 => Some(WireType::Char8),
            10 => Some(WireType::Str8),
            11 => Some(WireType::Char16),
            12 => Some(WireType::Str16),
            13 => Some(WireType::Object),
            _ => None,
        }
    }

    /// Encoded width in bytes for fixed-width types; `None` for the
    /// length-prefixed string types.
    pub fn size(&self) -> Option<usize> {
        match self {
            WireType::Int8 | WireType::UInt8 | WireType::Char8 => Some(1),
            WireType::Int16 | WireType::UInt16 | WireType::Char16 | WireType::Object => Some(2),
            WireType::Int32 | WireType::UInt32 | WireType::Float32 => Some(4),
            WireType::Vec3 => Some(12),
            WireType::Mtx4 => Some(48),
            WireType::Str8 | WireType::Str16 => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldFlags: u8 {
        /// Field holds a homogeneous sequence of the declared type.
        const ARRAY = 1;
        /// Unit-vector compression hint: Vec3 quantized to 3 x i16 on the wire.
        const NORMAL_VECTOR = 2;
    }
}

/// Value of one field slot in an object record. Scalars are stored as-is;
/// nested synchronizables are stored as a reference to their own record.
/// Equality is exact, floats included: change detection compares the values
/// both ends already hold, it never re-measures.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Float32(f32),
    Vec3(Vec3),
    Mtx4(Affine3A),
    Char8(u8),
    Str8(String),
    Char16(char),
    Str16(String),
    Object(Option<ObjectId>),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn wire_type(&self) -> Option<WireType> {
        match self {
            FieldValue::Int8(_) => Some(WireType::Int8),
            FieldValue::Int16(_) => Some(WireType::Int16),
            FieldValue::Int32(_) => Some(WireType::Int32),
            FieldValue::UInt8(_) => Some(WireType::UInt8),
            FieldValue::UInt16(_) => Some(WireType::UInt16),
            FieldValue::UInt32(_) => Some(WireType::UInt32),
            FieldValue::Float32(_) => Some(WireType::Float32),
            FieldValue::Vec3(_) => Some(WireType::Vec3),
            FieldValue::Mtx4(_) => Some(WireType::Mtx4),
            FieldValue::Char8(_) => Some(WireType::Char8),
            FieldValue::Str8(_) => Some(WireType::Str8),
            FieldValue::Char16(_) => Some(WireType::Char16),
            FieldValue::Str16(_) => Some(WireType::Str16),
            FieldValue::Object(_) => Some(WireType::Object),
            FieldValue::Array(_) => None,
        }
    }

    /// Whether this value conforms to a field declared as `(ty, flags)`.
    /// Array fields require every element to match the declared element type;
    /// nested arrays are not representable.
    pub fn matches(&self, ty: WireType, flags: FieldFlags) -> bool {
        if flags.contains(FieldFlags::ARRAY) {
            let element_flags = flags.difference(FieldFlags::ARRAY);
            match self {
                FieldValue::Array(items) => items.iter().all(|v| v.matches(ty, element_flags)),
                _ => false,
            }
        } else {
            self.wire_type() == Some(ty)
        }
    }
}
