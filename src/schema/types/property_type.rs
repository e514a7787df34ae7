//! Flag-encoded property types.
//!
//! A [`PropertyType`] is a base kind (the identity-bearing part) plus a set of
//! modifier flags. The compact 8-bit encoding stored in schemas is
//! `kind | flags`, with the kind in the low bits and the modifiers in the high
//! bits.
//!
//! Equality between two property types compares **only the base kind**. Two
//! values that differ solely in `Indexed`, `Nullable` or `Array` are the same
//! type for schema matching purposes even though they are stored differently.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not};

use super::errors::SchemaError;

/// Base kind of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PropertyKind {
    Int = 0,
    Bool = 1,
    String = 2,
    Data = 3,
    Date = 4,
    Float = 5,
    Double = 6,
    Object = 7,
    /// Reverse relationship; always a collection.
    LinkingObjects = 8,
    /// Deprecated, kept only for reading old files.
    Any = 9,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 10] = [
        PropertyKind::Int,
        PropertyKind::Bool,
        PropertyKind::String,
        PropertyKind::Data,
        PropertyKind::Date,
        PropertyKind::Float,
        PropertyKind::Double,
        PropertyKind::Object,
        PropertyKind::LinkingObjects,
        PropertyKind::Any,
    ];

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            PropertyKind::Int => "int",
            PropertyKind::Bool => "bool",
            PropertyKind::String => "string",
            PropertyKind::Data => "data",
            PropertyKind::Date => "date",
            PropertyKind::Float => "float",
            PropertyKind::Double => "double",
            PropertyKind::Object => "object",
            PropertyKind::LinkingObjects => "linking objects",
            PropertyKind::Any => "any",
        }
    }

    fn array_name(self) -> &'static str {
        match self {
            PropertyKind::Int => "[int]",
            PropertyKind::Bool => "[bool]",
            PropertyKind::String => "[string]",
            PropertyKind::Data => "[data]",
            PropertyKind::Date => "[date]",
            PropertyKind::Float => "[float]",
            PropertyKind::Double => "[double]",
            PropertyKind::Object => "[object]",
            PropertyKind::LinkingObjects => "[linking objects]",
            PropertyKind::Any => "[any]",
        }
    }
}

impl TryFrom<u8> for PropertyKind {
    type Error = SchemaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PropertyKind::ALL
            .iter()
            .copied()
            .find(|kind| *kind as u8 == value)
            .ok_or_else(|| {
                SchemaError::InvalidPropertyType(format!("unknown base kind {}", value))
            })
    }
}

/// Modifier flags of a property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PropertyFlags(u8);

impl PropertyFlags {
    pub const NONE: PropertyFlags = PropertyFlags(0);
    pub const INDEXED: PropertyFlags = PropertyFlags(32);
    pub const NULLABLE: PropertyFlags = PropertyFlags(64);
    pub const ARRAY: PropertyFlags = PropertyFlags(128);
    /// Every modifier bit.
    pub const FLAGS: PropertyFlags = PropertyFlags(32 | 64 | 128);

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Builds a flag set, rejecting bits outside of [`PropertyFlags::FLAGS`].
    pub fn from_bits(bits: u8) -> Option<PropertyFlags> {
        if bits & !Self::FLAGS.0 == 0 {
            Some(PropertyFlags(bits))
        } else {
            None
        }
    }

    pub fn contains(self, other: PropertyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PropertyFlags {
    type Output = PropertyFlags;

    fn bitor(self, rhs: PropertyFlags) -> PropertyFlags {
        PropertyFlags(self.0 | rhs.0)
    }
}

impl BitAnd for PropertyFlags {
    type Output = PropertyFlags;

    fn bitand(self, rhs: PropertyFlags) -> PropertyFlags {
        PropertyFlags(self.0 & rhs.0)
    }
}

impl BitXor for PropertyFlags {
    type Output = PropertyFlags;

    fn bitxor(self, rhs: PropertyFlags) -> PropertyFlags {
        PropertyFlags(self.0 ^ rhs.0)
    }
}

// Complement within the modifier space, so the result is always a valid flag set.
impl Not for PropertyFlags {
    type Output = PropertyFlags;

    fn not(self) -> PropertyFlags {
        PropertyFlags(!self.0 & Self::FLAGS.0)
    }
}

/// A property type: base kind plus modifier flags.
///
/// `==` ignores the flags. Use [`PropertyType::bits`] when the exact encoding
/// matters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PropertyType {
    kind: PropertyKind,
    flags: PropertyFlags,
}

impl PropertyType {
    pub const fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            flags: PropertyFlags::NONE,
        }
    }

    pub const fn with_flags(kind: PropertyKind, flags: PropertyFlags) -> Self {
        Self { kind, flags }
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    /// The base kind with every modifier cleared.
    pub fn base(&self) -> PropertyType {
        PropertyType::new(self.kind)
    }

    /// The 8-bit stored encoding.
    pub fn bits(&self) -> u8 {
        self.kind as u8 | self.flags.bits()
    }

    pub fn is_array(&self) -> bool {
        self.flags.contains(PropertyFlags::ARRAY)
    }

    pub fn is_nullable(&self) -> bool {
        self.flags.contains(PropertyFlags::NULLABLE)
    }

    pub fn is_indexed(&self) -> bool {
        self.flags.contains(PropertyFlags::INDEXED)
    }

    /// True for arrays and for reverse links, which are collections by kind.
    pub fn is_collection(&self) -> bool {
        self.is_array() || self.kind == PropertyKind::LinkingObjects
    }

    /// Exact comparison including modifier flags.
    pub fn identical(&self, other: &PropertyType) -> bool {
        self.bits() == other.bits()
    }
}

/// Canonical name of a property type, `"[name]"` when the Array bit is set.
pub fn string_for_property_type(property_type: PropertyType) -> &'static str {
    if property_type.is_array() {
        property_type.kind.array_name()
    } else {
        property_type.kind.name()
    }
}

impl From<PropertyKind> for PropertyType {
    fn from(kind: PropertyKind) -> Self {
        PropertyType::new(kind)
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = SchemaError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        let kind = PropertyKind::try_from(bits & !PropertyFlags::FLAGS.bits())?;
        let flags = PropertyFlags::from_bits(bits & PropertyFlags::FLAGS.bits()).ok_or_else(
            || SchemaError::InvalidPropertyType(format!("invalid modifier bits in {}", bits)),
        )?;
        Ok(PropertyType { kind, flags })
    }
}

impl From<PropertyType> for u8 {
    fn from(property_type: PropertyType) -> u8 {
        property_type.bits()
    }
}

impl PartialEq for PropertyType {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for PropertyType {}

impl PartialEq<PropertyKind> for PropertyType {
    fn eq(&self, other: &PropertyKind) -> bool {
        self.kind == *other
    }
}

// Consistent with `==`: only the base kind participates.
impl Hash for PropertyType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(string_for_property_type(*self))
    }
}

impl BitOr<PropertyFlags> for PropertyType {
    type Output = PropertyType;

    fn bitor(self, rhs: PropertyFlags) -> PropertyType {
        PropertyType::with_flags(self.kind, self.flags | rhs)
    }
}

impl BitOr<PropertyFlags> for PropertyKind {
    type Output = PropertyType;

    fn bitor(self, rhs: PropertyFlags) -> PropertyType {
        PropertyType::with_flags(self, rhs)
    }
}

impl BitAnd<PropertyFlags> for PropertyType {
    type Output = PropertyType;

    fn bitand(self, rhs: PropertyFlags) -> PropertyType {
        PropertyType::with_flags(self.kind, self.flags & rhs)
    }
}

impl BitXor<PropertyFlags> for PropertyType {
    type Output = PropertyType;

    fn bitxor(self, rhs: PropertyFlags) -> PropertyType {
        PropertyType::with_flags(self.kind, self.flags ^ rhs)
    }
}

impl BitOrAssign<PropertyFlags> for PropertyType {
    fn bitor_assign(&mut self, rhs: PropertyFlags) {
        *self = *self | rhs;
    }
}

impl BitAndAssign<PropertyFlags> for PropertyType {
    fn bitand_assign(&mut self, rhs: PropertyFlags) {
        *self = *self & rhs;
    }
}

impl BitXorAssign<PropertyFlags> for PropertyType {
    fn bitxor_assign(&mut self, rhs: PropertyFlags) {
        *self = *self ^ rhs;
    }
}
