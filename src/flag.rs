//! One-byte tags that introduce every value on the wire.
//!
//! Ordinals are stable; they ARE the on-wire encoding.

use crate::error::{bail, ensure, error, Error, ErrorKind, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum TypeFlag {
    Null = 0,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    BooleanArray,
    ByteArray,
    CharArray,
    ShortArray,
    IntArray,
    LongArray,
    FloatArray,
    DoubleArray,
    String,
    ObjectArray,
    List,
    Iterable,
    Pair,
    Triple,
    MapEntry,
    Map,
    Unit,
    Function,
    Object,
    EndObject,
}

impl TypeFlag {
    pub const ALL: &'static [TypeFlag] = &[
        TypeFlag::Null,
        TypeFlag::Boolean,
        TypeFlag::Byte,
        TypeFlag::Char,
        TypeFlag::Short,
        TypeFlag::Int,
        TypeFlag::Long,
        TypeFlag::Float,
        TypeFlag::Double,
        TypeFlag::BooleanArray,
        TypeFlag::ByteArray,
        TypeFlag::CharArray,
        TypeFlag::ShortArray,
        TypeFlag::IntArray,
        TypeFlag::LongArray,
        TypeFlag::FloatArray,
        TypeFlag::DoubleArray,
        TypeFlag::String,
        TypeFlag::ObjectArray,
        TypeFlag::List,
        TypeFlag::Iterable,
        TypeFlag::Pair,
        TypeFlag::Triple,
        TypeFlag::MapEntry,
        TypeFlag::Map,
        TypeFlag::Unit,
        TypeFlag::Function,
        TypeFlag::Object,
        TypeFlag::EndObject,
    ];

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Result<Self> {
        Self::ALL
            .get(b as usize)
            .copied()
            .ok_or_else(|| Error::new(ErrorKind::TypeMismatch, format!("unknown type flag byte {}", b), None))
    }

    pub fn display_str(self) -> &'static str {
        match self {
            TypeFlag::Null => "NULL",
            TypeFlag::Boolean => "BOOLEAN",
            TypeFlag::Byte => "BYTE",
            TypeFlag::Char => "CHAR",
            TypeFlag::Short => "SHORT",
            TypeFlag::Int => "INT",
            TypeFlag::Long => "LONG",
            TypeFlag::Float => "FLOAT",
            TypeFlag::Double => "DOUBLE",
            TypeFlag::BooleanArray => "BOOLEAN_ARRAY",
            TypeFlag::ByteArray => "BYTE_ARRAY",
            TypeFlag::CharArray => "CHAR_ARRAY",
            TypeFlag::ShortArray => "SHORT_ARRAY",
            TypeFlag::IntArray => "INT_ARRAY",
            TypeFlag::LongArray => "LONG_ARRAY",
            TypeFlag::FloatArray => "FLOAT_ARRAY",
            TypeFlag::DoubleArray => "DOUBLE_ARRAY",
            TypeFlag::String => "STRING",
            TypeFlag::ObjectArray => "OBJECT_ARRAY",
            TypeFlag::List => "LIST",
            TypeFlag::Iterable => "ITERABLE",
            TypeFlag::Pair => "PAIR",
            TypeFlag::Triple => "TRIPLE",
            TypeFlag::MapEntry => "MAP_ENTRY",
            TypeFlag::Map => "MAP",
            TypeFlag::Unit => "UNIT",
            TypeFlag::Function => "FUNCTION",
            TypeFlag::Object => "OBJECT",
            TypeFlag::EndObject => "END_OBJECT",
        }
    }

    /// True for the two tags that open/close an `OBJECT` block rather than
    /// introducing a self-contained value.
    pub fn is_framing(self) -> bool {
        matches!(self, TypeFlag::Object | TypeFlag::EndObject)
    }
}

pub(crate) fn expect_flag(got: TypeFlag, want: TypeFlag) -> Result<()> {
    ensure!(
        got == want,
        TypeMismatch,
        None,
        "expected tag {}, got tag {}",
        want.display_str(),
        got.display_str(),
    );
    Ok(())
}
