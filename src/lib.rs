//! A tagged, self-describing binary serialization engine.
//!
//! Every value on the wire is introduced by a one-byte [`flag::TypeFlag`]
//! tag, so a stream can be walked (or skipped over) without knowing the
//! reader's expected types in advance. Scalars and homogeneous built-in
//! containers ([`value::Encodable`]/[`value::Decodable`]) round-trip without
//! ever consulting a [`schema::Schema`]; a value whose concrete type is only
//! known at runtime goes through [`serializer::Serializer::write_poly`] and
//! [`deserializer::Deserializer::read_poly`], which resolve the right
//! [`protocol::Protocol`] by name and walk its declared ancestors.
//!
//! ```text
//! value      ::= NULL
//!              | BOOLEAN bool | BYTE i8 | CHAR char | SHORT i16 | INT i32
//!              | LONG i64 | FLOAT f32 | DOUBLE f64
//!              | BOOLEAN_ARRAY len bool* | ... (one *_ARRAY per scalar)
//!              | STRING len utf8-bytes
//!              | OBJECT_ARRAY len value*  | LIST len value*
//!              | ITERABLE value* END_OBJECT
//!              | PAIR value value | TRIPLE value value value
//!              | MAP_ENTRY value value | MAP len (value value)*
//!              | UNIT
//!              | FUNCTION len opaque-bytes
//!              | OBJECT name superCount supertype* own-fields END_OBJECT
//! supertype  ::= OBJECT name 0 own-fields END_OBJECT   -- custom ancestor
//!              | value                                 -- built-in ancestor, last only
//! ```
//!
//! A [`schema::Schema`] is built once, up front, by registering a
//! [`protocol::Protocol`] per polymorphic type with
//! [`schema::SchemaBuilder::define`], then calling
//! [`schema::SchemaBuilder::finalize`]. The resulting `Schema` is immutable
//! and `Send + Sync`, so it is typically built once per process and shared
//! by reference across every `Serializer`/`Deserializer` pair.

pub mod byte_codec;
pub mod deserializer;
pub mod error;
pub mod flag;
pub mod protocol;
pub mod schema;
pub mod serializer;
pub mod value;

pub use byte_codec::{ByteSink, ByteSource};
pub use deserializer::Deserializer;
pub use error::{Error, ErrorKind, Result};
pub use flag::TypeFlag;
pub use protocol::{Protocol, ProtocolBuilder};
pub use schema::{ReinstallFn, Schema, SchemaBuilder};
pub use serializer::Serializer;
pub use value::{BuiltinData, BuiltinView, Decodable, Encodable, MapEntry, NoOpaqueCodec, Opaque, OpaqueCodec, Poly};

/// Serializes `v` to an in-memory buffer using `schema`, refusing any
/// `FUNCTION`-tagged value (there is no opaque codec configured).
pub fn to_vec(v: &dyn Poly, schema: &Schema) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = Serializer::new(&mut buf, schema, &NoOpaqueCodec);
    ser.write_poly(v)?;
    Ok(buf)
}

/// Deserializes a value previously written by [`to_vec`].
pub fn from_slice(bytes: &[u8], schema: &Schema) -> Result<Option<Box<dyn std::any::Any + Send + Sync>>> {
    let mut slice = bytes;
    let mut de = Deserializer::new(&mut slice, schema, &NoOpaqueCodec);
    de.read_poly()
}
