//! Dynamic value classification: the `Poly` marker for values that
//! participate in polymorphic schema dispatch, the `Opaque` payload for the
//! `FUNCTION` tag, and the `Encodable`/`Decodable` static-dispatch fast path
//! for scalars and homogeneous built-in containers.

use crate::{deserializer::Deserializer, error::Result, flag::TypeFlag, serializer::Serializer};
use std::{any::Any, collections::HashMap, hash::Hash};

/// A value reachable by the engine's polymorphic dispatch.
///
/// Every `'static` Rust value implements this via the blanket impl below; the
/// trait only exists to give `&dyn Poly` a stable type-name accessor and an
/// `as_any` downcast hook, since `std::any::Any` alone doesn't expose
/// `type_name` from a trait object.
pub trait Poly: Any + Send + Sync {
    fn poly_type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> Poly for T {
    fn poly_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// True for type names the engine refuses to register a protocol for or to
/// treat as nameable: anonymous, locally-scoped types have no stable name to
/// put on the wire.
pub fn is_anonymous_type_name(name: &str) -> bool {
    name.contains("{{closure}}") || name.contains("{{opaque}}")
}

/// Payload for the `FUNCTION` tag. The engine never inspects the contents; it
/// only asks a supplied [`OpaqueCodec`] to turn it into bytes and back.
pub struct Opaque(pub Box<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Opaque(Box::new(value))
    }
}

/// External collaborator hook for the `FUNCTION` tag. The core never
/// implements this itself; a caller that has no opaque-valued members never
/// needs to supply one.
pub trait OpaqueCodec: Send + Sync {
    fn encode(&self, value: &Opaque) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Opaque>;
}

/// A codec that refuses every opaque value; the default when a caller has no
/// use for `FUNCTION` and would rather fail loudly than silently drop data.
pub struct NoOpaqueCodec;

impl OpaqueCodec for NoOpaqueCodec {
    fn encode(&self, _value: &Opaque) -> Result<Vec<u8>> {
        use crate::error::{bail, error};
        bail!(
            MissingOperation,
            None,
            "no OpaqueCodec configured; cannot encode an opaque FUNCTION value",
        )
    }

    fn decode(&self, _bytes: &[u8]) -> Result<Opaque> {
        use crate::error::{bail, error};
        bail!(
            MissingOperation,
            None,
            "no OpaqueCodec configured; cannot decode an opaque FUNCTION value",
        )
    }
}

/// The shape a user type may present as its "built-in-as-super" packet: some
/// object models let a user type extend a built-in container directly (e.g.
/// subclassing a list type). Rust has no implicit relationship like that, so
/// a type opts in explicitly by implementing [`BuiltinView`] and registering
/// it with `ProtocolBuilder::extends_builtin` (see src/protocol.rs).
pub enum BuiltinData<'a> {
    List(Vec<&'a dyn Poly>),
    Map(Vec<(&'a dyn Poly, &'a dyn Poly)>),
    Pair(&'a dyn Poly, &'a dyn Poly),
    Triple(&'a dyn Poly, &'a dyn Poly, &'a dyn Poly),
    MapEntry(&'a dyn Poly, &'a dyn Poly),
    Unit,
}

impl<'a> BuiltinData<'a> {
    pub fn flag(&self) -> TypeFlag {
        match self {
            BuiltinData::List(_) => TypeFlag::List,
            BuiltinData::Map(_) => TypeFlag::Map,
            BuiltinData::Pair(..) => TypeFlag::Pair,
            BuiltinData::Triple(..) => TypeFlag::Triple,
            BuiltinData::MapEntry(..) => TypeFlag::MapEntry,
            BuiltinData::Unit => TypeFlag::Unit,
        }
    }
}

pub trait BuiltinView: Poly {
    fn builtin_view(&self) -> BuiltinData<'_>;
}

/// Values statically known to be scalars or homogeneous built-in containers
/// skip schema/protocol dispatch entirely: their shape is fixed at compile
/// time, so there is no "which writer applies" question to answer at
/// runtime. Heterogeneous or polymorphic content still goes through
/// [`Serializer::write_poly`] for each element.
pub trait Encodable {
    fn encode(&self, ser: &mut Serializer) -> Result<()>;
}

pub trait Decodable: Sized {
    fn decode(de: &mut Deserializer) -> Result<Self>;
}

macro_rules! scalar_encodable {
    ($($t:ty => $write:ident / $read:ident),* $(,)?) => {$(
        impl Encodable for $t {
            fn encode(&self, ser: &mut Serializer) -> Result<()> {
                ser.$write(*self)
            }
        }

        impl Decodable for $t {
            fn decode(de: &mut Deserializer) -> Result<Self> {
                de.$read()
            }
        }
    )*};
}

scalar_encodable!(
    bool => write_bool / read_bool,
    i8 => write_byte / read_byte,
    i16 => write_short / read_short,
    i32 => write_int / read_int,
    i64 => write_long / read_long,
    f32 => write_float / read_float,
    f64 => write_double / read_double,
    char => write_char / read_char,
);

impl Encodable for () {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        ser.write_unit()
    }
}

impl Decodable for () {
    fn decode(de: &mut Deserializer) -> Result<Self> {
        de.read_unit()
    }
}

impl Encodable for str {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        ser.write_str(self)
    }
}

impl Encodable for String {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        ser.write_str(self)
    }
}

impl Decodable for String {
    fn decode(de: &mut Deserializer) -> Result<Self> {
        de.read_str()
    }
}

impl<T: Encodable> Encodable for Option<T> {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        match self {
            Some(inner) => ser.write_some(inner),
            None => ser.write_none(),
        }
    }
}

impl<T: Decodable> Decodable for Option<T> {
    fn decode(de: &mut Deserializer) -> Result<Self> {
        de.read_option(T::decode)
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        ser.write_list(self.len(), |ser, i| self[i].encode(ser))
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn decode(de: &mut Deserializer) -> Result<Self> {
        de.read_list(T::decode)
    }
}

impl<A: Encodable, B: Encodable> Encodable for (A, B) {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        ser.write_pair(&self.0, &self.1)
    }
}

impl<A: Decodable, B: Decodable> Decodable for (A, B) {
    fn decode(de: &mut Deserializer) -> Result<Self> {
        de.read_pair(A::decode, B::decode)
    }
}

impl<A: Encodable, B: Encodable, C: Encodable> Encodable for (A, B, C) {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        ser.write_triple(&self.0, &self.1, &self.2)
    }
}

impl<A: Decodable, B: Decodable, C: Decodable> Decodable for (A, B, C) {
    fn decode(de: &mut Deserializer) -> Result<Self> {
        de.read_triple(A::decode, B::decode, C::decode)
    }
}

/// Wraps a key/value pair so it is distinguishable on the wire from a
/// `Pair`: a standalone entry uses the `MAP_ENTRY` tag, distinct from `PAIR`.
pub struct MapEntry<K, V>(pub K, pub V);

impl<K: Encodable, V: Encodable> Encodable for MapEntry<K, V> {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        ser.write_map_entry(&self.0, &self.1)
    }
}

impl<K: Decodable, V: Decodable> Decodable for MapEntry<K, V> {
    fn decode(de: &mut Deserializer) -> Result<Self> {
        let (k, v) = de.read_map_entry(K::decode, V::decode)?;
        Ok(MapEntry(k, v))
    }
}

impl<K: Encodable + Eq + Hash, V: Encodable> Encodable for HashMap<K, V> {
    fn encode(&self, ser: &mut Serializer) -> Result<()> {
        let entries: Vec<(&K, &V)> = self.iter().collect();
        ser.write_map(entries.len(), |ser, i| {
            let (k, v) = entries[i];
            ser.write_map_pair(k, v)
        })
    }
}

impl<K: Decodable + Eq + Hash, V: Decodable> Decodable for HashMap<K, V> {
    fn decode(de: &mut Deserializer) -> Result<Self> {
        let len = de.begin_map()?;
        let mut map = HashMap::with_capacity(len);
        for _ in 0..len {
            let (k, v) = de.read_map_entry_elem(K::decode, V::decode)?;
            map.insert(k, v);
        }
        de.finish_map()?;
        Ok(map)
    }
}

// Dedicated primitive-array tags are exposed as methods directly on
// `Serializer`/`Deserializer` (`write_bool_array`, `write_int_array`, ...)
// rather than through `Encodable`, since a generic `impl<T: Encodable>
// Encodable for Vec<T>` already claims `Vec<T>` for the `LIST` shape and
// Rust has no specialization to prefer a narrower impl.
