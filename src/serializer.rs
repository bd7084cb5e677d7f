//! Writes values to a byte sink: the scalar/container fast path used by
//! [`crate::value::Encodable`], and `write_poly`, the schema-driven
//! polymorphic dispatch a caller reaches for when the concrete type of a
//! value is only known at runtime.

use crate::{
    byte_codec::{self, ByteSink},
    error::{bail, ensure, error, Result},
    flag::TypeFlag,
    schema::Schema,
    value::{BuiltinData, Opaque, OpaqueCodec, Poly},
};
use std::any::TypeId;

/// A stack of type names naming the nesting a write (or read) is currently
/// inside, kept only so an [`crate::error::Error`] can show where in a
/// polymorphic dispatch it went wrong.
#[derive(Default)]
pub struct FrameStack {
    frames: Vec<String>,
}

impl FrameStack {
    pub fn new() -> Self {
        FrameStack::default()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>) {
        self.frames.push(name.into());
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn describe(&self) -> String {
        self.frames.join(" -> ")
    }
}

pub struct Serializer<'a> {
    sink: &'a mut dyn ByteSink,
    schema: &'a Schema,
    opaque: &'a dyn OpaqueCodec,
    frames: FrameStack,
}

/// Generates one `write_*_array` method per scalar shape: the array's own
/// tag, a length prefix, then each element with no tag of its own (unlike
/// `LIST`, whose elements are themselves fully tagged values).
macro_rules! primitive_array_writer {
    ($($name:ident : $t:ty = $flag:ident via $write_one:path),* $(,)?) => {
        impl<'a> Serializer<'a> {
            $(
                pub fn $name(&mut self, items: &[$t]) -> Result<()> {
                    self.write_tag(TypeFlag::$flag)?;
                    byte_codec::write_len(self.sink, items.len())?;
                    for &item in items {
                        $write_one(self.sink, item)?;
                    }
                    Ok(())
                }
            )*
        }
    };
}

primitive_array_writer!(
    write_bool_array: bool = BooleanArray via byte_codec::write_bool,
    write_byte_array: i8 = ByteArray via byte_codec::write_i8,
    write_char_array: char = CharArray via byte_codec::write_char,
    write_short_array: i16 = ShortArray via byte_codec::write_i16,
    write_int_array: i32 = IntArray via byte_codec::write_i32,
    write_long_array: i64 = LongArray via byte_codec::write_i64,
    write_float_array: f32 = FloatArray via byte_codec::write_f32,
    write_double_array: f64 = DoubleArray via byte_codec::write_f64,
);

impl<'a> Serializer<'a> {
    pub fn new(sink: &'a mut dyn ByteSink, schema: &'a Schema, opaque: &'a dyn OpaqueCodec) -> Self {
        Serializer { sink, schema, opaque, frames: FrameStack::new() }
    }

    fn write_tag(&mut self, flag: TypeFlag) -> Result<()> {
        byte_codec::write_u8(self.sink, flag.as_byte())
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.write_tag(TypeFlag::Null)
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_tag(TypeFlag::Boolean)?;
        byte_codec::write_bool(self.sink, v)
    }

    pub fn write_byte(&mut self, v: i8) -> Result<()> {
        self.write_tag(TypeFlag::Byte)?;
        byte_codec::write_i8(self.sink, v)
    }

    pub fn write_short(&mut self, v: i16) -> Result<()> {
        self.write_tag(TypeFlag::Short)?;
        byte_codec::write_i16(self.sink, v)
    }

    pub fn write_int(&mut self, v: i32) -> Result<()> {
        self.write_tag(TypeFlag::Int)?;
        byte_codec::write_i32(self.sink, v)
    }

    pub fn write_long(&mut self, v: i64) -> Result<()> {
        self.write_tag(TypeFlag::Long)?;
        byte_codec::write_i64(self.sink, v)
    }

    pub fn write_float(&mut self, v: f32) -> Result<()> {
        self.write_tag(TypeFlag::Float)?;
        byte_codec::write_f32(self.sink, v)
    }

    pub fn write_double(&mut self, v: f64) -> Result<()> {
        self.write_tag(TypeFlag::Double)?;
        byte_codec::write_f64(self.sink, v)
    }

    pub fn write_char(&mut self, v: char) -> Result<()> {
        self.write_tag(TypeFlag::Char)?;
        byte_codec::write_char(self.sink, v)
    }

    pub fn write_unit(&mut self) -> Result<()> {
        self.write_tag(TypeFlag::Unit)
    }

    pub fn write_str(&mut self, v: &str) -> Result<()> {
        self.write_tag(TypeFlag::String)?;
        byte_codec::write_str(self.sink, v)
    }

    /// `Some`/`None` carry no wrapper tag of their own: a present value
    /// encodes exactly as its static type would, and absence is just the
    /// `NULL` tag (null erasure applies uniformly, not only to polymorphic
    /// values).
    pub fn write_some<T: crate::value::Encodable + ?Sized>(&mut self, inner: &T) -> Result<()> {
        inner.encode(self)
    }

    pub fn write_none(&mut self) -> Result<()> {
        self.write_null()
    }

    pub fn write_list<F>(&mut self, len: usize, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Serializer, usize) -> Result<()>,
    {
        self.write_tag(TypeFlag::List)?;
        byte_codec::write_len(self.sink, len)?;
        for i in 0..len {
            f(self, i)?;
        }
        Ok(())
    }

    pub fn write_object_array<F>(&mut self, len: usize, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Serializer, usize) -> Result<()>,
    {
        self.write_tag(TypeFlag::ObjectArray)?;
        byte_codec::write_len(self.sink, len)?;
        for i in 0..len {
            f(self, i)?;
        }
        Ok(())
    }

    /// Unlike `LIST`, length is not known up front: the element stream is
    /// closed by `END_OBJECT`.
    pub fn write_iterable<I, T>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: crate::value::Encodable,
    {
        self.write_tag(TypeFlag::Iterable)?;
        for item in items {
            item.encode(self)?;
        }
        self.write_tag(TypeFlag::EndObject)
    }

    pub fn write_pair<A, B>(&mut self, a: &A, b: &B) -> Result<()>
    where
        A: crate::value::Encodable + ?Sized,
        B: crate::value::Encodable + ?Sized,
    {
        self.write_tag(TypeFlag::Pair)?;
        a.encode(self)?;
        b.encode(self)
    }

    pub fn write_triple<A, B, C>(&mut self, a: &A, b: &B, c: &C) -> Result<()>
    where
        A: crate::value::Encodable + ?Sized,
        B: crate::value::Encodable + ?Sized,
        C: crate::value::Encodable + ?Sized,
    {
        self.write_tag(TypeFlag::Triple)?;
        a.encode(self)?;
        b.encode(self)?;
        c.encode(self)
    }

    /// A standalone key/value pair, distinguishable on the wire from a
    /// `PAIR`. Used for map-entry values that appear outside a `MAP`
    /// container (e.g. iterating a map's entries one at a time).
    pub fn write_map_entry<K, V>(&mut self, k: &K, v: &V) -> Result<()>
    where
        K: crate::value::Encodable + ?Sized,
        V: crate::value::Encodable + ?Sized,
    {
        self.write_tag(TypeFlag::MapEntry)?;
        k.encode(self)?;
        v.encode(self)
    }

    /// A key/value pair written *inside* a `MAP` container: no `MAP_ENTRY`
    /// wrapper tag, just the two tagged values back to back.
    pub fn write_map_pair<K, V>(&mut self, k: &K, v: &V) -> Result<()>
    where
        K: crate::value::Encodable + ?Sized,
        V: crate::value::Encodable + ?Sized,
    {
        k.encode(self)?;
        v.encode(self)
    }

    pub fn write_map<F>(&mut self, len: usize, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Serializer, usize) -> Result<()>,
    {
        self.write_tag(TypeFlag::Map)?;
        byte_codec::write_len(self.sink, len)?;
        for i in 0..len {
            f(self, i)?;
        }
        Ok(())
    }

    fn write_opaque(&mut self, opaque: &Opaque) -> Result<()> {
        let bytes = self.opaque.encode(opaque)?;
        self.write_tag(TypeFlag::Function)?;
        byte_codec::write_bytes(self.sink, &bytes)
    }

    /// Writes `v` if present, or just the `NULL` tag. The polymorphic
    /// counterpart of `write_some`/`write_none`.
    pub fn write_poly_opt(&mut self, v: Option<&dyn Poly>) -> Result<()> {
        match v {
            None => self.write_null(),
            Some(v) => self.write_poly(v),
        }
    }

    /// Resolves and invokes the full write for a non-null polymorphic value:
    /// opaque payloads, built-in shapes, and schema-registered custom types
    /// (including their chain of supertype packets).
    pub fn write_poly(&mut self, v: &dyn Poly) -> Result<()> {
        if v.as_any().downcast_ref::<Opaque>().is_some() {
            let opaque = v.as_any().downcast_ref::<Opaque>().unwrap();
            return self.write_opaque(opaque);
        }

        let type_id = v.as_any().type_id();
        let name = v.poly_type_name();
        ensure!(
            !crate::value::is_anonymous_type_name(name),
            MissingOperation,
            Some(&self.frames),
            "cannot write a value of the anonymous type {}",
            name,
        );

        self.frames.push(name);
        let result = self.write_poly_named(v, type_id, name);
        self.frames.pop();
        result
    }

    fn write_poly_named(&mut self, v: &dyn Poly, type_id: TypeId, name: &'static str) -> Result<()> {
        // Walk from `v`'s exact runtime type up its declared `extends`
        // chain. The nearest ancestor with a registered writer becomes the
        // OBJECT's own payload (written last, just before END_OBJECT); every
        // *further* ancestor writer found beyond it becomes a custom
        // supertype packet, collected here nearest-to-farthest but emitted
        // farthest-first (the wire order is ancestor-to-descendant, own
        // bytes last — see the crate docs' grammar sketch).
        //
        // Each ancestor's writer expects a `&dyn Poly` that downcasts to
        // *that ancestor's own* concrete type, not `v`'s — so as we climb
        // past each `extends` link we re-project the view through that
        // link's `project_supertype`, carrying the narrowed view (not `v`
        // itself) forward to every ancestor writer we invoke.
        let schema = self.schema;
        let mut own: Option<(&crate::protocol::WriteFn, &dyn Poly, bool)> = None;
        let mut ancestors: Vec<(&'static str, &crate::protocol::WriteFn, &dyn Poly)> = Vec::new();
        {
            let mut current_id = type_id;
            let mut current_view: &dyn Poly = v;
            loop {
                let p = match schema.protocol_for(current_id) {
                    Some(p) => p,
                    None => break,
                };
                if let Some(w) = &p.write {
                    if own.is_none() {
                        own = Some((w, current_view, p.has_static()));
                        if p.has_static() {
                            break;
                        }
                    } else {
                        ancestors.push((p.name(), w, current_view));
                    }
                }
                match (&p.project_supertype, p.supertype) {
                    (Some(project), Some(sup_id)) => {
                        current_view = project(current_view);
                        current_id = sup_id;
                    }
                    _ => break,
                }
            }
        }

        let Some((own_writer, own_view, is_static)) = own else {
            if let Some(p) = schema.protocol_for(type_id) {
                if let Some(view) = &p.builtin_view {
                    return self.write_builtin(view(v));
                }
            }
            bail!(
                MissingOperation,
                Some(&self.frames),
                "no write op is registered for {} or any of its declared ancestors",
                name,
            );
        };

        let mut builtin_as_super = None;
        if !is_static {
            // Own emission isn't static: a built-in-as-super packet may
            // also apply.
            if let Some(p) = schema.protocol_for(type_id) {
                if let Some(view) = &p.builtin_view {
                    builtin_as_super = Some(view(v));
                }
            }
        }

        let super_count = ancestors.len() + builtin_as_super.is_some() as usize;
        ensure!(
            super_count <= u8::MAX as usize,
            Framing,
            Some(&self.frames),
            "{} has {} supertype packets, more than the 255 a single OBJECT header can declare",
            name,
            super_count,
        );

        self.write_tag(TypeFlag::Object)?;
        byte_codec::write_str(self.sink, name)?;
        byte_codec::write_u8(self.sink, super_count as u8)?;

        for &(sup_name, writer, view) in ancestors.iter().rev() {
            self.write_tag(TypeFlag::Object)?;
            byte_codec::write_str(self.sink, sup_name)?;
            byte_codec::write_u8(self.sink, 0)?;
            writer(view, self)?;
            self.write_tag(TypeFlag::EndObject)?;
        }

        if let Some(view) = builtin_as_super {
            self.write_builtin(view)?;
        }

        own_writer(own_view, self)?;

        self.write_tag(TypeFlag::EndObject)
    }

    fn write_builtin(&mut self, data: BuiltinData<'_>) -> Result<()> {
        match data {
            BuiltinData::List(items) => self.write_list(items.len(), |ser, i| ser.write_poly(items[i])),
            BuiltinData::Map(entries) => self.write_map(entries.len(), |ser, i| {
                let (k, v) = entries[i];
                ser.write_poly(k)?;
                ser.write_poly(v)
            }),
            BuiltinData::Pair(a, b) => {
                self.write_tag(TypeFlag::Pair)?;
                self.write_poly(a)?;
                self.write_poly(b)
            }
            BuiltinData::Triple(a, b, c) => {
                self.write_tag(TypeFlag::Triple)?;
                self.write_poly(a)?;
                self.write_poly(b)?;
                self.write_poly(c)
            }
            BuiltinData::MapEntry(k, v) => {
                self.write_tag(TypeFlag::MapEntry)?;
                self.write_poly(k)?;
                self.write_poly(v)
            }
            BuiltinData::Unit => self.write_unit(),
        }
    }
}
