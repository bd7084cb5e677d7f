//! Reads values from a byte source: the scalar/container fast path used by
//! [`crate::value::Decodable`], and `read_poly`, the dual of
//! [`crate::serializer::Serializer::write_poly`].

use crate::{
    byte_codec::{self, ByteSource},
    error::{bail, ensure, error, Result},
    flag::{expect_flag, TypeFlag},
    schema::Schema,
    serializer::FrameStack,
    value::{Opaque, OpaqueCodec},
};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

pub struct Deserializer<'a> {
    source: &'a mut dyn ByteSource,
    schema: &'a Schema,
    opaque: &'a dyn OpaqueCodec,
    frames: FrameStack,
    peeked: Option<TypeFlag>,
    /// Raw bytes of each custom supertype packet captured for the `OBJECT`
    /// currently being read, keyed by the ancestor's registered name.
    /// Populated around each call into a schema reader; see
    /// [`Deserializer::supertype`].
    supertypes: HashMap<String, Vec<u8>>,
    /// The built-in-as-super packet captured for the current `OBJECT`, if
    /// any.
    builtin_super: Option<(TypeFlag, Vec<u8>)>,
}

impl<'a> Deserializer<'a> {
    pub fn new(source: &'a mut dyn ByteSource, schema: &'a Schema, opaque: &'a dyn OpaqueCodec) -> Self {
        Deserializer {
            source,
            schema,
            opaque,
            frames: FrameStack::new(),
            peeked: None,
            supertypes: HashMap::new(),
            builtin_super: None,
        }
    }

    /// Decodes the ancestor packet for `S` captured alongside the `OBJECT`
    /// currently being read, if the wire included one and `S` has a
    /// registered reader. Returns `Ok(None)` (not an error) when `S` simply
    /// wasn't one of the packets sent — e.g. a newer writer's subtype the
    /// reader doesn't know about.
    pub fn supertype<S: 'static>(&mut self) -> Result<Option<S>> {
        let type_id = std::any::TypeId::of::<S>();
        let Some(protocol) = self.schema.protocol_for(type_id) else { return Ok(None) };
        let name = protocol.name();
        let Some(bytes) = self.supertypes.get(name).cloned() else { return Ok(None) };
        let Some((_, reader)) = self.schema.ancestry(type_id).find_map(|p| p.read.as_ref().map(|r| (p.name(), r))) else {
            bail!(
                MissingOperation,
                Some(&self.frames),
                "supertype packet {} was sent but no read op is registered for it",
                name,
            );
        };
        let mut slice = bytes.as_slice();
        let mut nested = Deserializer::new(&mut slice, self.schema, self.opaque);
        let value = reader(&mut nested)?;
        Ok(Some(*value.downcast::<S>().map_err(|_| {
            crate::error::error!(TypeMismatch, Some(&self.frames), "registered reader for {} produced the wrong type", name)
        })?))
    }

    /// Raw access to the built-in-as-super packet captured for the `OBJECT`
    /// currently being read, if the writer sent one. Most callers want
    /// `supertype::<S>()` instead; this is the escape hatch for a type whose
    /// built-in ancestor has no registered `Protocol` of its own.
    pub fn builtin_supertype_bytes(&self) -> Option<(TypeFlag, &[u8])> {
        self.builtin_super.as_ref().map(|(flag, bytes)| (*flag, bytes.as_slice()))
    }

    /// Raw bytes of the ancestor packet named by `S`'s registered protocol,
    /// for a reader that wants to pull fields directly rather than go
    /// through a registered reader for `S` itself (e.g. `S` has no reader
    /// of its own — only its subtype does). Most callers with a reader for
    /// `S` want `supertype::<S>()` instead.
    pub fn supertype_bytes<S: 'static>(&self) -> Option<&[u8]> {
        let type_id = TypeId::of::<S>();
        let protocol = self.schema.protocol_for(type_id)?;
        self.supertypes.get(protocol.name()).map(|v| v.as_slice())
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn opaque_codec(&self) -> &'a dyn OpaqueCodec {
        self.opaque
    }

    fn peek_tag(&mut self) -> Result<TypeFlag> {
        if let Some(flag) = self.peeked {
            return Ok(flag);
        }
        let byte = byte_codec::read_u8(self.source)?;
        let flag = TypeFlag::from_byte(byte)?;
        self.peeked = Some(flag);
        Ok(flag)
    }

    fn consume_tag(&mut self, want: TypeFlag) -> Result<()> {
        let got = self.peek_tag()?;
        self.peeked = None;
        expect_flag(got, want)
    }

    pub fn is_next_null(&mut self) -> Result<bool> {
        Ok(self.peek_tag()? == TypeFlag::Null)
    }

    pub fn read_null(&mut self) -> Result<()> {
        self.consume_tag(TypeFlag::Null)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.consume_tag(TypeFlag::Boolean)?;
        byte_codec::read_bool(self.source)
    }

    pub fn read_byte(&mut self) -> Result<i8> {
        self.consume_tag(TypeFlag::Byte)?;
        byte_codec::read_i8(self.source)
    }

    pub fn read_short(&mut self) -> Result<i16> {
        self.consume_tag(TypeFlag::Short)?;
        byte_codec::read_i16(self.source)
    }

    pub fn read_int(&mut self) -> Result<i32> {
        self.consume_tag(TypeFlag::Int)?;
        byte_codec::read_i32(self.source)
    }

    pub fn read_long(&mut self) -> Result<i64> {
        self.consume_tag(TypeFlag::Long)?;
        byte_codec::read_i64(self.source)
    }

    pub fn read_float(&mut self) -> Result<f32> {
        self.consume_tag(TypeFlag::Float)?;
        byte_codec::read_f32(self.source)
    }

    pub fn read_double(&mut self) -> Result<f64> {
        self.consume_tag(TypeFlag::Double)?;
        byte_codec::read_f64(self.source)
    }

    pub fn read_char(&mut self) -> Result<char> {
        self.consume_tag(TypeFlag::Char)?;
        byte_codec::read_char(self.source)
    }

    pub fn read_unit(&mut self) -> Result<()> {
        self.consume_tag(TypeFlag::Unit)
    }

    pub fn read_str(&mut self) -> Result<String> {
        self.consume_tag(TypeFlag::String)?;
        byte_codec::read_str(self.source)
    }

    fn read_array_body<T>(&mut self, flag: TypeFlag, mut read_one: impl FnMut(&mut dyn ByteSource) -> Result<T>) -> Result<Vec<T>> {
        self.consume_tag(flag)?;
        let len = byte_codec::read_len(self.source)?;
        let mut items = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            items.push(read_one(self.source)?);
        }
        Ok(items)
    }

    pub fn read_bool_array(&mut self) -> Result<Vec<bool>> {
        self.read_array_body(TypeFlag::BooleanArray, byte_codec::read_bool)
    }

    pub fn read_byte_array(&mut self) -> Result<Vec<i8>> {
        self.read_array_body(TypeFlag::ByteArray, byte_codec::read_i8)
    }

    pub fn read_char_array(&mut self) -> Result<Vec<char>> {
        self.read_array_body(TypeFlag::CharArray, byte_codec::read_char)
    }

    pub fn read_short_array(&mut self) -> Result<Vec<i16>> {
        self.read_array_body(TypeFlag::ShortArray, byte_codec::read_i16)
    }

    pub fn read_int_array(&mut self) -> Result<Vec<i32>> {
        self.read_array_body(TypeFlag::IntArray, byte_codec::read_i32)
    }

    pub fn read_long_array(&mut self) -> Result<Vec<i64>> {
        self.read_array_body(TypeFlag::LongArray, byte_codec::read_i64)
    }

    pub fn read_float_array(&mut self) -> Result<Vec<f32>> {
        self.read_array_body(TypeFlag::FloatArray, byte_codec::read_f32)
    }

    pub fn read_double_array(&mut self) -> Result<Vec<f64>> {
        self.read_array_body(TypeFlag::DoubleArray, byte_codec::read_f64)
    }

    /// `NULL` here means absence regardless of the requested static type;
    /// otherwise `f` reads the present value from this same position (the
    /// tag it expects has already been peeked, not consumed twice).
    pub fn read_option<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        if self.is_next_null()? {
            self.read_null()?;
            Ok(None)
        } else {
            Ok(Some(f(self)?))
        }
    }

    pub fn read_list<T>(&mut self, mut f: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        self.consume_tag(TypeFlag::List)?;
        let len = byte_codec::read_len(self.source)?;
        let mut items = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            items.push(f(self)?);
        }
        Ok(items)
    }

    pub fn read_object_array<T>(&mut self, mut f: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        self.consume_tag(TypeFlag::ObjectArray)?;
        let len = byte_codec::read_len(self.source)?;
        let mut items = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            items.push(f(self)?);
        }
        Ok(items)
    }

    /// Reads elements until `END_OBJECT`, since `ITERABLE` carries no
    /// up-front length.
    pub fn read_iterable<T>(&mut self, mut f: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        self.consume_tag(TypeFlag::Iterable)?;
        let mut items = Vec::new();
        while self.peek_tag()? != TypeFlag::EndObject {
            items.push(f(self)?);
        }
        self.consume_tag(TypeFlag::EndObject)?;
        Ok(items)
    }

    pub fn read_pair<A, B>(
        &mut self,
        fa: impl FnOnce(&mut Self) -> Result<A>,
        fb: impl FnOnce(&mut Self) -> Result<B>,
    ) -> Result<(A, B)> {
        self.consume_tag(TypeFlag::Pair)?;
        Ok((fa(self)?, fb(self)?))
    }

    pub fn read_triple<A, B, C>(
        &mut self,
        fa: impl FnOnce(&mut Self) -> Result<A>,
        fb: impl FnOnce(&mut Self) -> Result<B>,
        fc: impl FnOnce(&mut Self) -> Result<C>,
    ) -> Result<(A, B, C)> {
        self.consume_tag(TypeFlag::Triple)?;
        Ok((fa(self)?, fb(self)?, fc(self)?))
    }

    /// Reads a standalone `MAP_ENTRY`-tagged key/value pair.
    pub fn read_map_entry<K, V>(
        &mut self,
        fk: impl FnOnce(&mut Self) -> Result<K>,
        fv: impl FnOnce(&mut Self) -> Result<V>,
    ) -> Result<(K, V)> {
        self.consume_tag(TypeFlag::MapEntry)?;
        Ok((fk(self)?, fv(self)?))
    }

    pub fn begin_map(&mut self) -> Result<usize> {
        self.consume_tag(TypeFlag::Map)?;
        byte_codec::read_len(self.source)
    }

    /// Reads one untagged key/value pair from inside a `MAP` container.
    pub fn read_map_entry_elem<K, V>(
        &mut self,
        fk: impl FnOnce(&mut Self) -> Result<K>,
        fv: impl FnOnce(&mut Self) -> Result<V>,
    ) -> Result<(K, V)> {
        Ok((fk(self)?, fv(self)?))
    }

    pub fn finish_map(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_opaque(&mut self) -> Result<Opaque> {
        self.consume_tag(TypeFlag::Function)?;
        let bytes = byte_codec::read_byte_string(self.source)?;
        self.opaque.decode(&bytes)
    }

    /// Reads the next value as `NULL` or a schema-resolved custom type,
    /// returning the latter boxed and type-erased: the caller downcasts to
    /// whatever static type it expected (which may legitimately differ from
    /// what is on the wire, e.g. a fallback reader producing a supertype in
    /// place of an unrecognized subtype).
    pub fn read_poly(&mut self) -> Result<Option<Box<dyn Any + Send + Sync>>> {
        if self.is_next_null()? {
            self.read_null()?;
            return Ok(None);
        }
        if self.peek_tag()? == TypeFlag::Function {
            let opaque = self.read_opaque()?;
            return Ok(Some(Box::new(opaque)));
        }
        self.consume_tag(TypeFlag::Object)?;
        let name = byte_codec::read_str(self.source)?;
        let super_count = byte_codec::read_u8(self.source)?;

        self.frames.push(name.clone());
        let result = self.read_object_body(&name, super_count);
        self.frames.pop();
        result
    }

    fn read_object_body(&mut self, name: &str, super_count: u8) -> Result<Option<Box<dyn Any + Send + Sync>>> {
        let mut supertypes: HashMap<String, Vec<u8>> = HashMap::new();
        let mut builtin_super = None;

        for _ in 0..super_count {
            match self.peek_tag()? {
                TypeFlag::Object => {
                    self.consume_tag(TypeFlag::Object)?;
                    let sup_name = byte_codec::read_str(self.source)?;
                    let inner_supers = byte_codec::read_u8(self.source)?;
                    ensure!(
                        inner_supers == 0,
                        Framing,
                        Some(&self.frames),
                        "nested supertype packet {} declares {} supertypes of its own, expected 0",
                        sup_name,
                        inner_supers,
                    );
                    let bytes = self.capture_until_end_object()?;
                    supertypes.insert(sup_name, bytes);
                }
                _ => {
                    // The built-in-as-super packet, if present, is always
                    // last and carries no OBJECT framing of its own.
                    builtin_super = Some(self.capture_one_value()?);
                }
            }
        }

        let schema = self.schema;
        let Some(protocol_type_id) = schema.type_id_by_name(name) else {
            bail!(
                MissingOperation,
                Some(&self.frames),
                "no type named {} is registered; cannot resolve a reader",
                name,
            );
        };

        let reader = schema.ancestry(protocol_type_id).find_map(|p| p.read.as_ref().map(|r| (p.name(), r)));

        let Some((_, reader)) = reader else {
            bail!(
                MissingOperation,
                Some(&self.frames),
                "no read op is registered for {} or any of its declared ancestors",
                name,
            );
        };

        let prev_supertypes = std::mem::replace(&mut self.supertypes, supertypes);
        let prev_builtin_super = std::mem::replace(&mut self.builtin_super, builtin_super);
        let value = reader(self);
        self.supertypes = prev_supertypes;
        self.builtin_super = prev_builtin_super;
        let value = value?;
        self.consume_tag(TypeFlag::EndObject)?;
        Ok(Some(value))
    }

    /// Copies raw bytes for one fully-framed `OBJECT ... END_OBJECT` value
    /// (the `OBJECT`/`END_OBJECT` tags themselves were already consumed by
    /// the caller) so the body can be parsed again later from a
    /// `supertype::<S>()` call.
    fn capture_until_end_object(&mut self) -> Result<Vec<u8>> {
        let mut recorder = RecordingSource { inner: self.source, buf: Vec::new(), peeked: self.peeked.take() };
        loop {
            let byte = byte_codec::read_u8(&mut recorder)?;
            let flag = TypeFlag::from_byte(byte)?;
            if flag == TypeFlag::EndObject {
                break;
            }
            skip_tagged(&mut recorder, flag)?;
        }
        self.peeked = None;
        // The terminating END_OBJECT tag belongs to the framing, not to the
        // ancestor's own field data that a nested reader will replay.
        recorder.buf.pop();
        Ok(recorder.buf)
    }

    /// Copies the raw bytes of exactly one tagged value (used for a
    /// built-in-as-super packet, which is not OBJECT-framed).
    fn capture_one_value(&mut self) -> Result<(TypeFlag, Vec<u8>)> {
        let mut recorder = RecordingSource { inner: self.source, buf: Vec::new(), peeked: self.peeked.take() };
        let byte = byte_codec::read_u8(&mut recorder)?;
        let flag = TypeFlag::from_byte(byte)?;
        skip_tagged(&mut recorder, flag)?;
        self.peeked = None;
        Ok((flag, recorder.buf))
    }
}

/// Reads and discards one already-tagged value, recursing into containers
/// and `OBJECT` bodies so nested polymorphic fields are fully consumed
/// rather than just their header. Each `OBJECT` is self-delimiting (its own
/// `END_OBJECT` is read here, not left for an outer loop), so this never
/// needs a shared nesting counter.
fn skip_tagged(source: &mut dyn ByteSource, flag: TypeFlag) -> Result<()> {
    match flag {
        TypeFlag::Null | TypeFlag::Unit => {}
        TypeFlag::Boolean => {
            byte_codec::read_bool(source)?;
        }
        TypeFlag::Byte => {
            byte_codec::read_i8(source)?;
        }
        TypeFlag::Char => {
            byte_codec::read_char(source)?;
        }
        TypeFlag::Short => {
            byte_codec::read_i16(source)?;
        }
        TypeFlag::Int => {
            byte_codec::read_i32(source)?;
        }
        TypeFlag::Long => {
            byte_codec::read_i64(source)?;
        }
        TypeFlag::Float => {
            byte_codec::read_f32(source)?;
        }
        TypeFlag::Double => {
            byte_codec::read_f64(source)?;
        }
        TypeFlag::String => {
            byte_codec::read_str(source)?;
        }
        TypeFlag::Function => {
            byte_codec::read_byte_string(source)?;
        }
        TypeFlag::BooleanArray => skip_primitive_array(source, |s| byte_codec::read_bool(s).map(drop))?,
        TypeFlag::ByteArray => skip_primitive_array(source, |s| byte_codec::read_i8(s).map(drop))?,
        TypeFlag::CharArray => skip_primitive_array(source, |s| byte_codec::read_char(s).map(drop))?,
        TypeFlag::ShortArray => skip_primitive_array(source, |s| byte_codec::read_i16(s).map(drop))?,
        TypeFlag::IntArray => skip_primitive_array(source, |s| byte_codec::read_i32(s).map(drop))?,
        TypeFlag::LongArray => skip_primitive_array(source, |s| byte_codec::read_i64(s).map(drop))?,
        TypeFlag::FloatArray => skip_primitive_array(source, |s| byte_codec::read_f32(s).map(drop))?,
        TypeFlag::DoubleArray => skip_primitive_array(source, |s| byte_codec::read_f64(s).map(drop))?,
        TypeFlag::List | TypeFlag::ObjectArray | TypeFlag::Map => {
            let len = byte_codec::read_len(source)?;
            let multiplier = if flag == TypeFlag::Map { 2 } else { 1 };
            for _ in 0..(len * multiplier) {
                skip_one(source)?;
            }
        }
        TypeFlag::Pair => {
            skip_one(source)?;
            skip_one(source)?;
        }
        TypeFlag::Triple => {
            skip_one(source)?;
            skip_one(source)?;
            skip_one(source)?;
        }
        TypeFlag::MapEntry => {
            skip_one(source)?;
            skip_one(source)?;
        }
        TypeFlag::Iterable => loop {
            let byte = byte_codec::read_u8(source)?;
            let inner = TypeFlag::from_byte(byte)?;
            if inner == TypeFlag::EndObject {
                break;
            }
            skip_tagged(source, inner)?;
        },
        TypeFlag::Object => {
            // `superCount` is not consulted: every declared supertype that is
            // itself OBJECT-framed self-delimits via its own `END_OBJECT`,
            // and a trailing built-in-as-super packet (if any) is just one
            // more ordinary tagged value, so the same inner loop that reads
            // this object's own fields also walks straight through them.
            byte_codec::read_str(source)?;
            byte_codec::read_u8(source)?;
            loop {
                let byte = byte_codec::read_u8(source)?;
                let inner = TypeFlag::from_byte(byte)?;
                if inner == TypeFlag::EndObject {
                    break;
                }
                skip_tagged(source, inner)?;
            }
        }
        TypeFlag::EndObject => {
            bail!(Framing, None, "unexpected END_OBJECT outside any open OBJECT/ITERABLE body");
        }
    }
    Ok(())
}

fn skip_one(source: &mut dyn ByteSource) -> Result<()> {
    let byte = byte_codec::read_u8(source)?;
    let flag = TypeFlag::from_byte(byte)?;
    skip_tagged(source, flag)
}

fn skip_primitive_array(source: &mut dyn ByteSource, mut read_one: impl FnMut(&mut dyn ByteSource) -> Result<()>) -> Result<()> {
    let len = byte_codec::read_len(source)?;
    for _ in 0..len {
        read_one(source)?;
    }
    Ok(())
}

/// Wraps a `ByteSource`, copying every byte it reads into `buf`. Used to
/// capture a supertype packet's raw bytes so it can be replayed later by a
/// `supertype::<S>()` call.
struct RecordingSource<'a> {
    inner: &'a mut dyn ByteSource,
    buf: Vec<u8>,
    peeked: Option<TypeFlag>,
}

impl<'a> ByteSource for RecordingSource<'a> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        if let Some(flag) = self.peeked.take() {
            buf[0] = flag.as_byte();
            self.buf.push(flag.as_byte());
            if buf.len() > 1 {
                self.inner.read_bytes(&mut buf[1..])?;
                self.buf.extend_from_slice(&buf[1..]);
            }
            return Ok(());
        }
        self.inner.read_bytes(buf)?;
        self.buf.extend_from_slice(buf);
        Ok(())
    }
}
