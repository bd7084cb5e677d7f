//! The type registry: collects per-type [`Protocol`]s, validates the global
//! invariants that can only be checked once every type is known, and answers
//! the name-keyed lookups a [`crate::deserializer::Deserializer`] needs when
//! an `OBJECT` packet names a type only the wire knows about yet.

use crate::{
    deserializer::Deserializer,
    error::{bail, ensure, error, Error, ErrorKind, Result},
    protocol::{Protocol, ProtocolBuilder},
    serializer::Serializer,
    value::{is_anonymous_type_name, Decodable, Encodable, Opaque, OpaqueCodec, Poly},
};
use std::{
    any::TypeId,
    collections::{HashMap, HashSet},
};

/// Replays one protocol's `SchemaBuilder::define`/builder-method call chain.
/// Registered by name in the `registry` passed to [`Schema::from_bytes`],
/// keyed by the same string each protocol recorded via
/// [`crate::protocol::ProtocolBuilder::reinstall_key`].
pub type ReinstallFn = fn(&mut SchemaBuilder) -> Result<()>;

fn builtin_type_ids() -> &'static [TypeId] {
    use std::sync::OnceLock;
    static IDS: OnceLock<Vec<TypeId>> = OnceLock::new();
    IDS.get_or_init(|| {
        vec![
            TypeId::of::<bool>(),
            TypeId::of::<i8>(),
            TypeId::of::<i16>(),
            TypeId::of::<i32>(),
            TypeId::of::<i64>(),
            TypeId::of::<f32>(),
            TypeId::of::<f64>(),
            TypeId::of::<char>(),
            TypeId::of::<()>(),
            TypeId::of::<String>(),
        ]
    })
}

/// Accumulates protocol registrations; call [`SchemaBuilder::finalize`] once
/// every type the program will ever pass to `write_poly`/`read_poly` has
/// been defined.
pub struct SchemaBuilder {
    protocols: HashMap<TypeId, Protocol>,
    order: Vec<TypeId>,
    thread_safe: bool,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder { protocols: HashMap::new(), order: Vec::new(), thread_safe: false }
    }

    /// Purely descriptive: every registered op is already required to be
    /// `Send + Sync` by its trait bound, so this does not relax anything
    /// when set to `false`. It exists so a [`Schema`] can report its
    /// intended concurrency posture via [`Schema::is_thread_safe`].
    pub fn thread_safe(mut self, thread_safe: bool) -> Self {
        self.thread_safe = thread_safe;
        self
    }

    pub fn define<T: Poly>(&mut self) -> Result<ProtocolBuilder<'_, T>> {
        let type_id = TypeId::of::<T>();
        let name = std::any::type_name::<T>();
        ensure!(
            !is_anonymous_type_name(name),
            MalformedProtocol,
            None,
            "cannot register a protocol for the anonymous type {}",
            name,
        );
        ensure!(
            !builtin_type_ids().contains(&type_id),
            MalformedProtocol,
            None,
            "{} is already covered by a built-in handler",
            name,
        );
        ensure!(
            !self.protocols.contains_key(&type_id),
            MalformedProtocol,
            None,
            "{} is already defined",
            name,
        );
        self.protocols.insert(type_id, Protocol::new(type_id, name));
        self.order.push(type_id);
        Ok(ProtocolBuilder::new(self, type_id))
    }

    pub(crate) fn entry_mut(&mut self, type_id: TypeId) -> &mut Protocol {
        self.protocols
            .get_mut(&type_id)
            .expect("entry_mut called for a type with no SchemaBuilder::define call")
    }

    /// Fails fast for the orderings `recheck_static_exclusivity` can see
    /// immediately: registering a write on a type whose supertype is
    /// already `static`. The fully general check (a static ancestor
    /// registered *after* a writer-bearing descendant) runs in
    /// [`SchemaBuilder::finalize`].
    pub(crate) fn recheck_static_exclusivity(&mut self, type_id: TypeId) -> Result<()> {
        let entry = &self.protocols[&type_id];
        if entry.write.is_none() {
            return Ok(());
        }
        let Some(supertype) = entry.supertype else {
            return Ok(());
        };
        if let Some(sup) = self.protocols.get(&supertype) {
            ensure!(
                !sup.has_static,
                MalformedProtocol,
                None,
                "{} cannot register a write op: its ancestor {} is static",
                entry.name,
                sup.name,
            );
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<Schema> {
        let mut children: HashMap<TypeId, Vec<TypeId>> = HashMap::new();
        for (&id, p) in &self.protocols {
            if let Some(sup) = p.supertype {
                children.entry(sup).or_default().push(id);
            }
        }

        for (&id, p) in &self.protocols {
            if p.has_fallback {
                ensure!(
                    children.get(&id).is_some_and(|c| !c.is_empty()),
                    MalformedProtocol,
                    None,
                    "{} registers a fallback reader but has no subtypes to fall back for",
                    p.name,
                );
            }
            if p.has_static {
                let mut stack = children.get(&id).cloned().unwrap_or_default();
                let mut seen = HashSet::new();
                while let Some(child_id) = stack.pop() {
                    if !seen.insert(child_id) {
                        continue;
                    }
                    let child = &self.protocols[&child_id];
                    ensure!(
                        child.write.is_none(),
                        MalformedProtocol,
                        None,
                        "{} is static but its descendant {} registers its own write op",
                        p.name,
                        child.name,
                    );
                    stack.extend(children.get(&child_id).into_iter().flatten().copied());
                }
            }
        }

        let mut name_to_type = HashMap::with_capacity(self.protocols.len());
        for p in self.protocols.values() {
            name_to_type.insert(p.name, p.type_id);
        }

        Ok(Schema { protocols: self.protocols, name_to_type, thread_safe: self.thread_safe })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable, validated type registry. Cheap to share: build once, then
/// hand out `&Schema` to as many serializers/deserializers as needed.
pub struct Schema {
    protocols: HashMap<TypeId, Protocol>,
    name_to_type: HashMap<&'static str, TypeId>,
    thread_safe: bool,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("types", &self.name_to_type.keys().collect::<Vec<_>>())
            .field("thread_safe", &self.thread_safe)
            .finish()
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    pub fn protocol_for(&self, type_id: TypeId) -> Option<&Protocol> {
        self.protocols.get(&type_id)
    }

    pub fn protocol_by_name(&self, name: &str) -> Option<&Protocol> {
        self.name_to_type.get(name).and_then(|id| self.protocols.get(id))
    }

    pub fn type_id_by_name(&self, name: &str) -> Option<TypeId> {
        self.name_to_type.get(name).copied()
    }

    /// Walks from `type_id` up through `supertype` links, yielding `type_id`
    /// itself first, then each registered ancestor in declaration order.
    pub(crate) fn ancestry(&self, type_id: TypeId) -> impl Iterator<Item = &Protocol> {
        let mut current = Some(type_id);
        std::iter::from_fn(move || {
            let id = current?;
            let p = self.protocols.get(&id)?;
            current = p.supertype;
            Some(p)
        })
    }

    /// A human-readable listing of every registered type and its modifiers,
    /// primarily useful for debugging a schema mismatch between two builds.
    pub fn describe(&self) -> String {
        let mut names: Vec<&Protocol> = self.protocols.values().collect();
        names.sort_by_key(|p| p.name);
        let mut out = String::new();
        for p in names {
            out.push_str(p.name);
            let mut tags = Vec::new();
            if p.has_write() {
                tags.push(if p.has_static() { "static-write" } else { "write" });
            }
            if p.has_read() {
                tags.push(if p.has_fallback() { "fallback" } else { "read" });
            }
            if let Some(sup) = p.supertype().and_then(|id| self.protocols.get(&id)) {
                out.push_str(" extends ");
                out.push_str(sup.name);
            }
            if !tags.is_empty() {
                out.push_str(" [");
                out.push_str(&tags.join(", "));
                out.push(']');
            }
            out.push('\n');
        }
        out
    }

    /// A stable fingerprint of the registered surface (names + modifiers),
    /// useful for cheaply comparing the schemas two peers built independently
    /// without shipping the whole description.
    pub fn fingerprint(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        let mut names: Vec<&Protocol> = self.protocols.values().collect();
        names.sort_by_key(|p| p.name);
        for p in names {
            hasher.update(p.name.as_bytes());
            hasher.update([p.has_write() as u8, p.has_static() as u8, p.has_read() as u8, p.has_fallback() as u8]);
            if let Some(sup) = p.supertype().and_then(|id| self.protocols.get(&id)) {
                hasher.update(sup.name.as_bytes());
            }
        }
        hasher.finalize().into()
    }

    /// Serializes the registered surface: each protocol's name,
    /// `has_static`/`has_fallback` flags, supertype name, and a
    /// `FUNCTION`-tagged payload identifying (through `opaque`) which
    /// pre-registered ops to reinstall for it. Rust closures aren't
    /// byte-serializable, so this round-trips the stable key set by
    /// [`crate::protocol::ProtocolBuilder::reinstall_key`] rather than
    /// genuine closure bytecode.
    pub fn to_bytes(&self, opaque: &dyn OpaqueCodec) -> Result<Vec<u8>> {
        let mut protocols: Vec<&Protocol> = self.protocols.values().collect();
        protocols.sort_by_key(|p| p.name);
        let mut buf = Vec::new();
        let mut ser = Serializer::new(&mut buf, self, opaque);
        ser.write_list(protocols.len(), |ser, i| {
            let p = protocols[i];
            ser.write_str(p.name)?;
            ser.write_bool(p.has_static())?;
            ser.write_bool(p.has_fallback())?;
            let sup_name: Option<String> =
                p.supertype().and_then(|id| self.protocols.get(&id)).map(|s| s.name.to_string());
            sup_name.encode(ser)?;
            let key = p.reinstall_key().unwrap_or("").to_string();
            ser.write_poly(&Opaque::new(key))
        })?;
        Ok(buf)
    }

    /// Reconstructs a schema previously written by [`Schema::to_bytes`].
    /// `registry` maps each protocol's reinstall key back to the function
    /// that replays its definition.
    pub fn from_bytes(bytes: &[u8], registry: &HashMap<&str, ReinstallFn>, opaque: &dyn OpaqueCodec) -> Result<Schema> {
        let placeholder = SchemaBuilder::new().finalize()?;
        let mut slice = bytes;
        let mut de = Deserializer::new(&mut slice, &placeholder, opaque);
        let records = de.read_list(|de| {
            let name = de.read_str()?;
            let _has_static = de.read_bool()?;
            let _has_fallback = de.read_bool()?;
            let _sup_name: Option<String> = Decodable::decode(de)?;
            let opaque_val = de.read_poly()?;
            Ok((name, opaque_val))
        })?;
        let mut builder = SchemaBuilder::new();
        for (name, opaque_val) in records {
            let key = opaque_val
                .and_then(|v| v.downcast::<Opaque>().ok())
                .and_then(|op| op.0.downcast::<String>().ok())
                .map(|s| *s)
                .unwrap_or_default();
            let reinstall = registry.get(key.as_str()).ok_or_else(|| {
                Error::new(ErrorKind::MalformedProtocol, format!("no reinstall function registered for key {:?} (protocol {})", key, name), None)
            })?;
            reinstall(&mut builder)?;
        }
        builder.finalize()
    }
}

fn _assert_schema_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<Schema>();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Parent;
    struct Child;

    #[test]
    fn rejects_duplicate_definition() {
        let mut b = SchemaBuilder::new();
        b.define::<Parent>().unwrap();
        assert!(b.define::<Parent>().is_err());
    }

    #[test]
    fn rejects_builtin_redefinition() {
        let mut b = SchemaBuilder::new();
        assert!(b.define::<bool>().is_err());
    }

    #[test]
    fn fallback_requires_a_subtype() {
        let mut b = SchemaBuilder::new();
        b.define::<Parent>().unwrap().fallback(|_de| Ok(Parent)).unwrap();
        assert!(b.finalize().is_err());
    }

    #[test]
    fn fallback_with_subtype_is_legal() {
        let mut b = SchemaBuilder::new();
        b.define::<Parent>().unwrap().fallback(|_de| Ok(Parent)).unwrap();
        b.define::<Child>().unwrap().extends::<Parent>(|_c| unreachable!()).unwrap();
        assert!(b.finalize().is_ok());
    }

    #[test]
    fn static_ancestor_rejects_writer_bearing_descendant() {
        let mut b = SchemaBuilder::new();
        b.define::<Parent>().unwrap().static_write(|_p, _ser| Ok(())).unwrap();
        let child = b.define::<Child>().unwrap().extends::<Parent>(|_c| unreachable!()).unwrap();
        assert!(child.write(|_c, _ser| Ok(())).is_err());
    }
}
