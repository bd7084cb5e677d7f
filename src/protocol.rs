//! Per-type read/write records.
//!
//! Rust has no runtime class hierarchy, so "T extends S" (needed to resolve
//! ancestor writers under single inheritance) is modeled as an explicit
//! composition link: `T` embeds an `S` somewhere in its fields, and
//! [`ProtocolBuilder::extends`] is given a plain field-projection function
//! `fn(&T) -> &S` rather than discovered by reflection. See DESIGN.md.

use crate::{
    deserializer::Deserializer,
    error::{bail, ensure, error, Result},
    schema::SchemaBuilder,
    serializer::Serializer,
    value::{BuiltinData, BuiltinView, Poly},
};
use std::{
    any::{Any, TypeId},
    marker::PhantomData,
};

pub(crate) type WriteFn = Box<dyn Fn(&dyn Poly, &mut Serializer<'_>) -> Result<()> + Send + Sync>;
pub(crate) type ReadFn = Box<dyn Fn(&mut Deserializer<'_>) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;
pub(crate) type ProjectFn = Box<dyn for<'v> Fn(&'v dyn Poly) -> &'v (dyn Poly + Send + Sync) + Send + Sync>;
pub(crate) type BuiltinViewFn = Box<dyn for<'v> Fn(&'v dyn Poly) -> BuiltinData<'v> + Send + Sync>;

/// A single type's read/write record, plus its declared modifiers.
pub struct Protocol {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) write: Option<WriteFn>,
    pub(crate) read: Option<ReadFn>,
    pub(crate) has_fallback: bool,
    pub(crate) has_static: bool,
    pub(crate) supertype: Option<TypeId>,
    pub(crate) project_supertype: Option<ProjectFn>,
    pub(crate) builtin_view: Option<BuiltinViewFn>,
    pub(crate) reinstall_key: Option<&'static str>,
}

impl Protocol {
    pub(crate) fn new(type_id: TypeId, name: &'static str) -> Self {
        Protocol {
            type_id,
            name,
            write: None,
            read: None,
            has_fallback: false,
            has_static: false,
            supertype: None,
            project_supertype: None,
            builtin_view: None,
            reinstall_key: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_write(&self) -> bool {
        self.write.is_some()
    }

    pub fn has_read(&self) -> bool {
        self.read.is_some()
    }

    pub fn has_fallback(&self) -> bool {
        self.has_fallback
    }

    pub fn has_static(&self) -> bool {
        self.has_static
    }

    pub fn supertype(&self) -> Option<TypeId> {
        self.supertype
    }

    pub fn reinstall_key(&self) -> Option<&'static str> {
        self.reinstall_key
    }
}

/// Write-only configuration surface for a single type's [`Protocol`].
///
/// There is deliberately no getter for `read`/`write`/`fallback`/`static`:
/// a caller that tries to read back a not-yet-registered op before it's set
/// gets a compile error instead of the runtime error this would otherwise
/// need to guard against. See DESIGN.md.
pub struct ProtocolBuilder<'s, T> {
    schema: &'s mut SchemaBuilder,
    type_id: TypeId,
    _marker: PhantomData<fn() -> T>,
}

impl<'s, T> std::fmt::Debug for ProtocolBuilder<'s, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolBuilder").field("type_id", &self.type_id).finish()
    }
}

impl<'s, T: 'static + Send + Sync> ProtocolBuilder<'s, T> {
    pub(crate) fn new(schema: &'s mut SchemaBuilder, type_id: TypeId) -> Self {
        ProtocolBuilder { schema, type_id, _marker: PhantomData }
    }

    /// Registers a non-static write op. Supertype writers (if any) still run
    /// before this one's bytes are emitted.
    pub fn write<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&T, &mut Serializer<'_>) -> Result<()> + Send + Sync + 'static,
    {
        {
            let entry = self.schema.entry_mut(self.type_id);
            ensure!(entry.write.is_none(), MalformedProtocol, None, "duplicate write op for {}", entry.name);
            entry.write = Some(Box::new(move |v: &dyn Poly, ser: &mut Serializer| {
                let t = v
                    .as_any()
                    .downcast_ref::<T>()
                    .expect("protocol write op invoked with a mismatched concrete type");
                f(t, ser)
            }));
        }
        self.schema.recheck_static_exclusivity(self.type_id)?;
        Ok(self)
    }

    /// Registers a write op that emits only its own bytes: no supertype
    /// packets are produced, and (checked at `finalize`) no subtype of `T`
    /// may register a write op of its own.
    pub fn static_write<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&T, &mut Serializer<'_>) -> Result<()> + Send + Sync + 'static,
    {
        {
            let entry = self.schema.entry_mut(self.type_id);
            ensure!(entry.write.is_none(), MalformedProtocol, None, "duplicate write op for {}", entry.name);
            entry.write = Some(Box::new(move |v: &dyn Poly, ser: &mut Serializer| {
                let t = v
                    .as_any()
                    .downcast_ref::<T>()
                    .expect("protocol write op invoked with a mismatched concrete type");
                f(t, ser)
            }));
            entry.has_static = true;
        }
        self.schema.recheck_static_exclusivity(self.type_id)?;
        Ok(self)
    }

    /// Registers a read op specific to `T`.
    pub fn read<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&mut Deserializer<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let entry = self.schema.entry_mut(self.type_id);
        ensure!(entry.read.is_none(), MalformedProtocol, None, "duplicate read op for {}", entry.name);
        entry.read = Some(Box::new(move |de: &mut Deserializer| {
            f(de).map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
        }));
        Ok(self)
    }

    /// Registers a read op that may also materialize a `T` on behalf of
    /// subtypes with no reader of their own. Legality of `fallback` on a
    /// "final" (childless) type is checked at `Schema::finalize` once the
    /// full subtype graph is known.
    pub fn fallback<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&mut Deserializer<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let entry = self.schema.entry_mut(self.type_id);
        ensure!(entry.read.is_none(), MalformedProtocol, None, "duplicate read op for {}", entry.name);
        entry.read = Some(Box::new(move |de: &mut Deserializer| {
            f(de).map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
        }));
        entry.has_fallback = true;
        Ok(self)
    }

    /// Declares `T`'s supertype as `S`, with `project` extracting the
    /// `S`-shaped view of a `T` (field composition standing in for
    /// inheritance; see the module doc comment).
    pub fn extends<S: 'static + Send + Sync>(self, project: fn(&T) -> &S) -> Result<Self> {
        {
            let entry = self.schema.entry_mut(self.type_id);
            ensure!(entry.supertype.is_none(), MalformedProtocol, None, "duplicate extends for {}", entry.name);
            entry.supertype = Some(TypeId::of::<S>());
            entry.project_supertype = Some(Box::new(move |v: &dyn Poly| -> &(dyn Poly + Send + Sync) {
                let t = v
                    .as_any()
                    .downcast_ref::<T>()
                    .expect("supertype projection invoked with a mismatched concrete type");
                project(t) as &S as &(dyn Poly + Send + Sync)
            }));
        }
        self.schema.recheck_static_exclusivity(self.type_id)?;
        Ok(self)
    }

    /// Records the key `Schema::from_bytes` should look up in its registry
    /// to reinstall this protocol's ops after a round trip through
    /// `Schema::to_bytes` (see `schema::ReinstallFn`).
    pub fn reinstall_key(self, key: &'static str) -> Self {
        self.schema.entry_mut(self.type_id).reinstall_key = Some(key);
        self
    }

    /// Declares that `T` also presents a built-in container shape (its
    /// "built-in ancestor") via `T: BuiltinView`.
    pub fn extends_builtin(self) -> Self
    where
        T: BuiltinView,
    {
        let entry = self.schema.entry_mut(self.type_id);
        entry.builtin_view = Some(Box::new(|v: &dyn Poly| -> BuiltinData<'_> {
            let t = v
                .as_any()
                .downcast_ref::<T>()
                .expect("builtin view invoked with a mismatched concrete type");
            t.builtin_view()
        }));
        self
    }
}
