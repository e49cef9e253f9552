//! The `Binder`: a registry mapping native types to specs.
//!
//! Registration is explicit. Records go in as [`RecordLayout`] recipes, enums
//! as constant tables, and anything else through a [`SpecFinder`]. Resolution
//! walks prepended finders, builtin scalars, records, enums, then appended
//! finders, and memoizes the winning spec per type until the next
//! registration.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::error::BindError;
use crate::reader::{ArrayStream, JsonReader};
use crate::replay::Replay;
use crate::spec::{Materializer, Spec, SpecKind};
use crate::value::{Native, OpaqueValue, Scalar, Value};
use crate::visitor::{ArrayVisitor, ObjectVisitor, VisitorMode};
use crate::writer::JsonWriter;

pub mod record;
mod visitors;

pub use record::{FieldInput, RecordLayout, Slots};

use record::LayoutRecipe;
use visitors::{BindArrayVisitor, BindObjectVisitor, Out, PullComponent};

/// A type identity carrying a printable name for diagnostics.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TypeKey {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> TypeKey {
        TypeKey {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Pluggable spec resolution. `Ok(None)` declines the type and hands the
/// lookup to the next finder in line.
pub trait SpecFinder: Send + Sync {
    fn find(&self, key: TypeKey, binder: &Binder) -> Result<Option<Spec>, BindError>;
}

impl<F> SpecFinder for F
where
    F: Fn(TypeKey, &Binder) -> Result<Option<Spec>, BindError> + Send + Sync,
{
    fn find(&self, key: TypeKey, binder: &Binder) -> Result<Option<Spec>, BindError> {
        self(key, binder)
    }
}

type ScalarWriter =
    Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<Value, BindError> + Send + Sync>;

pub struct Binder {
    records: HashMap<TypeId, Arc<dyn LayoutRecipe>>,
    enums: HashMap<TypeId, Spec>,
    prepended: Vec<Arc<dyn SpecFinder>>,
    finders: Vec<Arc<dyn SpecFinder>>,
    scalar_writers: HashMap<TypeId, ScalarWriter>,
    cache: RwLock<HashMap<TypeId, Spec>>,
}

fn builtin_scalar(key: TypeKey) -> Option<Spec> {
    if key.id == TypeId::of::<bool>() {
        Some(Spec::scalar::<bool>())
    } else if key.id == TypeId::of::<i32>() {
        Some(Spec::scalar::<i32>())
    } else if key.id == TypeId::of::<i64>() {
        Some(Spec::scalar::<i64>())
    } else if key.id == TypeId::of::<f32>() {
        Some(Spec::scalar::<f32>())
    } else if key.id == TypeId::of::<f64>() {
        Some(Spec::scalar::<f64>())
    } else if key.id == TypeId::of::<String>() {
        Some(Spec::scalar::<String>())
    } else {
        None
    }
}

fn scalar_write<S: Scalar + Clone>() -> ScalarWriter {
    Arc::new(|any| {
        any.downcast_ref::<S>()
            .cloned()
            .map(S::into_value)
            .ok_or_else(|| BindError::TypeMismatch {
                expected: S::spec_name(),
                context: "scalar write".to_string(),
            })
    })
}

fn downcast_native<T: Any>(native: Native, context: &'static str) -> Result<T, BindError> {
    native
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| BindError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            context: context.to_string(),
        })
}

impl Default for Binder {
    fn default() -> Self {
        Binder::new()
    }
}

impl Binder {
    pub fn new() -> Binder {
        let mut scalar_writers: HashMap<TypeId, ScalarWriter> = HashMap::new();
        scalar_writers.insert(TypeId::of::<bool>(), scalar_write::<bool>());
        scalar_writers.insert(TypeId::of::<i32>(), scalar_write::<i32>());
        scalar_writers.insert(TypeId::of::<i64>(), scalar_write::<i64>());
        scalar_writers.insert(TypeId::of::<f32>(), scalar_write::<f32>());
        scalar_writers.insert(TypeId::of::<f64>(), scalar_write::<f64>());
        scalar_writers.insert(TypeId::of::<String>(), scalar_write::<String>());
        Binder {
            records: HashMap::new(),
            enums: HashMap::new(),
            prepended: Vec::new(),
            finders: Vec::new(),
            scalar_writers,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a record layout for `T`. Bound members resolve lazily, so
    /// mutually referencing records may be registered in any order.
    pub fn register_record<T: Any + Send + Sync>(&mut self, layout: RecordLayout<T>) -> &mut Self {
        self.records.insert(TypeId::of::<T>(), Arc::new(layout));
        self.invalidate();
        self
    }

    /// Registers `T` as a closed constant set encoded as JSON strings.
    pub fn register_enum<T>(&mut self, name: &'static str, constants: Vec<(&'static str, T)>) -> &mut Self
    where
        T: Any + Send + Sync + Clone + PartialEq,
    {
        let constants = Arc::new(constants);

        let read_constants = constants.clone();
        let read_context = format!("{name} constant");
        let to_native = move |value: Value| -> Result<Value, BindError> {
            let s = value.string_value(&read_context)?.to_string();
            for (n, c) in read_constants.iter() {
                if *n == s {
                    return Ok(Value::Opaque(OpaqueValue::with_repr(c.clone(), n)));
                }
            }
            Err(BindError::UnknownEnumConstant {
                spec: name.to_string(),
                value: s,
            })
        };

        let write_constants = constants.clone();
        let to_json = move |value: Value| -> Result<Value, BindError> {
            match value {
                Value::Opaque(op) => {
                    if let Some(t) = op.downcast_ref::<T>() {
                        for (n, c) in write_constants.iter() {
                            if c == t {
                                return Ok(Value::Str((*n).to_string()));
                            }
                        }
                    }
                    Err(BindError::UnknownEnumConstant {
                        spec: name.to_string(),
                        value: op.repr().to_string(),
                    })
                }
                other => Err(BindError::TypeMismatch {
                    expected: "opaque",
                    context: format!("{name} write ({} value)", other.kind()),
                }),
            }
        };

        let materialize: Materializer = Arc::new(move |value| match value {
            Value::Opaque(op) => op
                .downcast_ref::<T>()
                .cloned()
                .map(|t| Box::new(t) as Native)
                .ok_or_else(|| BindError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                    context: format!("{name} constant"),
                }),
            other => Err(BindError::TypeMismatch {
                expected: "opaque",
                context: format!("{name} constant ({} value)", other.kind()),
            }),
        });

        let spec = Spec::value_spec(
            name,
            None,
            Some(crate::spec::Converter::new(to_native, to_json)),
            Some(materialize),
        );
        self.enums.insert(TypeId::of::<T>(), spec);

        let writer_constants = constants;
        self.scalar_writers.insert(
            TypeId::of::<T>(),
            Arc::new(move |any| {
                let t = any
                    .downcast_ref::<T>()
                    .ok_or_else(|| BindError::TypeMismatch {
                        expected: std::any::type_name::<T>(),
                        context: format!("{name} write"),
                    })?;
                for (n, c) in writer_constants.iter() {
                    if c == t {
                        return Ok(Value::Str((*n).to_string()));
                    }
                }
                Err(BindError::UnknownEnumConstant {
                    spec: name.to_string(),
                    value: std::any::type_name::<T>().to_string(),
                })
            }),
        );
        self.invalidate();
        self
    }

    /// Appends a finder consulted after records, enums and builtins.
    pub fn add_finder(&mut self, finder: impl SpecFinder + 'static) -> &mut Self {
        self.finders.push(Arc::new(finder));
        self.invalidate();
        self
    }

    /// Prepends a finder consulted before everything, builtins included.
    pub fn prepend_finder(&mut self, finder: impl SpecFinder + 'static) -> &mut Self {
        self.prepended.insert(0, Arc::new(finder));
        self.invalidate();
        self
    }

    fn invalidate(&mut self) {
        self.cache
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// The spec registered or findable for `key`.
    pub fn resolve(&self, key: TypeKey) -> Result<Spec, BindError> {
        let mut stack = Vec::new();
        self.resolve_with(key, &mut stack)
    }

    pub(crate) fn resolve_with(
        &self,
        key: TypeKey,
        stack: &mut Vec<TypeId>,
    ) -> Result<Spec, BindError> {
        if let Some(spec) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key.id)
            .cloned()
        {
            return Ok(spec);
        }
        if stack.contains(&key.id) {
            return Err(BindError::CyclicType(key.name));
        }
        stack.push(key.id);
        let found = self.find_spec(key, stack);
        stack.pop();
        let spec = found?;
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.id, spec.clone());
        Ok(spec)
    }

    fn find_spec(&self, key: TypeKey, stack: &mut Vec<TypeId>) -> Result<Spec, BindError> {
        for finder in &self.prepended {
            if let Some(spec) = finder.find(key, self)? {
                return Ok(spec);
            }
        }
        if let Some(spec) = builtin_scalar(key) {
            return Ok(spec);
        }
        if let Some(recipe) = self.records.get(&key.id) {
            return recipe.build(self, stack);
        }
        if let Some(spec) = self.enums.get(&key.id) {
            return Ok(spec.clone());
        }
        for finder in &self.finders {
            if let Some(spec) = finder.find(key, self)? {
                return Ok(spec);
            }
        }
        Err(BindError::UnresolvedType(key.name))
    }

    /// Decodes one document into a `T` through its resolved spec.
    pub fn read<T: Any + Send + Sync>(&self, text: &str) -> Result<T, BindError> {
        let spec = self.resolve(TypeKey::of::<T>())?;
        self.read_as(text, &spec)
    }

    /// Decodes one document through an explicit spec, usually a converted or
    /// filtered variant of a resolved one.
    pub fn read_as<T: Any + Send + Sync>(&self, text: &str, spec: &Spec) -> Result<T, BindError> {
        let native = self.read_native(spec, text)?;
        downcast_native(native, "decoded root")
    }

    fn read_native(&self, spec: &Spec, text: &str) -> Result<Native, BindError> {
        match spec.kind() {
            SpecKind::Object(_) => {
                let mut visitor = BindObjectVisitor::new(spec, Out::Yield)?;
                let mut reader = JsonReader::new(text);
                reader
                    .read_object(&mut visitor)?
                    .ok_or(BindError::Protocol("decode produced no value"))
            }
            SpecKind::Value(_) => {
                let mut reader = JsonReader::new(text);
                let value = reader.read_scalar_document()?;
                spec.materialize(value)
            }
            _ => Err(BindError::InvalidSpecShape {
                spec: spec.to_string(),
                expected: "object or value",
            }),
        }
    }

    /// Decodes a `[...]` document into a `Vec<T>`, eagerly.
    pub fn read_array<T: Any + Send + Sync>(&self, text: &str) -> Result<Vec<T>, BindError> {
        let spec = self.resolve(TypeKey::of::<T>())?.array();
        let mut visitor = BindArrayVisitor::new(&spec, Out::Yield)?;
        let mut reader = JsonReader::new(text);
        let native = reader
            .read_array(&mut visitor)?
            .ok_or(BindError::Protocol("decode produced no value"))?;
        let items = downcast_native::<Vec<Native>>(native, "decoded array")?;
        items
            .into_iter()
            .map(|item| downcast_native::<T>(item, "array element"))
            .collect()
    }

    /// Opens a `[...]` document as a lazy cursor of `T`. Elements are decoded
    /// one per [`BindStream::next`]; dropping the stream abandons the rest.
    pub fn stream<T: Any + Send + Sync>(&self, text: &str) -> Result<BindStream<T>, BindError> {
        let component = self.resolve(TypeKey::of::<T>())?;
        let inner = JsonReader::new(text).stream_array(PullComponent { component })?;
        Ok(BindStream {
            inner,
            _marker: PhantomData,
        })
    }

    /// Serializes a native value through its resolved spec.
    pub fn write<T: Any + Send + Sync>(&self, value: &T) -> Result<String, BindError> {
        let key = TypeKey::of::<T>();
        if let Some(write) = self.scalar_writers.get(&key.id) {
            let scalar = write(value)?;
            let mut writer = JsonWriter::new();
            writer.scalar(&scalar);
            return Ok(writer.into_string());
        }
        let spec = match self.resolve(key) {
            Ok(spec) => spec,
            // Unregistered roots fall back to their repr, exactly like
            // unresolved natives on the nested replay path.
            Err(BindError::UnresolvedType(_)) => {
                let mut writer = JsonWriter::new();
                writer.scalar(&Value::Str(key.name.to_string()));
                return Ok(writer.into_string());
            }
            Err(e) => return Err(e),
        };
        self.write_as(value, &spec)
    }

    /// Serializes through an explicit object spec.
    pub fn write_as(
        &self,
        instance: &(dyn Any + Send + Sync),
        spec: &Spec,
    ) -> Result<String, BindError> {
        match spec.kind() {
            SpecKind::Object(_) => {
                let mut writer = JsonWriter::new();
                let mut sink = writer.object_visitor();
                self.replay_object_into(spec, instance, &mut sink)?;
                Ok(writer.into_string())
            }
            _ => Err(BindError::InvalidSpecShape {
                spec: spec.to_string(),
                expected: "object",
            }),
        }
    }

    /// Serializes an already classified [`Replay`] value.
    pub fn write_replay(&self, replay: Replay) -> Result<String, BindError> {
        let mut writer = JsonWriter::new();
        match replay {
            Replay::Value(v) => writer.scalar(&v),
            Replay::Seq(items) => {
                let mut sink = writer.array_visitor();
                self.replay_seq_into(items, &mut sink)?;
            }
            Replay::Map(pairs) => {
                let mut sink = writer.object_visitor();
                self.replay_map_into(pairs, &mut sink)?;
            }
            Replay::Native { any, key } => match self.classify_native(any, key)? {
                NativeOut::Leaf(v) => writer.scalar(&v),
                NativeOut::Object(spec, any) => {
                    let mut sink = writer.object_visitor();
                    self.replay_object_into(&spec, any.as_ref(), &mut sink)?;
                }
            },
        }
        Ok(writer.into_string())
    }

    /// Classifies a native value for replay: a JSON leaf ready to emit, or
    /// a structured value plus the object spec it replays through.
    fn classify_native(&self, any: Native, key: TypeKey) -> Result<NativeOut, BindError> {
        if let Some(write) = self.scalar_writers.get(&key.id) {
            return Ok(NativeOut::Leaf(write(any.as_ref())?));
        }
        match self.resolve(key) {
            Ok(spec) => match spec.kind() {
                SpecKind::Object(_) => Ok(NativeOut::Object(spec, any)),
                SpecKind::Value(_) => Ok(NativeOut::Leaf(spec.convert_to_json(Value::Opaque(
                    OpaqueValue::from_native(any, key.name),
                ))?)),
                _ => Err(BindError::InvalidSpecShape {
                    spec: spec.to_string(),
                    expected: "object or value",
                }),
            },
            // Unregistered opaque shapes defer to sink stringification.
            Err(BindError::UnresolvedType(_)) => Ok(NativeOut::Leaf(Value::Opaque(
                OpaqueValue::from_native(any, key.name),
            ))),
            Err(e) => Err(e),
        }
    }

    fn replay_object_into(
        &self,
        spec: &Spec,
        instance: &(dyn Any + Send + Sync),
        visitor: &mut dyn ObjectVisitor,
    ) -> Result<(), BindError> {
        let object = match spec.kind() {
            SpecKind::Object(o) => o,
            _ => {
                return Err(BindError::InvalidSpecShape {
                    spec: spec.to_string(),
                    expected: "object",
                })
            }
        };
        // A filter may hide a required member; replay through one is refused
        // outright rather than producing a document that can not decode.
        if object.filter.is_some() {
            return Err(BindError::FilteredSpecReplay(spec.to_string()));
        }
        let mode = visitor.visit_start_object();
        if mode != VisitorMode::Push {
            return Err(BindError::InvalidMode {
                mode,
                expected: VisitorMode::Push,
            });
        }
        let layout = object.layout.clone();
        layout.replay(instance, &mut |name, replay| {
            let member_spec = layout.member_spec(name);
            self.emit_member(name, replay, member_spec.as_ref(), visitor)
        })?;
        visitor.visit_end_object()?;
        Ok(())
    }

    fn emit_member(
        &self,
        name: &str,
        replay: Replay,
        member_spec: Option<&Spec>,
        visitor: &mut dyn ObjectVisitor,
    ) -> Result<(), BindError> {
        match replay {
            Replay::Value(v) => {
                let v = match member_spec {
                    Some(spec) => spec.convert_to_json(v)?,
                    None => v,
                };
                visitor.visit_member_value(name, v)?;
            }
            Replay::Native { any, key } => match self.classify_native(any, key)? {
                NativeOut::Leaf(v) => {
                    visitor.visit_member_value(name, v)?;
                }
                NativeOut::Object(spec, any) => {
                    if let Some(mut child) = visitor.visit_member_object(name)? {
                        self.replay_object_into(&spec, any.as_ref(), child.as_mut())?;
                    }
                }
            },
            Replay::Seq(items) => {
                if let Some(mut child) = visitor.visit_member_array(name)? {
                    self.replay_seq_into(items, child.as_mut())?;
                }
            }
            Replay::Map(pairs) => {
                if let Some(mut child) = visitor.visit_member_object(name)? {
                    self.replay_map_into(pairs, child.as_mut())?;
                }
            }
        }
        Ok(())
    }

    fn replay_seq_into(
        &self,
        items: Vec<Replay>,
        visitor: &mut dyn ArrayVisitor,
    ) -> Result<(), BindError> {
        let mode = visitor.visit_start_array();
        if mode != VisitorMode::Push {
            return Err(BindError::InvalidMode {
                mode,
                expected: VisitorMode::Push,
            });
        }
        for item in items {
            self.emit_element(item, visitor)?;
        }
        visitor.visit_end_array()?;
        Ok(())
    }

    fn emit_element(&self, replay: Replay, visitor: &mut dyn ArrayVisitor) -> Result<(), BindError> {
        match replay {
            Replay::Value(v) => {
                visitor.visit_value(v)?;
            }
            Replay::Native { any, key } => match self.classify_native(any, key)? {
                NativeOut::Leaf(v) => {
                    visitor.visit_value(v)?;
                }
                NativeOut::Object(spec, any) => {
                    if let Some(mut child) = visitor.visit_object()? {
                        self.replay_object_into(&spec, any.as_ref(), child.as_mut())?;
                    }
                }
            },
            Replay::Seq(items) => {
                if let Some(mut child) = visitor.visit_array()? {
                    self.replay_seq_into(items, child.as_mut())?;
                }
            }
            Replay::Map(pairs) => {
                if let Some(mut child) = visitor.visit_object()? {
                    self.replay_map_into(pairs, child.as_mut())?;
                }
            }
        }
        Ok(())
    }

    fn replay_map_into(
        &self,
        pairs: Vec<(String, Replay)>,
        visitor: &mut dyn ObjectVisitor,
    ) -> Result<(), BindError> {
        let mode = visitor.visit_start_object();
        if mode != VisitorMode::Push {
            return Err(BindError::InvalidMode {
                mode,
                expected: VisitorMode::Push,
            });
        }
        for (name, replay) in pairs {
            self.emit_member(&name, replay, None, visitor)?;
        }
        visitor.visit_end_object()?;
        Ok(())
    }
}

enum NativeOut {
    Leaf(Value),
    Object(Spec, Native),
}

/// Lazy typed cursor over a top-level array; see [`Binder::stream`].
pub struct BindStream<T> {
    inner: ArrayStream<PullComponent>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> BindStream<T> {
    /// Scalars decoded from the source so far. Skipped or abandoned elements
    /// never contribute.
    pub fn scalars_decoded(&self) -> usize {
        self.inner.scalars_decoded()
    }
}

impl<T: Any + Send + Sync> Iterator for BindStream<T> {
    type Item = Result<T, BindError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok(Some(native)) => Some(downcast_native(native, "stream element")),
            Ok(None) => Some(Err(BindError::Protocol("stream element produced no value"))),
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Meters(f64);

    fn meters_finder(calls: &'static AtomicUsize) -> impl SpecFinder {
        move |key: TypeKey, _binder: &Binder| -> Result<Option<Spec>, BindError> {
            if key == TypeKey::of::<Meters>() {
                calls.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(Spec::scalar::<f64>()));
            }
            Ok(None)
        }
    }

    #[test]
    fn appended_finders_resolve_unknown_types() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut binder = Binder::new();
        binder.add_finder(meters_finder(&CALLS));
        let spec = binder.resolve(TypeKey::of::<Meters>()).unwrap();
        assert_eq!(spec.to_string(), "f64");
        // Builtins win before appended finders are consulted.
        let spec = binder.resolve(TypeKey::of::<f64>()).unwrap();
        assert_eq!(spec.to_string(), "f64");
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn resolution_is_cached_until_the_next_registration() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut binder = Binder::new();
        binder.add_finder(meters_finder(&CALLS));
        binder.resolve(TypeKey::of::<Meters>()).unwrap();
        binder.resolve(TypeKey::of::<Meters>()).unwrap();
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);

        #[derive(Clone, PartialEq)]
        struct Unit;
        binder.register_enum("Unit", vec![("unit", Unit)]);
        binder.resolve(TypeKey::of::<Meters>()).unwrap();
        assert_eq!(CALLS.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn structural_replay_writes_maps_and_sequences() {
        let binder = Binder::new();
        let out = binder
            .write_replay(Replay::Map(vec![
                ("a".to_string(), Replay::from(1)),
                (
                    "b".to_string(),
                    Replay::Seq(vec![Replay::from(2), Replay::from("x")]),
                ),
            ]))
            .unwrap();
        assert_eq!(out, r#"{"a":1,"b":[2,"x"]}"#);
    }

    #[test]
    fn unresolved_natives_fall_back_to_their_repr() {
        #[derive(Debug)]
        struct Mystery;
        let binder = Binder::new();
        let out = binder.write_replay(Replay::native(Mystery)).unwrap();
        assert!(out.starts_with('"') && out.contains("Mystery"));
    }

    #[test]
    fn unresolved_roots_write_the_same_repr_as_nested_natives() {
        struct Mystery;
        let binder = Binder::new();
        let root = binder.write(&Mystery).unwrap();
        let nested = binder.write_replay(Replay::native(Mystery)).unwrap();
        assert_eq!(root, nested);
        assert!(root.contains("Mystery"));
    }
}
