//! The `Spec` descriptor tree.
//!
//! A `Spec` is an immutable, shareable description of one JSON shape: a
//! primitive leaf, a structured object, a homogeneous array, or a terminal
//! stream. Specs form a recursive tree and are only built through the
//! factories and combinators here; the variant set is closed.
//!
//! Combinators never mutate: `convert_with`, `filter_with`, `array` and
//! `stream` all hand back a new `Spec` sharing unchanged parts with the
//! original.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::BindError;
use crate::replay::Replay;
use crate::value::{Native, Scalar, Value};

/// Turns a fully converted leaf [`Value`] into the native boxed form used by
/// array elements, stream elements and scalar roots.
pub type Materializer = Arc<dyn Fn(Value) -> Result<Native, BindError> + Send + Sync>;

/// Folds a lazy sequence of decoded elements into one native result.
/// Elements not pulled from the iterator are never decoded from the source.
pub type Aggregator =
    Arc<dyn Fn(&mut dyn Iterator<Item = Result<Native, BindError>>) -> Result<Native, BindError> + Send + Sync>;

pub type MemberPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Opaque in-progress builder state threaded through an [`ObjectLayout`].
pub type BuilderState = Box<dyn Any + Send>;

/// A bidirectional leaf conversion: `to_native` runs while decoding,
/// `to_json` while serializing.
#[derive(Clone)]
pub struct Converter {
    to_native: Arc<dyn Fn(Value) -> Result<Value, BindError> + Send + Sync>,
    to_json: Arc<dyn Fn(Value) -> Result<Value, BindError> + Send + Sync>,
}

impl Converter {
    pub fn new<R, W>(to_native: R, to_json: W) -> Self
    where
        R: Fn(Value) -> Result<Value, BindError> + Send + Sync + 'static,
        W: Fn(Value) -> Result<Value, BindError> + Send + Sync + 'static,
    {
        Converter {
            to_native: Arc::new(to_native),
            to_json: Arc::new(to_json),
        }
    }

    pub fn to_native(&self, value: Value) -> Result<Value, BindError> {
        (self.to_native)(value)
    }

    pub fn to_json(&self, value: Value) -> Result<Value, BindError> {
        (self.to_json)(value)
    }

    /// Composition with `added` applied second on decode and first on encode,
    /// so `c.then(f).then(g)` decodes as `g(f(c(v)))` and encodes back out
    /// through the same stages in reverse.
    fn then(&self, added: &Converter) -> Converter {
        let inner_read = self.to_native.clone();
        let outer_read = added.to_native.clone();
        let inner_write = self.to_json.clone();
        let outer_write = added.to_json.clone();
        Converter {
            to_native: Arc::new(move |v| outer_read(inner_read(v)?)),
            to_json: Arc::new(move |v| inner_write(outer_write(v)?)),
        }
    }
}

/// Strategy object describing one structured type: member lookup, the
/// builder-state transitions of a decode, and replay for serialization.
///
/// `add_*` take and return the state so a layout may use an immutable state
/// type; `finish` fails with `MissingRequiredMember` when a non-defaulted
/// member was never set.
pub trait ObjectLayout: Send + Sync {
    fn member_spec(&self, name: &str) -> Option<Spec>;

    fn new_builder(&self) -> Result<BuilderState, BindError>;

    fn add_object(
        &self,
        state: BuilderState,
        name: &str,
        value: Native,
    ) -> Result<BuilderState, BindError>;

    fn add_array(
        &self,
        state: BuilderState,
        name: &str,
        value: Native,
    ) -> Result<BuilderState, BindError>;

    fn add_value(
        &self,
        state: BuilderState,
        name: &str,
        value: Value,
    ) -> Result<BuilderState, BindError>;

    fn finish(&self, state: BuilderState) -> Result<Native, BindError>;

    /// Destructures `instance` into `(name, value)` pairs, calling `emit`
    /// once per member in declaration order.
    fn replay(
        &self,
        instance: &(dyn Any + Send + Sync),
        emit: &mut dyn FnMut(&str, Replay) -> Result<(), BindError>,
    ) -> Result<(), BindError>;
}

#[derive(Clone)]
pub struct Spec {
    kind: Arc<SpecKind>,
}

pub(crate) enum SpecKind {
    Value(ValueSpec),
    Object(ObjectSpec),
    Array(ArraySpec),
    Stream(StreamSpec),
}

pub(crate) struct ValueSpec {
    pub(crate) name: String,
    pub(crate) default: Option<Value>,
    pub(crate) converter: Option<Converter>,
    pub(crate) materialize: Option<Materializer>,
}

pub(crate) struct ObjectSpec {
    pub(crate) name: String,
    pub(crate) layout: Arc<dyn ObjectLayout>,
    pub(crate) filter: Option<MemberPredicate>,
}

pub(crate) struct ArraySpec {
    pub(crate) component: Spec,
}

pub(crate) struct StreamSpec {
    pub(crate) component: Spec,
    pub(crate) aggregator: Aggregator,
}

impl Spec {
    fn from_kind(kind: SpecKind) -> Spec {
        Spec {
            kind: Arc::new(kind),
        }
    }

    /// A plain primitive leaf with no conversion.
    pub fn new_value(name: &str) -> Spec {
        Spec::from_kind(SpecKind::Value(ValueSpec {
            name: name.to_string(),
            default: None,
            converter: None,
            materialize: None,
        }))
    }

    /// A leaf bound to a concrete scalar type; decoded elements and roots
    /// come out boxed as `T`.
    pub fn scalar<T: Scalar>() -> Spec {
        Spec::from_kind(SpecKind::Value(ValueSpec {
            name: T::spec_name().to_string(),
            default: None,
            converter: None,
            materialize: Some(Arc::new(|value| {
                Ok(Box::new(T::from_value(value)?) as Native)
            })),
        }))
    }

    pub(crate) fn value_spec(
        name: &str,
        default: Option<Value>,
        converter: Option<Converter>,
        materialize: Option<Materializer>,
    ) -> Spec {
        Spec::from_kind(SpecKind::Value(ValueSpec {
            name: name.to_string(),
            default,
            converter,
            materialize,
        }))
    }

    pub fn new_object(name: &str, layout: impl ObjectLayout + 'static) -> Spec {
        Spec::from_kind(SpecKind::Object(ObjectSpec {
            name: name.to_string(),
            layout: Arc::new(layout),
            filter: None,
        }))
    }

    pub(crate) fn object_spec(name: &str, layout: Arc<dyn ObjectLayout>) -> Spec {
        Spec::from_kind(SpecKind::Object(ObjectSpec {
            name: name.to_string(),
            layout,
            filter: None,
        }))
    }

    pub fn new_array(component: Spec) -> Spec {
        Spec::from_kind(SpecKind::Array(ArraySpec { component }))
    }

    pub fn new_stream<F>(component: Spec, aggregator: F) -> Spec
    where
        F: Fn(&mut dyn Iterator<Item = Result<Native, BindError>>) -> Result<Native, BindError>
            + Send
            + Sync
            + 'static,
    {
        Spec::from_kind(SpecKind::Stream(StreamSpec {
            component,
            aggregator: Arc::new(aggregator),
        }))
    }

    /// An array of this spec.
    pub fn array(&self) -> Spec {
        Spec::new_array(self.clone())
    }

    /// A terminal stream of this spec.
    pub fn stream<F>(&self, aggregator: F) -> Spec
    where
        F: Fn(&mut dyn Iterator<Item = Result<Native, BindError>>) -> Result<Native, BindError>
            + Send
            + Sync
            + 'static,
    {
        Spec::new_stream(self.clone(), aggregator)
    }

    /// A new leaf spec with `converter` composed after the existing one:
    /// decoding applies the added converter last, encoding applies it first.
    /// The stored default is eagerly re-converted through the added converter
    /// so consumers never see a stale default.
    pub fn convert_with(&self, converter: Converter) -> Result<Spec, BindError> {
        let value = match self.kind.as_ref() {
            SpecKind::Value(v) => v,
            _ => {
                return Err(BindError::InvalidSpecShape {
                    spec: self.to_string(),
                    expected: "value",
                })
            }
        };
        let composed = match &value.converter {
            Some(existing) => existing.then(&converter),
            None => converter.clone(),
        };
        let default = value
            .default
            .clone()
            .map(|d| converter.to_native(d))
            .transpose()?;
        Ok(Spec::from_kind(SpecKind::Value(ValueSpec {
            name: format!("{}.convert()", value.name),
            default,
            converter: Some(composed),
            materialize: value.materialize.clone(),
        })))
    }

    /// A new object spec whose member filter is the conjunction of the
    /// existing predicate (if any) and `predicate`. A filtered spec can
    /// decode but can not be replayed.
    pub fn filter_with<P>(&self, predicate: P) -> Result<Spec, BindError>
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let object = match self.kind.as_ref() {
            SpecKind::Object(o) => o,
            _ => {
                return Err(BindError::InvalidSpecShape {
                    spec: self.to_string(),
                    expected: "object",
                })
            }
        };
        let filter: MemberPredicate = match &object.filter {
            Some(existing) => {
                let existing = existing.clone();
                Arc::new(move |name: &str| existing(name) && predicate(name))
            }
            None => Arc::new(predicate),
        };
        Ok(Spec::from_kind(SpecKind::Object(ObjectSpec {
            name: format!("{}.filter()", object.name),
            layout: object.layout.clone(),
            filter: Some(filter),
        })))
    }

    /// A new leaf spec with `default` used when the member is absent.
    pub fn with_default(&self, default: Value) -> Result<Spec, BindError> {
        let value = match self.kind.as_ref() {
            SpecKind::Value(v) => v,
            _ => {
                return Err(BindError::InvalidSpecShape {
                    spec: self.to_string(),
                    expected: "value",
                })
            }
        };
        Ok(Spec::from_kind(SpecKind::Value(ValueSpec {
            name: value.name.clone(),
            default: Some(default),
            converter: value.converter.clone(),
            materialize: value.materialize.clone(),
        })))
    }

    pub(crate) fn kind(&self) -> &SpecKind {
        &self.kind
    }

    /// Decode-direction conversion for a leaf in this spec's context. Fails
    /// with `InvalidSpecShape` when this spec is not a leaf: conversion never
    /// applies to nested aggregates.
    pub(crate) fn convert_to_native(&self, value: Value) -> Result<Value, BindError> {
        match self.kind.as_ref() {
            SpecKind::Value(v) => match &v.converter {
                Some(converter) => converter.to_native(value),
                None => Ok(value),
            },
            _ => Err(BindError::InvalidSpecShape {
                spec: self.to_string(),
                expected: "value",
            }),
        }
    }

    /// Encode-direction counterpart of [`Spec::convert_to_native`].
    pub(crate) fn convert_to_json(&self, value: Value) -> Result<Value, BindError> {
        match self.kind.as_ref() {
            SpecKind::Value(v) => match &v.converter {
                Some(converter) => converter.to_json(value),
                None => Ok(value),
            },
            _ => Err(BindError::InvalidSpecShape {
                spec: self.to_string(),
                expected: "value",
            }),
        }
    }

    /// Converted-and-materialized native form of a decoded leaf.
    pub(crate) fn materialize(&self, value: Value) -> Result<Native, BindError> {
        match self.kind.as_ref() {
            SpecKind::Value(v) => {
                let converted = match &v.converter {
                    Some(converter) => converter.to_native(value)?,
                    None => value,
                };
                match &v.materialize {
                    Some(materialize) => materialize(converted),
                    None => Ok(Box::new(converted) as Native),
                }
            }
            _ => Err(BindError::InvalidSpecShape {
                spec: self.to_string(),
                expected: "value",
            }),
        }
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.as_ref() {
            SpecKind::Value(v) => f.write_str(&v.name),
            SpecKind::Object(o) => f.write_str(&o.name),
            SpecKind::Array(a) => write!(f, "{}.array()", a.component),
            SpecKind::Stream(s) => write!(f, "{}.stream()", s.component),
        }
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spec({self})")
    }
}
