//! Record registration: the explicit, reflection-free strategy for binding
//! structured types.
//!
//! A [`RecordLayout`] declares a type's members in order, each with a typed
//! accessor for serialization and a decode path for each JSON shape it can
//! receive. Registration stores the layout as a recipe; the binder builds it
//! into a resolved [`ObjectLayout`] when the type is first resolved, which is
//! when bound member types are resolved recursively.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::bind::{Binder, TypeKey};
use crate::error::BindError;
use crate::replay::Replay;
use crate::spec::{BuilderState, Converter, ObjectLayout, Spec};
use crate::value::{Native, Scalar, Value};

type DecodeScalar = Arc<dyn Fn(Value) -> Result<Native, BindError> + Send + Sync>;
type DecodeAggregate = Arc<dyn Fn(Native) -> Result<Native, BindError> + Send + Sync>;
type Getter<T> = Arc<dyn Fn(&T) -> Result<Replay, BindError> + Send + Sync>;
type ConstructFn<T> = Arc<dyn Fn(&mut Slots) -> Result<T, BindError> + Send + Sync>;

/// What a custom-spec field receives during decode.
pub enum FieldInput {
    Scalar(Value),
    Aggregate(Native),
}

/// How a member's spec is obtained when the record is resolved.
enum MemberShape {
    /// Known at declaration time.
    Fixed(Spec),
    /// Resolved through the binder, so registration order does not matter.
    Bound(TypeKey),
    /// An array of a binder-resolved component.
    BoundSeq(TypeKey),
}

struct FieldDef<T> {
    name: String,
    shape: MemberShape,
    default: Option<Value>,
    decode_scalar: DecodeScalar,
    decode_aggregate: DecodeAggregate,
    get: Getter<T>,
}

fn field_mismatch(expected: &'static str, field: &str) -> BindError {
    BindError::TypeMismatch {
        expected,
        context: format!("member {field}"),
    }
}

/// Declaration-order description of one structured type `T`.
///
/// Finish the declaration with [`RecordLayout::construct`]; decoding fails
/// without it.
pub struct RecordLayout<T> {
    name: &'static str,
    fields: Vec<FieldDef<T>>,
    construct: Option<ConstructFn<T>>,
}

impl<T: Any + Send + Sync> RecordLayout<T> {
    pub fn new(name: &'static str) -> Self {
        RecordLayout {
            name,
            fields: Vec::new(),
            construct: None,
        }
    }

    /// A required scalar member.
    pub fn value_field<F, G>(self, name: &str, get: G) -> Self
    where
        F: Scalar,
        G: Fn(&T) -> F + Send + Sync + 'static,
    {
        self.push_value_field(name, None, get)
    }

    /// A scalar member with a default applied when the document omits it.
    pub fn value_field_or<F, G>(self, name: &str, default: F, get: G) -> Self
    where
        F: Scalar,
        G: Fn(&T) -> F + Send + Sync + 'static,
    {
        self.push_value_field(name, Some(default.into_value()), get)
    }

    fn push_value_field<F, G>(mut self, name: &str, default: Option<Value>, get: G) -> Self
    where
        F: Scalar,
        G: Fn(&T) -> F + Send + Sync + 'static,
    {
        let field = name.to_string();
        let mut spec = Spec::scalar::<F>();
        if let Some(d) = &default {
            if let Ok(with_default) = spec.with_default(d.clone()) {
                spec = with_default;
            }
        }
        let aggregate_field = field.clone();
        self.fields.push(FieldDef {
            name: field,
            shape: MemberShape::Fixed(spec),
            default,
            decode_scalar: Arc::new(move |value| Ok(Box::new(F::from_value(value)?) as Native)),
            decode_aggregate: Arc::new(move |_| Err(field_mismatch("scalar", &aggregate_field))),
            get: Arc::new(move |t| Ok(Replay::Value(get(t).into_value()))),
        });
        self
    }

    /// A required scalar member decoded and encoded through `converter`.
    pub fn convert_field<F, G>(mut self, name: &str, converter: Converter, get: G) -> Self
    where
        F: Scalar,
        G: Fn(&T) -> F + Send + Sync + 'static,
    {
        let field = name.to_string();
        let mut spec = Spec::scalar::<F>();
        if let Ok(converted) = spec.convert_with(converter) {
            spec = converted;
        }
        let aggregate_field = field.clone();
        self.fields.push(FieldDef {
            name: field,
            shape: MemberShape::Fixed(spec),
            default: None,
            decode_scalar: Arc::new(move |value| Ok(Box::new(F::from_value(value)?) as Native)),
            decode_aggregate: Arc::new(move |_| Err(field_mismatch("scalar", &aggregate_field))),
            get: Arc::new(move |t| Ok(Replay::Value(get(t).into_value()))),
        });
        self
    }

    /// A member whose spec is resolved through the binder: a registered
    /// record, enum, or anything a finder accepts.
    pub fn bound_field<F, G>(mut self, name: &str, get: G) -> Self
    where
        F: Any + Send + Sync + Clone,
        G: Fn(&T) -> F + Send + Sync + 'static,
    {
        let field = name.to_string();
        let scalar_field = field.clone();
        let aggregate_field = field.clone();
        self.fields.push(FieldDef {
            name: field,
            shape: MemberShape::Bound(TypeKey::of::<F>()),
            default: None,
            decode_scalar: Arc::new(move |value| match value {
                Value::Opaque(op) => op
                    .downcast_ref::<F>()
                    .cloned()
                    .map(|f| Box::new(f) as Native)
                    .ok_or_else(|| field_mismatch(std::any::type_name::<F>(), &scalar_field)),
                other => Err(BindError::TypeMismatch {
                    expected: std::any::type_name::<F>(),
                    context: format!("member {scalar_field}: {} value", other.kind()),
                }),
            }),
            decode_aggregate: Arc::new(move |any| {
                any.downcast::<F>()
                    .map(|b| b as Native)
                    .map_err(|_| field_mismatch(std::any::type_name::<F>(), &aggregate_field))
            }),
            get: Arc::new(move |t| Ok(Replay::native(get(t)))),
        });
        self
    }

    /// A required sequence of scalars.
    pub fn seq_field<F, G>(mut self, name: &str, get: G) -> Self
    where
        F: Scalar,
        G: Fn(&T) -> Vec<F> + Send + Sync + 'static,
    {
        let field = name.to_string();
        let scalar_field = field.clone();
        let aggregate_field = field.clone();
        self.fields.push(FieldDef {
            name: field,
            shape: MemberShape::Fixed(Spec::scalar::<F>().array()),
            default: None,
            decode_scalar: Arc::new(move |_| Err(field_mismatch("array", &scalar_field))),
            decode_aggregate: Arc::new(move |any| {
                collect_elements::<F>(any, &aggregate_field)
            }),
            get: Arc::new(move |t| {
                Ok(Replay::Seq(
                    get(t)
                        .into_iter()
                        .map(|f| Replay::Value(f.into_value()))
                        .collect(),
                ))
            }),
        });
        self
    }

    /// A required sequence of a binder-resolved component type.
    pub fn bound_seq_field<F, G>(mut self, name: &str, get: G) -> Self
    where
        F: Any + Send + Sync + Clone,
        G: Fn(&T) -> Vec<F> + Send + Sync + 'static,
    {
        let field = name.to_string();
        let scalar_field = field.clone();
        let aggregate_field = field.clone();
        self.fields.push(FieldDef {
            name: field,
            shape: MemberShape::BoundSeq(TypeKey::of::<F>()),
            default: None,
            decode_scalar: Arc::new(move |_| Err(field_mismatch("array", &scalar_field))),
            decode_aggregate: Arc::new(move |any| {
                collect_elements::<F>(any, &aggregate_field)
            }),
            get: Arc::new(move |t| {
                Ok(Replay::Seq(get(t).into_iter().map(Replay::native).collect()))
            }),
        });
        self
    }

    /// Escape hatch: a member with an explicit spec and hand-written decode
    /// and replay closures.
    pub fn spec_field<D, G>(mut self, name: &str, spec: Spec, decode: D, get: G) -> Self
    where
        D: Fn(FieldInput) -> Result<Native, BindError> + Send + Sync + 'static,
        G: Fn(&T) -> Result<Replay, BindError> + Send + Sync + 'static,
    {
        let decode: Arc<dyn Fn(FieldInput) -> Result<Native, BindError> + Send + Sync> =
            Arc::new(decode);
        let scalar_decode = decode.clone();
        self.fields.push(FieldDef {
            name: name.to_string(),
            shape: MemberShape::Fixed(spec),
            default: None,
            decode_scalar: Arc::new(move |value| scalar_decode(FieldInput::Scalar(value))),
            decode_aggregate: Arc::new(move |any| decode(FieldInput::Aggregate(any))),
            get: Arc::new(get),
        });
        self
    }

    /// The constructor run at `finish`, after every member is set.
    pub fn construct<C>(mut self, construct: C) -> Self
    where
        C: Fn(&mut Slots) -> Result<T, BindError> + Send + Sync + 'static,
    {
        self.construct = Some(Arc::new(construct));
        self
    }
}

fn collect_elements<F: Any + Send + Sync>(any: Native, field: &str) -> Result<Native, BindError> {
    let items = any
        .downcast::<Vec<Native>>()
        .map_err(|_| field_mismatch("array", field))?;
    let mut out: Vec<F> = Vec::with_capacity(items.len());
    for item in *items {
        out.push(
            *item
                .downcast::<F>()
                .map_err(|_| field_mismatch(std::any::type_name::<F>(), field))?,
        );
    }
    Ok(Box::new(out) as Native)
}

/// Registered but not yet resolved; building resolves bound member specs.
pub(crate) trait LayoutRecipe: Send + Sync {
    fn build(&self, binder: &Binder, stack: &mut Vec<TypeId>) -> Result<Spec, BindError>;
}

impl<T: Any + Send + Sync> LayoutRecipe for RecordLayout<T> {
    fn build(&self, binder: &Binder, stack: &mut Vec<TypeId>) -> Result<Spec, BindError> {
        let construct = self
            .construct
            .clone()
            .ok_or(BindError::Protocol("record layout has no constructor"))?;
        let mut fields = Vec::with_capacity(self.fields.len());
        let mut index = HashMap::new();
        for (i, def) in self.fields.iter().enumerate() {
            let spec = match &def.shape {
                MemberShape::Fixed(spec) => spec.clone(),
                MemberShape::Bound(key) => binder.resolve_with(*key, stack)?,
                MemberShape::BoundSeq(key) => binder.resolve_with(*key, stack)?.array(),
            };
            index.insert(def.name.clone(), i);
            fields.push(ResolvedField {
                name: def.name.clone(),
                spec,
                default: def.default.clone(),
                decode_scalar: def.decode_scalar.clone(),
                decode_aggregate: def.decode_aggregate.clone(),
                get: def.get.clone(),
            });
        }
        let layout = ResolvedRecordLayout {
            name: self.name.to_string(),
            fields,
            index: Arc::new(index),
            construct,
        };
        Ok(Spec::object_spec(self.name, Arc::new(layout)))
    }
}

struct ResolvedField<T> {
    name: String,
    spec: Spec,
    default: Option<Value>,
    decode_scalar: DecodeScalar,
    decode_aggregate: DecodeAggregate,
    get: Getter<T>,
}

struct ResolvedRecordLayout<T> {
    name: String,
    fields: Vec<ResolvedField<T>>,
    index: Arc<HashMap<String, usize>>,
    construct: ConstructFn<T>,
}

impl<T> ResolvedRecordLayout<T> {
    fn member_index(&self, name: &str) -> Result<usize, BindError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| BindError::UnknownMember {
                spec: self.name.clone(),
                member: name.to_string(),
            })
    }
}

fn downcast_slots(state: BuilderState) -> Result<Box<Slots>, BindError> {
    state
        .downcast::<Slots>()
        .map_err(|_| BindError::Protocol("foreign builder state"))
}

impl<T: Any + Send + Sync> ObjectLayout for ResolvedRecordLayout<T> {
    fn member_spec(&self, name: &str) -> Option<Spec> {
        self.index.get(name).map(|&i| self.fields[i].spec.clone())
    }

    fn new_builder(&self) -> Result<BuilderState, BindError> {
        let mut values: Vec<Option<Native>> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            values.push(match &field.default {
                Some(d) => Some((field.decode_scalar)(d.clone())?),
                None => None,
            });
        }
        Ok(Box::new(Slots {
            values,
            index: self.index.clone(),
        }))
    }

    fn add_object(
        &self,
        state: BuilderState,
        name: &str,
        value: Native,
    ) -> Result<BuilderState, BindError> {
        let mut slots = downcast_slots(state)?;
        let i = self.member_index(name)?;
        slots.values[i] = Some((self.fields[i].decode_aggregate)(value)?);
        Ok(slots)
    }

    fn add_array(
        &self,
        state: BuilderState,
        name: &str,
        value: Native,
    ) -> Result<BuilderState, BindError> {
        let mut slots = downcast_slots(state)?;
        let i = self.member_index(name)?;
        slots.values[i] = Some((self.fields[i].decode_aggregate)(value)?);
        Ok(slots)
    }

    fn add_value(
        &self,
        state: BuilderState,
        name: &str,
        value: Value,
    ) -> Result<BuilderState, BindError> {
        let mut slots = downcast_slots(state)?;
        let i = self.member_index(name)?;
        slots.values[i] = Some((self.fields[i].decode_scalar)(value)?);
        Ok(slots)
    }

    fn finish(&self, state: BuilderState) -> Result<Native, BindError> {
        let mut slots = downcast_slots(state)?;
        for (i, field) in self.fields.iter().enumerate() {
            if slots.values[i].is_none() {
                return Err(BindError::MissingRequiredMember {
                    spec: self.name.clone(),
                    member: field.name.clone(),
                });
            }
        }
        let value = (self.construct)(&mut slots)?;
        Ok(Box::new(value) as Native)
    }

    fn replay(
        &self,
        instance: &(dyn Any + Send + Sync),
        emit: &mut dyn FnMut(&str, Replay) -> Result<(), BindError>,
    ) -> Result<(), BindError> {
        let t = instance
            .downcast_ref::<T>()
            .ok_or_else(|| BindError::TypeMismatch {
                expected: "registered record",
                context: self.name.clone(),
            })?;
        for field in &self.fields {
            emit(&field.name, (field.get)(t)?)?;
        }
        Ok(())
    }
}

/// Positional builder state: one slot per declared member, addressed by name
/// from the record's constructor.
pub struct Slots {
    values: Vec<Option<Native>>,
    index: Arc<HashMap<String, usize>>,
}

impl Slots {
    /// Removes and downcasts the named member's decoded value.
    pub fn take<F: Any>(&mut self, name: &str) -> Result<F, BindError> {
        let i = self
            .index
            .get(name)
            .copied()
            .ok_or_else(|| BindError::UnknownMember {
                spec: "slots".to_string(),
                member: name.to_string(),
            })?;
        let native = self.values[i]
            .take()
            .ok_or_else(|| BindError::MissingRequiredMember {
                spec: "slots".to_string(),
                member: name.to_string(),
            })?;
        native
            .downcast::<F>()
            .map(|b| *b)
            .map_err(|_| BindError::TypeMismatch {
                expected: std::any::type_name::<F>(),
                context: format!("member {name}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn point_layout() -> RecordLayout<Point> {
        RecordLayout::new("Point")
            .value_field::<i32, _>("x", |p: &Point| p.x)
            .value_field_or::<i32, _>("y", 0, |p: &Point| p.y)
            .construct(|slots| {
                Ok(Point {
                    x: slots.take("x")?,
                    y: slots.take("y")?,
                })
            })
    }

    fn build(layout: &RecordLayout<Point>) -> Spec {
        let binder = Binder::new();
        let mut stack = Vec::new();
        layout.build(&binder, &mut stack).unwrap()
    }

    fn layout_of(spec: &Spec) -> Arc<dyn ObjectLayout> {
        match spec.kind() {
            SpecKind::Object(o) => o.layout.clone(),
            _ => panic!("expected object spec"),
        }
    }

    #[test]
    fn defaults_seed_the_builder_and_finish_enforces_required() {
        let spec = build(&point_layout());
        let layout = layout_of(&spec);

        // Only the defaulted member is pre-set.
        let state = layout.new_builder().unwrap();
        let err = layout.finish(state).err();
        assert!(matches!(
            err,
            Some(BindError::MissingRequiredMember { ref member, .. }) if member == "x"
        ));

        let state = layout.new_builder().unwrap();
        let state = layout.add_value(state, "x", Value::I32(3)).unwrap();
        let finished = layout.finish(state).unwrap();
        let point = finished.downcast::<Point>().unwrap();
        assert_eq!(*point, Point { x: 3, y: 0 });
    }

    #[test]
    fn unknown_member_is_rejected() {
        let spec = build(&point_layout());
        let layout = layout_of(&spec);
        let state = layout.new_builder().unwrap();
        assert!(matches!(
            layout.add_value(state, "z", Value::I32(1)),
            Err(BindError::UnknownMember { ref member, .. }) if member == "z"
        ));
    }

    #[test]
    fn replay_emits_members_in_declaration_order() {
        let spec = build(&point_layout());
        let layout = layout_of(&spec);
        let point = Point { x: 1, y: 2 };
        let mut seen = Vec::new();
        layout
            .replay(&point, &mut |name, replay| {
                match replay {
                    Replay::Value(v) => seen.push(format!("{name}={v:?}")),
                    _ => seen.push(format!("{name}=?")),
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["x=I32(1)", "y=I32(2)"]);
    }

    #[test]
    fn missing_constructor_fails_at_build() {
        let layout: RecordLayout<Point> =
            RecordLayout::new("Point").value_field::<i32, _>("x", |p: &Point| p.x);
        let binder = Binder::new();
        let mut stack = Vec::new();
        assert!(matches!(
            layout.build(&binder, &mut stack),
            Err(BindError::Protocol(_))
        ));
    }
}
