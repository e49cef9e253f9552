//! The JSON value model: one primitive per `Value`, plus an opaque escape
//! hatch for native values travelling through the visitor protocol.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::BindError;

/// Type-erased native value currency used between layouts, finders and
/// visitors. The analogue of a bare object reference: producers box, the
/// final consumer downcasts.
pub type Native = Box<dyn Any + Send + Sync>;

/// A single immutable JSON primitive.
///
/// Exactly one tag is active. The numeric tag is chosen by the originating
/// representation: the reader produces `I32` when the literal fits, `I64`
/// otherwise, and `F64` for fractional forms and for integer literals past
/// the `i64` range, which have no exact integer form. Widening between
/// tags happens only where a declared target type requests it.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    /// A native value with no JSON representation of its own.
    Opaque(OpaqueValue),
}

impl Value {
    /// Short tag name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::Opaque(_) => "opaque",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The string content, or a `TypeMismatch` naming `context`.
    pub fn string_value(&self, context: &str) -> Result<&str, BindError> {
        self.as_str().ok_or_else(|| BindError::TypeMismatch {
            expected: "string",
            context: context.to_string(),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<OpaqueValue> for Value {
    fn from(v: OpaqueValue) -> Self {
        Value::Opaque(v)
    }
}

/// A shared, type-erased native value carried inside a [`Value`].
///
/// Converters produce these for values that only exist on the native side
/// (enumerated constants, caller-supplied objects). The writer falls back to
/// the captured `repr` when asked to emit one as text.
#[derive(Clone)]
pub struct OpaqueValue {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    repr: Arc<str>,
}

impl OpaqueValue {
    pub fn new<T: Any + Send + Sync + fmt::Debug>(value: T) -> Self {
        let repr = format!("{value:?}");
        OpaqueValue {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            repr: repr.into(),
        }
    }

    /// Like [`OpaqueValue::new`] but with an explicit textual representation,
    /// avoiding the `Debug` requirement.
    pub fn with_repr<T: Any + Send + Sync>(value: T, repr: &str) -> Self {
        OpaqueValue {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            repr: repr.into(),
        }
    }

    /// Wraps an already-boxed native value; `repr` is typically a type name.
    pub(crate) fn from_native(value: Native, repr: &str) -> Self {
        let type_id = value.as_ref().type_id();
        OpaqueValue {
            value: Arc::from(value),
            type_id,
            repr: repr.into(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn repr(&self) -> &str {
        &self.repr
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueValue({})", self.repr)
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.repr == other.repr
    }
}

/// Leaf types a `ValueSpec` can bind directly.
///
/// `from_value` accepts the tags a declared target of this type may receive:
/// integer tags widen into `i64`/`f64` and narrow into `f32` because the
/// declaration requested it, never the other way around.
pub trait Scalar: Any + Send + Sync + Sized {
    fn spec_name() -> &'static str;
    fn from_value(value: Value) -> Result<Self, BindError>;
    fn into_value(self) -> Value;
}

fn mismatch<T>(expected: &'static str, found: &Value) -> Result<T, BindError> {
    Err(BindError::TypeMismatch {
        expected,
        context: format!("{} value", found.kind()),
    })
}

impl Scalar for bool {
    fn spec_name() -> &'static str {
        "bool"
    }
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch("bool", &other),
        }
    }
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl Scalar for i32 {
    fn spec_name() -> &'static str {
        "i32"
    }
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::I32(v) => Ok(v),
            other => mismatch("i32", &other),
        }
    }
    fn into_value(self) -> Value {
        Value::I32(self)
    }
}

impl Scalar for i64 {
    fn spec_name() -> &'static str {
        "i64"
    }
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::I32(v) => Ok(v as i64),
            Value::I64(v) => Ok(v),
            other => mismatch("i64", &other),
        }
    }
    fn into_value(self) -> Value {
        Value::I64(self)
    }
}

impl Scalar for f32 {
    fn spec_name() -> &'static str {
        "f32"
    }
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::I32(v) => Ok(v as f32),
            Value::F32(v) => Ok(v),
            Value::F64(v) => Ok(v as f32),
            other => mismatch("f32", &other),
        }
    }
    fn into_value(self) -> Value {
        Value::F32(self)
    }
}

impl Scalar for f64 {
    fn spec_name() -> &'static str {
        "f64"
    }
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::I32(v) => Ok(v as f64),
            Value::I64(v) => Ok(v as f64),
            Value::F32(v) => Ok(v as f64),
            Value::F64(v) => Ok(v),
            other => mismatch("f64", &other),
        }
    }
    fn into_value(self) -> Value {
        Value::F64(self)
    }
}

impl Scalar for String {
    fn spec_name() -> &'static str {
        "string"
    }
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Str(s) => Ok(s),
            other => mismatch("string", &other),
        }
    }
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_widening_is_declaration_driven() {
        assert_eq!(i64::from_value(Value::I32(7)).unwrap(), 7);
        assert_eq!(f64::from_value(Value::I64(7)).unwrap(), 7.0);
        // The reverse never happens implicitly.
        assert!(i32::from_value(Value::I64(7)).is_err());
        assert!(i32::from_value(Value::F64(7.0)).is_err());
    }

    #[test]
    fn opaque_equality_uses_type_and_repr() {
        let a = OpaqueValue::with_repr(1u8, "one");
        let b = OpaqueValue::with_repr(1u8, "one");
        let c = OpaqueValue::with_repr(1u16, "one");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn opaque_downcast() {
        let op = OpaqueValue::new(42i32);
        assert_eq!(op.downcast_ref::<i32>(), Some(&42));
        assert_eq!(op.downcast_ref::<i64>(), None);
        assert_eq!(op.repr(), "42");
    }
}
