//! `Replay` — the write-direction value currency.
//!
//! When a native value is serialized, each piece of it is classified once
//! into a `Replay`: a ready JSON leaf, a native aggregate still needing its
//! own spec, or a structurally replayable sequence/map that needs no spec at
//! all. Layout `replay` implementations emit these; the binder turns them
//! into visitor events.

use std::any::Any;

use crate::bind::TypeKey;
use crate::value::{Native, Value};

pub enum Replay {
    /// A leaf already in (or convertible to) JSON form.
    Value(Value),
    /// A native value whose spec is resolved by the binder at write time.
    Native { any: Native, key: TypeKey },
    /// A sequence replayed structurally, element by element.
    Seq(Vec<Replay>),
    /// A map replayed structurally as an object, pair by pair.
    Map(Vec<(String, Replay)>),
}

impl Replay {
    /// A native value tagged with its type, for binder-resolved replay.
    pub fn native<T: Any + Send + Sync>(value: T) -> Replay {
        Replay::Native {
            any: Box::new(value),
            key: TypeKey::of::<T>(),
        }
    }
}

impl From<Value> for Replay {
    fn from(v: Value) -> Self {
        Replay::Value(v)
    }
}
impl From<bool> for Replay {
    fn from(v: bool) -> Self {
        Replay::Value(Value::Bool(v))
    }
}
impl From<i32> for Replay {
    fn from(v: i32) -> Self {
        Replay::Value(Value::I32(v))
    }
}
impl From<i64> for Replay {
    fn from(v: i64) -> Self {
        Replay::Value(Value::I64(v))
    }
}
impl From<f64> for Replay {
    fn from(v: f64) -> Self {
        Replay::Value(Value::F64(v))
    }
}
impl From<&str> for Replay {
    fn from(v: &str) -> Self {
        Replay::Value(Value::Str(v.to_string()))
    }
}
impl From<String> for Replay {
    fn from(v: String) -> Self {
        Replay::Value(Value::Str(v))
    }
}
