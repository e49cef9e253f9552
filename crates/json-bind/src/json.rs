//! `Json` — the untyped document tree.
//!
//! Objects keep insertion order. A tree is both a product (the generic
//! builders accumulate into it) and a producer: `replay_object` /
//! `replay_array` turn a tree back into visitor events, so a tree can be
//! serialized or re-bound without reparsing text.

use indexmap::IndexMap;

use crate::error::BindError;
use crate::value::Value;
use crate::visitor::{ArrayVisitor, ElementSource, ObjectVisitor, VisitResult, VisitorMode};

#[derive(Debug, Clone, PartialEq)]
pub enum Json {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Array(Vec<Json>),
    Object(IndexMap<String, Json>),
}

impl Json {
    pub fn get(&self, name: &str) -> Option<&Json> {
        match self {
            Json::Object(map) => map.get(name),
            _ => None,
        }
    }

    pub fn at(&self, index: usize) -> Option<&Json> {
        match self {
            Json::Array(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Json::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The scalar form of a leaf node, `None` for containers.
    pub fn scalar(&self) -> Option<Value> {
        match self {
            Json::Null => Some(Value::Null),
            Json::Bool(b) => Some(Value::Bool(*b)),
            Json::I32(i) => Some(Value::I32(*i)),
            Json::I64(i) => Some(Value::I64(*i)),
            Json::F32(f) => Some(Value::F32(*f)),
            Json::F64(f) => Some(Value::F64(*f)),
            Json::Str(s) => Some(Value::Str(s.clone())),
            Json::Array(_) | Json::Object(_) => None,
        }
    }

    /// Replays this object's members as push-mode events into `visitor`.
    pub fn replay_object(&self, visitor: &mut dyn ObjectVisitor) -> Result<VisitResult, BindError> {
        let map = match self {
            Json::Object(map) => map,
            other => {
                return Err(BindError::TypeMismatch {
                    expected: "object",
                    context: format!("replay of {other:?}"),
                })
            }
        };
        let mode = visitor.visit_start_object();
        if mode != VisitorMode::Push {
            return Err(BindError::InvalidMode {
                mode,
                expected: VisitorMode::Push,
            });
        }
        for (name, child) in map {
            match child {
                Json::Object(_) => {
                    if let Some(mut sub) = visitor.visit_member_object(name)? {
                        child.replay_object(&mut sub)?;
                    }
                }
                Json::Array(_) => {
                    if let Some(mut sub) = visitor.visit_member_array(name)? {
                        child.replay_array(&mut sub)?;
                    }
                }
                leaf => {
                    if let Some(value) = leaf.scalar() {
                        visitor.visit_member_value(name, value)?;
                    }
                }
            }
        }
        visitor.visit_end_object()
    }

    /// Replays this array's elements into `visitor`; a pull-inside visitor
    /// gets a lazy element source over the tree.
    pub fn replay_array(&self, visitor: &mut dyn ArrayVisitor) -> Result<VisitResult, BindError> {
        let items = match self {
            Json::Array(items) => items,
            other => {
                return Err(BindError::TypeMismatch {
                    expected: "array",
                    context: format!("replay of {other:?}"),
                })
            }
        };
        match visitor.visit_start_array() {
            VisitorMode::Push => {
                for item in items {
                    replay_element(item, visitor)?;
                }
                visitor.visit_end_array()
            }
            VisitorMode::PullInside => {
                let mut elements = JsonElements {
                    items: items.iter(),
                };
                visitor.visit_stream(&mut elements)
            }
            mode @ VisitorMode::Pull => Err(BindError::InvalidMode {
                mode,
                expected: VisitorMode::Push,
            }),
        }
    }
}

fn replay_element(item: &Json, visitor: &mut dyn ArrayVisitor) -> Result<VisitResult, BindError> {
    match item {
        Json::Object(_) => match visitor.visit_object()? {
            Some(mut sub) => item.replay_object(&mut sub),
            None => Ok(None),
        },
        Json::Array(_) => match visitor.visit_array()? {
            Some(mut sub) => item.replay_array(&mut sub),
            None => Ok(None),
        },
        leaf => match leaf.scalar() {
            Some(value) => visitor.visit_value(value),
            None => Ok(None),
        },
    }
}

struct JsonElements<'a> {
    items: std::slice::Iter<'a, Json>,
}

impl ElementSource for JsonElements<'_> {
    fn next_element(
        &mut self,
        sink: &mut dyn ArrayVisitor,
    ) -> Result<Option<VisitResult>, BindError> {
        match self.items.next() {
            Some(item) => replay_element(item, sink).map(Some),
            None => Ok(None),
        }
    }
}

impl From<bool> for Json {
    fn from(v: bool) -> Self {
        Json::Bool(v)
    }
}
impl From<i32> for Json {
    fn from(v: i32) -> Self {
        Json::I32(v)
    }
}
impl From<i64> for Json {
    fn from(v: i64) -> Self {
        Json::I64(v)
    }
}
impl From<f32> for Json {
    fn from(v: f32) -> Self {
        Json::F32(v)
    }
}
impl From<f64> for Json {
    fn from(v: f64) -> Self {
        Json::F64(v)
    }
}
impl From<&str> for Json {
    fn from(v: &str) -> Self {
        Json::Str(v.to_string())
    }
}
impl From<String> for Json {
    fn from(v: String) -> Self {
        Json::Str(v)
    }
}

impl From<Value> for Json {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(b),
            Value::I32(i) => Json::I32(i),
            Value::I64(i) => Json::I64(i),
            Value::F32(f) => Json::F32(f),
            Value::F64(f) => Json::F64(f),
            Value::Str(s) => Json::Str(s),
            // Opaque values have no tree form beyond their text repr.
            Value::Opaque(op) => Json::Str(op.repr().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::JsonWriter;

    fn obj(members: Vec<(&str, Json)>) -> Json {
        Json::Object(members.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn replay_into_writer_serializes_the_tree() {
        let tree = obj(vec![
            ("id", Json::I32(7)),
            ("tags", Json::Array(vec![Json::from("a"), Json::from("b")])),
            ("inner", obj(vec![("ok", Json::Bool(true))])),
        ]);
        let mut writer = JsonWriter::new();
        let mut sink = writer.object_visitor();
        tree.replay_object(&mut sink).unwrap();
        assert_eq!(
            writer.into_string(),
            r#"{"id":7,"tags":["a","b"],"inner":{"ok":true}}"#
        );
    }

    #[test]
    fn replay_requires_the_matching_shape() {
        let tree = Json::Array(vec![Json::Null]);
        let mut writer = JsonWriter::new();
        let mut sink = writer.object_visitor();
        assert!(matches!(
            tree.replay_object(&mut sink),
            Err(BindError::TypeMismatch { .. })
        ));
    }
}
