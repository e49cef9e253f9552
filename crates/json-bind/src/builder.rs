//! Generic builders: visitors that materialize [`Json`] trees.
//!
//! A [`BuilderConfig`] owns the container factories and the finalizing
//! transforms; builders for nested objects and arrays share the same config
//! by reference, so one configuration governs an entire document.

use std::mem;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::BindError;
use crate::json::Json;
use crate::reader::JsonReader;
use crate::value::Value;
use crate::visitor::{ArrayVisitor, ObjectVisitor, VisitResult, VisitorMode};

type ObjectFactory = Arc<dyn Fn() -> IndexMap<String, Json> + Send + Sync>;
type ArrayFactory = Arc<dyn Fn() -> Vec<Json> + Send + Sync>;
type Transform = Arc<dyn Fn(Json) -> Json + Send + Sync>;

/// Container factories plus finalizing transforms.
///
/// The transforms run once per container, when its builder finishes; the
/// default config is the identity on both.
#[derive(Clone)]
pub struct BuilderConfig {
    object_factory: ObjectFactory,
    array_factory: ArrayFactory,
    object_transform: Transform,
    array_transform: Transform,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig::new(IndexMap::new, Vec::new)
    }
}

impl BuilderConfig {
    pub fn new<O, A>(object_factory: O, array_factory: A) -> Self
    where
        O: Fn() -> IndexMap<String, Json> + Send + Sync + 'static,
        A: Fn() -> Vec<Json> + Send + Sync + 'static,
    {
        BuilderConfig {
            object_factory: Arc::new(object_factory),
            array_factory: Arc::new(array_factory),
            object_transform: Arc::new(|json| json),
            array_transform: Arc::new(|json| json),
        }
    }

    /// Same factories, replacing both transforms.
    pub fn with_transforms<O, A>(self, object_transform: O, array_transform: A) -> Self
    where
        O: Fn(Json) -> Json + Send + Sync + 'static,
        A: Fn(Json) -> Json + Send + Sync + 'static,
    {
        BuilderConfig {
            object_transform: Arc::new(object_transform),
            array_transform: Arc::new(array_transform),
            ..self
        }
    }

    pub fn with_object_transform<O>(self, object_transform: O) -> Self
    where
        O: Fn(Json) -> Json + Send + Sync + 'static,
    {
        BuilderConfig {
            object_transform: Arc::new(object_transform),
            ..self
        }
    }

    pub fn with_array_transform<A>(self, array_transform: A) -> Self
    where
        A: Fn(Json) -> Json + Send + Sync + 'static,
    {
        BuilderConfig {
            array_transform: Arc::new(array_transform),
            ..self
        }
    }

    /// Root builder for an object document. Its end result is the finished
    /// tree, boxed as a [`Json`].
    pub fn object_builder(&self) -> ObjectBuilder<'_> {
        ObjectBuilder {
            config: self,
            map: (self.object_factory)(),
            sink: Sink::Root,
        }
    }

    /// Root builder for an array document.
    pub fn array_builder(&self) -> ArrayBuilder<'_> {
        ArrayBuilder {
            config: self,
            items: (self.array_factory)(),
            sink: Sink::Root,
        }
    }

    /// Parses a complete document into a tree using this config's builders.
    pub fn parse(&self, text: &str) -> Result<Json, BindError> {
        let mut reader = JsonReader::new(text);
        match text.trim_start().as_bytes().first() {
            Some(b'{') => {
                let mut builder = self.object_builder();
                let result = reader.read_object(&mut builder)?;
                take_tree(result)
            }
            Some(b'[') => {
                let mut builder = self.array_builder();
                let result = reader.read_array(&mut builder)?;
                take_tree(result)
            }
            _ => Ok(Json::from(reader.read_scalar_document()?)),
        }
    }
}

fn take_tree(result: VisitResult) -> Result<Json, BindError> {
    let native = result.ok_or(BindError::Protocol("builder produced no result"))?;
    native
        .downcast::<Json>()
        .map(|json| *json)
        .map_err(|_| BindError::TypeMismatch {
            expected: "Json",
            context: "builder result".to_string(),
        })
}

/// Where a finished container goes: up to the caller, into a parent object
/// member, or onto the end of a parent array.
enum Sink<'a> {
    Root,
    Member {
        map: &'a mut IndexMap<String, Json>,
        name: String,
    },
    Element {
        items: &'a mut Vec<Json>,
    },
}

impl Sink<'_> {
    fn accept(&mut self, json: Json) -> VisitResult {
        match self {
            Sink::Root => Some(Box::new(json)),
            Sink::Member { map, name } => {
                map.insert(mem::take(name), json);
                None
            }
            Sink::Element { items } => {
                items.push(json);
                None
            }
        }
    }
}

pub struct ObjectBuilder<'a> {
    config: &'a BuilderConfig,
    map: IndexMap<String, Json>,
    sink: Sink<'a>,
}

impl ObjectVisitor for ObjectBuilder<'_> {
    fn visit_start_object(&mut self) -> VisitorMode {
        VisitorMode::Push
    }

    fn visit_member_object(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        Ok(Some(Box::new(ObjectBuilder {
            config: self.config,
            map: (self.config.object_factory)(),
            sink: Sink::Member {
                map: &mut self.map,
                name: name.to_string(),
            },
        })))
    }

    fn visit_member_array(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        Ok(Some(Box::new(ArrayBuilder {
            config: self.config,
            items: (self.config.array_factory)(),
            sink: Sink::Member {
                map: &mut self.map,
                name: name.to_string(),
            },
        })))
    }

    fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError> {
        self.map.insert(name.to_string(), Json::from(value));
        Ok(None)
    }

    fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
        let json = (self.config.object_transform)(Json::Object(mem::take(&mut self.map)));
        Ok(self.sink.accept(json))
    }
}

pub struct ArrayBuilder<'a> {
    config: &'a BuilderConfig,
    items: Vec<Json>,
    sink: Sink<'a>,
}

impl ArrayVisitor for ArrayBuilder<'_> {
    fn visit_start_array(&mut self) -> VisitorMode {
        VisitorMode::Push
    }

    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        Ok(Some(Box::new(ObjectBuilder {
            config: self.config,
            map: (self.config.object_factory)(),
            sink: Sink::Element {
                items: &mut self.items,
            },
        })))
    }

    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        Ok(Some(Box::new(ArrayBuilder {
            config: self.config,
            items: (self.config.array_factory)(),
            sink: Sink::Element {
                items: &mut self.items,
            },
        })))
    }

    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        self.items.push(Json::from(value));
        Ok(None)
    }

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        let json = (self.config.array_transform)(Json::Array(mem::take(&mut self.items)));
        Ok(self.sink.accept(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_preserves_member_order() {
        let config = BuilderConfig::default();
        let tree = config
            .parse(r#"{ "z": 1, "a": { "y": [2, 3], "b": null }, "m": "s" }"#)
            .unwrap();
        let map = match &tree {
            Json::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        };
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(tree.get("a").and_then(|a| a.get("y")).and_then(|y| y.at(1)),
            Some(&Json::I32(3)));
    }

    #[test]
    fn scalar_documents_parse_directly() {
        let config = BuilderConfig::default();
        assert_eq!(config.parse("42").unwrap(), Json::I32(42));
        assert_eq!(config.parse(r#""hi""#).unwrap(), Json::Str("hi".to_string()));
        assert_eq!(config.parse("null").unwrap(), Json::Null);
    }

    #[test]
    fn transforms_run_at_every_level() {
        let config = BuilderConfig::default().with_array_transform(|json| match json {
            Json::Array(mut items) => {
                items.reverse();
                Json::Array(items)
            }
            other => other,
        });
        let tree = config.parse(r#"{ "xs": [1, 2, 3], "ys": [[4, 5]] }"#).unwrap();
        assert_eq!(
            tree.get("xs"),
            Some(&Json::Array(vec![Json::I32(3), Json::I32(2), Json::I32(1)]))
        );
        // Nested arrays are transformed before their parent.
        assert_eq!(
            tree.get("ys"),
            Some(&Json::Array(vec![Json::Array(vec![
                Json::I32(5),
                Json::I32(4)
            ])]))
        );
    }

    #[test]
    fn custom_factories_are_consulted() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNT: AtomicUsize = AtomicUsize::new(0);
        let config = BuilderConfig::new(
            || {
                COUNT.fetch_add(1, Ordering::Relaxed);
                IndexMap::new()
            },
            Vec::new,
        );
        config.parse(r#"{ "a": {}, "b": {} }"#).unwrap();
        assert_eq!(COUNT.load(Ordering::Relaxed), 3);
    }
}
