//! The dual-mode visitor protocol.
//!
//! Two mutually referential capability sets, [`ObjectVisitor`] and
//! [`ArrayVisitor`], are the wire format between event producers (the
//! [`JsonReader`](crate::reader::JsonReader), replay of `Json` trees, spec
//! replay) and consumers (builders, bind visitors, the writer, decorators).
//!
//! A visitor declares its operating [`VisitorMode`] once, from its start
//! method, and keeps it for its lifetime. Returning `None` from a
//! `visit_*_object`/`visit_*_array` method instructs the driver to skip that
//! entire subtree without decoding it; every driver and decorator honors
//! this.

use crate::error::BindError;
use crate::value::{Native, Value};

/// Consumption discipline declared by a visitor at start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorMode {
    /// The driver calls structural methods eagerly as tokens arrive.
    Push,
    /// The visitor is driven externally as a lazy sequence source; element
    /// results are collected by the caller of the streaming entry point.
    Pull,
    /// On an array, the driver hands a lazy [`ElementSource`] to
    /// [`ArrayVisitor::visit_stream`] instead of calling per-element methods.
    PullInside,
}

/// Value produced by a completed visit. `None` where a visitor has already
/// routed its product elsewhere (e.g. into a parent's builder state).
pub type VisitResult = Option<Native>;

/// Consumer of one JSON object's events.
pub trait ObjectVisitor {
    fn visit_start_object(&mut self) -> VisitorMode;

    /// Called when member `name` holds an object. `Ok(None)` skips it.
    fn visit_member_object(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError>;

    /// Called when member `name` holds an array. `Ok(None)` skips it.
    fn visit_member_array(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError>;

    fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError>;

    fn visit_end_object(&mut self) -> Result<VisitResult, BindError>;
}

/// Consumer of one JSON array's events.
pub trait ArrayVisitor {
    fn visit_start_array(&mut self) -> VisitorMode;

    /// Called when the next element is an object. `Ok(None)` skips it.
    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError>;

    /// Called when the next element is an array. `Ok(None)` skips it.
    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError>;

    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError>;

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError>;

    /// Only invoked when this visitor declared [`VisitorMode::PullInside`];
    /// elements not pulled from `elements` are never decoded.
    fn visit_stream(
        &mut self,
        elements: &mut dyn ElementSource,
    ) -> Result<VisitResult, BindError> {
        let _ = elements;
        Err(BindError::InvalidMode {
            mode: VisitorMode::PullInside,
            expected: VisitorMode::Push,
        })
    }
}

/// Lazy cursor over the remaining elements of an array.
///
/// Each call decodes exactly one element by sending its events to `sink` and
/// returns the sink's result, or `None` once the array is exhausted.
/// Abandoning the source early is a valid, non-erroneous termination; the
/// driver raw-skips whatever was not pulled.
pub trait ElementSource {
    fn next_element(
        &mut self,
        sink: &mut dyn ArrayVisitor,
    ) -> Result<Option<VisitResult>, BindError>;
}

impl<V: ObjectVisitor + ?Sized> ObjectVisitor for &mut V {
    fn visit_start_object(&mut self) -> VisitorMode {
        (**self).visit_start_object()
    }
    fn visit_member_object(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        (**self).visit_member_object(name)
    }
    fn visit_member_array(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        (**self).visit_member_array(name)
    }
    fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError> {
        (**self).visit_member_value(name, value)
    }
    fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
        (**self).visit_end_object()
    }
}

impl<V: ObjectVisitor + ?Sized> ObjectVisitor for Box<V> {
    fn visit_start_object(&mut self) -> VisitorMode {
        (**self).visit_start_object()
    }
    fn visit_member_object(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        (**self).visit_member_object(name)
    }
    fn visit_member_array(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        (**self).visit_member_array(name)
    }
    fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError> {
        (**self).visit_member_value(name, value)
    }
    fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
        (**self).visit_end_object()
    }
}

impl<V: ArrayVisitor + ?Sized> ArrayVisitor for &mut V {
    fn visit_start_array(&mut self) -> VisitorMode {
        (**self).visit_start_array()
    }
    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        (**self).visit_object()
    }
    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        (**self).visit_array()
    }
    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        (**self).visit_value(value)
    }
    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        (**self).visit_end_array()
    }
    fn visit_stream(
        &mut self,
        elements: &mut dyn ElementSource,
    ) -> Result<VisitResult, BindError> {
        (**self).visit_stream(elements)
    }
}

impl<V: ArrayVisitor + ?Sized> ArrayVisitor for Box<V> {
    fn visit_start_array(&mut self) -> VisitorMode {
        (**self).visit_start_array()
    }
    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        (**self).visit_object()
    }
    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        (**self).visit_array()
    }
    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        (**self).visit_value(value)
    }
    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        (**self).visit_end_array()
    }
    fn visit_stream(
        &mut self,
        elements: &mut dyn ElementSource,
    ) -> Result<VisitResult, BindError> {
        (**self).visit_stream(elements)
    }
}
