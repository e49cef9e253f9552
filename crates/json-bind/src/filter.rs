//! Decorator visitors: member filtering and member renaming.
//!
//! Both wrap a downstream visitor and pass events through unchanged apart
//! from their one concern. Wrapping is transitive: child visitors returned by
//! the inner visitor come back wrapped with the same predicate or renamer, so
//! the decoration applies at every nesting depth, including elements pulled
//! through a stream.

use std::sync::Arc;

use crate::error::BindError;
use crate::value::Value;
use crate::visitor::{
    ArrayVisitor, ElementSource, ObjectVisitor, VisitResult, VisitorMode,
};

type MemberPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type MemberRenamer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Drops members whose name fails the predicate, at every nesting level.
///
/// A dropped object or array member is skipped by the driver without being
/// decoded; a dropped value member is decoded by the driver but never reaches
/// the inner visitor.
pub struct FilterObjectVisitor<V> {
    inner: V,
    predicate: MemberPredicate,
}

impl<V: ObjectVisitor> FilterObjectVisitor<V> {
    pub fn new<P>(inner: V, predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        FilterObjectVisitor {
            inner,
            predicate: Arc::new(predicate),
        }
    }

    fn wrap(inner: V, predicate: MemberPredicate) -> Self {
        FilterObjectVisitor { inner, predicate }
    }
}

impl<V: ObjectVisitor> ObjectVisitor for FilterObjectVisitor<V> {
    fn visit_start_object(&mut self) -> VisitorMode {
        self.inner.visit_start_object()
    }

    fn visit_member_object(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        if !(self.predicate)(name) {
            return Ok(None);
        }
        let predicate = self.predicate.clone();
        Ok(self
            .inner
            .visit_member_object(name)?
            .map(|child| -> Box<dyn ObjectVisitor + '_> {
                Box::new(FilterObjectVisitor::wrap(child, predicate))
            }))
    }

    fn visit_member_array(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        if !(self.predicate)(name) {
            return Ok(None);
        }
        let predicate = self.predicate.clone();
        Ok(self
            .inner
            .visit_member_array(name)?
            .map(|child| -> Box<dyn ArrayVisitor + '_> {
                Box::new(FilterArrayVisitor::wrap(child, predicate))
            }))
    }

    fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError> {
        if !(self.predicate)(name) {
            return Ok(None);
        }
        self.inner.visit_member_value(name, value)
    }

    fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
        self.inner.visit_end_object()
    }
}

/// Array-side carrier of a member filter. Elements are unnamed and always
/// pass; the predicate only takes effect again inside nested objects.
pub struct FilterArrayVisitor<V> {
    inner: V,
    predicate: MemberPredicate,
}

impl<V: ArrayVisitor> FilterArrayVisitor<V> {
    pub fn new<P>(inner: V, predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        FilterArrayVisitor {
            inner,
            predicate: Arc::new(predicate),
        }
    }

    fn wrap(inner: V, predicate: MemberPredicate) -> Self {
        FilterArrayVisitor { inner, predicate }
    }
}

impl<V: ArrayVisitor> ArrayVisitor for FilterArrayVisitor<V> {
    fn visit_start_array(&mut self) -> VisitorMode {
        self.inner.visit_start_array()
    }

    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        let predicate = self.predicate.clone();
        Ok(self
            .inner
            .visit_object()?
            .map(|child| -> Box<dyn ObjectVisitor + '_> {
                Box::new(FilterObjectVisitor::wrap(child, predicate))
            }))
    }

    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        let predicate = self.predicate.clone();
        Ok(self
            .inner
            .visit_array()?
            .map(|child| -> Box<dyn ArrayVisitor + '_> {
                Box::new(FilterArrayVisitor::wrap(child, predicate))
            }))
    }

    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        self.inner.visit_value(value)
    }

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        self.inner.visit_end_array()
    }

    fn visit_stream(
        &mut self,
        elements: &mut dyn ElementSource,
    ) -> Result<VisitResult, BindError> {
        let mut filtered = FilteredElements {
            inner: elements,
            predicate: self.predicate.clone(),
        };
        self.inner.visit_stream(&mut filtered)
    }
}

struct FilteredElements<'a> {
    inner: &'a mut dyn ElementSource,
    predicate: MemberPredicate,
}

impl ElementSource for FilteredElements<'_> {
    fn next_element(
        &mut self,
        sink: &mut dyn ArrayVisitor,
    ) -> Result<Option<VisitResult>, BindError> {
        let mut wrapped = FilterArrayVisitor::wrap(sink, self.predicate.clone());
        self.inner.next_element(&mut wrapped)
    }
}

/// Rewrites member names at every nesting level before forwarding them.
pub struct RenameObjectVisitor<V> {
    inner: V,
    rename: MemberRenamer,
}

impl<V: ObjectVisitor> RenameObjectVisitor<V> {
    pub fn new<F>(inner: V, rename: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        RenameObjectVisitor {
            inner,
            rename: Arc::new(rename),
        }
    }

    fn wrap(inner: V, rename: MemberRenamer) -> Self {
        RenameObjectVisitor { inner, rename }
    }
}

impl<V: ObjectVisitor> ObjectVisitor for RenameObjectVisitor<V> {
    fn visit_start_object(&mut self) -> VisitorMode {
        self.inner.visit_start_object()
    }

    fn visit_member_object(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        let renamed = (self.rename)(name);
        let rename = self.rename.clone();
        Ok(self
            .inner
            .visit_member_object(&renamed)?
            .map(|child| -> Box<dyn ObjectVisitor + '_> {
                Box::new(RenameObjectVisitor::wrap(child, rename))
            }))
    }

    fn visit_member_array(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        let renamed = (self.rename)(name);
        let rename = self.rename.clone();
        Ok(self
            .inner
            .visit_member_array(&renamed)?
            .map(|child| -> Box<dyn ArrayVisitor + '_> {
                Box::new(RenameArrayVisitor::wrap(child, rename))
            }))
    }

    fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError> {
        let renamed = (self.rename)(name);
        self.inner.visit_member_value(&renamed, value)
    }

    fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
        self.inner.visit_end_object()
    }
}

/// Array-side carrier of a renamer, for objects nested under array elements.
pub struct RenameArrayVisitor<V> {
    inner: V,
    rename: MemberRenamer,
}

impl<V: ArrayVisitor> RenameArrayVisitor<V> {
    pub fn new<F>(inner: V, rename: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        RenameArrayVisitor {
            inner,
            rename: Arc::new(rename),
        }
    }

    fn wrap(inner: V, rename: MemberRenamer) -> Self {
        RenameArrayVisitor { inner, rename }
    }
}

impl<V: ArrayVisitor> ArrayVisitor for RenameArrayVisitor<V> {
    fn visit_start_array(&mut self) -> VisitorMode {
        self.inner.visit_start_array()
    }

    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        let rename = self.rename.clone();
        Ok(self
            .inner
            .visit_object()?
            .map(|child| -> Box<dyn ObjectVisitor + '_> {
                Box::new(RenameObjectVisitor::wrap(child, rename))
            }))
    }

    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        let rename = self.rename.clone();
        Ok(self
            .inner
            .visit_array()?
            .map(|child| -> Box<dyn ArrayVisitor + '_> {
                Box::new(RenameArrayVisitor::wrap(child, rename))
            }))
    }

    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        self.inner.visit_value(value)
    }

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        self.inner.visit_end_array()
    }

    fn visit_stream(
        &mut self,
        elements: &mut dyn ElementSource,
    ) -> Result<VisitResult, BindError> {
        let mut renamed = RenamedElements {
            inner: elements,
            rename: self.rename.clone(),
        };
        self.inner.visit_stream(&mut renamed)
    }
}

struct RenamedElements<'a> {
    inner: &'a mut dyn ElementSource,
    rename: MemberRenamer,
}

impl ElementSource for RenamedElements<'_> {
    fn next_element(
        &mut self,
        sink: &mut dyn ArrayVisitor,
    ) -> Result<Option<VisitResult>, BindError> {
        let mut wrapped = RenameArrayVisitor::wrap(sink, self.rename.clone());
        self.inner.next_element(&mut wrapped)
    }
}
