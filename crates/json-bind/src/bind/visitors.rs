//! Spec-driven decoding visitors, one per spec variant.
//!
//! The visitor family mirrors the spec tree: an object spec decodes through
//! a [`BindObjectVisitor`] that threads layout builder state, an array spec
//! through a [`BindArrayVisitor`] accumulating elements, a stream spec
//! through a [`BindStreamVisitor`] that runs its aggregator over a lazy
//! element iterator. Child visitors are a pure function of the member or
//! component spec.

use std::mem;
use std::sync::Arc;

use crate::error::BindError;
use crate::spec::{Aggregator, BuilderState, MemberPredicate, ObjectLayout, Spec, SpecKind};
use crate::value::{Native, Value};
use crate::visitor::{ArrayVisitor, ElementSource, ObjectVisitor, VisitResult, VisitorMode};

/// Where a finished product goes: yielded from the end call, or folded into
/// the parent through a write-back closure.
pub(crate) enum Out<'a> {
    Yield,
    Post(Box<dyn FnMut(Native) -> Result<(), BindError> + 'a>),
}

impl Out<'_> {
    fn accept(&mut self, native: Native) -> Result<VisitResult, BindError> {
        match self {
            Out::Yield => Ok(Some(native)),
            Out::Post(post) => {
                post(native)?;
                Ok(None)
            }
        }
    }
}

/// The array-shaped visitor matching `spec`: array or stream.
pub(crate) fn array_visitor_for<'a>(
    spec: &Spec,
    out: Out<'a>,
) -> Result<Box<dyn ArrayVisitor + 'a>, BindError> {
    match spec.kind() {
        SpecKind::Array(a) => Ok(Box::new(BindArrayVisitor {
            component: a.component.clone(),
            items: Vec::new(),
            out,
        })),
        SpecKind::Stream(s) => Ok(Box::new(BindStreamVisitor {
            component: s.component.clone(),
            aggregator: s.aggregator.clone(),
            out,
        })),
        _ => Err(BindError::InvalidSpecShape {
            spec: spec.to_string(),
            expected: "array",
        }),
    }
}

pub(crate) struct BindObjectVisitor<'a> {
    name: String,
    layout: Arc<dyn ObjectLayout>,
    filter: Option<MemberPredicate>,
    state: Option<BuilderState>,
    out: Out<'a>,
}

impl<'a> BindObjectVisitor<'a> {
    pub(crate) fn new(spec: &Spec, out: Out<'a>) -> Result<Self, BindError> {
        let object = match spec.kind() {
            SpecKind::Object(o) => o,
            _ => {
                return Err(BindError::InvalidSpecShape {
                    spec: spec.to_string(),
                    expected: "object",
                })
            }
        };
        Ok(BindObjectVisitor {
            name: spec.to_string(),
            layout: object.layout.clone(),
            filter: object.filter.clone(),
            state: Some(object.layout.new_builder()?),
            out,
        })
    }

    fn member_spec(&self, name: &str) -> Result<Spec, BindError> {
        self.layout
            .member_spec(name)
            .ok_or_else(|| BindError::UnknownMember {
                spec: self.name.clone(),
                member: name.to_string(),
            })
    }

    // Filtered members are skipped like a declined child: the subtree is
    // never decoded and the slot falls back to its default.
    fn passes(&self, name: &str) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(name))
    }
}

impl ObjectVisitor for BindObjectVisitor<'_> {
    fn visit_start_object(&mut self) -> VisitorMode {
        VisitorMode::Push
    }

    fn visit_member_object(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        if !self.passes(name) {
            return Ok(None);
        }
        let member = self.member_spec(name)?;
        let layout = self.layout.clone();
        let member_name = name.to_string();
        let state = &mut self.state;
        let out = Out::Post(Box::new(move |native| {
            let s = state
                .take()
                .ok_or(BindError::Protocol("builder state consumed"))?;
            *state = Some(layout.add_object(s, &member_name, native)?);
            Ok(())
        }));
        Ok(Some(Box::new(BindObjectVisitor::new(&member, out)?)))
    }

    fn visit_member_array(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        if !self.passes(name) {
            return Ok(None);
        }
        let member = self.member_spec(name)?;
        let layout = self.layout.clone();
        let member_name = name.to_string();
        let state = &mut self.state;
        let out = Out::Post(Box::new(move |native| {
            let s = state
                .take()
                .ok_or(BindError::Protocol("builder state consumed"))?;
            *state = Some(layout.add_array(s, &member_name, native)?);
            Ok(())
        }));
        Ok(Some(array_visitor_for(&member, out)?))
    }

    fn visit_member_value(&mut self, name: &str, value: Value) -> Result<VisitResult, BindError> {
        if !self.passes(name) {
            return Ok(None);
        }
        let member = self.member_spec(name)?;
        let converted = member.convert_to_native(value)?;
        let s = self
            .state
            .take()
            .ok_or(BindError::Protocol("builder state consumed"))?;
        self.state = Some(self.layout.add_value(s, name, converted)?);
        Ok(None)
    }

    fn visit_end_object(&mut self) -> Result<VisitResult, BindError> {
        let s = self
            .state
            .take()
            .ok_or(BindError::Protocol("builder state consumed"))?;
        let native = self.layout.finish(s)?;
        self.out.accept(native)
    }
}

pub(crate) struct BindArrayVisitor<'a> {
    component: Spec,
    items: Vec<Native>,
    out: Out<'a>,
}

impl<'a> BindArrayVisitor<'a> {
    pub(crate) fn new(spec: &Spec, out: Out<'a>) -> Result<Self, BindError> {
        match spec.kind() {
            SpecKind::Array(a) => Ok(BindArrayVisitor {
                component: a.component.clone(),
                items: Vec::new(),
                out,
            }),
            _ => Err(BindError::InvalidSpecShape {
                spec: spec.to_string(),
                expected: "array",
            }),
        }
    }
}

impl ArrayVisitor for BindArrayVisitor<'_> {
    fn visit_start_array(&mut self) -> VisitorMode {
        VisitorMode::Push
    }

    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        let component = self.component.clone();
        let items = &mut self.items;
        let out = Out::Post(Box::new(move |native| {
            items.push(native);
            Ok(())
        }));
        Ok(Some(Box::new(BindObjectVisitor::new(&component, out)?)))
    }

    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        let component = self.component.clone();
        let items = &mut self.items;
        let out = Out::Post(Box::new(move |native| {
            items.push(native);
            Ok(())
        }));
        Ok(Some(array_visitor_for(&component, out)?))
    }

    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        let native = self.component.materialize(value)?;
        self.items.push(native);
        Ok(None)
    }

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        let items = mem::take(&mut self.items);
        self.out.accept(Box::new(items) as Native)
    }
}

pub(crate) struct BindStreamVisitor<'a> {
    component: Spec,
    aggregator: Aggregator,
    out: Out<'a>,
}

impl ArrayVisitor for BindStreamVisitor<'_> {
    fn visit_start_array(&mut self) -> VisitorMode {
        VisitorMode::PullInside
    }

    // Per-element methods are never invoked on a pull-inside visitor.
    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        Err(BindError::Protocol("pull-inside visitor driven per element"))
    }

    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        Err(BindError::Protocol("pull-inside visitor driven per element"))
    }

    fn visit_value(&mut self, _value: Value) -> Result<VisitResult, BindError> {
        Err(BindError::Protocol("pull-inside visitor driven per element"))
    }

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        Err(BindError::Protocol("pull-inside visitor driven per element"))
    }

    fn visit_stream(
        &mut self,
        elements: &mut dyn ElementSource,
    ) -> Result<VisitResult, BindError> {
        let mut iter = ComponentElements {
            elements,
            component: &self.component,
        };
        let result = (self.aggregator)(&mut iter)?;
        self.out.accept(result)
    }
}

/// Adapts an [`ElementSource`] into the iterator handed to an aggregator.
/// Each `next` decodes exactly one element through the component spec.
struct ComponentElements<'a> {
    elements: &'a mut dyn ElementSource,
    component: &'a Spec,
}

impl Iterator for ComponentElements<'_> {
    type Item = Result<Native, BindError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sink = ComponentSink {
            component: self.component,
        };
        match self.elements.next_element(&mut sink) {
            Ok(Some(Some(native))) => Some(Ok(native)),
            Ok(Some(None)) => Some(Err(BindError::Protocol("element produced no value"))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// One-element sink: decodes whatever the next element is through the
/// component spec and yields the boxed native result.
struct ComponentSink<'a> {
    component: &'a Spec,
}

impl ArrayVisitor for ComponentSink<'_> {
    fn visit_start_array(&mut self) -> VisitorMode {
        VisitorMode::Push
    }

    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        Ok(Some(Box::new(BindObjectVisitor::new(
            self.component,
            Out::Yield,
        )?)))
    }

    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        Ok(Some(array_visitor_for(self.component, Out::Yield)?))
    }

    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        Ok(Some(self.component.materialize(value)?))
    }

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        Ok(None)
    }
}

/// Top-level pull visitor: one binder-typed element per pull.
pub(crate) struct PullComponent {
    pub(crate) component: Spec,
}

impl ArrayVisitor for PullComponent {
    fn visit_start_array(&mut self) -> VisitorMode {
        VisitorMode::Pull
    }

    fn visit_object(&mut self) -> Result<Option<Box<dyn ObjectVisitor + '_>>, BindError> {
        Ok(Some(Box::new(BindObjectVisitor::new(
            &self.component,
            Out::Yield,
        )?)))
    }

    fn visit_array(&mut self) -> Result<Option<Box<dyn ArrayVisitor + '_>>, BindError> {
        Ok(Some(array_visitor_for(&self.component, Out::Yield)?))
    }

    fn visit_value(&mut self, value: Value) -> Result<VisitResult, BindError> {
        Ok(Some(self.component.materialize(value)?))
    }

    fn visit_end_array(&mut self) -> Result<VisitResult, BindError> {
        Ok(None)
    }
}
