//! Error taxonomy for binding, building and the bundled reader/writer.
//!
//! All errors are programming or data errors surfaced synchronously at the
//! point of detection and unwound to the caller of `read`/`write`/`stream`;
//! none are recovered internally and no partial result is ever returned.

use thiserror::Error;

use crate::visitor::VisitorMode;

#[derive(Debug, Error)]
pub enum BindError {
    /// Malformed JSON text at the given byte offset.
    #[error("syntax error at byte {0}")]
    Syntax(usize),
    /// Input ended in the middle of a document.
    #[error("unexpected end of input")]
    Eof,
    /// Input is not valid UTF-8.
    #[error("invalid utf-8 in input")]
    InvalidUtf8,
    /// No finder accepted the native type during resolution.
    #[error("no finder accepted type {0}")]
    UnresolvedType(&'static str),
    /// A type's spec resolution recursed into itself.
    #[error("cyclic spec resolution for type {0}")]
    CyclicType(&'static str),
    /// A spec variant was used where a different variant is required.
    #[error("invalid spec {spec} where a {expected} spec is required")]
    InvalidSpecShape { spec: String, expected: &'static str },
    /// A member name absent from an object spec's layout.
    #[error("no member {member} in {spec}")]
    UnknownMember { spec: String, member: String },
    /// An object finished with an unset member that has no default.
    #[error("uninitialized member {member} for {spec}")]
    MissingRequiredMember { spec: String, member: String },
    /// An enumerated value matched no registered constant.
    #[error("unknown value {value} for enum {spec}")]
    UnknownEnumConstant { spec: String, value: String },
    /// Attempted to replay an object spec carrying a member filter.
    #[error("can not replay the filtered spec {0}")]
    FilteredSpecReplay(String),
    /// A visitor declared a mode the driver can not honor here.
    #[error("visitor declared {mode:?} mode where {expected:?} is required")]
    InvalidMode {
        mode: VisitorMode,
        expected: VisitorMode,
    },
    /// A decoded value did not have the shape a layout or slot expected.
    #[error("type mismatch for {context}: expected {expected}")]
    TypeMismatch {
        expected: &'static str,
        context: String,
    },
    /// A driver broke the visitor calling contract.
    #[error("visitor protocol violation: {0}")]
    Protocol(&'static str),
}
