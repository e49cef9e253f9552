//! Streaming JSON binding without derive macros or reflection.
//!
//! Documents are decoded by driving [`visitor`]s over JSON text: a visitor
//! declares whether it wants events pushed at it or wants to pull elements
//! lazily, and returning `None` for a subtree skips it without ever decoding
//! its scalars. On top of the protocol sit three consumers:
//!
//! - [`builder`]: generic tree builders producing [`Json`] values with
//!   pluggable container factories and transforms,
//! - [`spec`]: an immutable runtime description of one JSON shape, with
//!   converters, member filters, defaults and streaming aggregation,
//! - [`bind`]: a [`Binder`] registry resolving native Rust types to specs,
//!   giving typed `read`/`write`/`stream` entry points.
//!
//! Typed binding is declared explicitly per type:
//!
//! ```
//! use json_bind::{Binder, RecordLayout};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Policy {
//!     Strict,
//!     Lenient,
//! }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Contract {
//!     id: i32,
//!     policy: Policy,
//! }
//!
//! let mut binder = Binder::new();
//! binder.register_enum(
//!     "Policy",
//!     vec![("strict", Policy::Strict), ("lenient", Policy::Lenient)],
//! );
//! binder.register_record(
//!     RecordLayout::new("Contract")
//!         .value_field::<i32, _>("id", |c: &Contract| c.id)
//!         .bound_field::<Policy, _>("policy", |c: &Contract| c.policy.clone())
//!         .construct(|slots| {
//!             Ok(Contract {
//!                 id: slots.take("id")?,
//!                 policy: slots.take("policy")?,
//!             })
//!         }),
//! );
//!
//! let contract: Contract = binder.read(r#"{ "id": 7, "policy": "strict" }"#)?;
//! assert_eq!(contract, Contract { id: 7, policy: Policy::Strict });
//! assert_eq!(binder.write(&contract)?, r#"{"id":7,"policy":"strict"}"#);
//! # Ok::<(), json_bind::BindError>(())
//! ```

pub mod bind;
pub mod builder;
pub mod error;
pub mod filter;
pub mod json;
pub mod reader;
pub mod replay;
pub mod spec;
pub mod value;
pub mod visitor;
pub mod writer;

pub use bind::{BindStream, Binder, FieldInput, RecordLayout, Slots, SpecFinder, TypeKey};
pub use builder::BuilderConfig;
pub use error::BindError;
pub use json::Json;
pub use reader::JsonReader;
pub use replay::Replay;
pub use spec::{Converter, ObjectLayout, Spec};
pub use value::{Native, OpaqueValue, Scalar, Value};
pub use visitor::{ArrayVisitor, ElementSource, ObjectVisitor, VisitResult, VisitorMode};
pub use writer::JsonWriter;
