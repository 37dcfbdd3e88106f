//! Struct layout engine
//!
//! Architecture:
//! - `decl.rs` - aggregate declarations (struct/union, ordered fields)
//! - `compute.rs` - offset/size computation, memoized per runtime
//! - `instance.rs` - instances, field accessors, embedded and referenced views
//!
//! Usage:
//! ```
//! use nativecall::layout::{AggregateDecl, FieldType, Struct};
//! use nativecall::runtime::{Platform, Runtime};
//! use nativecall::types::{NativeType, Value};
//! use std::sync::Arc;
//!
//! let runtime = Arc::new(Runtime::with_platform(Platform::host()));
//! runtime.declare(AggregateDecl::structure("pair")
//!     .field("a", NativeType::SInt)
//!     .field("b", NativeType::Double)).unwrap();
//!
//! let pair = Struct::new(&runtime, "pair").unwrap();
//! pair.set("a", 7).unwrap();
//! assert_eq!(pair.get("a").unwrap(), Value::Int(7));
//! ```

mod compute;
mod decl;
mod instance;

pub use compute::{FieldKind, FieldLayout, StructLayout, StructLayoutEngine};
pub use decl::{AggregateDecl, AggregateKind, FieldDecl, FieldType};
pub use instance::{ArrayField, FieldAccessor, Struct, StructRef};

#[cfg(test)]
mod tests;
