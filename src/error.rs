//! Error taxonomy
//!
//! Three layers, matching when a failure can happen:
//! - `MappingError`: a signature cannot be bound (resolution time)
//! - `LayoutError`: an aggregate declaration is invalid (first layout)
//! - `MarshalError`: a single call's data conversion failed (call time)

use thiserror::Error;

/// Resolution-time failure. Raised before any native call is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("no native mapping for {ty}")]
    Unsupported { ty: String },

    #[error("conflicting modifiers on {ty}: {reason}")]
    ConflictingModifiers { ty: String, reason: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Invalid aggregate declaration, or an accessor used against the wrong field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unknown aggregate type '{name}'")]
    UnknownAggregate { name: String },

    #[error("recursive embedding: {}", chain.join(" -> "))]
    RecursiveEmbedding { chain: Vec<String> },

    #[error("invalid declaration of '{name}': {reason}")]
    InvalidDeclaration { name: String, reason: String },

    #[error("'{aggregate}' has no field '{field}'")]
    UnknownField { aggregate: String, field: String },

    #[error("field '{field}' is {found}, not {expected}")]
    FieldKind {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("index {index} out of bounds for array field '{field}' of length {len}")]
    IndexOutOfBounds {
        field: String,
        index: usize,
        len: usize,
    },
}

/// Call-time conversion failure, scoped to the call that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("cannot encode string as {encoding}: {reason}")]
    Encoding {
        encoding: &'static str,
        reason: String,
    },

    #[error("{value} is not a constant of enum {ty}")]
    UnknownEnumValue { ty: String, value: i64 },

    #[error("null value where {expected} is required")]
    NullValue { expected: String },

    #[error("no native invoker available for function at {address:#x}")]
    NoInvoker { address: usize },

    #[error("expected {expected} arguments, got {got}")]
    ArgCount { expected: usize, got: usize },

    #[error("callback failed: {0}")]
    Callback(String),

    #[error("failed to allocate {size} bytes of native memory")]
    OutOfMemory { size: usize },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
