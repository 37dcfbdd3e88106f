//! Type system shared by the resolver, the layout engine and the converters
//!
//! Architecture:
//! - `native.rs` - native C types and values (`NativeType`, `NativeValue`)
//! - `alias.rs` - width/platform aliases and parameter flags (modifier vocabulary)
//! - `signature.rs` - declared managed types and signature types (cache keys)
//! - `enums.rs` - enum and enum-set descriptors
//! - `value.rs` - in-process managed values

mod alias;
mod enums;
mod native;
mod signature;
mod value;

pub use alias::{Direction, Modifiers, ParameterFlags, TypeAlias};
pub use enums::{EnumSetValue, EnumType, EnumValue};
pub use native::{NativeType, NativeValue};
pub use signature::{CallbackSignature, DeclaredType, Primitive, SignatureType};
pub use value::Value;

#[cfg(test)]
mod tests;
