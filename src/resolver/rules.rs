//! Ordered resolution rules
//!
//! Each table is walked top to bottom; the first rule whose predicate
//! matches builds the converter. Order matters: enums are claimed before
//! aliased scalars, boxed arrays before the generic narrowing rule.

use super::ConverterResolver;
use crate::closure::{ClosureFromNative, ClosureToNative};
use crate::error::MappingError;
use crate::marshal::{
    ArrayElement, BufferFlavor, ByReferenceConverter, CharSequenceConverter, EnumConverter, EnumSetConverter,
    FromNativeConverter, NativeLongConverter, PointerArrayConverter, ScalarArrayConverter, ScalarConverter,
    StringArrayConverter, StringBuilderConverter, StringResultConverter, StructArrayConverter, StructFromNative,
    StructToNative, ToNativeConverter,
};
use crate::runtime::Platform;
use crate::types::{DeclaredType, NativeType, SignatureType};
use std::sync::Arc;

/// `(name, predicate, factory)`
pub(crate) struct Rule<C: ?Sized> {
    pub name: &'static str,
    pub matches: fn(&SignatureType, &Platform) -> bool,
    pub build: fn(&ConverterResolver, &SignatureType) -> Result<Arc<C>, MappingError>,
}

type FromRule = Rule<dyn FromNativeConverter>;
type ToRule = Rule<dyn ToNativeConverter>;

pub(crate) static FROM_NATIVE_RULES: &[FromRule] = &[
    Rule {
        name: "enum",
        matches: is_enum,
        build: enum_from_native,
    },
    Rule {
        name: "struct",
        matches: is_struct,
        build: struct_from_native,
    },
    Rule {
        name: "callback",
        matches: is_callback,
        build: callback_from_native,
    },
    Rule {
        name: "native_long",
        matches: is_native_long,
        build: native_long_from_native,
    },
    Rule {
        name: "string",
        matches: is_char_sequence,
        build: string_from_native,
    },
    Rule {
        name: "enum_set",
        matches: is_enum_set,
        build: enum_set_from_native,
    },
    Rule {
        name: "aliased_scalar",
        matches: is_aliased_scalar,
        build: scalar_from_native,
    },
];

pub(crate) static TO_NATIVE_RULES: &[ToRule] = &[
    Rule {
        name: "enum",
        matches: is_enum,
        build: enum_to_native,
    },
    Rule {
        name: "enum_set",
        matches: is_enum_set,
        build: enum_set_to_native,
    },
    Rule {
        name: "callback",
        matches: is_callback,
        build: callback_to_native,
    },
    Rule {
        name: "by_reference",
        matches: is_scalar_reference,
        build: by_reference_to_native,
    },
    Rule {
        name: "struct",
        matches: is_struct,
        build: struct_to_native,
    },
    Rule {
        name: "native_long",
        matches: is_native_long,
        build: native_long_to_native,
    },
    Rule {
        name: "string_builder",
        matches: is_string_builder,
        build: string_builder_to_native,
    },
    Rule {
        name: "string_buffer",
        matches: is_string_buffer,
        build: string_buffer_to_native,
    },
    Rule {
        name: "char_sequence",
        matches: is_char_sequence,
        build: char_sequence_to_native,
    },
    Rule {
        name: "boxed_array",
        matches: is_boxed_array,
        build: boxed_array_to_native,
    },
    Rule {
        name: "pointer_array",
        matches: is_pointer_array,
        build: pointer_array_to_native,
    },
    Rule {
        name: "narrowed_array",
        matches: is_narrowed_array,
        build: narrowed_array_to_native,
    },
    Rule {
        name: "struct_array",
        matches: is_struct_array,
        build: struct_array_to_native,
    },
    Rule {
        name: "string_array",
        matches: is_string_array,
        build: string_array_to_native,
    },
    Rule {
        name: "aliased_scalar",
        matches: is_aliased_scalar,
        build: scalar_to_native,
    },
];

/// Types the transport passes unchanged when no rule claims them
pub(crate) fn is_scalar_compatible(declared: &DeclaredType) -> bool {
    match declared {
        DeclaredType::Void | DeclaredType::Primitive(_) | DeclaredType::Boxed(_) | DeclaredType::Pointer => true,
        DeclaredType::Array(element) => matches!(**element, DeclaredType::Primitive(_)),
        _ => false,
    }
}

fn unsupported(ty: &SignatureType) -> MappingError {
    MappingError::Unsupported { ty: ty.to_string() }
}

// ===== Predicates =====

fn is_enum(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared(), DeclaredType::Enum(_))
}

fn is_enum_set(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared(), DeclaredType::EnumSet(_))
}

fn is_struct(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared(), DeclaredType::Struct(_))
}

fn is_callback(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared(), DeclaredType::Callback(_))
}

fn is_native_long(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared(), DeclaredType::NativeLong)
}

fn is_char_sequence(ty: &SignatureType, _platform: &Platform) -> bool {
    ty.declared().is_char_sequence()
}

fn is_string_builder(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared(), DeclaredType::StringBuilder)
}

fn is_string_buffer(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared(), DeclaredType::StringBuffer)
}

fn is_scalar_reference(ty: &SignatureType, _platform: &Platform) -> bool {
    match ty.declared() {
        DeclaredType::ByReference(referent) => matches!(
            **referent,
            DeclaredType::Primitive(_) | DeclaredType::Boxed(_) | DeclaredType::NativeLong | DeclaredType::Pointer
        ),
        _ => false,
    }
}

fn is_boxed_array(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(
        ty.declared().element(),
        Some(DeclaredType::Boxed(_) | DeclaredType::NativeLong)
    )
}

fn is_pointer_array(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared().element(), Some(DeclaredType::Pointer))
}

/// Integer primitive array whose alias changes the element width
fn is_narrowed_array(ty: &SignatureType, platform: &Platform) -> bool {
    match ty.declared().element() {
        Some(DeclaredType::Primitive(p)) if p.is_integer() => {
            let native = ty.effective_native(p.default_native(), platform);
            native.size(platform) != p.default_native().size(platform)
        }
        _ => false,
    }
}

fn is_struct_array(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(ty.declared().element(), Some(DeclaredType::Struct(_)))
}

fn is_string_array(ty: &SignatureType, _platform: &Platform) -> bool {
    matches!(
        ty.declared().element(),
        Some(DeclaredType::String | DeclaredType::CharSequence)
    )
}

fn is_aliased_scalar(ty: &SignatureType, _platform: &Platform) -> bool {
    match ty.declared() {
        DeclaredType::Primitive(p) | DeclaredType::Boxed(p) => p.is_integer() && ty.alias().is_some(),
        _ => false,
    }
}

// ===== Shared helpers =====

/// Effective native type of `ty` (or its array element) on the resolver's platform
fn effective(resolver: &ConverterResolver, ty: &SignatureType, default: NativeType) -> NativeType {
    ty.effective_native(default, resolver.runtime().platform())
}

fn native_long(resolver: &ConverterResolver, ty: &SignatureType) -> NativeLongConverter {
    let native = effective(resolver, ty, NativeType::SLong);
    NativeLongConverter::for_width(native.size(resolver.runtime().platform()), native.is_unsigned())
}

fn aliased_scalar(resolver: &ConverterResolver, ty: &SignatureType) -> Result<ScalarConverter, MappingError> {
    match ty.declared() {
        DeclaredType::Primitive(p) | DeclaredType::Boxed(p) => {
            Ok(ScalarConverter::new(*p, effective(resolver, ty, p.default_native())))
        }
        _ => Err(unsupported(ty)),
    }
}

// ===== From-native factories =====

fn enum_from_native(resolver: &ConverterResolver, ty: &SignatureType) -> Result<Arc<dyn FromNativeConverter>, MappingError> {
    let DeclaredType::Enum(enum_type) = ty.declared() else {
        return Err(unsupported(ty));
    };
    let native = effective(resolver, ty, ty.declared().default_native());
    Ok(Arc::new(EnumConverter::new(Arc::clone(enum_type), native)))
}

fn struct_from_native(resolver: &ConverterResolver, ty: &SignatureType) -> Result<Arc<dyn FromNativeConverter>, MappingError> {
    let DeclaredType::Struct(name) = ty.declared() else {
        return Err(unsupported(ty));
    };
    Ok(Arc::new(StructFromNative::new(resolver.runtime().layout(name)?)))
}

fn callback_from_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn FromNativeConverter>, MappingError> {
    let DeclaredType::Callback(signature) = ty.declared() else {
        return Err(unsupported(ty));
    };
    let bridge = resolver.closures().function_bridge(signature, resolver)?;
    Ok(Arc::new(ClosureFromNative::new(bridge)))
}

fn native_long_from_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn FromNativeConverter>, MappingError> {
    Ok(Arc::new(native_long(resolver, ty)))
}

fn string_from_native(_resolver: &ConverterResolver, _ty: &SignatureType) -> Result<Arc<dyn FromNativeConverter>, MappingError> {
    Ok(Arc::new(StringResultConverter))
}

fn enum_set_from_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn FromNativeConverter>, MappingError> {
    let DeclaredType::EnumSet(enum_type) = ty.declared() else {
        return Err(unsupported(ty));
    };
    let native = effective(resolver, ty, ty.declared().default_native());
    Ok(Arc::new(EnumSetConverter::new(Arc::clone(enum_type), native)))
}

fn scalar_from_native(resolver: &ConverterResolver, ty: &SignatureType) -> Result<Arc<dyn FromNativeConverter>, MappingError> {
    Ok(Arc::new(aliased_scalar(resolver, ty)?))
}

// ===== To-native factories =====

fn enum_to_native(resolver: &ConverterResolver, ty: &SignatureType) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let DeclaredType::Enum(enum_type) = ty.declared() else {
        return Err(unsupported(ty));
    };
    let native = effective(resolver, ty, ty.declared().default_native());
    Ok(Arc::new(EnumConverter::new(Arc::clone(enum_type), native)))
}

fn enum_set_to_native(resolver: &ConverterResolver, ty: &SignatureType) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let DeclaredType::EnumSet(enum_type) = ty.declared() else {
        return Err(unsupported(ty));
    };
    let native = effective(resolver, ty, ty.declared().default_native());
    Ok(Arc::new(EnumSetConverter::new(Arc::clone(enum_type), native)))
}

fn callback_to_native(resolver: &ConverterResolver, ty: &SignatureType) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let DeclaredType::Callback(signature) = ty.declared() else {
        return Err(unsupported(ty));
    };
    let bridge = resolver.closures().closure_bridge(signature, resolver)?;
    Ok(Arc::new(ClosureToNative::new(bridge)))
}

fn by_reference_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let DeclaredType::ByReference(referent) = ty.declared() else {
        return Err(unsupported(ty));
    };
    let native = effective(resolver, ty, referent.default_native());
    let direction = ty
        .modifiers()
        .direction_or(resolver.runtime().config().directions.by_reference);
    Ok(Arc::new(ByReferenceConverter::new((**referent).clone(), native, direction)))
}

fn struct_to_native(resolver: &ConverterResolver, ty: &SignatureType) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let DeclaredType::Struct(name) = ty.declared() else {
        return Err(unsupported(ty));
    };
    Ok(Arc::new(StructToNative::new(resolver.runtime().layout(name)?)))
}

fn native_long_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    Ok(Arc::new(native_long(resolver, ty)))
}

fn string_builder_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let direction = ty
        .modifiers()
        .direction_or(resolver.runtime().config().directions.string_builder);
    Ok(Arc::new(StringBuilderConverter::new(BufferFlavor::Builder, direction)))
}

fn string_buffer_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let direction = ty
        .modifiers()
        .direction_or(resolver.runtime().config().directions.string_buffer);
    Ok(Arc::new(StringBuilderConverter::new(BufferFlavor::Buffer, direction)))
}

fn char_sequence_to_native(
    _resolver: &ConverterResolver,
    _ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    Ok(Arc::new(CharSequenceConverter))
}

fn boxed_array_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let (element, default) = match ty.declared().element() {
        Some(DeclaredType::Boxed(p)) => (ArrayElement::Primitive(*p), p.default_native()),
        Some(DeclaredType::NativeLong) => (ArrayElement::NativeLong, NativeType::SLong),
        _ => return Err(unsupported(ty)),
    };
    let direction = ty
        .modifiers()
        .direction_or(resolver.runtime().config().directions.boxed_array);
    Ok(Arc::new(ScalarArrayConverter::new(
        element,
        effective(resolver, ty, default),
        true,
        direction,
    )))
}

fn pointer_array_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let direction = ty
        .modifiers()
        .direction_or(resolver.runtime().config().directions.pointer_array);
    Ok(Arc::new(PointerArrayConverter::new(resolver.runtime().address_size(), direction)))
}

fn narrowed_array_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let Some(DeclaredType::Primitive(p)) = ty.declared().element() else {
        return Err(unsupported(ty));
    };
    let direction = ty
        .modifiers()
        .direction_or(resolver.runtime().config().directions.array);
    Ok(Arc::new(ScalarArrayConverter::new(
        ArrayElement::Primitive(*p),
        effective(resolver, ty, p.default_native()),
        false,
        direction,
    )))
}

fn struct_array_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let Some(DeclaredType::Struct(name)) = ty.declared().element() else {
        return Err(unsupported(ty));
    };
    let direction = ty
        .modifiers()
        .direction_or(resolver.runtime().config().directions.struct_array);
    Ok(Arc::new(StructArrayConverter::new(resolver.runtime().layout(name)?, direction)))
}

fn string_array_to_native(
    resolver: &ConverterResolver,
    ty: &SignatureType,
) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    let direction = ty
        .modifiers()
        .direction_or(resolver.runtime().config().directions.string_array);
    Ok(Arc::new(StringArrayConverter::new(direction)))
}

fn scalar_to_native(resolver: &ConverterResolver, ty: &SignatureType) -> Result<Arc<dyn ToNativeConverter>, MappingError> {
    Ok(Arc::new(aliased_scalar(resolver, ty)?))
}
