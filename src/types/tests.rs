//! Type system tests
//!
//! - Native: widths per platform, truncation, bit encoding
//! - Aliases: platform-sized aliases, C name parsing
//! - Modifiers: canonical ordering, direction flags
//! - Enums: constants, set masks

use super::*;
use crate::runtime::Platform;
use proptest::prelude::*;

// ===== Native Types =====

#[test]
fn test_native_sizes_follow_platform() {
    let lp64 = Platform::lp64();
    let llp64 = Platform::llp64();
    let ilp32 = Platform::ilp32();

    assert_eq!(NativeType::SLong.size(&lp64), 8);
    assert_eq!(NativeType::SLong.size(&llp64), 4);
    assert_eq!(NativeType::Address.size(&llp64), 8);
    assert_eq!(NativeType::Address.size(&ilp32), 4);
    assert_eq!(NativeType::SLongLong.size(&ilp32), 8);
}

#[test]
fn test_native_alignment_capped() {
    assert_eq!(NativeType::Double.align(&Platform::lp64()), 8);
    assert_eq!(NativeType::Double.align(&Platform::ilp32()), 4);
    assert_eq!(NativeType::SChar.align(&Platform::ilp32()), 1);
    assert_eq!(NativeType::Void.align(&Platform::lp64()), 1);
}

#[test]
fn test_from_i64_truncates() {
    let platform = Platform::lp64();
    let v = NativeValue::from_i64(NativeType::UChar, 0xdead0001, &platform);
    assert_eq!(v, NativeValue::U8(1));
    assert_eq!(v.as_i64(), 1);

    let v = NativeValue::from_i64(NativeType::SChar, 0xff, &platform);
    assert_eq!(v.as_i64(), -1);

    let v = NativeValue::from_i64(NativeType::UInt, -1, &platform);
    assert_eq!(v.as_i64(), u32::MAX as i64);
}

#[test]
fn test_long_width_follows_platform() {
    let v = NativeValue::from_i64(NativeType::SLong, 1 << 40, &Platform::llp64());
    assert_eq!(v, NativeValue::I32(0));

    let v = NativeValue::from_i64(NativeType::SLong, 1 << 40, &Platform::lp64());
    assert_eq!(v, NativeValue::I64(1 << 40));
}

#[test]
fn test_address_masked_on_32_bit() {
    let v = NativeValue::from_i64(NativeType::Address, 0x1_0000_1000, &Platform::ilp32());
    assert_eq!(v.as_address(), 0x1000);
}

#[test]
fn test_float_bits() {
    let platform = Platform::lp64();
    let bits = NativeValue::F32(1.5).to_bits();
    assert_eq!(NativeValue::from_bits(NativeType::Float, bits, &platform), NativeValue::F32(1.5));

    let bits = NativeValue::F64(-2.25).to_bits();
    assert_eq!(NativeValue::from_bits(NativeType::Double, bits, &platform), NativeValue::F64(-2.25));
}

#[test]
fn test_from_bits_ignores_upper_bits() {
    let v = NativeValue::from_bits(NativeType::UShort, 0xffff_0000_0000_1234, &Platform::lp64());
    assert_eq!(v, NativeValue::U16(0x1234));
}

// ===== Aliases =====

#[test]
fn test_alias_native_types() {
    let lp64 = Platform::lp64();
    let ilp32 = Platform::ilp32();

    assert_eq!(TypeAlias::UInt8.native_type(&lp64), NativeType::UChar);
    assert_eq!(TypeAlias::Int64.native_type(&ilp32), NativeType::SLongLong);
    assert_eq!(TypeAlias::Size.native_type(&lp64), NativeType::ULongLong);
    assert_eq!(TypeAlias::Size.native_type(&ilp32), NativeType::UInt);
    assert_eq!(TypeAlias::IntPtr.native_type(&ilp32), NativeType::SInt);
    assert_eq!(TypeAlias::Long.native_type(&lp64), NativeType::SLong);
}

#[test]
fn test_alias_c_names() {
    assert_eq!(TypeAlias::from_c_name("u_int8_t"), Some(TypeAlias::UInt8));
    assert_eq!(TypeAlias::from_c_name("uint8_t"), Some(TypeAlias::UInt8));
    assert_eq!(TypeAlias::from_c_name("size_t"), Some(TypeAlias::Size));
    assert_eq!(TypeAlias::from_c_name("quad"), None);

    for alias in [TypeAlias::UInt64, TypeAlias::SSize, TypeAlias::ULong] {
        assert_eq!(TypeAlias::from_c_name(alias.c_name()), Some(alias));
    }
}

#[test]
fn test_platform_sized_aliases() {
    assert!(TypeAlias::Long.is_platform_sized());
    assert!(TypeAlias::UIntPtr.is_platform_sized());
    assert!(!TypeAlias::Int32.is_platform_sized());
}

// ===== Modifiers =====

#[test]
fn test_modifiers_canonical_order() {
    let a = Modifiers::none().alias(TypeAlias::UInt32).alias(TypeAlias::Int8);
    let b = Modifiers::none().alias(TypeAlias::Int8).alias(TypeAlias::UInt32).alias(TypeAlias::Int8);
    assert_eq!(a, b);
    assert_eq!(a.aliases(), &[TypeAlias::Int8, TypeAlias::UInt32]);
}

#[test]
fn test_direction_flags() {
    assert_eq!(Modifiers::none().direction_or(Direction::In), Direction::In);
    assert_eq!(Modifiers::none().output().direction_or(Direction::In), Direction::Out);
    assert_eq!(
        Modifiers::none().input().output().direction_or(Direction::In),
        Direction::InOut
    );

    let flags = ParameterFlags::PINNED | ParameterFlags::NUL_TERMINATE;
    assert!(flags.contains(ParameterFlags::PINNED));
    assert_eq!(flags.direction(), None);
}

#[test]
fn test_signature_display() {
    let ty = SignatureType::new(
        DeclaredType::Primitive(Primitive::Int),
        Modifiers::none().alias(TypeAlias::UInt8).output(),
    );
    assert_eq!(ty.to_string(), "@u_int8_t @out i32");
    assert_eq!(
        DeclaredType::array_of(DeclaredType::Boxed(Primitive::Long)).to_string(),
        "Option<i64>[]"
    );
}

#[test]
fn test_effective_native() {
    let platform = Platform::lp64();
    let plain = SignatureType::plain(DeclaredType::Primitive(Primitive::Int));
    assert_eq!(plain.effective_native(NativeType::SInt, &platform), NativeType::SInt);

    let aliased = SignatureType::new(
        DeclaredType::Primitive(Primitive::Int),
        Modifiers::none().alias(TypeAlias::UInt8),
    );
    assert_eq!(aliased.effective_native(NativeType::SInt, &platform), NativeType::UChar);
}

// ===== Enums =====

fn colors() -> std::sync::Arc<EnumType> {
    EnumType::new("Color", [("NONE", 0), ("RED", 1), ("GREEN", 2), ("BLUE", 4)])
}

#[test]
fn test_enum_lookup() {
    let ty = colors();
    let green = ty.constant("GREEN").unwrap();
    assert_eq!(green.value(), 2);
    assert_eq!(green.to_string(), "Color::GREEN");
    assert_eq!(ty.from_value(4).unwrap().name(), "BLUE");
    assert!(ty.from_value(3).is_none());
}

#[test]
fn test_enum_set_mask() {
    let ty = colors();
    let set = EnumSetValue::of(&ty, ["RED", "BLUE"]).unwrap();
    assert_eq!(set.mask(), 5);

    let back = EnumSetValue::from_mask(&ty, 5);
    assert_eq!(back, set);
    assert!(!back.contains("NONE"));

    let empty = EnumSetValue::from_mask(&ty, 0);
    assert_eq!(empty.names().collect::<Vec<_>>(), vec!["NONE"]);
    assert!(EnumSetValue::of(&ty, ["PURPLE"]).is_none());
}

#[test]
fn test_wide_enum_set() {
    let narrow = colors();
    let wide = EnumType::new("Wide", [("LOW", 1), ("HIGH", 1i64 << 40)]);
    assert!(!narrow.requires_wide_mask());
    assert!(wide.requires_wide_mask());
    assert_eq!(DeclaredType::EnumSet(wide).default_native(), NativeType::SLongLong);
}

// ===== Values =====

#[test]
fn test_value_views() {
    assert_eq!(Value::from(7i8).as_i64(), Some(7));
    assert_eq!(Value::from(true).as_i64(), Some(1));
    assert_eq!(Value::from(1.5f32).as_f64(), Some(1.5));
    assert_eq!(Value::from("abc").as_str(), Some("abc"));
    assert!(Value::Null.is_null());
    assert_eq!(Value::Array(vec![]).kind(), "array");
}

proptest! {
    #[test]
    fn prop_unsigned_truncation_masks(v in any::<i64>()) {
        let platform = Platform::lp64();
        prop_assert_eq!(NativeValue::from_i64(NativeType::UChar, v, &platform).as_i64(), v & 0xff);
        prop_assert_eq!(NativeValue::from_i64(NativeType::UShort, v, &platform).as_i64(), v & 0xffff);
        prop_assert_eq!(NativeValue::from_i64(NativeType::UInt, v, &platform).as_i64(), v & 0xffff_ffff);
    }

    #[test]
    fn prop_bits_preserve_integers(v in any::<i32>()) {
        let platform = Platform::lp64();
        let bits = NativeValue::I32(v).to_bits();
        prop_assert_eq!(NativeValue::from_bits(NativeType::SInt, bits, &platform), NativeValue::I32(v));
    }
}
