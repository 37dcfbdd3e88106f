//! Layout tests
//!
//! - Computation: C offsets on LP64 / ILP32, unions, packing, arrays
//! - Declarations: validation and recursion detection
//! - Instances: scalar access, union aliasing, embedded vs referenced views

use super::compute::align_up;
use super::*;
use crate::error::{LayoutError, MarshalError};
use crate::memory::Memory;
use crate::runtime::{Platform, Runtime};
use crate::types::{NativeType, TypeAlias, Value};
use proptest::prelude::*;
use std::sync::Arc;

fn runtime(platform: Platform) -> Arc<Runtime> {
    Arc::new(Runtime::with_platform(platform))
}

fn mixed() -> AggregateDecl {
    AggregateDecl::structure("mixed")
        .field("a", NativeType::SChar)
        .field("b", NativeType::SLongLong)
        .field("c", NativeType::Float)
        .field("d", NativeType::Double)
        .field("e", FieldType::Pointer)
}

fn numeric_union() -> AggregateDecl {
    AggregateDecl::union("numeric")
        .field("i8", NativeType::SChar)
        .field("u32", NativeType::UInt)
        .field("i64", NativeType::SLongLong)
        .field("f", NativeType::Float)
        .field("d", NativeType::Double)
}

fn offsets(layout: &StructLayout) -> Vec<usize> {
    layout.fields().iter().map(|f| f.offset).collect()
}

// ===== Computation =====

#[test]
fn test_mixed_struct_lp64() {
    let rt = runtime(Platform::lp64());
    rt.declare(mixed()).unwrap();

    let layout = rt.layout("mixed").unwrap();
    assert_eq!(offsets(&layout), vec![0, 8, 16, 24, 32]);
    assert_eq!(layout.size(), 40);
    assert_eq!(layout.alignment(), 8);
}

#[test]
fn test_mixed_struct_ilp32() {
    let rt = runtime(Platform::ilp32());
    rt.declare(mixed()).unwrap();

    let layout = rt.layout("mixed").unwrap();
    assert_eq!(offsets(&layout), vec![0, 4, 12, 16, 24]);
    assert_eq!(layout.size(), 28);
    assert_eq!(layout.alignment(), 4);
}

#[test]
fn test_tail_padding() {
    let rt = runtime(Platform::lp64());
    rt.declare(
        AggregateDecl::structure("tail")
            .field("wide", NativeType::Double)
            .field("narrow", NativeType::SChar),
    )
    .unwrap();
    assert_eq!(rt.size("tail").unwrap(), 16);
}

#[test]
fn test_union_layout() {
    let rt = runtime(Platform::lp64());
    rt.declare(numeric_union()).unwrap();

    let layout = rt.layout("numeric").unwrap();
    assert!(layout.fields().iter().all(|f| f.offset == 0));
    assert_eq!(layout.size(), 8);
    assert_eq!(layout.kind(), AggregateKind::Union);
}

#[test]
fn test_union_size_rounded_to_alignment() {
    let rt = runtime(Platform::lp64());
    rt.declare(
        AggregateDecl::union("odd")
            .field("bytes", FieldType::array(NativeType::UChar.into(), 5))
            .field("word", NativeType::UInt),
    )
    .unwrap();
    assert_eq!(rt.size("odd").unwrap(), 8);
}

#[test]
fn test_platform_sized_fields() {
    let decl = AggregateDecl::structure("sizes")
        .field("len", TypeAlias::Size)
        .field("count", TypeAlias::Long)
        .field("flag", NativeType::SChar);

    let lp64 = runtime(Platform::lp64());
    lp64.declare(decl.clone()).unwrap();
    assert_eq!(offsets(&lp64.layout("sizes").unwrap()), vec![0, 8, 16]);
    assert_eq!(lp64.size("sizes").unwrap(), 24);

    let llp64 = runtime(Platform::llp64());
    llp64.declare(decl.clone()).unwrap();
    assert_eq!(offsets(&llp64.layout("sizes").unwrap()), vec![0, 8, 12]);
    assert_eq!(llp64.size("sizes").unwrap(), 16);

    let ilp32 = runtime(Platform::ilp32());
    ilp32.declare(decl).unwrap();
    assert_eq!(offsets(&ilp32.layout("sizes").unwrap()), vec![0, 4, 8]);
    assert_eq!(ilp32.size("sizes").unwrap(), 12);
}

#[test]
fn test_embedded_alignment() {
    let rt = runtime(Platform::lp64());
    rt.declare(numeric_union()).unwrap();
    rt.declare(
        AggregateDecl::structure("outer")
            .field("tag", NativeType::SChar)
            .field("value", FieldType::inner("numeric"))
            .field("next", FieldType::reference("outer")),
    )
    .unwrap();

    let layout = rt.layout("outer").unwrap();
    assert_eq!(offsets(&layout), vec![0, 8, 16]);
    assert_eq!(layout.size(), 24);
}

#[test]
fn test_packing() {
    let rt = runtime(Platform::lp64());
    rt.declare(
        AggregateDecl::structure("packed")
            .packed(1)
            .field("a", NativeType::SChar)
            .field("b", NativeType::UInt)
            .field("c", NativeType::Double),
    )
    .unwrap();

    let layout = rt.layout("packed").unwrap();
    assert_eq!(offsets(&layout), vec![0, 1, 5]);
    assert_eq!(layout.size(), 13);
}

#[test]
fn test_array_field_layout() {
    let rt = runtime(Platform::lp64());
    rt.declare(
        AggregateDecl::structure("buffer")
            .field("len", NativeType::UShort)
            .field("data", FieldType::array(NativeType::SInt.into(), 3))
            .field("name", FieldType::String { len: 5 }),
    )
    .unwrap();

    let layout = rt.layout("buffer").unwrap();
    assert_eq!(offsets(&layout), vec![0, 4, 16]);
    assert_eq!(layout.size(), 24);
    assert_eq!(layout.field("data").unwrap().size, 12);
}

#[test]
fn test_layout_memoized() {
    let rt = runtime(Platform::lp64());
    rt.declare(mixed()).unwrap();
    let first = rt.layout("mixed").unwrap();
    let second = rt.layout("mixed").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_align_up() {
    assert_eq!(align_up(0, 8), 0);
    assert_eq!(align_up(1, 8), 8);
    assert_eq!(align_up(8, 8), 8);
    assert_eq!(align_up(9, 4), 12);
}

// ===== Declarations =====

#[test]
fn test_unknown_aggregate() {
    let rt = runtime(Platform::lp64());
    assert_eq!(
        rt.layout("missing").unwrap_err(),
        LayoutError::UnknownAggregate {
            name: "missing".into()
        }
    );

    rt.declare(AggregateDecl::structure("dangling").field("p", FieldType::reference("nowhere")))
        .unwrap();
    assert!(matches!(
        rt.layout("dangling"),
        Err(LayoutError::UnknownAggregate { name }) if name == "nowhere"
    ));
}

#[test]
fn test_recursive_embedding() {
    let rt = runtime(Platform::lp64());
    rt.declare(AggregateDecl::structure("a").field("b", FieldType::inner("b")))
        .unwrap();
    rt.declare(AggregateDecl::structure("b").field("a", FieldType::inner("a")))
        .unwrap();

    match rt.layout("a") {
        Err(LayoutError::RecursiveEmbedding { chain }) => {
            assert_eq!(chain, vec!["a", "b", "a"]);
        }
        other => panic!("expected recursion error, got {:?}", other),
    }
    // Errors are not cached; the same failure is reproduced
    assert!(matches!(rt.layout("a"), Err(LayoutError::RecursiveEmbedding { .. })));
}

#[test]
fn test_self_reference_allowed() {
    let rt = runtime(Platform::lp64());
    rt.declare(
        AggregateDecl::structure("node")
            .field("value", NativeType::SInt)
            .field("next", FieldType::reference("node")),
    )
    .unwrap();
    assert_eq!(rt.size("node").unwrap(), 16);
}

#[test]
fn test_invalid_declarations() {
    let rt = runtime(Platform::lp64());
    let invalid = [
        AggregateDecl::structure("empty"),
        AggregateDecl::structure("zero").field("xs", FieldType::array(NativeType::SInt.into(), 0)),
        AggregateDecl::structure("dup")
            .field("x", NativeType::SInt)
            .field("x", NativeType::SInt),
        AggregateDecl::structure("void").field("v", NativeType::Void),
        AggregateDecl::structure("pack").packed(3).field("x", NativeType::SInt),
    ];

    for decl in invalid {
        let name = decl.name().to_string();
        match rt.declare(decl) {
            Err(LayoutError::InvalidDeclaration { name: n, .. }) => assert_eq!(n, name),
            other => panic!("{} accepted: {:?}", name, other),
        }
    }
}

#[test]
fn test_redeclaration() {
    let rt = runtime(Platform::lp64());
    rt.declare(mixed()).unwrap();
    rt.declare(mixed()).unwrap();

    let changed = AggregateDecl::structure("mixed").field("a", NativeType::SInt);
    assert!(matches!(
        rt.declare(changed),
        Err(LayoutError::InvalidDeclaration { .. })
    ));
}

#[test]
fn test_oversized_array_rejected() {
    let rt = runtime(Platform::lp64());
    rt.declare(
        AggregateDecl::structure("huge")
            .field("tag", NativeType::SChar)
            .field("xs", FieldType::array(NativeType::SLongLong.into(), usize::MAX / 4)),
    )
    .unwrap();

    match rt.layout("huge") {
        Err(LayoutError::InvalidDeclaration { name, reason }) => {
            assert_eq!(name, "huge");
            assert_eq!(reason, "size overflows");
        }
        other => panic!("expected overflow error, got {:?}", other),
    }
    assert!(Struct::new(&rt, "huge").is_err());
}

#[test]
fn test_offset_overflow_rejected() {
    let rt = runtime(Platform::lp64());
    let half = usize::MAX / 2;
    rt.declare(
        AggregateDecl::structure("wide")
            .field("a", FieldType::String { len: half })
            .field("b", FieldType::String { len: half })
            .field("c", NativeType::SLongLong),
    )
    .unwrap();
    assert!(matches!(
        rt.layout("wide"),
        Err(LayoutError::InvalidDeclaration { .. })
    ));
}

#[test]
fn test_invalid_platform_rejected() {
    let rt = runtime(Platform {
        address_size: 2,
        long_size: 4,
        max_align: 0,
    });
    rt.declare(AggregateDecl::structure("p").field("ptr", FieldType::Pointer))
        .unwrap();
    assert!(matches!(rt.layout("p"), Err(LayoutError::InvalidDeclaration { .. })));
}

// ===== Instances =====

#[test]
fn test_scalar_access() {
    let rt = runtime(Platform::host());
    rt.declare(mixed()).unwrap();
    let s = Struct::new(&rt, "mixed").unwrap();

    s.set("a", -3i8).unwrap();
    s.set("b", i64::MIN).unwrap();
    s.set("c", 1.25f32).unwrap();
    s.set("d", -0.5f64).unwrap();
    s.set("e", Value::Address(0x1000)).unwrap();

    assert_eq!(s.get("a").unwrap(), Value::Byte(-3));
    assert_eq!(s.get("b").unwrap(), Value::Long(i64::MIN));
    assert_eq!(s.get("c").unwrap(), Value::Float(1.25));
    assert_eq!(s.get("d").unwrap(), Value::Double(-0.5));
    assert_eq!(s.get("e").unwrap(), Value::Address(0x1000));

    s.reset();
    assert!(s.to_bytes().iter().all(|&b| b == 0));
}

#[test]
fn test_unsigned_truncation() {
    let rt = runtime(Platform::host());
    rt.declare(
        AggregateDecl::structure("u8s")
            .field("x", TypeAlias::UInt8)
            .field("y", TypeAlias::UInt32),
    )
    .unwrap();
    let s = Struct::new(&rt, "u8s").unwrap();

    s.set("x", 0xdead0001i64).unwrap();
    s.set("y", -1).unwrap();
    assert_eq!(s.get("x").unwrap(), Value::Short(1));
    assert_eq!(s.get("y").unwrap(), Value::Long(u32::MAX as i64));
}

#[test]
fn test_union_aliasing() {
    let rt = runtime(Platform::host());
    rt.declare(numeric_union()).unwrap();
    let u = Struct::new(&rt, "numeric").unwrap();

    u.set("f", 1.0f32).unwrap();
    assert_eq!(u.get("u32").unwrap(), Value::Long(0x3f80_0000));

    u.set("i64", -1i64).unwrap();
    assert_eq!(u.get("i8").unwrap(), Value::Byte(-1));
}

#[test]
fn test_embedded_views_alias_parent() {
    let rt = runtime(Platform::host());
    rt.declare(numeric_union()).unwrap();
    rt.declare(
        AggregateDecl::structure("holder")
            .field("tag", NativeType::SInt)
            .field("value", FieldType::inner("numeric")),
    )
    .unwrap();
    let parent = Struct::new(&rt, "holder").unwrap();

    let first = parent.inner("value").unwrap();
    let second = parent.inner("value").unwrap();
    assert_eq!(
        first.address(),
        parent.address() + parent.layout().offset_of("value").unwrap()
    );
    assert!(first.is_owned());

    first.set("i64", 42i64).unwrap();
    assert_eq!(second.get("i64").unwrap(), Value::Long(42));

    parent.reset();
    assert_eq!(first.get("i64").unwrap(), Value::Long(0));
}

#[test]
fn test_embedded_view_keeps_memory_alive() {
    let rt = runtime(Platform::host());
    rt.declare(numeric_union()).unwrap();
    rt.declare(AggregateDecl::structure("box").field("value", FieldType::inner("numeric")))
        .unwrap();

    let child = {
        let parent = Struct::new(&rt, "box").unwrap();
        parent.inner("value").unwrap()
    };
    child.set("d", 3.5).unwrap();
    assert_eq!(child.get("d").unwrap(), Value::Double(3.5));
}

#[test]
fn test_reference_views_are_fresh() {
    let rt = runtime(Platform::host());
    rt.declare(numeric_union()).unwrap();
    rt.declare(AggregateDecl::structure("ptr").field("target", FieldType::reference("numeric")))
        .unwrap();
    let parent = Struct::new(&rt, "ptr").unwrap();
    let reference = parent.reference("target").unwrap();

    assert!(reference.get().is_none());
    reference.reset();

    let first = Memory::allocate(rt.size("numeric").unwrap()).unwrap();
    let second = Memory::allocate(rt.size("numeric").unwrap()).unwrap();

    unsafe { reference.set(first.address()) };
    let view = reference.get().unwrap();
    assert_eq!(view.address(), first.address());
    assert!(!view.is_owned());
    view.set("i64", 7i64).unwrap();

    unsafe { reference.set(second.address()) };
    let rebound = reference.get().unwrap();
    assert_eq!(rebound.get("i64").unwrap(), Value::Long(0));
    // The old view still targets the first block
    assert_eq!(view.get("i64").unwrap(), Value::Long(7));

    rebound.set("i64", 9i64).unwrap();
    reference.reset();
    assert_eq!(reference.get().unwrap().get("i64").unwrap(), Value::Long(0));
    assert_eq!(view.get("i64").unwrap(), Value::Long(7));

    reference.set_null();
    assert!(reference.is_null());
}

#[test]
fn test_array_access() {
    let rt = runtime(Platform::host());
    rt.declare(numeric_union()).unwrap();
    rt.declare(
        AggregateDecl::structure("arrays")
            .field("ints", FieldType::array(NativeType::SInt.into(), 3))
            .field("items", FieldType::array(FieldType::inner("numeric"), 2)),
    )
    .unwrap();
    let s = Struct::new(&rt, "arrays").unwrap();

    let ints = s.array("ints").unwrap();
    assert_eq!(ints.len(), 3);
    ints.set(0, 1).unwrap();
    ints.set(2, 3).unwrap();
    assert_eq!(ints.to_vec().unwrap(), vec![Value::Int(1), Value::Int(0), Value::Int(3)]);
    assert!(matches!(
        ints.get(3),
        Err(MarshalError::Layout(LayoutError::IndexOutOfBounds { index: 3, len: 3, .. }))
    ));

    let items = s.array("items").unwrap();
    let second = items.inner(1).unwrap();
    let items_offset = s.layout().offset_of("items").unwrap();
    assert_eq!(second.address(), s.address() + items_offset + rt.size("numeric").unwrap());
    second.set("i8", 5i8).unwrap();
    assert_eq!(items.inner(1).unwrap().get("i8").unwrap(), Value::Byte(5));
}

#[test]
fn test_string_field() {
    let rt = runtime(Platform::host());
    rt.declare(AggregateDecl::structure("named").field("name", FieldType::String { len: 6 }))
        .unwrap();
    let s = Struct::new(&rt, "named").unwrap();

    s.set("name", "abc").unwrap();
    assert_eq!(s.get("name").unwrap(), Value::String("abc".into()));
    s.set("name", "truncated").unwrap();
    assert_eq!(s.get("name").unwrap(), Value::String("trunc".into()));
}

#[test]
fn test_accessor_kind_errors() {
    let rt = runtime(Platform::host());
    rt.declare(numeric_union()).unwrap();
    rt.declare(
        AggregateDecl::structure("kinds")
            .field("n", NativeType::SInt)
            .field("inner", FieldType::inner("numeric")),
    )
    .unwrap();
    let s = Struct::new(&rt, "kinds").unwrap();

    assert!(matches!(s.field("inner"), Err(LayoutError::FieldKind { .. })));
    assert!(matches!(s.inner("n"), Err(LayoutError::FieldKind { .. })));
    assert!(matches!(s.reference("n"), Err(LayoutError::FieldKind { .. })));
    assert!(matches!(s.field("nope"), Err(LayoutError::UnknownField { .. })));
    assert!(matches!(
        s.set("n", "text"),
        Err(MarshalError::TypeMismatch { .. })
    ));
    assert!(matches!(s.set("n", Value::Null), Err(MarshalError::NullValue { .. })));
}

#[test]
fn test_from_address() {
    let rt = runtime(Platform::host());
    rt.declare(mixed()).unwrap();
    let owned = Struct::new(&rt, "mixed").unwrap();
    owned.set("b", 99i64).unwrap();

    let view = unsafe { Struct::from_address(&rt, "mixed", owned.address()).unwrap() };
    assert_eq!(view.get("b").unwrap(), Value::Long(99));
    assert_eq!(Value::Struct(view), Value::Struct(owned));
}

fn scalar_strategy() -> impl Strategy<Value = NativeType> {
    prop_oneof![
        Just(NativeType::SChar),
        Just(NativeType::UShort),
        Just(NativeType::SInt),
        Just(NativeType::Float),
        Just(NativeType::SLong),
        Just(NativeType::SLongLong),
        Just(NativeType::Double),
        Just(NativeType::Address),
    ]
}

proptest! {
    #[test]
    fn prop_struct_layout_invariants(types in prop::collection::vec(scalar_strategy(), 1..12)) {
        for platform in [Platform::lp64(), Platform::ilp32()] {
            let rt = runtime(platform);
            let decl = types
                .iter()
                .enumerate()
                .fold(AggregateDecl::structure("generated"), |decl, (i, ty)| decl.field(format!("f{}", i), *ty));
            rt.declare(decl).unwrap();
            let layout = rt.layout("generated").unwrap();

            let mut end = 0;
            for field in layout.fields() {
                prop_assert!(field.offset >= end);
                prop_assert_eq!(field.offset % field.alignment, 0);
                end = field.offset + field.size;
            }
            prop_assert!(layout.size() >= end);
            prop_assert_eq!(layout.size() % layout.alignment(), 0);
            prop_assert!(layout.size() - end < layout.alignment());
        }
    }

    #[test]
    fn prop_union_size_is_widest_member(types in prop::collection::vec(scalar_strategy(), 1..8)) {
        let platform = Platform::lp64();
        let rt = runtime(platform);
        let decl = types
            .iter()
            .enumerate()
            .fold(AggregateDecl::union("generated"), |decl, (i, ty)| decl.field(format!("f{}", i), *ty));
        rt.declare(decl).unwrap();

        let widest = types.iter().map(|t| t.size(&platform)).max().unwrap();
        let layout = rt.layout("generated").unwrap();
        prop_assert_eq!(layout.size(), align_up(widest, layout.alignment()));
    }
}
