use super::*;

#[test]
fn allocation_is_zeroed_and_aligned() {
    let memory = Memory::allocate(64).expect("allocate");
    assert_eq!(memory.size(), 64);
    assert_eq!(memory.address() % BLOCK_ALIGN, 0);
    assert!(memory.to_vec().iter().all(|&b| b == 0));
}

#[test]
fn zero_sized_allocation_is_non_null() {
    let a = Memory::allocate(0).expect("allocate");
    let b = Memory::allocate(0).expect("allocate");
    assert!(!a.pointer().is_null());
    assert_ne!(a.address(), b.address());
}

#[test]
fn typed_round_trip() {
    let platform = Platform::lp64();
    let memory = Memory::allocate(32).expect("allocate");
    let p = memory.pointer();

    unsafe {
        p.put(0, NativeType::SInt, NativeValue::I32(-7), &platform);
        p.put(8, NativeType::Double, NativeValue::F64(2.5), &platform);
        p.put(16, NativeType::Address, NativeValue::Address(0x1234), &platform);

        assert_eq!(p.get(0, NativeType::SInt, &platform), NativeValue::I32(-7));
        assert_eq!(p.get(8, NativeType::Double, &platform), NativeValue::F64(2.5));
        assert_eq!(p.get_address(16, &platform), 0x1234);
    }
}

#[test]
fn put_truncates_to_width() {
    let platform = Platform::lp64();
    let memory = Memory::allocate(8).expect("allocate");
    let p = memory.pointer();

    unsafe {
        p.put(0, NativeType::UChar, NativeValue::I64(0xdead0001), &platform);
        assert_eq!(p.get(0, NativeType::UChar, &platform).as_i64(), 1);
        assert_eq!(p.read::<u8>(1), 0);
    }
}

#[test]
fn unsigned_read_zero_extends() {
    let platform = Platform::lp64();
    let memory = Memory::from_bytes(&[0xff, 0xff], 0).expect("allocate");
    let p = memory.pointer();

    unsafe {
        assert_eq!(p.get(0, NativeType::UShort, &platform).as_i64(), 0xffff);
        assert_eq!(p.get(0, NativeType::SShort, &platform).as_i64(), -1);
    }
}

#[test]
fn addresses_on_32_bit_platform() {
    let platform = Platform::ilp32();
    let memory = Memory::allocate(8).expect("allocate");
    let p = memory.pointer();

    unsafe {
        p.put_address(0, 0xdead_beef, &platform);
        assert_eq!(p.read::<u32>(0), 0xdead_beef);
        assert_eq!(p.read::<u32>(4), 0);
        assert_eq!(p.get_address(0, &platform), 0xdead_beef);
    }
}

#[test]
fn strings() {
    let memory = Memory::allocate(8).expect("allocate");
    let p = memory.pointer();

    unsafe {
        p.put_string(0, 8, "hello world", StringEncoding::Utf8).unwrap();
        assert_eq!(p.get_string(0, Some(8), StringEncoding::Utf8).unwrap(), "hello w");

        p.put_string(0, 8, "hi", StringEncoding::Utf8).unwrap();
        assert_eq!(p.c_strlen(0, None), 2);
        assert_eq!(p.get_string(0, None, StringEncoding::Utf8).unwrap(), "hi");
    }
}

#[test]
fn from_bytes_terminates() {
    let memory = Memory::from_bytes(b"abc", 1).expect("allocate");
    assert_eq!(memory.to_vec(), b"abc\0");
    unsafe {
        assert_eq!(memory.pointer().c_strlen(0, None), 3);
    }
}

#[test]
fn zero_and_copy() {
    let src = Memory::from_bytes(&[1, 2, 3, 4], 0).expect("allocate");
    let dst = Memory::allocate(8).expect("allocate");

    unsafe {
        dst.pointer().copy_from(2, src.pointer(), 4);
        assert_eq!(dst.to_vec(), vec![0, 0, 1, 2, 3, 4, 0, 0]);

        dst.pointer().zero(3, 2);
        assert_eq!(dst.to_vec(), vec![0, 0, 1, 0, 0, 4, 0, 0]);
    }
}

#[test]
fn pointer_offsets() {
    let p = Pointer::new(0x1000);
    assert_eq!(p.offset(0x10).address(), 0x1010);
    assert!(Pointer::NULL.is_null());
    assert_eq!(p.to_string(), "0x1000");
}
