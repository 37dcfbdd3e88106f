//! Callbacks crossing the boundary in both directions.
//!
//! `SortLib` plays a native library that receives closure record addresses
//! and calls back into managed code through their entry functions.

use nativecall::closure::{call_native_closure, NativeFunction};
use nativecall::{
    CallbackSignature, ConverterResolver, DeclaredType, MarshalContext, MarshalError, Modifiers, NativeInvoker,
    NativeSignature, NativeType, NativeValue, Platform, Pointer, Primitive, Runtime, SignatureType, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SORT: usize = 0x2000;
const APPLY: usize = 0x2010;
const IDENTITY: usize = 0x2020;
const GET_ADDER: usize = 0x2030;
const ADD: usize = 0x2040;

struct SortLib;

impl NativeInvoker for SortLib {
    fn invoke(
        &self,
        function: usize,
        signature: &NativeSignature,
        args: &[NativeValue],
    ) -> Result<NativeValue, MarshalError> {
        match function {
            // void sort(int *base, int n, int (*cmp)(int, int))
            SORT => {
                assert_eq!(signature.params, vec![NativeType::Address, NativeType::SInt, NativeType::Address]);
                let base = Pointer::new(args[0].as_address());
                let n = args[1].as_i64() as usize;
                let cmp = args[2].as_address();
                for i in 0..n {
                    for j in 0..n - 1 - i {
                        unsafe {
                            let a = base.read::<i32>(j * 4);
                            let b = base.read::<i32>((j + 1) * 4);
                            let order = call_native_closure(cmp, &[a as u32 as u64, b as u32 as u64]) as u32 as i32;
                            if order > 0 {
                                base.write::<i32>(j * 4, b);
                                base.write::<i32>((j + 1) * 4, a);
                            }
                        }
                    }
                }
                Ok(NativeValue::Void)
            }
            // int apply(int (*f)(int), int x) { return f(x) * 2; }
            APPLY => {
                let f = args[0].as_address();
                let x = args[1].as_i64() as u32 as u64;
                let r = unsafe { call_native_closure(f, &[x]) } as u32 as i32;
                Ok(NativeValue::I32(r * 2))
            }
            IDENTITY => Ok(args[0]),
            GET_ADDER => Ok(NativeValue::Address(ADD)),
            ADD => Ok(NativeValue::I32(args.iter().map(|a| a.as_i64() as i32).sum())),
            other => Err(MarshalError::NoInvoker { address: other }),
        }
    }
}

fn resolver() -> ConverterResolver {
    let rt = Arc::new(Runtime::with_platform(Platform::host()));
    rt.set_invoker(Arc::new(SortLib));
    ConverterResolver::new(rt)
}

fn int() -> SignatureType {
    SignatureType::plain(DeclaredType::Primitive(Primitive::Int))
}

fn void() -> SignatureType {
    SignatureType::plain(DeclaredType::Void)
}

fn callback(params: Vec<SignatureType>, result: SignatureType) -> SignatureType {
    SignatureType::plain(DeclaredType::callback(CallbackSignature::new(params, result)))
}

fn comparator() -> SignatureType {
    callback(vec![int(), int()], int())
}

fn unary() -> SignatureType {
    callback(vec![int()], int())
}

fn native(resolver: &ConverterResolver, address: usize, params: Vec<SignatureType>, result: SignatureType) -> NativeFunction {
    let DeclaredType::Callback(signature) = callback(params, result).declared().clone() else {
        unreachable!()
    };
    let bridge = resolver.closures().function_bridge(&signature, resolver).unwrap();
    NativeFunction::new(address, bridge)
}

fn managed<F>(f: F) -> Value
where
    F: Fn(&[Value]) -> Result<Value, MarshalError> + Send + Sync + 'static,
{
    Value::Callback(Arc::new(f))
}

fn ints(values: &[i32]) -> Value {
    Value::Array(values.iter().map(|&v| Value::Int(v)).collect())
}

fn int_arg(args: &[Value], i: usize) -> i32 {
    args[i].as_i64().unwrap() as i32
}

// ========================= Managed -> Native -> Managed ==========

#[test]
fn test_sort_with_managed_comparator() {
    let resolver = resolver();
    let sort = native(
        &resolver,
        SORT,
        vec![
            SignatureType::new(
                DeclaredType::array_of(DeclaredType::Boxed(Primitive::Int)),
                Modifiers::none().input().output(),
            ),
            int(),
            comparator(),
        ],
        void(),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cmp = managed(move |args| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(Value::Int(int_arg(args, 0).cmp(&int_arg(args, 1)) as i32))
    });

    let mut args = [ints(&[5, -3, 9, 0, 2]), Value::Int(5), cmp];
    assert_eq!(sort.call(&mut args).unwrap(), Value::Void);
    assert_eq!(args[0], ints(&[-3, 0, 2, 5, 9]));
    assert_eq!(calls.load(Ordering::Relaxed), 10);
}

#[test]
fn test_descending_comparator() {
    let resolver = resolver();
    let sort = native(
        &resolver,
        SORT,
        vec![
            SignatureType::new(
                DeclaredType::array_of(DeclaredType::Boxed(Primitive::Int)),
                Modifiers::none().input().output(),
            ),
            int(),
            comparator(),
        ],
        void(),
    );
    let cmp = managed(|args| Ok(Value::Int(int_arg(args, 1) - int_arg(args, 0))));

    let mut args = [ints(&[1, 4, 2, 3]), Value::Int(4), cmp];
    sort.call(&mut args).unwrap();
    assert_eq!(args[0], ints(&[4, 3, 2, 1]));
}

#[test]
fn test_apply_round_trip() {
    let resolver = resolver();
    let apply = native(&resolver, APPLY, vec![unary(), int()], int());
    let square = managed(|args| {
        let x = int_arg(args, 0);
        Ok(Value::Int(x * x))
    });
    let mut args = [square, Value::Int(-6)];
    assert_eq!(apply.call(&mut args).unwrap(), Value::Int(72));
}

#[test]
fn test_same_callable_binds_once() {
    let resolver = resolver();
    let apply = native(&resolver, APPLY, vec![unary(), int()], int());
    let f = managed(|args| Ok(Value::Int(int_arg(args, 0) + 1)));

    let mut first = [f.clone(), Value::Int(1)];
    let mut second = [f.clone(), Value::Int(2)];
    assert_eq!(apply.call(&mut first).unwrap(), Value::Int(4));
    assert_eq!(apply.call(&mut second).unwrap(), Value::Int(6));

    let DeclaredType::Callback(signature) = unary().declared().clone() else {
        unreachable!()
    };
    let bridge = resolver.closures().closure_bridge(&signature, &resolver).unwrap();
    let Value::Callback(callable) = f else { unreachable!() };
    let a = bridge.bind(Arc::clone(&callable));
    let b = bridge.bind(callable);
    assert_eq!(a.address(), b.address());
}

#[test]
fn test_failing_callback_returns_zero() {
    let resolver = resolver();
    let apply = native(&resolver, APPLY, vec![unary(), int()], int());

    let failing = managed(|_| Err(MarshalError::Callback("refused".into())));
    let mut args = [failing, Value::Int(3)];
    assert_eq!(apply.call(&mut args).unwrap(), Value::Int(0));

    let panicking = managed(|_| panic!("callback body panicked"));
    let mut args = [panicking, Value::Int(3)];
    assert_eq!(apply.call(&mut args).unwrap(), Value::Int(0));
}

#[test]
fn test_disposed_closure_returns_zero() {
    let resolver = resolver();
    let DeclaredType::Callback(signature) = unary().declared().clone() else {
        unreachable!()
    };
    let bridge = resolver.closures().closure_bridge(&signature, &resolver).unwrap();
    let Value::Callback(times_ten) = managed(|args| Ok(Value::Int(int_arg(args, 0) * 10))) else {
        unreachable!()
    };
    let closure = bridge.bind(times_ten);
    let address = closure.address();

    assert_eq!(unsafe { call_native_closure(address, &[4]) }, 40);
    closure.dispose();
    closure.dispose();
    assert!(closure.is_disposed());
    // the record itself stays alive while `closure` is held
    assert_eq!(unsafe { call_native_closure(address, &[4]) }, 0);
}

// ========================= Returned Function Pointers ============

#[test]
fn test_returned_closure_is_the_original_callable() {
    let resolver = resolver();
    let identity = native(&resolver, IDENTITY, vec![unary()], unary());

    let f = managed(|args| Ok(Value::Int(int_arg(args, 0))));
    let mut args = [f.clone()];
    let back = identity.call(&mut args).unwrap();
    assert_eq!(back, f);
}

#[test]
fn test_returned_native_pointer_is_callable() {
    let resolver = resolver();
    let adder = callback(vec![int(), int()], int());
    let get_adder = native(&resolver, GET_ADDER, vec![], adder);

    let Value::Callback(add) = get_adder.call(&mut []).unwrap() else {
        panic!("expected a callable");
    };
    assert_eq!(add.native_address(), Some(ADD));
    assert_eq!(add.invoke(&[Value::Int(40), Value::Int(2)]).unwrap(), Value::Int(42));
}

#[test]
fn test_native_function_passed_back_keeps_its_address() {
    let resolver = resolver();
    let apply = native(&resolver, IDENTITY, vec![unary()], SignatureType::plain(DeclaredType::Pointer));
    let add = Value::Callback(Arc::new(native(&resolver, ADD, vec![int()], int())));

    let mut args = [add];
    assert_eq!(apply.call(&mut args).unwrap(), Value::Address(ADD));
}

#[test]
fn test_null_function_pointer() {
    let resolver = resolver();
    let ty = unary();
    let conv = resolver.resolve_from_native(&ty).unwrap().unwrap();
    let ctx = MarshalContext::new(resolver.runtime());
    assert_eq!(conv.from_native(NativeValue::Address(0), &ctx).unwrap(), Value::Null);
}
