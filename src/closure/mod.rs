//! Callbacks across the native boundary
//!
//! Architecture:
//! - `Callable` - managed callbacks, as an explicit capability
//! - `ClosureBridge` - native -> managed: binds callables to closure records
//! - `FunctionBridge` - managed -> native: wraps native function pointers
//! - `attach.rs` - thread attachment for callback bodies
//!
//! A bound callable is exposed to native code as the address of a
//! `#[repr(C)]` `ClosureRecord`. Native code (or the call transport) enters
//! the callback through the record's `entry` function, passing the record
//! itself as context and arguments as raw 64-bit slots.
//!
//! Records live in a process-wide table until disposed.

mod attach;

pub use attach::{attached_threads, depth, is_attached, AttachGuard};

use crate::error::{MappingError, MarshalError};
use crate::marshal::{
    DirectConverter, FromNativeContext, FromNativeConverter, MarshalContext, NativeArg, ToNativeContext,
    ToNativeConverter,
};
use crate::resolver::ConverterResolver;
use crate::runtime::{NativeSignature, Platform, Runtime};
use crate::types::{CallbackSignature, NativeType, NativeValue, SignatureType, Value};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A managed function that native code may call
pub trait Callable: Send + Sync {
    fn invoke(&self, args: &[Value]) -> Result<Value, MarshalError>;

    /// Native entry address, if this callable wraps a native function
    fn native_address(&self) -> Option<usize> {
        None
    }
}

impl<F> Callable for F
where
    F: Fn(&[Value]) -> Result<Value, MarshalError> + Send + Sync,
{
    fn invoke(&self, args: &[Value]) -> Result<Value, MarshalError> {
        self(args)
    }
}

/// Trampoline entry: `(record, args, nargs, ret)`
pub type ClosureEntry = unsafe extern "C" fn(*const ClosureRecord, *const u64, usize, *mut u64);

/// Native view of a bound closure
#[repr(C)]
#[derive(Debug)]
pub struct ClosureRecord {
    pub entry: ClosureEntry,
    /// Closure id
    pub context: usize,
}

/// Live closures by record address
static CLOSURES: Lazy<DashMap<usize, Arc<NativeClosure>>> = Lazy::new(DashMap::new);

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    // Last converted result (returned strings etc.) per closure id, valid
    // until the same closure is entered again on this thread
    static RESULTS: RefCell<HashMap<usize, NativeArg>> = RefCell::new(HashMap::new());
}

/// Number of closures currently registered
pub fn live_closures() -> usize {
    CLOSURES.len()
}

/// Callable bound to a closure record
pub struct NativeClosure {
    id: usize,
    record: Box<ClosureRecord>,
    key: usize,
    callable: Arc<dyn Callable>,
    bridge: Arc<ClosureBridge>,
    disposed: AtomicBool,
}

impl NativeClosure {
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Native function pointer value
    #[inline]
    pub fn address(&self) -> usize {
        &*self.record as *const ClosureRecord as usize
    }

    #[inline]
    pub fn entry(&self) -> ClosureEntry {
        self.record.entry
    }

    #[inline]
    pub fn callable(&self) -> &Arc<dyn Callable> {
        &self.callable
    }

    #[inline]
    pub fn signature(&self) -> &CallbackSignature {
        self.bridge.signature()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Unregister the record. Native code must not call the address
    /// afterwards; calls that still arrive return zero.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.unregister();
        crate::logging::log_closure_disposed(self.id, self.address());
    }

    /// Drop this closure from the tables; a newer binding of the same
    /// callable stays in place
    fn unregister(&self) {
        self.bridge.bound.remove_if(&self.key, |_, bound| bound.id == self.id);
        CLOSURES.remove(&self.address());
        let _ = RESULTS.try_with(|results| results.borrow_mut().remove(&self.id));
    }

    /// Run the callable on raw argument slots, returning the raw result slot
    fn dispatch(&self, slots: &[u64]) -> Result<u64, MarshalError> {
        let bridge = &self.bridge;
        if slots.len() != bridge.params.len() {
            return Err(MarshalError::ArgCount {
                expected: bridge.params.len(),
                got: slots.len(),
            });
        }

        let ctx = MarshalContext::new(&bridge.runtime);
        let platform = ctx.platform();
        let args = bridge
            .params
            .iter()
            .zip(slots)
            .map(|(conv, &bits)| conv.from_native(NativeValue::from_bits(conv.native_type(), bits, platform), &ctx))
            .collect::<Result<Vec<_>, _>>()?;

        let result = self.callable.invoke(&args)?;
        let arg = bridge.result.to_native(&result, &ctx)?;
        let bits = arg.value().to_bits();
        RESULTS.with(|results| results.borrow_mut().insert(self.id, arg));
        Ok(bits)
    }
}

impl fmt::Debug for NativeClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClosure")
            .field("id", &self.id)
            .field("address", &format_args!("{:#x}", self.address()))
            .field("signature", self.bridge.signature())
            .finish()
    }
}

unsafe extern "C" fn closure_entry(record: *const ClosureRecord, args: *const u64, nargs: usize, ret: *mut u64) {
    let _attach = AttachGuard::attach();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let closure = CLOSURES
            .get(&(record as usize))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MarshalError::Callback(format!("no closure at {:#x}", record as usize)))?;
        let slots: &[u64] = if nargs == 0 || args.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(args, nargs) }
        };
        closure.dispatch(slots)
    }));

    let bits = match outcome {
        Ok(Ok(bits)) => bits,
        Ok(Err(e)) => {
            crate::logging::log_callback_failed(record as usize, &e);
            0
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            crate::logging::log_callback_panicked(record as usize, &message);
            0
        }
    };

    if !ret.is_null() {
        unsafe { *ret = bits };
    }
}

/// Enter the closure record at `address` the way native code does.
///
/// # Safety
/// `address` must point to a live `ClosureRecord`.
pub unsafe fn call_native_closure(address: usize, args: &[u64]) -> u64 {
    let record = address as *const ClosureRecord;
    let mut ret = 0u64;
    unsafe { ((*record).entry)(record, args.as_ptr(), args.len(), &mut ret) };
    ret
}

/// Native -> managed half of a callback signature.
///
/// Holds the from-native converter of every parameter and the to-native
/// converter of the result, resolved once.
pub struct ClosureBridge {
    runtime: Arc<Runtime>,
    signature: Arc<CallbackSignature>,
    params: Vec<Arc<dyn FromNativeConverter>>,
    result: Arc<dyn ToNativeConverter>,
    /// Closures by callable identity
    bound: DashMap<usize, Arc<NativeClosure>>,
}

impl ClosureBridge {
    fn new(signature: Arc<CallbackSignature>, resolver: &ConverterResolver) -> Result<Self, MappingError> {
        let platform = resolver.runtime().platform();
        let params = signature
            .params()
            .iter()
            .map(|param| {
                Ok(match resolver.resolve_from_native(param)? {
                    Some(conv) => conv,
                    None => direct(param, platform) as Arc<dyn FromNativeConverter>,
                })
            })
            .collect::<Result<Vec<_>, MappingError>>()?;
        let result = match resolver.resolve_to_native(signature.result())? {
            Some(conv) => conv,
            None => direct(signature.result(), platform) as Arc<dyn ToNativeConverter>,
        };

        Ok(Self {
            runtime: Arc::clone(resolver.runtime()),
            signature,
            params,
            result,
            bound: DashMap::new(),
        })
    }

    #[inline]
    pub fn signature(&self) -> &CallbackSignature {
        &self.signature
    }

    /// Closure record for `callable`, created on first use.
    ///
    /// The same callable (by `Arc` identity) always yields the same closure
    /// until it is disposed.
    pub fn bind(self: &Arc<Self>, callable: Arc<dyn Callable>) -> Arc<NativeClosure> {
        let key = Arc::as_ptr(&callable) as *const () as usize;
        let mut slot = self.bound.entry(key).or_insert_with(|| self.register(key, Arc::clone(&callable)));
        // a dispose racing with this bind may leave its closure behind
        if slot.is_disposed() {
            *slot = self.register(key, callable);
        }
        Arc::clone(slot.value())
    }

    fn register(self: &Arc<Self>, key: usize, callable: Arc<dyn Callable>) -> Arc<NativeClosure> {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let closure = Arc::new(NativeClosure {
            id,
            record: Box::new(ClosureRecord {
                entry: closure_entry,
                context: id,
            }),
            key,
            callable,
            bridge: Arc::clone(self),
            disposed: AtomicBool::new(false),
        });
        CLOSURES.insert(closure.address(), Arc::clone(&closure));
        crate::logging::log_closure_bound(id, closure.address(), &self.signature);
        closure
    }
}

impl fmt::Debug for ClosureBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureBridge")
            .field("signature", &self.signature)
            .field("bound", &self.bound.len())
            .finish()
    }
}

/// Managed -> native half of a callback signature
pub struct FunctionBridge {
    runtime: Arc<Runtime>,
    signature: Arc<CallbackSignature>,
    params: Vec<Arc<dyn ToNativeConverter>>,
    result: Arc<dyn FromNativeConverter>,
}

impl FunctionBridge {
    fn new(signature: Arc<CallbackSignature>, resolver: &ConverterResolver) -> Result<Self, MappingError> {
        let platform = resolver.runtime().platform();
        let params = signature
            .params()
            .iter()
            .map(|param| {
                Ok(match resolver.resolve_to_native(param)? {
                    Some(conv) => conv,
                    None => direct(param, platform) as Arc<dyn ToNativeConverter>,
                })
            })
            .collect::<Result<Vec<_>, MappingError>>()?;
        let result = match resolver.resolve_from_native(signature.result())? {
            Some(conv) => conv,
            None => direct(signature.result(), platform) as Arc<dyn FromNativeConverter>,
        };

        Ok(Self {
            runtime: Arc::clone(resolver.runtime()),
            signature,
            params,
            result,
        })
    }

    #[inline]
    pub fn signature(&self) -> &CallbackSignature {
        &self.signature
    }

    /// Native shape handed to the transport
    pub fn native_signature(&self) -> NativeSignature {
        NativeSignature {
            params: self.params.iter().map(|p| p.native_type()).collect(),
            result: self.result.native_type(),
            convention: self.signature.convention(),
        }
    }
}

impl fmt::Debug for FunctionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBridge")
            .field("signature", &self.signature)
            .finish()
    }
}

fn direct(ty: &SignatureType, platform: &Platform) -> Arc<DirectConverter> {
    let declared = ty.declared();
    Arc::new(DirectConverter::for_declared(
        declared,
        ty.effective_native(declared.default_native(), platform),
    ))
}

/// A native function pointer as a managed callable
pub struct NativeFunction {
    address: usize,
    bridge: Arc<FunctionBridge>,
}

impl NativeFunction {
    pub fn new(address: usize, bridge: Arc<FunctionBridge>) -> Self {
        Self { address, bridge }
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Call through the runtime's transport. Out and in-out parameters are
    /// copied back into `args` after the call.
    pub fn call(&self, args: &mut [Value]) -> Result<Value, MarshalError> {
        let bridge = &self.bridge;
        if args.len() != bridge.params.len() {
            return Err(MarshalError::ArgCount {
                expected: bridge.params.len(),
                got: args.len(),
            });
        }

        let ctx = MarshalContext::new(&bridge.runtime);
        let converted = bridge
            .params
            .iter()
            .zip(args.iter())
            .map(|(conv, arg)| conv.to_native(arg, &ctx))
            .collect::<Result<Vec<NativeArg>, _>>()?;
        let values: Vec<NativeValue> = converted.iter().map(NativeArg::value).collect();

        let invoker = bridge
            .runtime
            .invoker()
            .ok_or(MarshalError::NoInvoker { address: self.address })?;
        let raw = invoker.invoke(self.address, &bridge.native_signature(), &values)?;

        for ((conv, arg), native) in bridge.params.iter().zip(args.iter_mut()).zip(&converted) {
            if conv.needs_post_invoke() {
                conv.post_invoke(arg, native, &ctx)?;
            }
        }

        bridge.result.from_native(raw, &ctx)
    }
}

impl Callable for NativeFunction {
    fn invoke(&self, args: &[Value]) -> Result<Value, MarshalError> {
        let mut owned = args.to_vec();
        self.call(&mut owned)
    }

    fn native_address(&self) -> Option<usize> {
        Some(self.address)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("address", &format_args!("{:#x}", self.address))
            .field("signature", self.bridge.signature())
            .finish()
    }
}

/// Per-signature bridge cache
#[derive(Default)]
pub struct ClosureManager {
    closures: DashMap<Arc<CallbackSignature>, Arc<ClosureBridge>>,
    functions: DashMap<Arc<CallbackSignature>, Arc<FunctionBridge>>,
}

impl ClosureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bridge for exposing callables of `signature` to native code
    pub fn closure_bridge(
        &self,
        signature: &Arc<CallbackSignature>,
        resolver: &ConverterResolver,
    ) -> Result<Arc<ClosureBridge>, MappingError> {
        if let Some(bridge) = self.closures.get(signature) {
            return Ok(Arc::clone(bridge.value()));
        }
        let bridge = Arc::new(ClosureBridge::new(Arc::clone(signature), resolver)?);
        Ok(Arc::clone(
            self.closures.entry(Arc::clone(signature)).or_insert(bridge).value(),
        ))
    }

    /// Bridge for calling native function pointers of `signature`
    pub fn function_bridge(
        &self,
        signature: &Arc<CallbackSignature>,
        resolver: &ConverterResolver,
    ) -> Result<Arc<FunctionBridge>, MappingError> {
        if let Some(bridge) = self.functions.get(signature) {
            return Ok(Arc::clone(bridge.value()));
        }
        let bridge = Arc::new(FunctionBridge::new(Arc::clone(signature), resolver)?);
        Ok(Arc::clone(
            self.functions.entry(Arc::clone(signature)).or_insert(bridge).value(),
        ))
    }

    pub fn bridge_count(&self) -> usize {
        self.closures.len() + self.functions.len()
    }
}

impl fmt::Debug for ClosureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureManager")
            .field("closure_bridges", &self.closures.len())
            .field("function_bridges", &self.functions.len())
            .finish()
    }
}

/// Callback argument: a managed callable becomes a closure record address
#[derive(Debug)]
pub struct ClosureToNative {
    bridge: Arc<ClosureBridge>,
}

impl ClosureToNative {
    pub fn new(bridge: Arc<ClosureBridge>) -> Self {
        Self { bridge }
    }
}

impl ToNativeConverter for ClosureToNative {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn to_native(&self, value: &Value, _ctx: &ToNativeContext<'_>) -> Result<NativeArg, MarshalError> {
        match value {
            Value::Null => Ok(NativeArg::null()),
            Value::Address(address) => Ok(NativeArg::new(NativeValue::Address(*address))),
            Value::Callback(callable) => {
                let address = match callable.native_address() {
                    Some(address) => address,
                    None => self.bridge.bind(Arc::clone(callable)).address(),
                };
                Ok(NativeArg::new(NativeValue::Address(address)))
            }
            other => Err(other.mismatch(format!("callback {}", self.bridge.signature()))),
        }
    }
}

/// Returned function pointer as a managed callable.
///
/// Addresses of closures created here resolve back to the original callable.
#[derive(Debug)]
pub struct ClosureFromNative {
    bridge: Arc<FunctionBridge>,
}

impl ClosureFromNative {
    pub fn new(bridge: Arc<FunctionBridge>) -> Self {
        Self { bridge }
    }
}

impl FromNativeConverter for ClosureFromNative {
    fn native_type(&self) -> NativeType {
        NativeType::Address
    }

    fn from_native(&self, value: NativeValue, _ctx: &FromNativeContext<'_>) -> Result<Value, MarshalError> {
        let address = value.as_address();
        if address == 0 {
            return Ok(Value::Null);
        }
        if let Some(closure) = CLOSURES.get(&address) {
            return Ok(Value::Callback(Arc::clone(closure.callable())));
        }
        Ok(Value::Callback(Arc::new(NativeFunction::new(
            address,
            Arc::clone(&self.bridge),
        ))))
    }
}
