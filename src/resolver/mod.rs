//! Converter resolution
//!
//! Entry point of the engine: for a (declared type, modifiers) pair decide
//! which converter, if any, a call site needs. The stub builder asks once per
//! distinct signature position and reuses the answer for every call.
//!
//! Resolution is pure: it depends on the signature type and the runtime the
//! resolver is bound to, never on call arguments. Results (including "no
//! conversion needed") are memoized for the resolver's lifetime; errors are
//! not, so resolving a bad signature again reproduces the same error.

mod rules;

use crate::closure::ClosureManager;
use crate::error::MappingError;
use crate::marshal::{FromNativeConverter, ToNativeConverter};
use crate::runtime::Runtime;
use crate::types::{NativeType, SignatureType};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use rules::{is_scalar_compatible, Rule, FROM_NATIVE_RULES, TO_NATIVE_RULES};
use std::fmt;
use std::sync::Arc;

static SYSTEM: Lazy<Arc<ConverterResolver>> = Lazy::new(|| Arc::new(ConverterResolver::new(Runtime::system())));

type ToNativeSlot = Option<Arc<dyn ToNativeConverter>>;
type FromNativeSlot = Option<Arc<dyn FromNativeConverter>>;

/// Signature-to-converter resolver bound to one runtime
pub struct ConverterResolver {
    runtime: Arc<Runtime>,
    to_native: DashMap<SignatureType, ToNativeSlot>,
    from_native: DashMap<SignatureType, FromNativeSlot>,
    closures: ClosureManager,
}

impl ConverterResolver {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            to_native: DashMap::new(),
            from_native: DashMap::new(),
            closures: ClosureManager::new(),
        }
    }

    /// Process-wide resolver for the system runtime
    pub fn system() -> Arc<ConverterResolver> {
        Arc::clone(&SYSTEM)
    }

    #[inline]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    #[inline]
    pub fn closures(&self) -> &ClosureManager {
        &self.closures
    }

    /// Converter for a value coming back from native code (return values,
    /// callback parameters). `None` means the raw value is used as is.
    pub fn resolve_from_native(&self, ty: &SignatureType) -> Result<FromNativeSlot, MappingError> {
        if let Some(cached) = self.from_native.get(ty) {
            return Ok(cached.value().clone());
        }
        let _guard = crate::logging::perf::track("resolve_from_native");
        let resolved = self.dispatch(ty, FROM_NATIVE_RULES, "from_native")?;
        Ok(self
            .from_native
            .entry(ty.clone())
            .or_insert(resolved)
            .value()
            .clone())
    }

    /// Converter for a value passed to native code (parameters, callback
    /// results). `None` means the raw value is passed as is.
    pub fn resolve_to_native(&self, ty: &SignatureType) -> Result<ToNativeSlot, MappingError> {
        if let Some(cached) = self.to_native.get(ty) {
            return Ok(cached.value().clone());
        }
        let _guard = crate::logging::perf::track("resolve_to_native");
        let resolved = self.dispatch(ty, TO_NATIVE_RULES, "to_native")?;
        Ok(self
            .to_native
            .entry(ty.clone())
            .or_insert(resolved)
            .value()
            .clone())
    }

    /// Native type the transport passes for a parameter of type `ty`
    pub fn resolve_native_type(&self, ty: &SignatureType) -> Result<NativeType, MappingError> {
        match self.resolve_to_native(ty)? {
            Some(converter) => Ok(converter.native_type()),
            None => Ok(ty.effective_native(ty.declared().default_native(), self.runtime.platform())),
        }
    }

    /// Number of memoized resolutions, both directions
    pub fn cached(&self) -> usize {
        self.to_native.len() + self.from_native.len()
    }

    fn dispatch<C: ?Sized>(
        &self,
        ty: &SignatureType,
        rules: &[Rule<C>],
        direction: &'static str,
    ) -> Result<Option<Arc<C>>, MappingError> {
        validate(ty)?;

        let platform = self.runtime.platform();
        for rule in rules {
            if (rule.matches)(ty, platform) {
                let converter = (rule.build)(self, ty)?;
                crate::logging::log_resolution(direction, ty, Some(rule.name));
                return Ok(Some(converter));
            }
        }

        if is_scalar_compatible(ty.declared()) {
            crate::logging::log_resolution(direction, ty, None);
            Ok(None)
        } else {
            Err(MappingError::Unsupported { ty: ty.to_string() })
        }
    }
}

impl fmt::Debug for ConverterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterResolver")
            .field("runtime", &self.runtime)
            .field("to_native", &self.to_native.len())
            .field("from_native", &self.from_native.len())
            .field("closures", &self.closures)
            .finish()
    }
}

/// Modifier checks shared by both directions
fn validate(ty: &SignatureType) -> Result<(), MappingError> {
    let aliases = ty.modifiers().aliases();
    if aliases.len() > 1 {
        let names: Vec<&str> = aliases.iter().map(|a| a.c_name()).collect();
        return Err(MappingError::ConflictingModifiers {
            ty: ty.declared().to_string(),
            reason: format!("multiple width aliases ({})", names.join(", ")),
        });
    }
    if let Some(alias) = ty.alias() {
        if !ty.declared().accepts_width_alias() {
            return Err(MappingError::ConflictingModifiers {
                ty: ty.declared().to_string(),
                reason: format!("width alias {} on a non-integer type", alias),
            });
        }
    }
    Ok(())
}
