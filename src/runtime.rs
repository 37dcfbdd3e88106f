//! Runtime description: target platform widths, calling conventions, the
//! aggregate layout engine and the native call transport.

use crate::config::{ConfigError, MarshalConfig};
use crate::error::{LayoutError, MarshalError};
use crate::layout::{AggregateDecl, StructLayout, StructLayoutEngine};
use crate::types::{NativeType, NativeValue};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Calling convention of a callback or native function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CallingConvention {
    /// C calling convention (platform default)
    C,
    /// Callee-cleanup convention (32-bit Windows APIs)
    StdCall,
}

impl CallingConvention {
    /// Get platform default
    #[inline]
    pub const fn default() -> Self {
        Self::C
    }
}

impl Default for CallingConvention {
    #[inline]
    fn default() -> Self {
        Self::default()
    }
}

/// Widths and alignment rules of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    /// Pointer width in bytes (4 or 8)
    pub address_size: usize,
    /// Width of C `long` in bytes
    pub long_size: usize,
    /// Largest alignment any scalar gets
    pub max_align: usize,
}

impl Platform {
    /// 64-bit Unix data model
    pub const fn lp64() -> Self {
        Self {
            address_size: 8,
            long_size: 8,
            max_align: 8,
        }
    }

    /// 64-bit Windows data model
    pub const fn llp64() -> Self {
        Self {
            address_size: 8,
            long_size: 4,
            max_align: 8,
        }
    }

    /// 32-bit data model (i386 System V aligns 8-byte scalars to 4)
    pub const fn ilp32() -> Self {
        Self {
            address_size: 4,
            long_size: 4,
            max_align: 4,
        }
    }

    /// Platform of the running process
    pub const fn host() -> Self {
        #[cfg(all(target_pointer_width = "64", windows))]
        return Self::llp64();

        #[cfg(all(target_pointer_width = "64", not(windows)))]
        return Self::lp64();

        #[cfg(all(target_pointer_width = "32", target_arch = "x86"))]
        return Self::ilp32();

        #[cfg(all(target_pointer_width = "32", not(target_arch = "x86")))]
        return Self {
            address_size: 4,
            long_size: 4,
            max_align: 8,
        };
    }

    /// Check the widths describe a target this crate can lay out:
    /// pointer and `long` of 4 or 8 bytes, `max_align` a power of two.
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.address_size, 4 | 8) {
            return Err(format!("address_size must be 4 or 8, got {}", self.address_size));
        }
        if !matches!(self.long_size, 4 | 8) {
            return Err(format!("long_size must be 4 or 8, got {}", self.long_size));
        }
        if !self.max_align.is_power_of_two() {
            return Err(format!("max_align must be a power of two, got {}", self.max_align));
        }
        Ok(())
    }

    /// Truncate an address to the platform's pointer width
    #[inline]
    pub const fn mask_address(&self, address: usize) -> usize {
        if self.address_size >= std::mem::size_of::<usize>() {
            address
        } else {
            address & ((1usize << (self.address_size * 8)) - 1)
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::host()
    }
}

/// Native-side shape of a call, handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSignature {
    pub params: Vec<NativeType>,
    pub result: NativeType,
    pub convention: CallingConvention,
}

/// The physical call transport (external collaborator).
///
/// Implementations issue the call to `function` with arguments already in
/// native representation.
pub trait NativeInvoker: Send + Sync {
    fn invoke(
        &self,
        function: usize,
        signature: &NativeSignature,
        args: &[NativeValue],
    ) -> Result<NativeValue, MarshalError>;
}

static SYSTEM: Lazy<Arc<Runtime>> = Lazy::new(|| {
    let runtime = Runtime::from_config(MarshalConfig::from_env()).unwrap_or_else(|e| {
        tracing::warn!(event = "config_fallback", error = %e, "using host platform");
        Runtime::with_platform(Platform::host())
    });
    Arc::new(runtime)
});

/// Platform + configuration + aggregate declarations.
///
/// Layouts are memoized per runtime because they depend on its widths.
pub struct Runtime {
    platform: Platform,
    config: MarshalConfig,
    layouts: StructLayoutEngine,
    invoker: RwLock<Option<Arc<dyn NativeInvoker>>>,
}

impl Runtime {
    pub fn new(platform: Platform, config: MarshalConfig) -> Self {
        Self {
            platform,
            config,
            layouts: StructLayoutEngine::new(platform),
            invoker: RwLock::new(None),
        }
    }

    /// Host platform unless the configuration overrides it
    pub fn from_config(config: MarshalConfig) -> Result<Self, ConfigError> {
        let platform = match config.platform {
            Some(p) => p.to_platform()?,
            None => Platform::host(),
        };
        Ok(Self::new(platform, config))
    }

    pub fn with_platform(platform: Platform) -> Self {
        Self::new(platform, MarshalConfig::default())
    }

    /// Process-wide runtime for the host platform
    pub fn system() -> Arc<Runtime> {
        Arc::clone(&SYSTEM)
    }

    #[inline]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    #[inline]
    pub fn address_size(&self) -> usize {
        self.platform.address_size
    }

    #[inline]
    pub fn long_size(&self) -> usize {
        self.platform.long_size
    }

    #[inline]
    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    /// Register an aggregate declaration
    pub fn declare(&self, decl: AggregateDecl) -> Result<(), LayoutError> {
        self.layouts.declare(decl)
    }

    /// Computed (memoized) layout of a declared aggregate
    pub fn layout(&self, name: &str) -> Result<Arc<StructLayout>, LayoutError> {
        self.layouts.layout(name)
    }

    /// Size in bytes of a declared aggregate
    pub fn size(&self, name: &str) -> Result<usize, LayoutError> {
        self.layouts.layout(name).map(|layout| layout.size())
    }

    /// Install the call transport used for native function pointers
    pub fn set_invoker(&self, invoker: Arc<dyn NativeInvoker>) {
        *self.invoker.write() = Some(invoker);
    }

    pub fn invoker(&self) -> Option<Arc<dyn NativeInvoker>> {
        self.invoker.read().clone()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("platform", &self.platform)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
