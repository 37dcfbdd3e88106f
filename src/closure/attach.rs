//! Attachment of threads entering callbacks from native code
//!
//! A thread is attached while at least one callback body runs on it.
//! Nested entries (a callback calling native code that calls back again)
//! only bump the depth; the outermost guard detaches.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

static ATTACHED: AtomicUsize = AtomicUsize::new(0);

/// RAII guard for the duration of one callback body
///
/// Usage:
/// ```ignore
/// let _attach = AttachGuard::attach();
/// // thread counted as attached
/// // detached when the outermost guard drops
/// ```
pub struct AttachGuard {
    // Must drop on the thread it was created on
    _thread_bound: PhantomData<*const ()>,
}

impl AttachGuard {
    pub fn attach() -> Self {
        DEPTH.with(|depth| {
            let n = depth.get();
            if n == 0 {
                ATTACHED.fetch_add(1, Ordering::AcqRel);
                crate::logging::log_thread_attached();
            }
            depth.set(n + 1);
        });
        Self {
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| {
            let n = depth.get().saturating_sub(1);
            depth.set(n);
            if n == 0 {
                ATTACHED.fetch_sub(1, Ordering::AcqRel);
                crate::logging::log_thread_detached();
            }
        });
    }
}

/// Whether the current thread is inside a callback body
pub fn is_attached() -> bool {
    DEPTH.with(|depth| depth.get() > 0)
}

/// Callback nesting depth of the current thread
pub fn depth() -> usize {
    DEPTH.with(Cell::get)
}

/// Number of threads currently inside a callback body
pub fn attached_threads() -> usize {
    ATTACHED.load(Ordering::Acquire)
}
