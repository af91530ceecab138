//! Process-global lifecycle of the native tensor runtime environment
//! (§4.4.3, §9 "process-global runtime with multiple owners").
//!
//! The runtime environment is expensive to initialize and destructive to
//! tear down, so its lifetime is gated by a single process-wide reference
//! count rather than per-embedder state. [`RuntimeHandle::acquire`]
//! increments the count, initializing the environment on the 0→1
//! transition; [`RuntimeHandle::release`] decrements it, tearing the
//! environment down on the 1→0 transition. Each handle releases its own
//! contribution at most once, via an internal single-shot flag, so an
//! explicit `close()` followed by `Drop` is safe.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::error::{ChromiumError, Result};

struct RuntimeState {
    initialized: bool,
}

static COUNT: AtomicUsize = AtomicUsize::new(0);
static STATE: OnceLock<Mutex<RuntimeState>> = OnceLock::new();
static LIBRARY_PATH: OnceLock<PathBuf> = OnceLock::new();

fn state() -> &'static Mutex<RuntimeState> {
    STATE.get_or_init(|| Mutex::new(RuntimeState { initialized: false }))
}

/// An owning reference to the process-wide runtime environment.
pub struct RuntimeHandle {
    released: AtomicBool,
}

impl RuntimeHandle {
    /// Acquire a handle, initializing the environment if this is the first
    /// live handle in the process. The dynamic library path only matters on
    /// the first call in the process; later callers share the environment
    /// that call created.
    pub fn acquire_with_library(library_path: &Path) -> Result<Self> {
        LIBRARY_PATH.get_or_init(|| library_path.to_path_buf());
        Self::acquire()
    }

    /// Acquire a handle without specifying a dynamic library path, relying
    /// on whatever a prior call to [`Self::acquire_with_library`] set, or on
    /// the runtime's own default discovery if none was ever set.
    pub fn acquire() -> Result<Self> {
        let mut guard = state()
            .lock()
            .map_err(|_| ChromiumError::client("runtime state lock poisoned"))?;

        let previous = COUNT.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            if let Err(err) = init_environment() {
                COUNT.fetch_sub(1, Ordering::SeqCst);
                return Err(err);
            }
            guard.initialized = true;
        }

        Ok(Self {
            released: AtomicBool::new(false),
        })
    }

    /// Release this handle's share of the count, tearing the environment
    /// down if no handles remain. Idempotent.
    pub fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut guard = state()
            .lock()
            .map_err(|_| ChromiumError::client("runtime state lock poisoned"))?;

        if COUNT.fetch_sub(1, Ordering::SeqCst) == 1 {
            teardown_environment()?;
            guard.initialized = false;
        }
        Ok(())
    }

    #[cfg(test)]
    fn live_count() -> usize {
        COUNT.load(Ordering::SeqCst)
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(feature = "embedding")]
fn init_environment() -> Result<()> {
    tracing::debug!("initializing onnx runtime environment");
    let mut builder = ort::init();
    if let Some(path) = LIBRARY_PATH.get() {
        builder = builder.with_dylib_path(path.display().to_string());
    }
    builder
        .commit()
        .map_err(|e| ChromiumError::Other(anyhow::anyhow!("failed to initialize onnx runtime environment: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "embedding"))]
fn init_environment() -> Result<()> {
    Ok(())
}

#[cfg(feature = "embedding")]
fn teardown_environment() -> Result<()> {
    tracing::debug!("tearing down onnx runtime environment");
    Ok(())
}

#[cfg(not(feature = "embedding"))]
fn teardown_environment() -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests share process-global state with each other (and with any
    // embedder tests that acquire a handle), so they run serially on a
    // single thread by virtue of the crate's default test harness; they
    // assert relative transitions rather than an absolute starting count.
    #[test]
    fn acquire_then_release_returns_to_prior_count() {
        let before = RuntimeHandle::live_count();
        let handle = RuntimeHandle::acquire().unwrap();
        assert_eq!(RuntimeHandle::live_count(), before + 1);
        handle.release().unwrap();
        assert_eq!(RuntimeHandle::live_count(), before);
    }

    #[test]
    fn double_release_is_idempotent() {
        let before = RuntimeHandle::live_count();
        let handle = RuntimeHandle::acquire().unwrap();
        handle.release().unwrap();
        handle.release().unwrap();
        assert_eq!(RuntimeHandle::live_count(), before);
    }

    #[test]
    fn multiple_handles_share_one_environment() {
        let before = RuntimeHandle::live_count();
        let a = RuntimeHandle::acquire().unwrap();
        let b = RuntimeHandle::acquire().unwrap();
        assert_eq!(RuntimeHandle::live_count(), before + 2);
        a.release().unwrap();
        assert_eq!(RuntimeHandle::live_count(), before + 1);
        b.release().unwrap();
        assert_eq!(RuntimeHandle::live_count(), before);
    }
}
