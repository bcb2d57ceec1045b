//! Drop-releasing ownership of backend tensors
//!
//! Every tensor an engine allocates for a call is wrapped in a [`ScopedTensor`]
//! obtained from the engine's [`TensorTracker`]. The buffer is released when the
//! wrapper drops, on success, on `?` and on unwind alike, and the tracker's live
//! count goes back down.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts tensors currently alive for one engine
#[derive(Debug, Clone, Default)]
pub struct TensorTracker {
    live: Arc<AtomicUsize>,
}

impl TensorTracker {
    #[must_use = "tracker is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `value` until the returned wrapper drops
    #[must_use = "dropping the scoped tensor immediately releases it"]
    pub fn scope<T>(&self, label: &'static str, value: T) -> ScopedTensor<T> {
        self.live.fetch_add(1, Ordering::Relaxed);
        ScopedTensor {
            value,
            label,
            live: Arc::clone(&self.live),
        }
    }

    /// Number of scoped tensors not yet released
    #[inline]
    #[must_use = "live count is returned but not used"]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

/// A tensor released on drop
#[derive(Debug)]
pub struct ScopedTensor<T> {
    value: T,
    label: &'static str,
    live: Arc<AtomicUsize>,
}

impl<T> ScopedTensor<T> {
    #[inline]
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }
}

impl<T> Deref for ScopedTensor<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for ScopedTensor<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for ScopedTensor<T> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        log::trace!("Released tensor '{}'", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_stage(tracker: &TensorTracker) -> Result<(), String> {
        let _input = tracker.scope("input", vec![0.0_f32; 16]);
        let _output = tracker.scope("output", vec![0.0_f32; 4]);
        Err("inference failed".to_string())
    }

    #[test]
    fn test_released_on_drop() {
        let tracker = TensorTracker::new();
        {
            let t = tracker.scope("det_input", vec![1.0_f32, 2.0]);
            assert_eq!(tracker.live(), 1);
            assert_eq!(t.len(), 2);
            assert_eq!(t.label(), "det_input");
        }
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn test_released_on_error_path() {
        let tracker = TensorTracker::new();
        assert!(failing_stage(&tracker).is_err());
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn test_released_on_panic() {
        let tracker = TensorTracker::new();
        let cloned = tracker.clone();
        let result = std::panic::catch_unwind(move || {
            let _t = cloned.scope("rec_input", [0_u8; 8]);
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(tracker.live(), 0);
    }
}
