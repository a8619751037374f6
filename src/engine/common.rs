// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the panic policy used around third-party codec calls.

use crate::error::{PlumError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run codec work, turning a panic inside it into `PlumError::InternalPanic`.
///
/// The closure only touches buffers it owns or borrows immutably, so nothing
/// observable is left half-updated when it unwinds.
pub fn run_with_panic_policy<T>(stage: &'static str, work: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::debug!(target: "plum_raster::panic", stage, %detail, "codec panicked");
            Err(PlumError::internal_panic(format!("{stage}: {detail}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_results_through() {
        assert_eq!(run_with_panic_policy("test", || Ok(3)).unwrap(), 3);
        let err = run_with_panic_policy::<()>("test", || Err(PlumError::no_data())).unwrap_err();
        assert!(matches!(err, PlumError::NoData));
    }

    #[test]
    fn panics_become_internal_errors() {
        let err = run_with_panic_policy::<()>("decode:test", || panic!("boom")).unwrap_err();
        match err {
            PlumError::InternalPanic { message } => {
                assert!(message.contains("decode:test"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
