//! Per-unit fault isolation.
//!
//! Every analysis unit (trend algorithm, statistical processor, insight rule,
//! event detector) runs through [`isolate`]. Errors and panics are logged and
//! turned into `None` so the rest of the tick keeps going.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::AnalysisError;

/// Run one analysis unit, logging and swallowing any fault.
///
/// Returns `Some(value)` on success and `None` when the unit returned an
/// error or panicked.
pub fn isolate<T, F>(unit: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T, AnalysisError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(AnalysisError::InsufficientSamples {
            required, available, ..
        })) => {
            tracing::debug!(unit, required, available, "Skipping unit: insufficient samples");
            None
        }
        Ok(Err(error)) => {
            tracing::warn!(unit, error = %error, "Analysis unit failed");
            None
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(unit, panic = %message, "Analysis unit panicked");
            None
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_success() {
        assert_eq!(isolate("ok", || Ok(42)), Some(42));
    }

    #[test]
    fn test_isolate_error() {
        let result: Option<u8> = isolate("err", || Err(AnalysisError::EmptySnapshot));
        assert!(result.is_none());
    }

    #[test]
    fn test_isolate_insufficient_samples() {
        let result: Option<u8> = isolate("starved", || {
            Err(AnalysisError::InsufficientSamples {
                unit: "starved".into(),
                required: 3,
                available: 1,
            })
        });
        assert!(result.is_none());
    }

    #[test]
    fn test_isolate_panic_is_contained() {
        let result: Option<u8> = isolate("panics", || panic!("generator exploded"));
        assert!(result.is_none());
    }

    #[test]
    fn test_isolate_panic_with_owned_message() {
        let result: Option<u8> = isolate("panics", || panic!("{}", String::from("owned")));
        assert!(result.is_none());
    }
}
