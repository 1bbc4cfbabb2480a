//! Maps `Box<dyn Error>` from trait boundaries to typed `FeedbackError`.
//!
//! The traits in `hapbridge_traits` use `Box<dyn Error + Send + Sync>` so any
//! tracking backend can plug in; this module converts those to our typed
//! error enum, with an optional feature-gated path for
//! `hapbridge_hardware::HwError` downcasting.

use crate::error::FeedbackError;

/// Map a trait-boundary error to a typed `FeedbackError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FeedbackError {
    #[cfg(feature = "hardware-errors")]
    {
        use hapbridge_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => FeedbackError::Timeout,
                HwError::Io(io) => FeedbackError::Io(io.to_string()),
                other => FeedbackError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        FeedbackError::Timeout
    } else {
        FeedbackError::Hardware(s)
    }
}
