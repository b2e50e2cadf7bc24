// Error taxonomy for the analysis core.
//
// Validation and infrastructure failures short-circuit with a typed error.
// Analytical shortcomings (thin samples, default baselines, confounders) are
// never errors — they surface as structured fields on the result objects so
// callers can degrade gracefully.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested analysis window is malformed (end before start, or
    /// ending in the future).
    #[error("invalid analysis window: {0}")]
    WindowInvalid(String),

    /// The analysis exceeded the soft deadline. Narrow the window and retry.
    #[error("analysis exceeded the {}s soft deadline; narrow the window", .0.as_secs())]
    WindowTooWide(Duration),

    /// A snapshot write would introduce a negative counter, or conflicts
    /// with an existing observation at the same instant.
    #[error("invalid metrics: {0}")]
    InvalidMetrics(String),

    /// The underlying store failed. Propagated as-is to the caller.
    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}
