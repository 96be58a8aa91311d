use thiserror::Error;

/// Errors raised while querying reachability.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe target could not be resolved or reached.
    #[error("probe failed: {0}")]
    Failed(String),

    /// The probe did not complete within its time budget.
    #[error("probe timed out after {ms}ms")]
    Timeout { ms: u64 },
}
