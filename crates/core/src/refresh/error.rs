use thiserror::Error;

/// Why a refresh cycle did not commit a generation.
///
/// None of these change what readers see: the previous generation stays
/// authoritative.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("refresh already in progress")]
    Busy,

    #[error("market data acquisition failed: {0:#}")]
    Acquisition(anyhow::Error),

    #[error("persisting generation failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl RefreshError {
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshError::Busy => "busy",
            RefreshError::Acquisition(_) => "acquisition",
            RefreshError::Persistence(_) => "persistence",
        }
    }
}
