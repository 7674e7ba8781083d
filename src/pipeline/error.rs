//! Run-level error taxonomy
//!
//! Every variant aborts the run before the report is emitted. Per-token
//! failures never get here; they are recorded on the token's report entry.

use super::config::ConfigError;
use super::tokens::TokenListError;
use crate::aggregator_core::SnapshotError;
use crate::chain::ChainError;

#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    InputFormat(TokenListError),
    RemoteUnavailable(ChainError),
    Persistence(SnapshotError),
}

impl RunError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Config(_) => 2,
            RunError::InputFormat(_) => 3,
            RunError::RemoteUnavailable(_) => 4,
            RunError::Persistence(_) => 5,
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        RunError::Config(err)
    }
}

impl From<TokenListError> for RunError {
    fn from(err: TokenListError) -> Self {
        RunError::InputFormat(err)
    }
}

impl From<ChainError> for RunError {
    fn from(err: ChainError) -> Self {
        RunError::RemoteUnavailable(err)
    }
}

impl From<SnapshotError> for RunError {
    fn from(err: SnapshotError) -> Self {
        RunError::Persistence(err)
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "Configuration error: {}", e),
            RunError::InputFormat(e) => write!(f, "Input format error: {}", e),
            RunError::RemoteUnavailable(e) => write!(f, "Remote error: {}", e),
            RunError::Persistence(e) => write!(f, "Persistence error: {}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::InputFormat(e) => Some(e),
            RunError::RemoteUnavailable(e) => Some(e),
            RunError::Persistence(e) => Some(e),
        }
    }
}
