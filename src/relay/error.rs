//! Relay error types

use crate::client::UpstreamError;

/// Error type for relay operations
#[derive(Debug)]
pub enum RelayError {
    /// The relay (or its directory) has been stopped
    Unavailable(String),
    /// The upstream HTTP client could not be built
    Client(UpstreamError),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Unavailable(url) => write!(f, "Relay unavailable: {}", url),
            RelayError::Client(e) => write!(f, "Failed to create upstream client: {}", e),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Client(e) => Some(e),
            RelayError::Unavailable(_) => None,
        }
    }
}

impl From<UpstreamError> for RelayError {
    fn from(e: UpstreamError) -> Self {
        RelayError::Client(e)
    }
}
