//! Crate error type

use crate::client::UpstreamError;
use crate::mjpeg::DemuxError;
use crate::relay::RelayError;
use crate::viewer::ViewerError;

/// Any error produced by this crate
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),
    /// Camera connection error
    Upstream(UpstreamError),
    /// Stream framing error
    Demux(DemuxError),
    /// Relay error
    Relay(RelayError),
    /// Viewer session ended
    Viewer(ViewerError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Upstream(e) => write!(f, "Upstream error: {}", e),
            Error::Demux(e) => write!(f, "Demux error: {}", e),
            Error::Relay(e) => write!(f, "Relay error: {}", e),
            Error::Viewer(e) => write!(f, "Viewer error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Upstream(e) => Some(e),
            Error::Demux(e) => Some(e),
            Error::Relay(e) => Some(e),
            Error::Viewer(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<UpstreamError> for Error {
    fn from(e: UpstreamError) -> Self {
        Error::Upstream(e)
    }
}

impl From<DemuxError> for Error {
    fn from(e: DemuxError) -> Self {
        Error::Demux(e)
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Error::Relay(e)
    }
}

impl From<ViewerError> for Error {
    fn from(e: ViewerError) -> Self {
        Error::Viewer(e)
    }
}

/// Result type using the crate error
pub type Result<T> = std::result::Result<T, Error>;
