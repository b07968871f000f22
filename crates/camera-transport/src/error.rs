use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport layer unavailable: {0}")]
    InitFailed(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("pixel format {0} not supported by device")]
    FormatRejected(String),
    #[error("timeout")]
    Timeout,
    #[error("grab failed: {0}")]
    GrabFailed(String),
    #[error("I/O error: {0}")]
    Io(String),
}
