use crate::SessionState;
use device_registry::DiscoveryError;
use thiserror::Error;

pub type Result<T, E = StreamError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("cannot {op} while camera is {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },
    #[error("cannot open camera: {0}")]
    DeviceOpen(String),
    #[error("timed out waiting for a frame")]
    GrabTimeout,
    #[error("grab failed: {0}")]
    GrabFailed(String),
    #[error("unsupported frame format: {0}")]
    UnsupportedFormat(String),
}
