use camera_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = DiscoveryError> = core::result::Result<T, E>;

/// The transport layer could not be brought up. Retryable.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("camera discovery failed: {0}")]
    Transport(#[from] TransportError),
}
