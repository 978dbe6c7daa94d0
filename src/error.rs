use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceId;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    /// The device is not (or no longer) reachable; callers treat it as removed.
    #[error("{0} is not connected")]
    NotConnected(DeviceId),
    /// A buffer lock could not be taken within the frame budget.
    #[error("buffer of {0} is contended, frame skipped")]
    BufferContention(DeviceId),
    /// In-flight callbacks did not drain within the grace period.
    #[error("unsubscribe of {device} did not drain within {waited:?}")]
    Shutdown { device: DeviceId, waited: Duration },
    #[error("graph engine is closed")]
    Closed,
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("layout (de)serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
