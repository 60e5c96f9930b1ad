use thiserror::Error;

use crate::camera::error::CameraError;
use crate::camera::types::Eye;
use crate::transport::{Channel, PublishError};

/// Failure of a single artifact within one frame triple.
///
/// Contained by the dispatcher: logged, counted, never propagated into the
/// acquisition thread.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("{eye} intrinsics unavailable: {source}")]
    Intrinsics {
        eye: Eye,
        #[source]
        source: CameraError,
    },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("{actual} intrinsics attached to {expected} image")]
    IntrinsicsMismatch { expected: Eye, actual: Eye },

    #[error("publish to {channel} failed: {source}")]
    Publish {
        channel: Channel,
        #[source]
        source: PublishError,
    },
}
