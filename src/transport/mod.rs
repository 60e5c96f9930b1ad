// Output channels and the delivery contract.

pub mod local;
pub mod recording;

use std::fmt;

use thiserror::Error;

use crate::camera::types::Eye;
use crate::pipeline::messages::{CameraInfoMessage, ImageMessage, PointCloudMessage};

/// Designated output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    LeftRaw,
    RightRaw,
    LeftRectified,
    RightRectified,
    Points,
}

impl Channel {
    /// Every channel in per-triple emission order.
    pub const ALL: [Channel; 5] = [
        Channel::LeftRaw,
        Channel::RightRaw,
        Channel::LeftRectified,
        Channel::RightRectified,
        Channel::Points,
    ];

    pub fn raw(eye: Eye) -> Self {
        match eye {
            Eye::Left => Self::LeftRaw,
            Eye::Right => Self::RightRaw,
        }
    }

    pub fn rectified(eye: Eye) -> Self {
        match eye {
            Eye::Left => Self::LeftRectified,
            Eye::Right => Self::RightRectified,
        }
    }

    pub fn topic(self) -> &'static str {
        match self {
            Self::LeftRaw => "left/image_raw",
            Self::RightRaw => "right/image_raw",
            Self::LeftRectified => "left/image_rect",
            Self::RightRectified => "right/image_rect",
            Self::Points => "depth/points",
        }
    }

    /// Companion calibration topic for raw channels.
    pub fn info_topic(self) -> Option<&'static str> {
        match self {
            Self::LeftRaw => Some("left/camera_info"),
            Self::RightRaw => Some("right/camera_info"),
            _ => None,
        }
    }

    /// Whether late subscribers receive the last published value.
    pub fn is_retained(self) -> bool {
        self == Self::Points
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// Delivery failures reported by a transport.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("{channel} does not carry {expected}")]
    WrongChannel {
        channel: Channel,
        expected: &'static str,
    },

    #[error("transport closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Delivers artifacts to consumers.
///
/// Messages are borrowed for the duration of the call; an implementation
/// that keeps them must copy (`into_owned`). Calls run on the acquisition
/// thread and must not block for unbounded time.
pub trait Transport: Send + Sync {
    /// Image plus matching calibration on a raw channel.
    fn publish_camera(
        &self,
        channel: Channel,
        image: &ImageMessage<'_>,
        info: &CameraInfoMessage,
    ) -> Result<(), PublishError>;

    /// Image only.
    fn publish_image(&self, channel: Channel, image: &ImageMessage<'_>) -> Result<(), PublishError>;

    /// Point cloud on the retained channel.
    fn publish_cloud(&self, cloud: &PointCloudMessage<'_>) -> Result<(), PublishError>;
}
