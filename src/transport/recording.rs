//! Transport that keeps an ordered log of everything published.
//!
//! Used by dispatcher and node tests; supports one-shot failure injection
//! per channel the same way the mock driver does.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::pipeline::messages::{CameraInfoMessage, ImageMessage, PointCloudMessage};

use super::{Channel, PublishError, Transport};

/// One logged publication.
#[derive(Debug, Clone)]
pub enum Published {
    Camera {
        channel: Channel,
        image: ImageMessage<'static>,
        info: CameraInfoMessage,
    },
    Image {
        channel: Channel,
        image: ImageMessage<'static>,
    },
    Cloud(PointCloudMessage<'static>),
}

impl Published {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Camera { channel, .. } | Self::Image { channel, .. } => *channel,
            Self::Cloud(_) => Channel::Points,
        }
    }

    pub fn frame_id(&self) -> &str {
        match self {
            Self::Camera { image, .. } | Self::Image { image, .. } => &image.header.frame_id,
            Self::Cloud(cloud) => &cloud.header.frame_id,
        }
    }

    pub fn stamp(&self) -> crate::pipeline::messages::Stamp {
        match self {
            Self::Camera { image, .. } | Self::Image { image, .. } => image.header.stamp,
            Self::Cloud(cloud) => cloud.header.stamp,
        }
    }
}

#[derive(Default)]
struct RecordingState {
    log: Vec<Published>,
    failures: HashMap<Channel, PublishError>,
}

impl RecordingState {
    fn take_failure(&mut self, channel: Channel) -> Result<(), PublishError> {
        match self.failures.remove(&channel) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<RecordingState>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next publish on `channel`.
    pub fn with_failure(self, channel: Channel, err: PublishError) -> Self {
        self.fail_next(channel, err);
        self
    }

    pub fn fail_next(&self, channel: Channel, err: PublishError) {
        self.state.lock().failures.insert(channel, err);
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.lock().log.clone()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.state.lock().log.iter().map(Published::channel).collect()
    }
}

impl Transport for RecordingTransport {
    fn publish_camera(
        &self,
        channel: Channel,
        image: &ImageMessage<'_>,
        info: &CameraInfoMessage,
    ) -> Result<(), PublishError> {
        let mut state = self.state.lock();
        state.take_failure(channel)?;
        state.log.push(Published::Camera {
            channel,
            image: image.clone().into_owned(),
            info: info.clone(),
        });
        Ok(())
    }

    fn publish_image(&self, channel: Channel, image: &ImageMessage<'_>) -> Result<(), PublishError> {
        let mut state = self.state.lock();
        state.take_failure(channel)?;
        state.log.push(Published::Image {
            channel,
            image: image.clone().into_owned(),
        });
        Ok(())
    }

    fn publish_cloud(&self, cloud: &PointCloudMessage<'_>) -> Result<(), PublishError> {
        let mut state = self.state.lock();
        state.take_failure(Channel::Points)?;
        state.log.push(Published::Cloud(cloud.clone().into_owned()));
        Ok(())
    }
}
