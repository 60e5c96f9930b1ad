//! In-process transport.
//!
//! Image channels are transient tokio `broadcast` channels bounded by the
//! queue size: only subscribers present at publish time see a message, and
//! slow subscribers lag instead of blocking the acquisition thread. The
//! point-cloud channel is a tokio `watch` channel, so a subscriber that
//! attaches later still sees the last published cloud.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::pipeline::messages::{CameraInfoMessage, ImageMessage, PointCloudMessage};

use super::{Channel, PublishError, Transport};

/// Default per-channel queue depth for image channels.
pub const DEFAULT_QUEUE_SIZE: usize = 2;

/// Raw image delivered together with its calibration.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub image: ImageMessage<'static>,
    pub info: CameraInfoMessage,
}

pub type SharedImage = Arc<ImageMessage<'static>>;
pub type SharedCloud = Arc<PointCloudMessage<'static>>;

/// Advertised output channels living in this process.
pub struct LocalTransport {
    queue_size: usize,
    left_raw: broadcast::Sender<Arc<CameraFrame>>,
    right_raw: broadcast::Sender<Arc<CameraFrame>>,
    left_rectified: broadcast::Sender<SharedImage>,
    right_rectified: broadcast::Sender<SharedImage>,
    points: watch::Sender<Option<SharedCloud>>,
}

impl LocalTransport {
    /// Advertise every channel. A queue size of zero is raised to one.
    pub fn advertise(queue_size: usize) -> Self {
        let queue_size = queue_size.max(1);
        let (points, _) = watch::channel(None);
        Self {
            queue_size,
            left_raw: broadcast::channel(queue_size).0,
            right_raw: broadcast::channel(queue_size).0,
            left_rectified: broadcast::channel(queue_size).0,
            right_rectified: broadcast::channel(queue_size).0,
            points,
        }
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    fn camera_sender(&self, channel: Channel) -> Result<&broadcast::Sender<Arc<CameraFrame>>, PublishError> {
        match channel {
            Channel::LeftRaw => Ok(&self.left_raw),
            Channel::RightRaw => Ok(&self.right_raw),
            _ => Err(PublishError::WrongChannel {
                channel,
                expected: "camera frames",
            }),
        }
    }

    fn image_sender(&self, channel: Channel) -> Result<&broadcast::Sender<SharedImage>, PublishError> {
        match channel {
            Channel::LeftRectified => Ok(&self.left_rectified),
            Channel::RightRectified => Ok(&self.right_rectified),
            _ => Err(PublishError::WrongChannel {
                channel,
                expected: "images",
            }),
        }
    }

    /// Subscribe to a raw channel (image + calibration).
    pub fn subscribe_camera(
        &self,
        channel: Channel,
    ) -> Result<broadcast::Receiver<Arc<CameraFrame>>, PublishError> {
        Ok(self.camera_sender(channel)?.subscribe())
    }

    /// Subscribe to a rectified image channel.
    pub fn subscribe_image(
        &self,
        channel: Channel,
    ) -> Result<broadcast::Receiver<SharedImage>, PublishError> {
        Ok(self.image_sender(channel)?.subscribe())
    }

    /// Subscribe to the point-cloud channel. The receiver immediately holds
    /// the last published cloud, if any.
    pub fn subscribe_cloud(&self) -> watch::Receiver<Option<SharedCloud>> {
        self.points.subscribe()
    }

    /// The retained cloud.
    pub fn latest_cloud(&self) -> Option<SharedCloud> {
        self.points.borrow().clone()
    }

    /// Number of live subscribers on a channel.
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        match channel {
            Channel::LeftRaw => self.left_raw.receiver_count(),
            Channel::RightRaw => self.right_raw.receiver_count(),
            Channel::LeftRectified => self.left_rectified.receiver_count(),
            Channel::RightRectified => self.right_rectified.receiver_count(),
            Channel::Points => self.points.receiver_count(),
        }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::advertise(DEFAULT_QUEUE_SIZE)
    }
}

impl Transport for LocalTransport {
    fn publish_camera(
        &self,
        channel: Channel,
        image: &ImageMessage<'_>,
        info: &CameraInfoMessage,
    ) -> Result<(), PublishError> {
        let sender = self.camera_sender(channel)?;
        if sender.receiver_count() == 0 {
            trace!("No subscribers on {channel}");
            return Ok(());
        }
        let frame = CameraFrame {
            image: image.clone().into_owned(),
            info: info.clone(),
        };
        // A send error only means every subscriber left in the meantime.
        let _ = sender.send(Arc::new(frame));
        Ok(())
    }

    fn publish_image(&self, channel: Channel, image: &ImageMessage<'_>) -> Result<(), PublishError> {
        let sender = self.image_sender(channel)?;
        if sender.receiver_count() == 0 {
            trace!("No subscribers on {channel}");
            return Ok(());
        }
        let _ = sender.send(Arc::new(image.clone().into_owned()));
        Ok(())
    }

    fn publish_cloud(&self, cloud: &PointCloudMessage<'_>) -> Result<(), PublishError> {
        self.points
            .send_replace(Some(Arc::new(cloud.clone().into_owned())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::types::{CameraIntrinsics, Eye, PointCloud, PointXyz, RawImage};
    use crate::pipeline::convert::to_image_message;
    use crate::pipeline::messages::{Header, Stamp};
    use tokio::sync::broadcast::error::TryRecvError;

    fn header(nanos: u64) -> Header {
        Header {
            stamp: Stamp::from_nanos(nanos),
            frame_id: "cam".to_string(),
        }
    }

    fn cloud() -> PointCloud {
        PointCloud {
            width: 1,
            height: 1,
            points: vec![PointXyz::new(0.0, 0.0, 1.0)],
        }
    }

    #[test]
    fn camera_subscriber_receives_image_and_info() {
        let transport = LocalTransport::default();
        let mut rx = transport.subscribe_camera(Channel::LeftRaw).unwrap();

        let raw = RawImage::new(2, 2, "CV_8UC1", vec![5; 4]);
        let image = to_image_message(&raw, header(1)).unwrap();
        let info = CameraInfoMessage {
            header: header(1),
            intrinsics: CameraIntrinsics::pinhole(Eye::Left, 2, 2, 1.0, 1.0, 0.0),
        };
        transport
            .publish_camera(Channel::LeftRaw, &image, &info)
            .unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.image.data.as_ref(), &[5u8; 4][..]);
        assert_eq!(frame.info.intrinsics.eye, Eye::Left);
    }

    #[test]
    fn image_channels_are_transient() {
        let transport = LocalTransport::default();
        let raw = RawImage::new(2, 2, "CV_8UC1", vec![0; 4]);
        let image = to_image_message(&raw, header(1)).unwrap();
        transport
            .publish_image(Channel::LeftRectified, &image)
            .unwrap();

        let mut late = transport.subscribe_image(Channel::LeftRectified).unwrap();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn cloud_is_retained_for_late_subscribers() {
        let transport = LocalTransport::default();
        assert!(transport.latest_cloud().is_none());

        let cloud = cloud();
        transport
            .publish_cloud(&PointCloudMessage::from_cloud(&cloud, header(7)))
            .unwrap();

        let late = transport.subscribe_cloud();
        let retained = late.borrow().clone().expect("cloud should be retained");
        assert_eq!(retained.header.stamp, Stamp::from_nanos(7));
        assert_eq!(retained.points.len(), 1);
    }

    #[test]
    fn wrong_channel_is_rejected() {
        let transport = LocalTransport::default();
        let raw = RawImage::new(1, 1, "CV_8UC1", vec![0]);
        let image = to_image_message(&raw, header(1)).unwrap();
        assert!(matches!(
            transport.publish_image(Channel::LeftRaw, &image),
            Err(PublishError::WrongChannel { .. })
        ));
        assert!(transport.subscribe_camera(Channel::Points).is_err());
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let transport = LocalTransport::advertise(2);
        let mut rx = transport.subscribe_image(Channel::RightRectified).unwrap();
        let raw = RawImage::new(1, 1, "CV_8UC1", vec![0]);
        for n in 0..5 {
            let image = to_image_message(&raw, header(n)).unwrap();
            transport
                .publish_image(Channel::RightRectified, &image)
                .unwrap();
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(3))));
        assert_eq!(rx.try_recv().unwrap().header.stamp, Stamp::from_nanos(3));
    }

    #[test]
    fn zero_queue_size_is_raised() {
        assert_eq!(LocalTransport::advertise(0).queue_size(), 1);
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let transport = LocalTransport::default();
        let _a = transport.subscribe_camera(Channel::RightRaw).unwrap();
        let _b = transport.subscribe_camera(Channel::RightRaw).unwrap();
        assert_eq!(transport.subscriber_count(Channel::RightRaw), 2);
        assert_eq!(transport.subscriber_count(Channel::LeftRaw), 0);
    }
}
