//! Routes converted artifacts to their output channels.
//!
//! Every artifact gets the configured frame label and the stamp passed in by
//! the caller. The fanout performs no device I/O.

use std::sync::Arc;

use crate::camera::types::{CameraIntrinsics, Eye, PointCloud, RawImage};
use crate::transport::{Channel, Transport};

use super::convert::to_image_message;
use super::error::CaptureError;
use super::messages::{CameraInfoMessage, Header, PointCloudMessage, Stamp};

pub struct Fanout<T: Transport> {
    transport: Arc<T>,
    frame_id: String,
}

impl<T: Transport> Fanout<T> {
    pub fn new(transport: Arc<T>, frame_id: impl Into<String>) -> Self {
        Self {
            transport,
            frame_id: frame_id.into(),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn header(&self, stamp: Stamp) -> Header {
        Header {
            stamp,
            frame_id: self.frame_id.clone(),
        }
    }

    /// Publish a raw image with its calibration on the eye's raw channel.
    ///
    /// Returns the number of pixel bytes handed over.
    pub fn publish_raw(
        &self,
        eye: Eye,
        raw: &RawImage,
        intrinsics: CameraIntrinsics,
        stamp: Stamp,
    ) -> Result<usize, CaptureError> {
        if intrinsics.eye != eye {
            return Err(CaptureError::IntrinsicsMismatch {
                expected: eye,
                actual: intrinsics.eye,
            });
        }
        let channel = Channel::raw(eye);
        let image = to_image_message(raw, self.header(stamp))?;
        let info = CameraInfoMessage {
            header: self.header(stamp),
            intrinsics,
        };
        self.transport
            .publish_camera(channel, &image, &info)
            .map_err(|source| CaptureError::Publish { channel, source })?;
        Ok(image.data.len())
    }

    /// Publish a rectified image, without calibration.
    pub fn publish_rectified(
        &self,
        eye: Eye,
        raw: &RawImage,
        stamp: Stamp,
    ) -> Result<usize, CaptureError> {
        let channel = Channel::rectified(eye);
        let image = to_image_message(raw, self.header(stamp))?;
        self.transport
            .publish_image(channel, &image)
            .map_err(|source| CaptureError::Publish { channel, source })?;
        Ok(image.data.len())
    }

    /// Publish the organized cloud on the retained channel.
    pub fn publish_cloud(&self, cloud: &PointCloud, stamp: Stamp) -> Result<usize, CaptureError> {
        let expected = cloud.width as usize * cloud.height as usize;
        if expected == 0 || cloud.points.len() != expected {
            return Err(CaptureError::MalformedFrame(format!(
                "{}x{} cloud holds {} points",
                cloud.width,
                cloud.height,
                cloud.points.len()
            )));
        }
        let message = PointCloudMessage::from_cloud(cloud, self.header(stamp));
        self.transport
            .publish_cloud(&message)
            .map_err(|source| CaptureError::Publish {
                channel: Channel::Points,
                source,
            })?;
        Ok(message.data().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::types::PointXyz;
    use crate::transport::recording::{Published, RecordingTransport};
    use crate::transport::PublishError;

    fn fanout() -> Fanout<RecordingTransport> {
        Fanout::new(Arc::new(RecordingTransport::new()), "ensenso_optical_frame")
    }

    fn mono(width: u32, height: u32) -> RawImage {
        RawImage::new(width, height, "CV_8UC1", vec![1; (width * height) as usize])
    }

    #[test]
    fn raw_publish_carries_image_and_matching_info() {
        let fanout = fanout();
        let intrinsics = CameraIntrinsics::pinhole(Eye::Right, 4, 2, 100.0, 100.0, -10.0);
        let bytes = fanout
            .publish_raw(Eye::Right, &mono(4, 2), intrinsics.clone(), Stamp::from_nanos(9))
            .unwrap();
        assert_eq!(bytes, 8);

        let published = fanout.transport().published();
        match &published[0] {
            Published::Camera {
                channel,
                image,
                info,
            } => {
                assert_eq!(*channel, Channel::RightRaw);
                assert_eq!(image.header, info.header);
                assert_eq!(info.header.frame_id, "ensenso_optical_frame");
                assert_eq!(info.intrinsics, intrinsics);
            }
            other => panic!("unexpected publication {other:?}"),
        }
    }

    #[test]
    fn raw_publish_rejects_other_eye_intrinsics() {
        let fanout = fanout();
        let intrinsics = CameraIntrinsics::pinhole(Eye::Left, 4, 2, 100.0, 100.0, 0.0);
        let err = fanout
            .publish_raw(Eye::Right, &mono(4, 2), intrinsics, Stamp::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::IntrinsicsMismatch {
                expected: Eye::Right,
                actual: Eye::Left
            }
        ));
        assert!(fanout.transport().published().is_empty());
    }

    #[test]
    fn rectified_publish_goes_to_rect_channel() {
        let fanout = fanout();
        fanout
            .publish_rectified(Eye::Left, &mono(2, 2), Stamp::from_nanos(3))
            .unwrap();
        assert_eq!(fanout.transport().channels(), vec![Channel::LeftRectified]);
        assert_eq!(fanout.transport().published()[0].stamp(), Stamp::from_nanos(3));
    }

    #[test]
    fn cloud_with_wrong_point_count_is_malformed() {
        let fanout = fanout();
        let cloud = PointCloud {
            width: 2,
            height: 2,
            points: vec![PointXyz::default(); 3],
        };
        assert!(matches!(
            fanout.publish_cloud(&cloud, Stamp::default()),
            Err(CaptureError::MalformedFrame(_))
        ));
    }

    #[test]
    fn cloud_publish_reports_packed_size() {
        let fanout = fanout();
        let cloud = PointCloud {
            width: 2,
            height: 1,
            points: vec![PointXyz::new(0.0, 0.0, 1.0); 2],
        };
        assert_eq!(fanout.publish_cloud(&cloud, Stamp::default()).unwrap(), 24);
        assert_eq!(fanout.transport().channels(), vec![Channel::Points]);
    }

    #[test]
    fn transport_failure_names_the_channel() {
        let transport = Arc::new(
            RecordingTransport::new().with_failure(Channel::LeftRectified, PublishError::Closed),
        );
        let fanout = Fanout::new(transport, "cam");
        let err = fanout
            .publish_rectified(Eye::Left, &mono(2, 2), Stamp::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Publish {
                channel: Channel::LeftRectified,
                ..
            }
        ));
    }
}
