//! Standard message shapes handed to the transport.
//!
//! Image and cloud messages borrow the driver's buffers; only the transport
//! makes owned copies (`into_owned`) when it needs to keep them.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::camera::types::{CameraIntrinsics, PointCloud, PointXyz};

use super::convert::ImageEncoding;

/// Wall-clock instant, split like a ROS time stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Stamp {
    pub sec: u64,
    pub nanosec: u32,
}

impl Stamp {
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: since_epoch.as_secs(),
            nanosec: since_epoch.subsec_nanos(),
        }
    }

    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            sec: nanos / 1_000_000_000,
            nanosec: (nanos % 1_000_000_000) as u32,
        }
    }

    pub fn as_nanos(&self) -> u64 {
        self.sec * 1_000_000_000 + u64::from(self.nanosec)
    }
}

/// Metadata shared by every artifact of one triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub stamp: Stamp,
    pub frame_id: String,
}

/// A pixel buffer with a standard encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMessage<'a> {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: ImageEncoding,
    pub is_bigendian: bool,
    /// Row length in bytes.
    pub step: u32,
    pub data: Cow<'a, [u8]>,
}

impl ImageMessage<'_> {
    pub fn into_owned(self) -> ImageMessage<'static> {
        ImageMessage {
            header: self.header,
            height: self.height,
            width: self.width,
            encoding: self.encoding,
            is_bigendian: self.is_bigendian,
            step: self.step,
            data: Cow::Owned(self.data.into_owned()),
        }
    }
}

/// Calibration record paired with a raw image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraInfoMessage {
    pub header: Header,
    pub intrinsics: CameraIntrinsics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointFieldType {
    Float32,
}

/// Layout of one field inside a packed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointField {
    pub name: &'static str,
    pub offset: u32,
    pub datatype: PointFieldType,
    pub count: u32,
}

/// Fields of a packed `PointXyz`.
pub const XYZ_FIELDS: [PointField; 3] = [
    PointField {
        name: "x",
        offset: 0,
        datatype: PointFieldType::Float32,
        count: 1,
    },
    PointField {
        name: "y",
        offset: 4,
        datatype: PointFieldType::Float32,
        count: 1,
    },
    PointField {
        name: "z",
        offset: 8,
        datatype: PointFieldType::Float32,
        count: 1,
    },
];

/// An organized cloud with its packed binary layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudMessage<'a> {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    pub fields: [PointField; 3],
    pub point_step: u32,
    pub row_step: u32,
    pub is_dense: bool,
    pub points: Cow<'a, [PointXyz]>,
}

impl<'a> PointCloudMessage<'a> {
    pub fn from_cloud(cloud: &'a PointCloud, header: Header) -> Self {
        let point_step = std::mem::size_of::<PointXyz>() as u32;
        Self {
            header,
            width: cloud.width,
            height: cloud.height,
            fields: XYZ_FIELDS,
            point_step,
            row_step: point_step * cloud.width,
            is_dense: cloud.is_dense(),
            points: Cow::Borrowed(&cloud.points),
        }
    }

    /// Packed point data in native byte order.
    pub fn data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.points[..])
    }

    pub fn into_owned(self) -> PointCloudMessage<'static> {
        PointCloudMessage {
            header: self.header,
            width: self.width,
            height: self.height,
            fields: self.fields,
            point_step: self.point_step,
            row_step: self.row_step,
            is_dense: self.is_dense,
            points: Cow::Owned(self.points.into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            stamp: Stamp::from_nanos(1_500_000_000),
            frame_id: "ensenso_optical_frame".to_string(),
        }
    }

    #[test]
    fn stamp_splits_nanoseconds() {
        let stamp = Stamp::from_nanos(1_500_000_001);
        assert_eq!(stamp.sec, 1);
        assert_eq!(stamp.nanosec, 500_000_001);
        assert_eq!(stamp.as_nanos(), 1_500_000_001);
    }

    #[test]
    fn stamp_now_is_after_epoch() {
        assert!(Stamp::now().sec > 0);
    }

    #[test]
    fn cloud_message_packs_points() {
        let cloud = PointCloud {
            width: 2,
            height: 1,
            points: vec![PointXyz::new(1.0, 2.0, 3.0), PointXyz::new(4.0, 5.0, 6.0)],
        };
        let msg = PointCloudMessage::from_cloud(&cloud, header());
        assert_eq!(msg.point_step, 12);
        assert_eq!(msg.row_step, 24);
        assert_eq!(msg.data().len(), 24);
        assert_eq!(&msg.data()[0..4], &1.0f32.to_ne_bytes());
        assert_eq!(&msg.data()[20..24], &6.0f32.to_ne_bytes());
        assert!(msg.is_dense);
        assert!(matches!(msg.points, Cow::Borrowed(_)));
    }

    #[test]
    fn into_owned_detaches_from_buffer() {
        let cloud = PointCloud {
            width: 1,
            height: 1,
            points: vec![PointXyz::new(0.0, 0.0, 1.0)],
        };
        let owned = PointCloudMessage::from_cloud(&cloud, header()).into_owned();
        drop(cloud);
        assert!(matches!(owned.points, Cow::Owned(_)));
        assert_eq!(owned.points[0].z, 1.0);
    }

    #[test]
    fn xyz_fields_are_contiguous_floats() {
        let offsets: Vec<u32> = XYZ_FIELDS.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert!(XYZ_FIELDS
            .iter()
            .all(|f| f.datatype == PointFieldType::Float32 && f.count == 1));
    }
}
