//! Raw sensor image → standard image message.
//!
//! The encoding table is closed: every driver tag maps to exactly one
//! output encoding, and unknown tags fall back to single-channel rather
//! than dropping the frame. Pixel data is never copied here; the message
//! borrows the driver's buffer.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

use crate::camera::types::RawImage;

use super::error::CaptureError;
use super::messages::{Header, ImageMessage};

/// Driver tag for 8-bit three-channel images.
pub const DRIVER_TAG_8UC3: &str = "CV_8UC3";
/// Driver tag for 8-bit single-channel images.
pub const DRIVER_TAG_8UC1: &str = "CV_8UC1";

/// Standard output pixel encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImageEncoding {
    #[serde(rename = "bgr8")]
    Bgr8,
    #[serde(rename = "mono8")]
    Mono8,
}

impl ImageEncoding {
    /// Map a driver encoding tag. Total: unknown tags become `Mono8`.
    pub fn from_driver_tag(tag: &str) -> Self {
        match tag {
            DRIVER_TAG_8UC3 => Self::Bgr8,
            _ => Self::Mono8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bgr8 => "bgr8",
            Self::Mono8 => "mono8",
        }
    }

    /// Bytes per pixel.
    pub fn channels(self) -> u32 {
        match self {
            Self::Bgr8 => 3,
            Self::Mono8 => 1,
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// View a raw image as a standard image message.
///
/// # Errors
///
/// `MalformedFrame` when a dimension is zero or the buffer holds fewer
/// than `height * step` bytes. Longer buffers are viewed up to that length.
pub fn to_image_message(raw: &RawImage, header: Header) -> Result<ImageMessage<'_>, CaptureError> {
    let encoding = ImageEncoding::from_driver_tag(&raw.encoding);
    if raw.width == 0 || raw.height == 0 {
        return Err(CaptureError::MalformedFrame(format!(
            "empty {}x{} image",
            raw.width, raw.height
        )));
    }

    let step = raw
        .width
        .checked_mul(encoding.channels())
        .ok_or_else(|| CaptureError::MalformedFrame(format!("width {} overflows", raw.width)))?;
    let expected = (step as usize)
        .checked_mul(raw.height as usize)
        .ok_or_else(|| {
            CaptureError::MalformedFrame(format!("{}x{} overflows", raw.width, raw.height))
        })?;
    if raw.data.len() < expected {
        return Err(CaptureError::MalformedFrame(format!(
            "{}x{} {encoding} needs {expected} bytes, buffer has {}",
            raw.width,
            raw.height,
            raw.data.len()
        )));
    }

    Ok(ImageMessage {
        header,
        height: raw.height,
        width: raw.width,
        encoding,
        is_bigendian: false,
        step,
        data: Cow::Borrowed(&raw.data[..expected]),
    })
}
