use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::camera::error::{CameraError, Result};

/// One side of the stereo pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Both eyes in publication order.
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a device session.
///
/// `Opened` → `Connected` → `Streaming` ⇄ `Stopped` → `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Device bound, control channel not yet open.
    Opened,
    /// Control channel open, acquisition not started.
    Connected,
    Streaming,
    /// Acquisition halted; may be restarted.
    Stopped,
    Closed,
}

impl SessionState {
    /// Whether the control channel is usable in this state.
    pub fn has_control_channel(self) -> bool {
        matches!(self, Self::Connected | Self::Streaming | Self::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Opened => "opened",
            Self::Connected => "connected",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Uninterpreted sensor image as delivered by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Driver encoding tag, e.g. `CV_8UC1` or `CV_8UC3`.
    pub encoding: String,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, encoding: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            encoding: encoding.into(),
            data,
        }
    }
}

/// Left and right images of one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePair {
    pub left: RawImage,
    pub right: RawImage,
}

impl ImagePair {
    pub fn get(&self, eye: Eye) -> &RawImage {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }
}

/// A single 3D point in the camera frame, metres.
///
/// Invalid measurements are NaN in all three coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct PointXyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PointXyz {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Organized point cloud: `width * height` points in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub width: u32,
    pub height: u32,
    pub points: Vec<PointXyz>,
}

impl PointCloud {
    /// True when every point is a valid measurement.
    pub fn is_dense(&self) -> bool {
        self.points.iter().all(PointXyz::is_finite)
    }
}

/// One synchronized capture event.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTriple {
    pub cloud: PointCloud,
    pub raw: ImagePair,
    pub rectified: ImagePair,
}

/// Per-eye calibration as reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraIntrinsics {
    pub eye: Eye,
    pub width: u32,
    pub height: u32,
    pub distortion_model: String,
    /// Distortion coefficients (k1, k2, t1, t2, k3).
    pub d: Vec<f64>,
    /// 3x3 camera matrix, row-major.
    pub k: [f64; 9],
    /// 3x3 rectification rotation, row-major.
    pub r: [f64; 9],
    /// 3x4 projection matrix, row-major.
    pub p: [f64; 12],
}

impl CameraIntrinsics {
    /// Pinhole intrinsics without distortion. `tx` is the projected baseline
    /// term (`-fx * baseline`) for the right eye, zero for the left.
    pub fn pinhole(eye: Eye, width: u32, height: u32, fx: f64, fy: f64, tx: f64) -> Self {
        let cx = f64::from(width) / 2.0;
        let cy = f64::from(height) / 2.0;
        Self {
            eye,
            width,
            height,
            distortion_model: "plumb_bob".to_string(),
            d: vec![0.0; 5],
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            p: [fx, 0.0, cx, tx, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }
}

/// Sensor binning factor. Written as `1`/`2` or `"1"`/`"2"` in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "BinningValue", into = "u8")]
pub enum Binning {
    #[default]
    One,
    Two,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BinningValue {
    Number(u8),
    Text(String),
}

impl TryFrom<u8> for Binning {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("binning must be 1 or 2, got {other}")),
        }
    }
}

impl TryFrom<BinningValue> for Binning {
    type Error = String;

    fn try_from(value: BinningValue) -> std::result::Result<Self, Self::Error> {
        match value {
            BinningValue::Number(n) => Self::try_from(n),
            BinningValue::Text(text) => match text.as_str() {
                "1" => Ok(Self::One),
                "2" => Ok(Self::Two),
                _ => Err(format!("binning must be 1 or 2, got {text:?}")),
            },
        }
    }
}

impl From<Binning> for u8 {
    fn from(binning: Binning) -> Self {
        match binning {
            Binning::One => 1,
            Binning::Two => 2,
        }
    }
}

/// Acquisition trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    #[default]
    Software,
    FallingEdge,
    RisingEdge,
}

/// Acquisition settings applied before streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub auto_exposure: bool,
    pub auto_gain: bool,
    pub binning: Binning,
    pub exposure_ms: f32,
    pub gain: u32,
    pub gain_boost: bool,
    pub hardware_gamma: bool,
    pub hdr: bool,
    pub pixel_clock_mhz: u32,
    pub target_brightness: u32,
    pub trigger_mode: TriggerMode,
    pub disparity_area_of_interest: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            auto_exposure: true,
            auto_gain: true,
            binning: Binning::One,
            exposure_ms: 0.32,
            gain: 1,
            gain_boost: false,
            hardware_gamma: false,
            hdr: false,
            pixel_clock_mhz: 10,
            target_brightness: 80,
            trigger_mode: TriggerMode::Software,
            disparity_area_of_interest: false,
        }
    }
}

impl CaptureOptions {
    /// Check every value against the range the sensor accepts.
    pub fn validate(&self) -> Result<()> {
        if !(self.exposure_ms.is_finite() && self.exposure_ms > 0.0) {
            return Err(CameraError::Configuration(format!(
                "exposure must be positive, got {} ms",
                self.exposure_ms
            )));
        }
        if !(1..=4).contains(&self.gain) {
            return Err(CameraError::Configuration(format!(
                "gain must be within 1..=4, got {}",
                self.gain
            )));
        }
        if !(5..=43).contains(&self.pixel_clock_mhz) {
            return Err(CameraError::Configuration(format!(
                "pixel clock must be within 5..=43 MHz, got {}",
                self.pixel_clock_mhz
            )));
        }
        if !(40..=210).contains(&self.target_brightness) {
            return Err(CameraError::Configuration(format!(
                "target brightness must be within 40..=210, got {}",
                self.target_brightness
            )));
        }
        Ok(())
    }
}
