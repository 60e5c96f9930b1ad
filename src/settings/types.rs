use serde::{Deserialize, Serialize};

use crate::camera::types::CaptureOptions;
use crate::transport::local::DEFAULT_QUEUE_SIZE;

pub const DEFAULT_SERIAL_NO: &str = "150533";
pub const DEFAULT_FRAME_ID: &str = "ensenso_optical_frame";

/// Configuration file as written by the user. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    pub serial_no: Option<String>,
    pub camera_frame_id: Option<String>,
    pub front_light: Option<bool>,
    pub projector: Option<bool>,
    pub capture: Option<CaptureOptions>,
    pub queue_size: Option<usize>,
}

/// Resolved node configuration.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeConfig {
    pub serial_no: String,
    pub camera_frame_id: String,
    pub front_light: bool,
    pub projector: bool,
    pub capture: CaptureOptions,
    pub queue_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            serial_no: DEFAULT_SERIAL_NO.to_string(),
            camera_frame_id: DEFAULT_FRAME_ID.to_string(),
            front_light: false,
            projector: false,
            capture: CaptureOptions::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}
