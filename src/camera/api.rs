//! `StereoSdkApi` trait, abstracting the stereo driver for testability.
//!
//! The simulated device and `MockStereoSdk` both implement this trait,
//! allowing `DeviceSession<S>` to be generic over the driver.

use std::sync::Arc;

use crate::camera::error::Result;

use super::types::{CameraIntrinsics, CaptureOptions, Eye, FrameTriple};

/// Opaque device handle used across the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub usize);

/// Handler invoked on the driver's acquisition thread for every completed
/// frame triple. The triple is only borrowed for the duration of the call.
pub type FrameCallback = Arc<dyn Fn(&FrameTriple) + Send + Sync>;

/// Abstraction over the stereo camera driver.
///
/// All methods take `&self`; the implementation manages interior
/// mutability. Calls are synchronous; blocking behaviour and timeouts are
/// driver-defined and surface as errors.
pub trait StereoSdkApi: Send + Sync {
    /// Bind to the unit with the given serial number.
    fn open_device(&self, serial: &str) -> Result<DeviceHandle>;

    /// Release the device binding.
    fn close_device(&self, device: DeviceHandle) -> Result<()>;

    /// Open the out-of-band control link.
    fn open_tcp_port(&self, device: DeviceHandle) -> Result<()>;

    /// Close the control link.
    fn close_tcp_port(&self, device: DeviceHandle) -> Result<()>;

    /// Apply acquisition settings.
    fn configure_capture(&self, device: DeviceHandle, options: &CaptureOptions) -> Result<()>;

    /// Switch the structured-light projector.
    fn enable_projector(&self, device: DeviceHandle, enabled: bool) -> Result<()>;

    /// Switch the front light.
    fn enable_front_light(&self, device: DeviceHandle, enabled: bool) -> Result<()>;

    /// Install the frame handler, replacing any previous one.
    fn register_callback(&self, device: DeviceHandle, callback: FrameCallback) -> Result<()>;

    /// Drop the installed frame handler, if any.
    fn clear_callback(&self, device: DeviceHandle) -> Result<()>;

    /// Start the acquisition thread.
    fn start(&self, device: DeviceHandle) -> Result<()>;

    /// Halt the acquisition thread. No callback begins after this returns.
    fn stop(&self, device: DeviceHandle) -> Result<()>;

    /// Query the current calibration of one eye.
    fn camera_info(&self, device: DeviceHandle, eye: Eye) -> Result<CameraIntrinsics>;
}
