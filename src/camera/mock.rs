//! Mock stereo driver for testing without hardware.
//!
//! Uses a builder pattern to configure devices, calibration and error
//! injection. Tests play the driver's acquisition thread by calling
//! `fire_frame`.

use std::collections::HashMap;
use parking_lot::Mutex;

use crate::camera::error::{CameraError, Result};

use super::api::{DeviceHandle, FrameCallback, StereoSdkApi};
use super::types::{
    CameraIntrinsics, CaptureOptions, Eye, FrameTriple, ImagePair, PointCloud, PointXyz, RawImage,
};

/// A simulated unit in the mock.
#[derive(Debug, Clone)]
struct MockDevice {
    serial: String,
    intrinsics: HashMap<Eye, CameraIntrinsics>,
    claimed: bool,
    tcp_open: bool,
    streaming: bool,
    projector: bool,
    front_light: bool,
    options: Option<CaptureOptions>,
}

/// Configurable error injection for a specific operation.
#[derive(Debug, Clone)]
struct ErrorInjection {
    operation: &'static str,
    error: CameraError,
}

/// Mock driver implementation.
///
/// All state is behind a `Mutex` so the mock satisfies `Send + Sync`. The
/// frame callback is always invoked with the lock released.
pub struct MockStereoSdk {
    state: Mutex<MockState>,
}

struct MockState {
    devices: Vec<MockDevice>,
    callback: Option<FrameCallback>,
    error_injections: Vec<ErrorInjection>,
    calls: Vec<&'static str>,
}

impl MockStereoSdk {
    /// Create a new empty mock (no devices).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                devices: Vec::new(),
                callback: None,
                error_injections: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Add an uncalibrated device with the given serial number.
    pub fn with_device(self, serial: &str) -> Self {
        let mut state = self.state.lock();
        state.devices.push(MockDevice {
            serial: serial.to_string(),
            intrinsics: HashMap::new(),
            claimed: false,
            tcp_open: false,
            streaming: false,
            projector: false,
            front_light: false,
            options: None,
        });
        drop(state);
        self
    }

    /// Add a device with pinhole calibration for both eyes.
    pub fn with_calibrated_device(self, serial: &str, width: u32, height: u32) -> Self {
        let idx = self.state.lock().devices.len();
        self.with_device(serial)
            .with_intrinsics(
                idx,
                CameraIntrinsics::pinhole(Eye::Left, width, height, 1000.0, 1000.0, 0.0),
            )
            .with_intrinsics(
                idx,
                CameraIntrinsics::pinhole(Eye::Right, width, height, 1000.0, 1000.0, -100.0),
            )
    }

    /// Set the calibration of one eye on a device (by index).
    pub fn with_intrinsics(self, device_idx: usize, intrinsics: CameraIntrinsics) -> Self {
        let mut state = self.state.lock();
        if let Some(device) = state.devices.get_mut(device_idx) {
            device.intrinsics.insert(intrinsics.eye, intrinsics);
        }
        drop(state);
        self
    }

    /// Inject an error for a specific operation name. Fires once.
    ///
    /// Operation names match the `StereoSdkApi` method names.
    pub fn with_error(self, operation: &'static str, error: CameraError) -> Self {
        self.inject_error(operation, error);
        self
    }

    /// Inject an error after construction, e.g. while streaming.
    pub fn inject_error(&self, operation: &'static str, error: CameraError) {
        self.state
            .lock()
            .error_injections
            .push(ErrorInjection { operation, error });
    }

    /// Names of every driver call made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// The currently installed frame handler.
    pub fn installed_callback(&self) -> Option<FrameCallback> {
        self.state.lock().callback.clone()
    }

    pub fn is_streaming(&self, device: DeviceHandle) -> bool {
        self.device_flag(device, |d| d.streaming)
    }

    pub fn is_claimed(&self, device: DeviceHandle) -> bool {
        self.device_flag(device, |d| d.claimed)
    }

    pub fn projector_enabled(&self, device: DeviceHandle) -> bool {
        self.device_flag(device, |d| d.projector)
    }

    pub fn front_light_enabled(&self, device: DeviceHandle) -> bool {
        self.device_flag(device, |d| d.front_light)
    }

    /// Options last applied with `configure_capture`.
    pub fn configured_options(&self, device: DeviceHandle) -> Option<CaptureOptions> {
        let state = self.state.lock();
        state.devices.get(device.0).and_then(|d| d.options.clone())
    }

    /// Deliver a triple the way the acquisition thread would.
    ///
    /// Returns `false` when nothing is streaming or no handler is installed.
    pub fn fire_frame(&self, triple: &FrameTriple) -> bool {
        let callback = {
            let state = self.state.lock();
            if !state.devices.iter().any(|d| d.streaming) {
                return false;
            }
            state.callback.clone()
        };
        match callback {
            Some(callback) => {
                callback(triple);
                true
            }
            None => false,
        }
    }

    fn device_flag(&self, device: DeviceHandle, flag: impl Fn(&MockDevice) -> bool) -> bool {
        let state = self.state.lock();
        state.devices.get(device.0).map(flag).unwrap_or(false)
    }
}

impl Default for MockStereoSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    /// Record the call, then check for injected errors.
    fn enter(&mut self, operation: &'static str) -> Result<()> {
        self.calls.push(operation);
        if let Some(pos) = self
            .error_injections
            .iter()
            .position(|e| e.operation == operation)
        {
            let injection = self.error_injections.remove(pos);
            return Err(injection.error);
        }
        Ok(())
    }

    fn device_mut(&mut self, handle: DeviceHandle) -> Result<&mut MockDevice> {
        self.devices
            .get_mut(handle.0)
            .ok_or_else(|| CameraError::DeviceNotFound(format!("mock device {}", handle.0)))
    }

    fn connected_mut(&mut self, handle: DeviceHandle) -> Result<&mut MockDevice> {
        let device = self.device_mut(handle)?;
        if !device.tcp_open {
            return Err(CameraError::Connection("tcp port is not open".to_string()));
        }
        Ok(device)
    }
}

impl StereoSdkApi for MockStereoSdk {
    fn open_device(&self, serial: &str) -> Result<DeviceHandle> {
        let mut state = self.state.lock();
        state.enter("open_device")?;
        let idx = state
            .devices
            .iter()
            .position(|d| d.serial == serial)
            .ok_or_else(|| CameraError::DeviceNotFound(serial.to_string()))?;
        let device = &mut state.devices[idx];
        if device.claimed {
            return Err(CameraError::DeviceClaimed(serial.to_string()));
        }
        device.claimed = true;
        Ok(DeviceHandle(idx))
    }

    fn close_device(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("close_device")?;
        state.device_mut(device)?.claimed = false;
        Ok(())
    }

    fn open_tcp_port(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("open_tcp_port")?;
        state.device_mut(device)?.tcp_open = true;
        Ok(())
    }

    fn close_tcp_port(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("close_tcp_port")?;
        state.device_mut(device)?.tcp_open = false;
        Ok(())
    }

    fn configure_capture(&self, device: DeviceHandle, options: &CaptureOptions) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("configure_capture")?;
        state.connected_mut(device)?.options = Some(options.clone());
        Ok(())
    }

    fn enable_projector(&self, device: DeviceHandle, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("enable_projector")?;
        state.connected_mut(device)?.projector = enabled;
        Ok(())
    }

    fn enable_front_light(&self, device: DeviceHandle, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("enable_front_light")?;
        state.connected_mut(device)?.front_light = enabled;
        Ok(())
    }

    fn register_callback(&self, device: DeviceHandle, callback: FrameCallback) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("register_callback")?;
        state.device_mut(device)?;
        state.callback = Some(callback);
        Ok(())
    }

    fn clear_callback(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("clear_callback")?;
        state.device_mut(device)?;
        state.callback = None;
        Ok(())
    }

    fn start(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("start")?;
        state.connected_mut(device)?.streaming = true;
        Ok(())
    }

    fn stop(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("stop")?;
        state.device_mut(device)?.streaming = false;
        Ok(())
    }

    fn camera_info(&self, device: DeviceHandle, eye: Eye) -> Result<CameraIntrinsics> {
        let mut state = self.state.lock();
        state.enter("camera_info")?;
        let device = state.connected_mut(device)?;
        device
            .intrinsics
            .get(&eye)
            .cloned()
            .ok_or(CameraError::NotCalibrated { eye })
    }
}

/// Build a triple with a 3-channel left raw image, single-channel other
/// images, and a flat cloud one metre away.
pub fn sample_triple(width: u32, height: u32) -> FrameTriple {
    let pixels = (width * height) as usize;
    let mono = |fill: u8| RawImage::new(width, height, "CV_8UC1", vec![fill; pixels]);
    FrameTriple {
        cloud: PointCloud {
            width,
            height,
            points: vec![PointXyz::new(0.0, 0.0, 1.0); pixels],
        },
        raw: ImagePair {
            left: RawImage::new(width, height, "CV_8UC3", vec![10; pixels * 3]),
            right: mono(20),
        },
        rectified: ImagePair {
            left: mono(30),
            right: mono(40),
        },
    }
}
