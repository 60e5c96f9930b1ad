//! Device session: lifecycle of one bound stereo unit.
//!
//! The session owns the driver binding and a callback gate. Every frame the
//! driver delivers passes through the gate under a read lock; `stop()` takes
//! the write lock, so it cannot return while a handler is still running.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::camera::error::{CameraError, Result};

use super::api::{DeviceHandle, FrameCallback, StereoSdkApi};
use super::types::{CameraIntrinsics, CaptureOptions, Eye, FrameTriple, SessionState};

/// Read access to the current per-eye calibration.
pub trait IntrinsicsSource: Send + Sync {
    fn intrinsics(&self, eye: Eye) -> Result<CameraIntrinsics>;
}

struct GateState {
    handler: Option<FrameCallback>,
    open: bool,
}

/// Admission control between the acquisition thread and `stop()`.
struct CallbackGate {
    state: RwLock<GateState>,
}

impl CallbackGate {
    fn new() -> Self {
        Self {
            state: RwLock::new(GateState {
                handler: None,
                open: false,
            }),
        }
    }

    /// Run the handler if the gate is open. The read lock is held for the
    /// whole invocation.
    fn invoke(&self, triple: &FrameTriple) -> bool {
        let state = self.state.read();
        if !state.open {
            return false;
        }
        match &state.handler {
            Some(handler) => {
                handler(triple);
                true
            }
            None => false,
        }
    }

    fn has_handler(&self) -> bool {
        self.state.read().handler.is_some()
    }

    fn replace(&self, handler: FrameCallback) {
        self.state.write().handler = Some(handler);
    }

    fn open(&self) {
        self.state.write().open = true;
    }

    /// Blocks until any in-flight invocation has returned.
    fn close(&self) {
        self.state.write().open = false;
    }

    fn take(&self) -> Option<FrameCallback> {
        let mut state = self.state.write();
        state.open = false;
        state.handler.take()
    }
}

/// One step of the scoped close sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    StopAcquisition,
    ClearCallback,
    CloseControlChannel,
    CloseDevice,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StopAcquisition => "stop acquisition",
            Self::ClearCallback => "clear frame callback",
            Self::CloseControlChannel => "close control channel",
            Self::CloseDevice => "close device",
        };
        f.write_str(s)
    }
}

/// Failures collected while closing a session. Never escalated.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub failures: Vec<(TeardownStep, CameraError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, step: TeardownStep, result: Result<()>) {
        if let Err(e) = result {
            warn!("Teardown step {step} failed: {e}");
            self.failures.push((step, e));
        }
    }
}

/// Cloneable calibration reader handed to the frame dispatcher.
pub struct IntrinsicsReader<S: StereoSdkApi> {
    sdk: Arc<S>,
    device: DeviceHandle,
    state: Arc<Mutex<SessionState>>,
}

impl<S: StereoSdkApi> Clone for IntrinsicsReader<S> {
    fn clone(&self) -> Self {
        Self {
            sdk: Arc::clone(&self.sdk),
            device: self.device,
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: StereoSdkApi> IntrinsicsSource for IntrinsicsReader<S> {
    fn intrinsics(&self, eye: Eye) -> Result<CameraIntrinsics> {
        let state = *self.state.lock();
        if !state.has_control_channel() {
            return Err(CameraError::InvalidState {
                operation: "get_intrinsics",
                state,
            });
        }
        self.sdk.camera_info(self.device, eye)
    }
}

/// An open session with one stereo unit.
pub struct DeviceSession<S: StereoSdkApi> {
    sdk: Arc<S>,
    device: DeviceHandle,
    serial: String,
    state: Arc<Mutex<SessionState>>,
    gate: Arc<CallbackGate>,
    options: Option<CaptureOptions>,
    projector: bool,
    front_light: bool,
}

impl<S: StereoSdkApi> DeviceSession<S> {
    /// Bind to the unit with the given serial number.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` if no such unit is present, `DeviceClaimed` if it is
    /// already bound.
    pub fn open(sdk: Arc<S>, serial: &str) -> Result<Self> {
        let device = sdk.open_device(serial)?;
        info!("Opened stereo device {serial}");
        Ok(Self {
            sdk,
            device,
            serial: serial.to_string(),
            state: Arc::new(Mutex::new(SessionState::Opened)),
            gate: Arc::new(CallbackGate::new()),
            options: None,
            projector: false,
            front_light: false,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Options applied by the last successful `configure_capture`.
    pub fn capture_options(&self) -> Option<&CaptureOptions> {
        self.options.as_ref()
    }

    pub fn projector_enabled(&self) -> bool {
        self.projector
    }

    pub fn front_light_enabled(&self) -> bool {
        self.front_light
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: impl Fn(SessionState) -> bool,
    ) -> Result<SessionState> {
        let state = self.state();
        if allowed(state) {
            Ok(state)
        } else {
            Err(CameraError::InvalidState { operation, state })
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Open the control link used for configuration and calibration queries.
    pub fn open_control_channel(&mut self) -> Result<()> {
        self.require("open_control_channel", |s| s == SessionState::Opened)?;
        self.sdk.open_tcp_port(self.device)?;
        self.set_state(SessionState::Connected);
        info!("Control channel open for {}", self.serial);
        Ok(())
    }

    /// Apply acquisition settings. Not allowed while streaming.
    pub fn configure_capture(&mut self, options: CaptureOptions) -> Result<()> {
        self.require("configure_capture", |s| {
            matches!(s, SessionState::Connected | SessionState::Stopped)
        })?;
        options.validate()?;
        self.sdk.configure_capture(self.device, &options)?;
        debug!("Capture configured for {}: {options:?}", self.serial);
        self.options = Some(options);
        Ok(())
    }

    pub fn enable_projector(&mut self, enabled: bool) -> Result<()> {
        self.require("enable_projector", SessionState::has_control_channel)?;
        self.sdk.enable_projector(self.device, enabled)?;
        self.projector = enabled;
        info!("Projector {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    pub fn enable_front_light(&mut self, enabled: bool) -> Result<()> {
        self.require("enable_front_light", SessionState::has_control_channel)?;
        self.sdk.enable_front_light(self.device, enabled)?;
        self.front_light = enabled;
        info!("Front light {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    /// Install the frame handler, replacing any previous one.
    pub fn register_frame_callback(&mut self, handler: FrameCallback) -> Result<()> {
        self.require("register_frame_callback", |s| s != SessionState::Closed)?;
        self.gate.replace(handler);
        let gate = Arc::clone(&self.gate);
        self.sdk.register_callback(
            self.device,
            Arc::new(move |triple: &FrameTriple| {
                gate.invoke(triple);
            }),
        )
    }

    /// Start acquisition. Callbacks begin only after this returns `Ok`.
    pub fn start(&mut self) -> Result<()> {
        self.require("start", |s| {
            matches!(s, SessionState::Connected | SessionState::Stopped)
        })?;
        if !self.gate.has_handler() {
            return Err(CameraError::Configuration(
                "no frame callback registered".to_string(),
            ));
        }
        // Frames delivered while the driver is still starting hit a closed
        // gate and are discarded.
        self.sdk.start(self.device)?;
        self.gate.open();
        self.set_state(SessionState::Streaming);
        info!("Acquisition started on {}", self.serial);
        Ok(())
    }

    /// Halt acquisition.
    ///
    /// Blocks until an in-flight callback has completed; no handler
    /// invocation begins after this returns. A no-op when not streaming.
    ///
    /// If the driver refuses to stop, the gate stays closed but the session
    /// remains `Streaming`, so a later `stop()` or `close()` retries.
    pub fn stop(&mut self) -> Result<()> {
        if self.state() != SessionState::Streaming {
            return Ok(());
        }
        self.gate.close();
        self.sdk.stop(self.device)?;
        self.set_state(SessionState::Stopped);
        info!("Acquisition stopped on {}", self.serial);
        Ok(())
    }

    /// Query the current calibration of one eye.
    pub fn get_intrinsics(&self, eye: Eye) -> Result<CameraIntrinsics> {
        self.intrinsics_reader().intrinsics(eye)
    }

    /// A reader sharing this session's driver binding.
    pub fn intrinsics_reader(&self) -> IntrinsicsReader<S> {
        IntrinsicsReader {
            sdk: Arc::clone(&self.sdk),
            device: self.device,
            state: Arc::clone(&self.state),
        }
    }

    /// Scoped close: stop callbacks, close the control channel, release the
    /// device. Each step runs even if an earlier one failed. Idempotent.
    pub fn close(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let state = self.state();
        if state == SessionState::Closed {
            return report;
        }

        report.record(TeardownStep::StopAcquisition, self.stop());
        drop(self.gate.take());
        report.record(
            TeardownStep::ClearCallback,
            self.sdk.clear_callback(self.device),
        );
        if state.has_control_channel() {
            report.record(
                TeardownStep::CloseControlChannel,
                self.sdk.close_tcp_port(self.device),
            );
        }
        report.record(TeardownStep::CloseDevice, self.sdk.close_device(self.device));

        self.set_state(SessionState::Closed);
        info!("Closed stereo device {}", self.serial);
        report
    }
}

impl<S: StereoSdkApi> IntrinsicsSource for DeviceSession<S> {
    fn intrinsics(&self, eye: Eye) -> Result<CameraIntrinsics> {
        self.get_intrinsics(eye)
    }
}

impl<S: StereoSdkApi> Drop for DeviceSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}
