//! Simulated stereo unit for running the node without hardware.
//!
//! Behaves like the vendor driver: it owns an acquisition thread that
//! produces synthetic triples at a fixed interval and calls the registered
//! handler on that thread. Enable via `ENSENSO_SIMULATED=1`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::camera::error::{CameraError, Result};

use super::api::{DeviceHandle, FrameCallback, StereoSdkApi};
use super::types::{
    Binning, CameraIntrinsics, CaptureOptions, Eye, FrameTriple, ImagePair, PointCloud, PointXyz,
    RawImage,
};

/// Environment switch selecting the simulated driver.
pub const SIMULATED_ENV: &str = "ENSENSO_SIMULATED";

/// Default delay between triples (~10 fps).
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Sensor size at binning 1.
const SENSOR_WIDTH: u32 = 320;
const SENSOR_HEIGHT: u32 = 256;

/// Focal length at binning 1, pixels.
const FOCAL_PX: f64 = 400.0;
/// Stereo baseline, metres.
const BASELINE_M: f64 = 0.1;

struct Acquisition {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

struct SimState {
    claimed: bool,
    tcp_open: bool,
    options: CaptureOptions,
    projector: bool,
    front_light: bool,
    acquisition: Option<Acquisition>,
}

/// Shared between the driver and its acquisition thread.
struct Shared {
    callback: Mutex<Option<FrameCallback>>,
    projector: AtomicBool,
}

pub struct SimulatedSdk {
    serial: String,
    interval: Duration,
    state: Mutex<SimState>,
    shared: Arc<Shared>,
}

impl SimulatedSdk {
    pub fn new(serial: impl Into<String>) -> Self {
        Self::with_interval(serial, DEFAULT_FRAME_INTERVAL)
    }

    /// Simulated unit with a custom frame interval (useful for testing).
    pub fn with_interval(serial: impl Into<String>, interval: Duration) -> Self {
        Self {
            serial: serial.into(),
            interval,
            state: Mutex::new(SimState {
                claimed: false,
                tcp_open: false,
                options: CaptureOptions::default(),
                projector: false,
                front_light: false,
                acquisition: None,
            }),
            shared: Arc::new(Shared {
                callback: Mutex::new(None),
                projector: AtomicBool::new(false),
            }),
        }
    }

    /// Check whether the simulated driver is requested via environment.
    pub fn is_enabled() -> bool {
        std::env::var(SIMULATED_ENV).is_ok_and(|v| v == "1")
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().acquisition.is_some()
    }

    pub fn front_light_enabled(&self) -> bool {
        self.state.lock().front_light
    }

    fn check_handle(&self, device: DeviceHandle) -> Result<()> {
        if device != DeviceHandle(0) {
            return Err(CameraError::DeviceNotFound(format!(
                "simulated device {}",
                device.0
            )));
        }
        Ok(())
    }

    fn connected(&self, device: DeviceHandle) -> Result<parking_lot::MutexGuard<'_, SimState>> {
        self.check_handle(device)?;
        let state = self.state.lock();
        if !state.tcp_open {
            return Err(CameraError::Connection("tcp port is not open".to_string()));
        }
        Ok(state)
    }
}

impl StereoSdkApi for SimulatedSdk {
    fn open_device(&self, serial: &str) -> Result<DeviceHandle> {
        if serial != self.serial {
            return Err(CameraError::DeviceNotFound(serial.to_string()));
        }
        let mut state = self.state.lock();
        if state.claimed {
            return Err(CameraError::DeviceClaimed(serial.to_string()));
        }
        state.claimed = true;
        info!("Simulated unit {serial} opened");
        Ok(DeviceHandle(0))
    }

    fn close_device(&self, device: DeviceHandle) -> Result<()> {
        self.check_handle(device)?;
        self.state.lock().claimed = false;
        Ok(())
    }

    fn open_tcp_port(&self, device: DeviceHandle) -> Result<()> {
        self.check_handle(device)?;
        self.state.lock().tcp_open = true;
        Ok(())
    }

    fn close_tcp_port(&self, device: DeviceHandle) -> Result<()> {
        self.check_handle(device)?;
        self.state.lock().tcp_open = false;
        Ok(())
    }

    fn configure_capture(&self, device: DeviceHandle, options: &CaptureOptions) -> Result<()> {
        self.connected(device)?.options = options.clone();
        Ok(())
    }

    fn enable_projector(&self, device: DeviceHandle, enabled: bool) -> Result<()> {
        self.connected(device)?.projector = enabled;
        self.shared.projector.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    fn enable_front_light(&self, device: DeviceHandle, enabled: bool) -> Result<()> {
        self.connected(device)?.front_light = enabled;
        Ok(())
    }

    fn register_callback(&self, device: DeviceHandle, callback: FrameCallback) -> Result<()> {
        self.check_handle(device)?;
        *self.shared.callback.lock() = Some(callback);
        Ok(())
    }

    fn clear_callback(&self, device: DeviceHandle) -> Result<()> {
        self.check_handle(device)?;
        *self.shared.callback.lock() = None;
        Ok(())
    }

    fn start(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.connected(device)?;
        if state.acquisition.is_some() {
            return Ok(());
        }

        let (width, height) = resolution(state.options.binning);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);
        let shared = Arc::clone(&self.shared);
        let interval = self.interval;

        let thread = std::thread::Builder::new()
            .name(format!("ensenso-sim-{}", self.serial))
            .spawn(move || acquire(&shared, &running_clone, width, height, interval))
            .map_err(|e| CameraError::Sdk(format!("failed to spawn acquisition thread: {e}")))?;

        state.acquisition = Some(Acquisition {
            running,
            thread: Some(thread),
        });
        debug!("Simulated acquisition started at {width}x{height}");
        Ok(())
    }

    fn stop(&self, device: DeviceHandle) -> Result<()> {
        self.check_handle(device)?;
        // Join with the state lock released; the thread never takes it.
        let acquisition = self.state.lock().acquisition.take();
        if let Some(mut acquisition) = acquisition {
            acquisition.running.store(false, Ordering::Relaxed);
            if let Some(handle) = acquisition.thread.take() {
                let _ = handle.join();
            }
            debug!("Simulated acquisition stopped");
        }
        Ok(())
    }

    fn camera_info(&self, device: DeviceHandle, eye: Eye) -> Result<CameraIntrinsics> {
        let state = self.connected(device)?;
        let (width, height) = resolution(state.options.binning);
        let scale = f64::from(SENSOR_WIDTH / width);
        let focal = FOCAL_PX / scale;
        let tx = match eye {
            Eye::Left => 0.0,
            Eye::Right => -focal * BASELINE_M,
        };
        Ok(CameraIntrinsics::pinhole(eye, width, height, focal, focal, tx))
    }
}

impl Drop for SimulatedSdk {
    fn drop(&mut self) {
        let _ = self.stop(DeviceHandle(0));
    }
}

fn resolution(binning: Binning) -> (u32, u32) {
    match binning {
        Binning::One => (SENSOR_WIDTH, SENSOR_HEIGHT),
        Binning::Two => (SENSOR_WIDTH / 2, SENSOR_HEIGHT / 2),
    }
}

/// Acquisition loop that runs on the simulated driver thread.
fn acquire(shared: &Shared, running: &AtomicBool, width: u32, height: u32, interval: Duration) {
    let mut seq: u64 = 0;
    while running.load(Ordering::Relaxed) {
        let triple = synthetic_triple(width, height, seq, shared.projector.load(Ordering::Relaxed));
        let callback = shared.callback.lock().clone();
        if let Some(callback) = callback {
            callback(&triple);
        }
        seq += 1;
        std::thread::sleep(interval);
    }
}

/// A scene of a tilted plane: a moving gradient in the images and a cloud
/// with an invalid border, like a real unit produces.
pub fn synthetic_triple(width: u32, height: u32, seq: u64, projector: bool) -> FrameTriple {
    let shift = (seq % 256) as u32;
    let image = |offset: u32| {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let mut value = (x + y + shift + offset) % 256;
                if projector && (x / 4) % 2 == 0 {
                    value = value.saturating_add(64).min(255);
                }
                data.push(value as u8);
            }
        }
        RawImage::new(width, height, "CV_8UC1", data)
    };

    let focal = FOCAL_PX as f32 * width as f32 / SENSOR_WIDTH as f32;
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let mut points = Vec::with_capacity((width * height) as usize);
    for v in 0..height {
        for u in 0..width {
            if u == 0 || v == 0 || u + 1 == width || v + 1 == height {
                points.push(PointXyz::new(f32::NAN, f32::NAN, f32::NAN));
                continue;
            }
            let z = 1.0 + 0.2 * (v as f32 / height as f32);
            points.push(PointXyz::new(
                (u as f32 - cx) * z / focal,
                (v as f32 - cy) * z / focal,
                z,
            ));
        }
    }

    FrameTriple {
        cloud: PointCloud {
            width,
            height,
            points,
        },
        raw: ImagePair {
            left: image(0),
            right: image(8),
        },
        rectified: ImagePair {
            left: image(0),
            right: image(0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn wait_for_hits(hits: &AtomicUsize, at_least: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while hits.load(Ordering::SeqCst) < at_least {
            assert!(Instant::now() < deadline, "no frames delivered");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn connected(sdk: &SimulatedSdk) -> DeviceHandle {
        let handle = sdk.open_device("150533").unwrap();
        sdk.open_tcp_port(handle).unwrap();
        handle
    }

    #[test]
    fn unknown_serial_is_not_found() {
        let sdk = SimulatedSdk::new("150533");
        assert!(matches!(
            sdk.open_device("1"),
            Err(CameraError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn second_open_is_claimed() {
        let sdk = SimulatedSdk::new("150533");
        sdk.open_device("150533").unwrap();
        assert!(matches!(
            sdk.open_device("150533"),
            Err(CameraError::DeviceClaimed(_))
        ));
    }

    #[test]
    fn intrinsics_need_control_channel() {
        let sdk = SimulatedSdk::new("150533");
        let handle = sdk.open_device("150533").unwrap();
        assert!(sdk.camera_info(handle, Eye::Left).is_err());
        sdk.open_tcp_port(handle).unwrap();
        let right = sdk.camera_info(handle, Eye::Right).unwrap();
        assert_eq!(right.eye, Eye::Right);
        assert!(right.p[3] < 0.0);
    }

    #[test]
    fn binning_halves_resolution() {
        let sdk = SimulatedSdk::new("150533");
        let handle = connected(&sdk);
        let options = CaptureOptions {
            binning: Binning::Two,
            ..CaptureOptions::default()
        };
        sdk.configure_capture(handle, &options).unwrap();
        let info = sdk.camera_info(handle, Eye::Left).unwrap();
        assert_eq!((info.width, info.height), (160, 128));
    }

    #[test]
    fn acquisition_thread_delivers_and_stops() {
        let sdk = SimulatedSdk::with_interval("150533", Duration::from_millis(5));
        let handle = connected(&sdk);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        sdk.register_callback(
            handle,
            Arc::new(move |triple: &FrameTriple| {
                assert_eq!(triple.cloud.points.len(), 320 * 256);
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        sdk.start(handle).unwrap();
        assert!(sdk.is_streaming());
        wait_for_hits(&hits, 2);

        sdk.stop(handle).unwrap();
        assert!(!sdk.is_streaming());
        let after_stop = hits.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(hits.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn synthetic_cloud_has_invalid_border() {
        let triple = synthetic_triple(8, 6, 0, false);
        assert_eq!(triple.cloud.points.len(), 48);
        assert!(!triple.cloud.is_dense());
        assert!(triple.cloud.points[9].is_finite());
        assert!(!triple.cloud.points[0].is_finite());
    }

    #[test]
    fn projector_adds_stripes() {
        let plain = synthetic_triple(16, 2, 0, false);
        let lit = synthetic_triple(16, 2, 0, true);
        assert_ne!(plain.raw.left.data, lit.raw.left.data);
        assert_eq!(plain.raw.left.data[4], lit.raw.left.data[4]);
    }
}
