//! Startup sequence and scoped teardown of one stereo node.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use crate::camera::api::StereoSdkApi;
use crate::camera::error::CameraError;
use crate::camera::session::{DeviceSession, TeardownReport};
use crate::camera::types::SessionState;
use crate::diagnostics::stats::{CaptureSnapshot, CaptureStats};
use crate::pipeline::dispatcher::FrameDispatcher;
use crate::pipeline::fanout::Fanout;
use crate::settings::store::ConfigError;
use crate::settings::types::NodeConfig;
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("initialization failed: {0}")]
    Initialization(#[from] CameraError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A streaming node: one device session publishing into one transport.
///
/// Dropping the node runs the session's scoped teardown.
pub struct StereoNode<S: StereoSdkApi + 'static, T: Transport + 'static> {
    session: DeviceSession<S>,
    transport: Arc<T>,
    stats: Arc<Mutex<CaptureStats>>,
}

impl<S: StereoSdkApi + 'static, T: Transport + 'static> StereoNode<S, T> {
    /// Bring the device up, then advertise channels and start streaming.
    ///
    /// `advertise` runs only after open, control channel, capture
    /// configuration and illumination have all succeeded, so an unreachable
    /// device never results in advertised channels. On any error the
    /// partially opened session is closed before returning.
    pub fn start<F>(sdk: Arc<S>, config: &NodeConfig, advertise: F) -> Result<Self, NodeError>
    where
        F: FnOnce(&NodeConfig) -> T,
    {
        let mut session = DeviceSession::open(sdk, &config.serial_no)?;
        session.open_control_channel()?;
        session.configure_capture(config.capture.clone())?;
        session.enable_projector(config.projector)?;
        session.enable_front_light(config.front_light)?;

        let transport = Arc::new(advertise(config));
        let stats = Arc::new(Mutex::new(CaptureStats::new()));
        let dispatcher = FrameDispatcher::new(
            session.intrinsics_reader(),
            Fanout::new(Arc::clone(&transport), config.camera_frame_id.clone()),
            Arc::clone(&stats),
        );
        session.register_frame_callback(dispatcher.into_callback())?;
        session.start()?;

        info!(
            "Node streaming from {} as {}",
            config.serial_no, config.camera_frame_id
        );
        Ok(Self {
            session,
            transport,
            stats,
        })
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn session(&self) -> &DeviceSession<S> {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn diagnostics(&self) -> CaptureSnapshot {
        self.stats.lock().snapshot()
    }

    /// Stop streaming and release the device.
    pub fn shutdown(mut self) -> TeardownReport {
        let report = self.session.close();
        if report.is_clean() {
            info!("Node shut down cleanly");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::{sample_triple, MockStereoSdk};
    use crate::camera::types::Eye;
    use crate::transport::recording::RecordingTransport;
    use crate::transport::Channel;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn config() -> NodeConfig {
        NodeConfig {
            projector: true,
            ..NodeConfig::default()
        }
    }

    fn mock() -> Arc<MockStereoSdk> {
        Arc::new(MockStereoSdk::new().with_calibrated_device("150533", 8, 6))
    }

    #[test]
    fn start_runs_bring_up_in_order() {
        let sdk = mock();
        let node = StereoNode::start(Arc::clone(&sdk), &config(), |_| RecordingTransport::new())
            .unwrap();
        assert_eq!(node.state(), SessionState::Streaming);
        assert_eq!(
            sdk.calls(),
            vec![
                "open_device",
                "open_tcp_port",
                "configure_capture",
                "enable_projector",
                "enable_front_light",
                "register_callback",
                "start"
            ]
        );
        assert!(node.session().projector_enabled());
        assert!(!node.session().front_light_enabled());
    }

    #[test]
    fn unreachable_device_never_advertises() {
        let sdk = Arc::new(MockStereoSdk::new().with_device("999999"));
        let advertised = AtomicBool::new(false);
        let result = StereoNode::start(sdk, &config(), |_| {
            advertised.store(true, Ordering::SeqCst);
            RecordingTransport::new()
        });
        assert!(matches!(
            result,
            Err(NodeError::Initialization(CameraError::DeviceNotFound(_)))
        ));
        assert!(!advertised.load(Ordering::SeqCst));
    }

    #[test]
    fn control_channel_failure_aborts_and_releases_device() {
        let sdk = Arc::new(
            MockStereoSdk::new()
                .with_calibrated_device("150533", 8, 6)
                .with_error("open_tcp_port", CameraError::Connection("refused".to_string())),
        );
        let advertised = AtomicBool::new(false);
        let result = StereoNode::start(Arc::clone(&sdk), &config(), |_| {
            advertised.store(true, Ordering::SeqCst);
            RecordingTransport::new()
        });
        assert!(result.is_err());
        assert!(!advertised.load(Ordering::SeqCst));
        assert_eq!(sdk.calls().last(), Some(&"close_device"));
    }

    #[test]
    fn frames_flow_into_transport_and_stats() {
        let sdk = mock();
        let node = StereoNode::start(Arc::clone(&sdk), &config(), |_| RecordingTransport::new())
            .unwrap();
        assert!(sdk.fire_frame(&sample_triple(8, 6)));

        assert_eq!(node.transport().channels(), Channel::ALL.to_vec());
        let snapshot = node.diagnostics();
        assert_eq!(snapshot.triple_count, 1);
        assert_eq!(snapshot.dropped_count, 0);
    }

    #[test]
    fn intrinsics_failure_mid_stream_is_contained() {
        let sdk = mock();
        let node = StereoNode::start(Arc::clone(&sdk), &config(), |_| RecordingTransport::new())
            .unwrap();
        sdk.inject_error("camera_info", CameraError::NotCalibrated { eye: Eye::Left });
        assert!(sdk.fire_frame(&sample_triple(8, 6)));

        assert_eq!(node.transport().channels().len(), 4);
        assert_eq!(node.diagnostics().dropped_count, 1);
        assert_eq!(node.state(), SessionState::Streaming);
    }

    #[test]
    fn shutdown_tears_down_and_stops_delivery() {
        let sdk = mock();
        let node = StereoNode::start(Arc::clone(&sdk), &config(), |_| RecordingTransport::new())
            .unwrap();
        let transport = Arc::clone(node.transport());
        let report = node.shutdown();
        assert!(report.is_clean());
        assert!(!sdk.fire_frame(&sample_triple(8, 6)));
        assert!(transport.published().is_empty());
        assert!(sdk.installed_callback().is_none());
    }

    #[test]
    fn drop_releases_the_device() {
        let sdk = mock();
        {
            let _node =
                StereoNode::start(Arc::clone(&sdk), &config(), |_| RecordingTransport::new())
                    .unwrap();
        }
        let tail: Vec<_> = sdk.calls().into_iter().rev().take(4).collect();
        assert_eq!(
            tail,
            vec!["close_device", "close_tcp_port", "clear_callback", "stop"]
        );
    }
}
