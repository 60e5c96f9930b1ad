//! Per-triple entry point on the driver's acquisition thread.
//!
//! Every artifact is attempted independently: a failure is logged, counted
//! and recorded in the report, then the next artifact is tried. Nothing is
//! propagated back into the driver thread, panics included.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::camera::api::FrameCallback;
use crate::camera::session::IntrinsicsSource;
use crate::camera::types::{Eye, FrameTriple};
use crate::diagnostics::stats::CaptureStats;
use crate::transport::{Channel, Transport};

use super::error::CaptureError;
use super::fanout::Fanout;
use super::messages::Stamp;

/// Outcome of one artifact of a triple.
#[derive(Debug)]
pub struct ArtifactOutcome {
    pub channel: Channel,
    /// Bytes handed to the transport, or why the artifact was dropped.
    pub result: Result<usize, CaptureError>,
}

/// What happened to each artifact of one triple, in emission order.
#[derive(Debug)]
pub struct DispatchReport {
    pub stamp: Stamp,
    pub outcomes: Vec<ArtifactOutcome>,
}

impl DispatchReport {
    pub fn published(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn dropped(&self) -> usize {
        self.outcomes.len() - self.published()
    }

    pub fn is_complete(&self) -> bool {
        self.dropped() == 0
    }

    pub fn outcome(&self, channel: Channel) -> Option<&ArtifactOutcome> {
        self.outcomes.iter().find(|o| o.channel == channel)
    }
}

pub struct FrameDispatcher<I: IntrinsicsSource, T: Transport> {
    intrinsics: I,
    fanout: Fanout<T>,
    stats: Arc<Mutex<CaptureStats>>,
}

impl<I: IntrinsicsSource, T: Transport> FrameDispatcher<I, T> {
    pub fn new(intrinsics: I, fanout: Fanout<T>, stats: Arc<Mutex<CaptureStats>>) -> Self {
        Self {
            intrinsics,
            fanout,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<Mutex<CaptureStats>> {
        &self.stats
    }

    /// Fan out one triple, stamped with the current time.
    pub fn dispatch(&self, triple: &FrameTriple) -> DispatchReport {
        self.dispatch_at(triple, Stamp::now())
    }

    /// Fan out one triple with every artifact carrying `stamp`.
    pub fn dispatch_at(&self, triple: &FrameTriple, stamp: Stamp) -> DispatchReport {
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(Channel::ALL.len());

        // Calibration is read fresh for every triple; it can change at runtime.
        let intrinsics = Eye::BOTH.map(|eye| {
            self.intrinsics
                .intrinsics(eye)
                .map_err(|source| CaptureError::Intrinsics { eye, source })
        });

        for (eye, intrinsics) in Eye::BOTH.into_iter().zip(intrinsics) {
            let result = intrinsics.and_then(|intrinsics| {
                self.fanout
                    .publish_raw(eye, triple.raw.get(eye), intrinsics, stamp)
            });
            outcomes.push(ArtifactOutcome {
                channel: Channel::raw(eye),
                result,
            });
        }

        for eye in Eye::BOTH {
            outcomes.push(ArtifactOutcome {
                channel: Channel::rectified(eye),
                result: self
                    .fanout
                    .publish_rectified(eye, triple.rectified.get(eye), stamp),
            });
        }

        outcomes.push(ArtifactOutcome {
            channel: Channel::Points,
            result: self.fanout.publish_cloud(&triple.cloud, stamp),
        });

        let report = DispatchReport { stamp, outcomes };
        self.record(&report, started);
        report
    }

    fn record(&self, report: &DispatchReport, started: Instant) {
        let mut stats = self.stats.lock();
        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(bytes) => stats.record_published(*bytes),
                Err(err) => {
                    warn!("Dropped {} artifact: {err}", outcome.channel);
                    stats.record_drop();
                }
            }
        }
        stats.record_triple(started.elapsed());
        debug!(
            "Dispatched triple at {}.{:09}: {} published, {} dropped",
            report.stamp.sec,
            report.stamp.nanosec,
            report.published(),
            report.dropped()
        );
    }
}

impl<I, T> FrameDispatcher<I, T>
where
    I: IntrinsicsSource + 'static,
    T: Transport + 'static,
{
    /// Wrap the dispatcher into a driver frame handler.
    pub fn into_callback(self) -> FrameCallback {
        let dispatcher = Arc::new(self);
        Arc::new(move |triple: &FrameTriple| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(triple)));
            if result.is_err() {
                error!("Frame dispatch panicked; triple discarded");
                dispatcher.stats.lock().record_drop();
            }
        })
    }
}
