use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use super::source::FrameSource;
use crate::annotate::AnnotatedFrame;
use crate::detection::Measurer;
use crate::error::{MeasureError, Result};
use crate::models::Region;
use crate::selection::SelectionTracker;
use crate::settings::{MeasurementSettings, SharedSettings};

/// How long `halt` waits for the worker before giving up on it
pub const DEFAULT_HALT_TIMEOUT: Duration = Duration::from_secs(1);
/// Consecutive failed cycles that end a session
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

static STREAM_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Whether any stream session is running in this process
pub fn stream_active() -> bool {
    STREAM_ACTIVE.load(Ordering::Acquire)
}

/// Process-wide claim on the single stream slot, released on drop
struct StreamLease;

impl StreamLease {
    fn acquire() -> Result<Self> {
        STREAM_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| StreamLease)
            .map_err(|_| MeasureError::AlreadyActive)
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        STREAM_ACTIVE.store(false, Ordering::Release);
    }
}

/// Receives the output of every stream cycle
pub trait DisplaySink: Send + Sync {
    fn publish(&self, frame: AnnotatedFrame);

    /// Called once when a session ends; `cause` is set for a fatal stop or
    /// for a worker abandoned after the halt timeout
    fn stream_halted(&self, _cause: Option<&MeasureError>) {}
}

impl DisplaySink for mpsc::UnboundedSender<AnnotatedFrame> {
    fn publish(&self, frame: AnnotatedFrame) {
        // A closed receiver just means nobody is watching any more
        let _ = self.send(frame);
    }
}

/// Outcome of waiting for a session to halt
#[derive(Debug)]
pub enum HaltStatus {
    /// No session was running
    Idle,
    Halted,
    /// The session had already ended on its own with this cause
    Failed(MeasureError),
    /// The worker did not acknowledge in time and was abandoned
    TimedOut,
}

type SharedDevice = Arc<Mutex<Box<dyn FrameSource>>>;

struct ActiveSession {
    stop_tx: watch::Sender<bool>,
    worker: JoinHandle<Option<MeasureError>>,
}

/// Drives capture, measurement and publication on a fixed cadence, and the
/// freeze/select/calibrate flow on top of it.
pub struct StreamController {
    settings: SharedSettings,
    sink: Arc<dyn DisplaySink>,
    selection: SelectionTracker,
    device: Option<SharedDevice>,
    session: Option<ActiveSession>,
    halt_timeout: Duration,
}

impl StreamController {
    pub fn new(settings: SharedSettings, sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            settings,
            sink,
            selection: SelectionTracker::new(),
            device: None,
            session: None,
            halt_timeout: DEFAULT_HALT_TIMEOUT,
        }
    }

    pub fn with_halt_timeout(mut self, halt_timeout: Duration) -> Self {
        self.halt_timeout = halt_timeout;
        self
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.worker.is_finished())
    }

    /// Open `source` and start measuring it every `cadence`.
    ///
    /// Fails with `AlreadyActive` if any session is running in the process;
    /// the running session is left untouched.
    pub async fn start(&mut self, source: Box<dyn FrameSource>, cadence: Duration) -> Result<()> {
        self.reap_finished().await;

        let lease = StreamLease::acquire()?;
        if cadence.is_zero() {
            return Err(MeasureError::InvalidSetting {
                name: "cadence",
                reason: "must be greater than zero".to_string(),
            });
        }

        let device = self.replace_device(source)?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = tokio::spawn(run_session(
            lease,
            self.settings.clone(),
            device,
            Arc::clone(&self.sink),
            cadence,
            stop_rx,
        ));
        self.session = Some(ActiveSession { stop_tx, worker });
        info!("Stream started (cadence {:?})", cadence);
        Ok(())
    }

    /// Open `source` for single-shot use with [`freeze`](Self::freeze)
    /// without starting a stream.
    pub async fn attach(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        self.reap_finished().await;
        if self.is_active() {
            return Err(MeasureError::AlreadyActive);
        }
        self.replace_device(source).map(|_| ())
    }

    /// Signal the worker to stop after its current cycle and wait for it,
    /// at most the halt timeout. The capture device stays open.
    pub async fn halt(&mut self) -> HaltStatus {
        let Some(ActiveSession { stop_tx, mut worker }) = self.session.take() else {
            return HaltStatus::Idle;
        };
        // The worker may already be gone; that is fine
        let _ = stop_tx.send(true);

        match timeout(self.halt_timeout, &mut worker).await {
            Ok(Ok(None)) => {
                info!("Stream halted");
                HaltStatus::Halted
            }
            Ok(Ok(Some(cause))) => HaltStatus::Failed(cause),
            Ok(Err(e)) => HaltStatus::Failed(MeasureError::CycleAborted(e.to_string())),
            Err(_) => {
                warn!(
                    "Stream worker did not halt within {:?}; abandoning it",
                    self.halt_timeout
                );
                worker.abort();
                // The worker is parked on its blocking read, so the abort
                // lands at once and drops its lease.
                match worker.await {
                    Ok(None) => HaltStatus::Halted,
                    Ok(Some(cause)) => HaltStatus::Failed(cause),
                    Err(_) => {
                        let cause = MeasureError::CycleAborted(format!(
                            "worker did not halt within {:?}",
                            self.halt_timeout
                        ));
                        self.sink.stream_halted(Some(&cause));
                        HaltStatus::TimedOut
                    }
                }
            }
        }
    }

    /// Halt the stream and release the capture device
    pub async fn stop(&mut self) -> HaltStatus {
        let status = self.halt().await;
        self.release_device();
        status
    }

    /// Halt any running stream, measure one frame from the current device and
    /// make its regions the selection candidates.
    pub async fn freeze(&mut self) -> Result<AnnotatedFrame> {
        let status = self.halt().await;
        debug!("Freeze after halt: {:?}", status);

        let device = self.device.clone().ok_or_else(|| {
            MeasureError::DeviceUnavailable("no capture device attached".to_string())
        })?;
        let snapshot = self.settings.snapshot();
        let read = tokio::task::spawn_blocking(move || run_cycle(&device, &snapshot));
        let frozen = timeout(self.halt_timeout, read)
            .await
            .map_err(|_| {
                MeasureError::DeviceUnavailable(format!(
                    "no frame within {:?}; the device is still busy",
                    self.halt_timeout
                ))
            })?
            .map_err(|e| MeasureError::CycleAborted(e.to_string()))??;

        info!("Frozen frame: {} regions", frozen.regions.len());
        self.selection.commit(frozen.clone());
        Ok(frozen)
    }

    pub fn selection(&self) -> &SelectionTracker {
        &self.selection
    }

    pub fn select_at(&mut self, click_x: i64, click_y: i64) -> Option<&Region> {
        self.selection.select_at(click_x, click_y)
    }

    /// Calibrate from the selected region. The ratio reaches the stream
    /// worker on its next cycle.
    pub fn calibrate_selected(&self, real_width: f64) -> Result<f64> {
        let region = self.selection.selected().ok_or(MeasureError::NothingSelected)?;
        self.settings.set_reference(region, real_width)
    }

    async fn reap_finished(&mut self) {
        if self.session.as_ref().is_some_and(|s| s.worker.is_finished()) {
            if let HaltStatus::Failed(cause) = self.halt().await {
                debug!("Previous session ended with: {}", cause);
            }
        }
    }

    fn replace_device(&mut self, mut source: Box<dyn FrameSource>) -> Result<SharedDevice> {
        source.open()?;
        info!("Capture source: {}", source.describe());
        self.release_device();
        let device: SharedDevice = Arc::new(Mutex::new(source));
        self.device = Some(Arc::clone(&device));
        Ok(device)
    }

    /// Release the capture device without waiting on a read still in flight
    /// from an abandoned session; in that case the release happens on a
    /// blocking thread once the read returns.
    fn release_device(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        let busy = match device.try_lock() {
            Ok(mut source) => {
                source.release();
                false
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().release();
                false
            }
            Err(TryLockError::WouldBlock) => true,
        };
        if !busy {
            return;
        }

        debug!("Capture source busy; deferring release");
        let release = move || {
            device.lock().unwrap_or_else(PoisonError::into_inner).release();
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(release);
            }
            Err(_) => release(),
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        match self.session.take() {
            Some(session) => {
                let _ = session.stop_tx.send(true);
            }
            None => self.release_device(),
        }
    }
}

/// One capture and measurement. Runs on a blocking thread.
fn run_cycle(device: &SharedDevice, settings: &MeasurementSettings) -> Result<AnnotatedFrame> {
    let frame = device
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .read_frame()?;
    Measurer::new(settings).measure(frame)
}

async fn run_session(
    _lease: StreamLease,
    settings: SharedSettings,
    device: SharedDevice,
    sink: Arc<dyn DisplaySink>,
    cadence: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> Option<MeasureError> {
    let mut ticker = interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;
    let mut cycle = 0u64;

    let outcome = loop {
        let stop = tokio::select! {
            biased;
            changed = stop_rx.changed() => Some(changed),
            _ = ticker.tick() => None,
        };
        if let Some(changed) = stop {
            if changed.is_err() || *stop_rx.borrow_and_update() {
                break None;
            }
            continue;
        }

        // One snapshot per cycle
        let snapshot = settings.snapshot();
        let cycle_device = Arc::clone(&device);
        let result = tokio::task::spawn_blocking(move || run_cycle(&cycle_device, &snapshot))
            .await
            .unwrap_or_else(|e| Err(MeasureError::CycleAborted(e.to_string())));
        cycle += 1;

        match result {
            Ok(annotated) => {
                failures = 0;
                debug!("Cycle {}: {} regions", cycle, annotated.regions.len());
                sink.publish(annotated);
            }
            Err(e) => {
                failures += 1;
                warn!(
                    "Cycle {} skipped ({}/{}): {}",
                    cycle, failures, MAX_CONSECUTIVE_FAILURES, e
                );
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    error!("Stream stopped after {} consecutive failures", failures);
                    break Some(MeasureError::SessionFailed {
                        failures,
                        cause: Box::new(e),
                    });
                }
            }
        }
    };

    sink.stream_halted(outcome.as_ref());
    outcome
}
