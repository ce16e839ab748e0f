//! Background worker driving a tracking session from its own thread.
//!
//! The session itself is synchronous and blocking. [`CaptureWorker`] moves a
//! connected session into a dedicated thread and runs captures there, either
//! on request or at a fixed interval, so a render or UI loop never blocks on
//! the serial link.
//!
//! Captures are published as [`CaptureSnapshot`]s over a bounded status
//! channel of [`STATUS_QUEUE_DEPTH`] entries. When the consumer falls behind,
//! new updates are dropped; the newest snapshot is always kept in a shared
//! slot and returned by [`CaptureWorker::latest`]. Requests go through a
//! bounded channel (capacity 1): if a capture request is already pending,
//! further requests are dropped rather than queued.
//!
//! Stopping the worker hands the session back, still connected, so tools can
//! be registered before spawning a new worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::error::{CaptureError, Error, Result};
use crate::session::TrackingSession;
use crate::transport::Transport;
use crate::types::{Capture, ToolHandle, ToolNum, TransformStatus};

/// Maximum number of status updates buffered for the consumer.
pub const STATUS_QUEUE_DEPTH: usize = 8;

/// Command sent to the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerCommand {
    /// Run one capture now.
    Capture,
    /// Leave the loop and hand the session back.
    Stop,
}

/// A capture result together with the tool table it was taken against.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CaptureSnapshot {
    pub capture: Capture,
    pub tools: Vec<ToolHandle>,
}

impl CaptureSnapshot {
    /// Transform status of `tool` in this snapshot.
    pub fn status(&self, tool: ToolNum) -> Option<&TransformStatus> {
        self.capture.status(tool)
    }
}

/// Status update from the worker thread.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkerStatus {
    /// A capture completed.
    Captured(CaptureSnapshot),
    /// A capture failed; the worker keeps running.
    CaptureFailed(String),
    /// The device link is gone; the worker has stopped.
    ConnectionLost(String),
}

/// State the worker thread publishes regardless of channel backpressure.
#[derive(Default)]
struct Shared {
    latest: Mutex<Option<CaptureSnapshot>>,
    lost: AtomicBool,
}

impl Shared {
    fn store_latest(&self, snapshot: CaptureSnapshot) {
        match self.latest.lock() {
            Ok(mut slot) => *slot = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }

    fn load_latest(&self) -> Option<CaptureSnapshot> {
        match self.latest.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Background worker owning a [`TrackingSession`].
pub struct CaptureWorker<T>
where
    T: Transport + Send + 'static,
    T::Device: Send + 'static,
{
    command_tx: SyncSender<WorkerCommand>,
    status_rx: Receiver<WorkerStatus>,
    handle: Option<JoinHandle<TrackingSession<T>>>,
    shared: Arc<Shared>,
    latest: Option<CaptureSnapshot>,
}

impl<T> CaptureWorker<T>
where
    T: Transport + Send + 'static,
    T::Device: Send + 'static,
{
    /// Spawns a worker that captures only when [`request_capture`](Self::request_capture)
    /// is called.
    pub fn spawn(session: TrackingSession<T>) -> Self {
        Self::spawn_internal(session, None)
    }

    /// Spawns a worker that captures every `interval`, in addition to explicit requests.
    pub fn spawn_periodic(session: TrackingSession<T>, interval: Duration) -> Self {
        Self::spawn_internal(session, Some(interval))
    }

    fn spawn_internal(session: TrackingSession<T>, interval: Option<Duration>) -> Self {
        let (command_tx, command_rx) = mpsc::sync_channel::<WorkerCommand>(1);
        let (status_tx, status_rx) = mpsc::sync_channel::<WorkerStatus>(STATUS_QUEUE_DEPTH);
        let shared = Arc::new(Shared::default());

        let shared_for_loop = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            Self::worker_loop(session, interval, command_rx, status_tx, shared_for_loop)
        });

        Self {
            command_tx,
            status_rx,
            handle: Some(handle),
            shared,
            latest: None,
        }
    }

    /// Asks the worker for a capture.
    ///
    /// Returns `false` if a request is already pending or the worker stopped.
    pub fn request_capture(&self) -> bool {
        match self.command_tx.try_send(WorkerCommand::Capture) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Drains pending status updates and returns them in order.
    ///
    /// At most [`STATUS_QUEUE_DEPTH`] updates are returned; older ones may
    /// have been dropped. Also refreshes [`latest`](Self::latest).
    pub fn poll_status(&mut self) -> Vec<WorkerStatus> {
        let updates: Vec<WorkerStatus> = self.status_rx.try_iter().collect();
        self.latest = self.shared.load_latest();
        updates
    }

    /// Newest snapshot as of the last [`poll_status`](Self::poll_status),
    /// even if its `Captured` update was dropped.
    pub fn latest(&self) -> Option<&CaptureSnapshot> {
        self.latest.as_ref()
    }

    /// Returns true once the worker has stopped on a lost connection.
    pub fn is_connection_lost(&self) -> bool {
        self.shared.lost.load(Ordering::Acquire)
    }

    /// Stops the worker and returns the session.
    pub fn stop(mut self) -> Result<TrackingSession<T>> {
        let _ = self.command_tx.send(WorkerCommand::Stop);
        let handle = self.handle.take().ok_or(Error::WorkerStopped)?;
        handle.join().map_err(|_| Error::WorkerStopped)
    }

    fn worker_loop(
        mut session: TrackingSession<T>,
        interval: Option<Duration>,
        command_rx: Receiver<WorkerCommand>,
        status_tx: SyncSender<WorkerStatus>,
        shared: Arc<Shared>,
    ) -> TrackingSession<T> {
        loop {
            let command = match interval {
                Some(interval) => match command_rx.recv_timeout(interval) {
                    Ok(cmd) => cmd,
                    Err(RecvTimeoutError::Timeout) => WorkerCommand::Capture,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match command_rx.recv() {
                    Ok(cmd) => cmd,
                    Err(_) => break,
                },
            };

            if command == WorkerCommand::Stop {
                debug!("Polaris worker: stop requested");
                break;
            }

            match session.capture() {
                Ok(()) => {
                    let snapshot = CaptureSnapshot {
                        capture: session.last_capture().clone(),
                        tools: session.registered_tools().to_vec(),
                    };
                    shared.store_latest(snapshot.clone());
                    if !publish(&status_tx, WorkerStatus::Captured(snapshot)) {
                        break;
                    }
                }
                Err(e) if is_connection_loss(&e) => {
                    warn!("Polaris worker: connection lost: {}", e);
                    shared.lost.store(true, Ordering::Release);
                    publish(&status_tx, WorkerStatus::ConnectionLost(e.to_string()));
                    break;
                }
                Err(e) => {
                    if !publish(&status_tx, WorkerStatus::CaptureFailed(e.to_string())) {
                        break;
                    }
                }
            }
        }
        session
    }
}

/// Queues a status update without blocking. Returns false once the
/// consumer is gone.
fn publish(status_tx: &SyncSender<WorkerStatus>, status: WorkerStatus) -> bool {
    match status_tx.try_send(status) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Polaris worker: status queue full, update dropped");
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

fn is_connection_loss(err: &CaptureError) -> bool {
    match err {
        CaptureError::NotConnected => true,
        CaptureError::StartTrackingFailed(e) | CaptureError::CaptureFailed(e) => {
            e.is_disconnected()
        }
    }
}

impl<T> Drop for CaptureWorker<T>
where
    T: Transport + Send + 'static,
    T::Device: Send + 'static,
{
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.command_tx.send(WorkerCommand::Stop);
            let _ = handle.join();
        }
    }
}
