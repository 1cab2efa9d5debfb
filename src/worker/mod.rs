//! Per-transport acquisition workers.
//!
//! A worker owns one physical link for the lifetime of one connection. It
//! opens the link, reads and decodes records until asked to stop, publishes
//! each frame into the shared [`Mailbox`], and releases the link on the way
//! out. Workers are driven by the [`Supervisor`](crate::supervisor::Supervisor),
//! which gives each one a dedicated OS thread and single-threaded runtime.
//!
//! # Failure Semantics
//!
//! - Failing to open or connect the link ends the worker immediately.
//! - A malformed record is logged and skipped.
//! - Read timeouts and I/O errors are logged and skipped until the
//!   configured number happen in a row, which ends the worker.
//! - A closed mailbox ends the worker (nobody is listening any more).

pub mod ble;
pub mod bt;
pub mod sim;
pub mod usb;

mod poll;

pub use ble::BleWorker;
pub use bt::BtWorker;
pub use sim::SimWorker;
pub use usb::UsbWorker;

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{error::Result, frame::Frame, mailbox::Mailbox, tracing::prelude::*};

/// How long the supervisor waits for a serial worker to fail on startup.
pub const SERIAL_PROBE_WINDOW: Duration = Duration::from_secs(1);

/// BLE needs longer: scanning and connecting happen before the first frame.
pub const BLE_PROBE_WINDOW: Duration = Duration::from_secs(5);

/// Where a worker is in its own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    NotStarted,
    /// Opening or connecting the link
    Opening,
    /// Request/response acquisition loop
    Polling,
    /// Waiting on notifications
    Listening,
    /// Stop observed, releasing the link
    Draining,
    Closed,
}

/// Worker state shared with the supervisor.
///
/// The worker is the only writer, except that the supervisor marks a worker
/// `Closed` once its thread has returned, whichever way it returned.
#[derive(Debug)]
pub struct WorkerStatus {
    phase: Mutex<WorkerPhase>,
    link_established: AtomicBool,
}

impl WorkerStatus {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(WorkerPhase::NotStarted),
            link_established: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_phase(&self, phase: WorkerPhase) {
        let mut current = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if *current != phase {
            trace!(from = ?*current, to = ?phase, "Worker phase");
            *current = phase;
        }
        if phase == WorkerPhase::Closed {
            self.link_established.store(false, Ordering::Release);
        }
    }

    /// Set from loop entry until the worker has fully exited.
    pub fn is_live(&self) -> bool {
        !matches!(self.phase(), WorkerPhase::NotStarted | WorkerPhase::Closed)
    }

    /// Set once the link layer has confirmed the connection.
    pub fn link_established(&self) -> bool {
        self.link_established.load(Ordering::Acquire)
    }

    pub fn set_link_established(&self, established: bool) {
        self.link_established.store(established, Ordering::Release);
    }
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a running worker shares with the outside.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub mailbox: Arc<Mailbox>,
    pub shutdown: CancellationToken,
    pub status: Arc<WorkerStatus>,
}

impl WorkerContext {
    pub fn new(mailbox: Arc<Mailbox>) -> Self {
        Self {
            mailbox,
            shutdown: CancellationToken::new(),
            status: Arc::new(WorkerStatus::new()),
        }
    }

    /// Publish a frame, dropping it if the consumer has not taken the last one.
    pub fn publish(&self, frame: Frame) -> Result<()> {
        if !self.mailbox.publish(frame)? {
            trace!("Mailbox occupied, frame dropped");
        }
        Ok(())
    }

    /// Run `fut` unless shutdown is requested first.
    pub async fn until_shutdown<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

/// One transport's acquisition loop.
#[async_trait]
pub trait TransportWorker: Send + 'static {
    /// Short transport name, used to name the worker thread.
    fn name(&self) -> &str;

    /// How long a start must survive before it is considered successful.
    fn probe_window(&self) -> Duration {
        SERIAL_PROBE_WINDOW
    }

    /// Acquire until `ctx.shutdown` is cancelled or the link fails.
    ///
    /// Returns `Ok(())` after a requested stop.
    async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_follows_phase() {
        let status = WorkerStatus::new();
        assert!(!status.is_live());

        for phase in [
            WorkerPhase::Opening,
            WorkerPhase::Polling,
            WorkerPhase::Listening,
            WorkerPhase::Draining,
        ] {
            status.set_phase(phase);
            assert!(status.is_live(), "{phase:?} should be live");
        }

        status.set_phase(WorkerPhase::Closed);
        assert!(!status.is_live());
    }

    #[test]
    fn test_closing_clears_link_flag() {
        let status = WorkerStatus::new();
        status.set_link_established(true);
        status.set_phase(WorkerPhase::Listening);
        assert!(status.link_established());

        status.set_phase(WorkerPhase::Closed);
        assert!(!status.link_established());
    }

    #[tokio::test]
    async fn test_until_shutdown_prefers_shutdown() {
        let ctx = WorkerContext::new(Arc::new(Mailbox::new()));
        assert_eq!(ctx.until_shutdown(async { 7 }).await, Some(7));

        ctx.shutdown.cancel();
        assert_eq!(ctx.until_shutdown(async { 7 }).await, None);
    }
}
