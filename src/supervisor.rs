//! Worker supervision.
//!
//! Each worker gets a dedicated OS thread running a single-threaded tokio
//! runtime, so a misbehaving link or decoder cannot stall the caller or
//! another transport. The supervisor launches the thread, probes it for an
//! early exit, and tears it down in two steps: a cooperative stop through the
//! worker's shutdown token, then a forced abort that drops the worker's
//! future on its own runtime.
//!
//! A worker that blocks its thread outright (never yielding to the runtime)
//! cannot be aborted. `stop` then reports [`SupervisorError::StopFailed`] and
//! keeps the handle, so calling `stop` again later can still reap it.

use std::{
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    mailbox::Mailbox,
    tracing::prelude::*,
    worker::{TransportWorker, WorkerContext, WorkerPhase, WorkerStatus},
};

/// How long a cooperative stop may take before the worker is aborted.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(3);

/// How long an aborted worker may take to unwind.
pub const DEFAULT_ABORT_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor view of a worker's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// Worker exited inside the probe window
    StartFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("worker failed to start: {0}")]
    StartFailed(String),

    #[error("worker did not stop: {0}")]
    StopFailed(String),

    #[error("worker already running")]
    AlreadyRunning,
}

struct RunningWorker {
    shutdown: CancellationToken,
    abort: CancellationToken,
    status: Arc<WorkerStatus>,
    exit_rx: mpsc::Receiver<Result<()>>,
    handle: JoinHandle<()>,
}

impl RunningWorker {
    /// Wait up to `timeout` for the worker thread to report its exit.
    ///
    /// `Some` carries the exit result; a thread that died without reporting
    /// panicked.
    fn wait_exit(&self, timeout: Duration) -> Option<Result<()>> {
        match self.exit_rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Some(Err(Error::Other("worker thread panicked".into())))
            }
        }
    }

    fn join(self, name: &str) {
        if self.handle.join().is_err() {
            error!(worker = name, "Worker thread panicked");
        }
    }
}

/// Runs one worker at a time on its own thread.
pub struct Supervisor {
    name: String,
    grace: Duration,
    abort_timeout: Duration,
    state: LifecycleState,
    running: Option<RunningWorker>,
}

impl Supervisor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grace: DEFAULT_GRACE,
            abort_timeout: DEFAULT_ABORT_TIMEOUT,
            state: LifecycleState::Idle,
            running: None,
        }
    }

    /// Override the stop timings.
    pub fn with_timing(mut self, grace: Duration, abort_timeout: Duration) -> Self {
        self.grace = grace;
        self.abort_timeout = abort_timeout;
        self
    }

    /// Launch `worker` and wait out its probe window.
    ///
    /// A worker that exits inside the window, for any reason, counts as a
    /// failed start. `mailbox` is closed in that case.
    pub fn start(
        &mut self,
        worker: Box<dyn TransportWorker>,
        mailbox: Arc<Mailbox>,
    ) -> std::result::Result<(), SupervisorError> {
        self.reap();
        if self.running.is_some() {
            warn!(worker = %self.name, "Start requested while a worker is running");
            return Err(SupervisorError::AlreadyRunning);
        }

        self.state = LifecycleState::Starting;
        let probe_window = worker.probe_window();
        let ctx = WorkerContext::new(Arc::clone(&mailbox));
        let shutdown = ctx.shutdown.clone();
        let status = Arc::clone(&ctx.status);
        let abort = CancellationToken::new();
        let (exit_tx, exit_rx) = mpsc::channel();

        let thread_abort = abort.clone();
        let closer = CloseOnDrop(Arc::clone(&status));
        let spawned = thread::Builder::new()
            .name(format!("skinsense-{}", worker.name()))
            .spawn(move || {
                let result = run_isolated(worker, ctx, thread_abort);
                drop(closer);
                trace!("Worker thread exiting");
                // Receiver may already be gone if the supervisor was dropped
                let _ = exit_tx.send(result);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(worker = %self.name, error = %e, "Failed to spawn worker thread");
                mailbox.close();
                self.state = LifecycleState::StartFailed;
                return Err(SupervisorError::StartFailed(e.to_string()));
            }
        };

        let running = RunningWorker {
            shutdown,
            abort,
            status,
            exit_rx,
            handle,
        };

        match running.wait_exit(probe_window) {
            None => {
                debug!(worker = %self.name, window = ?probe_window, "Worker survived probe window");
                self.state = LifecycleState::Running;
                self.running = Some(running);
                Ok(())
            }
            Some(result) => {
                running.join(&self.name);
                mailbox.close();
                self.state = LifecycleState::StartFailed;
                let reason = match result {
                    Ok(()) => "worker exited during startup".to_string(),
                    Err(e) => e.to_string(),
                };
                error!(worker = %self.name, reason = %reason, "Worker failed to start");
                Err(SupervisorError::StartFailed(reason))
            }
        }
    }

    /// Stop the worker, escalating to an abort if it does not cooperate.
    ///
    /// Stopping with no worker is a no-op.
    pub fn stop(&mut self) -> std::result::Result<(), SupervisorError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        self.state = LifecycleState::Stopping;

        running.shutdown.cancel();
        let exit = match running.wait_exit(self.grace) {
            Some(result) => Some(result),
            None => {
                warn!(worker = %self.name, grace = ?self.grace, "Worker ignored stop, aborting");
                running.abort.cancel();
                running.wait_exit(self.abort_timeout)
            }
        };

        let Some(result) = exit else {
            error!(worker = %self.name, "Worker thread did not exit after abort");
            self.state = LifecycleState::Running;
            self.running = Some(running);
            return Err(SupervisorError::StopFailed(format!(
                "{} worker still running after abort",
                self.name
            )));
        };

        running.join(&self.name);
        self.state = LifecycleState::Stopped;
        match result {
            Ok(()) => info!(worker = %self.name, "Worker stopped"),
            Err(Error::Aborted) => warn!(worker = %self.name, "Worker aborted"),
            Err(e) => warn!(worker = %self.name, error = %e, "Worker exited with error"),
        }
        Ok(())
    }

    /// Worker has entered its loop and not yet exited.
    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.status.is_live())
    }

    /// Link layer has confirmed the connection (BLE) or the port is open.
    pub fn is_link_established(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.status.link_established())
    }

    pub fn state(&self) -> LifecycleState {
        match self.state {
            // Worker died on its own after the probe window
            LifecycleState::Running if !self.is_running() => LifecycleState::Stopped,
            state => state,
        }
    }

    /// Collect a worker that has already exited on its own.
    fn reap(&mut self) {
        let exited = match &self.running {
            Some(running) => running.wait_exit(Duration::ZERO),
            None => return,
        };
        let Some(result) = exited else {
            return;
        };
        if let Some(running) = self.running.take() {
            running.join(&self.name);
        }
        self.state = LifecycleState::Stopped;
        if let Err(e) = result {
            warn!(worker = %self.name, error = %e, "Previous worker had exited");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            debug!(worker = %self.name, "Supervisor dropped, requesting worker shutdown");
            running.shutdown.cancel();
        }
    }
}

/// Marks the worker `Closed` when its thread finishes, panics included.
struct CloseOnDrop(Arc<WorkerStatus>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.set_phase(WorkerPhase::Closed);
    }
}

/// Body of a worker thread.
fn run_isolated(
    worker: Box<dyn TransportWorker>,
    ctx: WorkerContext,
    abort: CancellationToken,
) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        tokio::select! {
            biased;
            _ = abort.cancelled() => Err(Error::Aborted),
            result = worker.run(ctx) => result,
        }
    })
}
