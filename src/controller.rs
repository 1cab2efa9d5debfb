//! Connection façade for a UI or CLI.
//!
//! Callers see booleans: `connect` and `disconnect` log whatever went wrong
//! and report whether it worked. A failed `disconnect` leaves the worker in
//! place so the caller can try again.

use std::{fmt, str::FromStr, sync::Arc};

use crate::{
    config::{BleConfig, Config, SerialConfig, SimConfig},
    mailbox::Mailbox,
    supervisor::{LifecycleState, Supervisor},
    tracing::prelude::*,
    worker::{BleWorker, BtWorker, SimWorker, TransportWorker, UsbWorker},
};

/// Physical (or simulated) transport behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum TransportKind {
    /// BT-classic serial temperature sensor
    Bt,
    /// USB serial skin array
    Usb,
    /// BLE pressure array
    Ble,
    /// Random frames, no hardware
    Sim,
}

impl TransportKind {
    pub const ALL: [TransportKind; 4] = [Self::Bt, Self::Usb, Self::Ble, Self::Sim];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bt => "bt",
            Self::Usb => "usb",
            Self::Ble => "ble",
            Self::Sim => "sim",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown transport '{}'", s))
    }
}

/// Builds a fresh worker for each connection attempt.
pub type WorkerFactory = Box<dyn Fn() -> Box<dyn TransportWorker> + Send>;

/// Connects and disconnects one transport.
pub struct ConnectionController {
    kind: TransportKind,
    factory: WorkerFactory,
    supervisor: Supervisor,
    mailbox: Option<Arc<Mailbox>>,
}

impl ConnectionController {
    pub fn with_factory(kind: TransportKind, factory: WorkerFactory) -> Self {
        Self {
            kind,
            factory,
            supervisor: Supervisor::new(kind.as_str()),
            mailbox: None,
        }
    }

    pub fn bt(config: SerialConfig) -> Self {
        Self::with_factory(
            TransportKind::Bt,
            Box::new(move || -> Box<dyn TransportWorker> {
                Box::new(BtWorker::new(config.clone()))
            }),
        )
    }

    pub fn usb(config: SerialConfig) -> Self {
        Self::with_factory(
            TransportKind::Usb,
            Box::new(move || -> Box<dyn TransportWorker> {
                Box::new(UsbWorker::new(config.clone()))
            }),
        )
    }

    pub fn ble(config: BleConfig) -> Self {
        Self::with_factory(
            TransportKind::Ble,
            Box::new(move || -> Box<dyn TransportWorker> {
                Box::new(BleWorker::new(config.clone()))
            }),
        )
    }

    pub fn sim(config: SimConfig) -> Self {
        Self::with_factory(
            TransportKind::Sim,
            Box::new(move || -> Box<dyn TransportWorker> {
                Box::new(SimWorker::new(config.clone()))
            }),
        )
    }

    pub fn for_kind(kind: TransportKind, config: &Config) -> Self {
        match kind {
            TransportKind::Bt => Self::bt(config.bt.clone()),
            TransportKind::Usb => Self::usb(config.usb.clone()),
            TransportKind::Ble => Self::ble(config.ble.clone()),
            TransportKind::Sim => Self::sim(config.sim.clone()),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Start a worker publishing into `mailbox`.
    ///
    /// Blocks for the worker's probe window. On failure the mailbox has been
    /// closed and must be replaced before the next attempt.
    pub fn connect(&mut self, mailbox: Arc<Mailbox>) -> bool {
        info!(transport = %self.kind, "Connecting");
        match self.supervisor.start((self.factory)(), Arc::clone(&mailbox)) {
            Ok(()) => {
                info!(transport = %self.kind, "Connected");
                self.mailbox = Some(mailbox);
                true
            }
            Err(e) => {
                error!(transport = %self.kind, error = %e, "Connection failed");
                false
            }
        }
    }

    /// Stop the worker. Returns true if nothing is left running.
    pub fn disconnect(&mut self) -> bool {
        match self.supervisor.stop() {
            Ok(()) => {
                if self.mailbox.take().is_some() {
                    info!(transport = %self.kind, "Disconnected");
                }
                true
            }
            Err(e) => {
                error!(transport = %self.kind, error = %e, "Disconnect failed, retry possible");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    pub fn is_link_established(&self) -> bool {
        self.supervisor.is_link_established()
    }

    pub fn state(&self) -> LifecycleState {
        self.supervisor.state()
    }

    /// Mailbox of the current connection, if any.
    pub fn mailbox(&self) -> Option<&Arc<Mailbox>> {
        self.mailbox.as_ref()
    }
}

impl fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionController")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// One controller per transport, at most one of them live.
#[derive(Debug)]
pub struct Connections {
    controllers: Vec<ConnectionController>,
}

impl Connections {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            TransportKind::ALL
                .into_iter()
                .map(|kind| ConnectionController::for_kind(kind, config))
                .collect(),
        )
    }

    pub fn new(controllers: Vec<ConnectionController>) -> Self {
        Self { controllers }
    }

    fn get_mut(&mut self, kind: TransportKind) -> Option<&mut ConnectionController> {
        self.controllers.iter_mut().find(|c| c.kind == kind)
    }

    /// Transport whose worker is currently live.
    pub fn active(&self) -> Option<TransportKind> {
        self.controllers
            .iter()
            .find(|c| c.is_running())
            .map(|c| c.kind)
    }

    /// Connect `kind`, unless another transport is already live.
    pub fn connect(&mut self, kind: TransportKind, mailbox: Arc<Mailbox>) -> bool {
        if let Some(active) = self.active().filter(|active| *active != kind) {
            warn!(requested = %kind, active = %active, "Another transport is connected");
            return false;
        }
        match self.get_mut(kind) {
            Some(controller) => controller.connect(mailbox),
            None => {
                warn!(transport = %kind, "Transport not configured");
                false
            }
        }
    }

    pub fn disconnect(&mut self, kind: TransportKind) -> bool {
        self.get_mut(kind).map_or(true, |c| c.disconnect())
    }

    /// Disconnect every live transport. Returns true if all of them stopped.
    pub fn disconnect_all(&mut self) -> bool {
        let mut all_stopped = true;
        for controller in self.controllers.iter_mut().filter(|c| c.is_running()) {
            all_stopped &= controller.disconnect();
        }
        all_stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{Error, Result},
        frame::Frame,
        worker::{WorkerContext, WorkerPhase},
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct TestWorker {
        fail: bool,
    }

    #[async_trait]
    impl TransportWorker for TestWorker {
        fn name(&self) -> &str {
            "test"
        }

        fn probe_window(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<()> {
            if self.fail {
                return Err(Error::LinkUnavailable("unplugged".into()));
            }
            ctx.status.set_phase(WorkerPhase::Polling);
            ctx.shutdown.cancelled().await;
            Ok(())
        }
    }

    fn controller(kind: TransportKind, fail: bool) -> ConnectionController {
        ConnectionController::with_factory(
            kind,
            Box::new(move || -> Box<dyn TransportWorker> { Box::new(TestWorker { fail }) }),
        )
    }

    #[test]
    fn test_transport_kind_parses() {
        assert_eq!("usb".parse::<TransportKind>(), Ok(TransportKind::Usb));
        assert_eq!("BLE".parse::<TransportKind>(), Ok(TransportKind::Ble));
        assert!("wifi".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::Sim.to_string(), "sim");
    }

    #[test]
    fn test_connect_and_disconnect() {
        let mut c = controller(TransportKind::Bt, false);
        let mailbox = Arc::new(Mailbox::new());

        assert!(c.connect(Arc::clone(&mailbox)));
        assert!(c.is_running());
        assert!(c.mailbox().is_some());

        assert!(c.disconnect());
        assert!(!c.is_running());
        assert!(c.mailbox().is_none());
        assert!(!mailbox.is_closed());
    }

    #[test]
    fn test_failed_connect_closes_mailbox() {
        let mut c = controller(TransportKind::Usb, true);
        let mailbox = Arc::new(Mailbox::new());

        assert!(!c.connect(Arc::clone(&mailbox)));
        assert!(!c.is_running());
        assert!(mailbox.is_closed());
        assert_eq!(c.state(), LifecycleState::StartFailed);

        // Nothing to tear down
        assert!(c.disconnect());
    }

    #[test]
    fn test_missing_serial_port_fails_connect() {
        let mut c = ConnectionController::bt(SerialConfig::new("/dev/skinsense-missing", 9600));
        let mailbox = Arc::new(Mailbox::new());

        assert!(!c.connect(Arc::clone(&mailbox)));
        assert!(mailbox.is_closed());
    }

    #[test]
    fn test_sim_connection_delivers_frames() {
        let mut c = ConnectionController::sim(SimConfig::default());
        let mailbox = Arc::new(Mailbox::new());

        assert!(c.connect(Arc::clone(&mailbox)));
        assert!(c.is_link_established());

        std::thread::sleep(Duration::from_millis(100));
        assert!(matches!(mailbox.try_take().unwrap(), Some(Frame::Pressure(_))));

        assert!(c.disconnect());
    }

    #[test]
    fn test_only_one_transport_active() {
        let mut connections = Connections::new(vec![
            controller(TransportKind::Bt, false),
            controller(TransportKind::Usb, false),
        ]);

        assert!(connections.connect(TransportKind::Bt, Arc::new(Mailbox::new())));
        assert_eq!(connections.active(), Some(TransportKind::Bt));

        assert!(!connections.connect(TransportKind::Usb, Arc::new(Mailbox::new())));
        assert!(!connections.connect(TransportKind::Bt, Arc::new(Mailbox::new())));

        assert!(connections.disconnect(TransportKind::Bt));
        assert_eq!(connections.active(), None);
        assert!(connections.connect(TransportKind::Usb, Arc::new(Mailbox::new())));
        assert!(connections.disconnect_all());
        assert_eq!(connections.active(), None);
    }

    #[test]
    fn test_disconnect_all_with_nothing_live() {
        let mut connections = Connections::new(vec![controller(TransportKind::Sim, false)]);
        assert!(connections.disconnect_all());
        assert!(connections.disconnect(TransportKind::Ble));
    }
}
