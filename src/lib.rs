//! Sensor acquisition for wearable skin sensor arrays.
//!
//! Readings arrive over one of three physical transports (a classic
//! Bluetooth serial link, a direct USB serial link, or a BLE notification
//! characteristic). Each transport runs in its own supervised worker thread,
//! decodes its wire format into a [`Frame`], and publishes the latest frame
//! into a single-slot [`Mailbox`] that a consumer polls on its own schedule.
//!
//! The layering, leaf to root:
//!
//! - [`decode`]: wire format to [`Frame`], no I/O
//! - [`mailbox`]: put-if-empty hand-off between one worker and one consumer
//! - [`transport`]: link traits plus the tokio-serial and btleplug links
//! - [`worker`]: per-transport acquisition loops
//! - [`supervisor`]: start/probe/stop of a worker in its own thread
//! - [`controller`]: the boolean façade a UI calls

pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod frame;
pub mod mailbox;
pub mod supervisor;
pub mod tracing;
pub mod transport;
pub mod worker;

pub use config::Config;
pub use controller::{ConnectionController, Connections, TransportKind};
pub use error::{Error, Result};
pub use frame::{Frame, SkinMatrix, TemperatureReading};
pub use mailbox::{Mailbox, MailboxError};
pub use supervisor::{LifecycleState, Supervisor, SupervisorError};
