//! Physical links to the sensor.
//!
//! Workers never touch a driver directly. They open a link through [`Open`]
//! and talk to it through one of two traits:
//!
//! - [`RecordLink`] for request/response serial sensors: write a trigger
//!   byte, read back one text record
//! - [`NotifyLink`] for BLE: connect, subscribe to a characteristic, receive
//!   a stream of notification payloads
//!
//! Opening happens inside the worker's own thread and runtime, so a driver
//! that stalls while opening only stalls its own worker.

pub mod ble;
pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

pub use ble::BtleplugLink;
pub use serial::SerialLink;

use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// Something that can produce a link.
///
/// Configs implement this for the real drivers; tests implement it for
/// scripted links.
#[async_trait]
pub trait Open: Send + 'static {
    type Link: Send;

    /// Open the link. Failure here ends the worker with `LinkUnavailable`.
    async fn open(self) -> Result<Self::Link>;
}

/// Request/response text record link.
#[async_trait]
pub trait RecordLink: Send {
    /// Write `trigger`, then wait up to `timeout` for one line.
    ///
    /// The returned line has its terminator stripped.
    async fn request(&mut self, trigger: u8, timeout: Duration) -> Result<String>;
}

/// Stream of raw notification payloads.
pub type Notifications = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Connection-oriented notification link.
#[async_trait]
pub trait NotifyLink: Send {
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe to the configured characteristic.
    async fn subscribe(&mut self) -> Result<Notifications>;

    async fn unsubscribe(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
}
