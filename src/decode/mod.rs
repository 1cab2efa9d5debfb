//! Wire format decoders.
//!
//! Each transport delivers a different payload: BT-classic and USB send one
//! JSON text record per poll, BLE sends an opaque notification payload. A
//! decoder turns one payload into one [`Frame`]. Decoders do no I/O.

pub mod ble;
pub mod bt;
pub mod usb;

pub use ble::BleDecoder;
pub use bt::BtDecoder;
pub use usb::{UsbBaseline, UsbDecoder};

use crate::{error::Result, frame::Frame};

/// Turns one transport payload into one frame.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Frame>;
}
