//! BLE pressure array decoder.
//!
//! The device-side encoding of the pressure samples is opaque here, so the
//! notification payload is published as-is.

use bytes::Bytes;

use super::FrameDecoder;
use crate::{error::Result, frame::Frame};

#[derive(Debug, Default, Clone, Copy)]
pub struct BleDecoder;

impl FrameDecoder for BleDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Frame> {
        Ok(Frame::Raw(Bytes::copy_from_slice(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_passes_through() {
        let payload = [0x00, 0x7f, 0xff, 0x10];
        assert_eq!(
            BleDecoder.decode(&payload).unwrap(),
            Frame::Raw(Bytes::from_static(&[0x00, 0x7f, 0xff, 0x10]))
        );
        assert_eq!(BleDecoder.decode(&[]).unwrap(), Frame::Raw(Bytes::new()));
    }
}
