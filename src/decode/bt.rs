//! BT-classic temperature record decoder.
//!
//! The sensor answers each poll with a JSON object such as
//! `{"Contact_t":36.5,"Object_IR":34.2,"Ambient_IR":22.1}`.

use serde::Deserialize;

use super::FrameDecoder;
use crate::{
    error::Result,
    frame::{Frame, TemperatureReading},
};

#[derive(Debug, Deserialize)]
struct TemperatureRecord {
    #[serde(rename = "Contact_t")]
    contact: f64,
    #[serde(rename = "Object_IR")]
    object_ir: f64,
    #[serde(rename = "Ambient_IR")]
    ambient_ir: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BtDecoder;

impl FrameDecoder for BtDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Frame> {
        let record: TemperatureRecord = serde_json::from_slice(payload)?;
        Ok(Frame::Temperature(TemperatureReading::new(
            record.object_ir,
            record.ambient_ir,
            record.contact,
        )))
    }
}
