//! USB skin array record decoder.
//!
//! Each record is a flat JSON object with 32 ADC channel values named
//! `ADC<bank>_<channel>` (bank 0-3, channel 0-7). The channels are wired to
//! the 8x4 sensor grid through [`CHANNEL_MAP`]; banks 2 and 3 run their
//! columns in reverse.
//!
//! Values are scaled by 1/256. A baseline matrix captured at startup is
//! subtracted from every later reading: pressing on a sensor lowers its
//! reading, so `baseline - raw` grows with pressure. Readings above the
//! baseline clip to zero. The corrected grid is rotated 180 degrees to match
//! how the array is worn.

use super::FrameDecoder;
use crate::{
    error::{Error, Result},
    frame::{Frame, SkinMatrix},
};

/// Raw ADC counts per unit of normalized reading.
pub const ADC_SCALE: f32 = 256.0;

/// Number of ADC banks on the board.
pub const BANKS: u8 = 4;

/// Channels per ADC bank.
pub const CHANNELS_PER_BANK: u8 = 8;

/// Where one ADC channel lands in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCell {
    pub bank: u8,
    pub channel: u8,
    pub row: usize,
    pub col: usize,
}

const fn cell(bank: u8, channel: u8, row: usize, col: usize) -> ChannelCell {
    ChannelCell {
        bank,
        channel,
        row,
        col,
    }
}

/// Channel to (row, col) wiring of the sensor grid.
pub const CHANNEL_MAP: [ChannelCell; 32] = [
    cell(0, 0, 1, 0),
    cell(0, 1, 1, 1),
    cell(0, 2, 1, 2),
    cell(0, 3, 1, 3),
    cell(0, 4, 0, 0),
    cell(0, 5, 0, 1),
    cell(0, 6, 0, 2),
    cell(0, 7, 0, 3),
    cell(1, 0, 3, 0),
    cell(1, 1, 3, 1),
    cell(1, 2, 3, 2),
    cell(1, 3, 3, 3),
    cell(1, 4, 2, 0),
    cell(1, 5, 2, 1),
    cell(1, 6, 2, 2),
    cell(1, 7, 2, 3),
    cell(2, 0, 5, 3),
    cell(2, 1, 5, 2),
    cell(2, 2, 5, 1),
    cell(2, 3, 5, 0),
    cell(2, 4, 4, 3),
    cell(2, 5, 4, 2),
    cell(2, 6, 4, 1),
    cell(2, 7, 4, 0),
    cell(3, 0, 7, 3),
    cell(3, 1, 7, 2),
    cell(3, 2, 7, 1),
    cell(3, 3, 7, 0),
    cell(3, 4, 6, 3),
    cell(3, 5, 6, 2),
    cell(3, 6, 6, 1),
    cell(3, 7, 6, 0),
];

/// Record field name for a channel, e.g. `ADC2_5`.
pub fn field_name(bank: u8, channel: u8) -> String {
    format!("ADC{}_{}", bank, channel)
}

/// Decode one record into the unrotated, uncorrected grid.
pub fn decode_grid(payload: &[u8]) -> Result<SkinMatrix> {
    // Fields other than the channels are ignored, whatever their type
    let fields: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(payload)?;
    let mut grid = SkinMatrix::zeros();

    for entry in CHANNEL_MAP.iter() {
        let name = field_name(entry.bank, entry.channel);
        let value = fields
            .get(&name)
            .ok_or_else(|| Error::MalformedRecord(format!("missing field {}", name)))?
            .as_f64()
            .ok_or_else(|| Error::MalformedRecord(format!("field {} is not a number", name)))?;
        grid.set(entry.row, entry.col, value as f32 / ADC_SCALE);
    }

    Ok(grid)
}

/// Reference grid captured when the worker starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsbBaseline(SkinMatrix);

impl UsbBaseline {
    pub fn from_record(payload: &[u8]) -> Result<Self> {
        decode_grid(payload).map(Self)
    }

    pub fn matrix(&self) -> &SkinMatrix {
        &self.0
    }
}

/// Steady-state decoder: remap, subtract from baseline, clip, rotate.
#[derive(Debug, Clone)]
pub struct UsbDecoder {
    baseline: UsbBaseline,
}

impl UsbDecoder {
    pub fn new(baseline: UsbBaseline) -> Self {
        Self { baseline }
    }

    pub fn correct(&self, raw: &SkinMatrix) -> SkinMatrix {
        raw.drift_below(self.baseline.matrix()).rotated_180()
    }
}

impl FrameDecoder for UsbDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Frame> {
        let raw = decode_grid(payload)?;
        Ok(Frame::Pressure(self.correct(&raw)))
    }
}
