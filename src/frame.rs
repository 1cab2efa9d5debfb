//! Normalized sensor frames.
//!
//! A [`Frame`] is what a worker publishes and a consumer renders. Its shape
//! depends on the transport that produced it.

use bytes::Bytes;
use serde::Serialize;

/// Rows in the skin pressure matrix.
pub const ROWS: usize = 8;

/// Columns in the skin pressure matrix.
pub const COLS: usize = 4;

/// One normalized reading from a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Frame {
    /// BT-classic temperature triple
    Temperature(TemperatureReading),

    /// USB (or simulated) 8x4 pressure matrix
    Pressure(SkinMatrix),

    /// BLE notification payload, undecoded
    Raw(Bytes),
}

impl Frame {
    /// Short name of the frame shape, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Temperature(_) => "temperature",
            Frame::Pressure(_) => "pressure",
            Frame::Raw(_) => "raw",
        }
    }
}

/// 3x1 temperature vector from the BT-classic sensor.
///
/// Slot order is fixed: object IR, ambient IR, contact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub slots: [f64; 3],
}

impl TemperatureReading {
    pub const OBJECT_IR_SLOT: usize = 0;
    pub const AMBIENT_IR_SLOT: usize = 1;
    pub const CONTACT_SLOT: usize = 2;

    pub fn new(object_ir: f64, ambient_ir: f64, contact: f64) -> Self {
        let mut slots = [0.0; 3];
        slots[Self::OBJECT_IR_SLOT] = object_ir;
        slots[Self::AMBIENT_IR_SLOT] = ambient_ir;
        slots[Self::CONTACT_SLOT] = contact;
        Self { slots }
    }

    pub fn object_ir(&self) -> f64 {
        self.slots[Self::OBJECT_IR_SLOT]
    }

    pub fn ambient_ir(&self) -> f64 {
        self.slots[Self::AMBIENT_IR_SLOT]
    }

    pub fn contact(&self) -> f64 {
        self.slots[Self::CONTACT_SLOT]
    }
}

/// Row-major 8x4 matrix of sensor values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SkinMatrix {
    cells: [[f32; COLS]; ROWS],
}

impl SkinMatrix {
    pub fn zeros() -> Self {
        Self::default()
    }

    pub fn filled(value: f32) -> Self {
        Self {
            cells: [[value; COLS]; ROWS],
        }
    }

    /// # Panics
    ///
    /// Panics if `row >= ROWS` or `col >= COLS`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cells[row][col]
    }

    /// # Panics
    ///
    /// Panics if `row >= ROWS` or `col >= COLS`.
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.cells[row][col] = value;
    }

    pub fn rows(&self) -> &[[f32; COLS]; ROWS] {
        &self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.cells.iter().flat_map(|row| row.iter().copied())
    }

    /// Element-wise `baseline - self`, with negative results clipped to zero.
    pub fn drift_below(&self, baseline: &SkinMatrix) -> SkinMatrix {
        let mut out = SkinMatrix::zeros();
        for row in 0..ROWS {
            for col in 0..COLS {
                out.cells[row][col] = (baseline.cells[row][col] - self.cells[row][col]).max(0.0);
            }
        }
        out
    }

    /// Rotate by 180 degrees (reverse both row and column order).
    pub fn rotated_180(&self) -> SkinMatrix {
        let mut out = SkinMatrix::zeros();
        for row in 0..ROWS {
            for col in 0..COLS {
                out.cells[ROWS - 1 - row][COLS - 1 - col] = self.cells[row][col];
            }
        }
        out
    }
}
