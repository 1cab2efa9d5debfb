//! Transport configuration.
//!
//! Every transport is configured once at construction and never changes
//! while its worker runs. [`Config::from_env`] reads overrides from
//! `SKINSENSE_*` environment variables and falls back to the values the
//! sensor hardware ships with.
//!
//! # Environment Variables
//!
//! - `SKINSENSE_BT_PORT`, `SKINSENSE_BT_BAUD`: BT-classic serial port
//! - `SKINSENSE_USB_PORT`, `SKINSENSE_USB_BAUD`: USB serial port
//! - `SKINSENSE_READ_TIMEOUT_MS`: per-poll read timeout for both serial links
//! - `SKINSENSE_MAX_FAILURES`: consecutive link failures before a serial
//!   worker gives up
//! - `SKINSENSE_BLE_ADDRESS`, `SKINSENSE_BLE_CHARACTERISTIC`: BLE device
//! - `SKINSENSE_BLE_SCAN_TIMEOUT_MS`: how long to scan for the BLE device

use std::{str::FromStr, time::Duration};

use uuid::Uuid;

use crate::tracing::prelude::*;

/// Byte written to a serial sensor to request one record.
pub const POLL_TRIGGER: u8 = b'~';

pub const DEFAULT_BT_PORT: &str = "COM9";
pub const DEFAULT_BT_BAUD: u32 = 9600;
pub const DEFAULT_USB_PORT: &str = "COM5";
pub const DEFAULT_USB_BAUD: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_FAILURES: u32 = 10;
pub const DEFAULT_BLE_ADDRESS: &str = "E2:B1:5D:0F:DC:5B";
pub const DEFAULT_BLE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x140984b8_72ba_494d_8707_80e9af77523a);
pub const DEFAULT_BLE_SCAN_TIMEOUT: Duration = Duration::from_secs(4);
pub const DEFAULT_SIM_PERIOD: Duration = Duration::from_millis(50);

/// Request/response serial link (BT-classic or USB).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Serial device, e.g. `/dev/rfcomm0` or `COM9`
    pub port: String,

    pub baud_rate: u32,

    /// How long to wait for one record after sending the trigger
    pub read_timeout: Duration,

    /// Byte that asks the sensor for one record
    pub trigger: u8,

    /// Timeouts or I/O errors in a row that end the worker.
    ///
    /// Malformed records do not count.
    pub max_consecutive_failures: u32,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
            trigger: POLL_TRIGGER,
            max_consecutive_failures: DEFAULT_MAX_FAILURES,
        }
    }

    pub fn bt_default() -> Self {
        Self::new(DEFAULT_BT_PORT, DEFAULT_BT_BAUD)
    }

    pub fn usb_default() -> Self {
        Self::new(DEFAULT_USB_PORT, DEFAULT_USB_BAUD)
    }
}

/// BLE notification link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleConfig {
    /// Device address, `XX:XX:XX:XX:XX:XX`
    pub address: String,

    /// Characteristic that carries the pressure notifications
    pub characteristic: Uuid,

    pub scan_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BLE_ADDRESS.to_string(),
            characteristic: DEFAULT_BLE_CHARACTERISTIC,
            scan_timeout: DEFAULT_BLE_SCAN_TIMEOUT,
        }
    }
}

/// Simulated sensor with no hardware behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Interval between generated frames
    pub period: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_SIM_PERIOD,
        }
    }
}

/// Configuration for every transport kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bt: SerialConfig,
    pub usb: SerialConfig,
    pub ble: BleConfig,
    pub sim: SimConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bt: SerialConfig::bt_default(),
            usb: SerialConfig::usb_default(),
            ble: BleConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by any `SKINSENSE_*` variables that are set.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("SKINSENSE_BT_PORT") {
            config.bt.port = port;
        }
        if let Some(baud) = parse_var("SKINSENSE_BT_BAUD") {
            config.bt.baud_rate = baud;
        }
        if let Ok(port) = std::env::var("SKINSENSE_USB_PORT") {
            config.usb.port = port;
        }
        if let Some(baud) = parse_var("SKINSENSE_USB_BAUD") {
            config.usb.baud_rate = baud;
        }
        if let Some(ms) = parse_var::<u64>("SKINSENSE_READ_TIMEOUT_MS") {
            let timeout = Duration::from_millis(ms.max(1));
            config.bt.read_timeout = timeout;
            config.usb.read_timeout = timeout;
        }
        if let Some(max) = parse_var::<u32>("SKINSENSE_MAX_FAILURES") {
            config.bt.max_consecutive_failures = max.max(1);
            config.usb.max_consecutive_failures = max.max(1);
        }
        if let Ok(address) = std::env::var("SKINSENSE_BLE_ADDRESS") {
            config.ble.address = address;
        }
        if let Some(uuid) = parse_var("SKINSENSE_BLE_CHARACTERISTIC") {
            config.ble.characteristic = uuid;
        }
        if let Some(ms) = parse_var("SKINSENSE_BLE_SCAN_TIMEOUT_MS") {
            config.ble.scan_timeout = Duration::from_millis(ms);
        }

        config
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparseable value, using default");
            None
        }
    }
}
