//! BLE notification link over btleplug.
//!
//! Opening scans the first Bluetooth adapter for the configured device
//! address. Connecting, subscribing and disconnecting are left to the worker
//! so it can report each step.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use btleplug::{
    api::{BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter},
    platform::{Manager, Peripheral},
};
use futures::StreamExt;
use uuid::Uuid;

use super::{Notifications, NotifyLink, Open};
use crate::{
    config::BleConfig,
    error::{Error, Result},
    tracing::prelude::*,
};

/// Interval between peripheral list checks while scanning.
const SCAN_POLL: Duration = Duration::from_millis(200);

pub struct BtleplugLink {
    peripheral: Peripheral,
    address: BDAddr,
    characteristic_uuid: Uuid,
    subscribed: Option<Characteristic>,
}

impl BtleplugLink {
    /// Scan for the configured device until found or the scan times out.
    pub async fn discover(config: &BleConfig) -> Result<Self> {
        let address = BDAddr::from_str(&config.address)
            .map_err(|e| Error::Config(format!("invalid BLE address {}: {}", config.address, e)))?;

        let manager = Manager::new()
            .await
            .map_err(|e| unavailable("Bluetooth manager", e))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| unavailable("Bluetooth adapters", e))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::LinkUnavailable("no Bluetooth adapter".into()))?;

        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| unavailable("BLE scan", e))?;
        debug!(address = %address, "Scanning for BLE device");

        let found = tokio::time::timeout(config.scan_timeout, async {
            loop {
                for peripheral in adapter.peripherals().await? {
                    if peripheral.address() == address {
                        return Ok::<_, Error>(peripheral);
                    }
                }
                tokio::time::sleep(SCAN_POLL).await;
            }
        })
        .await;

        if let Err(e) = adapter.stop_scan().await {
            warn!(error = %e, "Failed to stop BLE scan");
        }

        let peripheral = match found {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::LinkUnavailable(format!(
                    "{} not found within {:?}",
                    address, config.scan_timeout
                )))
            }
        };

        Ok(Self {
            peripheral,
            address,
            characteristic_uuid: config.characteristic,
            subscribed: None,
        })
    }
}

/// The BLE stack failed before a link existed.
fn unavailable(context: &str, e: btleplug::Error) -> Error {
    Error::LinkUnavailable(format!("{}: {}", context, e))
}

#[async_trait]
impl NotifyLink for BtleplugLink {
    async fn connect(&mut self) -> Result<()> {
        self.peripheral
            .connect()
            .await
            .map_err(|e| unavailable(&self.address.to_string(), e))?;

        if !self.peripheral.is_connected().await? {
            return Err(Error::LinkUnavailable(format!(
                "{}: connection not confirmed",
                self.address
            )));
        }

        self.peripheral.discover_services().await?;
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<Notifications> {
        let characteristic = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == self.characteristic_uuid)
            .ok_or_else(|| {
                Error::LinkUnavailable(format!(
                    "{}: characteristic {} not found",
                    self.address, self.characteristic_uuid
                ))
            })?;

        // Take the stream before subscribing so the first payload is kept
        let uuid = characteristic.uuid;
        let stream = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristic).await?;
        self.subscribed = Some(characteristic);

        Ok(Box::pin(stream.filter_map(move |n| async move {
            (n.uuid == uuid).then_some(n.value)
        })))
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if let Some(characteristic) = self.subscribed.take() {
            self.peripheral.unsubscribe(&characteristic).await?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Open for BleConfig {
    type Link = BtleplugLink;

    async fn open(self) -> Result<BtleplugLink> {
        BtleplugLink::discover(&self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_failure_is_link_unavailable() {
        let err = unavailable("Bluetooth adapters", btleplug::Error::NotSupported("no radio".into()));
        match err {
            Error::LinkUnavailable(msg) => {
                assert!(msg.starts_with("Bluetooth adapters: "));
                assert!(msg.contains("no radio"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_address_is_config_error() {
        let config = BleConfig {
            address: "not-an-address".into(),
            ..BleConfig::default()
        };
        assert!(matches!(
            BtleplugLink::discover(&config).await,
            Err(Error::Config(_))
        ));
    }
}
