//! BLE pressure array worker.
//!
//! Sequence: scan and connect, subscribe to the pressure characteristic,
//! publish each notification until stopped, then unsubscribe, disconnect and
//! drain whatever frame was left unread.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::{TransportWorker, WorkerContext, WorkerPhase, BLE_PROBE_WINDOW};
use crate::{
    config::BleConfig,
    decode::{BleDecoder, FrameDecoder},
    error::{Error, Result},
    tracing::prelude::*,
    transport::{Notifications, NotifyLink, Open},
};

pub struct BleWorker<O = BleConfig> {
    config: BleConfig,
    opener: O,
}

impl BleWorker {
    pub fn new(config: BleConfig) -> Self {
        Self {
            opener: config.clone(),
            config,
        }
    }
}

impl<O> BleWorker<O> {
    /// Use `opener` instead of scanning with btleplug.
    pub fn with_opener(config: BleConfig, opener: O) -> Self {
        Self { config, opener }
    }
}

async fn listen(notifications: &mut Notifications, ctx: &WorkerContext) -> Result<()> {
    ctx.status.set_phase(WorkerPhase::Listening);
    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => {
                debug!("Stop requested, leaving notification loop");
                return Ok(());
            }
            payload = notifications.next() => {
                let Some(payload) = payload else {
                    warn!("Notification stream ended");
                    return Err(Error::LinkClosed);
                };
                match BleDecoder.decode(&payload) {
                    Ok(frame) => ctx.publish(frame)?,
                    Err(e) => warn!(error = %e, "Dropping notification"),
                }
            }
        }
    }
}

#[async_trait]
impl<O> TransportWorker for BleWorker<O>
where
    O: Open,
    O::Link: NotifyLink,
{
    fn name(&self) -> &str {
        "ble"
    }

    fn probe_window(&self) -> Duration {
        BLE_PROBE_WINDOW
    }

    async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<()> {
        let Self { config, opener } = *self;
        ctx.status.set_phase(WorkerPhase::Opening);
        info!(address = %config.address, "Attempting BLE connection");

        let Some(link) = ctx.until_shutdown(opener.open()).await else {
            return Ok(());
        };
        let mut link = link?;

        match ctx.until_shutdown(link.connect()).await {
            None => return Ok(()),
            Some(connected) => connected?,
        }
        ctx.status.set_link_established(true);
        info!(
            address = %config.address,
            characteristic = %config.characteristic,
            "BLE connected"
        );

        let result = match link.subscribe().await {
            Ok(mut notifications) => {
                let result = listen(&mut notifications, &ctx).await;
                drop(notifications);
                ctx.status.set_phase(WorkerPhase::Draining);
                if let Err(e) = link.unsubscribe().await {
                    warn!(error = %e, "Failed to unsubscribe");
                }
                result
            }
            Err(e) => {
                ctx.status.set_phase(WorkerPhase::Draining);
                Err(e)
            }
        };

        if let Err(e) = link.disconnect().await {
            warn!(address = %config.address, error = %e, "Failed to disconnect");
        }
        ctx.status.set_link_established(false);
        ctx.mailbox.drain();
        info!(address = %config.address, "BLE disconnected");

        result
    }
}
