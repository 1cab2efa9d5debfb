//! BT-classic temperature sensor worker.

use async_trait::async_trait;

use super::{poll, TransportWorker, WorkerContext, WorkerPhase};
use crate::{
    config::SerialConfig,
    decode::BtDecoder,
    error::Result,
    tracing::prelude::*,
    transport::{Open, RecordLink},
};

/// Polls the temperature sensor over its RFCOMM serial port.
pub struct BtWorker<O = SerialConfig> {
    config: SerialConfig,
    opener: O,
}

impl BtWorker {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            opener: config.clone(),
            config,
        }
    }
}

impl<O> BtWorker<O> {
    /// Use `opener` instead of the real serial port.
    pub fn with_opener(config: SerialConfig, opener: O) -> Self {
        Self { config, opener }
    }
}

#[async_trait]
impl<O> TransportWorker for BtWorker<O>
where
    O: Open,
    O::Link: RecordLink,
{
    fn name(&self) -> &str {
        "bt"
    }

    async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<()> {
        let Self { config, opener } = *self;
        ctx.status.set_phase(WorkerPhase::Opening);

        let Some(link) = ctx.until_shutdown(opener.open()).await else {
            return Ok(());
        };
        let mut link = link?;
        ctx.status.set_link_established(true);
        info!(port = %config.port, baud = config.baud_rate, "BT sensor link open");

        let result = poll::poll_loop("bt", &mut link, &BtDecoder, &config, &ctx).await;

        ctx.status.set_phase(WorkerPhase::Draining);
        drop(link);
        debug!(port = %config.port, "BT sensor link released");
        result
    }
}
