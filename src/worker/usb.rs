//! USB skin array worker.
//!
//! On startup the worker discards [`WARMUP_READS`](super::poll::WARMUP_READS)
//! records while the ADC inputs settle, then captures the next record as the
//! baseline. Every later record is reported relative to it. Failing to
//! capture a baseline ends the worker, which the supervisor reports as a
//! failed start.

use async_trait::async_trait;

use super::{poll, TransportWorker, WorkerContext, WorkerPhase};
use crate::{
    config::SerialConfig,
    decode::{UsbBaseline, UsbDecoder},
    error::{Error, Result},
    tracing::prelude::*,
    transport::{Open, RecordLink},
};

pub struct UsbWorker<O = SerialConfig> {
    config: SerialConfig,
    opener: O,
}

impl UsbWorker {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            opener: config.clone(),
            config,
        }
    }
}

impl<O> UsbWorker<O> {
    /// Use `opener` instead of the real serial port.
    pub fn with_opener(config: SerialConfig, opener: O) -> Self {
        Self { config, opener }
    }
}

/// Read past the noisy warm-up records and capture a baseline.
///
/// Returns `Ok(None)` if shutdown was requested first.
async fn capture_baseline<L: RecordLink>(
    link: &mut L,
    config: &SerialConfig,
    ctx: &WorkerContext,
) -> Result<Option<UsbBaseline>> {
    for n in 0..poll::WARMUP_READS {
        match poll::request(link, config, ctx).await {
            None => return Ok(None),
            Some(Ok(_)) => trace!(read = n, "Discarded warm-up record"),
            Some(Err(e)) if e.is_per_record() => {
                debug!(read = n, error = %e, "Warm-up read failed, ignoring")
            }
            Some(Err(e)) => return Err(e),
        }
    }

    match poll::request(link, config, ctx).await {
        None => Ok(None),
        Some(record) => {
            let line = record?;
            UsbBaseline::from_record(line.as_bytes()).map(Some)
        }
    }
}

#[async_trait]
impl<O> TransportWorker for UsbWorker<O>
where
    O: Open,
    O::Link: RecordLink,
{
    fn name(&self) -> &str {
        "usb"
    }

    async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<()> {
        let Self { config, opener } = *self;
        ctx.status.set_phase(WorkerPhase::Opening);

        let Some(link) = ctx.until_shutdown(opener.open()).await else {
            return Ok(());
        };
        let mut link = link?;
        ctx.status.set_link_established(true);
        info!(port = %config.port, baud = config.baud_rate, "USB skin link open");

        let baseline = match capture_baseline(&mut link, &config, &ctx).await {
            Ok(Some(baseline)) => baseline,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(port = %config.port, error = %e, "Baseline capture failed");
                return Err(match e {
                    Error::LinkTimeout(_) | Error::MalformedRecord(_) => {
                        Error::LinkUnavailable(format!("{}: no usable baseline ({})", config.port, e))
                    }
                    other => other,
                });
            }
        };
        debug!(baseline = ?baseline.matrix().rows(), "Baseline captured");

        let decoder = UsbDecoder::new(baseline);
        let result = poll::poll_loop("usb", &mut link, &decoder, &config, &ctx).await;

        ctx.status.set_phase(WorkerPhase::Draining);
        drop(link);
        debug!(port = %config.port, "USB skin link released");
        result
    }
}
