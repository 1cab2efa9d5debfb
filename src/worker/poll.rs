//! Trigger/response polling shared by the BT and USB workers.

use super::{WorkerContext, WorkerPhase};
use crate::{
    config::SerialConfig,
    decode::FrameDecoder,
    error::{Error, Result},
    tracing::prelude::*,
    transport::RecordLink,
};

/// Warm-up records read and discarded before a USB baseline is taken.
pub(super) const WARMUP_READS: usize = 2;

/// Counts link failures in a row and decides when to give up.
#[derive(Debug)]
pub(super) struct FailureBudget {
    limit: u32,
    consecutive: u32,
}

impl FailureBudget {
    pub(super) fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    pub(super) fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Record one failure. Returns true once the budget is spent.
    pub(super) fn spend(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.limit
    }
}

/// Send one request, returning `None` if shutdown arrives first.
pub(super) async fn request<L: RecordLink>(
    link: &mut L,
    config: &SerialConfig,
    ctx: &WorkerContext,
) -> Option<Result<String>> {
    ctx.until_shutdown(link.request(config.trigger, config.read_timeout))
        .await
}

/// Poll, decode and publish until shutdown or a fatal link error.
pub(super) async fn poll_loop<L, D>(
    transport: &str,
    link: &mut L,
    decoder: &D,
    config: &SerialConfig,
    ctx: &WorkerContext,
) -> Result<()>
where
    L: RecordLink,
    D: FrameDecoder,
{
    ctx.status.set_phase(WorkerPhase::Polling);
    let mut budget = FailureBudget::new(config.max_consecutive_failures);

    while let Some(record) = request(link, config, ctx).await {
        match record.and_then(|line| decoder.decode(line.as_bytes())) {
            Ok(frame) => {
                budget.reset();
                ctx.publish(frame)?;
            }
            Err(Error::MalformedRecord(reason)) => {
                // The device answered, so the link itself is fine
                budget.reset();
                warn!(transport, reason = %reason, "Dropping malformed record");
            }
            Err(e @ (Error::LinkTimeout(_) | Error::Io(_))) => {
                if budget.spend() {
                    error!(
                        transport,
                        port = %config.port,
                        error = %e,
                        failures = config.max_consecutive_failures,
                        "Too many consecutive link failures"
                    );
                    return Err(e);
                }
                debug!(transport, error = %e, "Link failure, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    debug!(transport, "Stop requested, leaving poll loop");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decode::BtDecoder,
        frame::Frame,
        mailbox::Mailbox,
        transport::mock::{Reply, ScriptedSerial},
    };
    use std::{sync::Arc, time::Duration};

    const RECORD: &str = r#"{"Contact_t":36.5,"Object_IR":34.2,"Ambient_IR":22.1}"#;

    fn config(max_failures: u32) -> SerialConfig {
        SerialConfig {
            max_consecutive_failures: max_failures,
            read_timeout: Duration::from_millis(5),
            ..SerialConfig::bt_default()
        }
    }

    #[test]
    fn test_budget_is_spent_after_limit() {
        let mut budget = FailureBudget::new(3);
        assert!(!budget.spend());
        assert!(!budget.spend());
        budget.reset();
        assert!(!budget.spend());
        assert!(!budget.spend());
        assert!(budget.spend());
    }

    #[tokio::test]
    async fn test_bad_records_are_skipped() {
        let mailbox = Arc::new(Mailbox::new());
        let ctx = WorkerContext::new(Arc::clone(&mailbox));
        let mut link = ScriptedSerial::new([
            Reply::Line("garbage".into()),
            Reply::Timeout,
            Reply::Line(RECORD.into()),
        ]);

        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { poll_loop("bt", &mut link, &BtDecoder, &config(3), &ctx).await })
        };

        // Script runs dry and the link blocks; wait for the frame, then stop
        while mailbox.is_empty() {
            tokio::task::yield_now().await;
        }
        ctx.shutdown.cancel();
        task.await.unwrap().unwrap();

        assert!(matches!(mailbox.try_take().unwrap(), Some(Frame::Temperature(_))));
    }

    #[tokio::test]
    async fn test_consecutive_timeouts_are_fatal() {
        let ctx = WorkerContext::new(Arc::new(Mailbox::new()));
        let mut link = ScriptedSerial::new([Reply::Timeout, Reply::IoError, Reply::Timeout]);

        let err = poll_loop("bt", &mut link, &BtDecoder, &config(3), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LinkTimeout(_)));
    }

    #[tokio::test]
    async fn test_link_closed_is_fatal_immediately() {
        let ctx = WorkerContext::new(Arc::new(Mailbox::new()));
        let mut link = ScriptedSerial::new([Reply::Closed, Reply::Line(RECORD.into())]);

        let err = poll_loop("bt", &mut link, &BtDecoder, &config(10), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LinkClosed));
    }

    #[tokio::test]
    async fn test_closed_mailbox_stops_loop() {
        let mailbox = Arc::new(Mailbox::new());
        mailbox.close();
        let ctx = WorkerContext::new(mailbox);
        let mut link = ScriptedSerial::lines([RECORD]);

        let err = poll_loop("bt", &mut link, &BtDecoder, &config(10), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Mailbox(_)));
    }
}
