//! Simulated skin array for running without hardware.

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::{self, MissedTickBehavior};

use super::{TransportWorker, WorkerContext, WorkerPhase};
use crate::{
    config::SimConfig,
    error::Result,
    frame::{Frame, SkinMatrix, COLS, ROWS},
    tracing::prelude::*,
};

/// Publishes a random pressure frame every `period`.
pub struct SimWorker {
    config: SimConfig,
}

impl SimWorker {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }
}

fn random_matrix(rng: &mut StdRng) -> SkinMatrix {
    let mut matrix = SkinMatrix::zeros();
    for row in 0..ROWS {
        for col in 0..COLS {
            matrix.set(row, col, rng.gen::<f32>());
        }
    }
    matrix
}

#[async_trait]
impl TransportWorker for SimWorker {
    fn name(&self) -> &str {
        "sim"
    }

    async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<()> {
        let mut rng = StdRng::from_entropy();
        let mut ticker = time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        ctx.status.set_link_established(true);
        ctx.status.set_phase(WorkerPhase::Polling);
        info!(period = ?self.config.period, "Simulated sensor running");

        loop {
            tokio::select! {
                biased;
                _ = ctx.shutdown.cancelled() => break,
                _ = ticker.tick() => ctx.publish(Frame::Pressure(random_matrix(&mut rng)))?,
            }
        }

        ctx.status.set_phase(WorkerPhase::Draining);
        ctx.status.set_link_established(false);
        debug!("Simulated sensor stopped");
        Ok(())
    }
}
