//! Timeout arbiter: settles games whose turn holder went silent.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{error, info};

use crate::dao::{game_store::GameStore, models::ExpiredGame, storage::StorageResult};

/// Polling cadence of the arbiter.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArbiterSettings {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,
    /// Most games settled per tick.
    pub batch_size: usize,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            batch_size: 10,
        }
    }
}

/// Periodically claims and settles expired games through the store.
pub struct TimeoutArbiter {
    store: Arc<dyn GameStore>,
    settings: ArbiterSettings,
}

impl TimeoutArbiter {
    pub fn new(store: Arc<dyn GameStore>, settings: ArbiterSettings) -> Self {
        Self { store, settings }
    }

    /// Run one claim-and-settle round.
    pub async fn tick(&self) -> StorageResult<Vec<ExpiredGame>> {
        let settled = self
            .store
            .claim_and_end_expired(self.settings.batch_size)
            .await?;
        for game in &settled {
            info!(game_id = %game.game_id, winner_id = %game.winner_id, "game ended by timeout");
        }
        Ok(settled)
    }

    /// Start polling. The first round runs one interval after the call.
    pub fn spawn(self) -> ArbiterHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = self.settings.poll_interval.max(Duration::from_millis(10));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(poll_interval = ?period, batch_size = self.settings.batch_size, "arbiter started");

            loop {
                tokio::select! {
                    biased;
                    _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => break,
                    _ = ticker.tick() => {
                        // An in-flight round always completes before the stop is observed.
                        if let Err(err) = self.tick().await {
                            error!(error = %err, "arbiter tick failed; skipping");
                        }
                    }
                }
            }
            info!("arbiter stopped");
        });

        ArbiterHandle { stop_tx, task }
    }
}

/// Control handle of a running arbiter.
pub struct ArbiterHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ArbiterHandle {
    /// Ask the loop to stop after the current round. Safe to call repeatedly.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(err) = self.task.await {
            error!(error = %err, "arbiter task failed");
        }
    }
}
