//! Periodic driver for the price simulator.
//!
//! A single task: one warm-up tick shortly after start, then one tick
//! per interval. Ticks never overlap. A failed tick is logged and the
//! next one runs as usual.

use crate::{pricing::PriceSimulator, store::LedgerStore};
use std::time::Duration;
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join:     JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop after the tick in progress, if any, and wait for the task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            log::warn!("scheduler: task ended abnormally: {e}");
        }
    }
}

/// Spawn the scheduler on the current tokio runtime. The task owns its
/// own store handle. Dropping the returned handle also stops it.
///
/// Ticks run on the blocking pool: a tick waiting on a locked database
/// must not stall a runtime worker.
pub fn spawn_price_scheduler(
    store: LedgerStore,
    simulator: PriceSimulator,
    warmup: Duration,
    interval: Duration,
) -> SchedulerHandle {
    let (shutdown, mut stop) = watch::channel(false);
    let started = Instant::now();

    let join = tokio::spawn(async move {
        let mut state = (simulator, store);

        tokio::select! {
            _ = sleep(warmup) => {}
            _ = stop.changed() => return,
        }
        state = match run_tick_blocking(state).await {
            Some(state) => state,
            None => return,
        };

        let mut ticker = interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }
            state = match run_tick_blocking(state).await {
                Some(state) => state,
                None => return,
            };
        }
        log::info!("scheduler: stopped");
    });

    SchedulerHandle { shutdown, join }
}

/// Run one tick off the async workers and hand the state back.
/// `None` means the tick task itself died and the scheduler cannot go on.
async fn run_tick_blocking(
    state: (PriceSimulator, LedgerStore),
) -> Option<(PriceSimulator, LedgerStore)> {
    let result = task::spawn_blocking(move || {
        let (mut simulator, store) = state;
        if let Err(e) = simulator.run_tick(&store) {
            log::warn!("scheduler: price update failed: {e}");
        }
        (simulator, store)
    })
    .await;

    match result {
        Ok(state) => Some(state),
        Err(e) => {
            log::error!("scheduler: tick task failed, stopping: {e}");
            None
        }
    }
}
