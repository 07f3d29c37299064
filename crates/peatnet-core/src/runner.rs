//! Background loops: the danger scheduler and the passive income sweep.
//!
//! Both loops wait one full period before their first run, keep going when
//! a run fails, and stop as soon as the shutdown flag flips to `true` (or
//! its sender is dropped).

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::engine::Engine;
use crate::store::EntityStore;

/// Run `job` every `period` until shutdown.
async fn run_every<F, Fut, T, E>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(loop_name = name, period_secs = period.as_secs(), "loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = job().await {
                    error!(loop_name = name, error = %err, "loop iteration failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(loop_name = name, "loop stopped");
}

/// Fire the danger scheduler every configured interval.
pub async fn run_danger_loop<S: EntityStore>(engine: Engine<S>, shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(engine.config().dangers.interval_secs);
    let engine = &engine;
    run_every("danger", period, shutdown, move || engine.fire_dangers()).await;
}

/// Sweep passive income every configured period.
pub async fn run_passive_income_loop<S: EntityStore>(
    engine: Engine<S>,
    shutdown: watch::Receiver<bool>,
) {
    let period = Duration::from_secs(engine.config().economy.passive_sweep_secs);
    let engine = &engine;
    run_every("passive_income", period, shutdown, move || {
        engine.sweep_passive_income()
    })
    .await;
}

/// Spawn both loops on the current runtime.
pub fn spawn_loops<S: EntityStore>(
    engine: &Engine<S>,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run_danger_loop(engine.clone(), shutdown.clone())),
        tokio::spawn(run_passive_income_loop(engine.clone(), shutdown.clone())),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use peatnet_types::{Chat, ChatId};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::dice::ScriptedDice;
    use crate::memory::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn danger_loop_fires_each_period_and_stops() {
        let store = Arc::new(MemoryStore::new());
        store.put_chat(Chat::new(ChatId(1))).await;
        let dice = Arc::new(ScriptedDice::new(2));
        dice.push_picks([0, 0]);
        let engine = Engine::new(
            Arc::clone(&store),
            Arc::new(ManualClock::new(Utc::now())),
            dice,
            EngineConfig::default(),
        );
        let (tx, rx) = watch::channel(false);
        let handles = spawn_loops(&engine, &rx);

        tokio::time::sleep(Duration::from_secs(10_799)).await;
        assert!(!store.chat(ChatId(1)).await.unwrap().unwrap().co2_active);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.chat(ChatId(1)).await.unwrap().unwrap().co2_active);

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
