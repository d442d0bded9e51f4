//! Background Reaper
//!
//! Lazy expiry keeps `contains` correct, but a key that expires and is never
//! looked up again stays in memory until something removes it. The reaper is
//! a Tokio task that calls the set's sweep every `sweep_interval`.
//!
//! ## Lifetime
//!
//! The task holds only a `Weak` reference to the set's shared state, so it
//! never keeps a set alive. It exits when:
//! 1. the shutdown channel fires (`stop_reaper` or dropping the set),
//! 2. the shared state has been dropped, or
//! 3. it finds the stopped flag set under the state lock.
//!
//! The third check is what lets `stop_reaper` promise that no sweep starts
//! after it returns, even if the task was already awake.

use crate::storage::config::ConfigError;
use crate::storage::set::Shared;
use std::hash::Hash;
use std::sync::Weak;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

/// A handle to a running reaper task.
#[derive(Debug)]
pub(crate) struct Reaper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl Reaper {
    /// Spawns the reaper on the current Tokio runtime.
    pub(crate) fn start<K>(
        shared: Weak<Shared<K>>,
        interval: Duration,
    ) -> Result<Self, ConfigError>
    where
        K: Eq + Hash + Clone + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        runtime.spawn(reaper_loop(shared, interval, shutdown_rx));

        info!(
            interval_ms = interval.as_millis() as u64,
            "Background reaper started"
        );

        Ok(Self { shutdown_tx })
    }

    /// Signals the task to exit. Only the first call logs.
    pub(crate) fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background reaper stopped");
        }
    }
}

/// The main reaper loop.
async fn reaper_loop<K>(
    shared: Weak<Shared<K>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    K: Eq + Hash + Clone + Send + 'static,
{
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Reaper received shutdown signal");
                    return;
                }
            }
        }

        let Some(set) = shared.upgrade() else {
            debug!("Set dropped, reaper exiting");
            return;
        };

        if set.reap().is_none() {
            debug!("Reaper stopped before sweep");
            return;
        }
    }
}
