// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background loop management.
//!
//! `start` spawns two loops: a cache sweep on `sweep_interval_secs` and a
//! warming cycle on `warming_interval_secs`. Both watch the shutdown channel
//! and exit promptly when `shutdown` fires.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use super::{ClientState, ResilientClient};

impl ResilientClient {
    /// Spawn the sweep and warming loops. Idempotent: calling on a running
    /// client is a no-op with a warning.
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state != ClientState::Created {
                warn!(state = %*state, "start() called on a non-fresh client, ignoring");
                return;
            }
            *state = ClientState::Running;
        }

        let sweep = {
            let client = Arc::clone(self);
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move { client.sweep_loop(shutdown).await })
        };
        let warming = {
            let client = Arc::clone(self);
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move { client.warming_loop(shutdown).await })
        };

        self.tasks.lock().extend([sweep, warming]);
        info!(
            sweep_interval_secs = self.config.sweep_interval_secs,
            warming_interval_secs = self.config.warming_interval_secs,
            "Client background loops started"
        );
    }

    /// Stop background loops and wait for them to drain.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state != ClientState::Running {
                return;
            }
            *state = ClientState::ShuttingDown;
        }

        // Receivers see the change and their loops return
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(error) = handle.await {
                warn!(%error, "Background task ended abnormally");
            }
        }

        *self.state.lock() = ClientState::Created;
        info!("Client shut down");
    }

    async fn sweep_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately; skip the first tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_cache();
                    self.update_gauge_metrics();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn warming_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.warming_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_warming_cycle().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
