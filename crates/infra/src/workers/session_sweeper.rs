use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tenantgate_auth::SessionStore;
use tenantgate_core::Clock;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(j) = self.join.take() {
            let _ = j.await;
        }
    }
}

/// Periodically moves sessions past their absolute lifetime to `EXPIRED`.
///
/// Expiry is also applied lazily on refresh; the sweeper keeps `is_active`
/// answers accurate for sessions that are never refreshed again.
#[derive(Debug)]
pub struct SessionSweeper;

impl SessionSweeper {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        every: Duration,
    ) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(sweep_loop(store, clock, every, shutdown_rx));

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

async fn sweep_loop(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.expire_stale(clock.now()).await {
                    Ok(0) => debug!("session sweep: nothing to expire"),
                    Ok(n) => info!(expired = n, "session sweep expired sessions"),
                    Err(err) => warn!(error = %err, "session sweep failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
