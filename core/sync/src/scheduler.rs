//! Background sync driver.
//!
//! Runs passes on a fixed interval, immediately on reconnect, and on
//! demand. Failures are logged and absorbed; the next trigger simply
//! tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use spendsync_net::ExpenseApi;

use crate::engine::SyncEngine;

enum Command {
    SyncNow,
    Shutdown,
}

/// Handle to the background sync task.
pub struct SyncScheduler {
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the driver. The first interval tick fires immediately, which
    /// gives the sync-on-startup pass.
    pub fn spawn<A>(engine: Arc<SyncEngine<A>>, interval: Duration) -> Self
    where
        A: ExpenseApi + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut connectivity = engine.connectivity().subscribe();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("periodic sync tick");
                        run_pass(&engine).await;
                    }
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *connectivity.borrow_and_update() {
                            info!("connectivity restored, syncing");
                            run_pass(&engine).await;
                        }
                    }
                    cmd = rx.recv() => match cmd {
                        Some(Command::SyncNow) => run_pass(&engine).await,
                        Some(Command::Shutdown) | None => break,
                    },
                }
            }
            debug!("sync scheduler stopped");
        });

        Self { tx, task }
    }

    /// Queue an immediate pass.
    pub async fn request_sync(&self) {
        let _ = self.tx.send(Command::SyncNow).await;
    }

    /// Stop the driver and wait for it to wind down.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown).await;
        let _ = self.task.await;
    }
}

async fn run_pass<A: ExpenseApi + ?Sized>(engine: &SyncEngine<A>) {
    if let Err(e) = engine.sync().await {
        warn!(error = %e, "scheduled sync failed");
    }
}
