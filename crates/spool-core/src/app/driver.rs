//! Driver - process / cleanup を定期実行するバックグラウンドタスク
//!
//! - process ループ: 間隔ごとにキューが空になるまでバッチを送る
//! - cleanup ループ: 間隔ごとに送信済み・期限切れを削除
//! - `shutdown_tx` に true を送ると両ループが止まる（送信中のバッチは最後まで走る）

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{ServiceError, SiteToSiteService};
use crate::domain::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverIntervals {
    #[serde(default = "default_process_interval", with = "millis")]
    pub process: Duration,

    #[serde(default = "default_cleanup_interval", with = "millis")]
    pub cleanup: Duration,
}

fn default_process_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for DriverIntervals {
    fn default() -> Self {
        Self {
            process: default_process_interval(),
            cleanup: default_cleanup_interval(),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Driver handle.
/// - `shutdown_and_join()` で両ループの終了を待てる
pub struct Driver {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl Driver {
    pub fn spawn(service: SiteToSiteService, intervals: DriverIntervals) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let process = tokio::spawn(process_loop(
            service.clone(),
            intervals.process,
            shutdown_rx.clone(),
        ));
        let cleanup = tokio::spawn(cleanup_loop(service, intervals.cleanup, shutdown_rx));

        Self {
            shutdown_tx,
            joins: vec![process, cleanup],
        }
    }

    /// Stop both loops after their current iteration.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

/// Wait for the next tick. `false` once shutdown is requested.
async fn next_tick(
    ticker: &mut tokio::time::Interval,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if *shutdown_rx.borrow() {
            return false;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            _ = ticker.tick() => return true,
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn process_loop(
    service: SiteToSiteService,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    while next_tick(&mut ticker, &mut shutdown_rx).await {
        // drain: keep sending while batches come back non-empty
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            match service.process_queued_packets().await {
                Ok(outcome) if outcome.sent => continue,
                Ok(_) => break,
                Err(ServiceError::Queue(QueueError::ConcurrentProcessInProgress)) => {
                    debug!("process already running elsewhere");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "scheduled process failed");
                    break;
                }
            }
        }
    }
}

async fn cleanup_loop(
    service: SiteToSiteService,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    while next_tick(&mut ticker, &mut shutdown_rx).await {
        if let Err(err) = service.cleanup_queued_packets().await {
            warn!(error = %err, "scheduled cleanup failed");
        }
    }
}
