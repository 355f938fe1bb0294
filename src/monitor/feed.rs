//! Feed driver
//!
//! Background task that drains a channel of wire records into the monitor.
//! Up to `workers` records are scored at once. Cancelling the token stops
//! intake; records already queued are still scored before the task returns.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::monitor::config::FeedConfig;
use crate::monitor::engine::{IngestReport, Monitor};
use crate::monitor::errors::Result;
use crate::monitor::types::RawActivity;

/// Totals reported when the driver stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub accepted: u64,
    pub rejected: u64,
    pub blocked: u64,
    pub findings: u64,
}

impl FeedStats {
    fn tally(&mut self, outcome: Result<IngestReport>) {
        match outcome {
            Ok(report) if report.blocked => self.blocked += 1,
            Ok(report) => {
                self.accepted += 1;
                self.findings += report.findings.len() as u64;
            }
            Err(err) if err.is_recoverable() => {
                debug!(error = %err, context = %err.context(), "Feed record rejected");
                self.rejected += 1;
            }
            Err(err) => {
                warn!(error = %err, context = %err.context(), "Feed record failed");
                self.rejected += 1;
            }
        }
    }
}

/// Running feed driver
pub struct FeedHandle {
    pub sender: mpsc::Sender<RawActivity>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<FeedStats>,
}

impl FeedHandle {
    /// Stop intake and wait for in-flight records
    pub async fn shutdown(self) -> FeedStats {
        let FeedHandle {
            sender,
            cancel,
            handle,
        } = self;
        drop(sender);
        cancel.cancel();
        match handle.await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "Feed driver task failed");
                FeedStats::default()
            }
        }
    }
}

pub fn spawn_feed(
    monitor: Arc<Monitor>,
    config: &FeedConfig,
    cancel: CancellationToken,
) -> FeedHandle {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let workers = config.workers.max(1);
    let handle = tokio::spawn(run_feed(monitor, receiver, workers, cancel.clone()));
    FeedHandle {
        sender,
        cancel,
        handle,
    }
}

async fn run_feed(
    monitor: Arc<Monitor>,
    mut receiver: mpsc::Receiver<RawActivity>,
    workers: usize,
    cancel: CancellationToken,
) -> FeedStats {
    info!(workers, "Feed driver started");
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks: JoinSet<Result<IngestReport>> = JoinSet::new();
    let mut stats = FeedStats::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                match joined {
                    Ok(outcome) => stats.tally(outcome),
                    Err(err) => warn!(error = %err, "Feed worker failed"),
                }
            }
            next = receiver.recv() => match next {
                Some(raw) => {
                    let permit = match Arc::clone(&semaphore).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let monitor = Arc::clone(&monitor);
                    tasks.spawn(async move {
                        let outcome = monitor.ingest_raw(raw);
                        drop(permit);
                        outcome
                    });
                }
                None => break,
            },
        }
    }

    // score whatever was already queued
    receiver.close();
    while let Some(raw) = receiver.recv().await {
        stats.tally(monitor.ingest_raw(raw));
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => stats.tally(outcome),
            Err(err) => warn!(error = %err, "Feed worker failed"),
        }
    }

    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        blocked = stats.blocked,
        findings = stats.findings,
        "Feed driver stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::config::MonitorConfig;

    fn raw(address: &str, kind: &str) -> RawActivity {
        RawActivity {
            address: Some(address.to_string()),
            kind: Some(kind.to_string()),
            magnitude: Some(1.0),
            ..RawActivity::default()
        }
    }

    #[tokio::test]
    async fn test_feed_drains_on_close() {
        let monitor = Arc::new(Monitor::new(MonitorConfig::default()).unwrap());
        let feed = spawn_feed(
            Arc::clone(&monitor),
            &FeedConfig::default(),
            CancellationToken::new(),
        );

        for _ in 0..3 {
            feed.sender.send(raw("A", "transfer")).await.unwrap();
        }
        feed.sender.send(raw("B", "teleport")).await.unwrap();

        let FeedHandle { sender, handle, .. } = feed;
        drop(sender);
        let stats = handle.await.unwrap();

        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.findings, 1);
        assert_eq!(monitor.recent_attacks(10).len(), 1);
    }

    #[tokio::test]
    async fn test_feed_stops_on_cancel() {
        let monitor = Arc::new(Monitor::new(MonitorConfig::default()).unwrap());
        let feed = spawn_feed(
            Arc::clone(&monitor),
            &FeedConfig::default(),
            CancellationToken::new(),
        );
        feed.sender.send(raw("A", "transfer")).await.unwrap();

        let stats = feed.shutdown().await;
        assert_eq!(stats.accepted + stats.rejected + stats.blocked, 1);
        assert_eq!(monitor.status().events_ingested, 1);
    }
}
