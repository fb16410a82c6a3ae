//! Upload progress
//!
//! Part tasks report events over a channel to a single collector task, which
//! tallies them and logs a progress line at a fixed interval.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Progress event sent by a part task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    PartStarted { part_number: u32 },
    PartCompleted { part_number: u32, bytes: u64 },
}

/// Tally of progress events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_parts: usize,
    pub total_bytes: u64,
    pub parts_started: usize,
    pub parts_completed: usize,
    pub bytes_completed: u64,
}

impl ProgressSnapshot {
    fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::PartStarted { .. } => self.parts_started += 1,
            ProgressEvent::PartCompleted { bytes, .. } => {
                self.parts_completed += 1;
                self.bytes_completed += bytes;
            }
        }
    }

    /// Completed share of the total bytes, in percent
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.bytes_completed as f64 * 100.0 / self.total_bytes as f64
    }
}

/// Sending side handed to part tasks
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn part_started(&self, part_number: u32) {
        self.send(ProgressEvent::PartStarted { part_number });
    }

    pub fn part_completed(&self, part_number: u32, bytes: u64) {
        self.send(ProgressEvent::PartCompleted { part_number, bytes });
    }

    fn send(&self, event: ProgressEvent) {
        // collector gone means nobody is listening
        let _ = self.tx.send(event);
    }
}

/// Handle on the collector task
#[derive(Debug)]
pub struct ProgressCollector {
    task: JoinHandle<ProgressSnapshot>,
}

impl ProgressCollector {
    /// Wait for every reporter to be dropped and return the final tally
    pub async fn finish(self) -> ProgressSnapshot {
        match self.task.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Progress collector failed");
                ProgressSnapshot::default()
            }
        }
    }
}

/// Start a collector on the current runtime
pub fn track(
    total_parts: usize,
    total_bytes: u64,
    interval: Duration,
) -> (ProgressReporter, ProgressCollector) {
    let (tx, rx) = mpsc::unbounded_channel();
    let snapshot = ProgressSnapshot {
        total_parts,
        total_bytes,
        ..ProgressSnapshot::default()
    };
    let task = tokio::spawn(collect(rx, snapshot, interval));

    (ProgressReporter { tx }, ProgressCollector { task })
}

async fn collect(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    mut snapshot: ProgressSnapshot,
    interval: Duration,
) -> ProgressSnapshot {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick fires immediately
    ticker.tick().await;

    let mut logged = snapshot;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => snapshot.apply(event),
                None => return snapshot,
            },
            _ = ticker.tick() => {
                if snapshot != logged {
                    tracing::info!(
                        parts_completed = snapshot.parts_completed,
                        parts_started = snapshot.parts_started,
                        total_parts = snapshot.total_parts,
                        bytes = snapshot.bytes_completed,
                        percent = format!("{:.1}", snapshot.percent()),
                        "Upload progress"
                    );
                    logged = snapshot;
                }
            }
        }
    }
}
