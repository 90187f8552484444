//! Cancellable per-surface tick timers.
//!
//! Every recurring timer a surface owns is an [`IntervalHandle`]. Dropping or
//! cancelling the handle stops the timer, so tearing a surface down can never
//! leak a timer that keeps writing into a detached node.

use crate::snapshot::{MonitorSnapshot, SnapshotFeed};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Owner of one recurring timer.
#[derive(Debug)]
pub struct IntervalHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl IntervalHandle {
    /// Call `on_tick` every `period` on the current tokio runtime until
    /// cancelled. The first call happens one period after spawning.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => on_tick(),
                }
            }
        });
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// A handle with no task behind it, cancelled through `cancel` only.
    #[must_use]
    pub fn detached(cancel: CancellationToken) -> Self {
        Self { cancel, task: None }
    }

    /// Stop the timer. Idempotent.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for IntervalHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Creates the tick timer for a bound panel.
pub trait IntervalSpawner {
    fn spawn(&self, period: Duration, subject: &str) -> IntervalHandle;
}

/// A tick addressed to the panel bound to `subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelTick {
    pub subject: String,
}

/// Spawns tokio timers that post [`PanelTick`]s to a channel.
#[derive(Debug, Clone)]
pub struct ChannelIntervalSpawner {
    tx: mpsc::UnboundedSender<PanelTick>,
}

impl ChannelIntervalSpawner {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<PanelTick>) -> Self {
        Self { tx }
    }
}

impl IntervalSpawner for ChannelIntervalSpawner {
    fn spawn(&self, period: Duration, subject: &str) -> IntervalHandle {
        let tx = self.tx.clone();
        let tick = PanelTick {
            subject: subject.to_owned(),
        };
        IntervalHandle::spawn(period, move || {
            let _ = tx.send(tick.clone());
        })
    }
}

/// Spawner that hands out detached handles and remembers their tokens, for
/// driving panels by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualIntervalSpawner {
    issued: Arc<Mutex<Vec<(String, CancellationToken)>>>,
}

impl ManualIntervalSpawner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subjects and tokens of every handle issued so far, oldest first.
    #[must_use]
    pub fn issued(&self) -> Vec<(String, CancellationToken)> {
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of issued handles not yet cancelled.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.issued()
            .iter()
            .filter(|(_, token)| !token.is_cancelled())
            .count()
    }
}

impl IntervalSpawner for ManualIntervalSpawner {
    fn spawn(&self, _period: Duration, subject: &str) -> IntervalHandle {
        let token = CancellationToken::new();
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((subject.to_owned(), token.clone()));
        IntervalHandle::detached(token)
    }
}

/// Recompute a surface once per `period` and whenever the snapshot changes,
/// until `cancel` fires or the snapshot publisher goes away.
pub async fn drive<F>(mut feed: SnapshotFeed, period: Duration, cancel: CancellationToken, mut recompute: F)
where
    F: FnMut(&MonitorSnapshot),
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("countdown driver cancelled");
                break;
            }
            _ = interval.tick() => recompute(&feed.peek()),
            alive = feed.changed() => {
                if !alive {
                    debug!("snapshot publisher closed; countdown driver stopping");
                    break;
                }
                recompute(&feed.latest());
            }
        }
    }
}
