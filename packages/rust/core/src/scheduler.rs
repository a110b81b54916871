//! Timer-driven batching task scheduler.
//!
//! Decouples the synchronous request path from long-running build work while
//! bounding concurrency: `enqueue` hands a task descriptor to a single
//! coordinator task over a channel and returns immediately; the coordinator
//! owns the pending queue, takes the first B tasks on each timer tick, runs
//! them concurrently, and waits for the whole batch before the next drain
//! cycle can start.
//!
//! There is no persistence: tasks still pending when the process exits are
//! lost.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use bundleworks_shared::{BundleworksError, QueueConfig, Result};

/// Scheduler settings derived from `[queue]` config.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Time between drain cycles.
    pub tick_period: Duration,
    /// Maximum tasks started per drain cycle.
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(5),
            batch_size: 5,
        }
    }
}

impl From<QueueConfig> for SchedulerConfig {
    fn from(config: QueueConfig) -> Self {
        Self {
            tick_period: Duration::from_secs(config.tick_seconds),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Handle for enqueueing tasks. Cheap to clone; dropping every handle shuts
/// the coordinator down after it finishes the current drain cycle.
pub struct Scheduler<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> Scheduler<T> {
    /// Start the coordinator task and return the enqueue handle.
    ///
    /// `runner` executes one task; its error is logged, never retried, and
    /// never reported back to the enqueue caller.
    pub fn start<R, Fut>(config: SchedulerConfig, runner: R) -> Self
    where
        R: Fn(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(coordinator(config, rx, runner));
        Self { tx }
    }

    /// Append a task to the pending queue. Non-blocking; returns before the
    /// task runs.
    pub fn enqueue(&self, task: T) -> Result<()> {
        self.tx
            .send(task)
            .map_err(|_| BundleworksError::validation("build queue is shut down"))
    }
}

/// Single owner of the pending queue. Admission order is FIFO; at most
/// `batch_size` tasks run concurrently; a tick that would land while a drain
/// cycle is still running is skipped entirely.
async fn coordinator<T, R, Fut>(
    config: SchedulerConfig,
    mut rx: mpsc::UnboundedReceiver<T>,
    runner: R,
) where
    T: Send + 'static,
    R: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut pending: VecDeque<T> = VecDeque::new();
    let mut ticker = tokio::time::interval(config.tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        tick_period_ms = config.tick_period.as_millis() as u64,
        batch_size = config.batch_size,
        "build queue coordinator started"
    );

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(task) => pending.push_back(task),
                None => {
                    info!(dropped = pending.len(), "build queue shut down");
                    return;
                }
            },
            _ = ticker.tick() => {
                // Pull in everything enqueued since the last poll so admission
                // order is preserved before slicing the batch.
                while let Ok(task) = rx.try_recv() {
                    pending.push_back(task);
                }

                if pending.is_empty() {
                    continue;
                }

                let take = config.batch_size.min(pending.len());
                debug!(batch = take, pending = pending.len(), "draining batch");

                let mut batch = JoinSet::new();
                for task in pending.drain(..take) {
                    batch.spawn(runner(task));
                }

                // The batch is awaited in full here, which is what keeps drain
                // cycles from overlapping: the ticker cannot be polled again
                // until every task has finished, and intervening ticks are
                // skipped.
                while let Some(joined) = batch.join_next().await {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!(error = %e, "queue task error"),
                        Err(e) => error!(error = %e, "queue task panicked"),
                    }
                }
            }
        }
    }
}
