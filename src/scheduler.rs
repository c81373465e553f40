use crate::models::PolarTask;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub type ExecutorFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Executor = Arc<dyn Fn(PolarTask) -> ExecutorFuture + Send + Sync>;

/// Runs tasks with at most `limit` in flight. Tasks start in submission
/// order; finished ones are replaced on the next poll.
#[derive(Clone)]
pub struct Scheduler {
    limit: usize,
    poll_interval: Duration,
    cancelled: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(limit: usize, poll_interval: Duration) -> Self {
        Self {
            limit: limit.max(1),
            poll_interval,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stops starting queued tasks and aborts the running ones.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks until every task has run, or until cancelled.
    pub async fn run_all(&self, tasks: Vec<PolarTask>, executor: Executor) {
        let mut queue: VecDeque<PolarTask> = tasks.into();
        let mut running: Vec<JoinHandle<()>> = Vec::with_capacity(self.limit);

        while running.len() < self.limit {
            let Some(task) = queue.pop_front() else {
                break;
            };
            running.push(spawn_task(&executor, task));
        }

        while !queue.is_empty() {
            if self.is_cancelled() {
                abort_all(&running, queue.len());
                break;
            }
            for slot in running.iter_mut() {
                if !slot.is_finished() {
                    continue;
                }
                let Some(task) = queue.pop_front() else {
                    break;
                };
                let finished = std::mem::replace(slot, spawn_task(&executor, task));
                reap(finished).await;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        while running.iter().any(|handle| !handle.is_finished()) {
            if self.is_cancelled() {
                abort_all(&running, 0);
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        for handle in running {
            reap(handle).await;
        }
    }
}

fn spawn_task(executor: &Executor, task: PolarTask) -> JoinHandle<()> {
    tracing::debug!(subject = %task.profile, reynolds = %task.reynolds, "starting session");
    tokio::spawn(executor(task))
}

fn abort_all(running: &[JoinHandle<()>], dropped: usize) {
    tracing::warn!(
        running = running.len(),
        dropped,
        "scheduler cancelled, aborting sessions"
    );
    for handle in running {
        handle.abort();
    }
}

async fn reap(handle: JoinHandle<()>) {
    if let Err(error) = handle.await {
        if error.is_panic() {
            tracing::error!(error = %error, "session panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, ExecutorFuture, Scheduler};
    use crate::models::{BatchSettings, PolarTask};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Duration;

    fn tasks(count: usize) -> Vec<PolarTask> {
        let settings = BatchSettings {
            reynolds: (0..count).map(|i| format!("{}e5", i + 1)).collect(),
            ..BatchSettings::default()
        };
        settings.tasks_for("Naca0018")
    }

    #[derive(Default)]
    struct Tracker {
        live: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    fn tracking_executor(tracker: Arc<Tracker>, hold: Duration) -> Executor {
        Arc::new(move |task: PolarTask| {
            let tracker = tracker.clone();
            let future: ExecutorFuture = Box::pin(async move {
                tracker
                    .started
                    .lock()
                    .expect("started lock")
                    .push(task.reynolds.clone());
                let live = tracker.live.fetch_add(1, Ordering::SeqCst) + 1;
                tracker.peak.fetch_max(live, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                tracker.live.fetch_sub(1, Ordering::SeqCst);
                tracker.done.fetch_add(1, Ordering::SeqCst);
            });
            future
        })
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let tracker = Arc::new(Tracker::default());
        let scheduler = Scheduler::new(3, Duration::from_millis(1));
        scheduler
            .run_all(tasks(10), tracking_executor(tracker.clone(), Duration::from_millis(10)))
            .await;
        assert_eq!(tracker.done.load(Ordering::SeqCst), 10);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn starts_in_submission_order() {
        let tracker = Arc::new(Tracker::default());
        let scheduler = Scheduler::new(1, Duration::from_millis(1));
        scheduler
            .run_all(tasks(4), tracking_executor(tracker.clone(), Duration::from_millis(2)))
            .await;
        let started = tracker.started.lock().expect("started lock").clone();
        assert_eq!(started, vec!["1e5", "2e5", "3e5", "4e5"]);
    }

    #[tokio::test]
    async fn fewer_tasks_than_limit() {
        let tracker = Arc::new(Tracker::default());
        let scheduler = Scheduler::new(8, Duration::from_millis(1));
        scheduler
            .run_all(tasks(2), tracking_executor(tracker.clone(), Duration::from_millis(1)))
            .await;
        assert_eq!(tracker.done.load(Ordering::SeqCst), 2);
        scheduler.run_all(Vec::new(), tracking_executor(tracker, Duration::ZERO)).await;
    }

    #[tokio::test]
    async fn cancel_stops_queue_and_aborts_running() {
        let tracker = Arc::new(Tracker::default());
        let scheduler = Scheduler::new(2, Duration::from_millis(1));
        let background = scheduler.clone();
        let executor = tracking_executor(tracker.clone(), Duration::from_secs(30));
        let handle = tokio::spawn(async move { background.run_all(tasks(6), executor).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler returns after cancel")
            .expect("scheduler task");

        assert_eq!(tracker.started.lock().expect("started lock").len(), 2);
        assert_eq!(tracker.done.load(Ordering::SeqCst), 0);
    }
}
