//! Delay-based task scheduler backed by a bounded worker pool.
//!
//! A single timer thread owns a min-heap of pending runs and waits on
//! `crossbeam_channel::select!` for either a new registration or the next due time.
//! Due runs are handed to a fixed number of worker threads over a channel. Every
//! task is repeating: after a run finishes, the worker asks the task for its next
//! delay and registers the following run, so runs of one task never overlap and
//! execute strictly in sequence.
//!
//! Each task is controlled by a [`TaskHandle`]. Cancelling it drops the pending
//! run when it comes due; [`Scheduler::shutdown`] discards every pending run and
//! joins all threads.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, after, never, select, unbounded};
use fx_common::{DispatchError, Result};
use log::{debug, error, info};

type Body = Box<dyn Fn() + Send + Sync>;
type DelayFn = Box<dyn Fn() -> Duration + Send + Sync>;

struct Task {
    name: String,
    cancelled: AtomicBool,
    body: Body,
    next_delay: DelayFn,
}

/// Owned control over one repeating task.
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<Task>,
}

impl TaskHandle {
    /// Stop the task. A run already executing finishes; no further run starts.
    pub fn cancel(&self) {
        if !self.task.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Task {} cancelled", self.task.name);
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.task.cancelled.load(Ordering::SeqCst)
    }

    /// Task name given at scheduling time.
    pub fn name(&self) -> &str {
        &self.task.name
    }
}

struct Pending {
    due: Instant,
    seq: u64,
    task: Arc<Task>,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

enum TimerMsg {
    Schedule(Pending),
    Shutdown,
}

struct Shared {
    timer_tx: Sender<TimerMsg>,
    running: AtomicBool,
    seq: AtomicU64,
}

impl Shared {
    fn enqueue(&self, task: Arc<Task>, delay: Duration) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(DispatchError::SchedulerShutdown);
        }
        let pending = Pending {
            due: Instant::now() + delay,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            task,
        };
        self.timer_tx
            .send(TimerMsg::Schedule(pending))
            .map_err(|_| DispatchError::SchedulerShutdown)
    }
}

/// Fixed pool of worker threads driven by a timer thread.
pub struct Scheduler {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the timer thread and `workers` worker threads.
    pub fn new(name: &str, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(DispatchError::InvalidSettings(
                "scheduler needs at least one worker".to_string(),
            ));
        }
        let (timer_tx, timer_rx) = unbounded::<TimerMsg>();
        let (job_tx, job_rx) = unbounded::<Arc<Task>>();
        let shared = Arc::new(Shared {
            timer_tx,
            running: AtomicBool::new(true),
            seq: AtomicU64::new(0),
        });

        let mut threads = Vec::with_capacity(workers + 1);
        threads.push(
            thread::Builder::new()
                .name(format!("{name}-timer"))
                .spawn(move || run_timer(timer_rx, job_tx))?,
        );
        for i in 1..=workers {
            let job_rx = job_rx.clone();
            let shared = Arc::clone(&shared);
            threads.push(
                thread::Builder::new()
                    .name(format!("{name}-thread-{i}"))
                    .spawn(move || run_worker(job_rx, shared))?,
            );
        }
        info!("Scheduler {} started with {} workers", name, workers);

        Ok(Self {
            shared,
            threads: Mutex::new(threads),
        })
    }

    /// Schedule a repeating task.
    ///
    /// The first run happens after `initial_delay`; each following run happens
    /// `next_delay()` after the previous run returned. `next_delay` is called
    /// once per cycle, so it may return a different value every time.
    pub fn schedule_repeating<D, F>(
        &self,
        name: impl Into<String>,
        initial_delay: Duration,
        next_delay: D,
        body: F,
    ) -> Result<TaskHandle>
    where
        D: Fn() -> Duration + Send + Sync + 'static,
        F: Fn() + Send + Sync + 'static,
    {
        let task = Arc::new(Task {
            name: name.into(),
            cancelled: AtomicBool::new(false),
            body: Box::new(body),
            next_delay: Box::new(next_delay),
        });
        self.shared.enqueue(Arc::clone(&task), initial_delay)?;
        Ok(TaskHandle { task })
    }

    /// Schedule a task at a fixed period, first run after `initial_delay`.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        name: impl Into<String>,
        initial_delay: Duration,
        period: Duration,
        body: F,
    ) -> Result<TaskHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.schedule_repeating(name, initial_delay, move || period, body)
    }

    /// Whether the scheduler still accepts work.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Drop every pending run and join all threads. Idempotent.
    ///
    /// Must not be called from inside a scheduled task.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.timer_tx.send(TimerMsg::Shutdown);

        let threads = match self.threads.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in threads {
            if handle.join().is_err() {
                error!("Scheduler thread panicked during shutdown");
            }
        }
        info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer(timer_rx: Receiver<TimerMsg>, job_tx: Sender<Arc<Task>>) {
    let mut pending: BinaryHeap<Reverse<Pending>> = BinaryHeap::new();

    loop {
        let next_due = match pending.peek() {
            Some(Reverse(next)) => after(next.due.saturating_duration_since(Instant::now())),
            None => never(),
        };

        select! {
            recv(timer_rx) -> msg => match msg {
                Ok(TimerMsg::Schedule(run)) => pending.push(Reverse(run)),
                Ok(TimerMsg::Shutdown) | Err(_) => break,
            },
            recv(next_due) -> _ => {},
        }

        let now = Instant::now();
        while pending.peek().is_some_and(|Reverse(next)| next.due <= now) {
            let Some(Reverse(run)) = pending.pop() else {
                break;
            };
            if run.task.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            if job_tx.send(run.task).is_err() {
                return;
            }
        }
    }
    debug!("Timer thread exiting, {} pending runs dropped", pending.len());
}

fn run_worker(job_rx: Receiver<Arc<Task>>, shared: Arc<Shared>) {
    for task in job_rx.iter() {
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        if task.cancelled.load(Ordering::SeqCst) {
            continue;
        }

        if panic::catch_unwind(AssertUnwindSafe(|| (task.body)())).is_err() {
            error!("Scheduled task {} panicked; rescheduling", task.name);
        }

        if task.cancelled.load(Ordering::SeqCst) {
            continue;
        }
        let delay = (task.next_delay)();
        if let Err(e) = shared.enqueue(Arc::clone(&task), delay) {
            debug!("Task {} not rescheduled: {}", task.name, e);
        }
    }
}
