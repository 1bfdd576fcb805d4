//! Off-thread compilation
//!
//! [`WarpCompileQueue`] hands immutable [`WarpSnapshot`]s to a worker thread
//! over a bounded channel and collects finished [`WarpCompilation`]s on a
//! result channel. A task cancelled before the worker picks it up is never
//! transpiled; its result is [`TranspileError::Cancelled`].
//!
//! With background compilation disabled the queue transpiles inline in
//! [`WarpCompileQueue::submit`] and results are available immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendError, Sender, bounded, unbounded};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::builder::{WarpBuilder, WarpCompilation};
use crate::error::{TranspileError, TranspileResult};
use crate::options::WarpOptions;
use crate::snapshot::WarpSnapshot;

/// Counters of a compile queue.
#[derive(Debug, Default)]
pub struct CompileQueueStats {
    /// Tasks submitted
    pub submitted: AtomicU64,
    /// Tasks transpiled, successfully or not
    pub completed: AtomicU64,
    /// Transpiles that returned an error
    pub failed: AtomicU64,
    /// Tasks dropped before they started
    pub cancelled: AtomicU64,
}

impl CompileQueueStats {
    /// Current values.
    pub fn snapshot(&self) -> CompileQueueStatsSnapshot {
        CompileQueueStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CompileQueueStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileQueueStatsSnapshot {
    /// Tasks submitted
    pub submitted: u64,
    /// Tasks transpiled
    pub completed: u64,
    /// Transpiles that returned an error
    pub failed: u64,
    /// Tasks dropped before they started
    pub cancelled: u64,
}

impl CompileQueueStatsSnapshot {
    /// Tasks neither transpiled nor cancelled yet.
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.completed + self.cancelled)
    }
}

/// Handle on a submitted task.
#[derive(Debug, Clone)]
pub struct CompileTicket {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl CompileTicket {
    /// Task id, matching [`CompileResult::id`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Abandon the task if it has not started.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Outcome of one task.
#[derive(Debug)]
pub struct CompileResult {
    /// Task id
    pub id: u64,
    /// The compilation, or why there is none
    pub result: TranspileResult<WarpCompilation>,
}

struct CompileTask {
    id: u64,
    snapshot: WarpSnapshot,
    cancelled: Arc<AtomicBool>,
}

enum Job {
    Compile(CompileTask),
    Shutdown,
}

type PendingTasks = Mutex<FxHashMap<u64, Arc<AtomicBool>>>;

/// State shared by the queue and its worker.
struct Shared {
    builder: WarpBuilder,
    stats: CompileQueueStats,
    pending: PendingTasks,
    results: Sender<CompileResult>,
}

impl Shared {
    fn run(&self, task: CompileTask) {
        self.pending.lock().remove(&task.id);
        let result = if task.cancelled.load(Ordering::Acquire) {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "otter::warp", id = task.id, "compilation cancelled before start");
            Err(TranspileError::Cancelled { id: task.id })
        } else {
            let result = self.builder.build(&task.snapshot);
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
            match &result {
                Ok(compilation) => tracing::debug!(
                    target: "otter::warp",
                    id = task.id,
                    sites = compilation.num_sites(),
                    "compilation finished"
                ),
                Err(err) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(target: "otter::warp", id = task.id, error = %err, "compilation failed");
                }
            }
            result
        };
        // The queue owns a receiver for as long as `Shared` is alive.
        let _ = self.results.send(CompileResult { id: task.id, result });
    }
}

/// Queue of Warp compilations.
pub struct WarpCompileQueue {
    shared: Arc<Shared>,
    results: Receiver<CompileResult>,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl WarpCompileQueue {
    /// Queue with `options`. Starts the worker thread when background
    /// compilation is enabled; if the thread cannot be spawned the queue
    /// compiles inline.
    pub fn new(options: WarpOptions) -> Self {
        let (result_tx, result_rx) = unbounded();
        let shared = Arc::new(Shared {
            builder: WarpBuilder::new(options),
            stats: CompileQueueStats::default(),
            pending: Mutex::new(FxHashMap::default()),
            results: result_tx,
        });

        let (jobs, worker) = if options.background {
            let (job_tx, job_rx) = bounded(options.queue_capacity.max(1));
            let worker_shared = Arc::clone(&shared);
            match std::thread::Builder::new()
                .name("otter-warp-compiler".into())
                .spawn(move || run_worker(job_rx, worker_shared))
            {
                Ok(handle) => (Some(job_tx), Some(handle)),
                Err(err) => {
                    tracing::warn!(target: "otter::warp", error = %err, "failed to spawn compiler thread, compiling inline");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        Self {
            shared,
            results: result_rx,
            jobs,
            worker,
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether tasks run on the worker thread.
    pub fn is_background(&self) -> bool {
        self.jobs.is_some()
    }

    /// Queue `snapshot` for compilation. Blocks while the channel is full.
    pub fn submit(&self, snapshot: WarpSnapshot) -> CompileTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.pending.lock().insert(id, Arc::clone(&cancelled));
        tracing::debug!(target: "otter::warp", id, sites = snapshot.sites.len(), "compilation submitted");

        let task = CompileTask {
            id,
            snapshot,
            cancelled: Arc::clone(&cancelled),
        };
        match &self.jobs {
            Some(jobs) => {
                if let Err(SendError(Job::Compile(task))) = jobs.send(Job::Compile(task)) {
                    self.shared.run(task);
                }
            }
            None => self.shared.run(task),
        }
        CompileTicket { id, cancelled }
    }

    /// Cancel every task that has not started.
    pub fn cancel_pending(&self) -> usize {
        let pending = self.shared.pending.lock();
        for flag in pending.values() {
            flag.store(true, Ordering::Release);
        }
        pending.len()
    }

    /// A finished result, if one is ready.
    pub fn try_recv(&self) -> Option<CompileResult> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for a finished result.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CompileResult> {
        self.results.recv_timeout(timeout).ok()
    }

    /// Counters.
    pub fn stats(&self) -> CompileQueueStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for WarpCompileQueue {
    fn drop(&mut self) {
        if let Some(jobs) = self.jobs.take() {
            let _ = jobs.send(Job::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(jobs: Receiver<Job>, shared: Arc<Shared>) {
    let _span = tracing::debug_span!(target: "otter::warp", "compiler").entered();
    tracing::debug!(target: "otter::warp", "compiler thread started");
    while let Ok(job) = jobs.recv() {
        match job {
            Job::Compile(task) => shared.run(task),
            Job::Shutdown => break,
        }
    }
    tracing::debug!(target: "otter::warp", "compiler thread stopped");
}
