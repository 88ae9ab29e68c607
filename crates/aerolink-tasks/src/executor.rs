//! # Executor
//!
//! One designated main thread plus a pool of blocking workers.
//!
//! ## Threading Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Executor Layout                                │
//! │                                                                         │
//! │   caller threads                main thread ("aerolink-main")           │
//! │   ──────────────                ────────────────────────────            │
//! │                                                                         │
//! │   Executor::post_on_main ──mpsc──►  command loop (FIFO)                 │
//! │                                       │                                 │
//! │                                       ├── jobs run one at a time        │
//! │                                       ├── timers (spawn_local + sleep)  │
//! │                                       └── task completions              │
//! │                                              ▲                          │
//! │   worker pool (spawn_blocking) ──────────────┘                          │
//! │   "aerolink-main-worker"        result awaited by a local future,       │
//! │                                 then settled on main                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Contract
//! - `post_on_main` is legal from any thread except main.
//! - Everything that touches main-context state (`run_in_background`,
//!   `schedule`, `unschedule`, tasks) is legal only on main. [`MainContext`]
//!   and [`Task`] are `!Send`, so once obtained they cannot leave the thread.
//! - After `dispose`, every operation fails with [`ExecutorError::Disposed`]
//!   and tasks still pending are settled as canceled.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, info, trace, warn};

use crate::config::ExecutorConfig;
use crate::error::{panic_message, BoxError, ExecutorError, ExecutorResult, TaskError};
use crate::scheduler::{Scheduler, TimerCallback, TimerHandle};
use crate::task::{CancelToken, Task, TaskControl, TaskOutcome};

// =============================================================================
// Commands
// =============================================================================

type MainJob = Box<dyn FnOnce() + Send + 'static>;

enum MainCommand {
    Run(MainJob),
    Shutdown,
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<MainLoop>>> = const { RefCell::new(None) };
}

// =============================================================================
// Executor (thread-safe handle)
// =============================================================================

struct Shared {
    name: String,
    main_thread: ThreadId,
    tx: mpsc::UnboundedSender<MainCommand>,
    disposed: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Thread-safe handle to a running executor.
///
/// Cheap to clone. Every clone refers to the same main loop.
#[derive(Clone)]
pub struct Executor {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.shared.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Executor {
    /// Starts the main loop thread and the worker pool.
    pub fn start(config: ExecutorConfig) -> ExecutorResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .max_blocking_threads(config.background_threads.max(1))
            .thread_name(config.worker_thread_name())
            .build()
            .map_err(|e| ExecutorError::StartFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let disposed = Arc::new(AtomicBool::new(false));
        let loop_disposed = Arc::clone(&disposed);
        let shutdown_timeout = config.shutdown_timeout;

        let handle = std::thread::Builder::new()
            .name(config.main_thread_name.clone())
            .spawn(move || run_main_loop(runtime, rx, loop_disposed, shutdown_timeout))
            .map_err(|e| ExecutorError::StartFailed(e.to_string()))?;

        info!(
            name = %config.main_thread_name,
            background_threads = config.background_threads,
            "Executor started"
        );

        Ok(Executor {
            shared: Arc::new(Shared {
                name: config.main_thread_name,
                main_thread: handle.thread().id(),
                tx,
                disposed,
                join: Mutex::new(Some(handle)),
            }),
        })
    }

    /// True when called from this executor's main thread.
    pub fn is_main_thread(&self) -> bool {
        std::thread::current().id() == self.shared.main_thread
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Queues `job` to run on the main context.
    ///
    /// Jobs posted from the same thread run in submission order. Posting
    /// from the main context itself is rejected: the caller is already
    /// there and should run the code directly.
    pub fn post_on_main<F>(&self, job: F) -> ExecutorResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_main_thread() {
            return Err(ExecutorError::AlreadyOnMainThread);
        }
        if self.is_disposed() {
            return Err(ExecutorError::Disposed);
        }
        self.shared
            .tx
            .send(MainCommand::Run(Box::new(job)))
            .map_err(|_| ExecutorError::Disposed)
    }

    /// Returns the main-context handle. Only available on the main thread.
    pub fn main_context(&self) -> ExecutorResult<MainContext> {
        if !self.is_main_thread() {
            return Err(ExecutorError::NotOnMainThread);
        }
        MainContext::current().ok_or(ExecutorError::Disposed)
    }

    /// Runs `job` on a worker thread. Must be called from main.
    pub fn run_in_background<T, F>(&self, name: &str, job: F) -> ExecutorResult<Task<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        self.main_context()?.run_in_background(name, job)
    }

    /// Arms a one-shot timer on the main context. Must be called from main.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> ExecutorResult<TimerHandle>
    where
        F: FnOnce() + 'static,
    {
        self.main_context()?.schedule(delay, callback)
    }

    /// Disarms a timer. Must be called from main.
    pub fn unschedule(&self, timer: &TimerHandle) -> ExecutorResult<bool> {
        Ok(self.main_context()?.unschedule(timer))
    }

    /// Cancels `timer` and replaces it with a new one. Must be called from main.
    pub fn reschedule<F>(&self, timer: &mut TimerHandle, delay: Duration, callback: F) -> ExecutorResult<()>
    where
        F: FnOnce() + 'static,
    {
        self.main_context()?.reschedule(timer, delay, callback)
    }

    /// Stops the main loop and the worker pool.
    ///
    /// Off-main, blocks until the main loop has exited (workers get the
    /// configured shutdown timeout). On main, the loop exits once the
    /// current job returns. Calling it twice is harmless.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(name = %self.shared.name, "Disposing executor");

        // the receiver may already be gone if the loop died
        let _ = self.shared.tx.send(MainCommand::Shutdown);

        if self.is_main_thread() {
            return;
        }
        let handle = self.shared.join.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(name = %self.shared.name, "Main loop thread panicked");
            }
        }
    }
}

// =============================================================================
// Main Loop
// =============================================================================

fn run_main_loop(
    runtime: Runtime,
    mut rx: mpsc::UnboundedReceiver<MainCommand>,
    disposed: Arc<AtomicBool>,
    shutdown_timeout: Duration,
) {
    let local = LocalSet::new();
    let main_loop = Rc::new(MainLoop::new(disposed));
    CURRENT.with(|current| *current.borrow_mut() = Some(Rc::clone(&main_loop)));
    debug!("Main loop running");

    local.block_on(&runtime, async {
        while let Some(command) = rx.recv().await {
            match command {
                MainCommand::Run(job) => {
                    trace!("Running main job");
                    job();
                }
                MainCommand::Shutdown => break,
            }
        }
    });

    main_loop.disposed.store(true, Ordering::Release);
    main_loop.abandon_all();
    CURRENT.with(|current| current.borrow_mut().take());

    drop(local);
    drop(main_loop);
    runtime.shutdown_timeout(shutdown_timeout);
    debug!("Main loop stopped");
}

/// Counters describing main-loop activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Timers armed and not yet fired.
    pub pending_timers: usize,
    /// Background jobs whose worker has not returned yet (a canceled job
    /// counts until its worker finishes).
    pub running_tasks: usize,
}

struct MainLoop {
    disposed: Arc<AtomicBool>,
    next_id: Cell<u64>,
    tasks: RefCell<HashMap<u64, Rc<dyn TaskControl>>>,
    timers: RefCell<Vec<TimerHandle>>,
}

impl MainLoop {
    fn new(disposed: Arc<AtomicBool>) -> Self {
        MainLoop {
            disposed,
            next_id: Cell::new(0),
            tasks: RefCell::new(HashMap::new()),
            timers: RefCell::new(Vec::new()),
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn track(&self, task: Rc<dyn TaskControl>) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.tasks.borrow_mut().insert(id, task);
        id
    }

    fn untrack(&self, id: u64) {
        self.tasks.borrow_mut().remove(&id);
    }

    fn track_timer(&self, timer: &TimerHandle) {
        let mut timers = self.timers.borrow_mut();
        timers.retain(TimerHandle::is_pending);
        timers.push(timer.clone());
    }

    /// Settles every pending task as canceled and disarms every timer.
    fn abandon_all(&self) {
        let tasks: Vec<_> = self.tasks.borrow_mut().drain().map(|(_, task)| task).collect();
        let timers: Vec<_> = self.timers.borrow_mut().drain(..).collect();

        let mut canceled = 0;
        for task in tasks {
            if task.cancel() {
                debug!(task = %task.name(), "Task canceled by dispose");
                canceled += 1;
            }
        }
        for timer in timers {
            timer.cancel();
        }
        info!(canceled, "Main loop abandoned pending work");
    }
}

// =============================================================================
// Main Context (main-thread handle)
// =============================================================================

/// Handle to the running main loop, usable only on the main thread.
///
/// Obtained through [`Executor::main_context`] or [`MainContext::current`].
#[derive(Clone)]
pub struct MainContext {
    inner: Rc<MainLoop>,
}

impl std::fmt::Debug for MainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContext").field("stats", &self.stats()).finish()
    }
}

impl MainContext {
    /// The main context of the calling thread, if it is a live main thread.
    pub fn current() -> Option<MainContext> {
        CURRENT
            .with(|current| current.borrow().clone())
            .filter(|main_loop| !main_loop.is_disposed())
            .map(|inner| MainContext { inner })
    }

    fn ensure_live(&self) -> ExecutorResult<()> {
        if self.inner.is_disposed() {
            Err(ExecutorError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Runs `job` on a worker thread and returns its task.
    pub fn run_in_background<T, F>(&self, name: &str, job: F) -> ExecutorResult<Task<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        self.run_cancellable(name, move |_| job())
    }

    /// Like [`MainContext::run_in_background`], but hands the job a
    /// [`CancelToken`] it can poll to stop early.
    pub fn run_cancellable<T, F>(&self, name: &str, job: F) -> ExecutorResult<Task<T>>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> Result<T, BoxError> + Send + 'static,
    {
        self.ensure_live()?;

        let token = CancelToken::new();
        let worker_token = token.clone();
        let worker = tokio::task::spawn_blocking(move || job(&worker_token));

        let task = Task::pending(name, token);
        task.set_abort(worker.abort_handle());
        let id = self.inner.track(task.control());
        trace!(task = %name, id, "Background job submitted");

        let completer = task.clone();
        let main_loop = Rc::downgrade(&self.inner);
        tokio::task::spawn_local(async move {
            let outcome = match worker.await {
                Ok(Ok(value)) => TaskOutcome::Success(value),
                Ok(Err(err)) => TaskOutcome::Failure(TaskError::Failed(err)),
                Err(err) if err.is_panic() => {
                    TaskOutcome::Failure(TaskError::Panicked(panic_message(err.into_panic())))
                }
                Err(_) => TaskOutcome::Canceled,
            };
            if let Some(main_loop) = main_loop.upgrade() {
                main_loop.untrack(id);
            }
            completer.settle(outcome);
        });

        Ok(task)
    }

    /// Arms a one-shot timer firing `callback` on main after `delay`.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> ExecutorResult<TimerHandle>
    where
        F: FnOnce() + 'static,
    {
        self.ensure_live()?;

        let timer = TimerHandle::armed();
        let armed = timer.clone();
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if armed.fire() {
                trace!(?delay, "Timer fired");
                callback();
            }
        });
        timer.set_abort(handle.abort_handle());
        self.inner.track_timer(&timer);
        Ok(timer)
    }

    /// Disarms `timer`. Returns false if it already fired or was canceled.
    pub fn unschedule(&self, timer: &TimerHandle) -> bool {
        timer.cancel()
    }

    /// Cancels whatever `timer` currently holds and arms a new timer in
    /// its place.
    pub fn reschedule<F>(&self, timer: &mut TimerHandle, delay: Duration, callback: F) -> ExecutorResult<()>
    where
        F: FnOnce() + 'static,
    {
        timer.cancel();
        *timer = self.schedule(delay, callback)?;
        Ok(())
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            pending_timers: self
                .inner
                .timers
                .borrow()
                .iter()
                .filter(|timer| timer.is_pending())
                .count(),
            running_tasks: self.inner.tasks.borrow().len(),
        }
    }
}

impl Scheduler for MainContext {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> ExecutorResult<TimerHandle> {
        MainContext::schedule(self, delay, callback)
    }
}
