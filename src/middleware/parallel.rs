//! Bounded parallel decoding.
//!
//! The [`ParallelBlocker`] sits at the head of the pipeline and owns one
//! [`ParallelDecodingState`] per decode. The [`ParallelDispatcher`] sits
//! right after the enumerator: each unit it receives is forked onto its own
//! task once a permit is available, and the enumerator moves on. The blocker
//! returns only when every dispatched unit has finished, reporting the first
//! fault any of them raised. Dropping the blocker's future aborts every
//! unit task still running.
//!
//! Without a blocker upstream the dispatcher runs units inline.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::pipeline::{DecodeContext, Middleware, Next, ParallelExtension};

// =============================================================================
// Shared state
// =============================================================================

/// Coordination state of one parallel decode.
pub struct ParallelDecodingState {
    semaphore: Arc<Semaphore>,
    /// Units still running, plus one held by the blocker until enumeration
    /// is complete
    outstanding: AtomicUsize,
    faulted: AtomicBool,
    first_fault: Mutex<Option<DecodeError>>,
    suppressed: Mutex<Vec<DecodeError>>,
    completed: Notify,
    tasks: Mutex<JoinSet<()>>,
}

impl ParallelDecodingState {
    pub fn new(max_degree: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_degree.max(1))),
            outstanding: AtomicUsize::new(1),
            faulted: AtomicBool::new(false),
            first_fault: Mutex::new(None),
            suppressed: Mutex::new(Vec::new()),
            completed: Notify::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Spawn a unit task owned by this decode. Finished tasks are reaped
    /// on the way so the set only holds running units.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Abort every unit task still running.
    pub fn abort_all(&self) {
        let tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        if !tasks.is_empty() {
            debug!(running = tasks.len(), "Aborting parallel decode units");
        }
        drop(tasks);
    }

    pub fn begin_unit(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_unit(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.completed.notify_one();
        }
    }

    /// Record a unit failure. The first one wins; later ones are kept as
    /// suppressed, except the aborts and cancellations the first fault
    /// caused.
    pub fn record_fault(&self, error: DecodeError) {
        let mut first = self.first_fault.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            debug!(error = %error, "Parallel decode faulted");
            *first = Some(error);
            self.faulted.store(true, Ordering::SeqCst);
            return;
        }
        drop(first);

        if matches!(error, DecodeError::Aborted | DecodeError::Cancelled) {
            return;
        }
        warn!(error = %error, "Suppressed decode fault");
        self.suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    /// Wait until the outstanding count drops to zero.
    pub async fn wait_for_completion(&self) {
        while self.outstanding.load(Ordering::SeqCst) != 0 {
            self.completed.notified().await;
        }
    }

    pub fn take_fault(&self) -> Option<DecodeError> {
        self.first_fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn suppressed_faults(&self) -> Vec<DecodeError> {
        self.suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// =============================================================================
// Blocker
// =============================================================================

/// Aborts the decode's unit tasks when the blocker's frame goes away,
/// including when its future is dropped mid-decode.
struct AbortOnDrop(Arc<ParallelDecodingState>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort_all();
    }
}

/// Runs the rest of the pipeline under a fresh [`ParallelDecodingState`]
/// and waits for every dispatched unit.
pub struct ParallelBlocker {
    max_degree: usize,
}

impl ParallelBlocker {
    pub fn new(max_degree: usize) -> Self {
        Self { max_degree }
    }
}

#[async_trait]
impl Middleware for ParallelBlocker {
    fn name(&self) -> &'static str {
        "ParallelBlocker"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        let state = Arc::new(ParallelDecodingState::new(self.max_degree));
        let _tasks = AbortOnDrop(Arc::clone(&state));
        let mut parallel = ctx.fork();
        parallel.parallel = ParallelExtension {
            state: Some(Arc::clone(&state)),
            exclusive: Some(Arc::new(tokio::sync::Mutex::new(()))),
        };

        if let Err(e) = next.run(&mut parallel).await {
            state.record_fault(e);
        }
        state.end_unit();
        state.wait_for_completion().await;

        let suppressed = state.suppressed_faults().len();
        if suppressed > 0 {
            debug!(suppressed, "Parallel decode finished with suppressed faults");
        }
        match state.take_fault() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Hands each unit to its own task, bounded by the blocker's semaphore.
pub struct ParallelDispatcher;

/// Marks a dispatched unit finished however its task ends.
struct UnitGuard {
    state: Arc<ParallelDecodingState>,
    finished: bool,
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.state.record_fault(DecodeError::Aborted);
        }
        self.state.end_unit();
    }
}

#[async_trait]
impl Middleware for ParallelDispatcher {
    fn name(&self) -> &'static str {
        "ParallelDispatcher"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        let Some(state) = ctx.parallel.state.clone() else {
            return next.run(ctx).await;
        };
        if state.is_faulted() {
            return Err(DecodeError::Aborted);
        }

        let semaphore = Arc::clone(&state.semaphore);
        let permit = tokio::select! {
            permit = semaphore.acquire_owned() => permit.map_err(|_| DecodeError::Aborted)?,
            _ = ctx.cancellation.cancelled() => return Err(DecodeError::Cancelled),
        };

        state.begin_unit();
        let mut guard = UnitGuard {
            state,
            finished: false,
        };
        let mut unit = ctx.fork();
        let next = next.clone();
        let owner = Arc::clone(&guard.state);
        owner.spawn(async move {
            let _permit = permit;
            if let Err(e) = next.run(&mut unit).await {
                guard.state.record_fault(e);
            }
            guard.finished = true;
        });
        Ok(())
    }
}

// =============================================================================
// Exclusive access
// =============================================================================

/// Serializes the rest of the chain across dispatched units.
///
/// Placed in front of a decompressor that cannot run concurrently. Without
/// a blocker upstream it is a pass-through.
pub struct ExclusiveAccess;

#[async_trait]
impl Middleware for ExclusiveAccess {
    fn name(&self) -> &'static str {
        "ExclusiveAccess"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        match ctx.parallel.exclusive.clone() {
            Some(lock) => {
                let _held = lock.lock_owned().await;
                next.run(ctx).await
            }
            None => next.run(ctx).await,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
