//! Bounded-concurrency job queue.
//!
//! Each job is one full plan-and-generate run for a single source. The queue
//! admits jobs in submission order and keeps at most `concurrency` of them
//! active; the rest wait without polling until a slot frees up.
//!
//! The limit can be changed at any time. Raising it admits waiting jobs
//! immediately; lowering it only affects future admissions, never jobs that
//! are already running.
//!
//! A job's result goes back to whoever submitted it. One job failing has no
//! effect on the others.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

/// Concurrency used when nothing else is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Default)]
struct State {
    active: usize,
    waiting: VecDeque<oneshot::Sender<Slot>>,
}

#[derive(Debug)]
struct Inner {
    concurrency: AtomicUsize,
    state: Mutex<State>,
}

impl Inner {
    fn limit(&self) -> usize {
        self.concurrency.load(Ordering::Acquire)
    }

    /// Hand free slots to waiters, oldest first.
    fn dispatch(self: &Arc<Self>) {
        let mut state = self.state.lock();
        while state.active < self.limit() {
            let Some(waiter) = state.waiting.pop_front() else {
                break;
            };
            state.active += 1;
            if let Err(mut slot) = waiter.send(Slot::armed(self.clone())) {
                // Receiver went away; take the slot back without re-entering
                slot.inner = None;
                state.active -= 1;
            }
        }
    }

    fn release(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
        }
        self.dispatch();
    }
}

/// Permission to run one job. Frees its slot when dropped.
#[derive(Debug)]
struct Slot {
    inner: Option<Arc<Inner>>,
}

impl Slot {
    fn armed(inner: Arc<Inner>) -> Self {
        Self { inner: Some(inner) }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

/// FIFO scheduler limiting how many jobs run at once.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl JobQueue {
    /// Create a queue. A limit below 1 is treated as 1.
    pub fn new(concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                concurrency: AtomicUsize::new(concurrency.max(1)),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.inner.limit()
    }

    /// Change the limit. Jobs already running are unaffected.
    pub fn set_concurrency(&self, concurrency: usize) {
        self.inner
            .concurrency
            .store(concurrency.max(1), Ordering::Release);
        self.inner.dispatch();
    }

    /// Jobs currently running.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Jobs waiting for a slot.
    pub fn size(&self) -> usize {
        self.inner.state.lock().waiting.len()
    }

    async fn acquire(&self) -> Slot {
        loop {
            let receiver = {
                let mut state = self.inner.state.lock();
                if state.waiting.is_empty() && state.active < self.inner.limit() {
                    state.active += 1;
                    return Slot::armed(self.inner.clone());
                }
                let (sender, receiver) = oneshot::channel();
                state.waiting.push_back(sender);
                receiver
            };
            if let Ok(slot) = receiver.await {
                return slot;
            }
        }
    }

    /// Wait for a slot, then run `job` to completion and return its output.
    pub async fn run<F, T>(&self, job: F) -> T
    where
        F: Future<Output = T>,
    {
        let slot = self.acquire().await;
        debug!(
            concurrency = self.concurrency(),
            size = self.size(),
            pending = self.pending(),
            "Job admitted"
        );
        let output = job.await;
        drop(slot);
        output
    }
}
