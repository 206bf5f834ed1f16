//! Wakers for the local executor.
//!
//! Wakers must be `Send + Sync` even though the executor is not, so a woken
//! task is reported by pushing its id onto a lock-free queue that the event
//! loop drains. Each task's waker carries a `queued` flag so repeated wakes
//! before the next poll enqueue the task only once.
//!
//! Note: This implementation uses safe Rust only (no unsafe).

use crate::util::ArenaIndex;
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Shared state for the waker system.
#[derive(Debug)]
pub(crate) struct WakerState {
    ready: SegQueue<ArenaIndex>,
    root_woken: AtomicBool,
}

impl WakerState {
    pub(crate) fn new() -> Self {
        Self {
            ready: SegQueue::new(),
            root_woken: AtomicBool::new(true),
        }
    }

    /// Creates the waker for a spawned task.
    pub(crate) fn waker_for(self: &Arc<Self>, task: ArenaIndex) -> (Arc<TaskWaker>, Waker) {
        let inner = Arc::new(TaskWaker {
            state: Arc::clone(self),
            task,
            queued: AtomicBool::new(false),
        });
        let waker = Waker::from(Arc::clone(&inner));
        (inner, waker)
    }

    /// Creates the waker handed to the root future of `block_on`.
    pub(crate) fn root_waker(self: &Arc<Self>) -> Waker {
        Waker::from(Arc::new(RootWaker {
            state: Arc::clone(self),
        }))
    }

    /// Pops the next woken task.
    pub(crate) fn next_ready(&self) -> Option<ArenaIndex> {
        self.ready.pop()
    }

    /// True if any task is waiting to be polled.
    pub(crate) fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Clears and returns the root future's wake flag.
    pub(crate) fn take_root_wake(&self) -> bool {
        self.root_woken.swap(false, Ordering::AcqRel)
    }

    /// True if the root future was woken since it was last polled.
    pub(crate) fn root_woken(&self) -> bool {
        self.root_woken.load(Ordering::Acquire)
    }

    pub(crate) fn wake_root(&self) {
        self.root_woken.store(true, Ordering::Release);
    }
}

/// The waker of one spawned task.
#[derive(Debug)]
pub(crate) struct TaskWaker {
    state: Arc<WakerState>,
    task: ArenaIndex,
    queued: AtomicBool,
}

impl TaskWaker {
    /// Marks the task as no longer queued. Called right before it is polled so
    /// wakes during the poll enqueue it again.
    pub(crate) fn clear(&self) {
        self.queued.store(false, Ordering::Release);
    }

    pub(crate) fn schedule(&self) {
        if !self.queued.swap(true, Ordering::AcqRel) {
            self.state.ready.push(self.task);
        }
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

struct RootWaker {
    state: Arc<WakerState>,
}

impl Wake for RootWaker {
    fn wake(self: Arc<Self>) {
        self.state.wake_root();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.state.wake_root();
    }
}
