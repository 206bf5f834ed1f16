//! Task storage and polling for the local runtime.
//!
//! Tasks live in a generational [`Arena`]. A task's future is taken out of its
//! slot while it is being polled, so a task may spawn (or eagerly run) other
//! tasks from inside its own poll without re-entering a borrow.

use super::waker::{TaskWaker, WakerState};
use crate::util::{Arena, ArenaIndex};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

struct TaskSlot {
    /// `None` while the task is being polled.
    future: Option<LocalTask>,
    scheduler: Arc<TaskWaker>,
    waker: Waker,
}

pub(crate) struct Executor {
    tasks: RefCell<Arena<TaskSlot>>,
    wakers: Arc<WakerState>,
    polls: Cell<u64>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("tasks", &self.tasks.borrow().len())
            .field("polls", &self.polls.get())
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub(crate) fn new() -> Self {
        Self {
            tasks: RefCell::new(Arena::new()),
            wakers: Arc::new(WakerState::new()),
            polls: Cell::new(0),
        }
    }

    pub(crate) fn wakers(&self) -> &Arc<WakerState> {
        &self.wakers
    }

    fn insert(&self, future: LocalTask) -> ArenaIndex {
        let wakers = &self.wakers;
        self.tasks.borrow_mut().insert_with(|id| {
            let (scheduler, waker) = wakers.waker_for(id);
            TaskSlot {
                future: Some(future),
                scheduler,
                waker,
            }
        })
    }

    /// Queues a task for its first poll on the next turn.
    pub(crate) fn spawn(&self, future: LocalTask) -> ArenaIndex {
        let id = self.insert(future);
        if let Some(slot) = self.tasks.borrow().get(id) {
            slot.scheduler.schedule();
        }
        tracing::trace!(task = ?id, "task spawned");
        id
    }

    /// Inserts a task and polls it once right away.
    pub(crate) fn spawn_now(&self, future: LocalTask) -> ArenaIndex {
        let id = self.insert(future);
        tracing::trace!(task = ?id, "task spawned eagerly");
        self.poll_task(id);
        id
    }

    /// Polls one task. Returns `true` if it completed.
    pub(crate) fn poll_task(&self, id: ArenaIndex) -> bool {
        let taken = {
            let mut tasks = self.tasks.borrow_mut();
            tasks.get_mut(id).and_then(|slot| {
                slot.scheduler.clear();
                slot.future.take().map(|future| (future, slot.waker.clone()))
            })
        };
        // Stale id (task already finished) or a nested poll of a task that is
        // already on the stack.
        let Some((mut future, waker)) = taken else {
            return false;
        };

        self.polls.set(self.polls.get() + 1);
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                let finished = self.tasks.borrow_mut().remove(id);
                drop(finished);
                drop(future);
                tracing::trace!(task = ?id, "task finished");
                true
            }
            Poll::Pending => {
                if let Some(slot) = self.tasks.borrow_mut().get_mut(id) {
                    slot.future = Some(future);
                }
                false
            }
        }
    }

    /// Polls up to `budget` woken tasks. Returns how many were polled.
    pub(crate) fn run_ready(&self, budget: u32) -> u32 {
        let mut polled = 0;
        while polled < budget {
            let Some(id) = self.wakers.next_ready() else {
                break;
            };
            self.poll_task(id);
            polled += 1;
        }
        polled
    }

    pub(crate) fn has_ready(&self) -> bool {
        self.wakers.has_ready()
    }

    pub(crate) fn task_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub(crate) fn polls(&self) -> u64 {
        self.polls.get()
    }

    /// Drops every remaining task. Futures are dropped outside the arena
    /// borrow since their destructors may cancel timers or spawn.
    pub(crate) fn shutdown(&self) -> usize {
        let drained = self.tasks.borrow_mut().drain();
        let count = drained.len();
        drop(drained);
        count
    }
}

/// Spawns tasks onto a [`LocalRuntime`](super::LocalRuntime) from anywhere on
/// its thread.
///
/// Holds a weak reference: spawning after the runtime is gone drops the task
/// with a warning.
#[derive(Clone)]
pub struct LocalSpawner {
    executor: Weak<Executor>,
}

impl fmt::Debug for LocalSpawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSpawner")
            .field("alive", &(self.executor.strong_count() > 0))
            .finish()
    }
}

impl LocalSpawner {
    pub(crate) fn new(executor: &Rc<Executor>) -> Self {
        Self {
            executor: Rc::downgrade(executor),
        }
    }

    /// Queues `future` to run on the next event-loop turn.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        match self.executor.upgrade() {
            Some(executor) => {
                executor.spawn(Box::pin(future));
            }
            None => tracing::warn!("spawn after runtime shutdown; task dropped"),
        }
    }

    /// Runs `future` until its first suspension point before returning, then
    /// leaves the rest to the event loop.
    pub fn spawn_now<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        match self.executor.upgrade() {
            Some(executor) => {
                executor.spawn_now(Box::pin(future));
            }
            None => tracing::warn!("spawn after runtime shutdown; task dropped"),
        }
    }

    /// Number of tasks that have not finished yet.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.executor
            .upgrade()
            .map_or(0, |executor| executor.task_count())
    }
}
