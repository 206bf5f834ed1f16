//! One-way latch that tasks can await.
//!
//! A [`Signal`] starts unpulsed and can be pulsed exactly once. Every
//! [`Wait`] future registered before the pulse is woken by it; every wait
//! started after the pulse completes immediately.
//!
//! Signals are context-local: clones share the same latch through an `Rc`.
//!
//! # Cancel Safety
//!
//! - `wait().await`: Cancel-safe, the waiter slot is cleared on drop.
//! - Pulsing twice: the second pulse is a no-op.

use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

struct Latch {
    pulsed: Cell<bool>,
    waiters: RefCell<WaiterSlab>,
}

/// Waiter storage that reuses vacated slots, so a long-lived signal that many
/// short waits come and go on stays bounded by its peak concurrent waiters.
#[derive(Default)]
struct WaiterSlab {
    entries: SmallVec<[Option<Waker>; 2]>,
    free_slots: Vec<usize>,
}

impl WaiterSlab {
    fn insert(&mut self, waker: Waker) -> usize {
        if let Some(index) = self.free_slots.pop() {
            self.entries[index] = Some(waker);
            index
        } else {
            self.entries.push(Some(waker));
            self.entries.len() - 1
        }
    }

    fn remove(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            if entry.take().is_some() {
                self.free_slots.push(index);
            }
        }
        // Trim vacant tail entries.
        while matches!(self.entries.last(), Some(None)) {
            let tail = self.entries.len() - 1;
            self.entries.pop();
            if let Some(pos) = self.free_slots.iter().position(|&i| i == tail) {
                self.free_slots.swap_remove(pos);
            }
        }
    }

    fn active_count(&self) -> usize {
        self.entries.iter().filter(|w| w.is_some()).count()
    }
}

/// A one-shot, shareable "it happened" latch.
///
/// # Example
///
/// ```
/// use localtimer::sync::Signal;
///
/// let signal = Signal::new();
/// let observer = signal.clone();
/// assert!(!observer.is_pulsed());
///
/// signal.pulse();
/// assert!(observer.is_pulsed());
/// ```
#[derive(Clone)]
pub struct Signal {
    latch: Rc<Latch>,
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("pulsed", &self.latch.pulsed.get())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    /// Creates an unpulsed signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            latch: Rc::new(Latch {
                pulsed: Cell::new(false),
                waiters: RefCell::new(WaiterSlab::default()),
            }),
        }
    }

    /// True once [`pulse`](Self::pulse) has been called on any clone.
    #[must_use]
    pub fn is_pulsed(&self) -> bool {
        self.latch.pulsed.get()
    }

    /// Trips the latch and wakes every waiter. Returns `false` if the signal
    /// was already pulsed.
    pub fn pulse(&self) -> bool {
        if self.latch.pulsed.replace(true) {
            return false;
        }
        let waiters = std::mem::take(&mut *self.latch.waiters.borrow_mut());
        for waker in waiters.entries.into_iter().flatten() {
            waker.wake();
        }
        true
    }

    /// Returns a future that completes once the signal is pulsed.
    #[must_use]
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            signal: self,
            slot: None,
        }
    }

    /// Number of tasks currently blocked on this signal.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.latch.waiters.borrow().active_count()
    }

    /// Slots currently allocated for waiters, live or vacant.
    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.latch.waiters.borrow().entries.len()
    }

    /// True if both values share one latch.
    #[must_use]
    pub fn same_latch(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.latch, &other.latch)
    }
}

/// Future returned by [`Signal::wait`].
#[must_use = "futures do nothing unless polled"]
pub struct Wait<'a> {
    signal: &'a Signal,
    slot: Option<usize>,
}

impl fmt::Debug for Wait<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("pulsed", &self.signal.is_pulsed())
            .field("slot", &self.slot)
            .finish()
    }
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.signal.is_pulsed() {
            this.slot = None;
            return Poll::Ready(());
        }

        let mut waiters = this.signal.latch.waiters.borrow_mut();
        match this.slot {
            Some(slot) => match &mut waiters.entries[slot] {
                Some(existing) if existing.will_wake(cx.waker()) => {}
                entry => *entry = Some(cx.waker().clone()),
            },
            None => {
                this.slot = Some(waiters.insert(cx.waker().clone()));
            }
        }
        Poll::Pending
    }
}

impl Drop for Wait<'_> {
    fn drop(&mut self) {
        if self.signal.is_pulsed() {
            return;
        }
        if let Some(slot) = self.slot.take() {
            self.signal.latch.waiters.borrow_mut().remove(slot);
        }
    }
}
