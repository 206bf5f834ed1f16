//! Priority queue of pending timer tokens.
//!
//! [`TimerQueue`] is an intrusive binary min-heap: tokens live in an
//! [`Arena`], the heap backbone is a compact `Vec<ArenaIndex>`, and every
//! token remembers its own heap position. That gives O(log n) removal of an
//! arbitrary token, which is what cancellation needs.
//!
//! # Ordering
//!
//! Earliest `next_fire` first. Equal fire times are broken by insertion
//! sequence (first scheduled, first fired). Requeueing a token assigns it a
//! fresh sequence number.
//!
//! # Detached tokens
//!
//! [`pop`](TimerQueue::pop) only detaches the minimum from the heap. The token
//! itself stays in the arena, still owned by the queue, until it is either put
//! back with [`requeue`](TimerQueue::requeue) (repeating timers) or dropped
//! with [`release`](TimerQueue::release) (one-shot timers, after their
//! callback returned). This keeps a firing token's handle valid for exactly as
//! long as the token is "pending or currently firing".
//!
//! # Invariants
//!
//! - For every heap position `i`: `tokens[heap[i]].heap_pos == Some(i)`.
//! - For every position `i` with parent `p`: `key(heap[p]) <= key(heap[i])`.
//! - Detached tokens have `heap_pos == None`.

use super::handler::TimerCallback;
use crate::types::Time;
use crate::util::{Arena, ArenaIndex};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// One scheduled wake-up.
pub struct TimerToken {
    next_fire: Time,
    interval: Duration,
    callback: Rc<dyn TimerCallback>,
    heap_pos: Option<usize>,
    seq: u64,
}

impl TimerToken {
    /// Creates a token. A zero `interval` makes it one-shot.
    #[must_use]
    pub fn new(next_fire: Time, interval: Duration, callback: Rc<dyn TimerCallback>) -> Self {
        Self {
            next_fire,
            interval,
            callback,
            heap_pos: None,
            seq: 0,
        }
    }

    /// When this token fires next.
    #[must_use]
    pub const fn next_fire(&self) -> Time {
        self.next_fire
    }

    /// Time between rings; zero for one-shot tokens.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// True if the token re-arms itself after firing.
    #[must_use]
    pub const fn is_repeating(&self) -> bool {
        !self.interval.is_zero()
    }

    /// The capability invoked when the token fires.
    #[must_use]
    pub fn callback(&self) -> &Rc<dyn TimerCallback> {
        &self.callback
    }

    fn key(&self) -> (Time, u64) {
        (self.next_fire, self.seq)
    }
}

impl fmt::Debug for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerToken")
            .field("next_fire", &self.next_fire)
            .field("interval", &self.interval)
            .field("heap_pos", &self.heap_pos)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Min-heap of [`TimerToken`]s keyed by next fire time.
#[derive(Debug, Default)]
pub struct TimerQueue {
    tokens: Arena<TimerToken>,
    heap: Vec<ArenaIndex>,
    next_seq: u64,
}

impl TimerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens waiting in the heap.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when no token is waiting in the heap.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of tokens the queue owns, including detached ones.
    #[must_use]
    pub fn owned(&self) -> usize {
        self.tokens.len()
    }

    /// The token that fires soonest.
    #[must_use]
    pub fn peek(&self) -> Option<&TimerToken> {
        self.heap.first().and_then(|&idx| self.tokens.get(idx))
    }

    /// Borrows any token the queue still owns.
    #[must_use]
    pub fn get(&self, idx: ArenaIndex) -> Option<&TimerToken> {
        self.tokens.get(idx)
    }

    /// True if `idx` names a token the queue still owns.
    #[must_use]
    pub fn contains(&self, idx: ArenaIndex) -> bool {
        self.tokens.contains(idx)
    }

    /// Takes ownership of `token` and inserts it into the heap.
    pub fn push(&mut self, token: TimerToken) -> ArenaIndex {
        let idx = self.tokens.insert(token);
        self.attach(idx);
        idx
    }

    /// Detaches the soonest token from the heap and returns its index.
    ///
    /// The token stays owned by the queue; see the module docs.
    pub fn pop(&mut self) -> Option<ArenaIndex> {
        let idx = *self.heap.first()?;
        self.detach(0);
        Some(idx)
    }

    /// Detaches the soonest token if it is due at `now`.
    pub fn pop_due(&mut self, now: Time) -> Option<ArenaIndex> {
        if self.peek()?.next_fire <= now {
            self.pop()
        } else {
            None
        }
    }

    /// Puts a detached token back into the heap at a new fire time.
    ///
    /// Returns `false` if `idx` is stale. A token that is still attached is
    /// moved to its new position.
    pub fn requeue(&mut self, idx: ArenaIndex, next_fire: Time) -> bool {
        let Some(token) = self.tokens.get_mut(idx) else {
            return false;
        };
        token.next_fire = next_fire;
        let attached = token.heap_pos;
        if let Some(pos) = attached {
            self.detach(pos);
        }
        self.attach(idx);
        true
    }

    /// Drops a detached token after it has fired.
    ///
    /// Returns `None` if the token was already removed (for example canceled
    /// by its own callback).
    pub fn release(&mut self, idx: ArenaIndex) -> Option<TimerToken> {
        self.remove(idx)
    }

    /// Removes a token wherever it is, returning it if it was still owned.
    pub fn remove(&mut self, idx: ArenaIndex) -> Option<TimerToken> {
        let pos = self.tokens.get(idx)?.heap_pos;
        if let Some(pos) = pos {
            self.detach(pos);
        }
        self.tokens.remove(idx)
    }

    /// Removes every token, attached or detached.
    pub fn clear(&mut self) -> Vec<TimerToken> {
        self.heap.clear();
        self.tokens.drain()
    }

    fn attach(&mut self, idx: ArenaIndex) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let pos = self.heap.len();
        if let Some(token) = self.tokens.get_mut(idx) {
            token.seq = seq;
            token.heap_pos = Some(pos);
        }
        self.heap.push(idx);
        self.sift_up(pos);
    }

    fn detach(&mut self, pos: usize) {
        let last = self.heap.len() - 1;
        if let Some(token) = self.tokens.get_mut(self.heap[pos]) {
            token.heap_pos = None;
        }
        self.heap.swap(pos, last);
        self.heap.pop();
        if pos == last {
            return;
        }
        self.set_pos(pos);
        if self.sift_up(pos) == pos {
            self.sift_down(pos);
        }
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.fires_before(pos, parent) {
                self.swap_positions(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut soonest = pos;
            if left < len && self.fires_before(left, soonest) {
                soonest = left;
            }
            if right < len && self.fires_before(right, soonest) {
                soonest = right;
            }
            if soonest == pos {
                break;
            }
            self.swap_positions(pos, soonest);
            pos = soonest;
        }
    }

    fn fires_before(&self, a: usize, b: usize) -> bool {
        let key = |pos: usize| {
            self.tokens
                .get(self.heap[pos])
                .map_or((Time::MAX, u64::MAX), TimerToken::key)
        };
        key(a).cmp(&key(b)) == Ordering::Less
    }

    fn swap_positions(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.set_pos(a);
        self.set_pos(b);
    }

    fn set_pos(&mut self, pos: usize) {
        if let Some(token) = self.tokens.get_mut(self.heap[pos]) {
            token.heap_pos = Some(pos);
        }
    }
}
