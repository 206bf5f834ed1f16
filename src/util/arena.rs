//! Generational slot storage.
//!
//! Timer tokens and runtime tasks live in an [`Arena`] and are referred to by
//! an [`ArenaIndex`]: a slot number paired with the generation that slot had
//! when the value was inserted. Removing a value bumps the slot's generation,
//! so an index that outlived its value is detected instead of silently
//! aliasing whatever reuses the slot next.

use core::fmt;

/// A slot number plus the generation it was issued under.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaIndex {
    index: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Creates an index by hand (tests and diagnostics).
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot number.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation counter.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}:{})", self.index, self.generation)
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

impl<T> Slot<T> {
    const fn generation(&self) -> u32 {
        match self {
            Self::Occupied { generation, .. } | Self::Vacant { generation, .. } => *generation,
        }
    }
}

/// Vec-backed storage with a free list and per-slot generations.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when no slot is occupied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` and returns the index that now names it.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots would be needed.
    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.insert_with(|_| value)
    }

    /// Stores the value built by `f`, which receives the index it will live at.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots would be needed.
    pub fn insert_with<F>(&mut self, f: F) -> ArenaIndex
    where
        F: FnOnce(ArenaIndex) -> T,
    {
        let idx = match self.free_head {
            Some(free) => {
                let slot = &self.slots[free as usize];
                if let Slot::Vacant { next_free, .. } = slot {
                    self.free_head = *next_free;
                } else {
                    panic!("arena free list points at occupied slot {free}");
                }
                ArenaIndex::new(free, slot.generation())
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("arena overflow");
                self.slots.push(Slot::Vacant {
                    next_free: None,
                    generation: 0,
                });
                ArenaIndex::new(index, 0)
            }
        };
        self.slots[idx.index as usize] = Slot::Occupied {
            value: f(idx),
            generation: idx.generation,
        };
        self.len += 1;
        idx
    }

    /// Removes and returns the value named by `index`.
    ///
    /// Returns `None` when the index is stale or was never issued.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let slot = self.slots.get_mut(index.index as usize)?;
        if !matches!(slot, Slot::Occupied { generation, .. } if *generation == index.generation) {
            return None;
        }
        let vacant = Slot::Vacant {
            next_free: self.free_head,
            generation: index.generation.wrapping_add(1),
        };
        match core::mem::replace(slot, vacant) {
            Slot::Occupied { value, .. } => {
                self.free_head = Some(index.index);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    /// Borrows the value named by `index`, if it is still live.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        match self.slots.get(index.index as usize)? {
            Slot::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Mutably borrows the value named by `index`, if it is still live.
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        match self.slots.get_mut(index.index as usize)? {
            Slot::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// True if `index` names a live value.
    #[must_use]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Removes every live value, returning them in slot order.
    ///
    /// Every slot keeps its generation history, so indices issued before the
    /// drain stay stale afterwards.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        let mut free_head = None;
        for (i, slot) in self.slots.iter_mut().enumerate().rev() {
            let generation = match slot {
                Slot::Occupied { generation, .. } => generation.wrapping_add(1),
                Slot::Vacant { generation, .. } => *generation,
            };
            let vacant = Slot::Vacant {
                next_free: free_head,
                generation,
            };
            if let Slot::Occupied { value, .. } = core::mem::replace(slot, vacant) {
                out.push(value);
            }
            free_head = Some(i as u32);
        }
        out.reverse();
        self.free_head = free_head;
        self.len = 0;
        out
    }
}
