// Hook arena - storage for component state cells
//
// A state cell is the persistent half of a `use_state` slot:
// - the queue of updates enqueued by setters since the last commit
// - a generation, so a setter outliving its component cannot hit a reused slot
//
// The value itself is NOT stored here. Each render writes the value it
// computed into the fiber's HookRecord, and the next render starts from the
// committed fiber's record (its alternate). Updates leave the queue only when a
// render that applied them is committed, so an abandoned render never loses
// an update.
//
// The arena is shared between the reconciler and every StateSetter handle, and
// also carries the "re-render requested" flag. Multiple setter calls between two
// work loop invocations set the flag once, so they coalesce into one cycle.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use slab::Slab;

/// Type-erased state value.
pub type StateValue = Arc<dyn Any + Send + Sync>;

/// Type-erased update: returns None when the value has an unexpected type.
pub type ErasedUpdate = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<StateValue> + Send + Sync>;

/// Generation-checked handle to a state cell.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct HookId {
    index: u32,
    generation: u32,
}

impl HookId {
    /// Convert to usize for slab indexing
    pub fn index(self) -> usize {
        self.index as usize
    }
}

struct HookCell {
    generation: u32,
    queue: Vec<ErasedUpdate>,
}

/// Per-fiber record of one `use_state` slot, in call order.
#[derive(Clone)]
pub struct HookRecord {
    pub(crate) cell: HookId,
    pub(crate) value: StateValue,
    pub(crate) applied: usize,
}

impl HookRecord {
    /// Cell backing this slot.
    pub fn cell(&self) -> HookId {
        self.cell
    }

    /// Value the component saw on the visit that produced this record.
    pub fn value<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Number of queued updates folded into [`HookRecord::value`].
    pub fn applied(&self) -> usize {
        self.applied
    }
}

impl fmt::Debug for HookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRecord")
            .field("cell", &self.cell)
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct HookArena {
    cells: Slab<HookCell>,
    next_generation: u32,
    rerender_requested: bool,
}

/// Shared storage for every state cell of one reconciler.
#[derive(Clone, Default)]
pub struct HookStore {
    inner: Arc<Mutex<HookArena>>,
}

impl fmt::Debug for HookStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.inner.lock();
        f.debug_struct("HookStore")
            .field("cells", &arena.cells.len())
            .field("rerender_requested", &arena.rerender_requested)
            .finish()
    }
}

impl HookStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh cell with an empty queue.
    pub fn allocate(&self) -> HookId {
        let mut arena = self.inner.lock();
        let generation = arena.next_generation;
        arena.next_generation = arena.next_generation.wrapping_add(1);
        let entry = arena.cells.vacant_entry();
        let index = entry.key() as u32;
        entry.insert(HookCell {
            generation,
            queue: Vec::new(),
        });
        HookId { index, generation }
    }

    /// Free a cell. Stale ids are ignored.
    pub fn release(&self, id: HookId) -> bool {
        let mut arena = self.inner.lock();
        let live = arena
            .cells
            .get(id.index())
            .is_some_and(|cell| cell.generation == id.generation);
        if live {
            arena.cells.remove(id.index());
        }
        live
    }

    /// Whether `id` still refers to a live cell.
    pub fn contains(&self, id: HookId) -> bool {
        let arena = self.inner.lock();
        arena
            .cells
            .get(id.index())
            .is_some_and(|cell| cell.generation == id.generation)
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.inner.lock().cells.len()
    }

    /// Whether no cells are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an update to a cell's queue and request a re-render.
    ///
    /// Returns false (and requests nothing) if the cell was freed.
    pub fn enqueue(&self, id: HookId, update: ErasedUpdate) -> bool {
        let mut arena = self.inner.lock();
        let Some(cell) = arena
            .cells
            .get_mut(id.index())
            .filter(|cell| cell.generation == id.generation)
        else {
            return false;
        };
        cell.queue.push(update);
        if !arena.rerender_requested {
            arena.rerender_requested = true;
        } else {
            cov_mark::hit!(rerender_request_coalesced);
        }
        true
    }

    /// Snapshot of a cell's pending updates, in enqueue order.
    ///
    /// The lock is released before the caller runs any update, so an update
    /// that itself calls a setter cannot deadlock.
    pub fn pending(&self, id: HookId) -> Vec<ErasedUpdate> {
        let arena = self.inner.lock();
        arena
            .cells
            .get(id.index())
            .filter(|cell| cell.generation == id.generation)
            .map(|cell| cell.queue.clone())
            .unwrap_or_default()
    }

    /// Drop the first `count` updates of a cell (those a committed render applied).
    pub fn drain_applied(&self, id: HookId, count: usize) {
        if count == 0 {
            return;
        }
        let mut arena = self.inner.lock();
        if let Some(cell) = arena
            .cells
            .get_mut(id.index())
            .filter(|cell| cell.generation == id.generation)
        {
            let count = count.min(cell.queue.len());
            cell.queue.drain(..count);
        }
    }

    /// Take the re-render flag, clearing it.
    pub fn take_rerender_request(&self) -> bool {
        std::mem::take(&mut self.inner.lock().rerender_requested)
    }

    /// Whether a setter asked for a re-render since the flag was last taken.
    pub fn is_rerender_requested(&self) -> bool {
        self.inner.lock().rerender_requested
    }
}
