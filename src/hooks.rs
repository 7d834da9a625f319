//! State hooks for function components.
//!
//! A component receives a [`Hooks`] context on every visit and declares its
//! state slots through [`Hooks::use_state`]:
//!
//! ```ignore
//! fn counter(_: &Props, hooks: &mut Hooks<'_>) -> Element {
//!     let (count, set_count) = hooks.use_state(0i64);
//!     Element::build("button")
//!         .on("onClick", EventHandler::new(move |_| set_count.update(|n| n + 1)))
//!         .text(format!("count: {count}"))
//!         .finish()
//! }
//! ```
//!
//! # Call order
//!
//! Slots are matched across renders by call order alone. A component must call
//! `use_state` the same number of times, in the same order, on every render:
//! never inside a condition or a loop whose length changes. Breaking this rule
//! does not corrupt memory, but the component reads the wrong slot; a slot
//! read back as a different type starts over from its initial value.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::arena::{ErasedUpdate, HookId, HookRecord, HookStore, StateValue};

/// Hook context handed to a component for one visit.
pub struct Hooks<'a> {
    store: &'a HookStore,
    previous: &'a [HookRecord],
    records: Vec<HookRecord>,
    cursor: usize,
    fresh: &'a mut Vec<HookId>,
    retired: &'a mut Vec<HookId>,
    component: &'static str,
}

impl<'a> Hooks<'a> {
    /// Context for a visit whose committed counterpart produced `previous`.
    ///
    /// Cells allocated by this visit are pushed to `fresh`, cells it stops
    /// using to `retired`.
    pub(crate) fn new(
        store: &'a HookStore,
        previous: &'a [HookRecord],
        fresh: &'a mut Vec<HookId>,
        retired: &'a mut Vec<HookId>,
        component: &'static str,
    ) -> Self {
        Self {
            store,
            previous,
            records: Vec::with_capacity(previous.len()),
            cursor: 0,
            fresh,
            retired,
            component,
        }
    }

    /// Declare a state slot.
    ///
    /// Returns the slot's value for this render and a setter. On the first
    /// render the value is `initial`; afterwards `initial` is ignored and the
    /// value is the committed one with every queued update applied in order.
    pub fn use_state<T>(&mut self, initial: T) -> (T, StateSetter<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let slot = self.cursor;
        self.cursor += 1;
        let previous = self.previous;

        let reused = match previous.get(slot) {
            Some(record) if record.value.is::<T>() => Some(record),
            Some(record) => {
                cov_mark::hit!(hook_type_mismatch);
                tracing::warn!(
                    component = self.component,
                    slot,
                    expected = std::any::type_name::<T>(),
                    "state slot read as a different type, restarting from initial value"
                );
                self.retired.push(record.cell);
                None
            }
            None => None,
        };

        let record = match reused {
            Some(base) => {
                let mut value = base.value.clone();
                let pending = self.store.pending(base.cell);
                for update in &pending {
                    if let Some(next) = update(&*value) {
                        value = next;
                    }
                }
                HookRecord {
                    cell: base.cell,
                    value,
                    applied: pending.len(),
                }
            }
            None => {
                let cell = self.store.allocate();
                self.fresh.push(cell);
                HookRecord {
                    cell,
                    value: Arc::new(initial.clone()) as StateValue,
                    applied: 0,
                }
            }
        };

        let current = record.value::<T>().cloned().unwrap_or(initial);
        let setter = StateSetter {
            store: self.store.clone(),
            cell: record.cell,
            _marker: PhantomData,
        };
        self.records.push(record);
        (current, setter)
    }

    /// Number of slots declared so far on this visit.
    pub fn len(&self) -> usize {
        self.cursor
    }

    /// Whether no slot was declared yet.
    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// End the visit: retire slots the previous render had and this one did
    /// not declare, and hand back the new records.
    pub(crate) fn finish(self) -> Vec<HookRecord> {
        if self.previous.len() > self.records.len() {
            cov_mark::hit!(hook_slots_shrunk);
            tracing::warn!(
                component = self.component,
                before = self.previous.len(),
                after = self.records.len(),
                "component declared fewer state slots than on its last render"
            );
            self.retired
                .extend(self.previous[self.records.len()..].iter().map(|r| r.cell));
        }
        self.records
    }
}

impl fmt::Debug for Hooks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("component", &self.component)
            .field("cursor", &self.cursor)
            .field("previous", &self.previous.len())
            .finish_non_exhaustive()
    }
}

/// Handle that schedules updates to one state slot.
///
/// Setters are cheap to clone and may be moved into event handlers or other
/// threads. Every call requests a new render cycle, even when the new value
/// equals the old one. A setter whose component was unmounted does nothing.
pub struct StateSetter<T> {
    store: HookStore,
    cell: HookId,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cell: self.cell,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("cell", &self.cell)
            .finish()
    }
}

impl<T> StateSetter<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Replace the value.
    pub fn set(&self, value: T) {
        self.enqueue(Arc::new(move |_| Some(Arc::new(value.clone()) as StateValue)));
    }

    /// Compute the next value from the previous one.
    ///
    /// `f` may run more than once for the same update if a render that
    /// applied it is abandoned, so it should be pure.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.enqueue(Arc::new(move |value| {
            value
                .downcast_ref::<T>()
                .map(|value| Arc::new(f(value)) as StateValue)
        }));
    }

    /// Cell this setter targets.
    pub fn cell(&self) -> HookId {
        self.cell
    }

    fn enqueue(&self, update: ErasedUpdate) {
        if self.store.enqueue(self.cell, update) {
            tracing::trace!(cell = ?self.cell, "state update queued");
        } else {
            tracing::warn!(cell = ?self.cell, "state update for an unmounted component ignored");
        }
    }
}
