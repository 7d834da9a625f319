#![deny(missing_docs)]

//! Incremental fiber reconciliation with time-sliced rendering.
//!
//! This crate turns immutable element trees into mutations of a host output
//! tree (a DOM or a terminal UI) through a [`Host`] trait. Work
//! is split into one unit per fiber, so a render can stop between any two
//! units and resume later; the host only ever sees fully committed trees.
//!
//! # Quick Start
//!
//! ```ignore
//! use fiberkit::{Component, Element, EventHandler, Hooks, Props, Reconciler, TimeSlice};
//!
//! fn counter(_: &Props, hooks: &mut Hooks<'_>) -> Element {
//!     let (count, set_count) = hooks.use_state(0i64);
//!     Element::build("button")
//!         .on("onClick", EventHandler::new(move |_| set_count.update(|n| n + 1)))
//!         .text(format!("clicked {count} times"))
//!         .finish()
//! }
//!
//! let mut reconciler = Reconciler::new(host);
//! reconciler.render(Element::component(Component::new(counter), Props::default()), container);
//!
//! // Drive the work in 5ms slices, e.g. once per frame
//! while !reconciler.is_idle() {
//!     reconciler.work_loop(&mut TimeSlice::new(Duration::from_millis(5)))?;
//! }
//! ```
//!
//! # Core Types
//!
//! - [`Element`] - Immutable description of desired output. Cheap to clone.
//! - [`Component`] - Function component; identity is the render function's type.
//! - [`Reconciler`] - Owns both fiber trees, the host and all component state.
//! - [`Host`] - Rendering primitives of the output tree.
//! - [`Hooks`] / [`StateSetter`] - Component state that survives re-renders.
//!
//! # Render Cycle
//!
//! ```ignore
//! reconciler.render(view, container); // start a cycle (abandons an unfinished one)
//! reconciler.step()?;                  // one unit of work
//! reconciler.work_loop(&mut deadline)?; // units until the deadline yields, then commit
//! reconciler.flush()?;                 // everything, now
//! ```
//!
//! Reconciliation matches children by position and kind only. A commit is
//! atomic: if a host call fails half way, every applied mutation is undone and
//! the error is returned.
//!
//! # Scheduling
//!
//! ```ignore
//! // One slice with a wall-clock budget
//! reconciler.work_loop(&mut TimeSlice::new(Duration::from_millis(16)))?;
//!
//! // Or let the frame loop re-arm slices until idle
//! FrameLoop::new().budget(Duration::from_millis(8)).run(&mut reconciler);
//! ```
//!
//! # Logging
//!
//! Diagnostics go through `tracing`; install a subscriber to see them.

// Internal modules
pub(crate) mod arena;
mod commit;
mod element;
mod error;
mod hash;
mod hooks;
mod host;
mod reconcile;
mod reconciler;
mod scheduler;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Core types
pub use arena::{EffectTag, Fiber, FiberArena, FiberId, FiberKind, HookId, HookRecord, HookStore};
pub use element::{
    Component, Element, ElementBuilder, ElementKind, Event, EventHandler, PropValue, Props,
    TEXT_VALUE, props,
};
pub use hooks::{Hooks, StateSetter};
pub use host::{EVENT_PREFIX, Host, as_event, event_name};
pub use reconciler::{
    DEFAULT_CATCH_COMPONENT_PANICS, FiberSnapshot, Phase, Reconciler, ReconcilerConfig,
};

// Commit results and errors
pub use commit::{CommitReport, ComponentFault};
pub use error::{HostError, ReconcileError, Result};

// Scheduling (for custom event loops)
pub use scheduler::{
    DEFAULT_FRAME_BUDGET, DEFAULT_YIELD_THRESHOLD, Deadline, FrameLoop, FrameStats, IdleDeadline,
    StepBudget, TimeSlice, Unbounded, WorkStatus,
};

pub use hash::{PROPS_SEED, PropsHasher};

#[cfg(test)]
mod tests;
