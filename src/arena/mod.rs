// Arena-based storage for reconciler state
//
// This module provides two arenas:
// - Fiber arena: stores Fibers of the committed tree and the tree under
//   construction, addressed by FiberId
// - Hook arena: stores state cells (update queues) shared with StateSetter
//   handles, addressed by generation-checked HookIds
//
// Unlike a global registry, both arenas are owned by one Reconciler, so
// independent reconcilers never share fibers or state.

pub mod fiber_arena;
pub mod hook_arena;

pub use fiber_arena::{EffectTag, Fiber, FiberArena, FiberId, FiberKind};
pub use hook_arena::{ErasedUpdate, HookId, HookRecord, HookStore, StateValue};
