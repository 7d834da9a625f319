//! Child reconciliation: one level of the dual-tree diff.
//!
//! The new element list of a parent is walked in lockstep with the parent's
//! previous child chain (`parent.alternate.child`). Position plus kind is the
//! only matching rule: there are no keys, so a reordered list of same-kind
//! children is all updates, and a kind change at a position is a delete plus
//! a place.

use crate::arena::{EffectTag, Fiber, FiberArena, FiberId};
use crate::commit::PendingDeletion;
use crate::element::Element;

/// Rebuild the child chain of `parent` from `elements`.
///
/// The chain is always brand new: every produced fiber is freshly inserted,
/// even when it reuses the output node of its old counterpart. Old fibers
/// without a match are tagged `Delete` and appended to `deletions`.
pub(crate) fn reconcile_children<N: Clone>(
    fibers: &mut FiberArena<N>,
    deletions: &mut Vec<PendingDeletion>,
    parent: FiberId,
    elements: &[Element],
) {
    let mut old = fibers
        .get(parent)
        .and_then(|p| p.alternate)
        .and_then(|alt| fibers.get(alt))
        .and_then(|alt| alt.child);
    let mut previous: Option<FiberId> = None;
    let mut first: Option<FiberId> = None;
    let mut index = 0;

    while index < elements.len() || old.is_some() {
        let element = elements.get(index);
        let old_id = old.filter(|id| fibers.get(*id).is_some());
        // Owned copy of the reused output, so no arena borrow outlives this.
        let reused = match (old_id.and_then(|id| fibers.get(id)), element) {
            (Some(fiber), Some(element)) if fiber.kind.matches(element.kind()) => {
                Some(fiber.output.clone())
            }
            _ => None,
        };

        let mut produced = None;
        if let (Some(output), Some(old_id), Some(element)) = (reused, old_id, element) {
            cov_mark::hit!(reconcile_reused_output);
            let fiber =
                Fiber::from_element(element, parent, output, Some(old_id), EffectTag::Update);
            produced = Some(fibers.insert(fiber));
        } else {
            if let Some(element) = element {
                cov_mark::hit!(reconcile_placed_new_fiber);
                let fiber = Fiber::from_element(element, parent, None, None, EffectTag::Place);
                produced = Some(fibers.insert(fiber));
            }
            if let Some(old_id) = old_id {
                cov_mark::hit!(reconcile_deleted_old_fiber);
                if let Some(stale) = fibers.get_mut(old_id) {
                    deletions.push(PendingDeletion {
                        fiber: old_id,
                        previous: stale.effect,
                    });
                    stale.effect = EffectTag::Delete;
                }
            }
        }

        old = old.and_then(|id| fibers.get(id)).and_then(|f| f.sibling);

        if let Some(id) = produced {
            match previous {
                None => first = Some(id),
                Some(prev) => {
                    if let Some(prev) = fibers.get_mut(prev) {
                        prev.sibling = Some(id);
                    }
                }
            }
            previous = Some(id);
        }
        index += 1;
    }

    if let Some(parent) = fibers.get_mut(parent) {
        parent.child = first;
    }
}
