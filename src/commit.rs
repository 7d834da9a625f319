//! Commit phase: turn a completed fiber tree into host mutations.
//!
//! Committing happens in two steps. [`plan_commit`] walks the pending
//! deletions and then the new tree and records every host call it would make,
//! without making any. [`apply_mutations`] then runs the plan; if a host call
//! fails, everything applied so far is undone in reverse order, so the output
//! tree is either fully old or fully new.
//!
//! The host only appends and removes children. The planner tracks the child
//! list of every parent it touches, so host order always equals fiber order:
//! a reused node that ends up behind a newly placed one is moved to the end
//! again. Each removal remembers the nodes that followed it, which lets its
//! undo put the child back at its old position.

use crate::arena::{EffectTag, FiberArena, FiberId};
use crate::element::{EventHandler, PropValue, Props};
use crate::error::{HostError, ReconcileError};
use crate::host::{Host, as_event};

/// One host call recorded by the planner.
#[derive(Debug, Clone)]
pub(crate) enum Mutation<N> {
    AppendChild {
        parent: N,
        child: N,
    },
    RemoveChild {
        parent: N,
        child: N,
        /// Children behind `child` at the time of removal.
        following: Vec<N>,
    },
    SetProperty {
        node: N,
        name: String,
        value: PropValue,
        previous: Option<PropValue>,
    },
    RemoveProperty {
        node: N,
        name: String,
        previous: PropValue,
    },
    AddListener {
        node: N,
        event: String,
        handler: EventHandler,
    },
    RemoveListener {
        node: N,
        event: String,
        handler: EventHandler,
    },
}

impl<N: Clone> Mutation<N> {
    pub(crate) fn apply<H>(&self, host: &mut H) -> Result<(), HostError>
    where
        H: Host<Node = N>,
    {
        match self {
            Mutation::AppendChild { parent, child } => host.append_child(parent, child),
            Mutation::RemoveChild { parent, child, .. } => host.remove_child(parent, child),
            Mutation::SetProperty {
                node, name, value, ..
            } => host.set_property(node, name, value),
            Mutation::RemoveProperty { node, name, .. } => host.remove_property(node, name),
            Mutation::AddListener {
                node,
                event,
                handler,
            } => host.add_event_listener(node, event, handler),
            Mutation::RemoveListener {
                node,
                event,
                handler,
            } => host.remove_event_listener(node, event, handler),
        }
    }

    /// The calls that undo this one, assuming every later call was undone.
    ///
    /// A removed child is appended again and the children that followed it
    /// are moved behind it, restoring the old order.
    fn inverse(&self) -> Vec<Mutation<N>> {
        let single = match self.clone() {
            Mutation::AppendChild { parent, child } => Mutation::RemoveChild {
                parent,
                child,
                following: Vec::new(),
            },
            Mutation::RemoveChild {
                parent,
                child,
                following,
            } => {
                let mut steps = vec![Mutation::AppendChild {
                    parent: parent.clone(),
                    child,
                }];
                for node in following {
                    steps.push(Mutation::RemoveChild {
                        parent: parent.clone(),
                        child: node.clone(),
                        following: Vec::new(),
                    });
                    steps.push(Mutation::AppendChild {
                        parent: parent.clone(),
                        child: node,
                    });
                }
                return steps;
            }
            Mutation::SetProperty {
                node,
                name,
                value,
                previous: Some(previous),
            } => Mutation::SetProperty {
                node,
                name,
                value: previous,
                previous: Some(value),
            },
            Mutation::SetProperty {
                node,
                name,
                value,
                previous: None,
            } => Mutation::RemoveProperty {
                node,
                name,
                previous: value,
            },
            Mutation::RemoveProperty {
                node,
                name,
                previous,
            } => Mutation::SetProperty {
                node,
                name,
                value: previous,
                previous: None,
            },
            Mutation::AddListener {
                node,
                event,
                handler,
            } => Mutation::RemoveListener {
                node,
                event,
                handler,
            },
            Mutation::RemoveListener {
                node,
                event,
                handler,
            } => Mutation::AddListener {
                node,
                event,
                handler,
            },
        };
        vec![single]
    }
}

/// Record the calls that turn `prev` props into `next` props on `node`.
///
/// Order: stale listeners off, stale properties off, new or changed
/// properties on, new or changed listeners on. Unchanged entries produce no
/// call at all; handlers compare by identity.
pub(crate) fn diff_props<N: Clone>(
    node: &N,
    prev: &Props,
    next: &Props,
    out: &mut Vec<Mutation<N>>,
) {
    let is_plain_in_next = |key: &str| {
        next.get(key)
            .is_some_and(|value| as_event(key, value).is_none())
    };

    for (key, value) in prev {
        let Some((event, handler)) = as_event(key, value) else {
            continue;
        };
        if next.get(key) != Some(value) {
            out.push(Mutation::RemoveListener {
                node: node.clone(),
                event,
                handler: handler.clone(),
            });
        }
    }

    for (key, value) in prev {
        if as_event(key, value).is_none() && !is_plain_in_next(key) {
            out.push(Mutation::RemoveProperty {
                node: node.clone(),
                name: key.clone(),
                previous: value.clone(),
            });
        }
    }

    for (key, value) in next {
        if as_event(key, value).is_some() {
            continue;
        }
        let previous = prev
            .get(key)
            .filter(|old| as_event(key, old).is_none());
        if previous != Some(value) {
            out.push(Mutation::SetProperty {
                node: node.clone(),
                name: key.clone(),
                value: value.clone(),
                previous: previous.cloned(),
            });
        }
    }

    for (key, value) in next {
        let Some((event, handler)) = as_event(key, value) else {
            continue;
        };
        if prev.get(key) != Some(value) {
            out.push(Mutation::AddListener {
                node: node.clone(),
                event,
                handler: handler.clone(),
            });
        }
    }
}

/// A fiber that left the tree, with the tag it carried before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingDeletion {
    pub(crate) fiber: FiberId,
    pub(crate) previous: EffectTag,
}

/// Component render failure caught during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFault {
    /// Debug name of the component.
    pub component: String,
    /// Panic message, if it was a string.
    pub message: String,
}

/// Summary of one successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Labels of fibers tagged `Place`, in tree order.
    pub placed: Vec<String>,
    /// Labels of fibers tagged `Update`, in tree order.
    pub updated: Vec<String>,
    /// Labels of fibers tagged `Delete`, in deletion order.
    pub deleted: Vec<String>,
    /// Host mutations applied.
    pub mutations: usize,
    /// Components that panicked during the render and were rendered empty.
    pub faults: Vec<ComponentFault>,
}

impl CommitReport {
    /// Whether the commit changed nothing on the host.
    pub fn is_noop(&self) -> bool {
        self.mutations == 0
    }
}

pub(crate) struct CommitPlan<N> {
    pub(crate) mutations: Vec<Mutation<N>>,
    pub(crate) report: CommitReport,
}

/// Child lists of the host nodes touched by one commit, as the plan leaves
/// them so far.
struct ChildLists<N> {
    lists: Vec<(N, Vec<N>)>,
}

impl<N: Clone + PartialEq> ChildLists<N> {
    fn new() -> Self {
        Self { lists: Vec::new() }
    }

    /// The list of `parent`, seeded from the committed tree on first use.
    fn of(&mut self, parent: &N, seed: impl FnOnce() -> Vec<N>) -> &mut Vec<N> {
        let index = match self.lists.iter().position(|(node, _)| node == parent) {
            Some(index) => index,
            None => {
                self.lists.push((parent.clone(), seed()));
                self.lists.len() - 1
            }
        };
        &mut self.lists[index].1
    }
}

/// Output nodes directly below `id` on the host, in fiber order.
///
/// Components own no node, so their children count as children of the
/// nearest host ancestor.
fn host_children<N: Clone>(fibers: &FiberArena<N>, id: FiberId) -> Vec<N> {
    let mut nodes = Vec::new();
    let mut stack = Vec::new();
    let mut next = fibers.get(id).and_then(|f| f.child);
    loop {
        let Some(current) = next else {
            match stack.pop() {
                Some(resume) => {
                    next = resume;
                    continue;
                }
                None => break,
            }
        };
        let Some(fiber) = fibers.get(current) else {
            next = None;
            continue;
        };
        match &fiber.output {
            Some(node) => {
                nodes.push(node.clone());
                next = fiber.sibling;
            }
            None => {
                stack.push(fiber.sibling);
                next = fiber.child;
            }
        }
    }
    nodes
}

fn push_remove<N: Clone + PartialEq>(
    parent: &N,
    child: &N,
    list: &mut Vec<N>,
    out: &mut Vec<Mutation<N>>,
) {
    let following = match list.iter().position(|node| node == child) {
        Some(index) => {
            let following = list[index + 1..].to_vec();
            list.remove(index);
            following
        }
        None => Vec::new(),
    };
    out.push(Mutation::RemoveChild {
        parent: parent.clone(),
        child: child.clone(),
        following,
    });
}

/// Plan the commit of the tree under `root`.
pub(crate) fn plan_commit<N: Clone + PartialEq>(
    fibers: &FiberArena<N>,
    root: FiberId,
    deletions: &[PendingDeletion],
) -> CommitPlan<N> {
    let mut mutations = Vec::new();
    let mut report = CommitReport::default();
    let mut lists = ChildLists::new();

    for deletion in deletions {
        let Some(fiber) = fibers.get(deletion.fiber) else {
            continue;
        };
        report.deleted.push(fiber.kind.label().to_owned());
        let Some(ancestor) = fibers.host_ancestor(deletion.fiber) else {
            continue;
        };
        let Some(parent) = fibers.get(ancestor).and_then(|f| f.output.clone()) else {
            continue;
        };
        // Components own no node: follow the child chain down to one that does.
        let mut current = Some(deletion.fiber);
        while let Some(id) = current {
            let Some(fiber) = fibers.get(id) else {
                break;
            };
            if let Some(child) = &fiber.output {
                let list = lists.of(&parent, || host_children(fibers, ancestor));
                push_remove(&parent, child, list, &mut mutations);
                break;
            }
            cov_mark::hit!(deleted_component_descends_to_host);
            current = fiber.child;
        }
    }

    for id in fibers.subtree(root) {
        let Some(fiber) = fibers.get(id) else {
            continue;
        };
        let label = fiber.kind.label().to_owned();
        match fiber.effect {
            EffectTag::Place => report.placed.push(label),
            EffectTag::Update => {
                report.updated.push(label);
                let prev = fiber
                    .alternate
                    .and_then(|alt| fibers.get(alt))
                    .map(|alt| alt.props.clone());
                if let (Some(node), Some(prev)) = (&fiber.output, prev) {
                    diff_props(node, &prev, &fiber.props, &mut mutations);
                }
            }
            EffectTag::Delete | EffectTag::None => {}
        }

        let Some(parent) = &fiber.output else {
            continue;
        };
        let wanted = host_children(fibers, id);
        if wanted.is_empty() {
            continue;
        }
        let list = lists.of(parent, || {
            fiber
                .alternate
                .map(|alt| host_children(fibers, alt))
                .unwrap_or_default()
        });
        let kept = list
            .iter()
            .zip(&wanted)
            .take_while(|(have, want)| have == want)
            .count();
        for child in &wanted[kept..] {
            if list.contains(child) {
                cov_mark::hit!(reused_node_moved_behind_placement);
                push_remove(parent, child, list, &mut mutations);
            }
            mutations.push(Mutation::AppendChild {
                parent: parent.clone(),
                child: child.clone(),
            });
            list.push(child.clone());
        }
    }

    report.mutations = mutations.len();
    CommitPlan { mutations, report }
}

/// Apply planned mutations; on failure undo the applied prefix.
pub(crate) fn apply_mutations<H>(
    host: &mut H,
    mutations: &[Mutation<H::Node>],
) -> Result<(), ReconcileError>
where
    H: Host,
{
    for (applied, mutation) in mutations.iter().enumerate() {
        tracing::trace!(?mutation, "host mutation");
        if let Err(source) = mutation.apply(host) {
            cov_mark::hit!(commit_rolled_back);
            tracing::error!(%source, applied, "commit failed, rolling back");
            for done in mutations[..applied].iter().rev() {
                for undo in done.inverse() {
                    if let Err(err) = undo.apply(host) {
                        tracing::error!(%err, mutation = ?done, "rollback step failed");
                    }
                }
            }
            return Err(ReconcileError::CommitRolledBack {
                source,
                rolled_back: applied,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::props;

    fn names(mutations: &[Mutation<u32>]) -> Vec<String> {
        mutations
            .iter()
            .map(|m| match m {
                Mutation::AppendChild { .. } => "append".to_owned(),
                Mutation::RemoveChild { .. } => "remove".to_owned(),
                Mutation::SetProperty { name, .. } => format!("set {name}"),
                Mutation::RemoveProperty { name, .. } => format!("unset {name}"),
                Mutation::AddListener { event, .. } => format!("listen {event}"),
                Mutation::RemoveListener { event, .. } => format!("unlisten {event}"),
            })
            .collect()
    }

    fn diff(prev: &Props, next: &Props) -> Vec<String> {
        let mut out = Vec::new();
        diff_props(&0u32, prev, next, &mut out);
        names(&out)
    }

    #[test]
    fn changed_property_is_the_only_call() {
        let prev = props([("title", "x"), ("id", "a")]);
        let next = props([("title", "y"), ("id", "a")]);

        assert_eq!(diff(&prev, &next), ["set title"]);
    }

    #[test]
    fn missing_property_is_removed() {
        let prev = props([("title", "x")]);

        assert_eq!(diff(&prev, &Props::default()), ["unset title"]);
    }

    #[test]
    fn identical_props_produce_nothing() {
        let handler = EventHandler::new(|_| {});
        let prev = props([
            ("title", PropValue::from("x")),
            ("onClick", PropValue::from(handler.clone())),
        ]);

        assert!(diff(&prev, &prev.clone()).is_empty());
    }

    #[test]
    fn changed_handler_is_swapped_once() {
        let old = EventHandler::new(|_| {});
        let new = EventHandler::new(|_| {});
        let prev = props([("onClick", old)]);
        let next = props([("onClick", new)]);

        assert_eq!(diff(&prev, &next), ["unlisten click", "listen click"]);
    }

    #[test]
    fn handler_replaced_by_data_switches_channel() {
        let handler = EventHandler::new(|_| {});
        let prev = props([("onClick", PropValue::from(handler))]);
        let next = props([("onClick", PropValue::from("disabled"))]);

        assert_eq!(diff(&prev, &next), ["unlisten click", "set onClick"]);
    }

    #[test]
    fn inverse_restores_previous_value() {
        let set = Mutation::SetProperty {
            node: 1u32,
            name: "title".to_owned(),
            value: PropValue::from("y"),
            previous: Some(PropValue::from("x")),
        };
        let undo = set.inverse();
        let [Mutation::SetProperty { value, .. }] = undo.as_slice() else {
            panic!("expected a set");
        };
        assert_eq!(value, &PropValue::from("x"));

        let fresh = Mutation::SetProperty {
            node: 1u32,
            name: "title".to_owned(),
            value: PropValue::from("y"),
            previous: None,
        };
        assert!(matches!(
            fresh.inverse().as_slice(),
            [Mutation::RemoveProperty { .. }]
        ));
    }

    #[test]
    fn undoing_removal_moves_followers_back_behind_child() {
        let remove = Mutation::RemoveChild {
            parent: 0u32,
            child: 2,
            following: vec![3, 4],
        };

        let undo = remove.inverse();
        assert_eq!(
            names(&undo),
            ["append", "remove", "append", "remove", "append"]
        );
        let appended: Vec<u32> = undo
            .iter()
            .filter_map(|m| match m {
                Mutation::AppendChild { child, .. } => Some(*child),
                _ => None,
            })
            .collect();
        assert_eq!(appended, [2, 3, 4]);
    }
}
