// Fiber arena - storage for fiber nodes of both trees
//
// The committed tree and the tree under construction live in the same slab.
// All structural links (parent, child, sibling) and the cross-tree alternate
// link are plain FiberIds, so neither tree owns the other and there are no
// reference cycles between parent/child/alternate.
//
// Lifetime rules:
// - A fiber is inserted when reconciliation produces it.
// - A pending tree that gets abandoned is freed as a whole.
// - After a commit, the previously committed tree is freed as a whole and the
//   alternate links of the new committed tree are cleared.

use std::sync::Arc;

use slab::Slab;

use super::HookRecord;
use crate::element::{Component, Element, ElementKind, Props};

/// Unique identifier for a fiber in the arena.
///
/// This is a zero-cost wrapper around a slab index. A freed FiberId is stale;
/// the arena returns None for it.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FiberId(u32);

impl FiberId {
    /// Create a new FiberId from a raw index
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Convert to usize for slab indexing
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Mutation a fiber needs at commit time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EffectTag {
    /// Nothing to do (root fibers).
    #[default]
    None,
    /// New output node, to be inserted under the nearest host ancestor.
    Place,
    /// Reused output node, props to be diffed against the alternate.
    Update,
    /// Old fiber absent from the new tree, output node to be removed.
    Delete,
}

/// What a fiber stands for.
///
/// Mirrors [`ElementKind`] plus the root, which wraps the output container and
/// has no element of its own.
#[derive(Clone, Debug, PartialEq)]
pub enum FiberKind {
    /// Tree root; owns the container node.
    Root,
    /// Native node.
    Host(Arc<str>),
    /// Text node.
    Text,
    /// Function component; never owns an output node.
    Component(Component),
}

impl FiberKind {
    /// Kind equality with an element, the only reuse key of reconciliation.
    pub fn matches(&self, element: &ElementKind) -> bool {
        match (self, element) {
            (FiberKind::Host(a), ElementKind::Host(b)) => a == b,
            (FiberKind::Text, ElementKind::Text) => true,
            (FiberKind::Component(a), ElementKind::Component(b)) => a == b,
            _ => false,
        }
    }

    /// Short label used in logs, snapshots and commit reports.
    pub fn label(&self) -> &str {
        match self {
            FiberKind::Root => "#root",
            FiberKind::Host(tag) => tag,
            FiberKind::Text => "#text",
            FiberKind::Component(component) => component.name(),
        }
    }
}

impl From<&ElementKind> for FiberKind {
    fn from(kind: &ElementKind) -> Self {
        match kind {
            ElementKind::Host(tag) => FiberKind::Host(tag.clone()),
            ElementKind::Text => FiberKind::Text,
            ElementKind::Component(component) => FiberKind::Component(component.clone()),
        }
    }
}

/// One node of a fiber tree.
#[derive(Debug)]
pub struct Fiber<N> {
    pub(crate) kind: FiberKind,
    pub(crate) props: Arc<Props>,
    pub(crate) children: Arc<[Element]>,
    pub(crate) output: Option<N>,
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) alternate: Option<FiberId>,
    pub(crate) effect: EffectTag,
    pub(crate) hooks: Vec<HookRecord>,
}

impl<N> Fiber<N> {
    /// Root fiber wrapping `container` with `children` as its element list.
    pub fn root(container: N, children: Arc<[Element]>, alternate: Option<FiberId>) -> Self {
        Self {
            kind: FiberKind::Root,
            props: Arc::new(Props::default()),
            children,
            output: Some(container),
            parent: None,
            child: None,
            sibling: None,
            alternate,
            effect: EffectTag::None,
            hooks: Vec::new(),
        }
    }

    /// Fiber for `element` under `parent`, not yet linked into a chain.
    pub fn from_element(
        element: &Element,
        parent: FiberId,
        output: Option<N>,
        alternate: Option<FiberId>,
        effect: EffectTag,
    ) -> Self {
        Self {
            kind: FiberKind::from(element.kind()),
            props: element.props().clone(),
            children: element.children().clone(),
            output,
            parent: Some(parent),
            child: None,
            sibling: None,
            alternate,
            effect,
            hooks: Vec::new(),
        }
    }

    /// The fiber's kind.
    pub fn kind(&self) -> &FiberKind {
        &self.kind
    }

    /// Props from the element that produced this fiber on its pass.
    pub fn props(&self) -> &Arc<Props> {
        &self.props
    }

    /// The owned output node, if materialized.
    pub fn output(&self) -> Option<&N> {
        self.output.as_ref()
    }

    /// Pending effect classification.
    pub fn effect(&self) -> EffectTag {
        self.effect
    }

    /// Parent fiber (None for roots).
    pub fn parent(&self) -> Option<FiberId> {
        self.parent
    }

    /// First child fiber.
    pub fn child(&self) -> Option<FiberId> {
        self.child
    }

    /// Next sibling fiber.
    pub fn sibling(&self) -> Option<FiberId> {
        self.sibling
    }

    /// Counterpart in the previously committed tree.
    pub fn alternate(&self) -> Option<FiberId> {
        self.alternate
    }

    /// Hook records produced by the last visit (component fibers only).
    pub fn hooks(&self) -> &[HookRecord] {
        &self.hooks
    }
}

/// Slab of fibers owned by one reconciler.
#[derive(Debug)]
pub struct FiberArena<N> {
    slab: Slab<Fiber<N>>,
}

impl<N> Default for FiberArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> FiberArena<N> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self { slab: Slab::new() }
    }

    /// Insert a fiber and return its id
    pub fn insert(&mut self, fiber: Fiber<N>) -> FiberId {
        let entry = self.slab.vacant_entry();
        let key = entry.key();
        entry.insert(fiber);
        FiberId::new(key as u32)
    }

    /// Remove a fiber, returning it if the id was live
    pub fn remove(&mut self, id: FiberId) -> Option<Fiber<N>> {
        self.slab.try_remove(id.index())
    }

    /// Access a fiber (None for stale ids)
    pub fn get(&self, id: FiberId) -> Option<&Fiber<N>> {
        self.slab.get(id.index())
    }

    /// Mutable access to a fiber (None for stale ids)
    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber<N>> {
        self.slab.get_mut(id.index())
    }

    /// Number of live fibers across all trees.
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    /// Whether the arena holds no fibers.
    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    /// Preorder list of the subtree rooted at `root` (root included).
    ///
    /// Iterative, so deep trees cannot overflow the stack.
    pub fn subtree(&self, root: FiberId) -> Vec<FiberId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(fiber) = self.get(id) else {
                continue;
            };
            order.push(id);
            let mut children = Vec::new();
            let mut next = fiber.child;
            while let Some(child) = next {
                children.push(child);
                next = self.get(child).and_then(|c| c.sibling);
            }
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Free every fiber of the subtree rooted at `root`.
    pub fn free_subtree(&mut self, root: FiberId) -> usize {
        let ids = self.subtree(root);
        for &id in &ids {
            self.remove(id);
        }
        ids.len()
    }

    /// Nearest strict ancestor of `id` that owns an output node.
    pub fn host_ancestor(&self, id: FiberId) -> Option<FiberId> {
        let mut next = self.get(id).and_then(|f| f.parent);
        while let Some(candidate) = next {
            let fiber = self.get(candidate)?;
            if fiber.output.is_some() {
                return Some(candidate);
            }
            next = fiber.parent;
        }
        None
    }

    /// Depth of `id` below its root.
    pub fn depth(&self, id: FiberId) -> usize {
        let mut depth = 0;
        let mut next = self.get(id).and_then(|f| f.parent);
        while let Some(parent) = next {
            depth += 1;
            next = self.get(parent).and_then(|f| f.parent);
        }
        depth
    }
}
