//! The reconciler: render cycles from request to commit.
//!
//! A [`Reconciler`] owns the host, both fiber trees and the hook store. A
//! render cycle goes through three phases:
//!
//! 1. [`Reconciler::render`] (or a state update) creates a pending root whose
//!    alternate is the committed root. Phase: [`Phase::RenderInProgress`].
//! 2. Units of work visit the pending tree one fiber at a time, depth first.
//!    Each unit renders a component or materializes a host node, then
//!    reconciles the fiber's children. Work can stop between any two units.
//! 3. Once the last unit is done ([`Phase::RenderComplete`]) the tree is
//!    committed in one uninterruptible pass and becomes the committed tree.
//!
//! Starting a new cycle while one is pending abandons the pending one; the
//! committed tree is never touched before commit, so nothing leaks onto the
//! host.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::arena::{EffectTag, Fiber, FiberArena, FiberId, FiberKind, HookId, HookRecord, HookStore};
use crate::commit::{
    CommitReport, ComponentFault, PendingDeletion, apply_mutations, diff_props, plan_commit,
};
use crate::element::{Component, Element, Props};
use crate::error::Result;
use crate::hooks::Hooks;
use crate::host::Host;
use crate::reconcile::reconcile_children;
use crate::scheduler::{Deadline, Unbounded, WorkStatus};

/// Default for [`ReconcilerConfig::catch_component_panics`].
pub const DEFAULT_CATCH_COMPONENT_PANICS: bool = true;

/// Reconciler settings.
///
/// ```ignore
/// let config = ReconcilerConfig::new().catch_component_panics(false);
/// let reconciler = Reconciler::with_config(host, config);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    catch_component_panics: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcilerConfig {
    /// Create a config with default settings.
    ///
    /// Defaults:
    /// - `catch_component_panics`: true
    pub fn new() -> Self {
        Self {
            catch_component_panics: DEFAULT_CATCH_COMPONENT_PANICS,
        }
    }

    /// Isolate panicking components.
    ///
    /// When enabled, a component that panics while rendering is logged,
    /// recorded in the cycle's [`CommitReport::faults`] and rendered with no
    /// children; its siblings render normally. When disabled the panic
    /// propagates out of the work loop.
    ///
    /// Default: true
    pub fn catch_component_panics(mut self, enabled: bool) -> Self {
        self.catch_component_panics = enabled;
        self
    }
}

/// Where the reconciler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No pending tree.
    Idle,
    /// Units of work remain.
    RenderInProgress,
    /// Every unit is done; the pending tree awaits commit.
    RenderComplete,
}

/// One fiber of a tree, flattened for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiberSnapshot {
    /// Distance from the root.
    pub depth: usize,
    /// Kind label (tag name, `#text`, component name or `#root`).
    pub label: String,
    /// Effect tag of the fiber.
    pub effect: EffectTag,
}

/// Incremental reconciler driving one host.
pub struct Reconciler<H: Host> {
    host: H,
    config: ReconcilerConfig,
    fibers: FiberArena<H::Node>,
    hooks: HookStore,
    committed_root: Option<FiberId>,
    pending_root: Option<FiberId>,
    next_unit_of_work: Option<FiberId>,
    deletions: Vec<PendingDeletion>,
    /// Cells allocated by the pending cycle.
    fresh_hooks: Vec<HookId>,
    /// Cells the pending cycle stopped using.
    retired_hooks: Vec<HookId>,
    faults: Vec<ComponentFault>,
    last_commit: Option<CommitReport>,
}

impl<H: Host> Reconciler<H> {
    /// Create a reconciler with default settings.
    pub fn new(host: H) -> Self {
        Self::with_config(host, ReconcilerConfig::default())
    }

    /// Create a reconciler with `config`.
    pub fn with_config(host: H, config: ReconcilerConfig) -> Self {
        Self {
            host,
            config,
            fibers: FiberArena::new(),
            hooks: HookStore::new(),
            committed_root: None,
            pending_root: None,
            next_unit_of_work: None,
            deletions: Vec::new(),
            fresh_hooks: Vec::new(),
            retired_hooks: Vec::new(),
            faults: Vec::new(),
            last_commit: None,
        }
    }

    /// Request a render of `element` into `container`.
    ///
    /// Only sets up the cycle; drive it with [`work_loop`](Self::work_loop),
    /// [`step`](Self::step) or [`flush`](Self::flush). A cycle already in
    /// progress is abandoned. State updates queued so far are picked up by
    /// this cycle, so they do not schedule one of their own.
    pub fn render(&mut self, element: Element, container: H::Node) {
        self.hooks.take_rerender_request();
        self.begin_cycle(Arc::from(vec![element]), container);
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        match (self.pending_root, self.next_unit_of_work) {
            (None, _) => Phase::Idle,
            (Some(_), Some(_)) => Phase::RenderInProgress,
            (Some(_), None) => Phase::RenderComplete,
        }
    }

    /// Whether units of work remain in the pending cycle.
    pub fn has_more_work(&self) -> bool {
        self.next_unit_of_work.is_some()
    }

    /// Whether there is nothing to do: no pending cycle and no state update
    /// waiting to start one.
    pub fn is_idle(&self) -> bool {
        self.pending_root.is_none() && !self.hooks.is_rerender_requested()
    }

    /// Perform one unit of work.
    ///
    /// Returns whether more units remain. Does not commit; once this returns
    /// false the phase is [`Phase::RenderComplete`] and
    /// [`commit`](Self::commit) finishes the cycle.
    ///
    /// On error the pending cycle is discarded and the reconciler is idle.
    pub fn step(&mut self) -> Result<bool> {
        self.poll_rerender();
        let Some(id) = self.next_unit_of_work else {
            return Ok(false);
        };
        if let Err(err) = self.perform_unit_of_work(id) {
            tracing::error!(%err, fiber = ?id, "unit of work failed, discarding render cycle");
            self.abandon_pending();
            return Err(err);
        }
        self.next_unit_of_work = self.next_after(id);
        Ok(self.next_unit_of_work.is_some())
    }

    /// Perform units of work until `deadline` says to yield.
    ///
    /// At least one unit runs per call. A state update requested since the
    /// last call starts its cycle first. When the last unit completes, the
    /// cycle is committed before returning.
    ///
    /// On error the pending cycle is discarded, the reconciler is idle and
    /// the committed tree is unchanged; later calls keep working.
    pub fn work_loop<D>(&mut self, deadline: &mut D) -> Result<WorkStatus>
    where
        D: Deadline + ?Sized,
    {
        self.poll_rerender();
        if self.pending_root.is_none() {
            return Ok(WorkStatus::Idle);
        }
        loop {
            if self.next_unit_of_work.is_some() {
                self.step()?;
            }
            if self.next_unit_of_work.is_none() {
                return Ok(self
                    .commit()?
                    .map_or(WorkStatus::Idle, WorkStatus::Committed));
            }
            if deadline.should_yield() {
                return Ok(WorkStatus::Yielded);
            }
        }
    }

    /// Run every pending cycle to completion.
    ///
    /// Returns the report of the last commit, if any cycle ran. A component
    /// that updates its own state on every render never settles; use a
    /// [`FrameLoop`](crate::FrameLoop) with a frame limit for such trees.
    pub fn flush(&mut self) -> Result<Option<CommitReport>> {
        let mut last = None;
        loop {
            match self.work_loop(&mut Unbounded)? {
                WorkStatus::Committed(report) => last = Some(report),
                WorkStatus::Idle => return Ok(last),
                WorkStatus::Yielded => {}
            }
        }
    }

    /// Commit the pending tree if every unit of work is done.
    ///
    /// Returns None when there is nothing to commit. If a host call fails the
    /// applied mutations are undone, the pending cycle is discarded and the
    /// error is returned; the committed tree is unchanged.
    pub fn commit(&mut self) -> Result<Option<CommitReport>> {
        let Some(root) = self.pending_root else {
            return Ok(None);
        };
        if self.next_unit_of_work.is_some() {
            return Ok(None);
        }

        let plan = plan_commit(&self.fibers, root, &self.deletions);
        if let Err(err) = apply_mutations(&mut self.host, &plan.mutations) {
            self.abandon_pending();
            return Err(err);
        }

        let mut report = plan.report;
        report.faults = std::mem::take(&mut self.faults);
        self.settle_hooks(root);

        if let Some(old) = self.committed_root.replace(root) {
            self.fibers.free_subtree(old);
        }
        for id in self.fibers.subtree(root) {
            if let Some(fiber) = self.fibers.get_mut(id) {
                fiber.alternate = None;
            }
        }
        self.pending_root = None;

        tracing::debug!(
            placed = report.placed.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            mutations = report.mutations,
            faults = report.faults.len(),
            "committed render cycle"
        );
        self.last_commit = Some(report.clone());
        Ok(Some(report))
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host, mutably (e.g. to dispatch events).
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Consume the reconciler, returning the host.
    pub fn into_host(self) -> H {
        self.host
    }

    /// Shared store backing every state cell.
    pub fn hook_store(&self) -> &HookStore {
        &self.hooks
    }

    /// All fibers, committed and pending.
    pub fn fibers(&self) -> &FiberArena<H::Node> {
        &self.fibers
    }

    /// Root of the committed tree.
    pub fn committed_root(&self) -> Option<FiberId> {
        self.committed_root
    }

    /// Root of the tree under construction.
    pub fn pending_root(&self) -> Option<FiberId> {
        self.pending_root
    }

    /// Report of the most recent successful commit.
    pub fn last_commit(&self) -> Option<&CommitReport> {
        self.last_commit.as_ref()
    }

    /// Preorder snapshot of the committed tree.
    pub fn committed_snapshot(&self) -> Vec<FiberSnapshot> {
        self.snapshot(self.committed_root)
    }

    /// Preorder snapshot of the pending tree, as far as it was built.
    pub fn pending_snapshot(&self) -> Vec<FiberSnapshot> {
        self.snapshot(self.pending_root)
    }

    fn snapshot(&self, root: Option<FiberId>) -> Vec<FiberSnapshot> {
        let Some(root) = root else {
            return Vec::new();
        };
        self.fibers
            .subtree(root)
            .into_iter()
            .filter_map(|id| {
                let fiber = self.fibers.get(id)?;
                Some(FiberSnapshot {
                    depth: self.fibers.depth(id),
                    label: fiber.kind.label().to_owned(),
                    effect: fiber.effect,
                })
            })
            .collect()
    }

    fn begin_cycle(&mut self, children: Arc<[Element]>, container: H::Node) {
        self.abandon_pending();
        let root = self
            .fibers
            .insert(Fiber::root(container, children, self.committed_root));
        self.pending_root = Some(root);
        self.next_unit_of_work = Some(root);
        tracing::debug!(
            root = ?root,
            alternate = ?self.committed_root,
            "render cycle started"
        );
    }

    /// Drop the pending cycle, leaving the committed tree as it was.
    fn abandon_pending(&mut self) {
        let Some(root) = self.pending_root.take() else {
            return;
        };
        cov_mark::hit!(pending_cycle_abandoned);
        self.next_unit_of_work = None;
        for deletion in self.deletions.drain(..) {
            if let Some(fiber) = self.fibers.get_mut(deletion.fiber) {
                fiber.effect = deletion.previous;
            }
        }
        let freed = self.fibers.free_subtree(root);
        let cells = self.fresh_hooks.len();
        for cell in self.fresh_hooks.drain(..) {
            self.hooks.release(cell);
        }
        self.retired_hooks.clear();
        self.faults.clear();
        tracing::debug!(fibers = freed, cells, "render cycle abandoned");
    }

    /// Start the cycle a state update asked for.
    ///
    /// The cycle re-renders the committed tree, abandoning any pending one.
    /// Before the first commit there is nothing committed, so the pending
    /// root's element is rendered again instead.
    fn poll_rerender(&mut self) {
        if !self.hooks.take_rerender_request() {
            return;
        }
        let source = self.committed_root.or(self.pending_root);
        let Some((children, container)) = source
            .and_then(|id| self.fibers.get(id))
            .and_then(|root| Some((root.children.clone(), root.output.clone()?)))
        else {
            return;
        };
        if self.pending_root.is_some() {
            cov_mark::hit!(rerender_restarts_pending_cycle);
        }
        tracing::debug!("state update scheduled a render cycle");
        self.begin_cycle(children, container);
    }

    fn perform_unit_of_work(&mut self, id: FiberId) -> Result<()> {
        let Some(fiber) = self.fibers.get(id) else {
            return Ok(());
        };
        let kind = fiber.kind.clone();
        let children = fiber.children.clone();
        tracing::trace!(fiber = ?id, kind = kind.label(), "unit of work");

        match kind {
            FiberKind::Component(component) => {
                let rendered = self.render_component(id, &component);
                reconcile_children(&mut self.fibers, &mut self.deletions, id, &rendered);
            }
            FiberKind::Host(tag) => {
                self.materialize(id, &tag, false)?;
                reconcile_children(&mut self.fibers, &mut self.deletions, id, &children);
            }
            FiberKind::Text => {
                self.materialize(id, "", true)?;
                reconcile_children(&mut self.fibers, &mut self.deletions, id, &children);
            }
            FiberKind::Root => {
                reconcile_children(&mut self.fibers, &mut self.deletions, id, &children);
            }
        }
        Ok(())
    }

    /// Create the output node of a fiber on its first visit.
    ///
    /// Initial properties and listeners go onto the detached node; it is
    /// attached to its parent at commit.
    fn materialize(&mut self, id: FiberId, tag: &str, is_text: bool) -> Result<()> {
        let Some(fiber) = self.fibers.get(id) else {
            return Ok(());
        };
        if fiber.output.is_some() {
            return Ok(());
        }
        let props = fiber.props.clone();
        let node = self.host.create_node(tag, is_text)?;

        let mut initial = Vec::new();
        diff_props(&node, &Props::default(), &props, &mut initial);
        for mutation in &initial {
            mutation.apply(&mut self.host)?;
        }
        tracing::trace!(fiber = ?id, ?node, "materialized output node");

        if let Some(fiber) = self.fibers.get_mut(id) {
            fiber.output = Some(node);
        }
        Ok(())
    }

    /// Call a component and record its hooks; returns its child elements.
    fn render_component(&mut self, id: FiberId, component: &Component) -> Vec<Element> {
        let Some(fiber) = self.fibers.get(id) else {
            return Vec::new();
        };
        let props = fiber.props.clone();
        let previous: Vec<HookRecord> = fiber
            .alternate
            .and_then(|alt| self.fibers.get(alt))
            .map(|alt| alt.hooks.clone())
            .unwrap_or_default();

        let fresh_mark = self.fresh_hooks.len();
        let retired_mark = self.retired_hooks.len();
        let mut hooks = Hooks::new(
            &self.hooks,
            &previous,
            &mut self.fresh_hooks,
            &mut self.retired_hooks,
            component.name(),
        );

        let outcome = if self.config.catch_component_panics {
            panic::catch_unwind(AssertUnwindSafe(|| component.render(&props, &mut hooks)))
        } else {
            Ok(component.render(&props, &mut hooks))
        };

        let (records, children) = match outcome {
            Ok(child) => (hooks.finish(), vec![child]),
            Err(payload) => {
                drop(hooks);
                cov_mark::hit!(component_panic_isolated);
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    component = component.name(),
                    fiber = ?id,
                    %message,
                    "component panicked while rendering, rendering it empty"
                );
                self.faults.push(ComponentFault {
                    component: component.name().to_owned(),
                    message,
                });
                // Keep the committed state; nothing from the failed visit is applied.
                for cell in self.fresh_hooks.drain(fresh_mark..) {
                    self.hooks.release(cell);
                }
                self.retired_hooks.truncate(retired_mark);
                let kept = previous
                    .into_iter()
                    .map(|record| HookRecord {
                        applied: 0,
                        ..record
                    })
                    .collect();
                (kept, Vec::new())
            }
        };

        if let Some(fiber) = self.fibers.get_mut(id) {
            fiber.hooks = records;
        }
        children
    }

    /// Hook bookkeeping of a successful commit.
    ///
    /// Applied updates leave their queues, and cells no committed fiber refers
    /// to any more are freed.
    fn settle_hooks(&mut self, root: FiberId) {
        for id in self.fibers.subtree(root) {
            let Some(fiber) = self.fibers.get(id) else {
                continue;
            };
            for record in &fiber.hooks {
                self.hooks.drain_applied(record.cell, record.applied);
            }
        }
        for deletion in std::mem::take(&mut self.deletions) {
            for id in self.fibers.subtree(deletion.fiber) {
                let Some(fiber) = self.fibers.get(id) else {
                    continue;
                };
                for record in &fiber.hooks {
                    self.hooks.release(record.cell);
                }
            }
        }
        for cell in self.retired_hooks.drain(..) {
            self.hooks.release(cell);
        }
        self.fresh_hooks.clear();
    }

    /// Next fiber in depth-first order: first child, else the nearest
    /// sibling walking up through parents.
    fn next_after(&self, id: FiberId) -> Option<FiberId> {
        let fiber = self.fibers.get(id)?;
        if let Some(child) = fiber.child {
            return Some(child);
        }
        let mut current = Some(id);
        while let Some(candidate) = current {
            let fiber = self.fibers.get(candidate)?;
            if let Some(sibling) = fiber.sibling {
                return Some(sibling);
            }
            current = fiber.parent;
        }
        None
    }
}

impl<H: Host> std::fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("phase", &self.phase())
            .field("fibers", &self.fibers.len())
            .field("committed_root", &self.committed_root)
            .field("pending_root", &self.pending_root)
            .field("next_unit_of_work", &self.next_unit_of_work)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
