//! Cooperative scheduling of render work.
//!
//! Rendering is split into units of work (one fiber each). The reconciler's
//! [`work_loop`](crate::Reconciler::work_loop) performs units until a
//! [`Deadline`] asks it to yield, always performing at least one so every
//! invocation makes progress. When the last unit completes, the commit runs in
//! the same invocation.
//!
//! Deadlines provided here:
//!
//! - [`TimeSlice`]: wall-clock budget, yields when less than a threshold is left.
//! - [`IdleDeadline`]: asks a host callback how much idle time remains.
//! - [`StepBudget`]: fixed number of units per slice, for tests.
//! - [`Unbounded`]: never yields.
//!
//! [`FrameLoop`] is the driver that re-arms the work loop slice after slice:
//!
//! ```ignore
//! let mut reconciler = Reconciler::new(host);
//! reconciler.render(app(), container);
//!
//! let stats = FrameLoop::new()
//!     .budget(Duration::from_millis(8))
//!     .max_frames(120)
//!     .run(&mut reconciler);
//! ```

use std::time::{Duration, Instant};

use crate::commit::CommitReport;
use crate::host::Host;
use crate::reconciler::Reconciler;

/// Default wall-clock budget of one slice (~60fps).
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(16);

/// Default minimum remaining time below which a slice yields.
pub const DEFAULT_YIELD_THRESHOLD: Duration = Duration::from_millis(1);

/// Source of "should the work loop give control back" decisions.
///
/// Queried after every unit of work.
pub trait Deadline {
    /// Whether the work loop should return to its caller now.
    fn should_yield(&mut self) -> bool;
}

impl<D: Deadline + ?Sized> Deadline for &mut D {
    fn should_yield(&mut self) -> bool {
        (**self).should_yield()
    }
}

/// Outcome of one work loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkStatus {
    /// Nothing was pending.
    Idle,
    /// The deadline expired with units of work left.
    Yielded,
    /// The render cycle finished and was committed.
    Committed(CommitReport),
}

/// Wall-clock slice measured from its creation.
#[derive(Debug, Clone, Copy)]
pub struct TimeSlice {
    end: Instant,
    threshold: Duration,
}

impl TimeSlice {
    /// Slice of `budget` starting now, with the default yield threshold.
    pub fn new(budget: Duration) -> Self {
        Self::with_threshold(budget, DEFAULT_YIELD_THRESHOLD)
    }

    /// Slice of `budget` starting now, yielding when less than `threshold` is left.
    pub fn with_threshold(budget: Duration, threshold: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
            threshold,
        }
    }

    /// Time left before the slice ends.
    pub fn time_remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }
}

impl Default for TimeSlice {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_BUDGET)
    }
}

impl Deadline for TimeSlice {
    fn should_yield(&mut self) -> bool {
        self.time_remaining() < self.threshold
    }
}

/// Deadline driven by a host "time remaining" callback, such as a browser
/// idle callback's `timeRemaining()`.
pub struct IdleDeadline<F> {
    time_remaining: F,
    threshold: Duration,
}

impl<F> IdleDeadline<F>
where
    F: FnMut() -> Duration,
{
    /// Wrap a callback with the default yield threshold.
    pub fn new(time_remaining: F) -> Self {
        Self {
            time_remaining,
            threshold: DEFAULT_YIELD_THRESHOLD,
        }
    }

    /// Yield when the callback reports less than `threshold`.
    pub fn threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }
}

impl<F> Deadline for IdleDeadline<F>
where
    F: FnMut() -> Duration,
{
    fn should_yield(&mut self) -> bool {
        (self.time_remaining)() < self.threshold
    }
}

impl<F> std::fmt::Debug for IdleDeadline<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleDeadline")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

/// Yields after a fixed number of units.
///
/// The budget is consumed across invocations; create a new one per slice.
/// A budget of zero still lets one unit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBudget {
    remaining: usize,
}

impl StepBudget {
    /// Budget of `units` units of work.
    pub fn new(units: usize) -> Self {
        Self { remaining: units }
    }

    /// Units left.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Deadline for StepBudget {
    fn should_yield(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }
}

/// Never yields: the work loop runs the cycle to its commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unbounded;

impl Deadline for Unbounded {
    fn should_yield(&mut self) -> bool {
        false
    }
}

/// Counters collected by [`FrameLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Slices started.
    pub frames: usize,
    /// Render cycles committed.
    pub commits: usize,
    /// Host mutations applied across all commits.
    pub mutations: usize,
    /// Failed cycles (render aborted or commit rolled back).
    pub errors: usize,
}

/// Builder for the frame-by-frame driver of a reconciler.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
///
/// // Default configuration
/// FrameLoop::new().run(&mut reconciler);
///
/// // Custom configuration
/// FrameLoop::new()
///     .budget(Duration::from_millis(8))
///     .yield_threshold(Duration::from_micros(500))
///     .max_frames(600)
///     .run(&mut reconciler);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameLoop {
    budget: Duration,
    yield_threshold: Duration,
    max_frames: Option<usize>,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoop {
    /// Create a frame loop builder with default settings.
    ///
    /// Defaults:
    /// - `budget`: 16ms
    /// - `yield_threshold`: 1ms
    /// - `max_frames`: unbounded
    pub fn new() -> Self {
        Self {
            budget: DEFAULT_FRAME_BUDGET,
            yield_threshold: DEFAULT_YIELD_THRESHOLD,
            max_frames: None,
        }
    }

    /// Set the wall-clock budget of each slice.
    ///
    /// Default: 16ms (~60fps)
    pub fn budget(mut self, duration: Duration) -> Self {
        self.budget = duration;
        self
    }

    /// Set the minimum remaining time below which a slice yields.
    ///
    /// Default: 1ms
    pub fn yield_threshold(mut self, duration: Duration) -> Self {
        self.yield_threshold = duration;
        self
    }

    /// Stop after this many slices even if work remains.
    ///
    /// A component that requests a re-render on every render never lets the
    /// reconciler go idle; this bounds the loop in that case.
    ///
    /// Default: unbounded
    pub fn max_frames(mut self, frames: usize) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Drive `reconciler` until it is idle or the frame limit is reached.
    ///
    /// Failed cycles are logged and counted; the loop keeps going, since the
    /// reconciler is back to a consistent state after every failure.
    pub fn run<H: Host>(&self, reconciler: &mut Reconciler<H>) -> FrameStats {
        let mut stats = FrameStats::default();
        while !reconciler.is_idle() {
            if self.max_frames.is_some_and(|max| stats.frames >= max) {
                tracing::debug!(frames = stats.frames, "frame limit reached with work pending");
                break;
            }
            stats.frames += 1;
            let mut slice = TimeSlice::with_threshold(self.budget, self.yield_threshold);
            match reconciler.work_loop(&mut slice) {
                Ok(WorkStatus::Committed(report)) => {
                    stats.commits += 1;
                    stats.mutations += report.mutations;
                }
                Ok(WorkStatus::Yielded) => {
                    tracing::trace!(frame = stats.frames, "slice exhausted, yielding");
                }
                Ok(WorkStatus::Idle) => {}
                Err(err) => {
                    stats.errors += 1;
                    tracing::error!(%err, frame = stats.frames, "render cycle failed");
                }
            }
        }
        stats
    }
}
