#![forbid(unsafe_code)]

//! Job scheduler: deduplicated, id-ordered flushing of deferred work.
//!
//! The scheduler owns three lanes:
//!
//! - **pre**: work that must settle before structural rendering (watchers,
//!   prop-driven side effects). FIFO, deduplicated by job id.
//! - **main**: component re-render jobs, kept sorted by ascending job id.
//!   Component jobs use the instance creation order as their id, so an
//!   ancestor always updates before its descendants.
//! - **post**: callbacks that must observe a settled host tree (mounted and
//!   updated hooks). Run in enqueue order after all structural work.
//!
//! Tasks are plain data (`T`); the scheduler never executes anything itself
//! outside of [`Scheduler::flush`], which hands each task to a caller-supplied
//! runner. Producers (reactive triggers, async continuations, the runner
//! itself) may enqueue while a flush is in progress.
//!
//! # Invariants
//!
//! 1. Enqueuing a job whose id is already pending is a no-op.
//! 2. The running job may re-enqueue itself only while its handle allows
//!    recursion; otherwise the request is dropped.
//! 3. A job enqueued during a flush is merged into its sorted position among
//!    the jobs that have not started (after the running job, if any) and runs
//!    in the same flush. This holds for enqueues from pre and post tasks too.
//! 4. Inactive jobs are skipped silently.
//! 5. Post tasks run only when the pre and main lanes are empty.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Job re-runs more than `recursion_limit` times in one flush | Skipped, reported in [`FlushReport::errors`] |
//! | `flush()` called from inside a running flush | No-op (the outer flush drains the lanes) |
//! | `invalidate()` for a job that is not pending | No-op |

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

/// Default number of times one job may run within a single flush.
pub const DEFAULT_RECURSION_LIMIT: u32 = 100;

/// Monotonic job identifier. Lower ids run first.
pub type JobId = u64;

/// Errors surfaced by a flush.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// A job kept re-enqueueing itself past the configured limit.
    #[error("job {job} exceeded the recursion limit of {limit} runs in one flush")]
    RecursionLimitExceeded {
        /// The offending job.
        job: JobId,
        /// The configured limit.
        limit: u32,
    },
}

struct JobState {
    id: JobId,
    active: Cell<bool>,
    allow_recurse: Cell<bool>,
}

/// Shared handle to a schedulable job's flags.
///
/// The owner keeps one clone to toggle the flags; the queue keeps another.
#[derive(Clone)]
pub struct JobHandle {
    state: Rc<JobState>,
}

impl JobHandle {
    /// Create an active job that does not allow recursion.
    #[must_use]
    pub fn new(id: JobId) -> Self {
        Self {
            state: Rc::new(JobState {
                id,
                active: Cell::new(true),
                allow_recurse: Cell::new(false),
            }),
        }
    }

    /// The job id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> JobId {
        self.state.id
    }

    /// Whether the job still does work when popped.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    /// Permanently turn the job into a no-op.
    pub fn deactivate(&self) {
        self.state.active.set(false);
    }

    /// Whether the job may re-enqueue itself while running.
    #[inline]
    #[must_use]
    pub fn allow_recurse(&self) -> bool {
        self.state.allow_recurse.get()
    }

    /// Toggle self re-enqueueing.
    pub fn set_allow_recurse(&self, allow: bool) {
        self.state.allow_recurse.set(allow);
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("allow_recurse", &self.allow_recurse())
            .finish()
    }
}

struct Entry<T> {
    job: JobHandle,
    task: T,
}

struct SchedulerState<T> {
    pre: VecDeque<Entry<T>>,
    queue: Vec<Entry<T>>,
    post: Vec<T>,
    flushing: bool,
    flushing_pre: bool,
    flush_index: usize,
    running: Option<JobId>,
    run_counts: AHashMap<JobId, u32>,
    recursion_limit: u32,
}

impl<T> SchedulerState<T> {
    fn pending_from(&self, job: &JobHandle) -> usize {
        if !self.flushing {
            return 0;
        }
        if self.running == Some(job.id()) && job.allow_recurse() {
            self.flush_index + 1
        } else {
            self.flush_index
        }
    }

    /// First queue index that has not started running.
    fn unstarted_from(&self) -> usize {
        let start = match (self.flushing, self.running) {
            (false, _) => 0,
            (true, Some(_)) => self.flush_index + 1,
            (true, None) => self.flush_index,
        };
        start.min(self.queue.len())
    }

    fn insertion_index(&self, id: JobId) -> usize {
        let start = self.unstarted_from();
        start + self.queue[start..].partition_point(|entry| entry.job.id() <= id)
    }

    fn is_idle(&self) -> bool {
        self.pre.is_empty() && self.queue.is_empty() && self.post.is_empty()
    }
}

/// Leaves the scheduler reusable if a task unwinds mid-flush: the running
/// entry and anything queued behind it are dropped.
struct FlushReset<T> {
    state: Rc<RefCell<SchedulerState<T>>>,
}

impl<T> Drop for FlushReset<T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            if std::thread::panicking() {
                state.queue.clear();
                state.flushing_pre = false;
            }
            state.flushing = false;
            state.flush_index = 0;
            state.running = None;
            state.run_counts.clear();
        }
    }
}

/// Counters from one call to [`Scheduler::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Pre-lane tasks executed.
    pub pre_run: usize,
    /// Main-lane jobs executed.
    pub jobs_run: usize,
    /// Post-lane tasks executed.
    pub post_run: usize,
    /// Jobs skipped because they were deactivated.
    pub skipped_inactive: usize,
    /// Errors raised by the scheduler itself.
    pub errors: Vec<SchedulerError>,
}

/// Shared, single-threaded job scheduler.
///
/// Cloning yields another handle to the same queues.
pub struct Scheduler<T> {
    state: Rc<RefCell<SchedulerState<T>>>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Scheduler")
            .field("pre", &state.pre.len())
            .field("queue", &state.queue.len())
            .field("post", &state.post.len())
            .field("flushing", &state.flushing)
            .finish()
    }
}

impl<T: Clone> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Scheduler<T> {
    /// Create an empty scheduler with [`DEFAULT_RECURSION_LIMIT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_recursion_limit(DEFAULT_RECURSION_LIMIT)
    }

    /// Create an empty scheduler with a custom per-flush recursion limit.
    /// A limit of 0 is raised to 1.
    #[must_use]
    pub fn with_recursion_limit(limit: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(SchedulerState {
                pre: VecDeque::new(),
                queue: Vec::new(),
                post: Vec::new(),
                flushing: false,
                flushing_pre: false,
                flush_index: 0,
                running: None,
                run_counts: AHashMap::new(),
                recursion_limit: limit.max(1),
            })),
        }
    }

    /// Change the per-flush recursion limit. A limit of 0 is raised to 1.
    pub fn set_recursion_limit(&self, limit: u32) {
        self.state.borrow_mut().recursion_limit = limit.max(1);
    }

    /// Enqueue a main-lane job. Returns `false` when deduplicated.
    pub fn queue_job(&self, job: &JobHandle, task: T) -> bool {
        let mut state = self.state.borrow_mut();
        let from = state.pending_from(job).min(state.queue.len());
        if state.queue[from..].iter().any(|e| e.job.id() == job.id()) {
            return false;
        }
        let at = state.insertion_index(job.id());
        state.queue.insert(
            at,
            Entry {
                job: job.clone(),
                task,
            },
        );
        true
    }

    /// Enqueue a pre-lane job. Returns `false` when deduplicated.
    pub fn queue_pre(&self, job: &JobHandle, task: T) -> bool {
        let mut state = self.state.borrow_mut();
        if state.pre.iter().any(|e| e.job.id() == job.id()) {
            return false;
        }
        state.pre.push_back(Entry {
            job: job.clone(),
            task,
        });
        true
    }

    /// Enqueue a post-lane task.
    pub fn queue_post(&self, task: T) {
        self.state.borrow_mut().post.push(task);
    }

    /// Remove a pending (not running) main-lane job. Returns whether an
    /// entry was removed.
    pub fn invalidate(&self, job: &JobHandle) -> bool {
        let mut state = self.state.borrow_mut();
        let from = state.unstarted_from();
        let found = state.queue[from..]
            .iter()
            .position(|e| e.job.id() == job.id());
        match found {
            Some(offset) => {
                state.queue.remove(from + offset);
                true
            }
            None => false,
        }
    }

    /// Whether a job with this id is waiting in the main lane.
    #[must_use]
    pub fn is_queued(&self, job: &JobHandle) -> bool {
        let state = self.state.borrow();
        let from = state.unstarted_from();
        state.queue[from..].iter().any(|e| e.job.id() == job.id())
    }

    /// Whether any lane holds work.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.state.borrow().is_idle()
    }

    /// Whether a flush is in progress.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.state.borrow().flushing
    }

    /// The job currently executing in the main lane, if any.
    #[must_use]
    pub fn running(&self) -> Option<JobId> {
        self.state.borrow().running
    }

    /// Drain the pre lane only. Newly queued pre tasks are included.
    ///
    /// Re-entrant calls return 0 immediately.
    pub fn flush_pre(&self, mut run: impl FnMut(T)) -> usize {
        {
            let mut state = self.state.borrow_mut();
            if state.flushing_pre {
                return 0;
            }
            state.flushing_pre = true;
        }
        let mut count = 0;
        loop {
            let next = self.state.borrow_mut().pre.pop_front();
            let Some(entry) = next else { break };
            if entry.job.is_active() {
                run(entry.task);
                count += 1;
            }
        }
        self.state.borrow_mut().flushing_pre = false;
        count
    }

    /// Drain the post lane only. Ignored while a full flush is running (the
    /// outer flush reaches the post lane on its own).
    pub fn flush_post(&self, mut run: impl FnMut(T)) -> usize {
        if self.state.borrow().flushing {
            return 0;
        }
        let mut count = 0;
        loop {
            let batch = std::mem::take(&mut self.state.borrow_mut().post);
            if batch.is_empty() {
                break;
            }
            for task in batch {
                run(task);
                count += 1;
            }
        }
        count
    }

    /// Drain every lane until the scheduler is idle.
    ///
    /// Order per round: pre lane, then main lane by ascending id (draining
    /// any pre work queued between jobs), then post lane. Rounds repeat while
    /// any lane refilled.
    pub fn flush(&self, mut run: impl FnMut(T)) -> FlushReport {
        let mut report = FlushReport::default();
        {
            let mut state = self.state.borrow_mut();
            if state.flushing {
                return report;
            }
            state.flushing = true;
            state.flush_index = 0;
        }
        let reset = FlushReset {
            state: Rc::clone(&self.state),
        };
        let _span = tracing::debug_span!("scheduler_flush").entered();

        loop {
            report.pre_run += self.flush_pre(&mut run);

            loop {
                let task = {
                    let mut state = self.state.borrow_mut();
                    let index = state.flush_index;
                    if index >= state.queue.len() {
                        break;
                    }
                    let job = state.queue[index].job.clone();
                    if !job.is_active() {
                        state.flush_index += 1;
                        report.skipped_inactive += 1;
                        continue;
                    }
                    let limit = state.recursion_limit;
                    let runs = state.run_counts.entry(job.id()).or_insert(0);
                    *runs += 1;
                    if *runs > limit {
                        state.flush_index += 1;
                        report.errors.push(SchedulerError::RecursionLimitExceeded {
                            job: job.id(),
                            limit,
                        });
                        continue;
                    }
                    state.running = Some(job.id());
                    state.queue[index].task.clone()
                };
                run(task);
                report.jobs_run += 1;
                {
                    let mut state = self.state.borrow_mut();
                    state.running = None;
                    state.flush_index += 1;
                }
                report.pre_run += self.flush_pre(&mut run);
            }

            let post = {
                let mut state = self.state.borrow_mut();
                state.queue.clear();
                state.flush_index = 0;
                std::mem::take(&mut state.post)
            };
            for task in post {
                run(task);
                report.post_run += 1;
            }

            if self.state.borrow().is_idle() {
                break;
            }
        }

        drop(reset);
        if !report.errors.is_empty() {
            tracing::warn!(errors = report.errors.len(), "scheduler flush reported errors");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn duplicate_ids_run_once() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        let job = JobHandle::new(1);
        assert!(sched.queue_job(&job, "a"));
        assert!(!sched.queue_job(&job, "a"));
        assert!(!sched.queue_job(&job, "a"));
        let seen = log();
        let report = sched.flush(|t| seen.borrow_mut().push(t));
        assert_eq!(report.jobs_run, 1);
        assert_eq!(*seen.borrow(), vec!["a"]);
    }

    #[test]
    fn jobs_run_in_ascending_id_order() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        sched.queue_job(&JobHandle::new(3), "c");
        sched.queue_job(&JobHandle::new(1), "a");
        sched.queue_job(&JobHandle::new(2), "b");
        let seen = log();
        sched.flush(|t| seen.borrow_mut().push(t));
        assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn lanes_run_pre_main_post() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        sched.queue_post("post");
        sched.queue_job(&JobHandle::new(1), "main");
        sched.queue_pre(&JobHandle::new(9), "pre");
        let seen = log();
        sched.flush(|t| seen.borrow_mut().push(t));
        assert_eq!(*seen.borrow(), vec!["pre", "main", "post"]);
    }

    #[test]
    fn jobs_queued_during_flush_merge_in_order() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        let parent = JobHandle::new(1);
        let child = JobHandle::new(5);
        let sibling = JobHandle::new(3);
        sched.queue_job(&parent, "parent");
        sched.queue_job(&child, "child");
        let seen = log();
        let inner = sched.clone();
        sched.flush(|t| {
            seen.borrow_mut().push(t);
            if t == "parent" {
                inner.queue_job(&sibling, "sibling");
            }
        });
        assert_eq!(*seen.borrow(), vec!["parent", "sibling", "child"]);
    }

    #[test]
    fn self_requeue_requires_allow_recurse() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        let job = JobHandle::new(1);
        sched.queue_job(&job, "tick");
        let runs = Rc::new(Cell::new(0));
        let inner = sched.clone();
        let handle = job.clone();
        sched.flush(|_| {
            runs.set(runs.get() + 1);
            if runs.get() < 3 {
                inner.queue_job(&handle, "tick");
            }
        });
        assert_eq!(runs.get(), 1);

        job.set_allow_recurse(true);
        runs.set(0);
        sched.queue_job(&job, "tick");
        sched.flush(|_| {
            runs.set(runs.get() + 1);
            if runs.get() < 3 {
                inner.queue_job(&handle, "tick");
            }
        });
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn runaway_recursion_is_capped() {
        let sched: Scheduler<u8> = Scheduler::with_recursion_limit(5);
        let job = JobHandle::new(1);
        job.set_allow_recurse(true);
        sched.queue_job(&job, 0);
        let runs = Rc::new(Cell::new(0));
        let inner = sched.clone();
        let handle = job.clone();
        let report = sched.flush(|_| {
            runs.set(runs.get() + 1);
            inner.queue_job(&handle, 0);
        });
        assert_eq!(runs.get(), 5);
        assert_eq!(
            report.errors,
            vec![SchedulerError::RecursionLimitExceeded { job: 1, limit: 5 }]
        );
        assert!(!sched.has_pending());
    }

    #[test]
    fn inactive_job_is_skipped() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        let job = JobHandle::new(1);
        sched.queue_job(&job, "dead");
        job.deactivate();
        let seen = log();
        let report = sched.flush(|t| seen.borrow_mut().push(t));
        assert!(seen.borrow().is_empty());
        assert_eq!(report.skipped_inactive, 1);
    }

    #[test]
    fn invalidate_removes_pending_entry() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        let job = JobHandle::new(4);
        sched.queue_job(&job, "x");
        assert!(sched.is_queued(&job));
        assert!(sched.invalidate(&job));
        assert!(!sched.invalidate(&job));
        assert!(!sched.has_pending());
    }

    #[test]
    fn post_tasks_queued_by_post_tasks_run_in_same_flush() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        sched.queue_post("first");
        let seen = log();
        let inner = sched.clone();
        sched.flush(|t| {
            seen.borrow_mut().push(t);
            if t == "first" {
                inner.queue_post("second");
            }
        });
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn nested_flush_is_a_no_op() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        sched.queue_job(&JobHandle::new(1), "outer");
        let inner = sched.clone();
        let nested = Rc::new(Cell::new(usize::MAX));
        sched.flush(|_| {
            nested.set(inner.flush(|_| {}).jobs_run);
        });
        assert_eq!(nested.get(), 0);
    }

    #[test]
    fn lower_id_queued_by_pre_task_runs_first() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        let parent = JobHandle::new(2);
        sched.queue_job(&JobHandle::new(4), "child");
        sched.queue_pre(&JobHandle::new(9), "watch");
        let seen = log();
        let inner = sched.clone();
        sched.flush(|t| {
            seen.borrow_mut().push(t);
            if t == "watch" {
                inner.queue_job(&parent, "parent");
            }
        });
        assert_eq!(*seen.borrow(), vec!["watch", "parent", "child"]);
    }

    #[test]
    fn jobs_queued_by_post_task_run_in_id_order() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        let (parent, child) = (JobHandle::new(3), JobHandle::new(5));
        sched.queue_post("hook");
        let seen = log();
        let inner = sched.clone();
        sched.flush(|t| {
            seen.borrow_mut().push(t);
            if t == "hook" {
                inner.queue_job(&child, "child");
                inner.queue_job(&parent, "parent");
                assert!(!inner.queue_job(&child, "child"));
            }
        });
        assert_eq!(*seen.borrow(), vec!["hook", "parent", "child"]);
    }

    #[test]
    fn head_entry_is_visible_before_it_runs() {
        let sched: Scheduler<&'static str> = Scheduler::new();
        let child = JobHandle::new(4);
        sched.queue_job(&child, "child");
        sched.queue_pre(&JobHandle::new(9), "watch");
        let seen = log();
        let inner = sched.clone();
        let queued_during_pre = Rc::new(Cell::new(false));
        sched.flush(|t| {
            seen.borrow_mut().push(t);
            if t == "watch" {
                queued_during_pre.set(inner.is_queued(&child));
                inner.invalidate(&child);
            }
        });
        assert!(queued_during_pre.get());
        assert_eq!(*seen.borrow(), vec!["watch"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn each_id_runs_once_in_sorted_order(ids in proptest::collection::vec(0u64..32, 0..64)) {
                let sched: Scheduler<JobId> = Scheduler::new();
                let handles: AHashMap<JobId, JobHandle> =
                    ids.iter().map(|id| (*id, JobHandle::new(*id))).collect();
                for id in &ids {
                    sched.queue_job(&handles[id], *id);
                }
                let mut seen = Vec::new();
                sched.flush(|id| seen.push(id));
                let mut expected: Vec<JobId> = handles.keys().copied().collect();
                expected.sort_unstable();
                prop_assert_eq!(seen, expected);
            }
        }
    }
}
