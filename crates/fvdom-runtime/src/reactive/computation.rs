#![forbid(unsafe_code)]

//! Dependency-tracking computations.
//!
//! A [`Computation`] runs a closure while recording every [`Observable`] read
//! through `get()`/`with()`. When any recorded source changes, the
//! computation's trigger callback fires. The callback never re-runs the
//! closure itself; it is expected to hand work to a scheduler.
//!
//! Dependencies are rebuilt on every `run()`, so branches that stop reading
//! a source also stop reacting to it.
//!
//! # Invariants
//!
//! 1. Each source is subscribed at most once per run.
//! 2. A stopped computation never triggers again and holds no subscriptions.
//! 3. Tracking is scoped: nested runs and [`untracked`] sections push onto a
//!    thread-local stack and pop on exit, including on unwind.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::observable::{Observable, Subscription};

thread_local! {
    static TRACKING: RefCell<Vec<Option<Rc<ComputationInner>>>> = const { RefCell::new(Vec::new()) };
}

struct ComputationInner {
    deps: RefCell<SmallVec<[(usize, Subscription); 4]>>,
    trigger: Box<dyn Fn()>,
    active: Cell<bool>,
}

impl ComputationInner {
    fn fire(&self) {
        if self.active.get() {
            (self.trigger)();
        }
    }
}

/// A reactive computation owning its dependency subscriptions.
#[derive(Clone)]
pub struct Computation {
    inner: Rc<ComputationInner>,
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("active", &self.inner.active.get())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

impl Computation {
    /// Create a computation that calls `trigger` whenever a dependency
    /// recorded by the latest run changes.
    pub fn new(trigger: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(ComputationInner {
                deps: RefCell::new(SmallVec::new()),
                trigger: Box::new(trigger),
                active: Cell::new(true),
            }),
        }
    }

    /// Run `f`, replacing the dependency set with the sources it reads.
    ///
    /// A stopped computation runs `f` untracked.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        if !self.inner.active.get() {
            return untracked(f);
        }
        let previous = std::mem::take(&mut *self.inner.deps.borrow_mut());
        drop(previous);
        let _guard = TrackingGuard::push(Some(Rc::clone(&self.inner)));
        f()
    }

    /// Dispose the computation: drop all subscriptions and never trigger
    /// again.
    pub fn stop(&self) {
        self.inner.active.set(false);
        let deps = std::mem::take(&mut *self.inner.deps.borrow_mut());
        drop(deps);
    }

    /// Whether the computation is still live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of sources recorded by the latest run.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }
}

/// Run `f` without recording dependencies for any enclosing computation.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TrackingGuard::push(None);
    f()
}

/// Whether a computation is currently recording reads on this thread.
#[must_use]
pub fn is_tracking() -> bool {
    TRACKING.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

struct TrackingGuard;

impl TrackingGuard {
    fn push(entry: Option<Rc<ComputationInner>>) -> Self {
        TRACKING.with(|stack| stack.borrow_mut().push(entry));
        Self
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        TRACKING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pub(crate) fn track<T: Clone + PartialEq + 'static>(source: &Observable<T>) {
    let Some(current) = TRACKING.with(|stack| stack.borrow().last().cloned().flatten()) else {
        return;
    };
    let id = source.source_id();
    if current.deps.borrow().iter().any(|(dep, _)| *dep == id) {
        return;
    }
    let weak = Rc::downgrade(&current);
    let subscription = source.subscribe(move |_| {
        if let Some(computation) = weak.upgrade() {
            computation.fire();
        }
    });
    current.deps.borrow_mut().push((id, subscription));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let hits = Rc::new(Cell::new(0));
        let handle = Rc::clone(&hits);
        (hits, move || handle.set(handle.get() + 1))
    }

    #[test]
    fn reads_inside_run_become_dependencies() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        let (hits, trigger) = counter();
        let comp = Computation::new(trigger);
        let sum = comp.run(|| a.get() + b.get() + a.get());
        assert_eq!(sum, 4);
        assert_eq!(comp.dependency_count(), 2);
        b.set(5);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn rerun_drops_stale_dependencies() {
        let flag = Observable::new(true);
        let left = Observable::new(0);
        let right = Observable::new(0);
        let (hits, trigger) = counter();
        let comp = Computation::new(trigger);
        let read = |comp: &Computation| {
            comp.run(|| {
                if flag.get() {
                    left.get()
                } else {
                    right.get()
                }
            })
        };
        read(&comp);
        flag.set(false);
        read(&comp);
        let before = hits.get();
        left.set(9);
        assert_eq!(hits.get(), before);
        right.set(9);
        assert_eq!(hits.get(), before + 1);
    }

    #[test]
    fn stopped_computation_is_inert() {
        let a = Observable::new(0);
        let (hits, trigger) = counter();
        let comp = Computation::new(trigger);
        comp.run(|| a.get());
        comp.stop();
        a.set(1);
        assert_eq!(hits.get(), 0);
        assert_eq!(comp.dependency_count(), 0);
        assert_eq!(a.subscriber_count(), 0);
    }

    #[test]
    fn untracked_section_records_nothing() {
        let a = Observable::new(0);
        let (_hits, trigger) = counter();
        let comp = Computation::new(trigger);
        comp.run(|| {
            assert!(is_tracking());
            untracked(|| {
                assert!(!is_tracking());
                a.get()
            })
        });
        assert_eq!(comp.dependency_count(), 0);
        assert!(!is_tracking());
    }
}
