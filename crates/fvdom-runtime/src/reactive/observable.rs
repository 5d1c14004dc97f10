#![forbid(unsafe_code)]

//! Version-tracked shared values with change notification.
//!
//! An [`Observable<T>`] is a cheaply cloneable handle to a single value.
//! Reading it inside a running [`Computation`](super::Computation) records a
//! dependency; writing a different value bumps the version and notifies every
//! live subscriber.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op.
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. Inside a [`BatchScope`](super::BatchScope) the value changes
//!    immediately, notifications wait for the outermost scope to close.
//!
//! # Failure Modes
//!
//! - Subscriber panics: propagates to the caller of `set()`; remaining
//!   subscribers of that cycle are not notified.
//! - Re-entrant `set()` from inside a subscriber: allowed, the nested cycle
//!   completes before the outer one resumes.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{batch, computation};

type Callback<T> = dyn Fn(&T);

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
}

/// A shared, version-tracked value.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new observable holding `value` at version 0.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Read the current value, recording a dependency for the running
    /// computation (if any).
    #[must_use]
    pub fn get(&self) -> T {
        computation::track(self);
        self.inner.borrow().value.clone()
    }

    /// Read the current value without recording a dependency.
    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value, recording a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        computation::track(self);
        f(&self.inner.borrow().value)
    }

    /// Replace the value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    /// Mutate the value in place, notifying subscribers if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.value.clone();
            f(&mut inner.value);
            if inner.value == before {
                false
            } else {
                inner.version += 1;
                true
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Number of changing writes since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register a change callback. The callback lives as long as the returned
    /// [`Subscription`].
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let callback: Rc<Callback<T>> = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&callback));
        Subscription {
            _guard: Box::new(callback),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Identity of the underlying cell, stable for the observable's lifetime.
    pub(crate) fn source_id(&self) -> usize {
        Rc::as_ptr(&self.inner).cast::<()>() as usize
    }

    fn notify(&self) {
        if batch::is_batching() {
            let this = self.clone();
            batch::defer(self.source_id(), Box::new(move || this.notify_now()));
            return;
        }
        self.notify_now();
    }

    fn notify_now(&self) {
        let (value, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|weak| weak.strong_count() > 0);
            let callbacks: Vec<Rc<Callback<T>>> =
                inner.subscribers.iter().filter_map(Weak::upgrade).collect();
            (inner.value.clone(), callbacks)
        };
        for callback in callbacks {
            callback(&value);
        }
    }
}

/// RAII guard for an observable subscription.
///
/// Dropping the guard unsubscribes; the observable prunes the dead entry
/// lazily on its next notification.
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn set_bumps_version_once_per_change() {
        let obs = Observable::new(1);
        obs.set(2);
        obs.set(2);
        obs.set(3);
        assert_eq!(obs.version(), 2);
        assert_eq!(obs.get(), 3);
    }

    #[test]
    fn subscribers_fire_in_registration_order() {
        let obs = Observable::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = {
            let log = Rc::clone(&log);
            obs.subscribe(move |v| log.borrow_mut().push(("a", *v)))
        };
        let b = {
            let log = Rc::clone(&log);
            obs.subscribe(move |v| log.borrow_mut().push(("b", *v)))
        };
        obs.set(7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
        drop(a);
        drop(b);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let obs = Observable::new(0);
        let hits = Rc::new(Cell::new(0));
        let sub = {
            let hits = Rc::clone(&hits);
            obs.subscribe(move |_| hits.set(hits.get() + 1))
        };
        obs.set(1);
        drop(sub);
        obs.set(2);
        assert_eq!(hits.get(), 1);
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn update_without_change_is_silent() {
        let obs = Observable::new(vec![1, 2]);
        let hits = Rc::new(Cell::new(0));
        let _sub = {
            let hits = Rc::clone(&hits);
            obs.subscribe(move |_| hits.set(hits.get() + 1))
        };
        obs.update(|v| v.sort());
        assert_eq!(hits.get(), 0);
        obs.update(|v| v.push(3));
        assert_eq!(hits.get(), 1);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn reentrant_set_from_subscriber() {
        let obs = Observable::new(0);
        let echo = obs.clone();
        let _sub = obs.subscribe(move |v| {
            if *v < 3 {
                echo.set(v + 1);
            }
        });
        obs.set(1);
        assert_eq!(obs.get_untracked(), 3);
    }
}
