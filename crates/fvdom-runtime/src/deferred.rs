#![forbid(unsafe_code)]

//! Single-assignment values settled at some later point.
//!
//! A [`Deferred<T>`] is the renderer's stand-in for an asynchronous result:
//! async component setup, async component loaders, and anything else that
//! completes after the current flush. There is no executor; whoever owns the
//! producing side calls [`Deferred::settle`] when the value is ready, and
//! every registered continuation runs synchronously at that point.
//!
//! # Invariants
//!
//! 1. A deferred settles at most once. Later `settle` calls return `false`
//!    and are ignored.
//! 2. Continuations run in registration order.
//! 3. A continuation registered after settlement runs immediately.
//!
//! # Example
//!
//! ```
//! use fvdom_runtime::Deferred;
//!
//! let pending: Deferred<u32> = Deferred::new();
//! let doubled = pending.map(|v| v * 2);
//! assert!(pending.settle(21));
//! assert_eq!(doubled.peek(), Some(42));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Continuation<T> = Box<dyn FnOnce(&T)>;

enum DeferredState<T> {
    Pending(Vec<Continuation<T>>),
    Settled(T),
}

/// A shared handle to a value that will be provided later.
pub struct Deferred<T> {
    state: Rc<RefCell<DeferredState<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.borrow() {
            DeferredState::Pending(waiters) => f
                .debug_struct("Deferred")
                .field("pending", &waiters.len())
                .finish(),
            DeferredState::Settled(value) => {
                f.debug_struct("Deferred").field("value", value).finish()
            }
        }
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Create an unsettled deferred.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(DeferredState::Pending(Vec::new()))),
        }
    }

    /// Create an already-settled deferred.
    #[must_use]
    pub fn settled(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(DeferredState::Settled(value))),
        }
    }

    /// Provide the value and run pending continuations. Returns `false` if
    /// the deferred was already settled.
    pub fn settle(&self, value: T) -> bool {
        let waiters = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                DeferredState::Settled(_) => return false,
                DeferredState::Pending(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *state = DeferredState::Settled(value.clone());
                    waiters
                }
            }
        };
        for waiter in waiters {
            waiter(&value);
        }
        true
    }

    /// Whether a value has been provided.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.borrow(), DeferredState::Settled(_))
    }

    /// Clone the value out, if settled.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        match &*self.state.borrow() {
            DeferredState::Settled(value) => Some(value.clone()),
            DeferredState::Pending(_) => None,
        }
    }

    /// Run `f` once the value is available.
    pub fn on_settle(&self, f: impl FnOnce(&T) + 'static) {
        let ready = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                DeferredState::Settled(value) => Some(value.clone()),
                DeferredState::Pending(waiters) => {
                    waiters.push(Box::new(f));
                    return;
                }
            }
        };
        if let Some(value) = ready {
            f(&value);
        }
    }

    /// Derive a deferred that settles with `f(value)`.
    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(&T) -> U + 'static) -> Deferred<U> {
        let out = Deferred::new();
        let target = out.clone();
        self.on_settle(move |value| {
            target.settle(f(value));
        });
        out
    }

    /// Chain a follow-up deferred produced from the value.
    pub fn and_then<U: Clone + 'static>(
        &self,
        f: impl FnOnce(&T) -> Deferred<U> + 'static,
    ) -> Deferred<U> {
        let out = Deferred::new();
        let target = out.clone();
        self.on_settle(move |value| {
            f(value).on_settle(move |next| {
                target.settle(next.clone());
            });
        });
        out
    }

    /// Whether two handles refer to the same deferred.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn settles_once() {
        let d = Deferred::new();
        assert!(!d.is_settled());
        assert!(d.settle(1));
        assert!(!d.settle(2));
        assert_eq!(d.peek(), Some(1));
    }

    #[test]
    fn continuations_run_in_order() {
        let d: Deferred<&'static str> = Deferred::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b"] {
            let log = Rc::clone(&log);
            d.on_settle(move |v| log.borrow_mut().push(format!("{tag}:{v}")));
        }
        assert!(log.borrow().is_empty());
        d.settle("x");
        assert_eq!(*log.borrow(), vec!["a:x".to_string(), "b:x".to_string()]);
    }

    #[test]
    fn late_continuation_runs_immediately() {
        let d = Deferred::settled(3);
        let hit = Rc::new(Cell::new(0));
        let h = Rc::clone(&hit);
        d.on_settle(move |v| h.set(*v));
        assert_eq!(hit.get(), 3);
    }

    #[test]
    fn and_then_waits_for_inner() {
        let outer: Deferred<u8> = Deferred::new();
        let inner: Deferred<String> = Deferred::new();
        let inner_handle = inner.clone();
        let chained = outer.and_then(move |_| inner_handle.clone());
        outer.settle(1);
        assert!(!chained.is_settled());
        inner.settle("done".into());
        assert_eq!(chained.peek().as_deref(), Some("done"));
    }

    #[test]
    fn continuation_may_touch_the_same_deferred() {
        let d = Deferred::new();
        let again = d.clone();
        let seen = Rc::new(Cell::new(None));
        let s = Rc::clone(&seen);
        d.on_settle(move |_| s.set(again.peek()));
        d.settle(5u8);
        assert_eq!(seen.get(), Some(5));
    }
}
