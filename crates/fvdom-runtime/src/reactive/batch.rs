#![forbid(unsafe_code)]

//! Deferred notification scopes.
//!
//! A [`BatchScope`] holds back observable notifications until the outermost
//! scope exits. Several writes to one observable inside a batch collapse into
//! a single notification carrying the final value.
//!
//! # Invariants
//!
//! 1. Nested scopes are supported; only the outermost scope flushes.
//! 2. Deferred notifications run in the order their sources first changed.
//! 3. Writes issued while the flush runs notify immediately (the batch is
//!    already closed).

use std::cell::RefCell;
use std::marker::PhantomData;

type Deferred = Box<dyn FnOnce()>;

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: Vec<(usize, Deferred)>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// RAII guard deferring observable notifications.
#[must_use = "notifications are only deferred while the scope is alive"]
pub struct BatchScope {
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    /// Open a batch scope on the current thread.
    pub fn new() -> Self {
        BATCH.with(|state| state.borrow_mut().depth += 1);
        Self {
            _not_send: PhantomData,
        }
    }

    /// Run `f` inside a batch, flushing notifications when it returns.
    pub fn run<R>(f: impl FnOnce() -> R) -> R {
        let _scope = Self::new();
        f()
    }

    /// Current nesting depth (0 when no scope is open).
    #[must_use]
    pub fn depth() -> usize {
        BATCH.with(|state| state.borrow().depth)
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &Self::depth())
            .finish()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let outermost = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth = state.depth.saturating_sub(1);
            state.depth == 0
        });
        if !outermost {
            return;
        }
        let pending = BATCH.with(|state| std::mem::take(&mut state.borrow_mut().pending));
        for (_, notify) in pending {
            notify();
        }
    }
}

pub(crate) fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

pub(crate) fn defer(source: usize, notify: Deferred) {
    BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.pending.iter().any(|(id, _)| *id == source) {
            return;
        }
        state.pending.push((source, notify));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn batch_collapses_notifications() {
        let obs = Observable::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _sub = {
            let seen = Rc::clone(&seen);
            obs.subscribe(move |v| seen.borrow_mut().push(*v))
        };
        BatchScope::run(|| {
            obs.set(1);
            obs.set(2);
            obs.set(3);
            assert!(seen.borrow().is_empty());
        });
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn nested_scopes_flush_once_at_outermost() {
        let obs = Observable::new(0);
        let hits = Rc::new(Cell::new(0));
        let _sub = {
            let hits = Rc::clone(&hits);
            obs.subscribe(move |_| hits.set(hits.get() + 1))
        };
        {
            let _outer = BatchScope::new();
            {
                let _inner = BatchScope::new();
                obs.set(5);
                assert_eq!(BatchScope::depth(), 2);
            }
            assert_eq!(hits.get(), 0);
        }
        assert_eq!(hits.get(), 1);
        assert_eq!(BatchScope::depth(), 0);
    }
}
