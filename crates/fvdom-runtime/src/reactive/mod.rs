#![forbid(unsafe_code)]

//! Reactive state primitives for FrankenVDOM.
//!
//! This module provides the change-tracking capability the renderer builds
//! on:
//!
//! - [`Observable`]: A shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`Computation`]: Runs a closure while recording the observables it
//!   reads, and fires a trigger callback when any of them changes.
//! - [`BatchScope`]: RAII guard that defers all `Observable` notifications
//!   until the scope exits, collapsing bursts of writes.
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Subscribers are stored as `Weak` function pointers and cleaned up lazily
//! during notification.
//!
//! `Computation` keeps a thread-local tracking stack. `Observable::get()`
//! subscribes the top-of-stack computation to itself; the subscription is
//! owned by the computation and dropped on its next run or on `stop()`.
//!
//! A computation's trigger does not re-run anything. Component render
//! computations hand their trigger to the job scheduler, which deduplicates
//! and orders the resulting re-renders.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. A stopped computation never triggers.
//! 5. Within a `BatchScope`, values are updated immediately but notifications
//!    are deferred until the outermost scope exits.

pub mod batch;
pub mod computation;
pub mod observable;

pub use batch::BatchScope;
pub use computation::{Computation, is_tracking, untracked};
pub use observable::{Observable, Subscription};
