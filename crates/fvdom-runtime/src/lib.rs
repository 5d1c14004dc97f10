#![forbid(unsafe_code)]

//! Runtime primitives for FrankenVDOM.
//!
//! This crate carries the pieces of the rendering core that know nothing
//! about scene nodes or hosts:
//!
//! - [`reactive`]: observables, dependency-tracking computations, and batch
//!   scopes. Component render functions run inside a [`Computation`] so the
//!   renderer learns which state each component reads.
//! - [`scheduler`]: the three-lane job queue (pre, main, post) that turns
//!   reactive triggers into ordered, deduplicated re-renders.
//! - [`deferred`]: single-assignment values used for asynchronous setup and
//!   lazy component loading.
//!
//! Everything here is single-threaded (`Rc`, `RefCell`, thread locals).

pub mod deferred;
pub mod reactive;
pub mod scheduler;

pub use deferred::Deferred;
pub use reactive::{BatchScope, Computation, Observable, Subscription, is_tracking, untracked};
pub use scheduler::{
    DEFAULT_RECURSION_LIMIT, FlushReport, JobHandle, JobId, Scheduler, SchedulerError,
};
