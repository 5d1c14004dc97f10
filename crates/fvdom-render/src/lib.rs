#![forbid(unsafe_code)]

//! Render core for FrankenVDOM.
//!
//! A retained-mode renderer: callers describe the desired UI as an
//! immutable [`SceneNode`] tree, and the [`Renderer`] diffs it against what
//! is mounted and drives a platform [`HostAdapter`] with the minimal set of
//! mutations.
//!
//! # Modules
//!
//! - [`scene`]: scene nodes, props, keys, slots, patch hints.
//! - [`host`]: the host adapter trait.
//! - [`renderer`]: patch engine, keyed reconciliation, component lifecycle,
//!   async boundaries, teleports.
//! - [`component`]: component definitions and the setup/render contexts.
//! - [`async_component`]: lazily loaded components.
//! - [`emit`]: component events.
//! - [`config`]: renderer configuration.
//! - [`app`]: the application entry point.
//! - [`testing`]: an in-memory recording host (tests and `test-helpers`).
//!
//! # Example
//!
//! ```ignore
//! use fvdom_render::{Renderer, SceneNode};
//! use fvdom_render::testing::RecordingHost;
//!
//! let host = RecordingHost::new();
//! let root = host.root();
//! let mut renderer = Renderer::new(host);
//! renderer.render(Some(SceneNode::element("p").text_content("hi")), &root);
//! assert_eq!(renderer.host().serialize(&root), "<p>hi</p>");
//! ```

pub mod app;
pub mod arena;
pub mod async_component;
pub mod component;
pub mod config;
pub mod diff_strategy;
pub mod emit;
pub mod error;
pub mod host;
pub mod renderer;
pub mod scene;
pub mod sequence;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use app::App;
pub use async_component::{AsyncComponentOptions, Fail, Retry, define_async_component};
pub use component::{
    ComponentDef, HookKind, LifecycleState, RenderContext, RenderFn, SetupContext, SetupOutcome,
};
pub use config::RendererConfig;
pub use diff_strategy::ChildrenStrategy;
pub use emit::Emitter;
pub use error::{AppError, ComponentError, ErrorOrigin, LoadError, Warning};
pub use host::HostAdapter;
pub use renderer::{RenderStats, Renderer};
pub use scene::{
    Child, Children, Handler, Key, NodeKind, PatchHint, PropValue, Props, SceneNode, Slots, h,
    is_same_type,
};
pub use sequence::longest_increasing_subsequence;

pub use fvdom_runtime::{Deferred, FlushReport, Observable};
