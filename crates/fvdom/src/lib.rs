#![forbid(unsafe_code)]

//! FrankenVDOM public facade.
//!
//! Re-exports the render core and runtime primitives, plus a [`prelude`]
//! for application code.
//!
//! ```ignore
//! use fvdom::prelude::*;
//!
//! let count = Observable::new(0);
//! let counter = {
//!     let count = count.clone();
//!     ComponentDef::functional("Counter", move |_| {
//!         Ok(SceneNode::element("span").text_content(count.get().to_string()))
//!     })
//! };
//! let mut app = Renderer::new(host).create_app(counter);
//! app.mount(&root)?;
//! count.set(1);
//! app.flush();
//! ```

pub use fvdom_render as render;
pub use fvdom_runtime as runtime;

pub use fvdom_render::{
    App, AppError, AsyncComponentOptions, ComponentDef, ComponentError, Emitter, ErrorOrigin,
    Handler, HostAdapter, Key, LoadError, PropValue, Props, RenderContext, Renderer,
    RendererConfig, SceneNode, SetupContext, SetupOutcome, Slots, Warning, define_async_component,
    h,
};
pub use fvdom_runtime::{BatchScope, Deferred, FlushReport, Observable, untracked};

#[cfg(feature = "test-helpers")]
pub use fvdom_render::testing;

/// Everything a typical component module needs.
pub mod prelude {
    pub use fvdom_render::{
        App, ComponentDef, ComponentError, Handler, HookKind, HostAdapter, PropValue, Props,
        RenderContext, Renderer, RendererConfig, SceneNode, SetupContext, SetupOutcome, Slots,
    };
    pub use fvdom_runtime::{Deferred, Observable};
}
