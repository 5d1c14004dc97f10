#![forbid(unsafe_code)]

//! Application entry point.
//!
//! An [`App`] owns a renderer and a root component. `mount` renders the
//! root into a container and flushes; `unmount` tears the tree down and
//! runs the unmount hooks.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | `mount` twice | `AppError::AlreadyMounted`, tree untouched |
//! | `unmount` before `mount` | `AppError::NotMounted` |

use fvdom_runtime::FlushReport;

use crate::component::ComponentDef;
use crate::config::RendererConfig;
use crate::error::AppError;
use crate::host::HostAdapter;
use crate::renderer::Renderer;
use crate::scene::{PropValue, Props, SceneNode};

/// A root component bound to a renderer.
pub struct App<H: HostAdapter> {
    renderer: Renderer<H>,
    root: ComponentDef,
    props: Props,
    container: Option<H::Handle>,
}

impl<H: HostAdapter> Renderer<H> {
    /// Bind `root` to this renderer as an application.
    #[must_use]
    pub fn create_app(self, root: ComponentDef) -> App<H> {
        App {
            renderer: self,
            root,
            props: Props::new(),
            container: None,
        }
    }
}

impl<H: HostAdapter> App<H> {
    /// Set a root prop. Takes effect at `mount`.
    #[must_use]
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Set one root prop. Takes effect at `mount`.
    #[must_use]
    pub fn with_prop(mut self, key: &str, value: impl Into<PropValue>) -> Self {
        self.props.insert(key, value);
        self
    }

    /// Render the root component into `container` and flush.
    pub fn mount(&mut self, container: &H::Handle) -> Result<(), AppError> {
        if self.container.is_some() {
            return Err(AppError::AlreadyMounted);
        }
        let _span = tracing::debug_span!("app_mount", root = self.root.name()).entered();
        let tree = SceneNode::component(&self.root).props(self.props.clone());
        self.container = Some(container.clone());
        self.renderer.render(Some(tree), container);
        self.renderer.flush();
        Ok(())
    }

    /// Unmount the tree and flush the remaining unmount hooks.
    pub fn unmount(&mut self) -> Result<(), AppError> {
        let container = self.container.take().ok_or(AppError::NotMounted)?;
        let _span = tracing::debug_span!("app_unmount", root = self.root.name()).entered();
        self.renderer.render(None, &container);
        self.renderer.flush();
        Ok(())
    }

    /// Whether the app is currently mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.container.is_some()
    }

    /// The container the app is mounted in.
    #[must_use]
    pub fn container(&self) -> Option<&H::Handle> {
        self.container.as_ref()
    }

    /// Run queued work.
    pub fn flush(&mut self) -> FlushReport {
        self.renderer.flush()
    }

    /// The underlying renderer.
    #[must_use]
    pub fn renderer(&self) -> &Renderer<H> {
        &self.renderer
    }

    /// The underlying renderer, mutably.
    pub fn renderer_mut(&mut self) -> &mut Renderer<H> {
        &mut self.renderer
    }

    /// Renderer configuration for this app.
    pub fn config_mut(&mut self) -> &mut RendererConfig {
        self.renderer.config_mut()
    }

    /// Give back the renderer.
    #[must_use]
    pub fn into_renderer(self) -> Renderer<H> {
        self.renderer
    }
}

impl<H: HostAdapter> std::fmt::Debug for App<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("root", &self.root.name())
            .field("mounted", &self.container.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::component::SetupOutcome;
    use crate::testing::RecordingHost;

    fn greeter(log: Rc<RefCell<Vec<&'static str>>>) -> ComponentDef {
        ComponentDef::new("Greeter", move |cx| {
            let l = Rc::clone(&log);
            cx.on_mounted(move || {
                l.borrow_mut().push("mounted");
                Ok(())
            });
            let l = Rc::clone(&log);
            cx.on_unmounted(move || {
                l.borrow_mut().push("unmounted");
                Ok(())
            });
            Ok(SetupOutcome::render(|ctx| {
                let name = ctx.prop("name").map(|v| v.to_string()).unwrap_or_default();
                Ok(SceneNode::element("p").text_content(format!("hello {name}")))
            }))
        })
        .with_props(["name"])
    }

    #[test]
    fn mount_then_unmount() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let host = RecordingHost::new();
        let root = host.root();
        let mut app = Renderer::new(host)
            .create_app(greeter(Rc::clone(&log)))
            .with_prop("name", "ada");
        app.mount(&root).expect("mount");
        assert_eq!(app.renderer().host().serialize(&root), "<p>hello ada</p>");
        app.unmount().expect("unmount");
        assert_eq!(app.renderer().host().serialize(&root), "");
        assert_eq!(*log.borrow(), vec!["mounted", "unmounted"]);
        assert_eq!(app.renderer().live_instances(), 0);
    }

    #[test]
    fn double_mount_is_rejected() {
        let host = RecordingHost::new();
        let root = host.root();
        let mut app = Renderer::new(host).create_app(greeter(Rc::default()));
        app.mount(&root).expect("mount");
        assert_eq!(app.mount(&root), Err(AppError::AlreadyMounted));
        assert_eq!(app.renderer().host().serialize(&root), "<p>hello </p>");
    }

    #[test]
    fn unmount_before_mount_is_rejected() {
        let mut app = Renderer::new(RecordingHost::new()).create_app(greeter(Rc::default()));
        assert_eq!(app.unmount(), Err(AppError::NotMounted));
        assert!(!app.is_mounted());
    }
}
