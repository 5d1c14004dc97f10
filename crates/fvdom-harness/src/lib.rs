#![forbid(unsafe_code)]

//! Test harness for FrankenVDOM.
//!
//! - [`Fixture`]: a renderer over a [`RecordingHost`] with warnings and
//!   uncaptured errors collected for assertions.
//! - [`EventLog`]: shared ordered log for lifecycle and callback probes.
//! - [`probe`]: a component definition that logs every lifecycle hook.
//! - [`strategies`]: proptest strategies for keyed child lists.
//! - [`assert_html!`]: compare the serialized host tree.
//!
//! The integration suites under `tests/` exercise the whole engine through
//! these helpers.

use std::cell::RefCell;
use std::rc::Rc;

use fvdom_render::{
    ComponentDef, ComponentError, ErrorOrigin, FlushReport, Renderer, RendererConfig, SceneNode,
    SetupOutcome, Warning,
};

pub use fvdom_render::testing::{HostNodeId, HostOp, RecordingHost};

/// Compare the inner HTML of a fixture's root (or any host node).
///
/// ```ignore
/// assert_html!(fx, "<p>hi</p>");
/// assert_html!(fx, target, "<span>moved</span>");
/// ```
#[macro_export]
macro_rules! assert_html {
    ($fx:expr, $expected:expr $(,)?) => {{
        let actual = $fx.html();
        assert_eq!(actual, $expected, "host tree mismatch under root");
    }};
    ($fx:expr, $node:expr, $expected:expr $(,)?) => {{
        let actual = $fx.html_of(&$node);
        assert_eq!(actual, $expected, "host tree mismatch under {:?}", $node);
    }};
}

// =============================================================================
// Event log
// =============================================================================

/// Ordered, shareable log of strings.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    /// Copy of all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Drain all entries.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    /// Whether nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

// =============================================================================
// Fixture
// =============================================================================

/// An uncaptured error as seen by the configured error handler.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedError {
    /// Display form of the error.
    pub message: String,
    /// Where it was raised.
    pub origin: ErrorOrigin,
    /// Component the error was raised in, if any.
    pub component: Option<String>,
}

/// A renderer over a recording host, mounted at the host root.
pub struct Fixture {
    /// The renderer under test.
    pub renderer: Renderer<RecordingHost>,
    /// Root container.
    pub root: HostNodeId,
    warnings: Rc<RefCell<Vec<Warning>>>,
    errors: Rc<RefCell<Vec<CapturedError>>>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    /// Fixture with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    /// Fixture with `config`; its warn and error handlers are replaced by
    /// collectors.
    #[must_use]
    pub fn with_config(config: RendererConfig) -> Self {
        Self::with_host(RecordingHost::new(), config)
    }

    /// Fixture over a prepared host (for example one with teleport targets).
    #[must_use]
    pub fn with_host(host: RecordingHost, config: RendererConfig) -> Self {
        let warnings: Rc<RefCell<Vec<Warning>>> = Rc::default();
        let errors: Rc<RefCell<Vec<CapturedError>>> = Rc::default();
        let (w, e) = (Rc::clone(&warnings), Rc::clone(&errors));
        let config = config
            .with_warn_handler(move |warning| w.borrow_mut().push(warning.clone()))
            .with_error_handler(move |error, origin, component| {
                e.borrow_mut().push(CapturedError {
                    message: error.to_string(),
                    origin,
                    component: component.map(str::to_owned),
                });
            });
        let root = host.root();
        Self {
            renderer: Renderer::with_config(host, config),
            root,
            warnings,
            errors,
        }
    }

    /// Render `tree` into the root.
    pub fn render(&mut self, tree: SceneNode) {
        self.renderer.render(Some(tree), &self.root);
    }

    /// Unmount whatever is rendered into the root.
    pub fn unmount(&mut self) {
        self.renderer.render(None, &self.root);
    }

    /// Run queued work.
    pub fn flush(&mut self) -> FlushReport {
        self.renderer.flush()
    }

    /// Inner HTML of the root.
    #[must_use]
    pub fn html(&self) -> String {
        self.renderer.host().serialize(&self.root)
    }

    /// Inner HTML of `node`.
    #[must_use]
    pub fn html_of(&self, node: &HostNodeId) -> String {
        self.renderer.host().serialize(node)
    }

    /// The recording host.
    #[must_use]
    pub fn host(&self) -> &RecordingHost {
        self.renderer.host()
    }

    /// Forget recorded host calls and reset engine counters.
    pub fn clear(&mut self) {
        self.renderer.host_mut().clear_ops();
        self.renderer.reset_stats();
    }

    /// Warnings collected so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.borrow().clone()
    }

    /// Uncaptured errors collected so far.
    #[must_use]
    pub fn errors(&self) -> Vec<CapturedError> {
        self.errors.borrow().clone()
    }

    /// First element with `tag` under the root.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<HostNodeId> {
        self.host().find(&self.root, tag)
    }
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("renderer", &self.renderer)
            .field("warnings", &self.warnings.borrow().len())
            .field("errors", &self.errors.borrow().len())
            .finish()
    }
}

// =============================================================================
// Probes
// =============================================================================

/// A component that logs `"{name}:{hook}"` for each lifecycle hook and
/// `"{name}:render"` per render, rendering whatever `render` returns.
pub fn probe(
    name: &'static str,
    log: &EventLog,
    render: impl Fn(&fvdom_render::RenderContext) -> SceneNode + 'static,
) -> ComponentDef {
    let log = log.clone();
    let render = Rc::new(render);
    ComponentDef::new(name, move |cx| {
        for (kind, label) in [
            (fvdom_render::HookKind::BeforeMount, "before_mount"),
            (fvdom_render::HookKind::Mounted, "mounted"),
            (fvdom_render::HookKind::BeforeUpdate, "before_update"),
            (fvdom_render::HookKind::Updated, "updated"),
            (fvdom_render::HookKind::BeforeUnmount, "before_unmount"),
            (fvdom_render::HookKind::Unmounted, "unmounted"),
        ] {
            let log = log.clone();
            cx.on(kind, move || {
                log.push(format!("{name}:{label}"));
                Ok(())
            });
        }
        let log = log.clone();
        let render = Rc::clone(&render);
        Ok(SetupOutcome::render(move |ctx| {
            log.push(format!("{name}:render"));
            Ok(render(ctx))
        }))
    })
}

/// A component whose render always fails with `message`.
#[must_use]
pub fn failing(name: &'static str, message: &'static str) -> ComponentDef {
    ComponentDef::functional(name, move |_| Err(ComponentError::msg(message)))
}

// =============================================================================
// Keyed lists
// =============================================================================

/// `<ul>` with one keyed `<li>` per key, the key as text.
#[must_use]
pub fn keyed_list(keys: &[u32]) -> SceneNode {
    SceneNode::element("ul").children(
        keys.iter()
            .map(|k| SceneNode::element("li").key(*k).text_content(k.to_string())),
    )
}

/// Expected serialization of [`keyed_list`].
#[must_use]
pub fn keyed_list_html(keys: &[u32]) -> String {
    let items: String = keys.iter().map(|k| format!("<li>{k}</li>")).collect();
    format!("<ul>{items}</ul>")
}

/// Lower bound on moves: retained keys not on the longest run that keeps
/// its relative order.
#[must_use]
pub fn minimum_moves(before: &[u32], after: &[u32]) -> usize {
    let positions: Vec<usize> = after
        .iter()
        .filter_map(|k| before.iter().position(|b| b == k).map(|p| p + 1))
        .collect();
    let stable = fvdom_render::longest_increasing_subsequence(&positions).len();
    positions.len() - stable
}

/// Proptest strategies.
pub mod strategies {
    use proptest::prelude::*;
    use proptest::sample::subsequence;

    /// A list of distinct keys drawn from `0..pool`, in random order.
    pub fn unique_keys(pool: u32, max_len: usize) -> impl Strategy<Value = Vec<u32>> {
        let all: Vec<u32> = (0..pool).collect();
        let max_len = max_len.min(pool as usize);
        subsequence(all, 0..=max_len).prop_shuffle()
    }

    /// A before/after pair of distinct-key lists sharing a key pool, so
    /// some keys are retained, some removed, and some added.
    pub fn keyed_edit(pool: u32, max_len: usize) -> impl Strategy<Value = (Vec<u32>, Vec<u32>)> {
        (unique_keys(pool, max_len), unique_keys(pool, max_len))
    }
}

/// Route `tracing` output to the test writer. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
