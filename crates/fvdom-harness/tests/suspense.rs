#![forbid(unsafe_code)]

//! Async boundaries: fallback display, resolution, stale branches, effect
//! buffering.

use fvdom_harness::{EventLog, Fixture, assert_html};
use fvdom_render::{
    ComponentDef, ComponentError, Deferred, ErrorOrigin, Handler, RenderContext, RenderFn,
    SceneNode, SetupOutcome, Warning,
};

type Gate = Deferred<Result<RenderFn, ComponentError>>;

/// A component whose setup waits on `gate` and logs `"{name}:mounted"`.
fn gated(name: &'static str, gate: &Gate, log: &EventLog) -> ComponentDef {
    let (gate, log) = (gate.clone(), log.clone());
    ComponentDef::new(name, move |cx| {
        let log = log.clone();
        cx.on_mounted(move || {
            log.push(format!("{name}:mounted"));
            Ok(())
        });
        Ok(SetupOutcome::Async(gate.clone()))
    })
}

fn open(gate: &Gate, text: &'static str) {
    let render: RenderFn =
        std::rc::Rc::new(move |_: &RenderContext| -> Result<SceneNode, ComponentError> {
            Ok(SceneNode::text(text))
        });
    assert!(gate.settle(Ok(render)));
}

fn loading() -> SceneNode {
    SceneNode::element("p").text_content("loading")
}

fn logger(log: &EventLog, entry: &'static str) -> Handler {
    let log = log.clone();
    Handler::infallible(move |_| log.push(entry))
}

#[test]
fn fallback_shows_until_the_dependency_resolves() {
    fvdom_harness::init_test_tracing();
    let log = EventLog::new();
    let gate = Gate::new();
    let child = gated("child", &gate, &log);
    let mut fx = Fixture::new();
    fx.render(
        SceneNode::suspense(
            SceneNode::element("main").child(SceneNode::component(&child)),
            loading(),
        )
        .prop("onPending", logger(&log, "pending"))
        .prop("onFallback", logger(&log, "fallback"))
        .prop("onResolve", logger(&log, "resolve")),
    );
    assert_html!(fx, "<p>loading</p>");
    assert_eq!(log.take(), vec!["pending", "fallback"]);

    open(&gate, "ready");
    assert_html!(fx, "<p>loading</p>");
    fx.flush();
    assert_html!(fx, "<main>ready</main>");
    assert_eq!(log.take(), vec!["resolve", "child:mounted"]);
    assert!(fx.warnings().is_empty());
}

#[test]
fn sibling_mounted_hooks_wait_for_resolution() {
    let log = EventLog::new();
    let gate = Gate::new();
    let child = gated("child", &gate, &log);
    let sibling = fvdom_harness::probe("sibling", &log, |_| SceneNode::element("aside"));
    let mut fx = Fixture::new();
    fx.render(SceneNode::suspense(
        SceneNode::fragment(vec![SceneNode::component(&sibling), SceneNode::component(&child)]),
        loading(),
    ));
    assert_eq!(log.take(), vec!["sibling:before_mount", "sibling:render"]);

    open(&gate, "done");
    fx.flush();
    assert_html!(fx, "<aside></aside>done");
    assert_eq!(log.take(), vec!["sibling:mounted", "child:mounted"]);
}

#[test]
fn failed_async_setup_reports_and_renders_nothing() {
    let log = EventLog::new();
    let gate = Gate::new();
    let child = gated("child", &gate, &log);
    let mut fx = Fixture::new();
    fx.render(SceneNode::suspense(
        SceneNode::element("main").child(SceneNode::component(&child)),
        loading(),
    ));
    gate.settle(Err(ComponentError::msg("network down")));
    fx.flush();

    assert_html!(fx, "<main><!----></main>");
    let errors = fx.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].origin, ErrorOrigin::AsyncSetup);
    assert_eq!(errors[0].message, "network down");
}

#[test]
fn replaced_pending_branch_ignores_late_settlement() {
    let log = EventLog::new();
    let gate = Gate::new();
    let child = gated("child", &gate, &log);
    let mut fx = Fixture::new();
    fx.render(SceneNode::suspense(
        SceneNode::element("main").child(SceneNode::component(&child)),
        loading(),
    ));
    fx.render(SceneNode::suspense(
        SceneNode::element("section").text_content("b"),
        loading(),
    ));
    assert_html!(fx, "<section>b</section>");

    open(&gate, "late");
    fx.flush();
    assert_html!(fx, "<section>b</section>");
    assert!(log.is_empty());
    assert_eq!(fx.renderer.live_instances(), 0);
}

#[test]
fn resolved_content_stays_while_a_new_branch_is_pending() {
    let log = EventLog::new();
    let gate = Gate::new();
    let child = gated("child", &gate, &log);
    let mut fx = Fixture::new();
    fx.render(SceneNode::suspense(
        SceneNode::element("section").text_content("old"),
        loading(),
    ));
    assert_html!(fx, "<section>old</section>");

    fx.render(SceneNode::suspense(
        SceneNode::element("main").child(SceneNode::component(&child)),
        loading(),
    ));
    assert_html!(fx, "<section>old</section>");

    open(&gate, "new");
    fx.flush();
    assert_html!(fx, "<main>new</main>");
    assert_eq!(log.take(), vec!["child:mounted"]);
}

#[test]
fn zero_timeout_shows_the_fallback_immediately() {
    let log = EventLog::new();
    let gate = Gate::new();
    let child = gated("child", &gate, &log);
    let mut fx = Fixture::new();
    fx.render(
        SceneNode::suspense(SceneNode::element("section").text_content("old"), loading())
            .prop("timeout", 0),
    );
    fx.render(
        SceneNode::suspense(
            SceneNode::element("main").child(SceneNode::component(&child)),
            loading(),
        )
        .prop("timeout", 0),
    );
    assert_html!(fx, "<p>loading</p>");

    open(&gate, "new");
    fx.flush();
    assert_html!(fx, "<main>new</main>");
}

#[test]
fn nested_boundary_effects_wait_for_the_outer_boundary() {
    let log = EventLog::new();
    let (outer_gate, inner_gate) = (Gate::new(), Gate::new());
    let outer_child = gated("outer", &outer_gate, &log);
    let inner_child = gated("inner", &inner_gate, &log);
    let mut fx = Fixture::new();
    fx.render(SceneNode::suspense(
        SceneNode::element("div").children(vec![
            SceneNode::component(&outer_child),
            SceneNode::suspense(
                SceneNode::component(&inner_child),
                SceneNode::text("inner loading"),
            ),
        ]),
        loading(),
    ));
    assert_html!(fx, "<p>loading</p>");

    open(&inner_gate, "i");
    fx.flush();
    assert_html!(fx, "<p>loading</p>");
    assert!(log.is_empty(), "inner effects are held by the pending outer boundary");

    open(&outer_gate, "o");
    fx.flush();
    assert_html!(fx, "<div>oi</div>");
    assert_eq!(log.take(), vec!["inner:mounted", "outer:mounted"]);
}

#[test]
fn async_setup_outside_a_boundary_warns_and_renders_later() {
    let log = EventLog::new();
    let gate = Gate::new();
    let child = gated("orphan", &gate, &log);
    let mut fx = Fixture::new();
    fx.render(SceneNode::element("div").child(SceneNode::component(&child)));
    assert_html!(fx, "<div><!----></div>");
    assert!(fx.warnings().iter().any(|w| matches!(
        w,
        Warning::AsyncSetupWithoutBoundary { component } if component.as_ref() == "orphan"
    )));

    open(&gate, "late");
    fx.flush();
    assert_html!(fx, "<div>late</div>");
    assert_eq!(log.take(), vec!["orphan:mounted"]);
}

#[test]
fn unmounting_a_pending_boundary_cleans_up_both_branches() {
    let log = EventLog::new();
    let gate = Gate::new();
    let child = gated("child", &gate, &log);
    let mut fx = Fixture::new();
    fx.render(SceneNode::suspense(SceneNode::component(&child), loading()));
    fx.unmount();
    assert_html!(fx, "");
    assert_eq!(fx.renderer.live_instances(), 0);
    assert_eq!(fx.renderer.live_nodes(), 0);

    open(&gate, "gone");
    fx.flush();
    assert_html!(fx, "");
    assert!(log.is_empty());
}
