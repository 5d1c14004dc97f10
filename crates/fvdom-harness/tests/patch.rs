#![forbid(unsafe_code)]

//! Patch engine: element props, text, static content, vnode hooks,
//! replacement in place, and mount/unmount pairing.

use fvdom_harness::{EventLog, Fixture, HostOp, assert_html, keyed_list, keyed_list_html};
use fvdom_render::{Handler, PatchHint, PropValue, SceneNode};

fn prop_keys(fx: &Fixture) -> Vec<String> {
    fx.host()
        .ops()
        .iter()
        .filter_map(|op| match op {
            HostOp::PatchProp { key, .. } => Some(key.to_string()),
            _ => None,
        })
        .collect()
}

#[test]
fn one_move_for_a_single_displaced_key() {
    let mut fx = Fixture::new();
    fx.render(keyed_list(&[1, 2, 3, 4, 5]));
    fx.clear();
    fx.render(keyed_list(&[1, 3, 4, 2, 5]));
    assert_eq!(fx.html(), keyed_list_html(&[1, 3, 4, 2, 5]));
    let stats = fx.renderer.stats();
    assert_eq!(stats.moves, 1);
    assert_eq!(stats.unmounts, 0);
    assert_eq!(fx.host().created_elements(), 0);
    assert_eq!(fx.host().moved_inserts(), 1);
}

#[test]
fn incompatible_child_is_replaced_in_place() {
    let row = |middle: SceneNode| {
        SceneNode::element("div").children(vec![
            SceneNode::element("p").text_content("a"),
            middle,
            SceneNode::element("p").text_content("c"),
        ])
    };
    let mut fx = Fixture::new();
    fx.render(row(SceneNode::element("p").text_content("b")));
    let div = fx.find("div").expect("div mounted");
    let before = fx.host().children_of(&div);
    fx.clear();

    fx.render(row(SceneNode::element("span").text_content("x")));
    assert_html!(fx, "<div><p>a</p><span>x</span><p>c</p></div>");
    let after = fx.host().children_of(&div);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert_ne!(after[1], before[1]);
    assert_eq!(fx.host().created_elements(), 1);
    assert_eq!(fx.host().moved_inserts(), 0);
    let removes = fx.host().ops().iter().filter(|op| matches!(op, HostOp::Remove { .. })).count();
    assert_eq!(removes, 1);
}

#[test]
fn structurally_equal_rerender_touches_nothing() {
    let tree = || {
        SceneNode::element("form")
            .prop("class", "wide")
            .children(vec![
                SceneNode::element("input").prop("value", 3).prop("disabled", false),
                SceneNode::text("label"),
                SceneNode::comment("marker"),
                SceneNode::fragment(vec![SceneNode::element("b"), SceneNode::element("i")]),
            ])
    };
    let mut fx = Fixture::new();
    fx.render(tree());
    fx.clear();
    fx.render(tree());
    assert!(fx.host().ops().is_empty(), "{:?}", fx.host().ops());
}

#[test]
fn value_is_written_after_other_props() {
    let mut fx = Fixture::new();
    fx.render(
        SceneNode::element("input")
            .prop("value", 5)
            .prop("min", 0)
            .prop("max", 10),
    );
    assert_eq!(prop_keys(&fx), vec!["min", "max", "value"]);

    fx.clear();
    fx.render(
        SceneNode::element("input")
            .prop("value", 50)
            .prop("min", 0)
            .prop("max", 100),
    );
    assert_eq!(prop_keys(&fx), vec!["max", "value"]);
}

#[test]
fn removed_props_are_cleared() {
    let mut fx = Fixture::new();
    fx.render(SceneNode::element("a").prop("href", "/x").prop("title", "t"));
    fx.render(SceneNode::element("a").prop("href", "/y"));
    assert_html!(fx, "<a href=\"/y\"></a>");
    let a = fx.find("a").expect("anchor");
    assert_eq!(fx.host().attr(&a, "title"), None);
    assert_eq!(fx.host().attr(&a, "href"), Some(PropValue::from("/y")));
}

#[test]
fn class_hint_limits_the_props_diff() {
    let mut fx = Fixture::new();
    fx.render(SceneNode::element("div").prop("class", "a").prop("title", "one"));
    fx.clear();
    fx.render(
        SceneNode::element("div")
            .prop("class", "b")
            .prop("title", "two")
            .hint(PatchHint::CLASS),
    );
    assert_eq!(prop_keys(&fx), vec!["class"]);
    assert_html!(fx, "<div class=\"b\" title=\"one\"></div>");
}

#[test]
fn dynamic_props_hint_patches_only_listed_names() {
    let mut fx = Fixture::new();
    fx.render(SceneNode::element("progress").prop("max", 10).prop("value", 1));
    fx.clear();
    fx.render(
        SceneNode::element("progress")
            .prop("max", 20)
            .prop("value", 1)
            .hint(PatchHint::PROPS)
            .dynamic_props(["value"]),
    );
    // `value` is always written under PROPS, even when unchanged.
    assert_eq!(prop_keys(&fx), vec!["value"]);
}

#[test]
fn text_children_switch_shapes() {
    let mut fx = Fixture::new();
    fx.render(SceneNode::element("p").text_content("one"));
    fx.render(SceneNode::element("p").text_content("two"));
    assert_html!(fx, "<p>two</p>");
    fx.render(SceneNode::element("p").child(SceneNode::element("b").text_content("bold")));
    assert_html!(fx, "<p><b>bold</b></p>");
    fx.render(SceneNode::element("p").text_content("plain"));
    assert_html!(fx, "<p>plain</p>");
    fx.render(SceneNode::element("p"));
    assert_html!(fx, "<p></p>");
}

#[test]
fn text_and_comment_leaves_update_in_place() {
    let mut fx = Fixture::new();
    fx.render(SceneNode::fragment(vec![SceneNode::text("a"), SceneNode::comment("c1")]));
    fx.clear();
    fx.render(SceneNode::fragment(vec![SceneNode::text("b"), SceneNode::comment("c2")]));
    assert_html!(fx, "b<!--c2-->");
    let set_texts = fx.host().ops().iter().filter(|op| matches!(op, HostOp::SetText { .. })).count();
    assert_eq!(set_texts, 2);
    assert_eq!(fx.host().created_elements(), 0);
}

#[test]
fn static_blobs_mount_once_and_unmount_fully() {
    let blob = || SceneNode::static_blob("<b>1</b><i>2</i>");
    let mut fx = Fixture::new();
    fx.render(SceneNode::element("div").children(vec![blob(), SceneNode::text("tail")]));
    assert_html!(fx, "<div><b>1</b><i>2</i>tail</div>");
    fx.clear();
    fx.render(SceneNode::element("div").children(vec![blob(), SceneNode::text("tail")]));
    assert!(fx.host().ops().is_empty());
    fx.render(SceneNode::element("div").child(SceneNode::text("tail")));
    assert_html!(fx, "<div>tail</div>");
}

#[test]
fn vnode_hooks_bracket_host_mutations() {
    let log = EventLog::new();
    let hook = |entry: &'static str| {
        let log = log.clone();
        Handler::infallible(move |_| log.push(entry))
    };
    let node = |text: &str| {
        SceneNode::element("p")
            .prop("onVnodeBeforeMount", hook("before_mount"))
            .prop("onVnodeMounted", hook("mounted"))
            .prop("onVnodeBeforeUpdate", hook("before_update"))
            .prop("onVnodeUpdated", hook("updated"))
            .prop("onVnodeBeforeUnmount", hook("before_unmount"))
            .prop("onVnodeUnmounted", hook("unmounted"))
            .text_content(text)
    };
    let mut fx = Fixture::new();
    fx.render(node("a"));
    assert_eq!(log.take(), vec!["before_mount", "mounted"]);
    fx.render(node("b"));
    assert_eq!(log.take(), vec!["before_update", "updated"]);
    fx.unmount();
    assert_eq!(log.take(), vec!["before_unmount", "unmounted"]);
    // Hook props never reach the host.
    assert_eq!(fx.host().prop_writes(), 0);
}

#[test]
fn unmount_pairs_every_mount_and_repeats_are_no_ops() {
    let mut fx = Fixture::new();
    fx.render(SceneNode::element("section").children(vec![
        SceneNode::fragment(vec![SceneNode::text("x"), SceneNode::element("hr")]),
        SceneNode::static_blob("<em>s</em>"),
        keyed_list(&[1, 2, 3]),
    ]));
    assert!(fx.renderer.live_nodes() > 0);
    fx.unmount();
    fx.unmount();
    assert_html!(fx, "");
    assert_eq!(fx.renderer.live_nodes(), 0);
    assert_eq!(fx.host().double_removes(), 0);
}
