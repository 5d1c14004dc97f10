#![forbid(unsafe_code)]

//! Property tests for keyed child reconciliation against the recording host.

use fvdom_harness::strategies::keyed_edit;
use fvdom_harness::{Fixture, keyed_list, keyed_list_html, minimum_moves};
use fvdom_render::SceneNode;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn host_matches_new_order((before, after) in keyed_edit(24, 16)) {
        let mut fx = Fixture::new();
        fx.render(keyed_list(&before));
        fx.render(keyed_list(&after));
        prop_assert_eq!(fx.html(), keyed_list_html(&after));
        prop_assert_eq!(fx.host().double_removes(), 0);
    }

    #[test]
    fn moves_are_minimal((before, after) in keyed_edit(24, 16)) {
        let mut fx = Fixture::new();
        fx.render(keyed_list(&before));
        fx.clear();
        fx.render(keyed_list(&after));
        let stats = fx.renderer.stats();
        let retained = after.iter().filter(|k| before.contains(k)).count() as u64;
        let added = after.len() as u64 - retained;
        let removed = before.len() as u64 - retained;
        prop_assert_eq!(stats.moves, minimum_moves(&before, &after) as u64);
        prop_assert_eq!(fx.host().created_elements() as u64, added);
        // One unmount per removed <li>; the <li> has no child nodes.
        prop_assert_eq!(stats.unmounts, removed);
    }

    #[test]
    fn identical_rerender_is_silent(keys in fvdom_harness::strategies::unique_keys(24, 16)) {
        let mut fx = Fixture::new();
        let tree = keyed_list(&keys);
        fx.render(tree.clone());
        fx.clear();
        fx.render(tree);
        prop_assert!(fx.host().ops().is_empty());
        fx.render(keyed_list(&keys));
        prop_assert!(fx.host().ops().is_empty());
        prop_assert_eq!(fx.renderer.stats().moves, 0);
    }

    #[test]
    fn unkeyed_children_keep_position(a in 0usize..8, b in 0usize..8) {
        let items = |n: usize| {
            SceneNode::element("div").children((0..n).map(|i| SceneNode::element("span").text_content(i.to_string())))
        };
        let mut fx = Fixture::new();
        fx.render(items(a));
        fx.render(items(b));
        let expected: String = (0..b).map(|i| format!("<span>{i}</span>")).collect();
        prop_assert_eq!(fx.html(), format!("<div>{expected}</div>"));
    }
}

#[test]
fn keyed_fragments_move_as_a_unit() {
    let group = |k: u32| {
        SceneNode::fragment(vec![
            SceneNode::element("dt").text_content(k.to_string()),
            SceneNode::element("dd").text_content(format!("={k}")),
        ])
        .key(k)
    };
    let list = |keys: &[u32]| SceneNode::element("dl").children(keys.iter().map(|k| group(*k)));
    let mut fx = Fixture::new();
    fx.render(list(&[1, 2, 3]));
    fx.render(list(&[3, 1, 2]));
    assert_eq!(
        fx.html(),
        "<dl><dt>3</dt><dd>=3</dd><dt>1</dt><dd>=1</dd><dt>2</dt><dd>=2</dd></dl>"
    );
    assert_eq!(fx.renderer.stats().moves, 1);
}

#[test]
fn keyless_nodes_match_by_type() {
    let mut fx = Fixture::new();
    fx.render(SceneNode::element("div").children(vec![
        SceneNode::element("p").key(1).text_content("a"),
        SceneNode::element("span").text_content("s"),
    ]));
    let span = fx.find("span");
    fx.render(SceneNode::element("div").children(vec![
        SceneNode::element("span").text_content("s2"),
        SceneNode::element("p").key(1).text_content("a"),
    ]));
    assert_eq!(fx.html(), "<div><span>s2</span><p>a</p></div>");
    assert_eq!(fx.find("span"), span, "keyless span reused, not recreated");
}

#[test]
fn duplicate_keys_warn_once_per_repeat() {
    let mut fx = Fixture::new();
    fx.render(keyed_list(&[1, 2]));
    fx.render(keyed_list(&[2, 1, 1]));
    assert_eq!(fx.html(), "<ul><li>2</li><li>1</li><li>1</li></ul>");
    assert!(
        fx.warnings()
            .iter()
            .any(|w| matches!(w, fvdom_render::Warning::DuplicateKey { .. }))
    );
}
