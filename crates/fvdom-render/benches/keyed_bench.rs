//! Benchmarks for keyed child reconciliation and the LIS pass.
//!
//! Run with: cargo bench -p fvdom-render --bench keyed_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fvdom_render::{HostAdapter, PropValue, Props, Renderer, SceneNode, longest_increasing_subsequence};
use std::hint::black_box;

/// Host that hands out ids and does nothing else, so only engine work is
/// measured.
#[derive(Default)]
struct NullHost {
    next: u32,
}

impl NullHost {
    fn fresh(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
}

impl HostAdapter for NullHost {
    type Handle = u32;

    fn create_element(&mut self, _tag: &str, _props: &Props) -> u32 {
        self.fresh()
    }

    fn create_text(&mut self, _content: &str) -> u32 {
        self.fresh()
    }

    fn create_comment(&mut self, _content: &str) -> u32 {
        self.fresh()
    }

    fn insert(&mut self, _child: &u32, _parent: &u32, _anchor: Option<&u32>) {}

    fn remove(&mut self, _child: &u32) {}

    fn set_text(&mut self, _node: &u32, _content: &str) {}

    fn set_element_text(&mut self, _element: &u32, _content: &str) {}

    fn patch_prop(&mut self, _el: &u32, _key: &str, _prev: Option<&PropValue>, _next: Option<&PropValue>) {}

    fn parent_of(&self, _node: &u32) -> Option<u32> {
        None
    }

    fn next_sibling_of(&self, _node: &u32) -> Option<u32> {
        None
    }

    fn insert_static_content(&mut self, _content: &str, _parent: &u32, _anchor: Option<&u32>) -> (u32, u32) {
        let id = self.fresh();
        (id, id)
    }
}

fn list(keys: &[usize]) -> SceneNode {
    SceneNode::element("ul").children(
        keys.iter()
            .map(|k| SceneNode::element("li").key(*k).text_content(k.to_string())),
    )
}

/// Deterministic shuffle (xorshift), so runs are comparable.
fn shuffled(n: usize, seed: u64) -> Vec<usize> {
    let mut keys: Vec<usize> = (0..n).collect();
    let mut state = seed.max(1);
    for i in (1..n).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        keys.swap(i, j);
    }
    keys
}

fn bench_keyed_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed/patch");

    for n in [100usize, 1_000, 5_000] {
        group.throughput(Throughput::Elements(n as u64));
        let before: Vec<usize> = (0..n).collect();
        let reversed: Vec<usize> = (0..n).rev().collect();
        let random = shuffled(n, 0x9e37_79b9);
        let swapped = {
            let mut v = before.clone();
            v.swap(1, n - 2);
            v
        };

        for (name, after) in [("reverse", &reversed), ("shuffle", &random), ("swap_two", &swapped)] {
            let (old_tree, new_tree) = (list(&before), list(after));
            group.bench_with_input(BenchmarkId::new(name, n), &(), |b, _| {
                b.iter(|| {
                    let mut renderer = Renderer::new(NullHost::default());
                    renderer.render(Some(old_tree.clone()), &0);
                    renderer.render(Some(black_box(new_tree.clone())), &0);
                    black_box(renderer.stats())
                })
            });
        }
    }

    group.finish();
}

fn bench_lis(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed/lis");

    for n in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(n as u64));
        let values: Vec<usize> = shuffled(n, 42).into_iter().map(|v| v + 1).collect();
        group.bench_with_input(BenchmarkId::new("shuffle", n), &values, |b, values| {
            b.iter(|| black_box(longest_increasing_subsequence(black_box(values))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_keyed_patch, bench_lis);
criterion_main!(benches);
