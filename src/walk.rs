//! Trie iteration: depth- and breadth-first walks, flush, statistics and
//! structural integrity checking.

use std::collections::VecDeque;

use log::info;

use crate::helpers::first_diff_bit;
use crate::store::RouteStore;
use crate::stride::StridePlan;
use crate::types::{
    Book, Entry, Node, Route, RoutingTable, TableStats, TrieKind, WalkOrder,
};

impl<D> RoutingTable<D> {
    /// Visit every stored route exactly once.
    ///
    /// Allotted copies are filtered out: a slot contributes only when its
    /// route's prefix length is native to that slot. The table default
    /// route is reported first.
    pub fn walk<F: FnMut(&Route<D>)>(&self, order: WalkOrder, mut f: F) {
        if let Some(id) = self.root.slots[1].route() {
            f(self.store.get(id));
        }
        match order {
            WalkOrder::DepthFirst => walk_df(&self.plan, &self.store, &self.root, 1, &mut f),
            WalkOrder::BreadthFirst => walk_bf(&self.plan, &self.store, &self.root, &mut f),
        }
    }

    /// Remove every route.
    ///
    /// Two passes: collect all prefixes first, then delete them, so heap
    /// collapse never runs under a live iterator.
    pub fn flush(&mut self) {
        info!("[FLUSH] dropping {} routes", self.n_routes);
        let mut prefixes = Vec::with_capacity(self.n_routes);
        self.walk(WalkOrder::DepthFirst, |r| prefixes.push((r.dest, r.plen)));
        for (dest, plen) in prefixes {
            let removed = self.delete(&dest, plen);
            debug_assert!(removed.is_some());
        }
    }

    /// Count reachable heaps and transit (route-less) heaps per level.
    pub fn stats(&self) -> TableStats {
        let mut stats = TableStats {
            n_routes: self.n_routes,
            heaps_per_level: vec![0; self.plan.n_levels()],
            transit_per_level: vec![0; self.plan.n_levels()],
        };
        collect_stats(&self.plan, &self.store, &self.root, &mut stats);
        stats
    }

    /// Verify the structural invariants of every reachable heap,
    /// panicking on the first violation. Intended for tests and
    /// debugging; cross-checks the per-heap bookkeeping against a full
    /// structural scan.
    pub fn check_invariants(&self) {
        if let Some(id) = self.root.slots[1].route() {
            assert_eq!(
                self.store.get(id).plen,
                0,
                "root default slot must hold the zero-length prefix"
            );
        }
        check_node(&self.plan, &self.store, &self.root, self.kind, None);
        let mut walked = 0usize;
        self.walk(WalkOrder::DepthFirst, |_| walked += 1);
        assert_eq!(
            walked, self.n_routes,
            "walk visited a different number of routes than the table holds"
        );
        assert_eq!(
            self.store.len(),
            self.n_routes,
            "route store disagrees with the table's route count"
        );
    }
}

fn walk_df<D, F: FnMut(&Route<D>)>(
    plan: &StridePlan,
    store: &RouteStore<D>,
    node: &Node,
    i: usize,
    f: &mut F,
) {
    let level = node.level as usize;
    let threshold = node.threshold();
    if i >= threshold {
        match &node.slots[i] {
            Entry::Sub(child) => {
                // report the route pushed down into the child's default slot
                if let Some(id) = child.slots[1].route() {
                    if store.get(id).plen == plan.total_len(level) {
                        f(store.get(id));
                    }
                }
                walk_df(plan, store, child, 1, f);
            }
            Entry::Route(id) => {
                if store.get(*id).plen == plan.index_plen(level, i) {
                    f(store.get(*id));
                }
            }
            Entry::Empty => {}
        }
        return;
    }
    if i > 1 {
        if let Some(id) = node.slots[i].route() {
            if store.get(id).plen == plan.index_plen(level, i)
                && node.slots[i >> 1].route() != Some(id)
            {
                f(store.get(id));
            }
        }
    }
    walk_df(plan, store, node, i << 1, f);
    walk_df(plan, store, node, (i << 1) | 1, f);
}

fn walk_bf<D, F: FnMut(&Route<D>)>(
    plan: &StridePlan,
    store: &RouteStore<D>,
    root: &Node,
    f: &mut F,
) {
    let mut queue: VecDeque<&Node> = VecDeque::new();
    queue.push_back(root);
    while let Some(node) = queue.pop_front() {
        let level = node.level as usize;
        let threshold = node.threshold();
        for i in 2..threshold {
            if let Some(id) = node.slots[i].route() {
                if store.get(id).plen == plan.index_plen(level, i)
                    && node.slots[i >> 1].route() != Some(id)
                {
                    f(store.get(id));
                }
            }
        }
        let plen = plan.total_len(level);
        for i in threshold..node.slots.len() {
            match &node.slots[i] {
                Entry::Sub(child) => {
                    if let Some(id) = child.slots[1].route() {
                        if store.get(id).plen == plen {
                            f(store.get(id));
                        }
                    }
                    queue.push_back(child);
                }
                Entry::Route(id) => {
                    if store.get(*id).plen == plen {
                        f(store.get(*id));
                    }
                }
                Entry::Empty => {}
            }
        }
    }
}

/// Structurally recount a heap's native routes and child subtables,
/// using the same slot filter as the walks.
fn scan_node<D>(plan: &StridePlan, store: &RouteStore<D>, node: &Node) -> (u32, u32) {
    let level = node.level as usize;
    let threshold = node.threshold();
    let mut natives = 0;
    let mut subs = 0;
    for i in 2..threshold {
        if let Some(id) = node.slots[i].route() {
            if store.get(id).plen == plan.index_plen(level, i)
                && node.slots[i >> 1].route() != Some(id)
            {
                natives += 1;
            }
        }
    }
    let plen = plan.total_len(level);
    for i in threshold..node.slots.len() {
        match &node.slots[i] {
            Entry::Sub(child) => {
                subs += 1;
                if let Some(id) = child.slots[1].route() {
                    if store.get(id).plen == plen {
                        natives += 1;
                    }
                }
            }
            Entry::Route(id) => {
                if store.get(*id).plen == plen {
                    natives += 1;
                }
            }
            Entry::Empty => {}
        }
    }
    (natives, subs)
}

fn collect_stats<D>(
    plan: &StridePlan,
    store: &RouteStore<D>,
    node: &Node,
    stats: &mut TableStats,
) {
    let level = node.level as usize;
    stats.heaps_per_level[level] += 1;
    let (natives, _) = scan_node(plan, store, node);
    if natives == 0 {
        stats.transit_per_level[level] += 1;
    }
    for i in node.threshold()..node.slots.len() {
        if let Entry::Sub(child) = &node.slots[i] {
            collect_stats(plan, store, child, stats);
        }
    }
}

fn check_node<D>(
    plan: &StridePlan,
    store: &RouteStore<D>,
    node: &Node,
    kind: TrieKind,
    parent: Option<&Node>,
) {
    let level = node.level as usize;
    let threshold = node.threshold();
    assert_eq!(
        threshold,
        1usize << plan.stride(level),
        "heap size disagrees with its level's stride"
    );
    assert!(
        matches!(node.slots[0], Entry::Empty),
        "slot 0 is reserved and must stay empty"
    );
    assert!(!node.slots[1].is_sub(), "slot 1 can never be a subtable");
    if level > 0 {
        if let Some(id) = node.slots[1].route() {
            assert!(
                (store.get(id).plen as u16) <= plan.start_bit(level),
                "subtable default is longer than the prefix reaching the heap"
            );
        }
    }
    for i in 2..threshold {
        assert!(
            !node.slots[i].is_sub(),
            "subtable pointer outside the fringe"
        );
    }
    let (natives, subs) = scan_node(plan, store, node);
    match node.book {
        Book::Dense { count } => {
            assert_eq!(kind, TrieKind::Simple, "dense bookkeeping in the wrong trie");
            assert_eq!(
                count,
                natives + subs,
                "heap count disagrees with the structural scan at level {level}"
            );
            assert!(node.prefix.is_empty(), "dense heaps carry no prefix cache");
        }
        Book::Compressed { n_routes, n_subtables } => {
            assert_eq!(kind, TrieKind::PathCompressed);
            assert_eq!(
                n_routes, natives,
                "native route count disagrees with the structural scan at level {level}"
            );
            assert_eq!(
                n_subtables, subs,
                "subtable count disagrees with the structural scan at level {level}"
            );
        }
    }
    if kind == TrieKind::PathCompressed {
        if let Some(p) = parent {
            assert!(p.level < node.level, "child heap must be deeper than its parent");
            let plevel = p.level as usize;
            if plevel > 0 {
                assert!(
                    first_diff_bit(&node.prefix, &p.prefix, plan.start_bit(plevel)).is_none(),
                    "child prefix cache disagrees with its parent's"
                );
            }
        }
    }
    for i in threshold..node.slots.len() {
        if let Entry::Sub(child) = &node.slots[i] {
            if kind == TrieKind::PathCompressed {
                assert_eq!(
                    plan.fringe_index(&child.prefix, level),
                    i,
                    "child prefix cache disagrees with its fringe slot"
                );
            } else {
                assert_eq!(
                    child.level as usize,
                    level + 1,
                    "dense tries never skip a level"
                );
            }
            check_node(plan, store, child, kind, Some(node));
        }
    }
}
