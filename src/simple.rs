//! Dense (simple) trie: every stride level on a route's path
//! materializes a heap.

use log::debug;

use crate::heap::{allot, slot_insert};
use crate::helpers::cmp_addr;
use crate::store::RouteStore;
use crate::stride::StridePlan;
use crate::types::{Entry, Insertion, Node, Route, RouteId, RoutingTable};

/// Result of removing a route below some heap. `FreeHeap` asks the parent
/// to drop the now-empty heap and restore its default into the slot that
/// pointed to it.
enum Removal {
    NotFound,
    Deleted(RouteId),
    FreeHeap(RouteId),
}

impl<D> RoutingTable<D> {
    pub(crate) fn insert_simple(&mut self, route: Route<D>) -> Insertion<D> {
        let plan = &self.plan;
        let store = &mut self.store;
        let (tlevel, index) = plan.base_index(&route.dest, route.plen);
        let mut cur: &mut Node = &mut self.root;
        for level in 0..plan.n_levels() {
            if level == tlevel {
                let threshold = 1usize << plan.stride(level);
                let fringe_check = level + 1 < plan.n_levels();
                return slot_insert(store, cur, index, threshold, fringe_check, route);
            }
            let fi = plan.fringe_index(&route.dest, level);
            if !cur.slots[fi].is_sub() {
                // promote the slot: any route sitting here becomes the
                // child's subtable default
                let inherited = cur.slots[fi].route();
                cur.slots[fi] = Entry::Sub(Node::new_dense(plan, level + 1, inherited));
                *cur.count_mut() += 1;
            }
            cur = match &mut cur.slots[fi] {
                Entry::Sub(child) => child,
                _ => unreachable!(),
            };
        }
        unreachable!("stride plan exhausted before the target level")
    }

    pub(crate) fn delete_simple(&mut self, dest: &[u8], plen: u8) -> Option<Route<D>> {
        let (tlevel, index) = self.plan.base_index(dest, plen);
        let plan = &self.plan;
        let store = &mut self.store;
        match remove_rec(plan, store, &mut self.root, 0, dest, plen, tlevel, index) {
            Removal::NotFound => None,
            Removal::Deleted(id) | Removal::FreeHeap(id) => Some(store.remove(id)),
        }
    }

    pub(crate) fn find_match_simple(&self, dest: &[u8]) -> Option<&Route<D>> {
        let mut cur: &Node = &self.root;
        let mut best: Option<RouteId> = None;
        for level in 0..self.plan.n_levels() {
            let fi = self.plan.fringe_index(dest, level);
            match &cur.slots[fi] {
                Entry::Empty => break,
                Entry::Route(id) => return Some(self.store.get(*id)),
                Entry::Sub(child) => {
                    // deepest subtable default seen so far is the best
                    // covering candidate
                    if let Some(id) = child.slots[1].route() {
                        best = Some(id);
                    }
                    cur = child;
                }
            }
        }
        best.or_else(|| self.root.slots[1].route())
            .map(|id| self.store.get(id))
    }

    pub(crate) fn find_exact_simple(&self, dest: &[u8], plen: u8) -> Option<&Route<D>> {
        let ml = self.plan.plen_to_level(plen);
        let mut cur: &Node = &self.root;
        let mut level = 0;
        let mut idx;
        let mut ent: Option<RouteId>;
        loop {
            idx = self.plan.fringe_index(dest, level);
            match &cur.slots[idx] {
                Entry::Empty => return None,
                Entry::Route(id) => {
                    ent = Some(*id);
                    break;
                }
                Entry::Sub(child) => {
                    if level == ml {
                        ent = child.slots[1].route();
                        break;
                    }
                    cur = child;
                    level += 1;
                }
            }
        }
        // ascend the covering-route chain left behind by allotment
        loop {
            if let Some(id) = ent {
                let r = self.store.get(id);
                if r.plen == plen && cmp_addr(&r.dest, dest, plen) {
                    return Some(r);
                }
            } else {
                return None;
            }
            idx >>= 1;
            if idx == 0 {
                return None;
            }
            ent = cur.slots[idx].route();
        }
    }
}

fn remove_rec<D>(
    plan: &StridePlan,
    store: &mut RouteStore<D>,
    node: &mut Node,
    level: usize,
    dest: &[u8],
    plen: u8,
    tlevel: usize,
    index: usize,
) -> Removal {
    if level == tlevel {
        return remove_at(plan, store, node, index, dest, plen);
    }
    let fi = plan.fringe_index(dest, level);
    let res = match &mut node.slots[fi] {
        Entry::Sub(child) => remove_rec(plan, store, child, level + 1, dest, plen, tlevel, index),
        _ => return Removal::NotFound,
    };
    if let Removal::FreeHeap(id) = res {
        // the child heap emptied out: drop it and restore its subtable
        // default so the inherited covering route is not lost
        let Entry::Sub(child) = std::mem::replace(&mut node.slots[fi], Entry::Empty) else {
            unreachable!()
        };
        debug!("[DELETE] freeing empty level {} heap", child.level);
        node.slots[fi] = Entry::from_route(child.slots[1].route());
        let count = node.count_mut();
        *count -= 1;
        if *count == 0 && level > 0 {
            return Removal::FreeHeap(id);
        }
        return Removal::Deleted(id);
    }
    res
}

fn remove_at<D>(
    plan: &StridePlan,
    store: &mut RouteStore<D>,
    node: &mut Node,
    k: usize,
    dest: &[u8],
    plen: u8,
) -> Removal {
    let level = node.level as usize;
    let threshold = 1usize << plan.stride(level);
    let fringe_check = level + 1 < plan.n_levels();
    let r = match &node.slots[k] {
        Entry::Sub(child) => child.slots[1].route(),
        e => e.route(),
    };
    let Some(id) = r else {
        return Removal::NotFound;
    };
    {
        let ent = store.get(id);
        if ent.plen != plen || !cmp_addr(&ent.dest, dest, plen) {
            return Removal::NotFound;
        }
    }
    // next covering route from the parent index, if any
    let s = if k >> 1 > 1 { node.slots[k >> 1].route() } else { None };
    let count = node.count_mut();
    *count -= 1;
    if *count == 0 && level > 0 {
        return Removal::FreeHeap(id);
    }
    if k < threshold {
        allot(&mut node.slots, k, Some(id), s, threshold, fringe_check);
    } else {
        match &mut node.slots[k] {
            Entry::Sub(child) => child.slots[1] = Entry::from_route(s),
            e => *e = Entry::from_route(s),
        }
    }
    Removal::Deleted(id)
}
