//! Path-compressed trie: heaps exist only at levels where prefixes
//! diverge or terminate, so chains of single-child nodes are elided.
//!
//! Every non-root heap caches the canonical prefix that reaches it.
//! Because strides can be skipped on the way down, lookups must verify
//! prefix bits before accepting a slot.

use log::debug;

use crate::heap::{allot, slot_insert};
use crate::helpers::{cmp_addr, first_diff_bit};
use crate::store::RouteStore;
use crate::stride::StridePlan;
use crate::types::{Entry, Insertion, Node, Route, RouteId, RoutingTable};

/// Result of removing a route below some heap. `Collapse` asks the
/// parent to splice out the now-redundant heap.
enum Removal {
    NotFound,
    Deleted(RouteId),
    Collapse(RouteId),
}

impl<D> RoutingTable<D> {
    pub(crate) fn insert_pc(&mut self, route: Route<D>) -> Insertion<D> {
        let (tlevel, index) = self.plan.base_index(&route.dest, route.plen);
        let plan = &self.plan;
        let store = &mut self.store;
        insert_rec(plan, store, &mut self.root, route, tlevel, index)
    }

    pub(crate) fn delete_pc(&mut self, dest: &[u8], plen: u8) -> Option<Route<D>> {
        let (ml, index) = self.plan.base_index(dest, plen);
        let plan = &self.plan;
        let store = &mut self.store;
        match remove_rec(plan, store, &mut self.root, dest, plen, ml, index) {
            Removal::NotFound => None,
            Removal::Deleted(id) | Removal::Collapse(id) => Some(store.remove(id)),
        }
    }

    pub(crate) fn find_match_pc(&self, dest: &[u8]) -> Option<&Route<D>> {
        let mut cur: &Node = &self.root;
        let mut defs: Vec<RouteId> = Vec::with_capacity(self.plan.n_levels());
        let hit = loop {
            let fi = self.plan.fringe_index(dest, cur.level as usize);
            match &cur.slots[fi] {
                Entry::Empty => break None,
                Entry::Route(id) => break Some(*id),
                Entry::Sub(child) => {
                    if let Some(id) = child.slots[1].route() {
                        defs.push(id);
                    }
                    cur = child;
                }
            }
        };
        // Skipped strides mean a slot can hold a route for a different
        // prefix; always verify before accepting.
        if let Some(id) = hit {
            let r = self.store.get(id);
            if cmp_addr(&r.dest, dest, r.plen) {
                return Some(r);
            }
        }
        // fall back through the remembered subtable defaults, deepest first
        for &id in defs.iter().rev() {
            let r = self.store.get(id);
            if cmp_addr(&r.dest, dest, r.plen) {
                return Some(r);
            }
        }
        self.root.slots[1].route().map(|id| self.store.get(id))
    }

    pub(crate) fn find_exact_pc(&self, dest: &[u8], plen: u8) -> Option<&Route<D>> {
        let ml = self.plan.plen_to_level(plen);
        let mut cur: &Node = &self.root;
        while (cur.level as usize) < ml {
            let fi = self.plan.fringe_index(dest, cur.level as usize);
            match &cur.slots[fi] {
                Entry::Sub(child) if (child.level as usize) <= ml => cur = child,
                _ => return None,
            }
        }
        let mut idx = self.plan.fringe_index(dest, ml);
        let mut ent = match &cur.slots[idx] {
            Entry::Sub(child) => child.slots[1].route(),
            e => e.route(),
        };
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

fn insert_rec<D>(
    plan: &StridePlan,
    store: &mut RouteStore<D>,
    node: &mut Node,
    route: Route<D>,
    tlevel: usize,
    index: usize,
) -> Insertion<D> {
    let level = node.level as usize;
    let fi = plan.fringe_index(&route.dest, level);
    // level-0 routes never descend: their base index lies in the root heap
    if tlevel > 0 && node.slots[fi].is_sub() {
        let (child_level, diff) = {
            let Entry::Sub(child) = &node.slots[fi] else { unreachable!() };
            let lc = child.level as usize;
            let end = plan.total_len(lc.min(tlevel) - 1) as u16;
            (lc, first_diff_bit(&child.prefix, &route.dest, end))
        };
        match diff {
            None => {
                if tlevel > child_level {
                    let Entry::Sub(child) = &mut node.slots[fi] else { unreachable!() };
                    insert_rec(plan, store, child, route, tlevel, index)
                } else if tlevel == child_level {
                    let Entry::Sub(child) = &mut node.slots[fi] else { unreachable!() };
                    let threshold = 1usize << plan.stride(tlevel);
                    let fringe_check = tlevel + 1 < plan.n_levels();
                    slot_insert(store, child, index, threshold, fringe_check, route)
                } else {
                    // a shorter prefix must appear above the child
                    insert_subtable(plan, store, node, fi, tlevel, route, tlevel, index)
                }
            }
            Some(bit) => {
                let nl = plan.bit_to_level(bit);
                if nl < child_level {
                    insert_subtable(plan, store, node, fi, nl, route, tlevel, index)
                } else {
                    // divergence falls inside the child's own stride
                    debug_assert_eq!(nl, child_level);
                    let Entry::Sub(child) = &mut node.slots[fi] else { unreachable!() };
                    if let Some(id) = child.slots[1].route() {
                        let r = store.get(id);
                        if r.plen == route.plen && cmp_addr(&r.dest, &route.dest, route.plen) {
                            return Insertion::Duplicate(route);
                        }
                    }
                    insert_rec(plan, store, child, route, tlevel, index)
                }
            }
        }
    } else if tlevel == level {
        let threshold = 1usize << plan.stride(level);
        let fringe_check = level + 1 < plan.n_levels();
        slot_insert(store, node, index, threshold, fringe_check, route)
    } else {
        debug_assert!(tlevel > level);
        insert_subtable(plan, store, node, fi, tlevel, route, tlevel, index)
    }
}

/// Splice one or two new heaps below `node.slots[fi]` and allot `route`
/// into the heap at its native level.
///
/// When the slot already holds a child, a heap at level `nl` is
/// interposed between them; the displaced child's covering default moves
/// up into the new heap. When `nl` is shallower than the route's native
/// level, a second heap for the route hangs off the interposed one.
fn insert_subtable<D>(
    plan: &StridePlan,
    store: &mut RouteStore<D>,
    node: &mut Node,
    fi: usize,
    nl: usize,
    route: Route<D>,
    tlevel: usize,
    index: usize,
) -> Insertion<D> {
    let threshold = 1usize << plan.stride(tlevel);
    let fringe_check = tlevel + 1 < plan.n_levels();
    match std::mem::replace(&mut node.slots[fi], Entry::Empty) {
        Entry::Sub(mut displaced) => {
            debug_assert!(nl > node.level as usize && nl < displaced.level as usize);
            debug!(
                "[INSERT] interposing level {} heap above level {}",
                nl, displaced.level
            );
            let base = displaced.slots[1].route();
            displaced.slots[1] = Entry::Empty;
            let mut nst2 = Node::new_compressed(plan, nl, base, &route.dest);
            let ci = plan.fringe_index(&displaced.prefix, nl);
            if nl == tlevel {
                nst2.slots[ci] = Entry::Sub(displaced);
                *nst2.n_subtables_mut() = 1;
                let ins = slot_insert(store, &mut nst2, index, threshold, fringe_check, route);
                debug_assert!(ins.is_inserted());
                node.slots[fi] = Entry::Sub(nst2);
                ins
            } else {
                debug_assert!(nl < tlevel);
                let ri = plan.fringe_index(&route.dest, nl);
                debug_assert_ne!(ri, ci);
                let mut nst = Node::new_compressed(plan, tlevel, None, &route.dest);
                let ins = slot_insert(store, &mut nst, index, threshold, fringe_check, route);
                debug_assert!(ins.is_inserted());
                nst2.slots[ci] = Entry::Sub(displaced);
                nst2.slots[ri] = Entry::Sub(nst);
                *nst2.n_subtables_mut() = 2;
                node.slots[fi] = Entry::Sub(nst2);
                ins
            }
        }
        e => {
            debug_assert_eq!(nl, tlevel);
            let mut nst = Node::new_compressed(plan, tlevel, e.route(), &route.dest);
            let ins = slot_insert(store, &mut nst, index, threshold, fringe_check, route);
            debug_assert!(ins.is_inserted());
            node.slots[fi] = Entry::Sub(nst);
            *node.n_subtables_mut() += 1;
            ins
        }
    }
}

fn remove_rec<D>(
    plan: &StridePlan,
    store: &mut RouteStore<D>,
    node: &mut Node,
    dest: &[u8],
    plen: u8,
    ml: usize,
    index: usize,
) -> Removal {
    let level = node.level as usize;
    if level == ml {
        return remove_at(plan, store, node, index, dest, plen);
    }
    debug_assert!(level < ml);
    let fi = plan.fringe_index(dest, level);
    let res = match &mut node.slots[fi] {
        Entry::Sub(child) if (child.level as usize) <= ml => {
            remove_rec(plan, store, child, dest, plen, ml, index)
        }
        _ => return Removal::NotFound,
    };
    if let Removal::Collapse(id) = res {
        collapse_child(node, fi);
        if node.level > 0 && node.is_collapsible() {
            return Removal::Collapse(id);
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
    let s = if k >> 1 > 1 { node.slots[k >> 1].route() } else { None };
    *node.n_routes_mut() -= 1;
    if node.level > 0 && node.is_collapsible() {
        // the heap is freed wholesale; its slots need no update
        return Removal::Collapse(id);
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

/// Free the collapsible child heap under `node.slots[fi]`: reattach its
/// sole subtree (the covering default survives one level deeper) or
/// restore its default route into the slot.
fn collapse_child(node: &mut Node, fi: usize) {
    let Entry::Sub(mut child) = std::mem::replace(&mut node.slots[fi], Entry::Empty) else {
        unreachable!()
    };
    debug!("[DELETE] collapsing level {} heap", child.level);
    if child.n_subtables() == 1 {
        let ci = find_sole_subtable(&child);
        let Entry::Sub(mut grand) = std::mem::replace(&mut child.slots[ci], Entry::Empty) else {
            unreachable!()
        };
        grand.slots[1] = std::mem::replace(&mut child.slots[1], Entry::Empty);
        node.slots[fi] = Entry::Sub(grand);
    } else {
        debug_assert_eq!(child.n_subtables(), 0);
        node.slots[fi] = std::mem::replace(&mut child.slots[1], Entry::Empty);
        *node.n_subtables_mut() -= 1;
    }
}

fn find_sole_subtable(node: &Node) -> usize {
    (node.threshold()..node.slots.len())
        .find(|&i| node.slots[i].is_sub())
        .expect("bookkeeping says a child subtable exists")
}
