//! Heap (trie node) construction and the allotment algorithm.

use crate::helpers::{cmp_addr, copy_prefix};
use crate::store::RouteStore;
use crate::stride::StridePlan;
use crate::types::{Book, Entry, Insertion, Node, Route, RouteId};

impl Node {
    /// Allocate a dense-trie heap with `base` as its subtable default.
    pub fn new_dense(plan: &StridePlan, level: usize, base: Option<RouteId>) -> Box<Node> {
        let mut slots = Vec::new();
        slots.resize_with(2usize << plan.stride(level), || Entry::Empty);
        slots[1] = Entry::from_route(base);
        Box::new(Node {
            level: level as u8,
            prefix: Box::default(),
            book: Book::Dense { count: 0 },
            slots: slots.into_boxed_slice(),
        })
    }

    /// Allocate a path-compressed heap, caching the first `tl[level-1]`
    /// bits of `dest` as the canonical prefix reaching it.
    pub fn new_compressed(
        plan: &StridePlan,
        level: usize,
        base: Option<RouteId>,
        dest: &[u8],
    ) -> Box<Node> {
        let mut slots = Vec::new();
        slots.resize_with(2usize << plan.stride(level), || Entry::Empty);
        slots[1] = Entry::from_route(base);
        let prefix = if level > 0 {
            copy_prefix(dest, plan.total_len(level - 1) as u16)
        } else {
            Box::default()
        };
        Box::new(Node {
            level: level as u8,
            prefix,
            book: Book::Compressed {
                n_routes: 0,
                n_subtables: 0,
            },
            slots: slots.into_boxed_slice(),
        })
    }

    /// First fringe index of this heap.
    pub fn threshold(&self) -> usize {
        self.slots.len() / 2
    }

    pub fn count_mut(&mut self) -> &mut u32 {
        match &mut self.book {
            Book::Dense { count } => count,
            Book::Compressed { .. } => panic!("dense bookkeeping on a path-compressed heap"),
        }
    }

    pub fn n_routes_mut(&mut self) -> &mut u32 {
        match &mut self.book {
            Book::Compressed { n_routes, .. } => n_routes,
            Book::Dense { .. } => panic!("path-compressed bookkeeping on a dense heap"),
        }
    }

    pub fn n_subtables(&self) -> u32 {
        match self.book {
            Book::Compressed { n_subtables, .. } => n_subtables,
            Book::Dense { .. } => panic!("path-compressed bookkeeping on a dense heap"),
        }
    }

    pub fn n_subtables_mut(&mut self) -> &mut u32 {
        match &mut self.book {
            Book::Compressed { n_subtables, .. } => n_subtables,
            Book::Dense { .. } => panic!("path-compressed bookkeeping on a dense heap"),
        }
    }

    /// A path-compressed heap with no native routes and at most one child
    /// carries no information of its own and can be removed.
    pub fn is_collapsible(&self) -> bool {
        matches!(
            self.book,
            Book::Compressed {
                n_routes: 0,
                n_subtables
            } if n_subtables <= 1
        )
    }
}

/// True when `e` holds exactly the (possibly absent) route `r`.
pub fn entry_is(e: &Entry, r: Option<RouteId>) -> bool {
    match (e, r) {
        (Entry::Empty, None) => true,
        (Entry::Route(id), Some(r)) => *id == r,
        _ => false,
    }
}

/// Propagate the replacement of route `r` by `s` through the subtree of
/// base index `k`, stopping wherever a more specific route has already
/// overridden `r`. Fringe slots holding subtable pointers redirect the
/// replacement to the child's default slot instead.
///
/// Insertion calls this with `r` = the covering route previously in
/// effect at `k`; deletion calls it with `r` = the removed route and
/// `s` = the next covering route from `k`'s parent index.
pub fn allot(
    slots: &mut [Entry],
    k: usize,
    r: Option<RouteId>,
    s: Option<RouteId>,
    threshold: usize,
    fringe_check: bool,
) {
    debug_assert!(k >= 2 && k < threshold);
    slots[k] = Entry::from_route(s);
    for j in [k << 1, (k << 1) | 1] {
        if j < threshold {
            if entry_is(&slots[j], r) {
                allot(slots, j, r, s, threshold, fringe_check);
            }
        } else {
            match &mut slots[j] {
                Entry::Sub(child) if fringe_check => {
                    if entry_is(&child.slots[1], r) {
                        child.slots[1] = Entry::from_route(s);
                    }
                }
                e => {
                    if entry_is(e, r) {
                        *e = Entry::from_route(s);
                    }
                }
            }
        }
    }
}

/// Insert `route` at base index `k` of `node`, allotting it through the
/// subtree it covers. Returns the route to the caller when an equal
/// prefix is already stored.
pub fn slot_insert<D>(
    store: &mut RouteStore<D>,
    node: &mut Node,
    k: usize,
    threshold: usize,
    fringe_check: bool,
    route: Route<D>,
) -> Insertion<D> {
    let existing = match &node.slots[k] {
        Entry::Sub(child) => child.slots[1].route(),
        e => e.route(),
    };
    if let Some(id) = existing {
        let r = store.get(id);
        if r.plen == route.plen && cmp_addr(&r.dest, &route.dest, route.plen) {
            return Insertion::Duplicate(route);
        }
    }
    let id = store.alloc(route);
    match &mut node.book {
        Book::Dense { count } => *count += 1,
        Book::Compressed { n_routes, .. } => *n_routes += 1,
    }
    if k < threshold {
        allot(&mut node.slots, k, existing, Some(id), threshold, fringe_check);
    } else {
        match &mut node.slots[k] {
            Entry::Sub(child) => child.slots[1] = Entry::Route(id),
            e => *e = Entry::Route(id),
        }
    }
    Insertion::Inserted
}
