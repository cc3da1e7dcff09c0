//! Allotment Routing Table (ART): longest-prefix match for bit-string
//! keys, typically IPv4 `/32` and IPv6 `/128` address spaces.
//!
//! The table is a multi-bit trie whose nodes are complete binary heaps of
//! fixed stride. Each level compacts all prefixes of up to `sl` bits into
//! `2·2^sl` heap slots, and the allotment step copies every route through
//! the slots it covers, so a lookup is one indexed load per level. Two
//! trie shapes are provided: a dense one that materializes a heap per
//! stride level, and a path-compressed one that allocates heaps only
//! where prefixes diverge.
//!
//! All operations require exclusive access; wrap the table in a lock if
//! it must be shared.
//!
//! ```
//! use ipart::{Route, RoutingTable, TrieKind};
//!
//! let mut table = RoutingTable::ipv4(TrieKind::PathCompressed);
//! table.insert(Route::new(&[10, 0, 0, 0], 8, "corp"));
//! table.insert(Route::new(&[10, 0, 0, 0], 16, "lab"));
//! assert_eq!(table.find_match(&[10, 0, 9, 9]).unwrap().data, "lab");
//! assert_eq!(table.find_match(&[10, 9, 9, 9]).unwrap().data, "corp");
//! ```

pub mod constants;
pub mod errors;
pub mod heap;
pub mod helpers;
pub mod store;
pub mod stride;
pub mod types;

mod pathcomp;
mod simple;
mod walk;

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};
use log::{debug, info, trace};
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;

pub use crate::errors::Error;
pub use crate::types::{
    Insertion, Route, RoutingTable, TableStats, TrieKind, WalkOrder,
};

use crate::constants::{IPV4_STRIDES, IPV6_STRIDES};
use crate::store::RouteStore;
use crate::stride::StridePlan;
use crate::types::{Entry, Node};

fn ensure_logging() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let _ = env_logger::builder()
            .format_timestamp(None)
            .is_test(std::env::var("RUST_TEST_THREADS").is_ok())
            .try_init();
    });
}

impl<D> RoutingTable<D> {
    /// Create a routing table.
    ///
    /// `strides` must be nonzero lengths of at most 24 bits summing to
    /// `addr_bits`, and `addr_bits` must fit a 16-byte key.
    pub fn new(strides: &[u8], addr_bits: u8, kind: TrieKind) -> Result<Self, Error> {
        ensure_logging();
        let plan = StridePlan::new(strides, addr_bits)?;
        let root = match kind {
            TrieKind::Simple => Node::new_dense(&plan, 0, None),
            TrieKind::PathCompressed => Node::new_compressed(&plan, 0, None, &[]),
        };
        info!(
            "[INIT] levels={} alen={} kind={:?}",
            plan.n_levels(),
            addr_bits,
            kind
        );
        Ok(Self {
            plan,
            kind,
            root,
            store: RouteStore::new(),
            n_routes: 0,
        })
    }

    /// A 32-bit table with the default `[16, 8, 8]` stride plan.
    pub fn ipv4(kind: TrieKind) -> Self {
        Self::new(&IPV4_STRIDES, 32, kind).expect("default IPv4 stride plan is valid")
    }

    /// A 128-bit table with the default `[16, 8 × 14]` stride plan.
    pub fn ipv6(kind: TrieKind) -> Self {
        Self::new(&IPV6_STRIDES, 128, kind).expect("default IPv6 stride plan is valid")
    }

    /// Number of routes currently stored, the default route included.
    pub fn len(&self) -> usize {
        self.n_routes
    }

    pub fn is_empty(&self) -> bool {
        self.n_routes == 0
    }

    pub fn kind(&self) -> TrieKind {
        self.kind
    }

    /// Address length in bits.
    pub fn addr_bits(&self) -> u8 {
        self.plan.addr_bits()
    }

    /// The table-wide default route (`plen == 0`), if set.
    pub fn default_route(&self) -> Option<&Route<D>> {
        self.root.slots[1].route().map(|id| self.store.get(id))
    }

    /// Insert a route.
    ///
    /// On success the table owns the route until [`delete`](Self::delete)
    /// returns it. If an equal prefix is already stored, the caller's
    /// route comes straight back as [`Insertion::Duplicate`] and the
    /// table is left unchanged.
    pub fn insert(&mut self, route: Route<D>) -> Insertion<D> {
        assert!(
            route.plen <= self.plan.addr_bits(),
            "prefix length exceeds the address length"
        );
        counter!("ipart_inserts_total").increment(1);
        debug!(
            "[INSERT] dest={:02x?} plen={}",
            &route.dest[..self.plan.addr_bytes()],
            route.plen
        );
        let ins = if route.plen == 0 {
            self.insert_default(route)
        } else {
            match self.kind {
                TrieKind::Simple => self.insert_simple(route),
                TrieKind::PathCompressed => self.insert_pc(route),
            }
        };
        if ins.is_inserted() {
            self.n_routes += 1;
        } else {
            trace!("[INSERT] duplicate prefix");
        }
        ins
    }

    /// Delete the route identified by `(dest, plen)` and return it.
    ///
    /// `dest` must carry the full address width.
    pub fn delete(&mut self, dest: &[u8], plen: u8) -> Option<Route<D>> {
        self.check_addr(dest, plen);
        counter!("ipart_deletes_total").increment(1);
        debug!(
            "[DELETE] dest={:02x?} plen={}",
            &dest[..self.plan.addr_bytes()],
            plen
        );
        let removed = if plen == 0 {
            self.delete_default()
        } else {
            match self.kind {
                TrieKind::Simple => self.delete_simple(dest, plen),
                TrieKind::PathCompressed => self.delete_pc(dest, plen),
            }
        };
        if removed.is_some() {
            self.n_routes -= 1;
        } else {
            trace!("[DELETE] no such route");
        }
        removed
    }

    /// Longest-prefix match for `dest`.
    pub fn find_match(&self, dest: &[u8]) -> Option<&Route<D>> {
        self.check_addr(dest, 0);
        match self.kind {
            TrieKind::Simple => self.find_match_simple(dest),
            TrieKind::PathCompressed => self.find_match_pc(dest),
        }
    }

    /// Exact match on `(dest, plen)`.
    ///
    /// A miss returns `None`; callers wanting a fallback can consult
    /// [`default_route`](Self::default_route) themselves. Looking up the
    /// zero-length prefix returns the default route.
    pub fn find_exact(&self, dest: &[u8], plen: u8) -> Option<&Route<D>> {
        self.check_addr(dest, plen);
        if plen == 0 {
            return self.default_route();
        }
        match self.kind {
            TrieKind::Simple => self.find_exact_simple(dest, plen),
            TrieKind::PathCompressed => self.find_exact_pc(dest, plen),
        }
    }

    /// Explicitly consume the table. This method exists for symmetry
    /// with [`flush`](Self::flush); `Drop` does the work.
    pub fn destroy(self) {}

    /// Emit gauges. The caller decides the cadence.
    pub fn report_metrics(&self) {
        gauge!("ipart_routes").set(self.n_routes as f64);
    }

    fn insert_default(&mut self, route: Route<D>) -> Insertion<D> {
        if self.root.slots[1].route().is_some() {
            return Insertion::Duplicate(route);
        }
        let id = self.store.alloc(route);
        self.root.slots[1] = Entry::Route(id);
        Insertion::Inserted
    }

    fn delete_default(&mut self) -> Option<Route<D>> {
        let id = self.root.slots[1].route()?;
        self.root.slots[1] = Entry::Empty;
        Some(self.store.remove(id))
    }

    fn check_addr(&self, dest: &[u8], plen: u8) {
        assert!(
            dest.len() >= self.plan.addr_bytes(),
            "destination is shorter than the address length"
        );
        assert!(
            plen <= self.plan.addr_bits(),
            "prefix length exceeds the address length"
        );
    }

    // ---- IPv4/IPv6 convenience layer --------------------------------

    /// Insert an IPv4 network. Requires a 32-bit table.
    pub fn insert_v4(&mut self, net: Ipv4Net, data: D) -> Insertion<D> {
        assert_eq!(self.plan.addr_bits(), 32, "insert_v4 requires a 32-bit table");
        self.insert(Route::from_v4(net, data))
    }

    /// Delete an IPv4 network. Requires a 32-bit table.
    pub fn delete_v4(&mut self, net: Ipv4Net) -> Option<Route<D>> {
        assert_eq!(self.plan.addr_bits(), 32, "delete_v4 requires a 32-bit table");
        self.delete(&net.network().octets(), net.prefix_len())
    }

    /// Longest-prefix match for an IPv4 address. Requires a 32-bit table.
    pub fn find_match_v4(&self, addr: Ipv4Addr) -> Option<&Route<D>> {
        assert_eq!(self.plan.addr_bits(), 32, "find_match_v4 requires a 32-bit table");
        self.find_match(&addr.octets())
    }

    /// Exact match for an IPv4 network. Requires a 32-bit table.
    pub fn find_exact_v4(&self, net: Ipv4Net) -> Option<&Route<D>> {
        assert_eq!(self.plan.addr_bits(), 32, "find_exact_v4 requires a 32-bit table");
        self.find_exact(&net.network().octets(), net.prefix_len())
    }

    /// Insert an IPv6 network. Requires a 128-bit table.
    pub fn insert_v6(&mut self, net: Ipv6Net, data: D) -> Insertion<D> {
        assert_eq!(self.plan.addr_bits(), 128, "insert_v6 requires a 128-bit table");
        self.insert(Route::from_v6(net, data))
    }

    /// Delete an IPv6 network. Requires a 128-bit table.
    pub fn delete_v6(&mut self, net: Ipv6Net) -> Option<Route<D>> {
        assert_eq!(self.plan.addr_bits(), 128, "delete_v6 requires a 128-bit table");
        self.delete(&net.network().octets(), net.prefix_len())
    }

    /// Longest-prefix match for an IPv6 address. Requires a 128-bit table.
    pub fn find_match_v6(&self, addr: Ipv6Addr) -> Option<&Route<D>> {
        assert_eq!(self.plan.addr_bits(), 128, "find_match_v6 requires a 128-bit table");
        self.find_match(&addr.octets())
    }
}
