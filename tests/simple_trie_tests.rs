use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipart::{Insertion, Route, RoutingTable, TrieKind, WalkOrder};
use ipnet::Ipv4Net;

fn ip(s: &str) -> [u8; 4] {
    s.parse::<Ipv4Addr>().unwrap().octets()
}

fn table() -> RoutingTable<&'static str> {
    RoutingTable::new(&[16, 8, 8], 32, TrieKind::Simple).unwrap()
}

#[test]
fn basic_insert_lookup_delete() {
    let mut t = table();
    assert!(t.find_match(&ip("10.1.2.3")).is_none());
    assert!(t.insert(Route::new(&ip("10.0.0.0"), 8, "ten")).is_inserted());
    t.check_invariants();

    let hit = t.find_match(&ip("10.1.2.3")).unwrap();
    assert_eq!(hit.plen, 8);
    assert_eq!(hit.data, "ten");
    assert!(t.find_match(&ip("11.0.0.0")).is_none());

    let removed = t.delete(&ip("10.0.0.0"), 8).unwrap();
    assert_eq!(removed.data, "ten");
    assert!(t.find_match(&ip("10.1.2.3")).is_none());
    assert!(t.is_empty());
    t.check_invariants();
}

#[test]
fn nested_prefixes_prefer_longest() {
    let mut t = table();
    t.insert(Route::new(&ip("10.0.0.0"), 8, "eight"));
    t.insert(Route::new(&ip("10.0.0.0"), 16, "sixteen"));
    t.check_invariants();

    assert_eq!(t.find_match(&ip("10.0.5.5")).unwrap().data, "sixteen");
    assert_eq!(t.find_match(&ip("10.5.5.5")).unwrap().data, "eight");

    // deleting the more specific route re-exposes the covering one
    t.delete(&ip("10.0.0.0"), 16).unwrap();
    assert_eq!(t.find_match(&ip("10.0.5.5")).unwrap().data, "eight");
    t.check_invariants();
}

#[test]
fn default_route_fallback() {
    let mut t = table();
    assert!(t.insert(Route::new(&ip("0.0.0.0"), 0, "default")).is_inserted());
    assert_eq!(t.find_match(&ip("8.8.8.8")).unwrap().data, "default");

    t.insert(Route::new(&ip("8.0.0.0"), 8, "eight"));
    assert_eq!(t.find_match(&ip("8.8.8.8")).unwrap().data, "eight");

    t.delete(&ip("8.0.0.0"), 8).unwrap();
    assert_eq!(t.find_match(&ip("8.8.8.8")).unwrap().data, "default");
    t.check_invariants();

    let removed = t.delete(&ip("0.0.0.0"), 0).unwrap();
    assert_eq!(removed.data, "default");
    assert!(t.find_match(&ip("8.8.8.8")).is_none());
    assert!(t.delete(&ip("0.0.0.0"), 0).is_none());
    assert!(t.is_empty());
}

#[test]
fn sibling_host_prefixes() {
    let mut t = table();
    t.insert(Route::new(&ip("192.168.1.0"), 24, "net"));
    t.insert(Route::new(&ip("192.168.1.128"), 25, "upper"));
    t.check_invariants();

    assert_eq!(t.find_match(&ip("192.168.1.130")).unwrap().data, "upper");
    assert_eq!(t.find_match(&ip("192.168.1.5")).unwrap().data, "net");

    t.delete(&ip("192.168.1.128"), 25).unwrap();
    assert_eq!(t.find_match(&ip("192.168.1.130")).unwrap().data, "net");
    t.check_invariants();

    t.delete(&ip("192.168.1.0"), 24).unwrap();
    assert!(t.find_match(&ip("192.168.1.130")).is_none());
    assert!(t.find_match(&ip("192.168.1.5")).is_none());
    t.check_invariants();
}

#[test]
fn duplicate_insert_returns_route_to_caller() {
    let mut t = table();
    assert!(t.insert(Route::new(&ip("10.0.0.0"), 8, "first")).is_inserted());
    // identity ignores bits below the prefix length
    match t.insert(Route::new(&ip("10.0.0.1"), 8, "second")) {
        Insertion::Duplicate(r) => {
            assert_eq!(r.data, "second");
            assert_eq!(r.plen, 8);
        }
        Insertion::Inserted => panic!("equal prefix must be rejected"),
    }
    assert_eq!(t.len(), 1);
    assert_eq!(t.find_match(&ip("10.0.0.1")).unwrap().data, "first");
    t.check_invariants();
}

#[test]
fn delete_ignores_host_bits() {
    let mut t = table();
    t.insert(Route::new(&ip("10.0.0.0"), 8, "ten"));
    let removed = t.delete(&ip("10.99.99.99"), 8).unwrap();
    assert_eq!(removed.data, "ten");
    assert!(t.is_empty());
}

#[test]
fn stride_boundary_prefixes() {
    let mut t = table();
    // plen == 16 sits exactly on the root's fringe
    t.insert(Route::new(&ip("192.168.0.0"), 16, "fringe"));
    // plen == 17 is the first non-fringe index of level 1
    t.insert(Route::new(&ip("192.168.0.0"), 17, "deeper"));
    // host route at the deepest fringe
    t.insert(Route::new(&ip("192.168.0.1"), 32, "host"));
    t.check_invariants();

    assert_eq!(t.find_match(&ip("192.168.0.1")).unwrap().data, "host");
    assert_eq!(t.find_match(&ip("192.168.0.2")).unwrap().data, "deeper");
    assert_eq!(t.find_match(&ip("192.168.200.2")).unwrap().data, "fringe");

    t.delete(&ip("192.168.0.1"), 32).unwrap();
    assert_eq!(t.find_match(&ip("192.168.0.1")).unwrap().data, "deeper");
    t.delete(&ip("192.168.0.0"), 17).unwrap();
    assert_eq!(t.find_match(&ip("192.168.0.1")).unwrap().data, "fringe");
    t.check_invariants();
}

#[test]
fn exact_match_misses_return_none() {
    let mut t = table();
    t.insert(Route::new(&ip("0.0.0.0"), 0, "default"));
    t.insert(Route::new(&ip("10.0.0.0"), 8, "ten"));

    assert_eq!(t.find_exact(&ip("10.0.0.0"), 8).unwrap().data, "ten");
    // a covering route exists, but /16 was never inserted
    assert!(t.find_exact(&ip("10.0.0.0"), 16).is_none());
    assert!(t.find_exact(&ip("11.0.0.0"), 8).is_none());
    // the zero-length prefix is the default route itself
    assert_eq!(t.find_exact(&ip("0.0.0.0"), 0).unwrap().data, "default");
}

#[test]
fn exact_match_climbs_to_shorter_entries() {
    let mut t = table();
    t.insert(Route::new(&ip("10.0.0.0"), 9, "nine"));
    t.insert(Route::new(&ip("10.0.0.0"), 10, "ten"));
    assert_eq!(t.find_exact(&ip("10.0.0.0"), 9).unwrap().data, "nine");
    assert_eq!(t.find_exact(&ip("10.0.0.0"), 10).unwrap().data, "ten");

    t.delete(&ip("10.0.0.0"), 10).unwrap();
    assert!(t.find_exact(&ip("10.0.0.0"), 10).is_none());
    assert_eq!(t.find_match(&ip("10.0.0.1")).unwrap().data, "nine");
    t.check_invariants();
}

#[test]
fn single_bit_strides() {
    let strides = [1u8; 32];
    let mut t: RoutingTable<&str> = RoutingTable::new(&strides, 32, TrieKind::Simple).unwrap();
    t.insert(Route::new(&ip("10.0.0.0"), 8, "ten"));
    t.insert(Route::new(&ip("10.128.0.0"), 9, "deep"));
    t.check_invariants();

    assert_eq!(t.find_match(&ip("10.200.2.3")).unwrap().data, "deep");
    assert_eq!(t.find_match(&ip("10.1.2.3")).unwrap().data, "ten");
    t.delete(&ip("10.128.0.0"), 9).unwrap();
    assert_eq!(t.find_match(&ip("10.200.2.3")).unwrap().data, "ten");
    t.check_invariants();
}

#[test]
fn widest_stride_plan() {
    // a 24-bit stride is the widest the extractor accepts
    let mut t: RoutingTable<&str> = RoutingTable::new(&[8, 24], 32, TrieKind::Simple).unwrap();
    assert!(RoutingTable::<()>::new(&[8, 25], 33, TrieKind::Simple).is_err());

    t.insert(Route::new(&ip("10.0.0.0"), 8, "ten"));
    t.insert(Route::new(&ip("12.0.0.0"), 6, "six"));
    assert_eq!(t.find_match(&ip("10.1.2.3")).unwrap().data, "ten");
    assert_eq!(t.find_match(&ip("15.0.0.1")).unwrap().data, "six");
    t.delete(&ip("10.0.0.0"), 8).unwrap();
    assert!(t.find_match(&ip("10.1.2.3")).is_none());
    t.check_invariants();
}

#[test]
fn walks_visit_each_route_once() {
    let mut t = table();
    let routes = [
        ("0.0.0.0", 0u8),
        ("10.0.0.0", 8),
        ("10.0.0.0", 16),
        ("10.0.0.0", 24),
        ("10.0.0.128", 25),
        ("192.168.1.0", 24),
        ("192.168.1.1", 32),
    ];
    for (a, p) in routes {
        assert!(t.insert(Route::new(&ip(a), p, "r")).is_inserted());
    }
    let expect: HashSet<([u8; 4], u8)> = routes.iter().map(|&(a, p)| (ip(a), p)).collect();

    for order in [WalkOrder::DepthFirst, WalkOrder::BreadthFirst] {
        let mut seen = Vec::new();
        t.walk(order, |r| {
            let mut dest = [0u8; 4];
            dest.copy_from_slice(&r.dest[..4]);
            seen.push((dest, r.plen));
        });
        assert_eq!(seen.len(), t.len(), "{order:?} must visit each route once");
        let set: HashSet<_> = seen.into_iter().collect();
        assert_eq!(set, expect, "{order:?} visited the wrong routes");
    }
    t.check_invariants();
}

#[test]
fn flush_empties_the_table() {
    let mut t = table();
    t.insert(Route::new(&ip("0.0.0.0"), 0, "default"));
    t.insert(Route::new(&ip("10.0.0.0"), 8, "a"));
    t.insert(Route::new(&ip("10.1.0.0"), 16, "b"));
    t.insert(Route::new(&ip("10.1.1.1"), 32, "c"));

    t.flush();
    assert!(t.is_empty());
    let stats = t.stats();
    assert_eq!(stats.heaps_per_level, vec![1, 0, 0]);
    t.check_invariants();

    // the table stays usable after a flush
    t.insert(Route::new(&ip("10.0.0.0"), 8, "again"));
    assert_eq!(t.find_match(&ip("10.2.3.4")).unwrap().data, "again");
}

#[test]
fn heap_bookkeeping_frees_empty_heaps() {
    let mut t = table();
    t.insert(Route::new(&ip("10.1.1.1"), 32, "host"));
    let stats = t.stats();
    assert_eq!(stats.heaps_per_level, vec![1, 1, 1]);

    t.delete(&ip("10.1.1.1"), 32).unwrap();
    let stats = t.stats();
    assert_eq!(stats.heaps_per_level, vec![1, 0, 0]);
    t.check_invariants();
}

#[test]
fn v4_convenience_layer() {
    let mut t: RoutingTable<u32> = RoutingTable::ipv4(TrieKind::Simple);
    let net: Ipv4Net = "10.0.0.0/8".parse().unwrap();
    assert!(t.insert_v4(net, 7).is_inserted());

    let hit = t.find_match_v4("10.1.2.3".parse::<Ipv4Addr>().unwrap()).unwrap();
    assert_eq!(hit.data, 7);
    assert_eq!(t.find_exact_v4(net).unwrap().plen, 8);

    let removed = t.delete_v4(net).unwrap();
    assert_eq!(removed.data, 7);
    assert!(t.is_empty());
}
