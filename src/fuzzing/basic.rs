use super::*;
use crate::test::{reference, TestTable};
use crate::{CpTrie, Lpm, Poptrie, SailL, SailU};

qc!(all_variants_match_the_reference, _all_variants_match_the_reference);
fn _all_variants_match_the_reference(set: RouteSet) -> bool {
    let routes = set.routes();
    let mut tables: Vec<Box<dyn Lpm>> = vec![
        Box::new(SailU::test_table()),
        Box::new(SailL::test_table()),
        Box::new(Poptrie::test_table()),
        Box::new(CpTrie::test_table()),
    ];
    for table in tables.iter_mut() {
        for &(p, l, n) in &routes {
            table.insert(p, l, n).unwrap();
        }
    }
    set.probe_keys().into_iter().all(|key| {
        let (nexthop, matched) = reference(&routes, key);
        tables
            .iter()
            .all(|t| t.lookup(key) == nexthop && t.matched_prefix_len(key) == matched)
    })
}

qc!(ranks_stay_consistent_after_every_insert, _ranks_stay_consistent_after_every_insert);
fn _ranks_stay_consistent_after_every_insert(set: RouteSet) -> bool {
    let mut fib = CpTrie::test_table();
    for &(p, l, n) in &set.routes() {
        fib.insert(p, l, n).unwrap();
        if fib.check_ranks().is_err() {
            return false;
        }
    }
    true
}

qc!(duplicate_inserts_change_nothing, _duplicate_inserts_change_nothing);
fn _duplicate_inserts_change_nothing(set: RouteSet) -> bool {
    let routes = set.routes();
    let mut once = CpTrie::test_table();
    let mut twice = CpTrie::test_table();
    for &(p, l, n) in &routes {
        once.insert(p, l, n).unwrap();
        twice.insert(p, l, n).unwrap();
        twice.insert(p, l, n).unwrap();
    }
    if twice.check_ranks().is_err() {
        return false;
    }
    set.probe_keys()
        .into_iter()
        .all(|key| once.lookup(key) == twice.lookup(key))
}

qc!(variants_agree_with_each_other, _variants_agree_with_each_other);
fn _variants_agree_with_each_other(set: RouteSet) -> bool {
    let routes = set.routes();
    let mut sail_u = SailU::test_table();
    let mut sail_l = SailL::test_table();
    let mut poptrie = Poptrie::test_table();
    let mut cptrie = CpTrie::test_table();
    for &(p, l, n) in &routes {
        sail_u.insert(p, l, n).unwrap();
        sail_l.insert(p, l, n).unwrap();
        poptrie.insert(p, l, n).unwrap();
        cptrie.insert(p, l, n).unwrap();
    }
    set.probe_keys().into_iter().all(|key| {
        let nexthop = sail_u.lookup(key);
        let matched = sail_u.matched_prefix_len(key);
        sail_l.lookup(key) == nexthop
            && poptrie.lookup(key) == nexthop
            && cptrie.lookup(key) == nexthop
            && sail_l.matched_prefix_len(key) == matched
            && poptrie.matched_prefix_len(key) == matched
            && cptrie.matched_prefix_len(key) == matched
    })
}
