//! Module for testing using fuzzing (quickcheck)

use std::fmt::Debug;

use crate::prefix_mask;
use quickcheck::Arbitrary;

mod basic;

#[cfg(miri)]
const DEFAULT_NUM_TESTS: usize = 10;
#[cfg(not(miri))]
const DEFAULT_NUM_TESTS: usize = 100;
const DEFAULT_GEN_SIZE: usize = 40;

fn proptest_runner<A: Arbitrary + Debug + PartialEq, F: Fn(A) -> bool>(f: F) {
    let num_tests: usize = std::env::var("QUICKCHECK_TESTS")
        .ok()
        .and_then(|x| x.parse::<usize>().ok())
        .unwrap_or(DEFAULT_NUM_TESTS);

    let gen_size: usize = std::env::var("QUICKCHECK_GENERATOR_SIZE")
        .ok()
        .and_then(|x| x.parse::<usize>().ok())
        .unwrap_or(DEFAULT_GEN_SIZE);

    let mut gen = quickcheck::Gen::new(gen_size);

    // sample all inputs
    for _ in 0..num_tests {
        let input = A::arbitrary(&mut gen);
        let input_c = input.clone();
        let success = f(input_c);
        if !success {
            shrink_failure(f, input)
        }
    }
}

fn shrink_failure<A: Arbitrary + Debug + PartialEq, F: Fn(A) -> bool>(f: F, input: A) -> ! {
    for i in input.shrink() {
        let i_c = i.clone();
        let success = f(i_c);
        if !success {
            shrink_failure(f, i)
        }
    }
    // if we reach this point, then all shrunken inputs work. Therefore, `inputs` is the minimal
    // input
    panic!(
        "[QUICKCHECK] Test case failed!\n  Minimal input:\n    {:?}",
        input
    );
}

macro_rules! qc {
    ($name:ident, $f:ident) => {
        #[test]
        fn $name() {
            proptest_runner($f)
        }
    };
}
pub(crate) use qc;

/// Prefix lengths a generated route may take, biased towards the lengths a
/// real table is made of and covering every stride boundary.
const LENS: &[u8] = &[
    0, 1, 4, 8, 12, 16, 16, 17, 20, 22, 24, 24, 28, 31, 32, 32, 33, 40, 46, 48, 48, 52, 56, 63,
    64, 64, 65, 72, 80, 96, 112, 120, 127, 128, 128,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TestRoute {
    prefix: u128,
    len: u8,
    nexthop: u8,
}

impl TestRoute {
    fn as_tuple(self) -> (u128, u8, u8) {
        (self.prefix, self.len, self.nexthop)
    }
}

impl Arbitrary for TestRoute {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let len = *g.choose(LENS).unwrap();
        let mut prefix = u128::arbitrary(g) & prefix_mask(len);
        // cluster half of the routes under one /16 so they overlap often
        if len >= 16 && bool::arbitrary(g) {
            prefix = (0x2001u128 << 112) | (prefix & (u128::MAX >> 16));
        }
        let nexthop = u8::arbitrary(g) % 255 + 1;
        Self { prefix, len, nexthop }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        if self.len == 0 {
            quickcheck::empty_shrinker()
        } else {
            // a shorter prefix is a simpler one
            let len = self.len - 1;
            quickcheck::single_shrinker(Self {
                prefix: self.prefix & prefix_mask(len),
                len,
                nexthop: self.nexthop,
            })
        }
    }
}

/// A generated route set plus the keys worth probing it with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteSet(Vec<TestRoute>);

impl RouteSet {
    fn routes(&self) -> Vec<(u128, u8, u8)> {
        self.0.iter().map(|r| r.as_tuple()).collect()
    }

    fn probe_keys(&self) -> Vec<u128> {
        let mut keys = vec![0, u128::MAX];
        for route in &self.0 {
            keys.push(route.prefix);
            keys.push(route.prefix | 1);
            keys.push(route.prefix.wrapping_sub(1));
            if route.len > 0 && route.len < 128 {
                keys.push(route.prefix | 1 << (127 - route.len));
            }
        }
        keys
    }
}

impl Arbitrary for RouteSet {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self(Vec::arbitrary(g))
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0.shrink().map(Self))
    }
}
