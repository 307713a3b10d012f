use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use lpm_trie::{
    CpTrie, CpTrieConfig, Lpm, Poptrie, PoptrieConfig, SailConfig, SailL, SailU,
};

const NUM_ROUTES: usize = 8_000;
const NUM_KEYS: usize = 100_000;

/// Marsaglia xorshift generators, so that runs are reproducible without
/// carrying a FIB file around.
struct Xorshift32(u32);

impl Xorshift32 {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

struct Xorshift128 {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}

impl Xorshift128 {
    fn new() -> Self {
        Self { a: 1, b: 1, c: 1, d: 1 }
    }

    fn next(&mut self) -> u32 {
        let mut t = self.d;
        let s = self.a;
        self.d = self.c;
        self.c = self.b;
        self.b = s;
        t ^= t << 11;
        t ^= t >> 8;
        self.a = t ^ s ^ (s >> 19);
        self.a
    }

    fn next_ipv6(&mut self) -> u128 {
        let (a, b, c, d) = (self.next(), self.next(), self.next(), self.next());
        (a as u128) << 96 | (b as u128) << 64 | (c as u128) << 32 | d as u128
    }
}

/// Prefix lengths weighted roughly like a global IPv6 table (nothing past
/// /64, /32 and /48 dominating).
const LENS: &[u8] = &[
    16, 24, 24, 28, 29, 32, 32, 32, 32, 36, 40, 40, 44, 44, 48, 48, 48, 48, 52, 56, 60, 64,
];

fn synth_routes() -> Vec<(u128, u8, u8)> {
    let mut rnd = Xorshift128::new();
    let mut pick = Xorshift32(7);
    (0..NUM_ROUTES)
        .map(|_| {
            let len = LENS[pick.next() as usize % LENS.len()];
            // spread the routes over 256 /16 blocks of 2000::/8
            let top = 0x2000u128 | (pick.next() as u128 & 0xff);
            let prefix = (top << 112 | (rnd.next_ipv6() >> 16))
                & (u128::MAX << (128 - len as u32));
            let nexthop = (pick.next() % 255 + 1) as u8;
            (prefix, len, nexthop)
        })
        .collect()
}

/// Uniformly random keys in 2000::/8, mostly missing the table.
fn random_traffic() -> Vec<u128> {
    let mut rnd = Xorshift128::new();
    (0..NUM_KEYS)
        .map(|_| (0x20u128 << 120) | (rnd.next_ipv6() >> 8))
        .collect()
}

/// Keys walking one covered block one address at a time.
fn sequential_traffic(routes: &[(u128, u8, u8)]) -> Vec<u128> {
    let base = routes[0].0;
    (0..NUM_KEYS).map(|i| base | i as u128).collect()
}

/// Keys drawn from the covered prefixes, every lookup a hit.
fn repeated_traffic(routes: &[(u128, u8, u8)]) -> Vec<u128> {
    let mut rnd = Xorshift128::new();
    let mut pick = Xorshift32(13);
    (0..NUM_KEYS)
        .map(|_| {
            let (prefix, len, _) = routes[pick.next() as usize % routes.len()];
            prefix | (rnd.next_ipv6() >> len as u32)
        })
        .collect()
}

fn sail_config() -> SailConfig {
    SailConfig {
        level_chunks: [
            256, 1024, 8192, 8192, 8192, 4096, 2048, 128, 128, 128, 128, 128, 128, 128, 128,
        ],
    }
}

fn cptrie_config() -> CpTrieConfig {
    CpTrieConfig {
        level_chunks: [
            256, 1024, 8192, 8192, 8192, 4096, 2048, 128, 128, 128, 128, 128, 128, 128, 128,
        ],
        leaf_entries: 4_000_000,
    }
}

fn poptrie_config() -> PoptrieConfig {
    PoptrieConfig {
        level_nodes: [
            1024, 8192, 16384, 16384, 16384, 16384, 8192, 4096, 2048, 128, 128, 128, 128, 128,
            128, 128, 128, 128, 128,
        ],
        leaf_entries: 4_000_000,
    }
}

fn filled<L: Lpm>(mut table: L, routes: &[(u128, u8, u8)]) -> L {
    for &(p, l, n) in routes {
        table.insert(p, l, n).expect("the benchmark configuration fits the route set");
    }
    table
}

fn bench_insert(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let routes = synth_routes();
    let mut group = c.benchmark_group("insert");
    group.sample_size(10);
    group.bench_function("sail-u", |b| {
        b.iter_batched(
            || SailU::with_config(&sail_config()).unwrap(),
            |table| filled(table, &routes),
            BatchSize::LargeInput,
        )
    });
    group.bench_function("sail-l", |b| {
        b.iter_batched(
            || SailL::with_config(&sail_config()).unwrap(),
            |table| filled(table, &routes),
            BatchSize::LargeInput,
        )
    });
    group.bench_function("poptrie", |b| {
        b.iter_batched(
            || Poptrie::with_config(&poptrie_config()).unwrap(),
            |table| filled(table, &routes),
            BatchSize::LargeInput,
        )
    });
    group.bench_function("cp-trie", |b| {
        b.iter_batched(
            || CpTrie::with_config(&cptrie_config()).unwrap(),
            |table| filled(table, &routes),
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let routes = synth_routes();
    let sail_u = filled(SailU::with_config(&sail_config()).unwrap(), &routes);
    let sail_l = filled(SailL::with_config(&sail_config()).unwrap(), &routes);
    let poptrie = filled(Poptrie::with_config(&poptrie_config()).unwrap(), &routes);
    let cptrie = filled(CpTrie::with_config(&cptrie_config()).unwrap(), &routes);
    let tables: [(&str, &dyn Lpm); 4] = [
        ("sail-u", &sail_u),
        ("sail-l", &sail_l),
        ("poptrie", &poptrie),
        ("cp-trie", &cptrie),
    ];
    for (name, table) in tables {
        println!("{name}: {} bytes in use", table.mem_size());
    }

    for (traffic, keys) in [
        ("random", random_traffic()),
        ("sequential", sequential_traffic(&routes)),
        ("repeated", repeated_traffic(&routes)),
    ] {
        let mut group = c.benchmark_group(format!("lookup/{traffic}"));
        for (name, table) in tables {
            group.bench_function(name, |b| {
                b.iter(|| {
                    let mut sum = 0u64;
                    for &key in &keys {
                        sum += table.lookup(black_box(key)) as u64;
                    }
                    sum
                })
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_insert, bench_lookup);
criterion_main!(benches);
