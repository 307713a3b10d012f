//! Reading forwarding tables from disk and summarizing their shape.
//!
//! A FIB file is a text file with one route per line:
//!
//! ```text
//! <ipv6-prefix>/<prefix-len>\t<nexthop>
//! ```
//!
//! e.g. `2001:db8::/32\t5`. Blank lines are skipped; anything else that
//! does not parse is an error.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use ipnet::Ipv6Net;

use crate::{InsertError, Lpm};

/// One parsed route of a FIB file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// The masked 128-bit prefix value.
    pub prefix: u128,
    /// Prefix length in bits (0..=128).
    pub prefix_len: u8,
    /// Next-hop identifier (1..=255).
    pub nexthop: u8,
}

impl Route {
    /// Build a route from a parsed network and a next-hop.
    pub fn new(net: Ipv6Net, nexthop: u8) -> Self {
        Self {
            prefix: net.network().into(),
            prefix_len: net.prefix_len(),
            nexthop,
        }
    }
}

fn parse_line(line: &str) -> Result<Route, String> {
    let (net, nexthop) = line
        .split_once('\t')
        .ok_or_else(|| format!("missing next-hop field in {line:?}"))?;
    let net: Ipv6Net = net
        .trim()
        .parse()
        .map_err(|e| format!("invalid IPv6 prefix in {line:?}: {e}"))?;
    let nexthop: u8 = nexthop
        .trim()
        .parse()
        .map_err(|e| format!("invalid next-hop in {line:?}: {e}"))?;
    Ok(Route::new(net, nexthop))
}

/// Read every route of a FIB file.
pub fn read_fib(path: impl AsRef<Path>) -> io::Result<Vec<Route>> {
    let path = path.as_ref();
    log::info!("reading FIB from {}", path.display());
    let reader = BufReader::new(File::open(path)?);
    let mut routes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let route =
            parse_line(&line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        routes.push(route);
    }
    log::info!("read {} routes", routes.len());
    Ok(routes)
}

/// Insert every route of a slice into a table.
pub fn load<L: Lpm>(table: &mut L, routes: &[Route]) -> Result<(), InsertError> {
    for route in routes {
        table.insert(route.prefix, route.prefix_len, route.nexthop)?;
    }
    Ok(())
}

/// Prefix-length histogram over a set of routes.
///
/// Displays as the per-length percentage table followed by the aggregated
/// groups a routing-table summary usually reports.
#[derive(Debug, Clone)]
pub struct PrefixLengthDistribution {
    counts: [u64; 129],
    total: u64,
}

impl Default for PrefixLengthDistribution {
    fn default() -> Self {
        Self {
            counts: [0; 129],
            total: 0,
        }
    }
}

impl PrefixLengthDistribution {
    /// An empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one route of the given prefix length.
    pub fn record(&mut self, prefix_len: u8) {
        self.counts[prefix_len as usize] += 1;
        self.total += 1;
    }

    /// Record every route of a slice.
    pub fn record_all(&mut self, routes: &[Route]) {
        for route in routes {
            self.record(route.prefix_len);
        }
    }

    /// Number of routes recorded.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of routes with the given prefix length.
    pub fn count(&self, prefix_len: u8) -> u64 {
        self.counts[prefix_len as usize]
    }

    /// Share of routes with the given prefix length, in percent.
    pub fn percentage(&self, prefix_len: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.counts[prefix_len as usize] as f64 * 100.0 / self.total as f64
    }

    fn group(&self, lens: std::ops::RangeInclusive<u8>) -> f64 {
        lens.map(|l| self.percentage(l)).sum()
    }
}

impl fmt::Display for PrefixLengthDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PrefixLength\tPercentage")?;
        for len in 0..=128u8 {
            if self.counts[len as usize] > 0 {
                writeln!(f, "{len}\t{:.3}", self.percentage(len))?;
            }
        }
        writeln!(f)?;
        writeln!(f, "PrefixLength\tPercentage (Aggregated)")?;
        writeln!(f, "0-31\t{:.3}", self.group(0..=31))?;
        writeln!(f, "32\t{:.3}", self.percentage(32))?;
        writeln!(f, "33-39\t{:.3}", self.group(33..=39))?;
        writeln!(f, "40\t{:.3}", self.percentage(40))?;
        writeln!(f, "41-47\t{:.3}", self.group(41..=47))?;
        writeln!(f, "48\t{:.3}", self.percentage(48))?;
        writeln!(f, "49-64\t{:.3}", self.group(49..=64))?;
        writeln!(f, "65-128\t{:.3}", self.group(65..=128))
    }
}
