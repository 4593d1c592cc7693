//! Addresses excluded from node address reporting
//!
//! Built once from `ignoredNodeIPs` when the manager is constructed. Entries
//! are collapsed into sorted, non-overlapping intervals per address family so
//! membership is a binary search.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use ntnx_common::{Error, Result};

/// Immutable set of IP addresses, prefixes and ranges
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IgnoredAddressSet {
    v4: Vec<(u128, u128)>,
    v6: Vec<(u128, u128)>,
}

impl IgnoredAddressSet {
    /// Build the set from configuration entries
    ///
    /// Each entry is a dash range (`10.0.0.1-10.0.0.9`), a prefix
    /// (`10.0.0.0/24`) or a single address. The first malformed entry fails
    /// the whole build.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();

        for entry in entries {
            let entry = entry.as_ref().trim();
            let (start, end) = parse_entry(entry)?;
            let interval = (to_u128(start), to_u128(end));
            if start.is_ipv4() {
                v4.push(interval);
            } else {
                v6.push(interval);
            }
        }

        Ok(Self {
            v4: merge(v4),
            v6: merge(v6),
        })
    }

    /// Whether the address is ignored
    pub fn contains(&self, ip: IpAddr) -> bool {
        let intervals = if ip.is_ipv4() { &self.v4 } else { &self.v6 };
        let value = to_u128(ip);
        let idx = intervals.partition_point(|&(start, _)| start <= value);
        idx > 0 && intervals[idx - 1].1 >= value
    }

    /// Whether no address is ignored
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

fn parse_entry(entry: &str) -> Result<(IpAddr, IpAddr)> {
    if let Some((from, to)) = entry.split_once('-') {
        let start = parse_addr(entry, from.trim(), "IP range")?;
        let end = parse_addr(entry, to.trim(), "IP range")?;
        if start.is_ipv4() != end.is_ipv4() {
            return Err(Error::config_for_field(
                "ignoredNodeIPs",
                format!("failed to parse ignoredNodeIPs IP range {:?}: mixed address families", entry),
            ));
        }
        if to_u128(start) > to_u128(end) {
            return Err(Error::config_for_field(
                "ignoredNodeIPs",
                format!("failed to parse ignoredNodeIPs IP range {:?}: start is after end", entry),
            ));
        }
        Ok((start, end))
    } else if entry.contains('/') {
        let net = IpNet::from_str(entry).map_err(|e| {
            Error::config_for_field(
                "ignoredNodeIPs",
                format!("failed to parse ignoredNodeIPs IP prefix {:?}: {}", entry, e),
            )
        })?;
        Ok((net.network(), net.broadcast()))
    } else {
        let ip = parse_addr(entry, entry, "IP")?;
        Ok((ip, ip))
    }
}

fn parse_addr(entry: &str, value: &str, what: &str) -> Result<IpAddr> {
    IpAddr::from_str(value).map_err(|e| {
        Error::config_for_field(
            "ignoredNodeIPs",
            format!("failed to parse ignoredNodeIPs {} {:?}: {}", what, entry, e),
        )
    })
}

fn to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn merge(mut intervals: Vec<(u128, u128)>) -> Vec<(u128, u128)> {
    intervals.sort_unstable();
    let mut merged: Vec<(u128, u128)> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}
