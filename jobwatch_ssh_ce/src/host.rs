//! Host descriptor parsing and capacity ranking.
//!
//! A configured host is a plain `HOSTNAME` or `HOSTNAME/MAXSLOTS` token;
//! the ranking algorithm groups eligible hosts by their currently free
//! slot count and visits them from the fullest rank down to one slot,
//! preserving declaration order within a rank.

use std::collections::BTreeMap;

use jobwatch_common::consts::DEFAULT_HOST_MAX_SLOTS;

/// A single `ssh_hosts` entry, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDescriptor {
    pub name: String,
    pub max_slots: u32,
}

impl HostDescriptor {
    /// Parse a `HOSTNAME[/MAXSLOTS]` token. A missing or unparseable
    /// slot suffix falls back to [`DEFAULT_HOST_MAX_SLOTS`].
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token.split_once('/') {
            Some((name, slots)) => Self {
                name: name.to_string(),
                max_slots: slots.parse().unwrap_or(DEFAULT_HOST_MAX_SLOTS),
            },
            None => Self {
                name: token.to_string(),
                max_slots: DEFAULT_HOST_MAX_SLOTS,
            },
        }
    }

    /// Parse the full comma-separated `ssh_hosts` config value.
    pub fn parse_all(hosts: &str) -> Vec<Self> {
        hosts
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Rank eligible hosts by free slot count, descending, preserving
/// declaration order within a rank. Hosts with zero or negative free
/// slots are excluded. Returns `(rank_map, max_slots)`; `rank_map` is
/// keyed by free-slot count with hosts listed in the order they first
/// appeared in `descriptors`.
pub fn rank_by_free_slots(
    descriptors: &[HostDescriptor],
    running: impl Fn(&str) -> Option<u32>,
) -> (BTreeMap<u32, Vec<String>>, u32) {
    let mut rank_map: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    let mut max_slots = 0u32;

    for host in descriptors {
        let Some(running_count) = running(&host.name) else {
            continue;
        };
        if running_count >= host.max_slots {
            continue;
        }
        let free = host.max_slots - running_count;
        if free > max_slots {
            max_slots = free;
        }
        rank_map.entry(free).or_default().push(host.name.clone());
    }

    (rank_map, max_slots)
}
