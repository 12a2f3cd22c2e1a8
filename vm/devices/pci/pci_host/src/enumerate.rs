// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Enumeration of every bus reachable through the bound strategy.

use crate::BusProbeFailed;
use crate::PciAddress;
use crate::hierarchy::HostBridgeSource;
use crate::strategy::BoundStrategy;
use crate::strategy::StrategyKind;
use std::sync::OnceLock;

/// The set of buses already visited in one domain.
#[derive(Debug, Clone)]
pub struct BusMap {
    visited: [bool; 256],
}

impl BusMap {
    /// Returns an empty map.
    pub fn new() -> Self {
        Self {
            visited: [false; 256],
        }
    }

    /// Marks `bus` as visited. Returns `false` if it already was.
    pub fn mark(&mut self, bus: u8) -> bool {
        !std::mem::replace(&mut self.visited[usize::from(bus)], true)
    }

    /// Whether `bus` has been visited.
    pub fn is_marked(&self, bus: u8) -> bool {
        self.visited[usize::from(bus)]
    }
}

/// Discovers the functions on one bus.
///
/// Implementations mark `bus` in `map`, along with any secondary bus they
/// descend into, so the enumerator does not probe those again.
pub trait BusProbe {
    /// Returns the functions found on `bus` and below it.
    ///
    /// A bus whose walk fails is pushed to `failures`, naming that bus and
    /// not the one the walk started from. Functions found before the
    /// failure are still returned.
    fn probe_bus(
        &mut self,
        strategy: &BoundStrategy,
        domain: u16,
        bus: u8,
        map: &mut BusMap,
        failures: &mut Vec<BusProbeFailed>,
    ) -> Vec<PciAddress>;
}

/// The outcome of [`BusEnumerator::scan`].
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Discovered functions, ordered by domain and then by discovery.
    pub addresses: Vec<PciAddress>,
    /// Buses whose probe failed. The scan continued past each of them.
    pub failures: Vec<BusProbeFailed>,
}

/// Walks every domain and bus reachable through a strategy.
pub struct BusEnumerator {
    host_bridges: Option<Box<dyn HostBridgeSource>>,
    host_bridge_count: OnceLock<u32>,
}

impl BusEnumerator {
    /// Returns an enumerator that scans domain 0 only.
    pub fn new() -> Self {
        Self {
            host_bridges: None,
            host_bridge_count: OnceLock::new(),
        }
    }

    /// Returns an enumerator that scans one domain per host bridge in
    /// `source` when the bound strategy can reach other domains.
    ///
    /// The bridges are counted on first use and the count is kept for the
    /// enumerator's lifetime, so bridges added later are not seen.
    pub fn with_host_bridges(source: Box<dyn HostBridgeSource>) -> Self {
        Self {
            host_bridges: Some(source),
            host_bridge_count: OnceLock::new(),
        }
    }

    /// The number of domains to scan with a strategy of kind `kind`.
    pub fn domain_count(&self, kind: StrategyKind) -> u32 {
        if !kind.is_multi_domain() {
            return 1;
        }
        match &self.host_bridges {
            Some(source) => *self
                .host_bridge_count
                .get_or_init(|| source.count_host_bridges()),
            None => 1,
        }
    }

    /// Scans every domain, probing each bus not already reached through a
    /// bridge.
    pub fn scan(&self, strategy: &BoundStrategy, probe: &mut dyn BusProbe) -> ScanResult {
        let domains = self.domain_count(strategy.kind());
        tracing::debug!(method = %strategy.kind(), domains, "scanning PCI domains");

        let mut result = ScanResult::default();
        for domain in 0..domains {
            let Ok(domain) = u16::try_from(domain) else {
                tracing::warn!(domains, "more host bridges than PCI domains");
                break;
            };
            let mut map = BusMap::new();
            for bus in 0..=u8::MAX {
                if map.is_marked(bus) {
                    continue;
                }
                let first_new = result.failures.len();
                let found = probe.probe_bus(strategy, domain, bus, &mut map, &mut result.failures);
                result.addresses.extend(found);
                for failure in &result.failures[first_new..] {
                    tracing::warn!(
                        domain = failure.domain,
                        bus = failure.bus,
                        error = &failure.source as &dyn std::error::Error,
                        "bus probe failed"
                    );
                }
            }
        }
        result
    }
}
