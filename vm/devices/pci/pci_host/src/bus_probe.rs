// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A bus probe that reads configuration space headers directly.

use crate::AccessError;
use crate::BusProbeFailed;
use crate::PciAddress;
use crate::TransferWidth;
use crate::enumerate::BusMap;
use crate::enumerate::BusProbe;
use crate::strategy::BoundStrategy;
use pci_host_defs::cfg_space::HeaderType;
use pci_host_defs::cfg_space::function_absent;
use pci_host_defs::cfg_space::offset;

/// Finds functions by reading vendor IDs, following bridges depth first so
/// downstream functions are reported right after their bridge.
#[derive(Debug, Default)]
pub struct ConfigSpaceBusProbe;

/// Where one bus walk records its results.
struct Walk<'a> {
    domain: u16,
    map: &'a mut BusMap,
    found: &'a mut Vec<PciAddress>,
    failures: &'a mut Vec<BusProbeFailed>,
}

impl ConfigSpaceBusProbe {
    /// Returns a new probe.
    pub fn new() -> Self {
        Self
    }

    /// Scans `bus`, recording a failure against it if any read fails.
    /// Functions found before the failure are kept.
    fn scan_bus(&self, strategy: &BoundStrategy, bus: u8, walk: &mut Walk<'_>) {
        if let Err(source) = self.scan_devices(strategy, bus, walk) {
            walk.failures.push(BusProbeFailed {
                domain: walk.domain,
                bus,
                source,
            });
        }
    }

    fn scan_devices(
        &self,
        strategy: &BoundStrategy,
        bus: u8,
        walk: &mut Walk<'_>,
    ) -> Result<(), AccessError> {
        walk.map.mark(bus);
        for device in 0..=PciAddress::MAX_DEVICE {
            let Some(header) = self.scan_function(strategy, bus, device, 0, walk)? else {
                continue;
            };
            if header.is_multi_function() {
                for function in 1..=PciAddress::MAX_FUNCTION {
                    self.scan_function(strategy, bus, device, function, walk)?;
                }
            }
        }
        Ok(())
    }

    /// Records one function if present and descends through it if it is a
    /// bridge. Returns its header type.
    ///
    /// A failure below the bridge is recorded against the secondary bus and
    /// does not fail `bus`.
    fn scan_function(
        &self,
        strategy: &BoundStrategy,
        bus: u8,
        device: u8,
        function: u8,
        walk: &mut Walk<'_>,
    ) -> Result<Option<HeaderType>, AccessError> {
        let Ok(address) = PciAddress::function(walk.domain, bus, device, function) else {
            return Ok(None);
        };
        let id = strategy.read(address.with_register(offset::VENDOR_ID), TransferWidth::DWord)?;
        if function_absent(id) {
            return Ok(None);
        }
        walk.found.push(address);

        let header = HeaderType(
            strategy.read(address.with_register(offset::HEADER_TYPE), TransferWidth::Byte)? as u8,
        );
        if header.is_bridge() {
            let secondary = strategy.read(
                address.with_register(offset::SECONDARY_BUS),
                TransferWidth::Byte,
            )? as u8;
            if secondary != 0 && !walk.map.is_marked(secondary) {
                tracing::trace!(%address, secondary, "descending through bridge");
                self.scan_bus(strategy, secondary, walk);
            }
        }
        Ok(Some(header))
    }
}

impl BusProbe for ConfigSpaceBusProbe {
    fn probe_bus(
        &mut self,
        strategy: &BoundStrategy,
        domain: u16,
        bus: u8,
        map: &mut BusMap,
        failures: &mut Vec<BusProbeFailed>,
    ) -> Vec<PciAddress> {
        let mut found = Vec::new();
        self.scan_bus(
            strategy,
            bus,
            &mut Walk {
                domain,
                map,
                found: &mut found,
                failures,
            },
        );
        found
    }
}
