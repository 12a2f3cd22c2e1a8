// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Access strategies, one per privileged host service.
//!
//! Every strategy issues single-register transactions through its own wire
//! block. Block transfers are built on top of those in [`BoundStrategy`] and
//! behave identically for all of them.

mod acpi;
mod diagnostics;
mod direct_hw;

pub use acpi::AcpiPlatform;
pub use diagnostics::PciDiagnostics;
pub use direct_hw::DirectHw;

use crate::AccessError;
use crate::PciAddress;
use crate::TransferWidth;
use crate::channel::TransactionChannel;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies an access strategy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// The third-party DirectHW driver.
    DirectHw,
    /// The PCI bridge diagnostics user client.
    PciDiagnostics,
    /// The ACPI platform expert's address space methods.
    AcpiPlatform,
}

impl StrategyKind {
    /// All strategies, most specific first.
    pub const PRIORITY: [Self; 3] = [Self::DirectHw, Self::PciDiagnostics, Self::AcpiPlatform];

    /// The name used in configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Self::DirectHw => "directhw",
            Self::PciDiagnostics => "pci-diagnostics",
            Self::AcpiPlatform => "acpi",
        }
    }

    /// The registry class of the backing service.
    pub const fn service_name(self) -> &'static str {
        match self {
            Self::DirectHw => pci_host_defs::direct_hw::SERVICE_NAME,
            Self::PciDiagnostics => pci_host_defs::diagnostics::SERVICE_NAME,
            Self::AcpiPlatform => pci_host_defs::acpi::SERVICE_NAME,
        }
    }

    /// The client type used to open the backing service.
    pub const fn client_type(self) -> u32 {
        match self {
            Self::DirectHw => pci_host_defs::direct_hw::CLIENT_TYPE,
            Self::PciDiagnostics => pci_host_defs::diagnostics::CLIENT_TYPE,
            Self::AcpiPlatform => pci_host_defs::acpi::CLIENT_TYPE,
        }
    }

    /// Whether the strategy can reach segments other than 0.
    pub const fn is_multi_domain(self) -> bool {
        matches!(self, Self::DirectHw)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Error returned when parsing an unknown strategy name.
#[derive(Debug, Error)]
#[error("unknown PCI access method '{0}', expected one of: directhw, pci-diagnostics, acpi")]
pub struct UnknownStrategy(String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PRIORITY
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownStrategy(s.to_owned()))
    }
}

/// A strategy bound to an open service channel.
pub enum AccessStrategy {
    /// See [`AcpiPlatform`].
    AcpiPlatform(AcpiPlatform),
    /// See [`PciDiagnostics`].
    PciDiagnostics(PciDiagnostics),
    /// See [`DirectHw`].
    DirectHw(DirectHw),
}

impl AccessStrategy {
    /// Wraps an open channel to the service for `kind`.
    pub fn new(kind: StrategyKind, channel: Box<dyn TransactionChannel>) -> Self {
        match kind {
            StrategyKind::AcpiPlatform => Self::AcpiPlatform(AcpiPlatform::new(channel)),
            StrategyKind::PciDiagnostics => Self::PciDiagnostics(PciDiagnostics::new(channel)),
            StrategyKind::DirectHw => Self::DirectHw(DirectHw::new(channel)),
        }
    }

    /// The strategy's kind.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::AcpiPlatform(_) => StrategyKind::AcpiPlatform,
            Self::PciDiagnostics(_) => StrategyKind::PciDiagnostics,
            Self::DirectHw(_) => StrategyKind::DirectHw,
        }
    }

    fn read(&self, address: &PciAddress, width: TransferWidth) -> Result<u32, AccessError> {
        match self {
            Self::AcpiPlatform(s) => s.read(address, width),
            Self::PciDiagnostics(s) => s.read(address, width),
            Self::DirectHw(s) => s.read(address, width),
        }
    }

    fn write(
        &self,
        address: &PciAddress,
        width: TransferWidth,
        value: u32,
    ) -> Result<(), AccessError> {
        match self {
            Self::AcpiPlatform(s) => s.write(address, width, value),
            Self::PciDiagnostics(s) => s.write(address, width, value),
            Self::DirectHw(s) => s.write(address, width, value),
        }
    }
}

impl fmt::Debug for AccessStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessStrategy").field(&self.kind()).finish()
    }
}

/// Issues one call and maps a failing status to [`AccessError`].
fn transact(
    channel: &dyn TransactionChannel,
    method: u32,
    input: &[u8],
    output: &mut [u8],
) -> Result<(), AccessError> {
    channel
        .call(method, input, output)
        .map_err(|status| AccessError::TransactionFailed {
            status,
            message: channel.describe(status),
        })
}

/// The access strategy chosen for this process.
///
/// Transactions are not serialized internally. Callers sharing a handle
/// across threads must order their own accesses.
pub struct BoundStrategy {
    strategy: AccessStrategy,
}

impl fmt::Debug for BoundStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundStrategy")
            .field("kind", &self.kind())
            .finish()
    }
}

impl BoundStrategy {
    /// Binds `strategy`.
    pub fn new(strategy: AccessStrategy) -> Self {
        Self { strategy }
    }

    /// The bound strategy's kind.
    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Reads one register. Narrow values are zero extended.
    pub fn read(&self, address: PciAddress, width: TransferWidth) -> Result<u32, AccessError> {
        let value = self.strategy.read(&address, width)?;
        tracing::trace!(%address, width = width.bytes(), value, "config read");
        Ok(value)
    }

    /// Writes the low `width` bytes of `value` to one register.
    pub fn write(
        &self,
        address: PciAddress,
        width: TransferWidth,
        value: u32,
    ) -> Result<(), AccessError> {
        let value = value & width.mask();
        tracing::trace!(%address, width = width.bytes(), value, "config write");
        self.strategy.write(&address, width, value)
    }

    /// Reads a register `len` bytes wide.
    pub fn read_sized(&self, address: PciAddress, len: usize) -> Result<u32, AccessError> {
        self.read(address, TransferWidth::from_len(len)?)
    }

    /// Writes a register `len` bytes wide.
    pub fn write_sized(
        &self,
        address: PciAddress,
        len: usize,
        value: u32,
    ) -> Result<(), AccessError> {
        self.write(address, TransferWidth::from_len(len)?, value)
    }

    /// Fills `buf` from consecutive registers starting at `address`.
    ///
    /// Bytes land in `buf` in little-endian register order. The transfer stops
    /// at the first failing transaction, leaving the rest of `buf` untouched.
    pub fn block_read(&self, address: PciAddress, buf: &mut [u8]) -> Result<(), AccessError> {
        for (offset, width) in Self::chunks(address, buf.len())? {
            let value = self.read(offset, width)?;
            let start = usize::from(offset.register() - address.register());
            width.encode_le(value, &mut buf[start..]);
        }
        Ok(())
    }

    /// Writes `buf` to consecutive registers starting at `address`.
    ///
    /// The transfer stops at the first failing transaction; earlier
    /// transactions are not undone.
    pub fn block_write(&self, address: PciAddress, buf: &[u8]) -> Result<(), AccessError> {
        for (offset, width) in Self::chunks(address, buf.len())? {
            let start = usize::from(offset.register() - address.register());
            self.write(offset, width, width.decode_le(&buf[start..]))?;
        }
        Ok(())
    }

    /// Splits a block into dword transactions, then at most one word and one
    /// byte for the remainder.
    fn chunks(
        address: PciAddress,
        len: usize,
    ) -> Result<Vec<(PciAddress, TransferWidth)>, AccessError> {
        let overflow = || AccessError::OffsetOverflow {
            register: address.register(),
            len,
        };
        if usize::from(address.register()) + len > 1 << 16 {
            return Err(overflow());
        }

        let mut chunks = Vec::new();
        let mut done = 0;
        while let Some(width) = TransferWidth::largest_within(len - done) {
            let delta = u16::try_from(done).map_err(|_| overflow())?;
            let offset = address.checked_add(delta).ok_or_else(overflow)?;
            chunks.push((offset, width));
            done += width.bytes();
        }
        Ok(chunks)
    }
}
