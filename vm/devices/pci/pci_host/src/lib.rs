// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Host PCI configuration space access through privileged host services.
//!
//! No single access mechanism is guaranteed to exist on a host, so this crate
//! offers several interchangeable [`strategy`] implementations, each talking to
//! a different service over a [`channel::TransactionChannel`]. A
//! [`selector::StrategySelector`] probes them in priority order and binds the
//! first usable one, and an [`enumerate::BusEnumerator`] walks the buses
//! behind it to report every populated function.

#![forbid(unsafe_code)]

pub mod bus_probe;
pub mod channel;
pub mod enumerate;
pub mod hierarchy;
#[cfg(target_os = "macos")]
pub mod iokit;
pub mod selector;
pub mod strategy;

#[cfg(test)]
mod test_helpers;

pub use pci_host_defs::InvalidAddress;
pub use pci_host_defs::InvalidWidth;
pub use pci_host_defs::PciAddress;
pub use pci_host_defs::TransferWidth;
pub use pci_host_defs::status::IoReturn;

use strategy::StrategyKind;
use thiserror::Error;

/// An error from a configuration space transaction.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The service rejected the transaction.
    #[error("transaction failed: {message}")]
    TransactionFailed {
        /// The status returned by the service.
        status: IoReturn,
        /// The host's description of `status`.
        message: String,
    },
    /// The requested length is not a valid single transaction width.
    #[error(transparent)]
    InvalidWidth(#[from] InvalidWidth),
    /// A block transfer runs past the end of the register space.
    #[error("block of {len} bytes at register {register:#x} overflows the register space")]
    OffsetOverflow {
        /// The starting register.
        register: u16,
        /// The block length in bytes.
        len: usize,
    },
}

/// An error opening a service channel.
#[derive(Debug, Error)]
pub enum OpenError {
    /// No service with the requested name is registered.
    #[error("service not found")]
    NotFound,
    /// The service exists but refused the connection.
    #[error("failed to open service: {0}")]
    OpenFailed(IoReturn),
}

/// No access strategy could be bound.
#[derive(Debug, Error)]
#[error("no PCI configuration access method is available (tried {attempted:?})")]
pub struct NoStrategyAvailable {
    /// The strategies that were attempted, in order.
    pub attempted: Vec<StrategyKind>,
}

/// Probing one bus during a scan failed.
#[derive(Debug, Error)]
#[error("failed to probe bus {domain:04x}:{bus:02x}")]
pub struct BusProbeFailed {
    /// The domain containing the bus.
    pub domain: u16,
    /// The bus number.
    pub bus: u8,
    /// The failing transaction.
    #[source]
    pub source: AccessError,
}
