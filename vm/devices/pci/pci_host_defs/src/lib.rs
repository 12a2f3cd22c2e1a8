// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire definitions for host PCI configuration space access.
//!
//! Each privileged host service accepts a fixed-size parameter block carrying
//! a packed PCI address, a bit width and a value. The layouts in this crate
//! are dictated by those services and must match them bit for bit.

#![forbid(unsafe_code)]

pub mod cfg_space;
pub mod status;

use bitfield_struct::bitfield;
use core::fmt;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// The value placed in a read request before it is sent. Services overwrite
/// it on success.
const READ_SENTINEL: u64 = !0;

/// Error returned when constructing a [`PciAddress`] with out-of-range
/// components.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum InvalidAddress {
    /// The device number is not in `0..32`.
    #[error("device number {0} is out of range")]
    Device(u8),
    /// The function number is not in `0..8`.
    #[error("function number {0} is out of range")]
    Function(u8),
}

/// A location in PCI configuration space.
///
/// Ordering follows domain, bus, device, function, then register, which is
/// also the order enumeration reports addresses in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
    register: u16,
}

impl PciAddress {
    /// The highest valid device number.
    pub const MAX_DEVICE: u8 = 31;
    /// The highest valid function number.
    pub const MAX_FUNCTION: u8 = 7;
    /// Register 0 of function 0000:00:00.0, which every host bridge decodes.
    pub const ORIGIN: Self = Self {
        domain: 0,
        bus: 0,
        device: 0,
        function: 0,
        register: 0,
    };

    /// Returns a new address, validating the device and function numbers.
    pub fn new(
        domain: u16,
        bus: u8,
        device: u8,
        function: u8,
        register: u16,
    ) -> Result<Self, InvalidAddress> {
        if device > Self::MAX_DEVICE {
            return Err(InvalidAddress::Device(device));
        }
        if function > Self::MAX_FUNCTION {
            return Err(InvalidAddress::Function(function));
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
            register,
        })
    }

    /// Returns the address of register 0 of the given function.
    pub fn function(
        domain: u16,
        bus: u8,
        device: u8,
        function: u8,
    ) -> Result<Self, InvalidAddress> {
        Self::new(domain, bus, device, function, 0)
    }

    /// The segment (domain) number.
    pub fn domain(&self) -> u16 {
        self.domain
    }

    /// The bus number.
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// The device number.
    pub fn device(&self) -> u8 {
        self.device
    }

    /// The function number.
    pub fn function_number(&self) -> u8 {
        self.function
    }

    /// The register offset within the function's configuration space.
    pub fn register(&self) -> u16 {
        self.register
    }

    /// Returns the same function with a different register offset.
    pub fn with_register(self, register: u16) -> Self {
        Self { register, ..self }
    }

    /// Returns the address `delta` bytes further into the function's
    /// configuration space, or `None` if the offset overflows.
    pub fn checked_add(self, delta: u16) -> Option<Self> {
        Some(self.with_register(self.register.checked_add(delta)?))
    }

    /// Packs the address into the 64-bit form understood by the host
    /// services.
    pub fn config_address(&self) -> PciConfigAddress {
        PciConfigAddress::new()
            .with_offset(self.register)
            .with_function(self.function)
            .with_device(self.device)
            .with_bus(self.bus)
            .with_segment(self.domain)
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}@{:#05x}",
            self.domain, self.bus, self.device, self.function, self.register
        )
    }
}

/// Error returned for a transfer length that cannot be issued as a single
/// transaction.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
#[error("invalid transfer width of {0} bytes")]
pub struct InvalidWidth(pub usize);

/// The width of a single configuration space transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransferWidth {
    /// 1 byte.
    Byte = 1,
    /// 2 bytes.
    Word = 2,
    /// 4 bytes.
    DWord = 4,
}

impl TransferWidth {
    /// Converts a byte count into a transfer width.
    pub const fn from_len(len: usize) -> Result<Self, InvalidWidth> {
        match len {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Word),
            4 => Ok(Self::DWord),
            _ => Err(InvalidWidth(len)),
        }
    }

    /// Returns the widest transfer that fits in `remaining` bytes.
    pub const fn largest_within(remaining: usize) -> Option<Self> {
        match remaining {
            0 => None,
            1 => Some(Self::Byte),
            2 | 3 => Some(Self::Word),
            _ => Some(Self::DWord),
        }
    }

    /// The width in bytes.
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// The width in bits, as carried in request blocks.
    pub const fn bits(self) -> u32 {
        self as u32 * 8
    }

    /// A mask covering the bytes of one transfer.
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xff,
            Self::Word => 0xffff,
            Self::DWord => 0xffff_ffff,
        }
    }

    /// Truncates a response value to this width, zero-extending the result.
    pub const fn truncate(self, value: u64) -> u32 {
        (value as u32) & self.mask()
    }

    /// Decodes a little-endian value of this width from the front of `bytes`.
    ///
    /// Panics if `bytes` is shorter than the width.
    pub fn decode_le(self, bytes: &[u8]) -> u32 {
        let mut buf = [0; 4];
        buf[..self.bytes()].copy_from_slice(&bytes[..self.bytes()]);
        u32::from_le_bytes(buf)
    }

    /// Encodes the low bytes of `value` in little-endian order into the front
    /// of `bytes`.
    ///
    /// Panics if `bytes` is shorter than the width.
    pub fn encode_le(self, value: u32, bytes: &mut [u8]) {
        bytes[..self.bytes()].copy_from_slice(&value.to_le_bytes()[..self.bytes()]);
    }
}

/// The 64-bit PCI address union shared by every host service.
#[bitfield(u64)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct PciConfigAddress {
    /// Register offset within the function.
    pub offset: u16,
    /// Function number.
    #[bits(3)]
    pub function: u8,
    /// Device number.
    #[bits(5)]
    pub device: u8,
    /// Bus number.
    pub bus: u8,
    /// Segment (domain) number.
    pub segment: u16,
    #[bits(16)]
    _reserved: u16,
}

/// Definitions for the ACPI platform expert's address space methods.
pub mod acpi {
    use super::PciAddress;
    use super::PciConfigAddress;
    use super::READ_SENTINEL;
    use super::TransferWidth;
    use static_assertions::const_assert_eq;
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    /// The registry class matched to find the service.
    pub const SERVICE_NAME: &str = "AppleACPIPlatformExpert";
    /// The client type passed when opening a connection.
    pub const CLIENT_TYPE: u32 = 0;

    /// Method selectors.
    pub mod method {
        /// Read from an ACPI address space.
        pub const ADDRESS_SPACE_READ: u32 = 0;
        /// Write to an ACPI address space.
        pub const ADDRESS_SPACE_WRITE: u32 = 1;
        /// Debugger command, unused here.
        pub const DEBUGGER_COMMAND: u32 = 2;
    }

    /// ACPI address space identifiers.
    #[expect(missing_docs)] // self explanatory
    pub mod space_id {
        pub const SYSTEM_MEMORY: u32 = 0;
        pub const SYSTEM_IO: u32 = 1;
        pub const PCI_CONFIGURATION: u32 = 2;
        pub const EMBEDDED_CONTROLLER: u32 = 3;
        pub const SMBUS: u32 = 4;
    }

    /// Parameter block for address space reads and writes.
    ///
    /// The address union is byte packed in the service's definition, so it
    /// sits at offset 12 rather than 16.
    ///
    /// | Offset | Field      |
    /// |--------|------------|
    /// | 0x00   | value      |
    /// | 0x08   | space id   |
    /// | 0x0C   | address    |
    /// | 0x14   | bit width  |
    /// | 0x18   | bit offset |
    /// | 0x1C   | options    |
    #[repr(C, packed)]
    #[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct AddressSpaceRequest {
        /// In: the value to write. Out: the value read.
        pub value: u64,
        /// Always [`space_id::PCI_CONFIGURATION`] here.
        pub space_id: u32,
        /// The target location.
        pub address: PciConfigAddress,
        /// Transfer width in bits.
        pub bit_width: u32,
        /// Bit offset within the register, always 0.
        pub bit_offset: u32,
        /// Reserved options, always 0.
        pub options: u32,
    }

    const_assert_eq!(size_of::<AddressSpaceRequest>(), 32);

    impl AddressSpaceRequest {
        /// Builds a read request.
        pub fn read(address: &PciAddress, width: TransferWidth) -> Self {
            Self::new(address, width, READ_SENTINEL)
        }

        /// Builds a write request for the low `width` bytes of `value`.
        pub fn write(address: &PciAddress, width: TransferWidth, value: u32) -> Self {
            Self::new(address, width, (value & width.mask()).into())
        }

        fn new(address: &PciAddress, width: TransferWidth, value: u64) -> Self {
            Self {
                value,
                space_id: space_id::PCI_CONFIGURATION,
                address: address.config_address(),
                bit_width: width.bits(),
                bit_offset: 0,
                options: 0,
            }
        }
    }
}

/// Definitions for the PCI bridge diagnostics user client.
pub mod diagnostics {
    use super::PciAddress;
    use super::PciConfigAddress;
    use super::READ_SENTINEL;
    use super::TransferWidth;
    use static_assertions::const_assert_eq;
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    /// The registry class matched to find the service.
    pub const SERVICE_NAME: &str = "IOPCIBridge";
    /// The diagnostics client type passed when opening a connection.
    pub const CLIENT_TYPE: u32 = 0x9900_0001;

    /// Method selectors.
    pub mod method {
        /// Read from a PCI space.
        pub const READ: u32 = 0;
        /// Write to a PCI space.
        pub const WRITE: u32 = 1;
    }

    /// PCI space types.
    #[expect(missing_docs)] // self explanatory
    pub mod space_type {
        pub const CONFIG: u32 = 0;
        pub const IO: u32 = 1;
        pub const MEMORY_32: u32 = 2;
        pub const MEMORY_64: u32 = 3;
    }

    /// Parameter block for diagnostics reads and writes. Also used by the
    /// DirectHW driver for its PCI methods.
    ///
    /// | Offset | Field      |
    /// |--------|------------|
    /// | 0x00   | options    |
    /// | 0x04   | space type |
    /// | 0x08   | bit width  |
    /// | 0x0C   | reserved   |
    /// | 0x10   | value      |
    /// | 0x18   | address    |
    #[repr(C)]
    #[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct DiagnosticsRequest {
        /// Reserved options, always 0.
        pub options: u32,
        /// Always [`space_type::CONFIG`] here.
        pub space_type: u32,
        /// Transfer width in bits.
        pub bit_width: u32,
        /// Reserved, always 0.
        pub reserved: u32,
        /// In: the value to write. Out: the value read.
        pub value: u64,
        /// The target location.
        pub address: PciConfigAddress,
    }

    const_assert_eq!(size_of::<DiagnosticsRequest>(), 32);

    impl DiagnosticsRequest {
        /// Builds a read request.
        pub fn read(address: &PciAddress, width: TransferWidth) -> Self {
            Self::new(address, width, READ_SENTINEL)
        }

        /// Builds a write request for the low `width` bytes of `value`.
        pub fn write(address: &PciAddress, width: TransferWidth, value: u32) -> Self {
            Self::new(address, width, (value & width.mask()).into())
        }

        fn new(address: &PciAddress, width: TransferWidth, value: u64) -> Self {
            Self {
                options: 0,
                space_type: space_type::CONFIG,
                bit_width: width.bits(),
                reserved: 0,
                value,
                address: address.config_address(),
            }
        }
    }
}

/// Definitions for the DirectHW driver.
pub mod direct_hw {
    pub use super::diagnostics::DiagnosticsRequest as PciRequest;

    /// The registry class matched to find the service.
    pub const SERVICE_NAME: &str = "DirectHWService";
    /// The client type passed when opening a connection.
    pub const CLIENT_TYPE: u32 = 0;

    /// Method selectors, in the driver's dispatch table order.
    #[expect(missing_docs)] // self explanatory
    pub mod method {
        pub const READ_IO: u32 = 0;
        pub const WRITE_IO: u32 = 1;
        pub const PREPARE_MAP: u32 = 2;
        pub const READ_MSR: u32 = 3;
        pub const WRITE_MSR: u32 = 4;
        pub const READ_CPUID: u32 = 5;
        pub const READ_MEM: u32 = 6;
        pub const READ: u32 = 7;
        pub const WRITE: u32 = 8;
    }
}
