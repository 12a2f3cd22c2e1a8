// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration space registers needed to walk a PCI topology.

/// Vendor and device ID dword returned for an absent function.
pub const ID_NONE: u32 = 0xffff_ffff;
/// Vendor and device ID dword some hosts return for an absent function.
pub const ID_INVALID: u32 = 0x0000_0000;

/// Byte offsets of registers read during enumeration.
///
/// Table pulled from <https://wiki.osdev.org/PCI>
///
/// | Offset | Bits 31-24              | Bits 23-16             | Bits 15-8            | Bits 7-0           |
/// |--------|-------------------------|------------------------|----------------------|--------------------|
/// | 0x0    | Device ID               |                        | Vendor ID            |                    |
/// | 0x8    | Class code              |                        |                      | Revision ID        |
/// | 0xC    | BIST                    | Header type            | Latency Timer        | Cache Line Size    |
/// | 0x18   | Secondary Latency Timer | Subordinate Bus Number | Secondary Bus Number | Primary Bus Number |
///
/// The bus number registers only exist in type 01h and 02h headers.
pub mod offset {
    #![expect(missing_docs)] // constants are self-explanatory

    pub const VENDOR_ID: u16 = 0x00;
    pub const DEVICE_ID: u16 = 0x02;
    pub const REVISION_ID: u16 = 0x08;
    pub const CLASS_CODE: u16 = 0x09;
    pub const HEADER_TYPE: u16 = 0x0E;
    pub const PRIMARY_BUS: u16 = 0x18;
    pub const SECONDARY_BUS: u16 = 0x19;
    pub const SUBORDINATE_BUS: u16 = 0x1A;
}

/// The header type register at [`offset::HEADER_TYPE`].
///
/// Bit 7 flags a multi-function device; the low bits select the layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HeaderType(pub u8);

impl HeaderType {
    /// Endpoint layout.
    pub const DEVICE: Self = Self(0x00);
    /// PCI-to-PCI bridge layout.
    pub const PCI_BRIDGE: Self = Self(0x01);
    /// CardBus bridge layout.
    pub const CARDBUS_BRIDGE: Self = Self(0x02);

    const MULTI_FUNCTION: u8 = 0x80;

    /// The header layout with the multi-function bit cleared.
    pub const fn layout(self) -> Self {
        Self(self.0 & !Self::MULTI_FUNCTION)
    }

    /// Whether functions 1 through 7 may be populated.
    pub const fn is_multi_function(self) -> bool {
        self.0 & Self::MULTI_FUNCTION != 0
    }

    /// Whether the function forwards to a secondary bus.
    pub fn is_bridge(self) -> bool {
        matches!(self.layout(), Self::PCI_BRIDGE | Self::CARDBUS_BRIDGE)
    }
}

/// Returns whether the dword at [`offset::VENDOR_ID`] denotes an absent
/// function.
///
/// Only an all-ones or all-zeros dword counts. A zero vendor ID with a
/// non-zero device ID is a present function.
pub const fn function_absent(id: u32) -> bool {
    id == ID_NONE || id == ID_INVALID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_type_bits() {
        let h = HeaderType(0x81);
        assert!(h.is_multi_function());
        assert_eq!(h.layout(), HeaderType::PCI_BRIDGE);
        assert!(h.is_bridge());
        assert!(HeaderType(0x02).is_bridge());
        assert!(!HeaderType(0x80).is_bridge());
        assert!(!HeaderType::DEVICE.is_multi_function());
    }

    #[test]
    fn absent_function() {
        assert!(function_absent(0xffff_ffff));
        assert!(function_absent(0));
        assert!(!function_absent(0x1234_8086));
        assert!(!function_absent(0x1234_0000));
        assert!(!function_absent(0x0000_ffff));
        assert!(!function_absent(0xffff_0000));
    }
}
