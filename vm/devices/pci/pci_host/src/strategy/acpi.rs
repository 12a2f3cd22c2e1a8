// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::transact;
use crate::AccessError;
use crate::PciAddress;
use crate::TransferWidth;
use crate::channel::TransactionChannel;
use pci_host_defs::acpi::AddressSpaceRequest;
use pci_host_defs::acpi::method;
use zerocopy::IntoBytes;

/// Configuration space access through the ACPI platform expert's PCI
/// configuration address space. Reaches segment 0 only.
pub struct AcpiPlatform {
    channel: Box<dyn TransactionChannel>,
}

impl AcpiPlatform {
    pub(super) fn new(channel: Box<dyn TransactionChannel>) -> Self {
        Self { channel }
    }

    pub(super) fn read(
        &self,
        address: &PciAddress,
        width: TransferWidth,
    ) -> Result<u32, AccessError> {
        let request = AddressSpaceRequest::read(address, width);
        let mut response = request;
        transact(
            self.channel.as_ref(),
            method::ADDRESS_SPACE_READ,
            request.as_bytes(),
            response.as_mut_bytes(),
        )?;
        Ok(width.truncate(response.value))
    }

    pub(super) fn write(
        &self,
        address: &PciAddress,
        width: TransferWidth,
        value: u32,
    ) -> Result<(), AccessError> {
        let request = AddressSpaceRequest::write(address, width, value);
        transact(
            self.channel.as_ref(),
            method::ADDRESS_SPACE_WRITE,
            request.as_bytes(),
            &mut [],
        )
    }
}
