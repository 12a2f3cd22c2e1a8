// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::transact;
use crate::AccessError;
use crate::PciAddress;
use crate::TransferWidth;
use crate::channel::TransactionChannel;
use pci_host_defs::direct_hw::PciRequest;
use pci_host_defs::direct_hw::method;
use zerocopy::IntoBytes;

/// Configuration space access through the DirectHW driver.
///
/// Unlike the built-in services the driver honors the segment field, so it
/// can reach every host bridge.
pub struct DirectHw {
    channel: Box<dyn TransactionChannel>,
}

impl DirectHw {
    pub(super) fn new(channel: Box<dyn TransactionChannel>) -> Self {
        Self { channel }
    }

    pub(super) fn read(
        &self,
        address: &PciAddress,
        width: TransferWidth,
    ) -> Result<u32, AccessError> {
        let request = PciRequest::read(address, width);
        let mut response = request;
        transact(
            self.channel.as_ref(),
            method::READ,
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
        let request = PciRequest::write(address, width, value);
        // The driver echoes the request block back on writes.
        let mut response = request;
        transact(
            self.channel.as_ref(),
            method::WRITE,
            request.as_bytes(),
            response.as_mut_bytes(),
        )
    }
}
