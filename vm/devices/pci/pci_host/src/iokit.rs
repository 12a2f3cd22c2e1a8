// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! IOKit-backed service channels and registry walking.

use crate::IoReturn;
use crate::OpenError;
use crate::channel::ServiceProvider;
use crate::channel::TransactionChannel;
use crate::hierarchy::DeviceHierarchy;
use anyhow::Context;
use iokit_sys::Connection;
use iokit_sys::RegistryEntry;
use iokit_sys::Service;
use std::ffi::CStr;
use std::ffi::CString;

const PCI_BRIDGE_CLASS: &CStr = c"IOPCIBridge";

/// Opens host services and walks the I/O registry through IOKit.
#[derive(Debug, Default)]
pub struct IoKitServices;

impl IoKitServices {
    /// Returns a new provider.
    pub fn new() -> Self {
        Self
    }
}

impl ServiceProvider for IoKitServices {
    fn open(
        &self,
        service: &str,
        client_type: u32,
    ) -> Result<Box<dyn TransactionChannel>, OpenError> {
        let class_name = CString::new(service).map_err(|_| OpenError::NotFound)?;
        let service = Service::matching(&class_name).ok_or(OpenError::NotFound)?;
        let connection = service
            .open(client_type)
            .map_err(|kr| OpenError::OpenFailed(IoReturn(kr)))?;
        Ok(Box::new(IoKitChannel { connection }))
    }
}

struct IoKitChannel {
    connection: Connection,
}

impl TransactionChannel for IoKitChannel {
    fn call(&self, method: u32, input: &[u8], output: &mut [u8]) -> Result<(), IoReturn> {
        self.connection
            .call_struct_method(method, input, output)
            .map(drop)
            .map_err(IoReturn)
    }

    fn describe(&self, status: IoReturn) -> String {
        format!("{} ({:#010x})", iokit_sys::error_string(status.0), status.code())
    }
}

impl DeviceHierarchy for IoKitServices {
    type Node = RegistryEntry;

    fn root(&self) -> anyhow::Result<RegistryEntry> {
        RegistryEntry::root().context("no I/O registry root entry")
    }

    fn children(&self, node: &RegistryEntry) -> anyhow::Result<Vec<RegistryEntry>> {
        let children = node.children(iokit_sys::IO_SERVICE_PLANE).map_err(|kr| {
            anyhow::anyhow!(
                "failed to iterate registry children: {}",
                iokit_sys::error_string(kr)
            )
        })?;
        Ok(children.collect())
    }

    fn is_pci_bridge(&self, node: &RegistryEntry) -> bool {
        node.conforms_to(PCI_BRIDGE_CLASS)
    }
}
