// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The transport boundary between access strategies and host services.

use crate::IoReturn;
use crate::OpenError;

/// An open connection to a privileged host service.
///
/// Each call exchanges one fixed-size request block for at most one response
/// block. Calls block until the service answers.
pub trait TransactionChannel: Send + Sync {
    /// Invokes `method` with `input`. The service writes its response into
    /// `output`, which is empty for methods that return nothing.
    fn call(&self, method: u32, input: &[u8], output: &mut [u8]) -> Result<(), IoReturn>;

    /// Describes a status returned by [`Self::call`].
    fn describe(&self, status: IoReturn) -> String {
        status.to_string()
    }
}

/// Locates and opens host services by name.
pub trait ServiceProvider: Send + Sync {
    /// Opens a connection to the first service matching `service`, using
    /// `client_type` to select the user client.
    fn open(
        &self,
        service: &str,
        client_type: u32,
    ) -> Result<Box<dyn TransactionChannel>, OpenError>;
}
