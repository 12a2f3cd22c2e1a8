// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Minimal IOKit bindings for opening user clients and walking the I/O
//! registry, with owning wrappers that release their Mach objects on drop.

#![cfg(target_os = "macos")]
// UNSAFETY: Calls into IOKit and libSystem.
#![expect(unsafe_code)]
#![expect(missing_docs)]

use std::ffi::CStr;
use std::ffi::c_char;
use std::ffi::c_void;

#[expect(non_camel_case_types)]
pub mod types {
    pub type kern_return_t = i32;
    pub type mach_port_t = u32;
    pub type io_object_t = mach_port_t;
    pub type io_service_t = io_object_t;
    pub type io_connect_t = io_object_t;
    pub type io_iterator_t = io_object_t;
    pub type io_registry_entry_t = io_object_t;
    pub type boolean_t = u32;
    pub type CFMutableDictionaryRef = *mut std::ffi::c_void;
}

use types::*;

pub const KERN_SUCCESS: kern_return_t = 0;
pub const MACH_PORT_NULL: mach_port_t = 0;
pub const IO_OBJECT_NULL: io_object_t = 0;
/// The default main port, passed as the null port.
pub const IO_MAIN_PORT_DEFAULT: mach_port_t = MACH_PORT_NULL;
/// The registry plane holding driver attachment.
pub const IO_SERVICE_PLANE: &CStr = c"IOService";

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    pub fn IOServiceMatching(name: *const c_char) -> CFMutableDictionaryRef;
    pub fn IOServiceGetMatchingService(
        main_port: mach_port_t,
        matching: CFMutableDictionaryRef,
    ) -> io_service_t;
    pub fn IOServiceOpen(
        service: io_service_t,
        owning_task: mach_port_t,
        client_type: u32,
        connect: *mut io_connect_t,
    ) -> kern_return_t;
    pub fn IOServiceClose(connect: io_connect_t) -> kern_return_t;
    pub fn IOObjectRelease(object: io_object_t) -> kern_return_t;
    pub fn IOObjectConformsTo(object: io_object_t, class_name: *const c_char) -> boolean_t;
    pub fn IOConnectCallStructMethod(
        connection: io_connect_t,
        selector: u32,
        input: *const c_void,
        input_size: usize,
        output: *mut c_void,
        output_size: *mut usize,
    ) -> kern_return_t;
    pub fn IORegistryGetRootEntry(main_port: mach_port_t) -> io_registry_entry_t;
    pub fn IORegistryEntryGetChildIterator(
        entry: io_registry_entry_t,
        plane: *const c_char,
        iterator: *mut io_iterator_t,
    ) -> kern_return_t;
    pub fn IOIteratorNext(iterator: io_iterator_t) -> io_object_t;
}

unsafe extern "C" {
    static mach_task_self_: mach_port_t;
    pub fn mach_error_string(error_value: kern_return_t) -> *const c_char;
}

/// Returns the host's description of `code`.
pub fn error_string(code: kern_return_t) -> String {
    // SAFETY: mach_error_string returns a pointer to a static string for
    // any input, or null.
    let s = unsafe { mach_error_string(code) };
    if s.is_null() {
        return format!("unknown error {:#010x}", code as u32);
    }
    // SAFETY: the string is static and nul terminated.
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

fn release(object: io_object_t) {
    // SAFETY: the caller owns a reference to `object`.
    let kr = unsafe { IOObjectRelease(object) };
    if kr != KERN_SUCCESS {
        tracing::warn!(object, kr, "failed to release IOKit object");
    }
}

/// An owned reference to a registered service.
#[derive(Debug)]
pub struct Service(io_service_t);

impl Service {
    /// Returns the first service whose class matches `class_name`.
    pub fn matching(class_name: &CStr) -> Option<Self> {
        // SAFETY: `class_name` is a valid C string. The returned dictionary
        // is consumed by IOServiceGetMatchingService, even on failure.
        let service = unsafe {
            let matching = IOServiceMatching(class_name.as_ptr());
            if matching.is_null() {
                return None;
            }
            IOServiceGetMatchingService(IO_MAIN_PORT_DEFAULT, matching)
        };
        if service == IO_OBJECT_NULL {
            return None;
        }
        Some(Self(service))
    }

    /// Opens a user client of type `client_type` for the current task.
    pub fn open(&self, client_type: u32) -> Result<Connection, kern_return_t> {
        let mut connect = IO_OBJECT_NULL;
        // SAFETY: the service reference is owned and `connect` is a valid
        // out pointer.
        let kr = unsafe { IOServiceOpen(self.0, mach_task_self_, client_type, &mut connect) };
        if kr != KERN_SUCCESS {
            return Err(kr);
        }
        Ok(Connection(connect))
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        release(self.0);
    }
}

/// An open user client connection, closed on drop.
#[derive(Debug)]
pub struct Connection(io_connect_t);

impl Connection {
    /// Invokes struct method `selector`. Returns the number of bytes the
    /// service wrote to `output`.
    pub fn call_struct_method(
        &self,
        selector: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, kern_return_t> {
        let mut output_size = output.len();
        let output_ptr = if output.is_empty() {
            std::ptr::null_mut()
        } else {
            output.as_mut_ptr().cast::<c_void>()
        };
        // SAFETY: the buffers are valid for their lengths, and the service
        // writes at most `output_size` bytes.
        let kr = unsafe {
            IOConnectCallStructMethod(
                self.0,
                selector,
                input.as_ptr().cast::<c_void>(),
                input.len(),
                output_ptr,
                &mut output_size,
            )
        };
        if kr != KERN_SUCCESS {
            return Err(kr);
        }
        Ok(output_size)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // SAFETY: the connection is owned and not used after this.
        let kr = unsafe { IOServiceClose(self.0) };
        if kr != KERN_SUCCESS {
            tracing::warn!(kr, "failed to close IOKit connection");
        }
    }
}

/// An owned reference to an I/O registry entry.
#[derive(Debug)]
pub struct RegistryEntry(io_registry_entry_t);

impl RegistryEntry {
    /// Returns the root of the registry.
    pub fn root() -> Option<Self> {
        // SAFETY: no preconditions.
        let entry = unsafe { IORegistryGetRootEntry(IO_MAIN_PORT_DEFAULT) };
        if entry == IO_OBJECT_NULL {
            return None;
        }
        Some(Self(entry))
    }

    /// Whether the entry is an instance of `class_name` or a subclass.
    pub fn conforms_to(&self, class_name: &CStr) -> bool {
        // SAFETY: the entry is owned and `class_name` is a valid C string.
        unsafe { IOObjectConformsTo(self.0, class_name.as_ptr()) != 0 }
    }

    /// Iterates over the entry's children in `plane`.
    pub fn children(&self, plane: &CStr) -> Result<RegistryIterator, kern_return_t> {
        let mut iterator = IO_OBJECT_NULL;
        // SAFETY: the entry is owned, `plane` is a valid C string and
        // `iterator` is a valid out pointer.
        let kr = unsafe { IORegistryEntryGetChildIterator(self.0, plane.as_ptr(), &mut iterator) };
        if kr != KERN_SUCCESS {
            return Err(kr);
        }
        Ok(RegistryIterator(iterator))
    }
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        release(self.0);
    }
}

/// An owned registry iterator yielding owned entries.
#[derive(Debug)]
pub struct RegistryIterator(io_iterator_t);

impl Iterator for RegistryIterator {
    type Item = RegistryEntry;

    fn next(&mut self) -> Option<RegistryEntry> {
        // SAFETY: the iterator is owned.
        let entry = unsafe { IOIteratorNext(self.0) };
        if entry == IO_OBJECT_NULL {
            return None;
        }
        Some(RegistryEntry(entry))
    }
}

impl Drop for RegistryIterator {
    fn drop(&mut self) {
        release(self.0);
    }
}
