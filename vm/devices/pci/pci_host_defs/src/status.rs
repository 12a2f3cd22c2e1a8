// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Status codes returned by host I/O services.

use core::fmt;

/// A status code returned by a host service transaction.
///
/// Zero is success. Errors live in the I/O Kit common subsystem, so they all
/// carry the `0xe000_0000` system bits and compare negative as `i32`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct IoReturn(pub i32);

const fn common(code: u32) -> IoReturn {
    IoReturn((0xe000_0000 | code) as i32)
}

#[expect(missing_docs)] // constants are self-explanatory
impl IoReturn {
    pub const SUCCESS: Self = Self(0);
    pub const ERROR: Self = common(0x2bc);
    pub const NO_MEMORY: Self = common(0x2bd);
    pub const NO_RESOURCES: Self = common(0x2be);
    pub const IPC_ERROR: Self = common(0x2bf);
    pub const NO_DEVICE: Self = common(0x2c0);
    pub const NOT_PRIVILEGED: Self = common(0x2c1);
    pub const BAD_ARGUMENT: Self = common(0x2c2);
    pub const EXCLUSIVE_ACCESS: Self = common(0x2c5);
    pub const UNSUPPORTED: Self = common(0x2c7);
    pub const INTERNAL_ERROR: Self = common(0x2c9);
    pub const IO_ERROR: Self = common(0x2ca);
    pub const NOT_OPEN: Self = common(0x2cd);
    pub const NOT_READABLE: Self = common(0x2ce);
    pub const NOT_WRITABLE: Self = common(0x2cf);
    pub const NOT_ALIGNED: Self = common(0x2d0);
    pub const BUSY: Self = common(0x2d5);
    pub const TIMEOUT: Self = common(0x2d6);
    pub const NOT_READY: Self = common(0x2d8);
    pub const NOT_PERMITTED: Self = common(0x2e2);
    pub const NO_POWER: Self = common(0x2e3);
    pub const DEVICE_ERROR: Self = common(0x2e9);
    pub const NOT_RESPONDING: Self = common(0x2ed);
    pub const NOT_FOUND: Self = common(0x2f0);
}

impl IoReturn {
    /// Whether the code denotes success.
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// The raw code as an unsigned value, the form hosts print it in.
    pub const fn code(self) -> u32 {
        self.0 as u32
    }

    /// A short description of well-known codes.
    pub fn description(self) -> &'static str {
        match self {
            Self::SUCCESS => "success",
            Self::ERROR => "general error",
            Self::NO_MEMORY => "cannot allocate memory",
            Self::NO_RESOURCES => "resource shortage",
            Self::IPC_ERROR => "error during IPC",
            Self::NO_DEVICE => "no such device",
            Self::NOT_PRIVILEGED => "privilege violation",
            Self::BAD_ARGUMENT => "invalid argument",
            Self::EXCLUSIVE_ACCESS => "exclusive access and device already open",
            Self::UNSUPPORTED => "unsupported function",
            Self::INTERNAL_ERROR => "internal error",
            Self::IO_ERROR => "general I/O error",
            Self::NOT_OPEN => "device not open",
            Self::NOT_READABLE => "read not supported",
            Self::NOT_WRITABLE => "write not supported",
            Self::NOT_ALIGNED => "alignment error",
            Self::BUSY => "device busy",
            Self::TIMEOUT => "I/O timeout",
            Self::NOT_READY => "not ready",
            Self::NOT_PERMITTED => "not permitted",
            Self::NO_POWER => "no power to device",
            Self::DEVICE_ERROR => "device error",
            Self::NOT_RESPONDING => "device not responding",
            Self::NOT_FOUND => "not found",
            _ => "unknown status",
        }
    }
}

impl fmt::Debug for IoReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IoReturn({:#010x})", self.code())
    }
}

impl fmt::Display for IoReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.description(), self.code())
    }
}
