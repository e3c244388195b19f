//! Error handling module for cowfork
//!
//! Two layers: [`SysError`] is what the trusted boundary reports for a single
//! primitive, [`Error`] is what the fork library reports to its caller and
//! always names the primitive that failed.

use core::fmt;

use crate::core::flags::{FaultErr, PteFlags};
use crate::core::types::VirtAddr;

/// Error codes returned by trusted-boundary primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
    /// Environment does not exist or the caller may not act on it
    BadEnv,
    /// Invalid parameter
    Inval,
    /// Request failed due to memory shortage
    NoMem,
    /// Attempt to create a new environment beyond the maximum allowed
    NoFreeEnv,
    /// Memory fault
    Fault,
}

impl SysError {
    /// Negative integer code, as carried across the syscall ABI.
    pub const fn code(self) -> i32 {
        match self {
            SysError::BadEnv => -2,
            SysError::Inval => -3,
            SysError::NoMem => -4,
            SysError::NoFreeEnv => -5,
            SysError::Fault => -6,
        }
    }

    /// Decodes a negative ABI code.
    pub const fn from_code(code: i32) -> Option<SysError> {
        match code {
            -2 => Some(SysError::BadEnv),
            -3 => Some(SysError::Inval),
            -4 => Some(SysError::NoMem),
            -5 => Some(SysError::NoFreeEnv),
            -6 => Some(SysError::Fault),
            _ => None,
        }
    }
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SysError::BadEnv => write!(f, "bad environment"),
            SysError::Inval => write!(f, "invalid parameter"),
            SysError::NoMem => write!(f, "out of memory"),
            SysError::NoFreeEnv => write!(f, "out of environments"),
            SysError::Fault => write!(f, "segmentation fault"),
        }
    }
}

impl core::error::Error for SysError {}

/// Result type for trusted-boundary primitives
pub type SysResult<T> = core::result::Result<T, SysError>;

/// Trusted-boundary primitive, used to name the failing step in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
    /// Create a child environment
    Exofork,
    /// Back a virtual page with a fresh frame
    PageAlloc,
    /// Share a frame between two mappings
    PageMap,
    /// Remove a mapping
    PageUnmap,
    /// Register the page-fault entry point
    SetPgfaultUpcall,
    /// Change scheduling state
    SetStatus,
    /// Read an environment's public record
    EnvInfo,
}

impl Primitive {
    /// Name of the primitive as it appears in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Primitive::Exofork => "sys_exofork",
            Primitive::PageAlloc => "sys_page_alloc",
            Primitive::PageMap => "sys_page_map",
            Primitive::PageUnmap => "sys_page_unmap",
            Primitive::SetPgfaultUpcall => "sys_env_set_pgfault_upcall",
            Primitive::SetStatus => "sys_env_set_status",
            Primitive::EnvInfo => "sys_env_info",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Common error type used by the fork library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A trusted-boundary primitive failed
    Syscall {
        /// The primitive that failed
        primitive: Primitive,
        /// What it reported
        source: SysError,
    },
    /// A page fault that is not a write to a present copy-on-write page
    UnexpectedFault {
        /// Faulting address
        va: VirtAddr,
        /// Error code pushed with the fault
        err: FaultErr,
        /// Permission bits of the page at fault time
        pte: PteFlags,
    },
}

impl Error {
    /// Negative integer code for callers that speak the C convention.
    pub const fn code(&self) -> i32 {
        match self {
            Error::Syscall { source, .. } => source.code(),
            Error::UnexpectedFault { .. } => SysError::Fault.code(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syscall { primitive, source } => write!(f, "{}: {}", primitive, source),
            Error::UnexpectedFault { va, err, pte } => write!(
                f,
                "not copy-on-write: va {} err {:#x} pte [{}]",
                va,
                err.bits(),
                pte
            ),
        }
    }
}

impl core::error::Error for Error {}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Error context trait for naming the failing primitive
pub trait ErrorContext<T> {
    /// Attaches the primitive that produced this result
    fn context(self, primitive: Primitive) -> Result<T>;
}

impl<T> ErrorContext<T> for SysResult<T> {
    fn context(self, primitive: Primitive) -> Result<T> {
        self.map_err(|source| Error::Syscall { primitive, source })
    }
}
