//! Syscall interface definitions
//!
//! The privileged operations the fork library consumes. Every method acts
//! on behalf of the environment the implementor is bound to; `EnvId::CURRENT`
//! names that environment.

use core::fmt;

use crate::context::UserContext;
use crate::core::flags::{FaultErr, PteFlags};
use crate::core::types::{EnvId, EnvStatus, VirtAddr};
use crate::error::SysResult;

/// Fault record handed to the page-fault upcall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct UTrapframe {
    /// Faulting virtual address
    pub fault_va: VirtAddr,
    /// Error code
    pub err: FaultErr,
}

impl UTrapframe {
    /// Size of the record once pushed on the exception stack.
    pub const SIZE: usize = 8;

    /// Whether the faulting access was a write.
    pub const fn is_write(&self) -> bool {
        self.err.contains(FaultErr::WRITE)
    }

    /// Encodes the record as it sits on the exception stack.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&(self.fault_va.as_usize() as u32).to_le_bytes());
        out[4..].copy_from_slice(&self.err.bits().to_le_bytes());
        out
    }

    /// Decodes a record read back from an exception stack.
    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let va = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let err = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self {
            fault_va: VirtAddr::new(va as usize),
            err: FaultErr::from_bits_truncate(err),
        }
    }
}

/// Page-fault entry point registered for an environment
#[derive(Clone, Copy)]
pub struct PgFaultUpcall(pub fn(&dyn UserContext, &UTrapframe));

impl PgFaultUpcall {
    /// Entry-point address, used for identity comparisons and display.
    pub fn entry(&self) -> usize {
        self.0 as usize
    }

    /// Runs the handler on behalf of `ctx`.
    pub fn invoke(&self, ctx: &dyn UserContext, utf: &UTrapframe) {
        (self.0)(ctx, utf)
    }
}

impl PartialEq for PgFaultUpcall {
    fn eq(&self, other: &Self) -> bool {
        self.entry() == other.entry()
    }
}

impl Eq for PgFaultUpcall {}

impl fmt::Debug for PgFaultUpcall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PgFaultUpcall({:#x})", self.entry())
    }
}

/// Read-only public record of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvInfo {
    /// Handle
    pub id: EnvId,
    /// Creator, `EnvId::CURRENT` for a root environment
    pub parent_id: EnvId,
    /// Scheduling state
    pub status: EnvStatus,
    /// Registered fault entry point
    pub pgfault_upcall: Option<PgFaultUpcall>,
}

/// Trait for the trusted boundary
pub trait Syscalls {
    /// Returns the calling environment's own handle
    fn getenvid(&self) -> EnvId;

    /// Creates a new, not-yet-runnable child.
    ///
    /// Returns the child's handle in the parent and `EnvId::CURRENT` when the
    /// child itself resumes from this call.
    fn exofork(&self) -> SysResult<EnvId>;

    /// Backs `va` in `env` with a fresh zeroed frame
    fn page_alloc(&self, env: EnvId, va: VirtAddr, perm: PteFlags) -> SysResult<()>;

    /// Maps the frame behind `src_va` in `src_env` at `dst_va` in `dst_env`
    fn page_map(
        &self,
        src_env: EnvId,
        src_va: VirtAddr,
        dst_env: EnvId,
        dst_va: VirtAddr,
        perm: PteFlags,
    ) -> SysResult<()>;

    /// Removes the mapping at `va` in `env`
    fn page_unmap(&self, env: EnvId, va: VirtAddr) -> SysResult<()>;

    /// Registers the page-fault entry point for `env`
    fn env_set_pgfault_upcall(&self, env: EnvId, upcall: PgFaultUpcall) -> SysResult<()>;

    /// Changes the scheduling state of `env`
    fn env_set_status(&self, env: EnvId, status: EnvStatus) -> SysResult<()>;

    /// Reads the public record of `env`
    fn env_info(&self, env: EnvId) -> SysResult<EnvInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utrapframe_bytes() {
        let utf = UTrapframe {
            fault_va: VirtAddr::new(0x0080_0004),
            err: FaultErr::WRITE | FaultErr::PROTECTION,
        };
        assert!(utf.is_write());
        assert_eq!(UTrapframe::from_bytes(utf.to_bytes()), utf);
    }
}
