//! User-side handle on the trusted boundary

use std::fmt;
use std::sync::Arc;

use cowfork_api::{
    EnvId, EnvInfo, EnvStatus, PageNum, PageTableMirror, PgFaultUpcall, Primitive, ProcessLocal, PteFlags,
    SysResult, Syscalls, UserMemory, VirtAddr,
};

use crate::kernel::Kernel;
use crate::trap::Access;

/// A running environment's view of the kernel.
///
/// Every syscall issued through it acts as the bound environment, which is
/// also what `EnvId::CURRENT` resolves to.
#[derive(Clone)]
pub struct UserEnv {
    kernel: Arc<Kernel>,
    id: EnvId,
}

impl UserEnv {
    pub(crate) fn new(kernel: Arc<Kernel>, id: EnvId) -> Self {
        Self { kernel, id }
    }

    /// The environment this handle acts as
    pub fn id(&self) -> EnvId {
        self.id
    }

    /// The kernel behind this handle
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }
}

impl fmt::Debug for UserEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserEnv").field("id", &self.id).finish()
    }
}

impl Syscalls for UserEnv {
    fn getenvid(&self) -> EnvId {
        self.id
    }

    fn exofork(&self) -> SysResult<EnvId> {
        self.kernel.syscall(self.id, Primitive::Exofork, |state| state.exofork(self.id))
    }

    fn page_alloc(&self, env: EnvId, va: VirtAddr, perm: PteFlags) -> SysResult<()> {
        self.kernel
            .syscall(self.id, Primitive::PageAlloc, |state| state.page_alloc(self.id, env, va, perm))
    }

    fn page_map(
        &self,
        src_env: EnvId,
        src_va: VirtAddr,
        dst_env: EnvId,
        dst_va: VirtAddr,
        perm: PteFlags,
    ) -> SysResult<()> {
        self.kernel.syscall(self.id, Primitive::PageMap, |state| {
            state.page_map(self.id, src_env, src_va, dst_env, dst_va, perm)
        })
    }

    fn page_unmap(&self, env: EnvId, va: VirtAddr) -> SysResult<()> {
        self.kernel
            .syscall(self.id, Primitive::PageUnmap, |state| state.page_unmap(self.id, env, va))
    }

    fn env_set_pgfault_upcall(&self, env: EnvId, upcall: PgFaultUpcall) -> SysResult<()> {
        self.kernel.syscall(self.id, Primitive::SetPgfaultUpcall, |state| {
            state.set_pgfault_upcall(self.id, env, upcall)
        })
    }

    fn env_set_status(&self, env: EnvId, status: EnvStatus) -> SysResult<()> {
        self.kernel
            .syscall(self.id, Primitive::SetStatus, |state| state.set_status(self.id, env, status))
    }

    fn env_info(&self, env: EnvId) -> SysResult<EnvInfo> {
        self.kernel
            .syscall(self.id, Primitive::EnvInfo, |state| state.env_info(self.id, env))
    }
}

impl PageTableMirror for UserEnv {
    fn pde_present(&self, pdx: usize) -> bool {
        self.kernel
            .lock()
            .envs
            .get(&self.id)
            .is_some_and(|env| env.pgdir.pde_present(pdx))
    }

    fn pte(&self, pn: PageNum) -> PteFlags {
        self.kernel
            .lock()
            .envs
            .get(&self.id)
            .map_or(PteFlags::empty(), |env| env.pgdir.pte(pn))
    }
}

impl UserMemory for UserEnv {
    fn load(&self, va: VirtAddr, buf: &mut [u8]) {
        let len = buf.len();
        self.kernel.user_access(self, va, len, Access::Read, |bytes, at| {
            buf[at..at + bytes.len()].copy_from_slice(bytes);
        });
    }

    fn store(&self, va: VirtAddr, data: &[u8]) {
        self.kernel.user_access(self, va, data.len(), Access::Write, |bytes, at| {
            bytes.copy_from_slice(&data[at..at + bytes.len()]);
        });
    }
}

impl ProcessLocal for UserEnv {
    fn thisenv(&self) -> EnvId {
        self.kernel.lock().envs.get(&self.id).map_or(EnvId::CURRENT, |env| env.thisenv)
    }

    fn set_thisenv(&self, env: EnvId) {
        if let Some(record) = self.kernel.lock().envs.get_mut(&self.id) {
            record.thisenv = env;
        }
    }
}
