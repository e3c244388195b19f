//! Syscall entry and argument checks
//!
//! Every primitive runs under the kernel lock, is counted in the kernel
//! statistics, and is logged: accepted calls at debug level, refused calls
//! at warn level.

pub mod env;
pub mod page;

use cowfork_api::{EnvId, EnvStatus, Primitive, SysError, SysResult, VirtAddr};
use cowfork_memory::layout::UTOP;
use cowfork_memory::{PageNum, PhysAddr, Pte, PteFlags};

use crate::kernel::{Kernel, KernelState};

impl Kernel {
    /// Runs one primitive on behalf of `caller`
    pub(crate) fn syscall<T, F>(&self, caller: EnvId, primitive: Primitive, f: F) -> SysResult<T>
    where
        F: FnOnce(&mut KernelState) -> SysResult<T>,
    {
        let mut state = self.lock();
        let result = state.check_caller(caller).and_then(|()| f(&mut state));
        state.stats.record(primitive, result.is_ok());
        match &result {
            Ok(_) => log::debug!("[{}] {} ok", caller, primitive),
            Err(err) => log::warn!("[{}] {} refused: {}", caller, primitive, err),
        }
        result
    }
}

impl KernelState {
    fn check_caller(&self, caller: EnvId) -> SysResult<()> {
        match self.envs.get(&caller) {
            Some(env) if env.status != EnvStatus::Dying => Ok(()),
            _ => Err(SysError::BadEnv),
        }
    }

    /// Resolves `target` for `caller`: itself or one of its immediate children.
    pub(crate) fn resolve(&self, caller: EnvId, target: EnvId) -> SysResult<EnvId> {
        let id = if target.is_current() { caller } else { target };
        let env = self.envs.get(&id).ok_or(SysError::BadEnv)?;
        if env.status == EnvStatus::Dying || (id != caller && env.parent_id != caller) {
            return Err(SysError::BadEnv);
        }
        Ok(id)
    }

    /// Installs `frame` at page `pn` of `env`, replacing any existing entry.
    ///
    /// The new reference is taken before the old one is dropped, so
    /// re-inserting the same frame never frees it.
    pub(crate) fn install(&mut self, env: EnvId, pn: PageNum, frame: PhysAddr, perm: PteFlags) -> SysResult<()> {
        let record = self.envs.get_mut(&env).ok_or(SysError::BadEnv)?;
        self.frames.incref(frame);
        if let Some(old) = record.pgdir.insert(pn, Pte { frame, flags: perm }) {
            self.frames.decref(old.frame);
        }
        Ok(())
    }
}

/// Addresses handed to a syscall must be page aligned and below UTOP
pub(crate) fn check_va(va: VirtAddr) -> SysResult<()> {
    if va.is_page_aligned() && va.as_usize() < UTOP {
        Ok(())
    } else {
        Err(SysError::Inval)
    }
}

/// Permissions must include USER|PRESENT and stay inside the syscall set
pub(crate) fn check_perm(perm: PteFlags) -> SysResult<()> {
    if perm.contains(PteFlags::USER | PteFlags::PRESENT) && PteFlags::SYSCALL.contains(perm) {
        Ok(())
    } else {
        Err(SysError::Inval)
    }
}
