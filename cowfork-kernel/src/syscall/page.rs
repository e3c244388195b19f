//! Page primitives

use cowfork_api::{EnvId, SysError, SysResult, VirtAddr};
use cowfork_memory::PteFlags;

use super::{check_perm, check_va};
use crate::kernel::KernelState;

impl KernelState {
    pub(crate) fn page_alloc(&mut self, caller: EnvId, env: EnvId, va: VirtAddr, perm: PteFlags) -> SysResult<()> {
        let id = self.resolve(caller, env)?;
        check_va(va)?;
        check_perm(perm)?;
        let frame = self.frames.alloc_zeroed()?;
        if let Err(err) = self.install(id, va.page_number(), frame, perm) {
            self.frames.release_if_unused(frame);
            return Err(err);
        }
        log::trace!("[{}] page_alloc {} -> {} [{}]", caller, va, frame, perm);
        Ok(())
    }

    pub(crate) fn page_map(
        &mut self,
        caller: EnvId,
        src_env: EnvId,
        src_va: VirtAddr,
        dst_env: EnvId,
        dst_va: VirtAddr,
        perm: PteFlags,
    ) -> SysResult<()> {
        let src = self.resolve(caller, src_env)?;
        let dst = self.resolve(caller, dst_env)?;
        check_va(src_va)?;
        check_va(dst_va)?;
        check_perm(perm)?;
        let pte = self
            .envs
            .get(&src)
            .and_then(|record| record.pgdir.lookup(src_va.page_number()))
            .filter(|pte| pte.flags.is_present())
            .ok_or(SysError::Inval)?;
        if perm.contains(PteFlags::WRITABLE) && !pte.flags.is_writable() {
            return Err(SysError::Inval);
        }
        self.install(dst, dst_va.page_number(), pte.frame, perm)?;
        log::trace!("[{}] page_map {}:{} -> {}:{} [{}]", caller, src, src_va, dst, dst_va, perm);
        Ok(())
    }

    pub(crate) fn page_unmap(&mut self, caller: EnvId, env: EnvId, va: VirtAddr) -> SysResult<()> {
        let id = self.resolve(caller, env)?;
        check_va(va)?;
        let record = self.envs.get_mut(&id).ok_or(SysError::BadEnv)?;
        if let Some(old) = record.pgdir.remove(va.page_number()) {
            self.frames.decref(old.frame);
        }
        Ok(())
    }
}
