//! MMU access path and page-fault dispatch
//!
//! Loads and stores are translated one page at a time. An access the
//! mapping does not allow raises a page fault: the fault record is pushed on
//! the environment's exception stack and the registered upcall runs with the
//! kernel lock released. The access is retried once the upcall returns.

use cowfork_api::{EnvId, EnvStatus, FaultErr, PgFaultUpcall, UTrapframe, VirtAddr, PAGE_SIZE};
use cowfork_memory::{PhysAddr, DEFAULT_LAYOUT};

use crate::kernel::{Kernel, KernelState};
use crate::user::UserEnv;

/// Kind of memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Load
    Read,
    /// Store
    Write,
}

/// Bytes one pushed fault record occupies, including the scratch word below it
pub const FAULT_FRAME_SIZE: usize = UTrapframe::SIZE + 4;

impl KernelState {
    /// Frame backing `va` if `env` may perform `access` there, else the fault it raises
    pub(crate) fn translate_access(&self, env: EnvId, va: VirtAddr, access: Access) -> Result<PhysAddr, FaultErr> {
        let mut err = FaultErr::USER;
        if access == Access::Write {
            err |= FaultErr::WRITE;
        }
        let pte = self
            .envs
            .get(&env)
            .and_then(|record| record.pgdir.lookup(va.page_number()))
            .filter(|pte| pte.flags.is_present());
        match pte {
            None => Err(err),
            Some(pte) if !pte.flags.is_user() => Err(err | FaultErr::PROTECTION),
            Some(pte) if access == Access::Write && !pte.flags.is_writable() => Err(err | FaultErr::PROTECTION),
            Some(pte) => Ok(pte.frame),
        }
    }
}

impl Kernel {
    /// Runs `op` over each page-sized piece of `[va, va + len)` in `ctx`'s memory.
    ///
    /// `op` receives the frame bytes of the piece and its offset into the
    /// access.
    pub(crate) fn user_access<F>(&self, ctx: &UserEnv, va: VirtAddr, len: usize, access: Access, mut op: F)
    where
        F: FnMut(&mut [u8], usize),
    {
        let env = ctx.id();
        let mut done = 0;
        while done < len {
            let cur = va.offset(done);
            let offset = cur.page_offset();
            let chunk = (PAGE_SIZE - offset).min(len - done);
            let mut retries = 0;
            loop {
                let fault = {
                    let mut state = self.lock();
                    match state.translate_access(env, cur, access) {
                        Ok(frame) => {
                            if let Some(bytes) = state.frames.bytes_mut(frame) {
                                op(&mut bytes[offset..offset + chunk], done);
                            }
                            None
                        }
                        Err(err) => Some(err),
                    }
                };
                let Some(err) = fault else {
                    break;
                };
                if retries == self.config().max_fault_retries {
                    self.abort(
                        env,
                        format!("page fault at {} err {:#x} not resolved after {} retries", cur, err.bits(), retries),
                    );
                }
                retries += 1;
                self.dispatch_fault(ctx, cur, err);
            }
            done += chunk;
        }
    }

    /// Delivers a page fault to `ctx`'s upcall on its exception stack.
    ///
    /// Aborts the environment if it has no upcall, no writable exception
    /// stack, or is already nested too deeply in fault handlers.
    pub fn dispatch_fault(&self, ctx: &UserEnv, va: VirtAddr, err: FaultErr) {
        let env = ctx.id();
        let utf = UTrapframe { fault_va: va, err };
        let upcall = match self.push_fault(env, &utf) {
            Ok(upcall) => upcall,
            Err(diagnostic) => self.abort(env, diagnostic),
        };
        log::debug!("[{}] page fault va {} err {:#x} -> upcall {:#x}", env, va, err.bits(), upcall.entry());
        upcall.invoke(ctx, &utf);
        if let Some(record) = self.lock().envs.get_mut(&env) {
            record.fault_depth = record.fault_depth.saturating_sub(1);
        }
    }

    fn push_fault(&self, env: EnvId, utf: &UTrapframe) -> Result<PgFaultUpcall, String> {
        let max_depth = self.config().max_fault_depth;
        let mut state = self.lock();
        let record = state.envs.get_mut(&env).ok_or_else(|| format!("fault in unknown environment {}", env))?;
        if record.status == EnvStatus::Dying {
            return Err(format!("page fault at {} in a dying environment", utf.fault_va));
        }
        let Some(upcall) = record.pgfault_upcall else {
            return Err(format!(
                "unhandled page fault va {} err {:#x}: no upcall registered",
                utf.fault_va,
                utf.err.bits()
            ));
        };
        let xstack = DEFAULT_LAYOUT.exception_stack();
        let stack = record
            .pgdir
            .lookup(xstack.page_number())
            .filter(|pte| pte.flags.is_present() && pte.flags.is_user() && pte.flags.is_writable())
            .ok_or_else(|| format!("page fault at {}: exception stack {} not mapped writable", utf.fault_va, xstack))?;
        if record.fault_depth >= max_depth {
            return Err(format!(
                "page fault at {} nested {} deep in fault handlers",
                utf.fault_va, record.fault_depth
            ));
        }
        let slot = PAGE_SIZE - (record.fault_depth as usize + 1) * FAULT_FRAME_SIZE;
        record.fault_depth += 1;
        record.faults += 1;
        state.stats.faults_dispatched += 1;
        if let Some(bytes) = state.frames.bytes_mut(stack.frame) {
            bytes[slot..slot + UTrapframe::SIZE].copy_from_slice(&utf.to_bytes());
        }
        Ok(upcall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use cowfork_api::{PteFlags, Syscalls};

    #[test]
    fn test_translate_access_classifies_faults() {
        let kernel = Kernel::new(KernelConfig::default());
        let env = kernel.create_env().expect("env");
        let ctx = kernel.context(env).expect("ctx");
        let ro = VirtAddr::new(0x0080_0000);
        ctx.page_alloc(EnvId::CURRENT, ro, PteFlags::USER_READ).expect("alloc");

        let state = kernel.lock();
        assert!(state.translate_access(env, ro, Access::Read).is_ok());
        assert_eq!(
            state.translate_access(env, ro, Access::Write),
            Err(FaultErr::USER | FaultErr::WRITE | FaultErr::PROTECTION)
        );
        assert_eq!(
            state.translate_access(env, VirtAddr::new(0x0080_1000), Access::Read),
            Err(FaultErr::USER)
        );
    }

    #[test]
    fn test_fault_frame_sits_at_top_of_exception_stack() {
        assert_eq!(PAGE_SIZE - FAULT_FRAME_SIZE, 0xff4);
    }
}
