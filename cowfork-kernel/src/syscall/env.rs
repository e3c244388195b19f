//! Environment primitives

use cowfork_api::{EnvId, EnvInfo, EnvStatus, PgFaultUpcall, SysError, SysResult};

use crate::env::Env;
use crate::kernel::KernelState;

impl KernelState {
    pub(crate) fn exofork(&mut self, caller: EnvId) -> SysResult<EnvId> {
        let parent = self.envs.get_mut(&caller).ok_or(SysError::BadEnv)?;
        // the child resuming from its parent's exofork
        if parent.pending_child_return {
            parent.pending_child_return = false;
            return Ok(EnvId::CURRENT);
        }
        let id = self.alloc_env_id()?;
        let parent = self.envs.get(&caller).ok_or(SysError::BadEnv)?;
        let child = Env::child_of(id, parent);
        self.envs.insert(id, child);
        self.stats.envs_created += 1;
        log::info!("[{}] exofork -> {}", caller, id);
        Ok(id)
    }

    pub(crate) fn set_pgfault_upcall(&mut self, caller: EnvId, env: EnvId, upcall: PgFaultUpcall) -> SysResult<()> {
        let id = self.resolve(caller, env)?;
        let record = self.envs.get_mut(&id).ok_or(SysError::BadEnv)?;
        record.pgfault_upcall = Some(upcall);
        Ok(())
    }

    pub(crate) fn set_status(&mut self, caller: EnvId, env: EnvId, status: EnvStatus) -> SysResult<()> {
        if !matches!(status, EnvStatus::Runnable | EnvStatus::NotRunnable) {
            return Err(SysError::Inval);
        }
        let id = self.resolve(caller, env)?;
        let record = self.envs.get_mut(&id).ok_or(SysError::BadEnv)?;
        record.status = status;
        Ok(())
    }

    pub(crate) fn env_info(&self, caller: EnvId, env: EnvId) -> SysResult<EnvInfo> {
        let id = if env.is_current() { caller } else { env };
        self.envs.get(&id).map(Env::info).ok_or(SysError::BadEnv)
    }
}
