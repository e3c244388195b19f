//! Kernel state and the user entry point
//!
//! All state lives behind one `spin::Mutex`. The lock is never held while
//! user code runs: syscalls and MMU accesses take it for the duration of a
//! single primitive, and fault upcalls are invoked after it is released.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cowfork_api::{EnvId, EnvInfo, EnvStatus, PhysAddr, SysError, SysResult, VirtAddr, PAGE_SIZE};
use cowfork_memory::{FramePool, Pte, PteFlags};
use hashbrown::HashMap;
use spin::{Mutex, MutexGuard};

use crate::config::KernelConfig;
use crate::env::{Env, FIRST_ENV_ID};
use crate::stats::KernelStats;
use crate::user::UserEnv;

/// Everything the trusted boundary owns
pub struct KernelState {
    pub(crate) envs: HashMap<EnvId, Env>,
    pub(crate) frames: FramePool,
    pub(crate) next_env: u32,
    pub(crate) max_envs: usize,
    pub(crate) stats: KernelStats,
}

impl KernelState {
    fn new(config: &KernelConfig) -> Self {
        Self {
            envs: HashMap::new(),
            frames: FramePool::new(config.max_frames),
            next_env: FIRST_ENV_ID,
            max_envs: config.max_envs,
            stats: KernelStats::default(),
        }
    }

    pub(crate) fn alloc_env_id(&mut self) -> SysResult<EnvId> {
        if self.envs.len() >= self.max_envs {
            log::warn!("environment table full ({} environments)", self.max_envs);
            return Err(SysError::NoFreeEnv);
        }
        let id = EnvId(self.next_env);
        self.next_env += 1;
        Ok(id)
    }
}

/// Unwind payload for an abort the kernel itself decided on
pub(crate) struct EnvAbort {
    pub(crate) diagnostic: String,
}

/// Why user code could not run to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The environment does not exist or may not be entered
    NotRunnable {
        /// Target environment
        env: EnvId,
        /// Its state, if it exists
        status: Option<EnvStatus>,
    },
    /// The environment was aborted while running
    Aborted {
        /// Aborted environment
        env: EnvId,
        /// Diagnostic naming the failure
        diagnostic: String,
    },
}

impl RunError {
    /// Diagnostic of an aborted run
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            RunError::Aborted { diagnostic, .. } => Some(diagnostic),
            RunError::NotRunnable { .. } => None,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::NotRunnable { env, status: Some(status) } => {
                write!(f, "environment {} is {}", env, status)
            }
            RunError::NotRunnable { env, status: None } => write!(f, "environment {} does not exist", env),
            RunError::Aborted { env, diagnostic } => write!(f, "environment {} aborted: {}", env, diagnostic),
        }
    }
}

impl std::error::Error for RunError {}

/// The simulated trusted boundary
pub struct Kernel {
    state: Mutex<KernelState>,
    config: KernelConfig,
}

impl Kernel {
    /// Creates a kernel with no environments
    pub fn new(config: KernelConfig) -> Arc<Self> {
        log::debug!("kernel up: {:?}", config);
        Arc::new(Self {
            state: Mutex::new(KernelState::new(&config)),
            config,
        })
    }

    /// Limits this kernel was created with
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.state.lock()
    }

    /// Boots a root environment: runnable, empty address space, no upcall.
    pub fn create_env(&self) -> SysResult<EnvId> {
        let mut state = self.lock();
        let id = state.alloc_env_id()?;
        state.envs.insert(id, Env::root(id));
        state.stats.envs_created += 1;
        log::info!("[{}] root environment created", id);
        Ok(id)
    }

    /// A handle that issues syscalls as `env`.
    ///
    /// Only runnable environments may be entered.
    pub fn context(self: &Arc<Self>, env: EnvId) -> SysResult<UserEnv> {
        let state = self.lock();
        match state.envs.get(&env) {
            Some(record) if record.is_enterable() => Ok(UserEnv::new(Arc::clone(self), env)),
            _ => Err(SysError::BadEnv),
        }
    }

    /// Runs user code as `env`.
    ///
    /// An abort raised by the code itself or by the kernel on its behalf is
    /// caught here: the environment becomes `Dying`, keeps its address space
    /// for inspection, and the diagnostic is returned.
    pub fn run<R, F>(self: &Arc<Self>, env: EnvId, f: F) -> Result<R, RunError>
    where
        F: FnOnce(&UserEnv) -> R,
    {
        let ctx = self.context(env).map_err(|_| RunError::NotRunnable {
            env,
            status: self.env_status(env),
        })?;
        self.swap_status(env, EnvStatus::Runnable, EnvStatus::Running);
        match panic::catch_unwind(AssertUnwindSafe(|| f(&ctx))) {
            Ok(value) => {
                self.swap_status(env, EnvStatus::Running, EnvStatus::Runnable);
                Ok(value)
            }
            Err(payload) => {
                let diagnostic = describe_panic(payload.as_ref());
                self.mark_dying(env, &diagnostic);
                Err(RunError::Aborted {
                    env,
                    diagnostic: self.diagnostic(env).unwrap_or(diagnostic),
                })
            }
        }
    }

    fn swap_status(&self, env: EnvId, from: EnvStatus, to: EnvStatus) {
        if let Some(record) = self.lock().envs.get_mut(&env) {
            if record.status == from {
                record.status = to;
            }
        }
    }

    fn mark_dying(&self, env: EnvId, diagnostic: &str) {
        let mut state = self.lock();
        let Some(record) = state.envs.get_mut(&env) else {
            return;
        };
        if record.status == EnvStatus::Dying {
            return;
        }
        record.status = EnvStatus::Dying;
        record.diagnostic = Some(diagnostic.to_string());
        state.stats.envs_aborted += 1;
        log::error!("[{}] aborted: {}", env, diagnostic);
    }

    /// Aborts `env` from inside the kernel and unwinds back to `run`
    pub(crate) fn abort(&self, env: EnvId, diagnostic: String) -> ! {
        self.mark_dying(env, &diagnostic);
        panic::resume_unwind(Box::new(EnvAbort { diagnostic }))
    }

    /// Frees every frame `env` maps and removes it from the table
    pub fn destroy(&self, env: EnvId) -> SysResult<()> {
        let mut state = self.lock();
        let mut record = state.envs.remove(&env).ok_or(SysError::BadEnv)?;
        for frame in record.pgdir.drain() {
            state.frames.decref(frame);
        }
        log::info!("[{}] destroyed", env);
        Ok(())
    }

    /// Scheduling state of `env`
    pub fn env_status(&self, env: EnvId) -> Option<EnvStatus> {
        self.lock().envs.get(&env).map(|record| record.status)
    }

    /// Public record of `env`
    pub fn env_info(&self, env: EnvId) -> Option<EnvInfo> {
        self.lock().envs.get(&env).map(Env::info)
    }

    /// Every environment, in creation order
    pub fn env_ids(&self) -> Vec<EnvId> {
        let mut ids: Vec<EnvId> = self.lock().envs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Why `env` was aborted
    pub fn diagnostic(&self, env: EnvId) -> Option<String> {
        self.lock().envs.get(&env).and_then(|record| record.diagnostic.clone())
    }

    /// What `env` believes its own handle is
    pub fn thisenv(&self, env: EnvId) -> Option<EnvId> {
        self.lock().envs.get(&env).map(|record| record.thisenv)
    }

    /// Physical address and permissions behind `va` in `env`
    pub fn translate(&self, env: EnvId, va: VirtAddr) -> Option<(PhysAddr, PteFlags)> {
        let state = self.lock();
        let pte = state.envs.get(&env)?.pgdir.lookup(va.page_number())?;
        Some((PhysAddr::new(pte.frame.as_usize() + va.page_offset()), pte.flags))
    }

    /// Every mapping of `env`, in address order
    pub fn mappings(&self, env: EnvId) -> Vec<(VirtAddr, Pte)> {
        let state = self.lock();
        state.envs.get(&env).map_or_else(Vec::new, |record| {
            record.pgdir.iter().map(|(pn, pte)| (VirtAddr::from_page(pn), pte)).collect()
        })
    }

    /// Faults delivered to `env`'s upcall
    pub fn fault_count(&self, env: EnvId) -> u64 {
        self.lock().envs.get(&env).map_or(0, |record| record.faults)
    }

    /// Frames currently allocated
    pub fn frames_in_use(&self) -> usize {
        self.lock().frames.in_use()
    }

    /// Mappings referencing the frame holding `pa`
    pub fn frame_refcount(&self, pa: PhysAddr) -> u32 {
        self.lock().frames.refcount(pa)
    }

    /// Reads a word of physical memory; `None` if the frame is not allocated
    pub fn read_phys_u32(&self, pa: PhysAddr) -> Option<u32> {
        let offset = pa.page_offset();
        if offset + 4 > PAGE_SIZE {
            return None;
        }
        let state = self.lock();
        let frame = state.frames.bytes(pa)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&frame[offset..offset + 4]);
        Some(u32::from_le_bytes(word))
    }

    /// Reads a word of `env`'s memory without faulting; `None` if unmapped
    pub fn read_virt_u32(&self, env: EnvId, va: VirtAddr) -> Option<u32> {
        let (pa, flags) = self.translate(env, va)?;
        if !flags.is_present() {
            return None;
        }
        self.read_phys_u32(pa)
    }

    /// Overwrites the permission bits of an existing mapping.
    ///
    /// Returns the entry as it was. Nothing is created for an unmapped page.
    pub fn set_pte_flags(&self, env: EnvId, va: VirtAddr, flags: PteFlags) -> SysResult<Pte> {
        if !va.is_page_aligned() {
            return Err(SysError::Inval);
        }
        let mut state = self.lock();
        let record = state.envs.get_mut(&env).ok_or(SysError::BadEnv)?;
        let old = record.pgdir.lookup(va.page_number()).ok_or(SysError::Inval)?;
        record.pgdir.set_flags(va.page_number(), flags);
        log::debug!("[{}] pte {} [{}] -> [{}]", env, va, old.flags, flags);
        Ok(old)
    }

    /// Counters since boot
    pub fn stats(&self) -> KernelStats {
        self.lock().stats.clone()
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(abort) = payload.downcast_ref::<EnvAbort>() {
        abort.diagnostic.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "aborted".to_string()
    }
}
