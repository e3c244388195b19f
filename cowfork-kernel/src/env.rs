//! Environment records

use cowfork_api::{EnvId, EnvInfo, EnvStatus, PgFaultUpcall};
use cowfork_memory::PageTable;

/// First handle handed out; handle 0 means "the caller"
pub const FIRST_ENV_ID: u32 = 0x1000;

/// One environment as the trusted boundary sees it
#[derive(Debug)]
pub struct Env {
    /// Handle
    pub id: EnvId,
    /// Creator, `EnvId::CURRENT` for a root environment
    pub parent_id: EnvId,
    /// Scheduling state
    pub status: EnvStatus,
    /// Address space
    pub pgdir: PageTable,
    /// Registered fault entry point
    pub pgfault_upcall: Option<PgFaultUpcall>,
    /// Process-local `thisenv` as the environment's memory holds it
    pub thisenv: EnvId,
    /// The environment has yet to return from the exofork that created it
    pub pending_child_return: bool,
    /// Faults delivered to the upcall
    pub faults: u64,
    /// Upcalls currently running
    pub fault_depth: u32,
    /// Why the environment was aborted
    pub diagnostic: Option<String>,
}

impl Env {
    /// A root environment, runnable with an empty address space
    pub fn root(id: EnvId) -> Self {
        Self {
            id,
            parent_id: EnvId::CURRENT,
            status: EnvStatus::Runnable,
            pgdir: PageTable::new(),
            pgfault_upcall: None,
            thisenv: id,
            pending_child_return: false,
            faults: 0,
            fault_depth: 0,
            diagnostic: None,
        }
    }

    /// A child of `parent`, not runnable, waiting to return from exofork
    pub fn child_of(id: EnvId, parent: &Env) -> Self {
        Self {
            id,
            parent_id: parent.id,
            status: EnvStatus::NotRunnable,
            pgdir: PageTable::new(),
            pgfault_upcall: None,
            thisenv: parent.thisenv,
            pending_child_return: true,
            faults: 0,
            fault_depth: 0,
            diagnostic: None,
        }
    }

    /// Whether user code may be entered in this environment
    pub fn is_enterable(&self) -> bool {
        matches!(self.status, EnvStatus::Runnable | EnvStatus::Running)
    }

    /// Public record
    pub fn info(&self) -> EnvInfo {
        EnvInfo {
            id: self.id,
            parent_id: self.parent_id,
            status: self.status,
            pgfault_upcall: self.pgfault_upcall,
        }
    }
}
