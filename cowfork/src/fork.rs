//! Copy-on-write fork

use cowfork_api::{EnvId, EnvStatus, ErrorContext, PgFaultUpcall, Primitive, PteFlags, Result, UserContext};
use cowfork_memory::{walk_mapped, PageRange, DEFAULT_LAYOUT};

use crate::config::{FailurePolicy, ForkConfig, Strategy};
use crate::duppage::duppage;
use crate::pgfault::{pgfault, set_pgfault_handler};
use crate::sfork::shared_fork;
use crate::abort;

/// Which side of a fork the caller is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    /// The original process, holding the new child's handle
    Parent(EnvId),
    /// The new process
    Child,
}

impl Fork {
    /// Classic return value: the child's handle in the parent, 0 in the child
    pub const fn as_raw(self) -> u32 {
        match self {
            Fork::Parent(child) => child.as_u32(),
            Fork::Child => 0,
        }
    }

    /// Whether this is the child's side
    pub const fn is_child(self) -> bool {
        matches!(self, Fork::Child)
    }

    /// The child's handle, on the parent's side
    pub const fn child(self) -> Option<EnvId> {
        match self {
            Fork::Parent(child) => Some(child),
            Fork::Child => None,
        }
    }
}

/// Duplicates the calling process copy-on-write.
///
/// Returns `Fork::Parent(child)` in the caller and `Fork::Child` in the new
/// process. Any failure terminates the caller.
pub fn fork<C>(ctx: &C) -> Fork
where
    C: UserContext + ?Sized,
{
    match fork_with(ctx, &ForkConfig::COPY_ON_WRITE) {
        Ok(side) => side,
        Err(err) => abort("fork", &err),
    }
}

/// Forks with an explicit strategy and failure policy.
///
/// Under [`FailurePolicy::Abort`] this only returns on success.
pub fn fork_with<C>(ctx: &C, config: &ForkConfig) -> Result<Fork>
where
    C: UserContext + ?Sized,
{
    let result = match config.strategy {
        Strategy::CopyOnWrite => cow_fork(ctx),
        Strategy::Shared => shared_fork(ctx),
    };
    match (result, config.on_error) {
        (Err(err), FailurePolicy::Abort) => abort(config.strategy.name(), &err),
        (result, _) => result,
    }
}

/// The child's side of a fork: fix up the process-local identity.
pub(crate) fn enter_child<C>(ctx: &C) -> Fork
where
    C: UserContext + ?Sized,
{
    ctx.set_thisenv(ctx.getenvid());
    Fork::Child
}

/// Gives `child` a fresh exception stack and the same fault entry point
pub(crate) fn arm_child<C>(ctx: &C, child: EnvId) -> Result<()>
where
    C: UserContext + ?Sized,
{
    ctx.page_alloc(child, DEFAULT_LAYOUT.exception_stack(), PteFlags::USER_RW)
        .context(Primitive::PageAlloc)?;
    ctx.env_set_pgfault_upcall(child, PgFaultUpcall(pgfault))
        .context(Primitive::SetPgfaultUpcall)
}

fn cow_fork<C>(ctx: &C) -> Result<Fork>
where
    C: UserContext + ?Sized,
{
    set_pgfault_handler(ctx, pgfault)?;
    let child = ctx.exofork().context(Primitive::Exofork)?;
    if child.is_current() {
        return Ok(enter_child(ctx));
    }

    let below_stack = PageRange::new(0, DEFAULT_LAYOUT.ustacktop.page_number());
    let pages = walk_mapped(ctx, below_stack, |pn, _| duppage(ctx, child, pn))?;

    // the exception stack is never shared, the child gets its own
    arm_child(ctx, child)?;
    ctx.env_set_status(child, EnvStatus::Runnable)
        .context(Primitive::SetStatus)?;

    log::info!("[{}] fork -> {}: {} pages copy-on-write", ctx.getenvid(), child, pages);
    Ok(Fork::Parent(child))
}
