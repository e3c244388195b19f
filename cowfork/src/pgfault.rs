//! Copy-on-write page-fault handling
//!
//! A write to a page that both processes share copy-on-write faults. The
//! handler gives the faulting process a private, writable copy of the page
//! and leaves the other process's mapping alone. Any other fault is a bug
//! and terminates the process.

use cowfork_api::{
    EnvId, Error, ErrorContext, MirrorExt, PageTableMirror, PgFaultUpcall, Primitive, PteFlags, Result, Syscalls,
    UTrapframe, UserContext, UserMemory, VirtAddr, PAGE_SIZE,
};
use cowfork_memory::DEFAULT_LAYOUT;

use crate::abort;

/// Installs `handler` as the calling process's page-fault handler.
///
/// The first installation also backs the process's exception stack with a
/// fresh page; later calls only re-register the entry point.
pub fn set_pgfault_handler<S>(ctx: &S, handler: fn(&dyn UserContext, &UTrapframe)) -> Result<()>
where
    S: Syscalls + ?Sized,
{
    let info = ctx.env_info(EnvId::CURRENT).context(Primitive::EnvInfo)?;
    if info.pgfault_upcall.is_none() {
        ctx.page_alloc(EnvId::CURRENT, DEFAULT_LAYOUT.exception_stack(), PteFlags::USER_RW)
            .context(Primitive::PageAlloc)?;
    }
    ctx.env_set_pgfault_upcall(EnvId::CURRENT, PgFaultUpcall(handler))
        .context(Primitive::SetPgfaultUpcall)
}

/// Decides whether a fault is an expected copy-on-write fault.
///
/// Returns the page to materialize: the fault must be a write to a present
/// page carrying the COW bit.
pub fn classify_fault<M>(mirror: &M, utf: &UTrapframe) -> Result<VirtAddr>
where
    M: PageTableMirror + ?Sized,
{
    let va = utf.fault_va;
    let pte = mirror.pte_at(va);
    if utf.is_write() && pte.is_present() && pte.is_cow() {
        Ok(va.page_round_down())
    } else {
        Err(Error::UnexpectedFault { va, err: utf.err, pte })
    }
}

/// The copy-on-write page-fault handler.
///
/// Copies the faulting page into a fresh frame through the scratch page and
/// remaps it writable in place. Anything unexpected aborts the process.
pub fn pgfault(ctx: &dyn UserContext, utf: &UTrapframe) {
    if let Err(err) = materialize(ctx, utf) {
        abort("pgfault", &err);
    }
}

fn materialize(ctx: &dyn UserContext, utf: &UTrapframe) -> Result<()> {
    let addr = classify_fault(ctx, utf)?;
    let scratch = DEFAULT_LAYOUT.pftemp;

    ctx.page_alloc(EnvId::CURRENT, scratch, PteFlags::USER_RW)
        .context(Primitive::PageAlloc)?;
    let mut page = [0u8; PAGE_SIZE];
    ctx.load(addr, &mut page);
    ctx.store(scratch, &page);
    ctx.page_map(EnvId::CURRENT, scratch, EnvId::CURRENT, addr, PteFlags::USER_RW)
        .context(Primitive::PageMap)?;
    ctx.page_unmap(EnvId::CURRENT, scratch).context(Primitive::PageUnmap)?;

    log::trace!("[{}] copied {} on write", ctx.getenvid(), addr);
    Ok(())
}
