//! Per-page duplication policy

use cowfork_api::{EnvId, ErrorContext, PageNum, PageTableMirror, Primitive, PteFlags, Result, Syscalls, VirtAddr};

/// Makes page `pn` of the calling process visible at the same address in `child`.
///
/// Writable and copy-on-write pages become copy-on-write in both processes:
/// the child's mapping is installed first, then the caller's own mapping is
/// downgraded. Read-only pages are shared read-only and the caller's mapping
/// is left alone.
pub fn duppage<S>(ctx: &S, child: EnvId, pn: PageNum) -> Result<()>
where
    S: Syscalls + PageTableMirror + ?Sized,
{
    let va = VirtAddr::from_page(pn);
    let pte = ctx.pte(pn);

    if pte.is_writable() || pte.is_cow() {
        ctx.page_map(EnvId::CURRENT, va, child, va, PteFlags::USER_COW)
            .context(Primitive::PageMap)?;
        ctx.page_map(EnvId::CURRENT, va, EnvId::CURRENT, va, PteFlags::USER_COW)
            .context(Primitive::PageMap)?;
        log::trace!("duppage {} -> {} copy-on-write", va, child);
    } else {
        ctx.page_map(EnvId::CURRENT, va, child, va, PteFlags::USER_READ)
            .context(Primitive::PageMap)?;
        log::trace!("duppage {} -> {} read-only", va, child);
    }
    Ok(())
}
