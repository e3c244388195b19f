//! Shared fork
//!
//! The child shares the parent's pages outright, with the parent's own
//! permissions, except for two pages: the normal stack page just below the
//! stack top is shared copy-on-write, and the exception stack is copied into
//! a private page of the child's. The address range is partitioned up front
//! and each part gets its own policy.

use cowfork_api::{
    EnvId, EnvStatus, ErrorContext, MirrorExt, PageNum, Primitive, PteFlags, Result, UserContext, VirtAddr,
    PAGE_SIZE,
};
use cowfork_memory::{walk_mapped, AddressSpaceLayout, PageRange, DEFAULT_LAYOUT};

use crate::duppage::duppage;
use crate::fork::{arm_child, enter_child, Fork};
use crate::pgfault::{pgfault, set_pgfault_handler};

/// Where a page falls in the shared-fork partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Not duplicated at all: below the text segment or above UTOP
    Skipped,
    /// Shared with the parent's permissions
    Shared,
    /// The stack page, shared copy-on-write
    CowStack,
    /// The exception stack, copied into a fresh page
    ExceptionStack,
}

/// The shared-fork partition of the user address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedForkPlan {
    /// Page ranges shared outright: text to the stack page, and the guard
    /// page between the two stacks
    pub shared: [PageRange; 2],
    /// Normal stack page
    pub cow_stack: PageNum,
    /// Exception stack page
    pub exception_stack: PageNum,
}

impl SharedForkPlan {
    /// Partitions `layout`
    pub const fn new(layout: &AddressSpaceLayout) -> Self {
        let cow_stack = layout.stack_page().page_number();
        let exception_stack = layout.exception_stack().page_number();
        Self {
            shared: [
                PageRange::new(layout.utext.page_number(), cow_stack),
                PageRange::new(cow_stack + 1, exception_stack),
            ],
            cow_stack,
            exception_stack,
        }
    }

    /// Which part page `pn` belongs to
    pub fn region(&self, pn: PageNum) -> Region {
        if pn == self.cow_stack {
            Region::CowStack
        } else if pn == self.exception_stack {
            Region::ExceptionStack
        } else if self.shared.iter().any(|range| range.contains(pn)) {
            Region::Shared
        } else {
            Region::Skipped
        }
    }
}

impl Default for SharedForkPlan {
    fn default() -> Self {
        Self::new(&DEFAULT_LAYOUT)
    }
}

/// Forks sharing memory with the child; only the stacks are kept apart.
///
/// Failures are returned to the caller. A child left half-built by a failure
/// is never marked runnable.
pub fn sfork<C>(ctx: &C) -> Result<Fork>
where
    C: UserContext + ?Sized,
{
    shared_fork(ctx)
}

pub(crate) fn shared_fork<C>(ctx: &C) -> Result<Fork>
where
    C: UserContext + ?Sized,
{
    set_pgfault_handler(ctx, pgfault)?;
    let child = ctx.exofork().context(Primitive::Exofork)?;
    if child.is_current() {
        return Ok(enter_child(ctx));
    }

    let plan = SharedForkPlan::default();
    let mut shared = 0;
    for range in plan.shared {
        shared += walk_mapped(ctx, range, |pn, pte| share_page(ctx, child, pn, pte))?;
    }
    if ctx.test_user(VirtAddr::from_page(plan.cow_stack)) {
        duppage(ctx, child, plan.cow_stack)?;
    }

    arm_child(ctx, child)?;
    copy_exception_stack(ctx, child, VirtAddr::from_page(plan.exception_stack))?;
    ctx.env_set_status(child, EnvStatus::Runnable)
        .context(Primitive::SetStatus)?;

    log::info!("[{}] sfork -> {}: {} pages shared", ctx.getenvid(), child, shared);
    Ok(Fork::Parent(child))
}

fn share_page<C>(ctx: &C, child: EnvId, pn: PageNum, pte: PteFlags) -> Result<()>
where
    C: UserContext + ?Sized,
{
    let va = VirtAddr::from_page(pn);
    ctx.page_map(EnvId::CURRENT, va, child, va, pte & PteFlags::SYSCALL)
        .context(Primitive::PageMap)
}

/// Copies the caller's exception stack into the child's, through the scratch page
fn copy_exception_stack<C>(ctx: &C, child: EnvId, xstack: VirtAddr) -> Result<()>
where
    C: UserContext + ?Sized,
{
    let scratch = DEFAULT_LAYOUT.pftemp;
    ctx.page_map(child, xstack, EnvId::CURRENT, scratch, PteFlags::USER_RW)
        .context(Primitive::PageMap)?;
    let mut page = [0u8; PAGE_SIZE];
    ctx.load(xstack, &mut page);
    ctx.store(scratch, &page);
    ctx.page_unmap(EnvId::CURRENT, scratch).context(Primitive::PageUnmap)
}
