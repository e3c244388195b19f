//! Shared fork, end to end against the simulated kernel

use std::sync::Arc;

use cowfork::{fork_with, pgfault, set_pgfault_handler, sfork, FailurePolicy, Fork, ForkConfig, Region, SharedForkPlan};
use cowfork_api::{EnvId, EnvStatus, PteFlags, Syscalls, UserMemory, VirtAddr, PAGE_SIZE};
use cowfork_kernel::{Kernel, KernelConfig, RunError, UserEnv};
use cowfork_memory::layout::{USTACKTOP, UTEXT, UTOP, UXSTACKTOP};
use cowfork_memory::DEFAULT_LAYOUT;
use proptest::prelude::*;

const XSTACK_MARK: u32 = 0x5eed_5eed;

fn heap() -> VirtAddr {
    DEFAULT_LAYOUT.utext.offset(PAGE_SIZE)
}

fn alloc(ctx: &UserEnv, va: VirtAddr) {
    ctx.page_alloc(EnvId::CURRENT, va, PteFlags::USER_RW).expect("page_alloc");
}

/// Parent with a heap page, a stack page and a marked exception stack, then sfork.
fn sforked() -> (Arc<Kernel>, EnvId, EnvId) {
    let kernel = Kernel::new(KernelConfig::default());
    let parent = kernel.create_env().expect("root environment");
    let child = kernel
        .run(parent, |ctx| {
            alloc(ctx, heap());
            alloc(ctx, DEFAULT_LAYOUT.stack_page());
            ctx.store_u32(heap(), 1);
            ctx.store_u32(DEFAULT_LAYOUT.stack_page(), 2);
            set_pgfault_handler(ctx, pgfault).expect("handler");
            ctx.store_u32(DEFAULT_LAYOUT.exception_stack(), XSTACK_MARK);
            sfork(ctx)
        })
        .expect("parent ran")
        .expect("sfork")
        .child()
        .expect("parent side");
    (kernel, parent, child)
}

#[test]
fn test_heap_is_shared_without_faults() {
    let (kernel, parent, child) = sforked();

    let (parent_pa, parent_flags) = kernel.translate(parent, heap()).expect("parent heap");
    let (child_pa, child_flags) = kernel.translate(child, heap()).expect("child heap");
    assert_eq!(parent_pa, child_pa);
    assert_eq!(parent_flags, PteFlags::USER_RW);
    assert_eq!(child_flags, PteFlags::USER_RW);

    let side = kernel
        .run(child, |ctx| {
            let side = sfork(ctx).expect("child side");
            ctx.store_u32(heap(), 0xc0de);
            side
        })
        .expect("child ran");
    assert_eq!(side, Fork::Child);
    assert_eq!(kernel.run(parent, |ctx| ctx.load_u32(heap())), Ok(0xc0de));

    kernel.run(parent, |ctx| ctx.store_u32(heap(), 0xfeed)).expect("parent ran");
    assert_eq!(kernel.read_virt_u32(child, heap()), Some(0xfeed));
    assert_eq!(kernel.fault_count(parent), 0);
    assert_eq!(kernel.fault_count(child), 0);
}

#[test]
fn test_stack_page_is_copy_on_write() {
    let (kernel, parent, child) = sforked();
    let stack = DEFAULT_LAYOUT.stack_page();

    assert_eq!(kernel.translate(parent, stack).map(|(_, flags)| flags), Some(PteFlags::USER_COW));
    assert_eq!(kernel.translate(child, stack).map(|(_, flags)| flags), Some(PteFlags::USER_COW));

    kernel
        .run(child, |ctx| {
            sfork(ctx).expect("child side");
            ctx.store_u32(stack, 3);
        })
        .expect("child ran");
    assert_eq!(kernel.fault_count(child), 1);
    assert_eq!(kernel.read_virt_u32(child, stack), Some(3));
    assert_eq!(kernel.read_virt_u32(parent, stack), Some(2));
}

#[test]
fn test_exception_stack_is_copied_not_shared() {
    let (kernel, parent, child) = sforked();
    let xstack = DEFAULT_LAYOUT.exception_stack();

    let (parent_pa, _) = kernel.translate(parent, xstack).expect("parent exception stack");
    let (child_pa, child_flags) = kernel.translate(child, xstack).expect("child exception stack");
    assert_ne!(parent_pa, child_pa);
    assert_eq!(child_flags, PteFlags::USER_RW);
    assert_eq!(kernel.read_virt_u32(child, xstack), Some(XSTACK_MARK));
    assert_eq!(kernel.translate(parent, DEFAULT_LAYOUT.pftemp), None);
    assert_eq!(kernel.frame_refcount(child_pa), 1);
}

#[test]
fn test_software_bits_survive_sharing() {
    let kernel = Kernel::new(KernelConfig::default());
    let parent = kernel.create_env().expect("root environment");
    let tagged = PteFlags::USER_COW | PteFlags::from_bits_truncate(0x200);
    let child = kernel
        .run(parent, |ctx| {
            alloc(ctx, heap());
            ctx.page_map(EnvId::CURRENT, heap(), EnvId::CURRENT, heap(), tagged)
                .expect("tag page");
            sfork(ctx)
        })
        .expect("parent ran")
        .expect("sfork")
        .child()
        .expect("parent side");
    assert_eq!(kernel.translate(child, heap()).map(|(_, flags)| flags), Some(tagged));
}

#[test]
fn test_sfork_returns_errors() {
    // heap page and the parent's exception stack use both frames
    let kernel = Kernel::new(KernelConfig::with_frames(2));
    let parent = kernel.create_env().expect("root environment");
    let result = kernel
        .run(parent, |ctx| {
            alloc(ctx, heap());
            sfork(ctx)
        })
        .expect("parent survives");
    assert_eq!(result.map_err(|err| err.code()), Err(-4));

    let child = kernel.env_ids().into_iter().find(|id| *id != parent).expect("child exists");
    assert_eq!(kernel.env_status(child), Some(EnvStatus::NotRunnable));
}

#[test]
fn test_aborting_shared_fork() {
    let kernel = Kernel::new(KernelConfig::with_frames(2));
    let parent = kernel.create_env().expect("root environment");
    let config = ForkConfig::SHARED.on_error(FailurePolicy::Abort);
    let result = kernel.run(parent, |ctx| {
        alloc(ctx, heap());
        fork_with(ctx, &config)
    });
    assert!(matches!(result, Err(RunError::Aborted { .. })));
    assert_eq!(kernel.diagnostic(parent).as_deref(), Some("sfork: sys_page_alloc: out of memory"));
}

proptest! {
    #[test]
    fn prop_partition_classifies_every_page(va in 0usize..=UTOP + 0x10_0000) {
        let plan = SharedForkPlan::default();
        let pn = VirtAddr::new(va).page_number();
        let page = pn * PAGE_SIZE;
        let expected = if page == USTACKTOP - PAGE_SIZE {
            Region::CowStack
        } else if page == UXSTACKTOP - PAGE_SIZE {
            Region::ExceptionStack
        } else if (UTEXT..UXSTACKTOP - PAGE_SIZE).contains(&page) {
            Region::Shared
        } else {
            Region::Skipped
        };
        prop_assert_eq!(plan.region(pn), expected);
    }
}
