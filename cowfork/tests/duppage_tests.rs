//! Page duplicator tests: call ordering against a mocked boundary, and
//! idempotence against a small in-memory one.

use std::cell::RefCell;
use std::collections::BTreeMap;

use cowfork::duppage;
use cowfork_api::{
    EnvId, EnvInfo, EnvStatus, Error, PageNum, PageTableMirror, PgFaultUpcall, Primitive, PteFlags, SysError,
    SysResult, Syscalls, VirtAddr,
};
use mockall::predicate::eq;
use mockall::{mock, Sequence};
use proptest::prelude::*;

mock! {
    pub Boundary {}

    impl Syscalls for Boundary {
        fn getenvid(&self) -> EnvId;
        fn exofork(&self) -> SysResult<EnvId>;
        fn page_alloc(&self, env: EnvId, va: VirtAddr, perm: PteFlags) -> SysResult<()>;
        fn page_map(
            &self,
            src_env: EnvId,
            src_va: VirtAddr,
            dst_env: EnvId,
            dst_va: VirtAddr,
            perm: PteFlags,
        ) -> SysResult<()>;
        fn page_unmap(&self, env: EnvId, va: VirtAddr) -> SysResult<()>;
        fn env_set_pgfault_upcall(&self, env: EnvId, upcall: PgFaultUpcall) -> SysResult<()>;
        fn env_set_status(&self, env: EnvId, status: EnvStatus) -> SysResult<()>;
        fn env_info(&self, env: EnvId) -> SysResult<EnvInfo>;
    }

    impl PageTableMirror for Boundary {
        fn pde_present(&self, pdx: usize) -> bool;
        fn pte(&self, pn: PageNum) -> PteFlags;
    }
}

const CHILD: EnvId = EnvId(0x1001);
const PN: PageNum = 0x802;

fn va() -> VirtAddr {
    VirtAddr::from_page(PN)
}

fn expect_cow_sequence(mock: &mut MockBoundary) {
    let mut seq = Sequence::new();
    mock.expect_page_map()
        .with(eq(EnvId::CURRENT), eq(va()), eq(CHILD), eq(va()), eq(PteFlags::USER_COW))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _, _, _| Ok(()));
    mock.expect_page_map()
        .with(eq(EnvId::CURRENT), eq(va()), eq(EnvId::CURRENT), eq(va()), eq(PteFlags::USER_COW))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _, _, _| Ok(()));
}

#[test]
fn test_writable_page_maps_child_before_downgrading_self() {
    let mut mock = MockBoundary::new();
    mock.expect_pte().with(eq(PN)).return_const(PteFlags::USER_RW);
    expect_cow_sequence(&mut mock);
    duppage(&mock, CHILD, PN).expect("duppage");
}

#[test]
fn test_cow_page_is_reestablished_in_both() {
    let mut mock = MockBoundary::new();
    mock.expect_pte().with(eq(PN)).return_const(PteFlags::USER_COW);
    expect_cow_sequence(&mut mock);
    duppage(&mock, CHILD, PN).expect("duppage");
}

#[test]
fn test_read_only_page_is_shared_without_touching_self() {
    let mut mock = MockBoundary::new();
    mock.expect_pte().with(eq(PN)).return_const(PteFlags::USER_READ);
    mock.expect_page_map()
        .with(eq(EnvId::CURRENT), eq(va()), eq(CHILD), eq(va()), eq(PteFlags::USER_READ))
        .times(1)
        .returning(|_, _, _, _, _| Ok(()));
    duppage(&mock, CHILD, PN).expect("duppage");
}

#[test]
fn test_child_mapping_failure_leaves_self_writable() {
    let mut mock = MockBoundary::new();
    mock.expect_pte().with(eq(PN)).return_const(PteFlags::USER_RW);
    mock.expect_page_map()
        .with(eq(EnvId::CURRENT), eq(va()), eq(CHILD), eq(va()), eq(PteFlags::USER_COW))
        .times(1)
        .returning(|_, _, _, _, _| Err(SysError::NoMem));
    let err = duppage(&mock, CHILD, PN).unwrap_err();
    assert_eq!(
        err,
        Error::Syscall {
            primitive: Primitive::PageMap,
            source: SysError::NoMem
        }
    );
}

#[test]
fn test_self_downgrade_failure_propagates() {
    let mut mock = MockBoundary::new();
    mock.expect_pte().with(eq(PN)).return_const(PteFlags::USER_RW);
    mock.expect_page_map()
        .with(eq(EnvId::CURRENT), eq(va()), eq(CHILD), eq(va()), eq(PteFlags::USER_COW))
        .returning(|_, _, _, _, _| Ok(()));
    mock.expect_page_map()
        .with(eq(EnvId::CURRENT), eq(va()), eq(EnvId::CURRENT), eq(va()), eq(PteFlags::USER_COW))
        .returning(|_, _, _, _, _| Err(SysError::Inval));
    assert_eq!(duppage(&mock, CHILD, PN).map_err(|err| err.code()), Err(-3));
}

/// Two address spaces keyed by page, each entry a (frame, permissions) pair
#[derive(Default)]
struct TwoSpaces {
    parent: RefCell<BTreeMap<PageNum, (usize, PteFlags)>>,
    child: RefCell<BTreeMap<PageNum, (usize, PteFlags)>>,
}

impl TwoSpaces {
    fn space(&self, env: EnvId) -> &RefCell<BTreeMap<PageNum, (usize, PteFlags)>> {
        if env.is_current() { &self.parent } else { &self.child }
    }
}

impl Syscalls for TwoSpaces {
    fn getenvid(&self) -> EnvId {
        EnvId(0x1000)
    }

    fn exofork(&self) -> SysResult<EnvId> {
        Ok(CHILD)
    }

    fn page_alloc(&self, _env: EnvId, _va: VirtAddr, _perm: PteFlags) -> SysResult<()> {
        Err(SysError::NoMem)
    }

    fn page_map(
        &self,
        src_env: EnvId,
        src_va: VirtAddr,
        dst_env: EnvId,
        dst_va: VirtAddr,
        perm: PteFlags,
    ) -> SysResult<()> {
        let (frame, flags) = self
            .space(src_env)
            .borrow()
            .get(&src_va.page_number())
            .copied()
            .ok_or(SysError::Inval)?;
        if perm.contains(PteFlags::WRITABLE) && !flags.is_writable() {
            return Err(SysError::Inval);
        }
        self.space(dst_env)
            .borrow_mut()
            .insert(dst_va.page_number(), (frame, perm));
        Ok(())
    }

    fn page_unmap(&self, env: EnvId, va: VirtAddr) -> SysResult<()> {
        self.space(env).borrow_mut().remove(&va.page_number());
        Ok(())
    }

    fn env_set_pgfault_upcall(&self, _env: EnvId, _upcall: PgFaultUpcall) -> SysResult<()> {
        Ok(())
    }

    fn env_set_status(&self, _env: EnvId, _status: EnvStatus) -> SysResult<()> {
        Ok(())
    }

    fn env_info(&self, _env: EnvId) -> SysResult<EnvInfo> {
        Err(SysError::BadEnv)
    }
}

impl PageTableMirror for TwoSpaces {
    fn pde_present(&self, pdx: usize) -> bool {
        self.parent.borrow().keys().any(|pn| pn / 1024 == pdx)
    }

    fn pte(&self, pn: PageNum) -> PteFlags {
        self.parent.borrow().get(&pn).map_or(PteFlags::empty(), |(_, flags)| *flags)
    }
}

fn present_user_flags() -> impl Strategy<Value = PteFlags> {
    (any::<bool>(), any::<bool>(), 0u32..4).prop_map(|(writable, cow, avail)| {
        let mut flags = PteFlags::USER | PteFlags::PRESENT | PteFlags::from_bits_truncate(avail << 9);
        flags.set(PteFlags::WRITABLE, writable);
        flags.set(PteFlags::COW, cow);
        flags
    })
}

proptest! {
    #[test]
    fn prop_duppage_is_idempotent(flags in present_user_flags(), pn in 0x800usize..0xeebfd) {
        let spaces = TwoSpaces::default();
        spaces.parent.borrow_mut().insert(pn, (0x5000, flags));

        duppage(&spaces, CHILD, pn).expect("first duplication");
        let once = (spaces.parent.borrow().clone(), spaces.child.borrow().clone());
        duppage(&spaces, CHILD, pn).expect("second duplication");
        let twice = (spaces.parent.borrow().clone(), spaces.child.borrow().clone());
        prop_assert_eq!(&once, &twice);

        let (parent, child) = once;
        let (parent_frame, parent_flags) = parent[&pn];
        let (child_frame, child_flags) = child[&pn];
        prop_assert_eq!(parent_frame, child_frame);
        prop_assert!(!parent_flags.is_writable());
        prop_assert!(!child_flags.is_writable());
        if flags.is_writable() || flags.is_cow() {
            prop_assert_eq!(parent_flags, PteFlags::USER_COW);
            prop_assert_eq!(child_flags, PteFlags::USER_COW);
        } else {
            prop_assert_eq!(parent_flags, flags);
            prop_assert_eq!(child_flags, PteFlags::USER_READ);
        }
    }
}
