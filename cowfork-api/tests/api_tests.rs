//! API tests

use cowfork_api::*;
use proptest::prelude::*;

#[test]
fn test_sys_error_display() {
    assert_eq!(SysError::BadEnv.to_string(), "bad environment");
    assert_eq!(SysError::NoFreeEnv.code(), -5);
}

#[test]
fn test_unexpected_fault_display_names_page() {
    let err = Error::UnexpectedFault {
        va: VirtAddr::new(0x0080_0010),
        err: FaultErr::WRITE,
        pte: PteFlags::USER_READ,
    };
    let text = err.to_string();
    assert!(text.starts_with("not copy-on-write"));
    assert!(text.contains("0x00800010"));
    assert_eq!(err.code(), SysError::Fault.code());
}

#[test]
fn test_syscall_mask_keeps_software_bits() {
    let pte = PteFlags::USER_RW | PteFlags::COW | PteFlags::ACCESSED | PteFlags::DIRTY | PteFlags::from_bits_retain(0x200);
    let masked = pte & PteFlags::SYSCALL;
    assert!(masked.contains(PteFlags::COW));
    assert!(masked.contains(PteFlags::from_bits_retain(0x200)));
    assert!(!masked.contains(PteFlags::ACCESSED));
    assert!(!masked.contains(PteFlags::DIRTY));
}

proptest! {
    #[test]
    fn prop_round_down_is_aligned_and_not_above(addr in 0usize..0xf000_0000) {
        let va = VirtAddr::new(addr);
        let down = va.page_round_down();
        prop_assert!(down.is_page_aligned());
        prop_assert!(down <= va);
        prop_assert!(va.as_usize() - down.as_usize() < PAGE_SIZE);
        prop_assert_eq!(down.page_number(), va.page_number());
    }

    #[test]
    fn prop_from_page_inverts_page_number(pn in 0usize..0xf0000) {
        prop_assert_eq!(VirtAddr::from_page(pn).page_number(), pn);
    }
}
