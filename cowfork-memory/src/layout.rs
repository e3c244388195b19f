//! User address space layout definitions
//!
//! ```text
//!    KERNBASE -----> +------------------------------+ 0xf0000000
//!                    |  kernel (not user visible)   |
//!    UVPT ---------> +------------------------------+ 0xef400000
//!                    |  read-only page-table mirror |
//!    UTOP,UENVS ---> +------------------------------+ 0xeec00000
//!    UXSTACKTOP -/   |     user exception stack     | PGSIZE
//!                    +------------------------------+ 0xeebff000
//!                    |         guard page           | PGSIZE
//!    USTACKTOP  ---> +------------------------------+ 0xeebfe000
//!                    |      normal user stack       | PGSIZE
//!                    +------------------------------+ 0xeebfd000
//!                    |   program data, heap, text   |
//!    UTEXT --------> +------------------------------+ 0x00800000
//!    PFTEMP -------> |  fault handler scratch page  | 0x007ff000
//!                    |                              |
//!    UTEMP --------> +------------------------------+ 0x00400000
//!                    |        empty memory          |
//!    0 ------------> +------------------------------+
//! ```

use cowfork_api::{PageNum, VirtAddr, PAGE_SIZE};
use static_assertions::const_assert;

/// Bytes mapped by one page-directory entry
pub const PTSIZE: usize = PAGE_SIZE * 1024;

/// Start of the kernel's half of the address space
pub const KERNBASE: usize = 0xf000_0000;
/// Read-only page-table mirror
pub const UVPT: usize = 0xef40_0000;
/// Read-only copy of the environment table
pub const UENVS: usize = 0xeec0_0000;
/// Top of user-mappable memory
pub const UTOP: usize = UENVS;
/// Top of the one-page user exception stack
pub const UXSTACKTOP: usize = UTOP;
/// Top of the normal user stack; one guard page below the exception stack
pub const USTACKTOP: usize = UTOP - 2 * PAGE_SIZE;
/// Where program text starts
pub const UTEXT: usize = 2 * PTSIZE;
/// Scratch region for temporary mappings
pub const UTEMP: usize = PTSIZE;
/// Scratch page used by the page-fault handler
pub const PFTEMP: usize = UTEMP + PTSIZE - PAGE_SIZE;

const_assert!(PFTEMP < UTEXT);
const_assert!(UTEXT < USTACKTOP);
const_assert!(USTACKTOP < UXSTACKTOP);
const_assert!(UXSTACKTOP <= UTOP);
const_assert!(UTOP < UVPT);
const_assert!(UVPT < KERNBASE);
const_assert!(PFTEMP % PAGE_SIZE == 0);

/// Named user address-space regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpaceLayout {
    /// Scratch page for the fault handler
    pub pftemp: VirtAddr,
    /// First text page
    pub utext: VirtAddr,
    /// Top of the normal stack (exclusive)
    pub ustacktop: VirtAddr,
    /// Top of the exception stack (exclusive)
    pub uxstacktop: VirtAddr,
    /// Top of user-mappable memory (exclusive)
    pub utop: VirtAddr,
    /// Read-only page-table mirror
    pub uvpt: VirtAddr,
    /// Kernel base
    pub kernbase: VirtAddr,
}

/// The layout every environment uses
pub const DEFAULT_LAYOUT: AddressSpaceLayout = AddressSpaceLayout {
    pftemp: VirtAddr::new(PFTEMP),
    utext: VirtAddr::new(UTEXT),
    ustacktop: VirtAddr::new(USTACKTOP),
    uxstacktop: VirtAddr::new(UXSTACKTOP),
    utop: VirtAddr::new(UTOP),
    uvpt: VirtAddr::new(UVPT),
    kernbase: VirtAddr::new(KERNBASE),
};

impl Default for AddressSpaceLayout {
    fn default() -> Self {
        DEFAULT_LAYOUT
    }
}

impl AddressSpaceLayout {
    /// Bottom page of the exception stack
    #[inline]
    pub const fn exception_stack(&self) -> VirtAddr {
        VirtAddr::new(self.uxstacktop.as_usize() - PAGE_SIZE)
    }

    /// Page of the normal stack immediately below its top
    #[inline]
    pub const fn stack_page(&self) -> VirtAddr {
        VirtAddr::new(self.ustacktop.as_usize() - PAGE_SIZE)
    }

    /// Whether `va` may be mapped by a syscall
    #[inline]
    pub const fn is_user_mappable(&self, va: VirtAddr) -> bool {
        va.as_usize() < self.utop.as_usize()
    }

    /// First page number at or above `utop`
    #[inline]
    pub const fn utop_page(&self) -> PageNum {
        self.utop.page_number()
    }

    /// Named regions, top down, for display
    pub fn regions(&self) -> [(&'static str, VirtAddr); 7] {
        [
            ("KERNBASE", self.kernbase),
            ("UVPT", self.uvpt),
            ("UTOP", self.utop),
            ("UXSTACKTOP", self.uxstacktop),
            ("USTACKTOP", self.ustacktop),
            ("UTEXT", self.utext),
            ("PFTEMP", self.pftemp),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(UTOP, 0xeec0_0000);
        assert_eq!(USTACKTOP, 0xeebf_e000);
        assert_eq!(UTEXT, 0x0080_0000);
        assert_eq!(PFTEMP, 0x007f_f000);
    }

    #[test]
    fn test_stack_pages() {
        let layout = AddressSpaceLayout::default();
        assert_eq!(layout.exception_stack(), VirtAddr::new(0xeebf_f000));
        assert_eq!(layout.stack_page(), VirtAddr::new(0xeebf_d000));
        assert!(layout.is_user_mappable(layout.exception_stack()));
        assert!(!layout.is_user_mappable(layout.utop));
    }
}
