//! Memory management interface

use crate::core::flags::PteFlags;
use crate::core::types::{EnvId, PageNum, VirtAddr, PAGE_SHIFT};

/// Entries per page directory / page table
pub const NPTENTRIES: usize = 1024;

/// Read-only view of the calling environment's own page tables
pub trait PageTableMirror {
    /// Whether page-directory slot `pdx` (4MB of address space) has a table
    fn pde_present(&self, pdx: usize) -> bool;

    /// Permission bits of page `pn`, empty when nothing is mapped
    fn pte(&self, pn: PageNum) -> PteFlags;
}

/// Address-level queries over a [`PageTableMirror`]
pub trait MirrorExt: PageTableMirror {
    /// Permission bits of the page holding `va`, consulting the directory first.
    fn pte_at(&self, va: VirtAddr) -> PteFlags {
        if self.pde_present(pdx(va)) {
            self.pte(va.page_number())
        } else {
            PteFlags::empty()
        }
    }

    /// Whether the page holding `va` is present.
    fn test_present(&self, va: VirtAddr) -> bool {
        self.pte_at(va).is_present()
    }

    /// Whether the page holding `va` is present and writable.
    fn test_writable(&self, va: VirtAddr) -> bool {
        let pte = self.pte_at(va);
        pte.is_present() && pte.is_writable()
    }

    /// Whether the page holding `va` is present and user accessible.
    fn test_user(&self, va: VirtAddr) -> bool {
        let pte = self.pte_at(va);
        pte.is_present() && pte.is_user()
    }

    /// Whether the page holding `va` is present and marked copy-on-write.
    fn test_cow(&self, va: VirtAddr) -> bool {
        let pte = self.pte_at(va);
        pte.is_present() && pte.is_cow()
    }
}

impl<T: PageTableMirror + ?Sized> MirrorExt for T {}

/// Loads and stores through the calling environment's MMU.
///
/// Like ordinary instructions these never return an error: an access that
/// faults is dispatched to the environment's fault handler, and an access
/// that cannot be satisfied terminates the environment.
pub trait UserMemory {
    /// Copies `buf.len()` bytes starting at `va` into `buf`
    fn load(&self, va: VirtAddr, buf: &mut [u8]);

    /// Copies `data` to memory starting at `va`
    fn store(&self, va: VirtAddr, data: &[u8]);

    /// Reads a little-endian 32-bit word.
    fn load_u32(&self, va: VirtAddr) -> u32 {
        let mut word = [0u8; 4];
        self.load(va, &mut word);
        u32::from_le_bytes(word)
    }

    /// Writes a little-endian 32-bit word.
    fn store_u32(&self, va: VirtAddr, value: u32) {
        self.store(va, &value.to_le_bytes());
    }
}

/// Process-local library state that lives in the environment's own memory
pub trait ProcessLocal {
    /// The environment this process believes it is
    fn thisenv(&self) -> EnvId;

    /// Updates the process's idea of its own identity
    fn set_thisenv(&self, env: EnvId);
}

/// Page-directory index of a page number.
#[inline]
pub const fn pdx_of_page(pn: PageNum) -> usize {
    pn / NPTENTRIES
}

/// First page number covered by directory slot `pdx`.
#[inline]
pub const fn first_page_of_pdx(pdx: usize) -> PageNum {
    pdx * NPTENTRIES
}

/// Page-directory index of a virtual address.
#[inline]
pub const fn pdx(va: VirtAddr) -> usize {
    va.as_usize() >> (PAGE_SHIFT + 10)
}
