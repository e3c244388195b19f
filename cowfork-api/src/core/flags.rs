//! Page-table entry permission bits and page-fault error codes
//!
//! Bit values match the x86 two-level page table. `COW` lives in the
//! `AVAIL` bits, which the hardware and the trusted boundary's own fault
//! classification never interpret.

use core::fmt;

bitflags::bitflags! {
    /// Page-table entry permission bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PteFlags: u32 {
        /// Present
        const PRESENT = 0x001;
        /// Writeable
        const WRITABLE = 0x002;
        /// User accessible
        const USER = 0x004;
        /// Write-through
        const WRITE_THROUGH = 0x008;
        /// Cache-disable
        const CACHE_DISABLE = 0x010;
        /// Accessed
        const ACCESSED = 0x020;
        /// Dirty
        const DIRTY = 0x040;
        /// Page size (directory level only)
        const HUGE = 0x080;
        /// Global
        const GLOBAL = 0x100;
        /// Bits available for software use
        const AVAIL = 0xE00;
        /// Copy-on-write marker, drawn from AVAIL
        const COW = 0x800;
        /// Only these bits may be passed to a mapping syscall
        const SYSCALL = Self::AVAIL.bits() | Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::USER.bits();
    }
}

impl PteFlags {
    /// Present and user accessible, read-only.
    pub const USER_READ: PteFlags = PteFlags::USER.union(PteFlags::PRESENT);
    /// Present, user accessible and writable.
    pub const USER_RW: PteFlags = PteFlags::USER_READ.union(PteFlags::WRITABLE);
    /// Present, user accessible, read-only and copy-on-write.
    pub const USER_COW: PteFlags = PteFlags::USER_READ.union(PteFlags::COW);

    /// Whether the entry is present.
    pub const fn is_present(self) -> bool {
        self.contains(PteFlags::PRESENT)
    }

    /// Whether the entry is writable.
    pub const fn is_writable(self) -> bool {
        self.contains(PteFlags::WRITABLE)
    }

    /// Whether the entry is user accessible.
    pub const fn is_user(self) -> bool {
        self.contains(PteFlags::USER)
    }

    /// Whether the entry carries the copy-on-write marker.
    pub const fn is_cow(self) -> bool {
        self.contains(PteFlags::COW)
    }
}

impl fmt::Display for PteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P: {} W: {} U: {} COW: {}",
            self.is_present() as u8,
            self.is_writable() as u8,
            self.is_user() as u8,
            self.is_cow() as u8
        )
    }
}

bitflags::bitflags! {
    /// Page-fault error code pushed by the trusted boundary
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FaultErr: u32 {
        /// Protection violation; the page was present
        const PROTECTION = 0x1;
        /// The faulting access was a write
        const WRITE = 0x2;
        /// The fault happened in user mode
        const USER = 0x4;
    }
}
