//! Core types used throughout cowfork

use core::fmt;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;

/// Virtual page number type (address / PAGE_SIZE)
pub type PageNum = usize;

/// Align address down to page boundary
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Align address up to page boundary
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// A virtual address in some environment's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(pub usize);

impl VirtAddr {
    /// Creates a new virtual address from a raw usize value.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Address of the first byte of page `pn`.
    pub const fn from_page(pn: PageNum) -> Self {
        Self(pn << PAGE_SHIFT)
    }

    /// Returns the virtual address as a raw usize value.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the offset within the current page.
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the page number for this virtual address.
    pub const fn page_number(self) -> PageNum {
        self.0 >> PAGE_SHIFT
    }

    /// Checks if the virtual address is page-aligned.
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// Rounds up the virtual address to the next page boundary.
    pub const fn page_round_up(self) -> Self {
        Self(page_round_up(self.0))
    }

    /// Rounds down the virtual address to the previous page boundary.
    pub const fn page_round_down(self) -> Self {
        Self(page_round_down(self.0))
    }

    /// Adds a byte offset.
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<usize> for VirtAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<VirtAddr> for usize {
    fn from(addr: VirtAddr) -> Self {
        addr.0
    }
}

/// A physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub usize);

impl PhysAddr {
    /// Creates a new physical address from a raw usize value.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the physical address as a raw usize value.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the offset within the current frame.
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the frame number for this physical address.
    pub const fn frame_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Opaque environment (process) handle.
///
/// `EnvId::CURRENT` (zero) has two meanings, both inherited from the
/// syscall ABI: as an argument it names the calling environment, and as the
/// return value of `exofork` it tells a freshly created child who it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct EnvId(pub u32);

impl EnvId {
    /// The calling environment / the child's zero return.
    pub const CURRENT: EnvId = EnvId(0);

    /// Raw handle value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Whether this is the zero handle.
    pub const fn is_current(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Scheduling state of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    /// Schedulable
    Runnable,
    /// Currently executing user code
    Running,
    /// Exists but must not be scheduled (a child under construction)
    NotRunnable,
    /// Aborted; kept around with its address space for inspection
    Dying,
}

impl fmt::Display for EnvStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvStatus::Runnable => write!(f, "runnable"),
            EnvStatus::Running => write!(f, "running"),
            EnvStatus::NotRunnable => write!(f, "not runnable"),
            EnvStatus::Dying => write!(f, "dying"),
        }
    }
}
