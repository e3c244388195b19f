//! cowfork Memory Management
//!
//! This crate provides the memory model the trusted boundary keeps for every
//! environment: the user address-space layout, a reference-counted pool of
//! physical frames, and a page-table arena addressed by page number.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

// Re-export API types
pub use cowfork_api::{EnvId, PageNum, PhysAddr, PteFlags, VirtAddr, PAGE_SHIFT, PAGE_SIZE};

// Memory management modules
pub mod physical;
pub mod virtual_mem;
pub mod page_table;
pub mod layout;

// Re-export commonly used types and functions
pub use physical::{FramePool, FrameStats};
pub use virtual_mem::{walk_mapped, PageRange};
pub use page_table::{PageTable, Pte};
pub use layout::{AddressSpaceLayout, DEFAULT_LAYOUT};
