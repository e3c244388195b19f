//! cowfork API - Core interfaces and types for user-level copy-on-write fork
//!
//! This crate provides the vocabulary shared by the fork library and the
//! trusted boundary it runs on. Nothing here performs a privileged operation;
//! it only names them.
//!
//! # Architecture
//!
//! The API is organized into several key modules:
//!
//! - **Core**: Environment handles, addresses, page-table permission bits
//! - **Error**: Boundary error codes and the library error type
//! - **Syscall**: The trusted-boundary syscall interface and fault frame
//! - **Memory**: The read-only page-table mirror and user memory access
//! - **Context**: The umbrella trait a user process is driven through
//!
//! # Usage
//!
//! ```rust
//! use cowfork_api::{PteFlags, VirtAddr};
//!
//! let perm = PteFlags::USER | PteFlags::PRESENT | PteFlags::COW;
//! assert!(!perm.contains(PteFlags::WRITABLE));
//! assert!(VirtAddr::new(0x0080_0123).page_round_down().is_page_aligned());
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Core modules
pub mod core;
pub mod error;
pub mod syscall;
pub mod memory;
pub mod context;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::core::flags::{FaultErr, PteFlags};
pub use crate::error::{Error, ErrorContext, Primitive, Result, SysError, SysResult};
pub use crate::syscall::interface::{EnvInfo, PgFaultUpcall, Syscalls, UTrapframe};
pub use crate::memory::interface::{MirrorExt, PageTableMirror, ProcessLocal, UserMemory};
pub use crate::context::UserContext;
