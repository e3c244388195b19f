//! The complete view a user process has of itself and the trusted boundary

use crate::memory::interface::{PageTableMirror, ProcessLocal, UserMemory};
use crate::syscall::interface::Syscalls;

/// Everything the fork library and its fault handler need from a process.
///
/// Object safe, so the trusted boundary can hand a `&dyn UserContext` to a
/// registered fault handler.
pub trait UserContext: Syscalls + PageTableMirror + UserMemory + ProcessLocal {}

impl<T: Syscalls + PageTableMirror + UserMemory + ProcessLocal + ?Sized> UserContext for T {}
