//! Trusted-boundary syscall interface

pub mod interface;
