//! Core types and permission bits

pub mod flags;
pub mod types;
