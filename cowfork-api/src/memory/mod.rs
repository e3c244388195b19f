//! Memory management abstractions

pub mod interface;
