//! cowfork
//!
//! User-level process duplication with copy-on-write page sharing. A child
//! is created through the trusted boundary, its address space is populated
//! by remapping the parent's frames, and private copies are made lazily by
//! the page-fault handler when either side writes a shared page.
//!
//! # Architecture
//!
//! - **pgfault**: the fault handler and its installation
//! - **duppage**: per-page sharing policy
//! - **fork**: the copy-on-write fork
//! - **sfork**: the shared fork, which copies on write only the stack
//! - **config**: which fork to run and what to do when it fails
//!
//! # Usage
//!
//! ```rust,ignore
//! use cowfork::{fork, Fork};
//!
//! match fork(ctx) {
//!     Fork::Parent(child) => log::info!("forked {}", child),
//!     Fork::Child => log::info!("hello from the child"),
//! }
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod duppage;
pub mod fork;
pub mod pgfault;
pub mod sfork;

pub use cowfork_api::{EnvId, Error, Result, UTrapframe, UserContext};
pub use config::{FailurePolicy, ForkConfig, Strategy};
pub use duppage::duppage;
pub use fork::{fork, fork_with, Fork};
pub use pgfault::{classify_fault, pgfault, set_pgfault_handler};
pub use sfork::{sfork, Region, SharedForkPlan};

/// Terminates the calling process with a diagnostic naming what failed.
///
/// The trusted boundary turns the unwind into an environment abort.
pub(crate) fn abort(what: &str, err: &Error) -> ! {
    log::error!("{}: {}", what, err);
    panic!("{}: {}", what, err)
}
