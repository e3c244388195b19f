//! cowfork Kernel
//!
//! A host-side simulation of the trusted boundary the fork library runs on.
//! It keeps one page-table arena per environment over a shared pool of
//! reference-counted frames, enforces the argument rules of the page and
//! environment syscalls, and routes faulting loads and stores to the
//! environment's registered page-fault upcall on its exception stack.
//!
//! # Architecture
//!
//! - **Kernel**: environment table, frame pool and the `run` entry point
//! - **Syscall**: page and environment primitives with their checks
//! - **Trap**: the MMU access path and page-fault dispatch
//! - **User**: [`UserEnv`], the handle user code issues syscalls through
//! - **Monitor**: interactive address-space inspection
//!
//! # Usage
//!
//! ```rust
//! use cowfork_kernel::{Kernel, KernelConfig};
//! use cowfork_api::{Syscalls, UserMemory, VirtAddr, PteFlags, EnvId};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let env = kernel.create_env().expect("root environment");
//! let value = kernel
//!     .run(env, |ctx| {
//!         let va = VirtAddr::new(0x0080_0000);
//!         ctx.page_alloc(EnvId::CURRENT, va, PteFlags::USER_RW).expect("page");
//!         ctx.store_u32(va, 7);
//!         ctx.load_u32(va)
//!     })
//!     .expect("ran");
//! assert_eq!(value, 7);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod env;
pub mod kernel;
pub mod monitor;
pub mod stats;
pub mod syscall;
pub mod trap;
pub mod user;

pub use config::KernelConfig;
pub use env::Env;
pub use kernel::{Kernel, RunError};
pub use monitor::Monitor;
pub use stats::KernelStats;
pub use user::UserEnv;
