//! Kernel configuration

/// Limits of the simulated trusted boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Environments that may exist at once
    pub max_envs: usize,
    /// Physical frames in the pool
    pub max_frames: usize,
    /// Times one access is retried after its fault was handled
    pub max_fault_retries: u32,
    /// Faults that may nest inside a running fault handler
    pub max_fault_depth: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_envs: 1024,
            max_frames: 16384,
            max_fault_retries: 4,
            max_fault_depth: 2,
        }
    }
}

impl KernelConfig {
    /// Configuration with a small frame pool, for exhaustion tests and demos
    pub fn with_frames(max_frames: usize) -> Self {
        Self {
            max_frames,
            ..Self::default()
        }
    }
}
