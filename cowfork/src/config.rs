//! Fork configuration

/// How the address space is duplicated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Every user page below the stack top is shared copy-on-write
    CopyOnWrite,
    /// Pages are shared outright; only the stack page is copy-on-write
    Shared,
}

impl Strategy {
    /// Name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            Strategy::CopyOnWrite => "fork",
            Strategy::Shared => "sfork",
        }
    }
}

/// What happens when a primitive fails part-way through a fork
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Terminate the calling process
    Abort,
    /// Return the error; the child is left half-built and not runnable
    Propagate,
}

/// Fork behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkConfig {
    /// Duplication strategy
    pub strategy: Strategy,
    /// Failure handling
    pub on_error: FailurePolicy,
}

impl ForkConfig {
    /// What `fork` does
    pub const COPY_ON_WRITE: Self = Self {
        strategy: Strategy::CopyOnWrite,
        on_error: FailurePolicy::Abort,
    };

    /// What `sfork` does
    pub const SHARED: Self = Self {
        strategy: Strategy::Shared,
        on_error: FailurePolicy::Propagate,
    };

    /// Same strategy, different failure policy
    pub const fn on_error(self, on_error: FailurePolicy) -> Self {
        Self { on_error, ..self }
    }
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self::COPY_ON_WRITE
    }
}
