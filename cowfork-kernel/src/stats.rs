//! Kernel statistics

use std::collections::BTreeMap;

use cowfork_api::Primitive;

/// Counters kept by the trusted boundary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelStats {
    /// Syscalls issued
    pub total_syscalls: u64,
    /// Syscalls issued, by primitive
    pub calls_by_primitive: BTreeMap<Primitive, u64>,
    /// Syscalls that returned an error
    pub error_count: u64,
    /// Page faults delivered to an upcall
    pub faults_dispatched: u64,
    /// Environments created
    pub envs_created: u64,
    /// Environments aborted
    pub envs_aborted: u64,
}

impl KernelStats {
    pub(crate) fn record(&mut self, primitive: Primitive, ok: bool) {
        self.total_syscalls += 1;
        *self.calls_by_primitive.entry(primitive).or_insert(0) += 1;
        if !ok {
            self.error_count += 1;
        }
    }

    /// Calls issued for `primitive`
    pub fn calls(&self, primitive: Primitive) -> u64 {
        self.calls_by_primitive.get(&primitive).copied().unwrap_or(0)
    }
}
