//! Access to grouped per-CPU hardware performance counters.
//!
//! The [`PerfEventSource`] trait is the seam between the sampling engine and the kernel.
//! [`SyscallSource`] implements it on top of `perf_event_open(2)`, scoping every counter to
//! a cgroup.

mod error;
mod linux;

use std::os::fd::BorrowedFd;

use crate::catalog::CounterSpec;

pub use error::{Error, Result};
pub use linux::{SyscallSource, online_cpus};

/// One read of a counter group on one CPU.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupReading {
    /// Raw counter values, ordered like the counters were added to the group.
    pub values: Vec<u64>,
    /// Time (ns) the group was enabled.
    pub time_enabled: u64,
    /// Time (ns) the group was actually scheduled on the PMU.
    pub time_running: u64,
}

/// Opens, starts and reads hardware counter groups.
///
/// Implementations must be shareable across threads, as separate containers are sampled in
/// parallel. Descriptors are owned by the caller and handed back through [`close`].
///
/// [`close`]: PerfEventSource::close
pub trait PerfEventSource: Send + Sync {
    type Descriptor: Send + Sync;

    /// Opens the leader of a new, disabled group counting `spec` for all tasks of the
    /// cgroup referred to by `scope` while they run on `cpu`.
    fn open_leader(
        &self,
        scope: BorrowedFd<'_>,
        cpu: usize,
        spec: &CounterSpec,
    ) -> Result<Self::Descriptor>;

    /// Opens a counter for `spec` joined to the group of `leader`.
    fn open_follower(
        &self,
        leader: &Self::Descriptor,
        scope: BorrowedFd<'_>,
        cpu: usize,
        spec: &CounterSpec,
    ) -> Result<Self::Descriptor>;

    /// Starts counting on a single descriptor.
    fn activate(&self, descriptor: &Self::Descriptor) -> Result<()>;

    /// Reads all `len` counters of the group led by `leader` in one go.
    fn read_group(&self, leader: &Self::Descriptor, len: usize) -> Result<GroupReading>;

    /// Releases a descriptor.
    fn close(&self, descriptor: Self::Descriptor);
}
