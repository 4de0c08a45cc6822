//! Cache and memory bandwidth monitoring through Intel RDT / AMD PQoS.
//!
//! The sampling engine only talks to the [`RdtMonitor`] capability, so hosts without RDT
//! hardware use [`Unsupported`] while the regular backend is [`Resctrl`], the kernel's
//! resctrl filesystem.

mod resctrl;
mod unsupported;

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::container::ContainerID;

pub use resctrl::{Resctrl, ResctrlGroup};
pub use unsupported::Unsupported;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("RDT monitoring is not supported on this host")]
    Unsupported,
    #[error("failed to create monitoring group `{path}`: {source}")]
    CreateGroup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("none of the {requested} tasks could be assigned to monitoring group `{path}`")]
    NoTasksAssigned { path: PathBuf, requested: usize },
    #[error("monitoring group `{path}` exposes no L3 monitoring domains")]
    NoDomains { path: PathBuf },
    #[error("failed to read monitoring data `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// One poll of a monitoring group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RdtReading {
    /// Bytes of last-level cache currently occupied by the group. A gauge.
    pub llc_occupancy: u64,
    /// Cumulative bytes transferred to/from the local memory controller.
    pub local_bandwidth: u64,
    /// Cumulative bytes transferred to/from remote memory controllers.
    pub remote_bandwidth: u64,
}

/// Creates, polls and destroys monitoring groups bound to a set of tasks.
pub trait RdtMonitor: Send + Sync {
    type Group: Send + Sync;

    /// Creates a monitoring group for container `id` and assigns `pids` to it.
    fn create_group(&self, id: &ContainerID, pids: &BTreeSet<u32>) -> Result<Self::Group>;

    /// Reads the current values of the group.
    fn poll(&self, group: &Self::Group) -> Result<RdtReading>;

    /// Removes the group. Failures are logged, not returned.
    fn destroy_group(&self, group: Self::Group);
}
