//! Container discovery and CPU accounting through the Linux cgroup filesystem.
//!
//! This module knows where container cgroups live on a host and how to read them. It
//! supports the legacy v1 hierarchy (separate `perf_event` and `cpuacct` controllers) as
//! well as the unified v2 hierarchy.
//!
//! # Key Components
//!
//! - [`CgroupLayout`]: maps container ids to their cgroup directories and files.
//! - [`Scanner`]: lists the containers currently present below the layout's parent cgroup.
//! - [`CpuUsageReader`] and [`HostCpuSource`]: cumulative CPU time of a container and of
//!   the whole host.
//! - [`CgroupTasks`]: lists the threads inside a container.
//!
//! # Files Read
//!
//! - v1: `cpuacct.usage` and `tasks`
//! - v2: `cpu.stat` and `cgroup.threads`
//! - `/proc/stat` for the host-wide aggregate
mod layout;
pub mod procs;
mod scanner;
pub mod stats;
mod usage;
mod utils;

pub use layout::{CgroupLayout, ContainerCgroup, CpuUsageFile, Error as LayoutError};
pub use procs::{CgroupTasks, ProcessEnumerator};
pub use scanner::Scanner;
pub use usage::{CpuUsageReader, HOST_TICK_SCALE, HostCpuSource};
