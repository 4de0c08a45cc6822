//! Parsers for the kernel accounting files the CPU usage poller reads.
//!
//! # Main types
//!
//! - [`CpuacctUsage`]: cumulative CPU time of a cgroup v1 `cpuacct` group, in nanoseconds.
//! - [`CpuStat`]: the cgroup v2 `cpu.stat` file, whose `usage_usec` is the v2 counterpart.
//! - [`HostCpuTotals`]: the aggregate `cpu` line of `/proc/stat`.
//!
//! Each parser implements either [`KeyValueStat`] or [`SingleLineStat`], so callers can
//! drive them through the same `from_reader` entry point.

mod cpu;
mod error;
mod parser;

pub use cpu::{CpuStat, CpuacctUsage, HostCpuTotals};
pub use error::StatParseError;
pub use parser::{KeyValueStat, SingleLineStat};
pub(crate) use parser::parse_single_value;
