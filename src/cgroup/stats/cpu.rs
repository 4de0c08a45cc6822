//! Parsers for CPU time accounting.
//!
//! - `cpuacct.usage` (cgroup v1): a single line with the cumulative CPU time of the group in
//!   nanoseconds, parsed into [`CpuacctUsage`].
//! - `cpu.stat` (cgroup v2): `key value` lines; [`CpuStat`] keeps the time fields, which are
//!   in microseconds.
//! - `/proc/stat`: only the first, host-wide `cpu` line is read. [`HostCpuTotals`] sums
//!   every numeric field on it and silently skips fields that do not parse.
//!
//! # Examples
//!
//! ```rust
//! use creo_sampler::cgroup::stats::{CpuStat, HostCpuTotals, KeyValueStat, SingleLineStat};
//!
//! let stat = CpuStat::from_reader(&mut "usage_usec 1000\nuser_usec 600\n".as_bytes()).unwrap();
//! assert_eq!(stat.usage_ns(), 1_000_000);
//!
//! let host = HostCpuTotals::from_reader(&mut "cpu  10 0 5 85 0 0 0 0 0 0\n".as_bytes()).unwrap();
//! assert_eq!(host.total, 100);
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::LazyLock;

use super::parser::parse_single_value;
use super::{KeyValueStat, SingleLineStat, StatParseError};

/// Cumulative CPU time of a cgroup v1 `cpuacct` group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuacctUsage {
    pub usage_ns: u64,
}

impl SingleLineStat for CpuacctUsage {
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            usage_ns: parse_single_value(buf)?,
        })
    }
}

/// The time fields of a cgroup v2 `cpu.stat` file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuStat {
    /// Total time (in microseconds) that the cgroup used CPU (user + system).
    pub usage_usec: u64,
    /// Time (in microseconds) spent in user space.
    pub user_usec: u64,
    /// Time (in microseconds) spent in kernel space.
    pub system_usec: u64,
}

impl CpuStat {
    /// Total usage converted to nanoseconds, the unit `cpuacct.usage` reports.
    pub fn usage_ns(&self) -> u64 {
        self.usage_usec.saturating_mul(1_000)
    }

    fn set_usage_usec(&mut self, usage_usec: u64) {
        self.usage_usec = usage_usec;
    }

    fn set_user_usec(&mut self, user_usec: u64) {
        self.user_usec = user_usec;
    }

    fn set_system_usec(&mut self, system_usec: u64) {
        self.system_usec = system_usec;
    }
}

type Setter = fn(&mut CpuStat, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(3);

    m.insert("usage_usec", CpuStat::set_usage_usec);
    m.insert("user_usec", CpuStat::set_user_usec);
    m.insert("system_usec", CpuStat::set_system_usec);

    m
});

impl KeyValueStat for CpuStat {
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

/// Sum of all fields of the aggregate `cpu` line of `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCpuTotals {
    pub total: u64,
}

impl SingleLineStat for HostCpuTotals {
    /// Parses the first line of a `/proc/stat`-style reader.
    ///
    /// The leading label and any other non-numeric field are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::MissingLine`] for empty input and I/O errors from `buf`.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        if buf.read_line(&mut line)? == 0 {
            return Err(StatParseError::MissingLine { line: 1 }.into());
        }
        let total = line
            .split_whitespace()
            .filter_map(|field| field.parse::<u64>().ok())
            .fold(0u64, u64::wrapping_add);
        Ok(Self { total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::error::extract_stat_parse_error;

    #[test]
    fn test_parse_cpuacct_usage() {
        let usage = CpuacctUsage::from_reader(&mut "5200000\n".as_bytes()).unwrap();
        assert_eq!(usage.usage_ns, 5_200_000);
    }

    #[test]
    fn test_parse_invalid_cpuacct_usage() {
        let err = CpuacctUsage::from_reader(&mut "abc\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_empty_cpu_stat() {
        let stat = CpuStat::from_reader(&mut "".as_bytes()).unwrap();
        assert_eq!(stat, CpuStat::default());
    }

    #[test]
    fn test_parse_complete_cpu_stat() {
        let data = "\
usage_usec 623932088000
user_usec 421230248000
system_usec 202701840000
nr_periods 0
nr_throttled 0
throttled_usec 0
nr_bursts 0
burst_usec 0
";
        let stat = CpuStat::from_reader(&mut data.as_bytes()).unwrap();

        assert_eq!(stat.usage_usec, 623_932_088_000);
        assert_eq!(stat.user_usec, 421_230_248_000);
        assert_eq!(stat.system_usec, 202_701_840_000);
        assert_eq!(stat.usage_ns(), 623_932_088_000_000);
    }

    #[test]
    fn test_parse_invalid_cpu_stat() {
        let data = "\
invalid_line
usage_usec abc
user_usec 42
";
        let err = CpuStat::from_reader(&mut data.as_bytes()).unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidKeyValue {
                key, value, line, ..
            } => {
                assert_eq!(key, "usage_usec");
                assert_eq!(value, "abc");
                assert_eq!(*line, 2);
            }
            _ => panic!("Expected InvalidKeyValue error"),
        }
    }

    #[test]
    fn test_host_totals_sum_first_line_only() {
        let data = "\
cpu  4705 356 584 3699 23 23 0 0 0 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 23933 0
intr 1462898
";
        let host = HostCpuTotals::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(host.total, 4705 + 356 + 584 + 3699 + 23 + 23);
    }

    #[test]
    fn test_host_totals_skip_unparsable_fields() {
        let data = "cpu 10 x 20 -5 30\n";
        let host = HostCpuTotals::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(host.total, 60);
    }

    #[test]
    fn test_host_totals_empty_input() {
        let err = HostCpuTotals::from_reader(&mut "".as_bytes()).unwrap_err();
        assert!(matches!(
            extract_stat_parse_error(&err),
            StatParseError::MissingLine { line: 1 }
        ));
    }
}
