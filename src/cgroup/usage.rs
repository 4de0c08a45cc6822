use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use super::layout::CpuUsageFile;
use super::stats::{CpuStat, CpuacctUsage, HostCpuTotals, KeyValueStat, SingleLineStat};
use super::utils;
use crate::fsutil::{self, FileOpenError};

/// Brings `/proc/stat` clock ticks into the same magnitude as cgroup nanoseconds.
pub const HOST_TICK_SCALE: u64 = 10_000_000;

/// An open handle to a container's cumulative CPU time counter.
///
/// The file stays open for the container's lifetime and is rewound after every read.
#[derive(Debug)]
pub struct CpuUsageReader {
    reader: BufReader<File>,
    format: UsageFormat,
}

#[derive(Debug, Clone, Copy)]
enum UsageFormat {
    Cpuacct,
    CpuStat,
}

impl CpuUsageReader {
    /// Opens the usage file.
    ///
    /// # Errors
    ///
    /// Returns a [`FileOpenError`] if the file cannot be opened.
    pub fn open(file: &CpuUsageFile) -> Result<Self, FileOpenError> {
        let format = match file {
            CpuUsageFile::Cpuacct(_) => UsageFormat::Cpuacct,
            CpuUsageFile::CpuStat(_) => UsageFormat::CpuStat,
        };
        Ok(Self {
            reader: fsutil::open_file_reader(file.path())?,
            format,
        })
    }

    /// Reads the cumulative CPU time of the container in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading or parsing the file fails.
    pub fn read_ns(&mut self) -> std::io::Result<u64> {
        match self.format {
            UsageFormat::Cpuacct => {
                utils::read_and_rewind(&mut self.reader, CpuacctUsage::from_reader)
                    .map(|usage| usage.usage_ns)
            }
            UsageFormat::CpuStat => utils::read_and_rewind(&mut self.reader, CpuStat::from_reader)
                .map(|stat| stat.usage_ns()),
        }
    }
}

/// The host-wide CPU accounting file, `/proc/stat`.
///
/// Unlike [`CpuUsageReader`] no handle is kept: every read opens the file anew, so any
/// number of samplers may read it concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCpuSource {
    path: PathBuf,
}

impl HostCpuSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the sum of the aggregate `cpu` line multiplied by [`HOST_TICK_SCALE`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or holds no line.
    pub fn read_scaled(&self) -> std::io::Result<u64> {
        let mut reader = fsutil::open_file_reader(&self.path)
            .map_err(|err| std::io::Error::new(err.source.kind(), err))?;
        let totals = HostCpuTotals::from_reader(&mut reader)?;
        Ok(totals.total.saturating_mul(HOST_TICK_SCALE))
    }
}

impl Default for HostCpuSource {
    fn default() -> Self {
        Self::new("/proc/stat")
    }
}
