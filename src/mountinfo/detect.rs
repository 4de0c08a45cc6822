use crate::fsutil;

use super::parser::parse_mount_entry;
use super::{Error, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Mount points of the pseudo filesystems the sampler depends on.
///
/// Paths are exactly as listed in mountinfo, i.e., relative to the root of the process whose
/// mountinfo was read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupMounts {
    /// The cgroup v2 unified hierarchy.
    pub unified: Option<PathBuf>,
    /// The cgroup v1 hierarchy carrying the `perf_event` controller.
    pub perf_event: Option<PathBuf>,
    /// The cgroup v1 hierarchy carrying the `cpuacct` controller.
    pub cpuacct: Option<PathBuf>,
    /// The resctrl filesystem, if mounted.
    pub resctrl: Option<PathBuf>,
}

impl CgroupMounts {
    /// Returns true if the v1 controllers needed for sampling are both mounted.
    pub fn has_v1_controllers(&self) -> bool {
        self.perf_event.is_some() && self.cpuacct.is_some()
    }
}

/// Detects cgroup and resctrl mount points by parsing a Linux `mountinfo` file.
///
/// For each kind, the first matching entry wins.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::ReadLine`] if reading from the file fails.
/// - [`Error::Parse`] if parsing any line fails.
/// - [`Error::MissingCgroupMount`] if neither a `cgroup2` mount nor both v1 controllers are
///   found.
///
/// # Example
///
/// ```no_run
/// use creo_sampler::mountinfo::detect_cgroup_mounts;
///
/// let mounts = detect_cgroup_mounts("/proc/1/mountinfo").unwrap();
/// println!("resctrl: {:?}", mounts.resctrl);
/// ```
pub fn detect_cgroup_mounts(path: impl AsRef<Path>) -> Result<CgroupMounts> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    detect_cgroup_mounts_from_reader(buf, path)
}

fn detect_cgroup_mounts_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
) -> Result<CgroupMounts> {
    let mut mounts = CgroupMounts::default();
    let mut line = String::with_capacity(256);

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        let entry = parse_mount_entry(line.trim_end()).map_err(|source| Error::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let slot = match entry.fs_type {
            "cgroup2" => Some(&mut mounts.unified),
            "cgroup" if entry.has_super_option("perf_event") => Some(&mut mounts.perf_event),
            "cgroup" if entry.has_super_option("cpuacct") => Some(&mut mounts.cpuacct),
            "resctrl" => Some(&mut mounts.resctrl),
            _ => None,
        };
        if let Some(slot) = slot {
            if slot.is_none() {
                log::debug!(
                    "Found `{}` mount point ({}): {}",
                    entry.fs_type,
                    entry.super_options,
                    entry.mount_point
                );
                *slot = Some(PathBuf::from(entry.mount_point));
            }
        }

        line.clear();
    }

    if mounts.unified.is_none() && !mounts.has_v1_controllers() {
        return Err(Error::MissingCgroupMount {
            path: origin.to_path_buf(),
        });
    }

    Ok(mounts)
}
