use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Error, RdtMonitor, RdtReading, Result};
use crate::cgroup::stats::{SingleLineStat, parse_single_value};
use crate::container::ContainerID;
use crate::fsutil;

const MON_GROUPS_DIR: &str = "mon_groups";
const MON_DATA_DIR: &str = "mon_data";
const L3_DOMAIN_PREFIX: &str = "mon_L3_";

const LLC_OCCUPANCY: &str = "llc_occupancy";
const MBM_LOCAL_BYTES: &str = "mbm_local_bytes";
const MBM_TOTAL_BYTES: &str = "mbm_total_bytes";

/// A single resctrl monitoring counter file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MonitorValue(u64);

impl SingleLineStat for MonitorValue {
    fn from_reader<R: std::io::BufRead>(buf: &mut R) -> std::io::Result<Self> {
        parse_single_value(buf).map(MonitorValue)
    }
}

/// [`RdtMonitor`] backed by the resctrl filesystem (usually mounted at `/sys/fs/resctrl`).
///
/// Every container gets its own monitoring group below `mon_groups` of the default control
/// group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resctrl {
    root: PathBuf,
}

/// A monitoring group directory owned by one container.
#[derive(Debug)]
pub struct ResctrlGroup {
    id: ContainerID,
    dir: PathBuf,
}

impl ResctrlGroup {
    pub fn id(&self) -> &ContainerID {
        &self.id
    }
}

impl Resctrl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn assign_tasks(&self, dir: &Path, pids: &BTreeSet<u32>) -> Result<usize> {
        let tasks = dir.join("tasks");
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&tasks)
            .map_err(|source| Error::CreateGroup {
                path: tasks.clone(),
                source,
            })?;

        let mut assigned = 0;
        // the kernel accepts a single task id per write
        for pid in pids {
            match file.write_all(format!("{pid}\n").as_bytes()) {
                Ok(()) => assigned += 1,
                Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {
                    log::trace!("task {pid} exited before joining `{}`", dir.display());
                }
                Err(err) => {
                    log::warn!(
                        "failed to assign task {pid} to monitoring group `{}`: {err}",
                        dir.display()
                    );
                }
            }
        }
        Ok(assigned)
    }
}

impl Default for Resctrl {
    fn default() -> Self {
        Self::new("/sys/fs/resctrl")
    }
}

impl RdtMonitor for Resctrl {
    type Group = ResctrlGroup;

    fn create_group(&self, id: &ContainerID, pids: &BTreeSet<u32>) -> Result<ResctrlGroup> {
        let dir = self.root.join(MON_GROUPS_DIR).join(id.as_ref());
        match std::fs::create_dir(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                log::debug!("reusing existing monitoring group `{}`", dir.display());
            }
            Err(source) => return Err(Error::CreateGroup { path: dir, source }),
        }

        if pids.is_empty() {
            return Ok(ResctrlGroup {
                id: id.clone(),
                dir,
            });
        }

        let assigned = self.assign_tasks(&dir, pids)?;
        if assigned == 0 {
            if let Err(err) = std::fs::remove_dir(&dir) {
                log::debug!("failed to remove monitoring group `{}`: {err}", dir.display());
            }
            return Err(Error::NoTasksAssigned {
                path: dir,
                requested: pids.len(),
            });
        }
        log::debug!(
            "assigned {assigned}/{} tasks to monitoring group `{}`",
            pids.len(),
            dir.display()
        );

        Ok(ResctrlGroup {
            id: id.clone(),
            dir,
        })
    }

    fn poll(&self, group: &ResctrlGroup) -> Result<RdtReading> {
        let mon_data = group.dir.join(MON_DATA_DIR);
        let entries = std::fs::read_dir(&mon_data).map_err(|source| Error::Read {
            path: mon_data.clone(),
            source,
        })?;

        let mut reading = RdtReading::default();
        let mut total_bytes = 0u64;
        let mut domains = 0;
        for entry in entries {
            let entry = entry.map_err(|source| Error::Read {
                path: mon_data.clone(),
                source,
            })?;
            let is_l3 = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(L3_DOMAIN_PREFIX));
            if !is_l3 {
                continue;
            }

            let domain = entry.path();
            reading.llc_occupancy += read_counter(&domain.join(LLC_OCCUPANCY))?;
            reading.local_bandwidth += read_optional_counter(&domain.join(MBM_LOCAL_BYTES))?;
            total_bytes += read_optional_counter(&domain.join(MBM_TOTAL_BYTES))?;
            domains += 1;
        }

        if domains == 0 {
            return Err(Error::NoDomains { path: mon_data });
        }
        reading.remote_bandwidth = total_bytes.saturating_sub(reading.local_bandwidth);
        Ok(reading)
    }

    fn destroy_group(&self, group: ResctrlGroup) {
        if let Err(err) = std::fs::remove_dir(&group.dir) {
            log::error!(
                "failed to remove monitoring group `{}` of container {}: {err}",
                group.dir.display(),
                group.id
            );
        }
    }
}

fn read_counter(path: &Path) -> Result<u64> {
    let mut reader = fsutil::open_file_reader(path).map_err(|err| Error::Read {
        path: err.path,
        source: err.source,
    })?;
    MonitorValue::from_reader(&mut reader)
        .map(|value| value.0)
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Like [`read_counter`], but a missing file (no MBM support) reads as `0`.
fn read_optional_counter(path: &Path) -> Result<u64> {
    match read_counter(path) {
        Err(Error::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => Ok(0),
        other => other,
    }
}
