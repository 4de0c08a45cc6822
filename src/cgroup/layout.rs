use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::container::ContainerID;
use crate::fsutil::reroot;
use crate::mountinfo::CgroupMounts;

/// Default parent cgroup of docker containers on a v1 host.
const V1_DEFAULT_PARENT: &str = "docker";
/// Default parent cgroup of docker containers on a systemd managed v2 host.
const V2_DEFAULT_PARENT: &str = "system.slice";

/// Runtime specific prefixes of container scopes in the unified hierarchy.
const V2_SCOPE_PREFIXES: [&str; 3] = ["docker-", "cri-containerd-", "libpod-"];
const V2_SCOPE_SUFFIX: &str = ".scope";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no usable cgroup hierarchy mounted")]
    NoHierarchy,
}

/// Where the per-container cgroups live on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupLayout {
    /// Legacy hierarchy with separate `perf_event` and `cpuacct` controllers.
    V1 {
        perf_event: PathBuf,
        cpuacct: PathBuf,
        parent: String,
    },
    /// Unified hierarchy.
    V2 { root: PathBuf, parent: String },
}

/// The file holding a container's cumulative CPU time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuUsageFile {
    /// `cpuacct.usage`, nanoseconds.
    Cpuacct(PathBuf),
    /// `cpu.stat`, whose `usage_usec` is reported in microseconds.
    CpuStat(PathBuf),
}

impl CpuUsageFile {
    pub fn path(&self) -> &Path {
        match self {
            CpuUsageFile::Cpuacct(path) | CpuUsageFile::CpuStat(path) => path,
        }
    }
}

/// Resolved cgroup paths of a single container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCgroup {
    pub id: ContainerID,
    /// Directory whose descriptor scopes perf counters to the container's tasks.
    pub perf_scope: PathBuf,
    pub cpu_usage: CpuUsageFile,
    /// File listing every thread of the container, one id per line.
    pub tasks: PathBuf,
}

impl CgroupLayout {
    /// Picks a layout from the detected mounts, preferring the v1 controllers when both are
    /// present (hybrid hosts keep controllers on v1).
    ///
    /// Mount points are re-rooted under `rootfs`. `parent` overrides the default parent
    /// cgroup of containers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoHierarchy`] if neither hierarchy is usable.
    pub fn from_mounts(
        mounts: &CgroupMounts,
        rootfs: &Path,
        parent: Option<&str>,
    ) -> Result<Self, Error> {
        if let (Some(perf_event), Some(cpuacct)) = (&mounts.perf_event, &mounts.cpuacct) {
            return Ok(CgroupLayout::V1 {
                perf_event: reroot(rootfs, perf_event),
                cpuacct: reroot(rootfs, cpuacct),
                parent: parent.unwrap_or(V1_DEFAULT_PARENT).to_owned(),
            });
        }
        if let Some(root) = &mounts.unified {
            return Ok(CgroupLayout::V2 {
                root: reroot(rootfs, root),
                parent: parent.unwrap_or(V2_DEFAULT_PARENT).to_owned(),
            });
        }
        Err(Error::NoHierarchy)
    }

    /// The directory whose children are container cgroups.
    pub fn containers_dir(&self) -> PathBuf {
        match self {
            CgroupLayout::V1 {
                perf_event, parent, ..
            } => perf_event.join(parent),
            CgroupLayout::V2 { root, parent } => root.join(parent),
        }
    }

    /// Maps an entry of [`containers_dir`](Self::containers_dir) to a container, if its name
    /// follows the naming scheme of this layout.
    pub fn container_from_dir_name(&self, name: &OsStr) -> Option<ContainerCgroup> {
        let name = name.to_str()?;
        let raw_id = match self {
            CgroupLayout::V1 { .. } => name,
            CgroupLayout::V2 { .. } => {
                let stem = name.strip_suffix(V2_SCOPE_SUFFIX)?;
                V2_SCOPE_PREFIXES
                    .iter()
                    .find_map(|prefix| stem.strip_prefix(prefix))?
            }
        };
        let id = ContainerID::new(raw_id).ok()?;
        Some(self.container_cgroup(id, name))
    }

    fn container_cgroup(&self, id: ContainerID, dir_name: &str) -> ContainerCgroup {
        match self {
            CgroupLayout::V1 {
                perf_event,
                cpuacct,
                parent,
            } => {
                let perf_scope = perf_event.join(parent).join(dir_name);
                ContainerCgroup {
                    id,
                    tasks: perf_scope.join("tasks"),
                    perf_scope,
                    cpu_usage: CpuUsageFile::Cpuacct(
                        cpuacct.join(parent).join(dir_name).join("cpuacct.usage"),
                    ),
                }
            }
            CgroupLayout::V2 { root, parent } => {
                let dir = root.join(parent).join(dir_name);
                ContainerCgroup {
                    id,
                    tasks: dir.join("cgroup.threads"),
                    cpu_usage: CpuUsageFile::CpuStat(dir.join("cpu.stat")),
                    perf_scope: dir,
                }
            }
        }
    }
}
