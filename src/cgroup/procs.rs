use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::PathBuf;

use super::layout::ContainerCgroup;
use crate::fsutil::{self, FileOpenError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] FileOpenError),
    #[error("failed to read task list `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lists the OS threads currently running inside a container.
///
/// The result may be stale by the time it is used; tasks can start and exit concurrently.
pub trait ProcessEnumerator: Send + Sync {
    fn list_processes(&self, cgroup: &ContainerCgroup) -> Result<BTreeSet<u32>, Error>;
}

/// [`ProcessEnumerator`] reading the cgroup's task list file.
#[derive(Debug, Default, Clone, Copy)]
pub struct CgroupTasks;

impl ProcessEnumerator for CgroupTasks {
    fn list_processes(&self, cgroup: &ContainerCgroup) -> Result<BTreeSet<u32>, Error> {
        let reader = fsutil::open_file_reader(&cgroup.tasks)?;
        let mut pids = BTreeSet::new();

        for line in reader.lines() {
            let line = line.map_err(|source| Error::Read {
                path: cgroup.tasks.clone(),
                source,
            })?;
            if let Ok(pid) = line.trim().parse::<u32>() {
                pids.insert(pid);
            }
        }

        Ok(pids)
    }
}
