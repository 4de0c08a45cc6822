use super::layout::{CgroupLayout, ContainerCgroup};

/// Finds container cgroups below the parent directory of a [`CgroupLayout`].
#[derive(Debug, Clone)]
pub struct Scanner {
    layout: CgroupLayout,
}

impl Scanner {
    pub fn new(layout: CgroupLayout) -> Self {
        Self { layout }
    }

    /// Lists the container cgroups currently present, ordered by container id.
    ///
    /// A missing parent directory (no container started yet) yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the parent directory exists but cannot be listed.
    pub fn scan(&self) -> std::io::Result<Vec<ContainerCgroup>> {
        let dir = self.layout.containers_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("container cgroup parent `{}` does not exist", dir.display());
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(cgroup) = self.layout.container_from_dir_name(&entry.file_name()) {
                found.push(cgroup);
            }
        }
        found.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    const ID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ID_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn v2_layout(root: &Path) -> CgroupLayout {
        CgroupLayout::V2 {
            root: root.to_path_buf(),
            parent: "system.slice".to_owned(),
        }
    }

    #[test]
    fn test_scan_v2_scopes() {
        let root = tempfile::tempdir().unwrap();
        let parent = root.path().join("system.slice");
        std::fs::create_dir_all(parent.join(format!("libpod-{ID_B}.scope"))).unwrap();
        std::fs::create_dir_all(parent.join(format!("docker-{ID_A}.scope"))).unwrap();
        std::fs::create_dir_all(parent.join("sshd.service")).unwrap();
        std::fs::create_dir_all(parent.join(format!("docker-{ID_A}.mount"))).unwrap();
        std::fs::write(parent.join(format!("docker-{ID_B}.scope.txt")), "").unwrap();

        let found = Scanner::new(v2_layout(root.path())).scan().unwrap();
        let ids: Vec<&str> = found.iter().map(|cgroup| cgroup.id.as_ref()).collect();
        assert_eq!(ids, vec![ID_A, ID_B]);
        assert_eq!(
            found[1].perf_scope,
            parent.join(format!("libpod-{ID_B}.scope"))
        );
    }

    #[test]
    fn test_scan_v1_ids() {
        let root = tempfile::tempdir().unwrap();
        let perf_event = root.path().join("perf_event");
        let cpuacct = root.path().join("cpu,cpuacct");
        std::fs::create_dir_all(perf_event.join("docker").join(ID_A)).unwrap();
        std::fs::create_dir_all(perf_event.join("docker").join("not-a-container")).unwrap();

        let layout = CgroupLayout::V1 {
            perf_event,
            cpuacct,
            parent: "docker".to_owned(),
        };
        let found = Scanner::new(layout).scan().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_ref(), ID_A);
    }

    #[test]
    fn test_scan_missing_parent() {
        let root = tempfile::tempdir().unwrap();
        let found = Scanner::new(v2_layout(root.path())).scan().unwrap();
        assert!(found.is_empty());
    }
}
