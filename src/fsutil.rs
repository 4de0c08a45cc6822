use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file or directory read-only.
///
/// Directories are valid targets; the resulting handle can be passed to syscalls that take
/// a directory descriptor, e.g., a cgroup for `perf_event_open(2)`.
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the path cannot be opened.
pub fn open_file(path: impl AsRef<Path>) -> Result<File, FileOpenError> {
    let path = path.as_ref();
    File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use creo_sampler::fsutil;
/// let reader = fsutil::open_file_reader("/proc/stat")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    open_file(path).map(BufReader::new)
}

/// Maps an absolute path of the host onto the host root mounted at `rootfs`.
///
/// ```
/// # use std::path::Path;
/// # use creo_sampler::fsutil::reroot;
/// let path = reroot(Path::new("/rootfs"), Path::new("/sys/fs/cgroup"));
/// assert_eq!(path, Path::new("/rootfs/sys/fs/cgroup"));
/// ```
pub fn reroot(rootfs: &Path, path: &Path) -> PathBuf {
    rootfs.join(path.strip_prefix("/").unwrap_or(path))
}
