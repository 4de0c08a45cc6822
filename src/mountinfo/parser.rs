//! Mountinfo line parser for Linux systems.
//!
//! Parses lines in `/proc/[pid]/mountinfo` format. See
//! [`proc_pid_mountinfo(5)`](https://man7.org/linux/man-pages/man5/proc_pid_mountinfo.5.html)
//! for details on the structure. Only the fields needed to locate cgroup and resctrl mounts
//! are kept.

/// The parts of a mountinfo line relevant for locating pseudo filesystems.
#[derive(Debug, PartialEq, Eq)]
pub struct MountEntry<'a> {
    /// Mount point relative to the process's root.
    pub mount_point: &'a str,
    /// Filesystem type (e.g., `cgroup`, `cgroup2`, `resctrl`).
    pub fs_type: &'a str,
    /// Superblock options; for cgroup v1 these list the mounted controllers.
    pub super_options: &'a str,
}

impl MountEntry<'_> {
    /// Returns true if `option` is one of the comma separated superblock options.
    pub fn has_super_option(&self, option: &str) -> bool {
        self.super_options.split(',').any(|o| o == option)
    }
}

/// Errors that may occur when parsing a mountinfo line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing separator ` - ` in line: `{0}`")]
    MissingSeparator(String),

    #[error("missing mount point in line: `{0}`")]
    MissingMountPoint(String),

    #[error("missing `{field}` after separator in line: `{line}`")]
    MissingPostSeparatorField { field: &'static str, line: String },
}

/// Index of the mount point among the whitespace separated fields before ` - `.
const MOUNT_POINT_FIELD: usize = 4;

/// Parses a single line of mountinfo data.
///
/// # Errors
///
/// Returns [`ParseError`] variants for a missing separator or missing required fields.
pub fn parse_mount_entry(line: &str) -> Result<MountEntry<'_>, ParseError> {
    let (pre, post) = line
        .split_once(" - ")
        .ok_or_else(|| ParseError::MissingSeparator(line.to_owned()))?;

    let mount_point = pre
        .split_whitespace()
        .nth(MOUNT_POINT_FIELD)
        .ok_or_else(|| ParseError::MissingMountPoint(line.to_owned()))?;

    let mut post_fields = post.split_whitespace();
    let mut next_field = |field: &'static str| {
        post_fields
            .next()
            .ok_or_else(|| ParseError::MissingPostSeparatorField {
                field,
                line: line.to_owned(),
            })
    };
    let fs_type = next_field("fs_type")?;
    let _source = next_field("source")?;
    let super_options = next_field("super_options")?;

    Ok(MountEntry {
        mount_point,
        fs_type,
        super_options,
    })
}
