use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The exact length of a full container id as used in cgroup directory names.
const CONTAINER_ID_LEN: usize = 64;

/// The length of the abbreviated id used as the human-readable container name.
const SHORT_ID_LEN: usize = 12;

/// A validated container identifier, i.e., 64 lowercase hex characters.
///
/// # Examples
///
/// ```
/// # use creo_sampler::container::ContainerID;
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.short(), "abc123abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is not exactly
    /// [`CONTAINER_ID_LEN`] lowercase hex characters.
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.len() != CONTAINER_ID_LEN || !is_lowercase_hex(src.as_bytes()) {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Returns the abbreviated form of the id, as printed by `docker ps`.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_ID_LEN]
    }

    pub fn to_arc(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for ContainerID {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

fn is_lowercase_hex(src: &[u8]) -> bool {
    src.iter()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}
