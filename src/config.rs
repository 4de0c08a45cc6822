use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::{self, Catalog};

const ROOTFS_MOUNT_PATH: &str = "ROOTFS_MOUNT_PATH";
const INTERVAL_SECS: &str = "SAMPLER_INTERVAL_SECS";
const LISTEN_ADDR: &str = "SAMPLER_LISTEN_ADDR";
const CGROUP_PARENT: &str = "SAMPLER_CGROUP_PARENT";
const COUNTERS: &str = "SAMPLER_COUNTERS";
const RDT: &str = "SAMPLER_RDT";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("environment variable `{0}` is not valid unicode")]
    NotUnicode(&'static str),
    #[error("invalid sampling interval `{value}`: {source}")]
    InvalidInterval {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("sampling interval must be at least one second")]
    ZeroInterval,
    #[error("invalid listen address `{value}`: {source}")]
    InvalidListenAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("invalid counter list `{value}`: {source}")]
    InvalidCounters {
        value: String,
        #[source]
        source: catalog::Error,
    },
    #[error("invalid RDT mode `{0}`, expected `resctrl` or `off`")]
    InvalidRdtMode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which RDT backend to sample cache and memory bandwidth with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RdtMode {
    #[default]
    Resctrl,
    Off,
}

impl FromStr for RdtMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "resctrl" => Ok(RdtMode::Resctrl),
            "off" => Ok(RdtMode::Off),
            other => Err(Error::InvalidRdtMode(other.to_owned())),
        }
    }
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Mount point of the host's root filesystem.
    pub rootfs: PathBuf,
    pub interval: Duration,
    pub listen_addr: SocketAddr,
    /// Overrides the parent cgroup of containers.
    pub cgroup_parent: Option<String>,
    pub catalog: Catalog,
    pub rdt: RdtMode,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let var = |key: &'static str| -> Result<Option<String>> {
            lookup(key)
                .map(|value| value.into_string().map_err(|_| Error::NotUnicode(key)))
                .transpose()
        };

        let rootfs = lookup(ROOTFS_MOUNT_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));

        let interval = match var(INTERVAL_SECS)? {
            Some(value) => {
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|source| Error::InvalidInterval { value, source })?;
                if secs == 0 {
                    return Err(Error::ZeroInterval);
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(1),
        };

        let listen_addr = var(LISTEN_ADDR)?.unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let listen_addr = listen_addr
            .parse::<SocketAddr>()
            .map_err(|source| Error::InvalidListenAddr {
                value: listen_addr.clone(),
                source,
            })?;

        let catalog = match var(COUNTERS)? {
            Some(value) => {
                Catalog::parse(&value).map_err(|source| Error::InvalidCounters { value, source })?
            }
            None => Catalog::default(),
        };

        let rdt = var(RDT)?
            .map(|value| value.parse::<RdtMode>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            rootfs,
            interval,
            listen_addr,
            cgroup_parent: var(CGROUP_PARENT)?.filter(|parent| !parent.is_empty()),
            catalog,
            rdt,
        })
    }
}
