use crate::catalog::HardwareEvent;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open `{event}` counter on cpu {cpu}: {source}")]
    Open {
        event: HardwareEvent,
        cpu: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to enable counter: {0}")]
    Activate(#[source] std::io::Error),
    #[error("failed to read counter group: {0}")]
    Read(#[source] std::io::Error),
    #[error("counter group read returned {actual} bytes, expected {expected}")]
    ShortRead { expected: usize, actual: usize },
    #[error("counter group holds {actual} counters, expected {expected}")]
    GroupSize { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
