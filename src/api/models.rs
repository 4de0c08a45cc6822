use crate::monitor::ContainerInfo;
use crate::sampler::Sample;

/// Response of `GET /samples`.
#[derive(Debug, Default, serde::Serialize)]
pub struct SamplesResponse {
    /// Time of the sampling round, absent before the first round finished.
    pub timestamp: Option<u64>,
    pub samples: Vec<Sample>,
}

/// Response of `GET /containers`.
#[derive(Debug, Default, serde::Serialize)]
pub struct ContainersResponse {
    pub containers: Vec<ContainerInfo>,
}
