use crate::container::ContainerID;

use super::{CounterDeltas, CpuUsageDelta, RdtDelta};

/// The result of one sampling round for one container.
///
/// Sections are `None` while their poller is seeding or when its source is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Sample {
    pub timestamp: u64,
    pub container_id: ContainerID,
    pub name: String,
    pub cpu: Option<CpuUsageDelta>,
    pub perf: Option<CounterDeltas>,
    pub rdt: Option<RdtDelta>,
}
