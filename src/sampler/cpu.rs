use crate::cgroup::ProcessEnumerator;
use crate::perf::PerfEventSource;
use crate::rdt::RdtMonitor;

use super::ContainerSampler;

/// CPU time consumed between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CpuUsageDelta {
    /// Nanoseconds of CPU time used by the container.
    pub container_ns: u64,
    /// Host-wide CPU time over the same interval, scaled to the container's unit.
    pub host_ns: u64,
}

impl<P, R, E> ContainerSampler<P, R, E>
where
    P: PerfEventSource,
    R: RdtMonitor,
    E: ProcessEnumerator,
{
    /// Reads the container's and the host's cumulative CPU time.
    ///
    /// Returns `None` on the first call, if either source cannot be read, or if a counter
    /// went backwards. In the last case the new values become the baseline.
    pub fn poll_cpu_usage(&mut self) -> Option<CpuUsageDelta> {
        let container = match self.usage.read_ns() {
            Ok(ns) => ns,
            Err(err) => {
                log::warn!("failed to read cpu usage of container {}: {err}", self.id);
                return None;
            }
        };
        let host = match self.ctx.host.read_scaled() {
            Ok(ns) => ns,
            Err(err) => {
                log::warn!("failed to read host cpu usage: {err}");
                return None;
            }
        };

        let (last_container, last_host) = self.last_cpu.replace((container, host))?;
        match (
            container.checked_sub(last_container),
            host.checked_sub(last_host),
        ) {
            (Some(container_ns), Some(host_ns)) => Some(CpuUsageDelta {
                container_ns,
                host_ns,
            }),
            _ => {
                log::debug!(
                    "cpu usage of container {} went backwards, dropping delta",
                    self.id
                );
                None
            }
        }
    }
}
