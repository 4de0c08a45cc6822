use crate::cgroup::ProcessEnumerator;
use crate::perf::PerfEventSource;
use crate::rdt::RdtMonitor;

use super::ContainerSampler;

/// Cache occupancy and memory traffic between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RdtDelta {
    /// Current LLC occupancy in bytes. A gauge, reported as read.
    pub llc_occupancy: u64,
    /// Bytes moved to/from local memory since the previous poll.
    pub local_bandwidth: u64,
    /// Bytes moved to/from remote memory since the previous poll.
    pub remote_bandwidth: u64,
}

impl<P, R, E> ContainerSampler<P, R, E>
where
    P: PerfEventSource,
    R: RdtMonitor,
    E: ProcessEnumerator,
{
    /// Polls the container's monitoring group.
    ///
    /// Always returns `None` if no group could be created. A failed poll leaves the
    /// baseline untouched.
    pub fn poll_rdt(&mut self) -> Option<RdtDelta> {
        let binding = self.rdt.as_ref()?;
        let current = match self.ctx.rdt.poll(&binding.group) {
            Ok(reading) => reading,
            Err(err) => {
                log::debug!("failed to poll RDT group of container {}: {err}", self.id);
                return None;
            }
        };

        let previous = self.last_rdt.replace(current)?;
        match (
            current.local_bandwidth.checked_sub(previous.local_bandwidth),
            current.remote_bandwidth.checked_sub(previous.remote_bandwidth),
        ) {
            (Some(local_bandwidth), Some(remote_bandwidth)) => Some(RdtDelta {
                llc_occupancy: current.llc_occupancy,
                local_bandwidth,
                remote_bandwidth,
            }),
            _ => {
                log::debug!(
                    "bandwidth counters of container {} went backwards, dropping delta",
                    self.id
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fakes::Fixture;
    use super::*;

    #[test]
    fn test_occupancy_is_reported_verbatim() {
        let fixture = Fixture::new(1);
        fixture.rdt.set_reading(4096, 1_000, 2_000);
        let mut sampler = fixture.sampler();
        assert!(sampler.poll_rdt().is_none());

        fixture.rdt.set_reading(1024, 1_500, 2_100);
        assert_eq!(
            sampler.poll_rdt(),
            Some(RdtDelta {
                llc_occupancy: 1024,
                local_bandwidth: 500,
                remote_bandwidth: 100,
            })
        );

        fixture.rdt.set_reading(1024, 1_500, 2_100);
        assert_eq!(
            sampler.poll_rdt(),
            Some(RdtDelta {
                llc_occupancy: 1024,
                local_bandwidth: 0,
                remote_bandwidth: 0,
            })
        );
    }

    #[test]
    fn test_failed_group_creation_is_permanent() {
        let fixture = Fixture::new(1);
        fixture.rdt.fail_create();
        fixture.rdt.set_reading(1, 2, 3);
        let mut sampler = fixture.sampler();

        for _ in 0..3 {
            assert!(sampler.poll_rdt().is_none());
        }
        assert_eq!(fixture.rdt.polls(), 0);
    }

    #[test]
    fn test_failed_poll_keeps_baseline() {
        let fixture = Fixture::new(1);
        fixture.rdt.set_reading(0, 100, 100);
        let mut sampler = fixture.sampler();
        sampler.poll_rdt();

        fixture.rdt.fail_poll();
        assert!(sampler.poll_rdt().is_none());

        fixture.rdt.set_reading(8, 150, 130);
        assert_eq!(
            sampler.poll_rdt(),
            Some(RdtDelta {
                llc_occupancy: 8,
                local_bandwidth: 50,
                remote_bandwidth: 30,
            })
        );
    }

    #[test]
    fn test_reset_reseeds() {
        let fixture = Fixture::new(1);
        fixture.rdt.set_reading(0, 100, 100);
        let mut sampler = fixture.sampler();
        sampler.poll_rdt();

        fixture.rdt.set_reading(0, 5, 200);
        assert!(sampler.poll_rdt().is_none());
        fixture.rdt.set_reading(0, 15, 260);
        assert_eq!(
            sampler.poll_rdt(),
            Some(RdtDelta {
                llc_occupancy: 0,
                local_bandwidth: 10,
                remote_bandwidth: 60,
            })
        );
    }
}
