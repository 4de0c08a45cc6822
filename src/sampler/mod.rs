//! Per-container sampling state and delta computation.
//!
//! A [`ContainerSampler`] owns every handle needed to observe one container: the cgroup
//! directory scoping its hardware counters, its cumulative CPU usage file, a per-CPU matrix
//! of counter groups and, if available, an RDT monitoring group. Each poller returns
//! nothing on its first call and the change since the previous call afterwards.
//!
//! Only a failure to open the cgroup handles is reported to the caller. Anything else
//! (an unsupported counter, a missing RDT backend, a failed read) is logged and shows up as
//! missing data.

mod cpu;
mod perf;
mod rdt;
mod sample;

#[cfg(test)]
mod fakes;

use std::collections::BTreeSet;
use std::fs::File;
use std::os::fd::AsFd;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::cgroup::{ContainerCgroup, CpuUsageReader, HostCpuSource, ProcessEnumerator};
use crate::container::ContainerID;
use crate::fsutil::{self, FileOpenError};
use crate::perf::PerfEventSource;
use crate::rdt::{self as rdt_backend, RdtMonitor, RdtReading};

pub use cpu::CpuUsageDelta;
pub use perf::CounterDeltas;
pub use rdt::RdtDelta;
pub use sample::Sample;

use perf::CpuCounters;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cgroup of container {id} is unavailable: {source}")]
    ResourceUnavailable {
        id: ContainerID,
        #[source]
        source: FileOpenError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Collaborators and configuration shared by all samplers.
#[derive(Debug)]
pub struct SamplerContext<P, R, E> {
    pub perf: P,
    pub rdt: R,
    pub procs: E,
    pub catalog: Catalog,
    /// Ids of the CPUs to open counter groups on.
    pub cpus: Vec<usize>,
    pub host: HostCpuSource,
}

impl<P, R, E> SamplerContext<P, R, E> {
    /// Creates a context sampling on every currently online CPU.
    pub fn new(perf: P, rdt: R, procs: E, catalog: Catalog, host: HostCpuSource) -> Self {
        Self {
            perf,
            rdt,
            procs,
            catalog,
            cpus: crate::perf::online_cpus(),
            host,
        }
    }
}

struct RdtBinding<G> {
    group: G,
    pids: BTreeSet<u32>,
}

/// Sampling state of a single container.
///
/// Pollers take `&mut self`; callers sampling many containers in parallel must give each
/// sampler to one thread at a time.
pub struct ContainerSampler<P, R, E>
where
    P: PerfEventSource,
    R: RdtMonitor,
{
    id: ContainerID,
    name: String,
    ctx: Arc<SamplerContext<P, R, E>>,
    scope: File,
    usage: CpuUsageReader,
    counters: Vec<CpuCounters<P::Descriptor>>,
    rdt: Option<RdtBinding<R::Group>>,
    last_cpu: Option<(u64, u64)>,
    last_rdt: Option<RdtReading>,
}

impl<P, R, E> ContainerSampler<P, R, E>
where
    P: PerfEventSource,
    R: RdtMonitor,
    E: ProcessEnumerator,
{
    /// Opens all handles of the container described by `cgroup`.
    ///
    /// Counters are opened disabled; call [`activate`](Self::activate) to start them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceUnavailable`] if the cgroup directory or the CPU usage file
    /// cannot be opened. Failing to enumerate tasks, to create the RDT group or to open
    /// individual counters only disables the affected feature.
    pub fn new(
        cgroup: &ContainerCgroup,
        name: impl Into<String>,
        ctx: Arc<SamplerContext<P, R, E>>,
    ) -> Result<Self> {
        let unavailable = |source| Error::ResourceUnavailable {
            id: cgroup.id.clone(),
            source,
        };
        let scope = fsutil::open_file(&cgroup.perf_scope).map_err(unavailable)?;
        let usage = CpuUsageReader::open(&cgroup.cpu_usage).map_err(unavailable)?;

        let rdt = bind_rdt(&ctx, cgroup);
        let counters = ctx
            .cpus
            .iter()
            .map(|&cpu| CpuCounters::open(&ctx.perf, scope.as_fd(), cpu, &ctx.catalog))
            .collect::<Vec<_>>();
        log::debug!(
            "sampling container {}: cpus={}, counter_groups={}, rdt={}",
            cgroup.id,
            ctx.cpus.len(),
            counters.iter().filter(|row| row.has_leader()).count(),
            rdt.is_some()
        );

        Ok(Self {
            id: cgroup.id.clone(),
            name: name.into(),
            ctx,
            scope,
            usage,
            counters,
            rdt,
            last_cpu: None,
            last_rdt: None,
        })
    }

    /// Enables every opened counter. Failures are logged per counter.
    pub fn activate(&self) {
        for row in &self.counters {
            row.activate(&self.ctx.perf, &self.ctx.catalog);
        }
    }

    /// Closes all counters and destroys the RDT monitoring group, if any.
    pub fn teardown(self) {
        let Self {
            id,
            ctx,
            scope,
            usage,
            counters,
            rdt,
            ..
        } = self;

        for row in counters {
            row.close(&ctx.perf);
        }
        if let Some(binding) = rdt {
            ctx.rdt.destroy_group(binding.group);
        }
        drop(usage);
        drop(scope);
        log::debug!("stopped sampling container {id}");
    }

    pub fn id(&self) -> &ContainerID {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tasks the RDT monitoring group was created with, if one exists.
    pub fn rdt_tasks(&self) -> Option<&BTreeSet<u32>> {
        self.rdt.as_ref().map(|binding| &binding.pids)
    }

    /// Runs all three pollers and bundles their results.
    pub fn sample(&mut self, timestamp: u64) -> Sample {
        let cpu = self.poll_cpu_usage();
        let perf = self.poll_perf();
        let rdt = self.poll_rdt();
        Sample {
            timestamp,
            container_id: self.id.clone(),
            name: self.name.clone(),
            cpu,
            perf,
            rdt,
        }
    }
}

fn bind_rdt<P, R, E>(
    ctx: &SamplerContext<P, R, E>,
    cgroup: &ContainerCgroup,
) -> Option<RdtBinding<R::Group>>
where
    R: RdtMonitor,
    E: ProcessEnumerator,
{
    let pids = match ctx.procs.list_processes(cgroup) {
        Ok(pids) => pids,
        Err(err) => {
            log::warn!(
                "skipping RDT monitoring of container {}: {err}",
                cgroup.id
            );
            return None;
        }
    };

    match ctx.rdt.create_group(&cgroup.id, &pids) {
        Ok(group) => Some(RdtBinding { group, pids }),
        Err(rdt_backend::Error::Unsupported) => None,
        Err(err) => {
            log::warn!("skipping RDT monitoring of container {}: {err}", cgroup.id);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{self, Fixture};
    use super::*;
    use crate::catalog::HardwareEvent;

    #[test]
    fn test_new_requires_cgroup_directory() {
        let fixture = Fixture::new(2);
        let mut cgroup = fixture.cgroup();
        cgroup.perf_scope = fixture.dir.path().join("missing");

        let err = ContainerSampler::new(&cgroup, "web", fixture.context())
            .err()
            .unwrap();
        assert!(matches!(err, Error::ResourceUnavailable { .. }));
        assert!(fixture.perf.opened().is_empty());
    }

    #[test]
    fn test_new_requires_usage_file() {
        let fixture = Fixture::new(2);
        std::fs::remove_file(fixture.dir.path().join(fakes::USAGE_FILE)).unwrap();

        let err = ContainerSampler::new(&fixture.cgroup(), "web", fixture.context())
            .err()
            .unwrap();
        assert!(matches!(err, Error::ResourceUnavailable { .. }));
    }

    #[test]
    fn test_new_opens_leader_before_followers() {
        let fixture = Fixture::new(2);
        let sampler = fixture.sampler();

        let opened = fixture.perf.opened();
        assert_eq!(opened.len(), 4);
        assert_eq!(opened[0], (0, HardwareEvent::CpuCycles));
        assert_eq!(opened[1], (0, HardwareEvent::Instructions));
        assert_eq!(opened[2], (1, HardwareEvent::CpuCycles));
        assert_eq!(opened[3], (1, HardwareEvent::Instructions));
        assert_eq!(sampler.name(), "web");
        assert_eq!(sampler.rdt_tasks(), Some(&BTreeSet::from([10, 11])));
    }

    #[test]
    fn test_opens_groups_on_listed_cpu_ids() {
        let fixture = Fixture::new(2);
        let ctx = SamplerContext {
            cpus: vec![0, 2],
            ..Arc::try_unwrap(fixture.context()).ok().unwrap()
        };
        let _sampler = ContainerSampler::new(&fixture.cgroup(), "web", Arc::new(ctx)).unwrap();

        let cpus: BTreeSet<usize> = fixture.perf.opened().iter().map(|&(cpu, _)| cpu).collect();
        assert_eq!(cpus, BTreeSet::from([0, 2]));
    }

    #[test]
    fn test_failed_leader_skips_followers_of_that_cpu() {
        let fixture = Fixture::new(3);
        fixture.perf.fail_leader(1);
        let _sampler = fixture.sampler();

        let opened = fixture.perf.opened();
        assert!(!opened.iter().any(|&(cpu, _)| cpu == 1));
        assert_eq!(opened.len(), 4);
    }

    #[test]
    fn test_process_enumeration_failure_disables_rdt() {
        let fixture = Fixture::new(1);
        fixture.procs.fail();
        let mut sampler = fixture.sampler();

        assert!(sampler.rdt_tasks().is_none());
        assert!(fixture.rdt.created().is_empty());
        assert!(sampler.poll_rdt().is_none());
    }

    #[test]
    fn test_activate_continues_after_failures() {
        let fixture = Fixture::new(2);
        fixture.perf.fail_activate(0, HardwareEvent::CpuCycles);
        let sampler = fixture.sampler();

        sampler.activate();
        let activated = fixture.perf.activated();
        assert_eq!(
            activated,
            vec![
                (0, HardwareEvent::Instructions),
                (1, HardwareEvent::CpuCycles),
                (1, HardwareEvent::Instructions),
            ]
        );
    }

    #[test]
    fn test_teardown_closes_opened_slots_only() {
        let fixture = Fixture::new(3);
        fixture.perf.fail_leader(0);
        fixture.perf.fail_follower(2, HardwareEvent::Instructions);
        let sampler = fixture.sampler();
        sampler.activate();

        sampler.teardown();
        let mut closed = fixture.perf.closed();
        closed.sort_unstable();
        assert_eq!(
            closed,
            vec![
                (1, HardwareEvent::CpuCycles),
                (1, HardwareEvent::Instructions),
                (2, HardwareEvent::CpuCycles),
            ]
        );
        assert_eq!(fixture.rdt.destroyed(), 1);
    }

    #[test]
    fn test_teardown_without_rdt_group() {
        let fixture = Fixture::new(1);
        fixture.rdt.fail_create();
        let sampler = fixture.sampler();

        sampler.teardown();
        assert_eq!(fixture.rdt.destroyed(), 0);
        assert_eq!(fixture.perf.closed().len(), 2);
    }

    #[test]
    fn test_sample_bundles_pollers() {
        let fixture = Fixture::new(1);
        fixture.write_usage(1_000, 100);
        fixture.perf.set_reading(0, &[10, 20], 100, 100);
        fixture.rdt.set_reading(5, 0, 0);
        let mut sampler = fixture.sampler();

        let first = sampler.sample(1);
        assert!(first.cpu.is_none() && first.perf.is_none() && first.rdt.is_none());

        fixture.write_usage(3_000, 110);
        fixture.perf.set_reading(0, &[30, 50], 200, 200);
        fixture.rdt.set_reading(7, 10, 20);
        let second = sampler.sample(2);
        assert_eq!(second.timestamp, 2);
        assert_eq!(second.name, "web");
        assert_eq!(second.cpu.unwrap().container_ns, 2_000);
        let perf = second.perf.unwrap();
        let values: Vec<u64> = perf.iter().map(|(_, value)| value).collect();
        assert_eq!(values, vec![20, 30]);
        assert_eq!(second.rdt.unwrap().llc_occupancy, 7);
    }
}
