//! In-memory collaborators driving [`ContainerSampler`] deterministically in tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::os::fd::BorrowedFd;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::catalog::{Catalog, CounterSpec, HardwareEvent};
use crate::cgroup::procs;
use crate::cgroup::{ContainerCgroup, CpuUsageFile, HostCpuSource, ProcessEnumerator};
use crate::container::ContainerID;
use crate::perf::{self, GroupReading, PerfEventSource};
use crate::rdt::{self, RdtMonitor, RdtReading};

use super::{ContainerSampler, SamplerContext};

pub const USAGE_FILE: &str = "cpuacct.usage";
const HOST_STAT_FILE: &str = "stat";
const ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeDescriptor {
    cpu: usize,
    event: HardwareEvent,
}

#[derive(Debug, Default)]
struct PerfState {
    failing_leaders: HashSet<usize>,
    failing_followers: HashSet<(usize, HardwareEvent)>,
    failing_activations: HashSet<(usize, HardwareEvent)>,
    readings: HashMap<usize, Option<GroupReading>>,
    opened: Vec<(usize, HardwareEvent)>,
    activated: Vec<(usize, HardwareEvent)>,
    closed: Vec<(usize, HardwareEvent)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakePerf(Arc<Mutex<PerfState>>);

impl FakePerf {
    pub fn fail_leader(&self, cpu: usize) {
        self.0.lock().unwrap().failing_leaders.insert(cpu);
    }

    pub fn fail_follower(&self, cpu: usize, event: HardwareEvent) {
        self.0.lock().unwrap().failing_followers.insert((cpu, event));
    }

    pub fn fail_activate(&self, cpu: usize, event: HardwareEvent) {
        self.0.lock().unwrap().failing_activations.insert((cpu, event));
    }

    pub fn fail_read(&self, cpu: usize) {
        self.0.lock().unwrap().readings.insert(cpu, None);
    }

    /// Sets what the next group reads of `cpu` return. `values` holds only opened counters.
    pub fn set_reading(&self, cpu: usize, values: &[u64], enabled: u64, running: u64) {
        let reading = GroupReading {
            values: values.to_vec(),
            time_enabled: enabled,
            time_running: running,
        };
        self.0.lock().unwrap().readings.insert(cpu, Some(reading));
    }

    pub fn opened(&self) -> Vec<(usize, HardwareEvent)> {
        self.0.lock().unwrap().opened.clone()
    }

    pub fn activated(&self) -> Vec<(usize, HardwareEvent)> {
        self.0.lock().unwrap().activated.clone()
    }

    pub fn closed(&self) -> Vec<(usize, HardwareEvent)> {
        self.0.lock().unwrap().closed.clone()
    }

    fn open(&self, cpu: usize, spec: &CounterSpec, fail: bool) -> perf::Result<FakeDescriptor> {
        if fail {
            return Err(perf::Error::Open {
                event: spec.event,
                cpu,
                source: std::io::Error::from_raw_os_error(libc::ENOENT),
            });
        }
        self.0.lock().unwrap().opened.push((cpu, spec.event));
        Ok(FakeDescriptor {
            cpu,
            event: spec.event,
        })
    }
}

impl PerfEventSource for FakePerf {
    type Descriptor = FakeDescriptor;

    fn open_leader(
        &self,
        _scope: BorrowedFd<'_>,
        cpu: usize,
        spec: &CounterSpec,
    ) -> perf::Result<FakeDescriptor> {
        let fail = self.0.lock().unwrap().failing_leaders.contains(&cpu);
        self.open(cpu, spec, fail)
    }

    fn open_follower(
        &self,
        leader: &FakeDescriptor,
        _scope: BorrowedFd<'_>,
        cpu: usize,
        spec: &CounterSpec,
    ) -> perf::Result<FakeDescriptor> {
        assert_eq!(leader.cpu, cpu);
        let fail = self
            .0
            .lock()
            .unwrap()
            .failing_followers
            .contains(&(cpu, spec.event));
        self.open(cpu, spec, fail)
    }

    fn activate(&self, descriptor: &FakeDescriptor) -> perf::Result<()> {
        let mut state = self.0.lock().unwrap();
        let slot = (descriptor.cpu, descriptor.event);
        if state.failing_activations.contains(&slot) {
            return Err(perf::Error::Activate(std::io::Error::from_raw_os_error(
                libc::EINVAL,
            )));
        }
        state.activated.push(slot);
        Ok(())
    }

    fn read_group(&self, leader: &FakeDescriptor, len: usize) -> perf::Result<GroupReading> {
        let state = self.0.lock().unwrap();
        match state.readings.get(&leader.cpu).cloned().flatten() {
            Some(reading) if reading.values.len() == len => Ok(reading),
            Some(reading) => Err(perf::Error::GroupSize {
                expected: len,
                actual: reading.values.len(),
            }),
            None => Err(perf::Error::Read(std::io::Error::from_raw_os_error(
                libc::EIO,
            ))),
        }
    }

    fn close(&self, descriptor: FakeDescriptor) {
        self.0
            .lock()
            .unwrap()
            .closed
            .push((descriptor.cpu, descriptor.event));
    }
}

#[derive(Debug, Default)]
struct RdtState {
    fail_create: bool,
    reading: Option<RdtReading>,
    created: Vec<BTreeSet<u32>>,
    polls: usize,
    destroyed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeRdt(Arc<Mutex<RdtState>>);

impl FakeRdt {
    pub fn fail_create(&self) {
        self.0.lock().unwrap().fail_create = true;
    }

    pub fn fail_poll(&self) {
        self.0.lock().unwrap().reading = None;
    }

    pub fn set_reading(&self, llc_occupancy: u64, local_bandwidth: u64, remote_bandwidth: u64) {
        self.0.lock().unwrap().reading = Some(RdtReading {
            llc_occupancy,
            local_bandwidth,
            remote_bandwidth,
        });
    }

    pub fn created(&self) -> Vec<BTreeSet<u32>> {
        self.0.lock().unwrap().created.clone()
    }

    pub fn polls(&self) -> usize {
        self.0.lock().unwrap().polls
    }

    pub fn destroyed(&self) -> usize {
        self.0.lock().unwrap().destroyed
    }
}

impl RdtMonitor for FakeRdt {
    type Group = usize;

    fn create_group(&self, _id: &ContainerID, pids: &BTreeSet<u32>) -> rdt::Result<usize> {
        let mut state = self.0.lock().unwrap();
        if state.fail_create {
            return Err(rdt::Error::NoTasksAssigned {
                path: PathBuf::from("mon_groups/fake"),
                requested: pids.len(),
            });
        }
        state.created.push(pids.clone());
        Ok(state.created.len())
    }

    fn poll(&self, _group: &usize) -> rdt::Result<RdtReading> {
        let mut state = self.0.lock().unwrap();
        state.polls += 1;
        state.reading.ok_or_else(|| rdt::Error::Read {
            path: PathBuf::from("mon_data"),
            source: std::io::Error::from_raw_os_error(libc::EIO),
        })
    }

    fn destroy_group(&self, _group: usize) {
        self.0.lock().unwrap().destroyed += 1;
    }
}

#[derive(Debug, Clone)]
pub struct FakeProcs(Arc<Mutex<Option<BTreeSet<u32>>>>);

impl FakeProcs {
    pub fn fail(&self) {
        *self.0.lock().unwrap() = None;
    }
}

impl Default for FakeProcs {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Some(BTreeSet::from([10, 11])))))
    }
}

impl ProcessEnumerator for FakeProcs {
    fn list_processes(&self, cgroup: &ContainerCgroup) -> Result<BTreeSet<u32>, procs::Error> {
        self.0.lock().unwrap().clone().ok_or_else(|| procs::Error::Read {
            path: cgroup.tasks.clone(),
            source: std::io::Error::from_raw_os_error(libc::ENOENT),
        })
    }
}

pub type FakeSampler = ContainerSampler<FakePerf, FakeRdt, FakeProcs>;

/// A container cgroup in a temporary directory plus the fakes a sampler is built from.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub perf: FakePerf,
    pub rdt: FakeRdt,
    pub procs: FakeProcs,
    catalog: Catalog,
    cpus: usize,
}

impl Fixture {
    /// A fixture counting cycles and instructions on `cpus` CPUs.
    pub fn new(cpus: usize) -> Self {
        Self::with_catalog(cpus, "cycles,instructions")
    }

    pub fn with_catalog(cpus: usize, catalog: &str) -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
            perf: FakePerf::default(),
            rdt: FakeRdt::default(),
            procs: FakeProcs::default(),
            catalog: Catalog::parse(catalog).unwrap(),
            cpus,
        };
        fixture.write_usage(0, 0);
        fixture
    }

    pub fn cgroup(&self) -> ContainerCgroup {
        ContainerCgroup {
            id: ContainerID::new(ID).unwrap(),
            perf_scope: self.dir.path().to_path_buf(),
            cpu_usage: CpuUsageFile::Cpuacct(self.dir.path().join(USAGE_FILE)),
            tasks: self.dir.path().join("tasks"),
        }
    }

    pub fn host_stat_path(&self) -> PathBuf {
        self.dir.path().join(HOST_STAT_FILE)
    }

    pub fn context(&self) -> Arc<SamplerContext<FakePerf, FakeRdt, FakeProcs>> {
        Arc::new(SamplerContext {
            perf: self.perf.clone(),
            rdt: self.rdt.clone(),
            procs: self.procs.clone(),
            catalog: self.catalog.clone(),
            cpus: (0..self.cpus).collect(),
            host: HostCpuSource::new(self.host_stat_path()),
        })
    }

    pub fn sampler(&self) -> FakeSampler {
        ContainerSampler::new(&self.cgroup(), "web", self.context()).unwrap()
    }

    /// Writes the container's cumulative usage and the host's `/proc/stat` tick sum.
    pub fn write_usage(&self, container_ns: u64, host_ticks: u64) {
        std::fs::write(
            self.dir.path().join(USAGE_FILE),
            format!("{container_ns}\n"),
        )
        .unwrap();
        std::fs::write(
            self.host_stat_path(),
            format!("cpu  {host_ticks} 0 0 0 0 0 0 0 0 0\ncpu0 1 2 3\nintr 99\n"),
        )
        .unwrap();
    }
}
