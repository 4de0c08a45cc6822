use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use dashmap::DashMap;

use crate::cgroup::{ContainerCgroup, ProcessEnumerator};
use crate::container::ContainerID;
use crate::perf::PerfEventSource;
use crate::rdt::RdtMonitor;
use crate::sampler::{self, ContainerSampler, Sample, SamplerContext};

/// A tracked container, as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerInfo {
    pub id: ContainerID,
    pub name: String,
    /// Number of tasks bound to the RDT monitoring group, `None` without RDT.
    pub rdt_tasks: Option<usize>,
}

/// Owns one [`ContainerSampler`] per tracked container.
pub struct Monitor<P, R, E>
where
    P: PerfEventSource,
    R: RdtMonitor,
{
    ctx: Arc<SamplerContext<P, R, E>>,
    containers: DashMap<ContainerID, ContainerSampler<P, R, E>>,
}

impl<P, R, E> Monitor<P, R, E>
where
    P: PerfEventSource,
    R: RdtMonitor,
    E: ProcessEnumerator,
{
    pub fn new(ctx: Arc<SamplerContext<P, R, E>>) -> Self {
        Self {
            ctx,
            containers: DashMap::new(),
        }
    }

    /// Starts sampling the container of `cgroup`, named by its short id.
    ///
    /// A sampler already registered under the same id is torn down and replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the container's cgroup cannot be opened.
    pub fn register_container(&self, cgroup: &ContainerCgroup) -> sampler::Result<()> {
        let sampler = ContainerSampler::new(cgroup, cgroup.id.short(), Arc::clone(&self.ctx))?;
        sampler.activate();
        if let Some(previous) = self.containers.insert(cgroup.id.clone(), sampler) {
            previous.teardown();
        }
        Ok(())
    }

    /// Stops sampling a container. Returns whether it was tracked.
    pub fn remove_container(&self, container_id: &ContainerID) -> bool {
        match self.containers.remove(container_id) {
            Some((_, sampler)) => {
                sampler.teardown();
                true
            }
            None => false,
        }
    }

    pub fn is_tracking(&self, container_id: &ContainerID) -> bool {
        self.containers.contains_key(container_id)
    }

    /// Registers containers that appeared and removes those that are gone.
    ///
    /// Containers whose registration fails are retried on the next call.
    pub fn sync(&self, present: &[ContainerCgroup]) {
        let ids: HashSet<&ContainerID> = present.iter().map(|cgroup| &cgroup.id).collect();
        let stale: Vec<ContainerID> = self
            .containers
            .iter()
            .filter(|entry| !ids.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for container_id in stale {
            self.remove_container(&container_id);
            log::info!("stopped tracking container: container_id={container_id}");
        }

        for cgroup in present {
            if self.is_tracking(&cgroup.id) {
                continue;
            }
            match self.register_container(cgroup) {
                Ok(()) => log::info!("tracking container: container_id={}", cgroup.id),
                Err(err) => log::warn!(
                    target: "container monitor",
                    "failed to register container, retrying next round: container_id={}, error={}",
                    cgroup.id,
                    err
                ),
            }
        }
    }

    /// Samples every tracked container.
    ///
    /// # Arguments
    ///
    /// * `timestamp` - UNIX time in seconds attached to every sample.
    pub fn collect_samples(&self, timestamp: u64, out: &mut Vec<Sample>) {
        for mut entry in self.containers.iter_mut() {
            out.push(entry.value_mut().sample(timestamp));
        }
    }

    /// Lists the tracked containers, ordered by id.
    pub fn containers(&self) -> Vec<ContainerInfo> {
        let mut containers: Vec<ContainerInfo> = self
            .containers
            .iter()
            .map(|entry| ContainerInfo {
                id: entry.key().clone(),
                name: entry.name().to_owned(),
                rdt_tasks: entry.rdt_tasks().map(BTreeSet::len),
            })
            .collect();
        containers.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        containers
    }

    /// Tears down every sampler.
    pub fn shutdown(&self) {
        let ids: Vec<ContainerID> = self.containers.iter().map(|e| e.key().clone()).collect();
        for container_id in ids {
            self.remove_container(&container_id);
        }
    }

    pub fn size(&self) -> usize {
        self.containers.len()
    }
}
