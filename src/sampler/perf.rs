use std::os::fd::BorrowedFd;

use serde::ser::SerializeMap;

use crate::catalog::{Catalog, HardwareEvent};
use crate::cgroup::ProcessEnumerator;
use crate::perf::{GroupReading, PerfEventSource};
use crate::rdt::RdtMonitor;

use super::ContainerSampler;

/// Scaled counter deltas summed over all CPUs, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDeltas {
    events: Vec<HardwareEvent>,
    values: Vec<u64>,
}

impl CounterDeltas {
    pub fn iter(&self) -> impl Iterator<Item = (HardwareEvent, u64)> + '_ {
        self.events.iter().copied().zip(self.values.iter().copied())
    }
}

/// Serialized as a map from event identifier to value, keeping catalog order.
impl serde::Serialize for CounterDeltas {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (event, value) in self.iter() {
            map.serialize_entry(event.identifier(), &value)?;
        }
        map.end()
    }
}

/// One group read, with values spread out to catalog positions.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupSample {
    values: Vec<u64>,
    enabled: u64,
    running: u64,
}

impl GroupSample {
    fn scaled_delta(&self, previous: &GroupSample, catalog: &Catalog) -> Vec<u64> {
        let (Some(enabled), Some(running)) = (
            self.enabled.checked_sub(previous.enabled),
            self.running.checked_sub(previous.running),
        ) else {
            log::debug!("counter group times went backwards, dropping delta");
            return vec![0; catalog.len()];
        };

        catalog
            .iter()
            .zip(self.values.iter().zip(&previous.values))
            .map(|(spec, (current, previous))| match current.checked_sub(*previous) {
                Some(raw) => spec.scaling.apply(raw, enabled, running),
                None => {
                    log::debug!("`{}` counter went backwards, dropping delta", spec.identifier());
                    0
                }
            })
            .collect()
    }
}

/// The counter group of one CPU: the leader (catalog position 0) and its followers.
pub(super) struct CpuCounters<D> {
    cpu: usize,
    leader: Option<D>,
    followers: Vec<Option<D>>,
    baseline: Option<GroupSample>,
}

impl<D> CpuCounters<D> {
    pub(super) fn open<P>(perf: &P, scope: BorrowedFd<'_>, cpu: usize, catalog: &Catalog) -> Self
    where
        P: PerfEventSource<Descriptor = D>,
    {
        let mut row = Self {
            cpu,
            leader: None,
            followers: Vec::with_capacity(catalog.len() - 1),
            baseline: None,
        };

        let leader = match perf.open_leader(scope, cpu, catalog.leader()) {
            Ok(leader) => leader,
            Err(err) => {
                log::warn!("no hardware counters on cpu {cpu}: {err}");
                row.followers.resize_with(catalog.len() - 1, || None);
                return row;
            }
        };

        for spec in catalog.iter().skip(1) {
            let follower = perf
                .open_follower(&leader, scope, cpu, spec)
                .inspect_err(|err| log::warn!("counter disabled: {err}"))
                .ok();
            row.followers.push(follower);
        }
        row.leader = Some(leader);
        row
    }

    pub(super) fn has_leader(&self) -> bool {
        self.leader.is_some()
    }

    /// Catalog positions of the opened counters, in group order.
    fn opened_columns(&self) -> Vec<usize> {
        if self.leader.is_none() {
            return Vec::new();
        }
        std::iter::once(0)
            .chain(
                self.followers
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.is_some())
                    .map(|(i, _)| i + 1),
            )
            .collect()
    }

    fn slots(&self) -> impl Iterator<Item = (usize, &D)> {
        self.leader
            .iter()
            .map(|leader| (0, leader))
            .chain(
                self.followers
                    .iter()
                    .enumerate()
                    .filter_map(|(i, slot)| slot.as_ref().map(|fd| (i + 1, fd))),
            )
    }

    pub(super) fn activate<P>(&self, perf: &P, catalog: &Catalog)
    where
        P: PerfEventSource<Descriptor = D>,
    {
        for (column, descriptor) in self.slots() {
            if let Err(err) = perf.activate(descriptor) {
                let event = catalog.get(column).map(|spec| spec.identifier());
                log::warn!(
                    "failed to activate counter: cpu={}, event={event:?}, error={err}",
                    self.cpu
                );
            }
        }
    }

    /// Reads the group and returns its scaled deltas against the previous read.
    ///
    /// Returns `None` if there is no leader, the read failed or no baseline exists yet. A
    /// failed read drops the baseline, so the next successful read only re-seeds it.
    fn sample<P>(&mut self, perf: &P, catalog: &Catalog) -> Option<Vec<u64>>
    where
        P: PerfEventSource<Descriptor = D>,
    {
        let leader = self.leader.as_ref()?;
        let columns = self.opened_columns();
        let reading = match perf.read_group(leader, columns.len()) {
            Ok(reading) => reading,
            Err(err) => {
                log::warn!("failed to read counters of cpu {}: {err}", self.cpu);
                self.baseline = None;
                return None;
            }
        };

        let current = spread(reading, &columns, catalog.len());
        let delta = self
            .baseline
            .as_ref()
            .map(|previous| current.scaled_delta(previous, catalog));
        self.baseline = Some(current);
        delta
    }

    pub(super) fn close<P>(self, perf: &P)
    where
        P: PerfEventSource<Descriptor = D>,
    {
        // followers first, the leader owns the group
        for follower in self.followers.into_iter().flatten() {
            perf.close(follower);
        }
        if let Some(leader) = self.leader {
            perf.close(leader);
        }
    }
}

fn spread(reading: GroupReading, columns: &[usize], len: usize) -> GroupSample {
    let mut values = vec![0; len];
    for (&column, value) in columns.iter().zip(reading.values) {
        values[column] = value;
    }
    GroupSample {
        values,
        enabled: reading.time_enabled,
        running: reading.time_running,
    }
}

impl<P, R, E> ContainerSampler<P, R, E>
where
    P: PerfEventSource,
    R: RdtMonitor,
    E: ProcessEnumerator,
{
    /// Reads every CPU's counter group and sums the scaled deltas per catalog entry.
    ///
    /// Returns `None` on the first call, and whenever no CPU produced a delta.
    pub fn poll_perf(&mut self) -> Option<CounterDeltas> {
        let catalog = &self.ctx.catalog;
        let mut totals = vec![0u64; catalog.len()];
        let mut contributed = false;

        for row in &mut self.counters {
            let Some(deltas) = row.sample(&self.ctx.perf, catalog) else {
                continue;
            };
            for (total, delta) in totals.iter_mut().zip(deltas) {
                *total = total.saturating_add(delta);
            }
            contributed = true;
        }

        contributed.then(|| CounterDeltas {
            events: catalog.iter().map(|spec| spec.event).collect(),
            values: totals,
        })
    }
}
