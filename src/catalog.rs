//! The ordered set of hardware events sampled for every container on every CPU.
//!
//! Entry 0 of a [`Catalog`] is opened as the group leader, all other entries join its group
//! as followers. Results produced by the perf poller are reported in catalog order.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("counter catalog must contain at least one event")]
    Empty,
    #[error("unknown hardware event `{0}`")]
    UnknownEvent(String),
    #[error("hardware event `{0}` listed more than once")]
    DuplicateEvent(HardwareEvent),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A generic hardware event understood by the kernel perf subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HardwareEvent {
    CpuCycles,
    Instructions,
    CacheReferences,
    CacheMisses,
    BranchInstructions,
    BranchMisses,
    RefCpuCycles,
    StalledCyclesFrontend,
    StalledCyclesBackend,
}

impl HardwareEvent {
    const ALL: [HardwareEvent; 9] = [
        HardwareEvent::CpuCycles,
        HardwareEvent::Instructions,
        HardwareEvent::CacheReferences,
        HardwareEvent::CacheMisses,
        HardwareEvent::BranchInstructions,
        HardwareEvent::BranchMisses,
        HardwareEvent::RefCpuCycles,
        HardwareEvent::StalledCyclesFrontend,
        HardwareEvent::StalledCyclesBackend,
    ];

    /// The name used in configuration and in exported samples, following `perf list`.
    pub fn identifier(self) -> &'static str {
        match self {
            HardwareEvent::CpuCycles => "cycles",
            HardwareEvent::Instructions => "instructions",
            HardwareEvent::CacheReferences => "cache-references",
            HardwareEvent::CacheMisses => "cache-misses",
            HardwareEvent::BranchInstructions => "branch-instructions",
            HardwareEvent::BranchMisses => "branch-misses",
            HardwareEvent::RefCpuCycles => "ref-cycles",
            HardwareEvent::StalledCyclesFrontend => "stalled-cycles-frontend",
            HardwareEvent::StalledCyclesBackend => "stalled-cycles-backend",
        }
    }
}

impl fmt::Display for HardwareEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for HardwareEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        HardwareEvent::ALL
            .into_iter()
            .find(|event| event.identifier() == s)
            .ok_or_else(|| Error::UnknownEvent(s.to_owned()))
    }
}

/// How a raw counter delta is turned into the reported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scaling {
    /// Extrapolates the delta over the time the group was enabled, compensating for
    /// counter multiplexing: `raw / enabled * running`.
    #[default]
    Multiplexed,
    /// Reports the raw delta unchanged.
    Raw,
}

impl Scaling {
    /// Applies the scaling rule to a single CPU's deltas.
    ///
    /// A CPU whose group was not enabled during the interval contributes `0`.
    pub fn apply(self, raw_delta: u64, enabled_delta: u64, running_delta: u64) -> u64 {
        if enabled_delta == 0 {
            return 0;
        }
        match self {
            Scaling::Multiplexed => {
                (raw_delta as f64 / enabled_delta as f64 * running_delta as f64) as u64
            }
            Scaling::Raw => raw_delta,
        }
    }
}

/// One catalog entry: the event to count and how to scale it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSpec {
    pub event: HardwareEvent,
    pub scaling: Scaling,
}

impl CounterSpec {
    pub fn new(event: HardwareEvent, scaling: Scaling) -> Self {
        Self { event, scaling }
    }

    pub fn identifier(&self) -> &'static str {
        self.event.identifier()
    }
}

/// A non-empty, duplicate-free, ordered list of counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CounterSpec>,
}

impl Catalog {
    /// Creates a catalog from the given entries. The first entry becomes the group leader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] for an empty list and [`Error::DuplicateEvent`] if an event
    /// appears twice.
    pub fn new(entries: Vec<CounterSpec>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Empty);
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.event == entry.event) {
                return Err(Error::DuplicateEvent(entry.event));
            }
        }
        Ok(Self { entries })
    }

    /// Parses a comma separated list of event identifiers, e.g. `cycles,instructions`.
    ///
    /// All parsed entries use [`Scaling::Multiplexed`].
    ///
    /// ```
    /// # use creo_sampler::catalog::{Catalog, HardwareEvent};
    /// let catalog = Catalog::parse("instructions, cycles").unwrap();
    /// assert_eq!(catalog.leader().event, HardwareEvent::Instructions);
    /// assert_eq!(catalog.len(), 2);
    /// ```
    pub fn parse(list: &str) -> Result<Self> {
        let entries = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Ok(CounterSpec::new(s.parse()?, Scaling::Multiplexed)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn leader(&self) -> &CounterSpec {
        &self.entries[0]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CounterSpec> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CounterSpec> {
        self.entries.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let entries = [
            HardwareEvent::CpuCycles,
            HardwareEvent::Instructions,
            HardwareEvent::CacheReferences,
            HardwareEvent::CacheMisses,
            HardwareEvent::BranchInstructions,
            HardwareEvent::BranchMisses,
        ]
        .into_iter()
        .map(|event| CounterSpec::new(event, Scaling::Multiplexed))
        .collect();
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CounterSpec;
    type IntoIter = std::slice::Iter<'a, CounterSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_leads_with_cycles() {
        let catalog = Catalog::default();
        assert_eq!(catalog.leader().event, HardwareEvent::CpuCycles);
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn test_parse_keeps_order() {
        let catalog = Catalog::parse("cache-misses,cycles,branch-misses").unwrap();
        let ids: Vec<_> = catalog.iter().map(CounterSpec::identifier).collect();
        assert_eq!(ids, vec!["cache-misses", "cycles", "branch-misses"]);
    }

    #[test]
    fn test_parse_rejects_unknown_event() {
        let err = Catalog::parse("cycles,bogus").unwrap_err();
        assert!(matches!(err, Error::UnknownEvent(name) if name == "bogus"));
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        let err = Catalog::parse("cycles,instructions,cycles").unwrap_err();
        assert!(matches!(err, Error::DuplicateEvent(HardwareEvent::CpuCycles)));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(Catalog::parse(" , ").unwrap_err(), Error::Empty));
    }

    #[test]
    fn test_multiplexed_scaling() {
        // (2000 / 2_000_000) * 1_000_000
        assert_eq!(
            Scaling::Multiplexed.apply(2000, 2_000_000, 1_000_000),
            1000
        );
    }

    #[test]
    fn test_zero_enabled_contributes_nothing() {
        assert_eq!(Scaling::Multiplexed.apply(123_456, 0, 10), 0);
        assert_eq!(Scaling::Raw.apply(123_456, 0, 10), 0);
    }

    #[test]
    fn test_raw_scaling_ignores_times() {
        assert_eq!(Scaling::Raw.apply(42, 100, 50), 42);
    }
}
