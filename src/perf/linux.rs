use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use perf_event_open_sys::bindings;

use crate::catalog::{CounterSpec, HardwareEvent};

use super::{Error, GroupReading, PerfEventSource, Result};

/// Size of one word in the group read buffer.
const WORD: usize = std::mem::size_of::<u64>();

/// Words preceding the counter values: `nr`, `time_enabled`, `time_running`.
const HEADER_WORDS: usize = 3;

/// Kernel list of the CPUs currently online, e.g. `0-3,6`.
const ONLINE_CPUS: &str = "/sys/devices/system/cpu/online";

/// Returns the ids of the CPUs currently online.
///
/// Falls back to `0..sysconf(_SC_NPROCESSORS_ONLN)` if the kernel list is unreadable; that
/// range misses the highest ids when a CPU in the middle is offline.
pub fn online_cpus() -> Vec<usize> {
    match std::fs::read_to_string(ONLINE_CPUS) {
        Ok(list) => match parse_cpu_list(&list) {
            Some(cpus) if !cpus.is_empty() => return cpus,
            _ => log::warn!("failed to parse `{ONLINE_CPUS}`: {:?}", list.trim()),
        },
        Err(err) => log::warn!("failed to read `{ONLINE_CPUS}`: {err}"),
    }

    // SAFETY: `sysconf` has no preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n < 1 {
        log::warn!("sysconf(_SC_NPROCESSORS_ONLN) returned {n}, assuming a single cpu");
        return vec![0];
    }
    (0..n as usize).collect()
}

/// Parses a kernel cpu list such as `0-3,6,8-9`.
fn parse_cpu_list(list: &str) -> Option<Vec<usize>> {
    let mut cpus = Vec::new();
    for range in list.trim().split(',').filter(|range| !range.is_empty()) {
        match range.split_once('-') {
            Some((first, last)) => {
                let (first, last) = (first.parse::<usize>().ok()?, last.parse::<usize>().ok()?);
                if first > last {
                    return None;
                }
                cpus.extend(first..=last);
            }
            None => cpus.push(range.parse().ok()?),
        }
    }
    Some(cpus)
}

/// A counter opened through `perf_event_open(2)`; closed on drop.
#[derive(Debug)]
pub struct PerfFd(File);

/// [`PerfEventSource`] backed by the `perf_event_open(2)` system call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyscallSource;

impl SyscallSource {
    fn open(
        &self,
        spec: &CounterSpec,
        scope: BorrowedFd<'_>,
        cpu: usize,
        group_fd: libc::c_int,
    ) -> Result<PerfFd> {
        let mut attrs = bindings::perf_event_attr::default();
        attrs.size = std::mem::size_of::<bindings::perf_event_attr>() as u32;
        attrs.type_ = bindings::PERF_TYPE_HARDWARE as u32;
        attrs.config = event_config(spec.event);
        attrs.read_format = (bindings::PERF_FORMAT_GROUP
            | bindings::PERF_FORMAT_TOTAL_TIME_ENABLED
            | bindings::PERF_FORMAT_TOTAL_TIME_RUNNING) as u64;
        attrs.set_disabled(1);

        let flags =
            (bindings::PERF_FLAG_PID_CGROUP | bindings::PERF_FLAG_FD_CLOEXEC) as libc::c_ulong;
        // SAFETY: `attrs` is a fully initialised attribute struct with a matching `size`, and
        // `scope` is a live cgroup directory descriptor for the duration of the call.
        let fd = unsafe {
            perf_event_open_sys::perf_event_open(
                &mut attrs,
                scope.as_raw_fd(),
                cpu as libc::c_int,
                group_fd,
                flags,
            )
        };
        if fd < 0 {
            return Err(Error::Open {
                event: spec.event,
                cpu,
                source: std::io::Error::last_os_error(),
            });
        }

        // SAFETY: `fd` was just returned by the kernel and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(PerfFd(File::from(fd)))
    }
}

impl PerfEventSource for SyscallSource {
    type Descriptor = PerfFd;

    fn open_leader(
        &self,
        scope: BorrowedFd<'_>,
        cpu: usize,
        spec: &CounterSpec,
    ) -> Result<PerfFd> {
        self.open(spec, scope, cpu, -1)
    }

    fn open_follower(
        &self,
        leader: &PerfFd,
        scope: BorrowedFd<'_>,
        cpu: usize,
        spec: &CounterSpec,
    ) -> Result<PerfFd> {
        self.open(spec, scope, cpu, leader.0.as_raw_fd())
    }

    fn activate(&self, descriptor: &PerfFd) -> Result<()> {
        // SAFETY: the descriptor is a valid perf event fd for as long as `descriptor` lives.
        let ret = unsafe { perf_event_open_sys::ioctls::ENABLE(descriptor.0.as_raw_fd(), 0) };
        if ret < 0 {
            return Err(Error::Activate(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn read_group(&self, leader: &PerfFd, len: usize) -> Result<GroupReading> {
        let mut buf = vec![0u8; (HEADER_WORDS + len) * WORD];
        let n = (&leader.0).read(&mut buf).map_err(Error::Read)?;
        decode_group_read(&buf[..n], len)
    }

    fn close(&self, descriptor: PerfFd) {
        drop(descriptor);
    }
}

fn event_config(event: HardwareEvent) -> u64 {
    let config = match event {
        HardwareEvent::CpuCycles => bindings::PERF_COUNT_HW_CPU_CYCLES,
        HardwareEvent::Instructions => bindings::PERF_COUNT_HW_INSTRUCTIONS,
        HardwareEvent::CacheReferences => bindings::PERF_COUNT_HW_CACHE_REFERENCES,
        HardwareEvent::CacheMisses => bindings::PERF_COUNT_HW_CACHE_MISSES,
        HardwareEvent::BranchInstructions => bindings::PERF_COUNT_HW_BRANCH_INSTRUCTIONS,
        HardwareEvent::BranchMisses => bindings::PERF_COUNT_HW_BRANCH_MISSES,
        HardwareEvent::RefCpuCycles => bindings::PERF_COUNT_HW_REF_CPU_CYCLES,
        HardwareEvent::StalledCyclesFrontend => bindings::PERF_COUNT_HW_STALLED_CYCLES_FRONTEND,
        HardwareEvent::StalledCyclesBackend => bindings::PERF_COUNT_HW_STALLED_CYCLES_BACKEND,
    };
    config as u64
}

/// Decodes a `PERF_FORMAT_GROUP | TOTAL_TIME_ENABLED | TOTAL_TIME_RUNNING` read:
/// `{ nr, time_enabled, time_running, value[nr] }`, all native-endian `u64`.
fn decode_group_read(buf: &[u8], len: usize) -> Result<GroupReading> {
    let expected = (HEADER_WORDS + len) * WORD;
    if buf.len() < expected {
        return Err(Error::ShortRead {
            expected,
            actual: buf.len(),
        });
    }

    let mut words = buf
        .chunks_exact(WORD)
        .map(|chunk| u64::from_ne_bytes(chunk.try_into().unwrap_or_default()));
    let mut next = || words.next().unwrap_or_default();

    let nr = next() as usize;
    if nr != len {
        return Err(Error::GroupSize {
            expected: len,
            actual: nr,
        });
    }
    let time_enabled = next();
    let time_running = next();
    let values = (0..len).map(|_| next()).collect();

    Ok(GroupReading {
        values,
        time_enabled,
        time_running,
    })
}
