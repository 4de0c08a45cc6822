/// Creo Sampler: per-container hardware telemetry for Linux hosts.
///
/// Every container found in the cgroup filesystem gets a sampler that periodically reports
/// its CPU time, hardware performance counters (scaled for multiplexing) and, where RDT is
/// available, last-level cache occupancy and memory bandwidth. The latest round is served
/// as JSON over HTTP.
pub mod api;
pub mod catalog;
pub mod cgroup;
pub mod config;
pub mod container;
pub mod error;
pub mod fsutil;
pub mod monitor;
pub mod mountinfo;
pub mod perf;
pub mod rdt;
pub mod sampler;

use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};

use cgroup::{CgroupLayout, CgroupTasks, HostCpuSource, ProcessEnumerator, Scanner};
use config::{Config, RdtMode};
use error::ResultOkLogExt;
use monitor::Monitor;
use perf::{PerfEventSource, SyscallSource};
use rdt::{RdtMonitor, Resctrl, Unsupported};
use sampler::SamplerContext;

/// Runs the Creo Sampler application.
///
/// Reads the configuration from the environment, detects the cgroup layout of the host,
/// starts the API server and samples all containers until interrupted.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration values.
/// - An unreadable `mountinfo` or a host without usable cgroup hierarchies.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    log::debug!("Configuration: {config:?}");

    let mounts = mountinfo::detect_cgroup_mounts(config.rootfs.join("proc/1/mountinfo"))?;
    let layout =
        CgroupLayout::from_mounts(&mounts, &config.rootfs, config.cgroup_parent.as_deref())?;
    log::debug!("Cgroup layout: {layout:?}");

    let host = HostCpuSource::new(config.rootfs.join("proc/stat"));
    let resctrl = match (config.rdt, &mounts.resctrl) {
        (RdtMode::Resctrl, Some(mount)) => {
            Some(Resctrl::new(fsutil::reroot(&config.rootfs, mount)))
        }
        (RdtMode::Resctrl, None) => {
            log::warn!("resctrl is not mounted, cache and memory bandwidth are not sampled");
            None
        }
        (RdtMode::Off, _) => None,
    };

    let catalog = config.catalog.clone();
    match resctrl {
        Some(resctrl) => {
            let ctx = SamplerContext::new(SyscallSource, resctrl, CgroupTasks, catalog, host);
            sample_forever(&config, layout, ctx).await
        }
        None => {
            let ctx = SamplerContext::new(SyscallSource, Unsupported, CgroupTasks, catalog, host);
            sample_forever(&config, layout, ctx).await
        }
    }
}

async fn sample_forever<P, R, E>(
    config: &Config,
    layout: CgroupLayout,
    ctx: SamplerContext<P, R, E>,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: PerfEventSource + 'static,
    R: RdtMonitor + 'static,
    E: ProcessEnumerator + 'static,
{
    log::info!(
        "Sampling {} counters on {} cpus every {:?}",
        ctx.catalog.len(),
        ctx.cpus.len(),
        config.interval
    );
    let monitor = Arc::new(Monitor::new(Arc::new(ctx)));
    let scanner = Arc::new(Scanner::new(layout));

    let store = api::SampleStore::default();
    {
        let store = store.clone();
        let addr = config.listen_addr;
        tokio::spawn(async move {
            api::APIServer::new(store).listen(addr).await.ok_log();
        });
    }

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    };

    let sampled = sample_until(config.interval, shutdown, || {
        let monitor = Arc::clone(&monitor);
        let scanner = Arc::clone(&scanner);
        let store = store.clone();
        async move {
            let timestamp = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)?
                .as_secs();
            log::trace!("Sampling containers@{timestamp}");

            let (samples, containers) = tokio::task::spawn_blocking(move || {
                if let Some(present) = scanner.scan().ok_log() {
                    monitor.sync(&present);
                }

                let mut out = Vec::with_capacity(monitor.size());
                let before = std::time::Instant::now();
                monitor.collect_samples(timestamp, &mut out);
                let took = before.elapsed();
                log::trace!("collect_samples() took {} nanoseconds", took.as_nanos());
                (out, monitor.containers())
            })
            .await?;

            store.publish(timestamp, samples, containers).await;
            Ok::<(), Box<dyn std::error::Error>>(())
        }
    })
    .await;

    log::info!("Shutting down, tearing down {} samplers", monitor.size());
    tokio::task::spawn_blocking(move || monitor.shutdown()).await?;
    sampled
}

/// Runs `round` on every tick of `period` until `shutdown` completes or a round fails.
///
/// `shutdown` is polled across rounds, so a signal received while a round is running ends
/// the loop before the next one starts.
async fn sample_until<S, F, Fut>(
    period: std::time::Duration,
    shutdown: S,
    mut round: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: Future,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), Box<dyn std::error::Error>>>,
{
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(()),
            _ = interval.tick() => {}
        }
        round().await?;
    }
}
