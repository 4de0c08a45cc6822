/// Entry point for the Creo Sampler.
///
/// Samples CPU time, hardware counters and RDT data of every container on the host and
/// serves the latest round over HTTP.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid configuration or no usable
/// cgroup hierarchy).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug SAMPLER_INTERVAL_SECS=5 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_sampler::run().await
}
