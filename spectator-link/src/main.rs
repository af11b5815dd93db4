//! SpectatorLink - compositor-side client daemon
//!
//! Connects to the device host, keeps the pose cache and mesh snapshots
//! current, and runs a compositor-style tick loop that consumes them.
//!
//! Usage:
//! - `spectator-link <path>` or `spectator-link --config <path>`
//! - `spectator-link --host <ip>` to override the device host address
//!
//! Without a path, `spectator-link.toml` in the working directory is used if
//! present, defaults otherwise.

use spectator_link::transport::TcpConnector;
use spectator_link::{Config, Error, Result, SharedState, Supervisor};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_CONFIG_PATH: &str = "spectator-link.toml";

/// Interval between status lines
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

struct CliArgs {
    config_path: Option<String>,
    host: Option<String>,
}

/// Parse command line arguments.
fn parse_args() -> CliArgs {
    let args: Vec<String> = env::args().collect();

    let flag_value = |names: &[&str]| {
        args.iter()
            .position(|a| names.contains(&a.as_str()))
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let config_path = flag_value(&["--config", "-c"]).or_else(|| {
        args.get(1)
            .filter(|a| !a.starts_with('-'))
            .cloned()
    });

    CliArgs {
        config_path,
        host: flag_value(&["--host"]),
    }
}

fn load_config(args: &CliArgs) -> Result<(Config, String)> {
    let (mut config, source) = match &args.config_path {
        Some(path) => (Config::load(Path::new(path))?, path.clone()),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => (
            Config::load(Path::new(DEFAULT_CONFIG_PATH))?,
            DEFAULT_CONFIG_PATH.to_string(),
        ),
        None => (Config::default(), "defaults".to_string()),
    };

    if let Some(host) = &args.host {
        config.connection.host = host.clone();
    }

    Ok((config, source))
}

fn main() -> Result<()> {
    let args = parse_args();
    let (config, source) = load_config(&args)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("SpectatorLink v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", source);
    log::info!(
        "Device host: {} (fragment capacity {} bytes, remainder policy {:?})",
        config.address(),
        config.protocol.fragment_payload_capacity,
        config.mesh.remainder_policy
    );

    let shared = Arc::new(SharedState::new(config.pose.cache_capacity));

    let signal_state = Arc::clone(&shared);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        signal_state.request_shutdown();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let connector = TcpConnector::new(
        config.address(),
        config.connection.connect_timeout(),
        config.connection.read_timeout(),
        shared.running_flag(),
    );
    let supervisor = Supervisor::start(&config, connector, Arc::clone(&shared))?;

    log::info!("SpectatorLink running. Press Ctrl-C to stop.");
    run_compositor_loop(&config, &shared);

    log::info!("Shutting down...");
    supervisor.shutdown();

    let stats = shared.stats();
    log::info!(
        "SpectatorLink stopped: {} poses, {} fragments, {} mesh sets, {} reconnects",
        stats.poses_received,
        stats.fragments_received,
        stats.mesh_sets_published,
        stats.reconnects
    );
    Ok(())
}

/// Consume poses and mesh sets at the compositor tick rate until shutdown
fn run_compositor_loop(config: &Config, shared: &SharedState) {
    let tick = Duration::from_secs_f64(1.0 / f64::from(config.compositor.tick_hz));
    let frame_offset = config.compositor.frame_offset;
    let mut last_status = Instant::now();
    let mut ticks: u64 = 0;

    while shared.is_running() {
        let started = Instant::now();
        ticks += 1;

        let pose = shared.pose(frame_offset);
        log::trace!(
            "Tick {}: pos={:?} rot={:?} t={:.4}s",
            ticks,
            pose.position(),
            pose.rotation(),
            pose.time_seconds
        );

        if let Some(set) = shared.take_mesh_set() {
            log::info!(
                "Mesh set #{}: {} meshes, {} vertices, {} indices",
                set.sequence,
                set.len(),
                set.vertex_count(),
                set.index_count()
            );
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            let stats = shared.stats();
            log::info!(
                "Status: {} | poses={} fragments={} mesh_sets={} replaced={} errors={} reconnects={}",
                shared.connection_state(),
                stats.poses_received,
                stats.fragments_received,
                stats.mesh_sets_published,
                stats.mesh_sets_replaced,
                stats.receive_errors,
                stats.reconnects
            );
            last_status = Instant::now();
        }

        if let Some(remaining) = tick.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
}
