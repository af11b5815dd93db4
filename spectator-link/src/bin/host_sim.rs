//! Simulated device host
//!
//! Listens for one client at a time and streams a circling head pose plus a
//! periodically regenerated spatial mapping mesh set, using the same frame
//! layout as the real host.
//!
//! Usage: `host-sim [config path] [--bind <addr>] [--mesh-interval <secs>]`

use spectator_link::host::{FrameWriter, encode_mesh_set};
use spectator_link::mesh::TRANSFORM_LEN;
use spectator_link::{Config, Error, Mesh, MeshTransform, PoseSample, Result};
use std::env;
use std::io::{BufWriter, ErrorKind};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const POSE_RATE_HZ: u64 = 60;

struct SimArgs {
    config: Config,
    bind: String,
    mesh_interval: Duration,
}

fn parse_args() -> Result<SimArgs> {
    let args: Vec<String> = env::args().collect();
    let flag_value = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let config = match args.get(1).filter(|a| !a.starts_with('-')) {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };
    let bind =
        flag_value("--bind").unwrap_or_else(|| format!("0.0.0.0:{}", config.connection.port));
    let mesh_interval = match flag_value("--mesh-interval") {
        Some(v) => Duration::from_secs_f64(
            v.parse::<f64>()
                .map_err(|e| Error::Config(format!("Invalid --mesh-interval {}: {}", v, e)))?,
        ),
        None => Duration::from_secs(2),
    };

    Ok(SimArgs {
        config,
        bind,
        mesh_interval,
    })
}

fn main() -> Result<()> {
    let args = parse_args()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.config.logging.level.as_str()),
    )
    .init();

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let listener = TcpListener::bind(&args.bind)?;
    listener.set_nonblocking(true)?;
    log::info!(
        "Host simulator listening on {} (fragment capacity {} bytes)",
        args.bind,
        args.config.protocol.fragment_payload_capacity
    );

    let started = Instant::now();
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("Client connected: {}", addr);
                if let Err(e) = serve_client(stream, &args, started, &running) {
                    log::info!("Client {} disconnected: {}", addr, e);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => log::error!("Accept error: {}", e),
        }
    }

    log::info!("Host simulator stopped");
    Ok(())
}

fn serve_client(
    stream: TcpStream,
    args: &SimArgs,
    started: Instant,
    running: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let mut writer = FrameWriter::new(
        BufWriter::new(stream),
        args.config.protocol.fragment_payload_capacity,
    );

    let pose_period = Duration::from_millis(1000 / POSE_RATE_HZ);
    let mut last_mesh: Option<Instant> = None;
    let mut generation: u32 = 0;

    while running.load(Ordering::Relaxed) {
        let elapsed = started.elapsed();
        writer.write_pose(&circling_pose(elapsed))?;

        if last_mesh.is_none_or(|t| t.elapsed() >= args.mesh_interval) {
            generation += 1;
            let bytes = encode_mesh_set(&synthetic_mesh_set(generation))?;
            let fragments = writer.write_mesh_set(&bytes)?;
            log::info!(
                "Sent mesh set {} ({} bytes in {} fragments)",
                generation,
                bytes.len(),
                fragments
            );
            last_mesh = Some(Instant::now());
        }

        writer.flush()?;
        thread::sleep(pose_period);
    }
    Ok(())
}

/// Head moving on a 1 m circle at eye height while slowly turning
fn circling_pose(elapsed: Duration) -> PoseSample {
    let t = elapsed.as_secs_f32();
    let angle = t * 0.5;
    let half = angle * 0.5;
    // Sender clock ticks are 100 µs
    let sent_time = (elapsed.as_micros() / 100) as i64;
    PoseSample::new(
        [angle.cos(), 1.6, angle.sin()],
        [0.0, half.sin(), 0.0, half.cos()],
        sent_time,
    )
}

/// A few flat grid patches; the grid grows with each generation
fn synthetic_mesh_set(generation: u32) -> Vec<Mesh> {
    let size = 2 + (generation % 8) as usize;
    (0..3)
        .map(|patch| {
            let mut vertices = Vec::with_capacity(size * size);
            for row in 0..size {
                for col in 0..size {
                    vertices.push([col as f32 * 0.25, 0.0, row as f32 * 0.25]);
                }
            }

            let mut indices = Vec::new();
            for row in 0..size - 1 {
                for col in 0..size - 1 {
                    let i = (row * size + col) as i16;
                    let s = size as i16;
                    indices.extend([i, i + s, i + 1, i + 1, i + s, i + s + 1]);
                }
            }

            Mesh {
                vertex_section_len: TRANSFORM_LEN + vertices.len() * 12,
                index_section_len: indices.len() * 2,
                transform: MeshTransform {
                    translation: [patch as f32 * 2.0, 0.0, -1.0],
                    ..MeshTransform::IDENTITY
                },
                vertices,
                indices,
            }
        })
        .collect()
}
