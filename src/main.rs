//! Milan daemon - submap merging server
//!
//! Reads submap submissions and queries as line commands on stdin:
//!
//! ```text
//! submit <robot> <submap_folder>
//! lookup <robot> <sensor> <timestamp_ns> [x y z]
//! save [folder]
//! status
//! quit
//! ```
//!
//! # Usage
//!
//! ```bash
//! # With default config (milan.toml or /etc/milan.toml if present)
//! cargo run --release
//!
//! # With custom config file and output folder override
//! cargo run --release -- --config milan.toml --merged-map-folder /data/merged
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use clap::Parser;

use milan::utils::setup_ctrl_c_handler;
use milan::{MapServer, SensorKind, ServerConfig, ShutdownToken, Vector3};

// ============================================================================
// Command Line
// ============================================================================

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Folder the merged map is saved to (overrides the config file)
    #[arg(long)]
    merged_map_folder: Option<String>,
}

// ============================================================================
// Stdin Commands
// ============================================================================

/// Handle one command line. Returns false when the daemon should exit.
fn handle_line(server: &MapServer, line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => {}
        ["submit", robot, path] => match server.submit(robot, path) {
            Ok(id) => println!("ok submap {}", id),
            Err(e) => println!("error: {}", e),
        },
        ["submit", path] => match server.submit("", path) {
            Ok(id) => println!("ok submap {}", id),
            Err(e) => println!("error: {}", e),
        },
        ["lookup", robot, sensor, ts, rest @ ..] => handle_lookup(server, robot, sensor, ts, rest),
        ["save"] => match server.save_map() {
            Ok(()) => println!("ok saved"),
            Err(e) => println!("error: {}", e),
        },
        ["save", folder] => match server.save_map_to(folder) {
            Ok(()) => println!("ok saved to {}", folder),
            Err(e) => println!("error: {}", e),
        },
        ["status"] => println!("{}", server.status()),
        ["quit"] | ["exit"] => return false,
        _ => println!("error: unknown command '{}'", line.trim()),
    }
    true
}

fn handle_lookup(server: &MapServer, robot: &str, sensor: &str, ts: &str, point: &[&str]) {
    let sensor: SensorKind = match sensor.parse() {
        Ok(s) => s,
        Err(e) => {
            println!("error: {}", e);
            return;
        }
    };
    let Ok(timestamp_ns) = ts.parse::<i64>() else {
        println!("error: invalid timestamp '{}'", ts);
        return;
    };
    let p_s = match point {
        [] => Vector3::zero(),
        [x, y, z] => match (x.parse(), y.parse(), z.parse()) {
            (Ok(x), Ok(y), Ok(z)) => Vector3::new(x, y, z),
            _ => {
                println!("error: invalid point");
                return;
            }
        },
        _ => {
            println!("error: expected x y z");
            return;
        }
    };

    match server.map_lookup(robot, sensor, timestamp_ns, &p_s) {
        Ok(result) => println!("ok p_G = {} sensor_p_G = {}", result.p_g, result.sensor_p_g),
        Err(e) => println!("{:?}: {}", e.status(), e),
    }
}

/// Forward stdin lines until EOF, `quit`, or shutdown.
fn spawn_stdin_reader(token: ShutdownToken) -> io::Result<crossbeam_channel::Receiver<String>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() || token.is_requested() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::load_or_default(args.config.as_deref());
    if let Some(folder) = args.merged_map_folder {
        config.storage.merged_map_folder = folder;
    }
    let config = config.sanitized();

    log::info!("milan starting");
    log::info!(
        "  Submap loading threads: {}",
        config.pool.submap_loading_threads
    );
    match config.storage.merged_map_path() {
        Some(folder) => log::info!("  Merged map folder: {}", folder.display()),
        None => log::warn!("  Merged map folder not set, saving disabled"),
    }
    log::info!(
        "  Backup interval: {}",
        match config.merging.backup_interval() {
            Some(interval) => format!("{:.1}s", interval.as_secs_f64()),
            None => "disabled".to_string(),
        }
    );

    let token = ShutdownToken::new();
    if let Err(e) = setup_ctrl_c_handler(token.clone()) {
        log::error!("Error setting Ctrl-C handler: {}", e);
        return;
    }

    if let Err(e) = run(config, token) {
        log::error!("Daemon error: {}", e);
    }

    log::info!("milan shutdown complete");
}

fn run(config: ServerConfig, token: ShutdownToken) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = MapServer::from_config(config, token.clone())?;
    server.start()?;

    let lines = spawn_stdin_reader(token.clone())?;
    let poll = std::time::Duration::from_millis(200);
    while !token.is_requested() {
        match lines.recv_timeout(poll) {
            Ok(line) => {
                if !handle_line(&server, &line) {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            // stdin closed: keep serving until Ctrl-C
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                token.sleep(poll);
            }
        }
    }

    server.shutdown();
    if server.has_merged_map() {
        match server.save_map() {
            Ok(()) => log::info!("Saved merged map on shutdown"),
            Err(e) => log::warn!("Could not save merged map on shutdown: {}", e),
        }
    }
    Ok(())
}
