// CLI entry point for the Foxfire master server.
//
// Starts a standalone rendezvous server that session hosts register with and
// searchers query for joinable sessions. The server lists hosts and relays
// NAT-traversal introductions — it never carries game data. See `server.rs`
// for the socket loop and `registry.rs` for the host registry.
//
// Usage:
//   master [OPTIONS]
//     --port <PORT>             Listen port (default: 14243)
//     --app-id <ID>             Application identifier (default: foxfire)
//     --secret <SECRET>         Payload secret (default: foxfire-master)
//     --general-info <TEXT>     Info string served without validation
//     --registration-secs <N>   Expected re-registration interval (default: 60)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use foxfire_master::registry::MasterConfig;
use foxfire_master::server::start_master;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = parse_args();

    let (handle, addr) = match start_master(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start master server: {e}");
            std::process::exit(1);
        }
    };

    println!("Master server listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // The process exits on SIGINT/SIGTERM by default, which tears down the
    // socket thread with it; the loop below only exists so an embedder
    // flipping the flag gets a clean join.
    let running = Arc::new(AtomicBool::new(true));
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("\nShutting down...");
    handle.stop();
}

/// Parse command-line arguments into a `MasterConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> MasterConfig {
    let mut config = MasterConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--app-id" => {
                i += 1;
                config.app_id = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--app-id requires a value");
                    std::process::exit(1);
                });
            }
            "--secret" => {
                i += 1;
                config.payload_secret = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--secret requires a value");
                    std::process::exit(1);
                });
            }
            "--general-info" => {
                i += 1;
                config.general_info = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--general-info requires a value");
                    std::process::exit(1);
                });
            }
            "--registration-secs" => {
                i += 1;
                let secs: u64 = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--registration-secs requires a valid number");
                    std::process::exit(1);
                });
                config.registration_interval = Duration::from_secs(secs);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: master [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>             Listen port (default: 14243)");
    println!("  --app-id <ID>             Application identifier (default: foxfire)");
    println!("  --secret <SECRET>         Payload secret (default: foxfire-master)");
    println!("  --general-info <TEXT>     Info string served without validation");
    println!("  --registration-secs <N>   Expected re-registration interval (default: 60)");
    println!("  --help, -h                Show this help");
}
