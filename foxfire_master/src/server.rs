// UDP socket loop for the master server.
//
// Architecture: one background thread owning a single `UdpSocket`.
//
// - The socket runs with a short read timeout so the loop can interleave
//   request handling with periodic maintenance (host eviction, status
//   logging) and check the stop flag.
// - Every datagram goes through `HostRegistry::handle_datagram`, which
//   returns the response datagrams to send. The registry never touches the
//   socket, so all state stays unit-testable without networking.
//
// Shutdown: `MasterHandle::stop` flips an `AtomicBool` and joins the thread.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::registry::{HostRegistry, MasterConfig};

/// How long a blocking receive waits before the loop runs maintenance.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest request datagram the server accepts.
const MAX_DATAGRAM: usize = 4096;

/// Handle returned by `start_master` to control the running server.
pub struct MasterHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MasterHandle {
    /// Signal the server to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Start the master server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used to
/// let the OS pick a free port).
pub fn start_master(config: MasterConfig) -> std::io::Result<(MasterHandle, SocketAddr)> {
    let socket = UdpSocket::bind(("0.0.0.0", config.port))?;
    socket.set_read_timeout(Some(RECV_TIMEOUT))?;
    let addr = socket.local_addr()?;
    info!(app_id = %config.app_id, %addr, "master server started");

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();
    let thread = thread::spawn(move || {
        run_master(&socket, config, &keep_running_clone);
    });

    Ok((
        MasterHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main server loop. Runs until `keep_running` is set to false.
fn run_master(socket: &UdpSocket, config: MasterConfig, keep_running: &Arc<AtomicBool>) {
    let mut registry = HostRegistry::new(config);
    let mut buf = [0u8; MAX_DATAGRAM];

    while keep_running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, sender)) => {
                let responses = registry.handle_datagram(&buf[..len], sender, Instant::now());
                for (payload, target) in responses {
                    let _ = socket.send_to(&payload, target);
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Receive timeout: fall through to maintenance.
            }
            Err(_) => break,
        }

        let now = Instant::now();
        registry.trim_hosts(now);
        registry.report_status(now);
    }

    info!("master server shut down");
}
