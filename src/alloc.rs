// src/alloc.rs

use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("no free filename found for {0}")]
    Exhausted(PathBuf),
}

/// Ports reserved by [`free_ports`], with the errors of attempts that failed.
#[derive(Debug, Default)]
pub struct PortReservation {
    pub ports: Vec<u16>,
    pub errors: Vec<io::Error>,
}

/// Asks the OS for `n` ephemeral loopback ports.
///
/// Every listener stays bound until the whole batch is collected so the same
/// port cannot be handed out twice, then all are released together. Another
/// process may still grab a port before the caller binds it.
pub fn free_ports(n: usize) -> PortReservation {
    let mut reservation = PortReservation::default();
    let mut held = Vec::with_capacity(n);

    for _ in 0..n {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).and_then(|l| {
            let port = l.local_addr()?.port();
            Ok((l, port))
        }) {
            Ok((listener, port)) => {
                held.push(listener);
                reservation.ports.push(port);
            }
            Err(e) => {
                warn!("port reservation failed: {}", e);
                reservation.errors.push(e);
            }
        }
    }

    debug!(ports = ?reservation.ports, "reserved local ports");
    drop(held);
    reservation
}

/// Returns `path` if nothing exists there, otherwise the first free
/// `path.1`, `path.2`, ...
///
/// Not safe against concurrent allocators.
pub fn unique_path(path: &Path) -> Result<PathBuf, AllocError> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }
    let base = path.to_string_lossy();
    for attempt in 1..u32::MAX {
        let candidate = PathBuf::from(format!("{}.{}", base, attempt));
        if !candidate.exists() {
            debug!("{} exists, using {}", path.display(), candidate.display());
            return Ok(candidate);
        }
    }
    Err(AllocError::Exhausted(path.to_path_buf()))
}
