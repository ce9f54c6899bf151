use tokio::net::TcpListener;

use crate::{VmshareError, VmshareResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Find the next available port starting from the provided port number
pub async fn find_available_port(host: &str, start_port: u32) -> VmshareResult<u32> {
    const MAX_PORT_ATTEMPTS: u32 = 100;
    let end_port = start_port + MAX_PORT_ATTEMPTS - 1;

    for port in start_port..=end_port {
        match TcpListener::bind((host, port as u16)).await {
            Ok(_) => return Ok(port),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(VmshareError::Io(e)),
        }
    }

    Err(VmshareError::NoAvailablePorts {
        host: host.to_string(),
        start: start_port,
        end: end_port,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_available_port_skips_bound_port() {
        // Grab an ephemeral port, hold it, then ask for it explicitly
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let held = listener.local_addr().unwrap().port() as u32;

        let found = find_available_port("127.0.0.1", held).await.unwrap();
        assert_ne!(found, held);
        assert!(found > held);
    }

    #[tokio::test]
    async fn test_find_available_port_returns_start_when_free() {
        // Bind to 0 to discover a port the OS considers free, release it,
        // then expect to get it back
        let probe = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = probe.local_addr().unwrap().port() as u32;
        drop(probe);

        let found = find_available_port("127.0.0.1", port).await.unwrap();
        assert_eq!(found, port);
    }
}
