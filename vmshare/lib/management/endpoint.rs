use std::net::IpAddr;

use crate::config::DEFAULT_SHARE_PORT;
use crate::management::find::find_available_port;
use crate::vm::Machine;
use crate::{VmshareError, VmshareResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The address the share server binds to and probes ports on.
///
/// This is deliberately not the advertised endpoint address: the address the
/// guest dials can be one the host cannot bind, such as the qemu user-mode
/// NAT gateway 10.0.2.2, so the listener takes all interfaces and the
/// endpoint carries only the guest-visible address.
pub const BIND_HOST: &str = "0.0.0.0";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The address and port the guest connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Host address visible from the guest.
    pub ip: IpAddr,

    /// Share server port.
    pub port: u16,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses an explicitly supplied mount address.
///
/// Only address literals are accepted; no name resolution happens here.
pub fn parse_mount_ip(raw: &str) -> VmshareResult<IpAddr> {
    raw.parse()
        .map_err(|_| VmshareError::InvalidMountIp(raw.to_string()))
}

/// Resolves the endpoint the guest will connect to.
///
/// An explicit address bypasses VM topology discovery entirely. The port is
/// allocated once and reused as both the listen port and the advertised port.
pub async fn resolve_endpoint(
    explicit_ip: Option<&str>,
    machine: &Machine,
) -> VmshareResult<Endpoint> {
    let ip = match explicit_ip {
        Some(raw) => parse_mount_ip(raw)?,
        None => machine.host_ip_visible_from_guest()?,
    };

    let port = find_available_port(BIND_HOST, DEFAULT_SHARE_PORT).await?;

    Ok(Endpoint {
        ip,
        port: port as u16,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mount_ip_accepts_literals() {
        assert_eq!(
            parse_mount_ip("192.168.64.1").unwrap(),
            "192.168.64.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            parse_mount_ip("::1").unwrap(),
            "::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_parse_mount_ip_rejects_hostnames() {
        assert!(matches!(
            parse_mount_ip("host.local"),
            Err(VmshareError::InvalidMountIp(_))
        ));
        assert!(matches!(
            parse_mount_ip(""),
            Err(VmshareError::InvalidMountIp(_))
        ));
    }
}
