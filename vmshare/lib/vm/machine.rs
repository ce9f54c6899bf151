use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use getset::Getters;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::PROFILES_DIR;
use crate::{VmshareError, VmshareResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The hypervisor driver backing a machine profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineDriver {
    /// QEMU with user-mode networking
    Qemu,
    /// VirtualBox with a host-only adapter
    Virtualbox,
    /// Hyperkit with a host-only network
    Hyperkit,
    /// No VM; the workload runs directly on the host
    None,
}

/// A local VM as described by its profile file.
///
/// Profiles live at `~/.vmshare/profiles/<name>.json` and record the driver,
/// the guest's address, and how to reach its management (SSH) channel.
#[derive(Debug, Clone, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Machine {
    /// Profile name.
    name: String,

    /// Hypervisor driver.
    driver: MachineDriver,

    /// The guest's IP address as seen from the host.
    guest_ip: Option<IpAddr>,

    /// SSH user on the guest.
    ssh_user: String,

    /// SSH port on the guest.
    ssh_port: u16,

    /// Path to the SSH identity file for the guest.
    ssh_key_path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Machine {
    /// Loads the machine profile with the given name.
    pub async fn load(profile: &str) -> VmshareResult<Self> {
        let path = PROFILES_DIR.join(format!("{}.json", profile));
        Self::load_from(profile, &path).await
    }

    /// Loads a machine profile from an explicit path.
    pub async fn load_from(profile: &str, path: &Path) -> VmshareResult<Self> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VmshareError::MachineNotFound(profile.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let machine: Machine = serde_json::from_str(&contents)?;
        Ok(machine)
    }

    /// Whether this machine can receive a 9P mount.
    ///
    /// Driverless profiles share the host's filesystem already, so there is
    /// nothing to mount.
    pub fn supports_mount(&self) -> bool {
        self.driver != MachineDriver::None
    }

    /// The host address a client inside the guest can reach the host at.
    pub fn host_ip_visible_from_guest(&self) -> VmshareResult<IpAddr> {
        match self.driver {
            // User-mode networking routes the host through the NAT gateway
            MachineDriver::Qemu => Ok(IpAddr::V4(Ipv4Addr::new(10, 0, 2, 2))),
            MachineDriver::Virtualbox | MachineDriver::Hyperkit => {
                // The host sits at .1 on the guest's host-only subnet
                let guest_ip = self.guest_ip.ok_or_else(|| {
                    VmshareError::NetworkDiscovery(format!(
                        "profile {:?} has no recorded guest address",
                        self.name
                    ))
                })?;
                match guest_ip {
                    IpAddr::V4(v4) => {
                        let [a, b, c, _] = v4.octets();
                        Ok(IpAddr::V4(Ipv4Addr::new(a, b, c, 1)))
                    }
                    IpAddr::V6(_) => Err(VmshareError::NetworkDiscovery(format!(
                        "profile {:?} has an IPv6 guest address; cannot derive host address",
                        self.name
                    ))),
                }
            }
            MachineDriver::None => Err(VmshareError::NetworkDiscovery(format!(
                "profile {:?} has no VM driver",
                self.name
            ))),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
