use std::net::IpAddr;

use tokio::process::Command;
use typed_path::Utf8UnixPathBuf;

use crate::vm::Machine;
use crate::{VmshareError, VmshareResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A request to mount a 9P share inside the guest.
#[derive(Debug, Clone)]
pub struct GuestMountRequest {
    /// Host address the guest connects to.
    pub ip: IpAddr,

    /// Port the share server listens on.
    pub port: u16,

    /// Mount point inside the guest.
    pub guest_path: Utf8UnixPathBuf,

    /// 9P protocol version to request.
    pub version: String,

    /// Default uid files are mapped to.
    pub uid: u32,

    /// Default gid files are mapped to.
    pub gid: u32,

    /// 9P message size in bytes.
    pub msize: u32,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl GuestMountRequest {
    /// The shell command run inside the guest to perform the mount.
    ///
    /// The mount point is single-quoted so paths with spaces or shell
    /// metacharacters survive the remote shell intact.
    pub fn mount_command(&self) -> String {
        format!(
            "sudo mkdir -p '{guest_path}' && sudo mount -t 9p -o trans=tcp,port={port},dfltuid={uid},dfltgid={gid},version={version},msize={msize} {ip} '{guest_path}'",
            guest_path = self.guest_path,
            port = self.port,
            uid = self.uid,
            gid = self.gid,
            version = self.version,
            msize = self.msize,
            ip = self.ip,
        )
    }

    /// Delivers the mount request over the machine's SSH channel.
    pub async fn execute(&self, machine: &Machine) -> VmshareResult<()> {
        let guest_ip = machine.get_guest_ip().as_ref().ok_or_else(|| {
            VmshareError::GuestMount(format!(
                "profile {:?} has no recorded guest address",
                machine.get_name()
            ))
        })?;

        let output = Command::new("ssh")
            .arg("-i")
            .arg(machine.get_ssh_key_path())
            .arg("-p")
            .arg(machine.get_ssh_port().to_string())
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg(format!("{}@{}", machine.get_ssh_user(), guest_ip))
            .arg(self.mount_command())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VmshareError::GuestMount(format!(
                "mount command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(
            "guest mounted 9p share at {} from {}:{}",
            self.guest_path,
            self.ip,
            self.port
        );
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_command_options() {
        let request = GuestMountRequest {
            ip: "192.168.64.1".parse().unwrap(),
            port: 41641,
            guest_path: Utf8UnixPathBuf::from("/mnt/shared"),
            version: "9p2000.u".to_string(),
            uid: 1001,
            gid: 1001,
            msize: 262144,
        };

        let cmd = request.mount_command();
        assert!(cmd.starts_with("sudo mkdir -p '/mnt/shared' && "));
        assert!(cmd.contains("mount -t 9p"));
        assert!(cmd.contains("trans=tcp"));
        assert!(cmd.contains("port=41641"));
        assert!(cmd.contains("dfltuid=1001"));
        assert!(cmd.contains("dfltgid=1001"));
        assert!(cmd.contains("version=9p2000.u"));
        assert!(cmd.contains("msize=262144"));
        assert!(cmd.ends_with("192.168.64.1 '/mnt/shared'"));
    }

    #[test]
    fn test_mount_command_quotes_awkward_guest_path() {
        let request = GuestMountRequest {
            ip: "10.0.2.2".parse().unwrap(),
            port: 41641,
            guest_path: Utf8UnixPathBuf::from("/mnt/my shared; dir"),
            version: "9p2000.u".to_string(),
            uid: 1001,
            gid: 1001,
            msize: 262144,
        };

        let cmd = request.mount_command();
        assert!(cmd.starts_with("sudo mkdir -p '/mnt/my shared; dir' && "));
        assert!(cmd.ends_with("10.0.2.2 '/mnt/my shared; dir'"));
    }
}
