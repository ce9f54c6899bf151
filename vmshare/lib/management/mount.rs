use std::path::Path;

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use sqlx::{Pool, Sqlite};
use tokio::fs;
use tokio::signal::unix::{signal as unix_signal, SignalKind};

use crate::config::{MountSpec, MOUNTS_DB_PATH};
use crate::management::{db, endpoint, endpoint::Endpoint};
use crate::server::ShareServer;
use crate::vm::{GuestMountRequest, Machine};
use crate::{VmshareError, VmshareResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Everything needed to set up and hold a share.
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// The host directory and guest mount point.
    pub spec: MountSpec,

    /// Explicit host address, skipping discovery.
    pub ip: Option<String>,

    /// 9P protocol version to request.
    pub version: String,

    /// Default uid files are mapped to in the guest.
    pub uid: u32,

    /// Default gid files are mapped to in the guest.
    pub gid: u32,

    /// 9P message size in bytes.
    pub msize: u32,

    /// Machine profile to mount into.
    pub profile: String,
}

/// How a mount invocation concluded.
#[derive(Debug, PartialEq, Eq)]
pub enum MountOutcome {
    /// The share ran and has now shut down.
    Completed,

    /// The profile's driver cannot receive a mount; nothing was done.
    DriverUnsupported,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Validates a mount spec against the local filesystem.
///
/// The guest path must be absolute; the host directory must be statable. No
/// other side effects.
pub async fn validate_spec(spec: &MountSpec) -> VmshareResult<()> {
    let guest_dir = spec.get_guest_dir();
    if guest_dir.as_str().is_empty() || !guest_dir.is_absolute() {
        return Err(VmshareError::GuestPathNotAbsolute(
            guest_dir.as_str().to_string(),
        ));
    }

    let host_dir = spec.get_host_dir();
    match fs::metadata(host_dir).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(VmshareError::HostPathNotFound(
            host_dir.display().to_string(),
        )),
        Err(e) => Err(VmshareError::HostPathAccess {
            path: host_dir.display().to_string(),
            source: e,
        }),
    }
}

/// Shares a host directory into the guest and blocks until the share ends.
///
/// Sets up the share server task, delivers the mount request to the guest,
/// records the daemon, then waits on the server task or a termination signal.
/// The guest-side 9P client retries its connect, so the mount request is sent
/// without waiting for the listener to come up.
pub async fn mount_share(options: MountOptions) -> VmshareResult<MountOutcome> {
    validate_spec(&options.spec).await?;

    let machine = Machine::load(&options.profile).await?;
    if !machine.supports_mount() {
        tracing::warn!(
            "profile {:?} runs without a VM; host files are already directly accessible",
            options.profile
        );
        return Ok(MountOutcome::DriverUnsupported);
    }

    let endpoint = endpoint::resolve_endpoint(options.ip.as_deref(), &machine).await?;
    tracing::info!("sharing {} at {}:{}", options.spec, endpoint.ip, endpoint.port);

    let server = ShareServer::new(
        options.spec.get_host_dir(),
        endpoint::BIND_HOST,
        endpoint.port,
        options.msize,
    );
    let mut server_handle = tokio::spawn(async move { server.start().await });

    let request = GuestMountRequest {
        ip: endpoint.ip,
        port: endpoint.port,
        guest_path: options.spec.get_guest_dir().clone(),
        version: options.version.clone(),
        uid: options.uid,
        gid: options.gid,
        msize: options.msize,
    };
    if let Err(e) = request.execute(&machine).await {
        server_handle.abort();
        return Err(e);
    }

    let pool = db::init_mounts_db(&*MOUNTS_DB_PATH).await?;
    record_daemon(&pool, &options, &endpoint).await?;

    let mut sigterm = unix_signal(SignalKind::terminate())?;
    let mut sigint = unix_signal(SignalKind::interrupt())?;

    let result = tokio::select! {
        joined = &mut server_handle => match joined {
            Ok(server_result) => server_result,
            Err(e) => Err(VmshareError::custom(e)),
        },
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down share");
            server_handle.abort();
            Ok(())
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down share");
            server_handle.abort();
            Ok(())
        }
    };

    // Teardown symmetry: the record goes away however the share ends
    db::delete_mount(&pool, &options.profile).await?;

    result.map(|_| MountOutcome::Completed)
}

/// Terminates the recorded mount daemon for a profile.
///
/// Returns `NoActiveMount` when nothing is recorded; a stale record whose
/// process is already gone is cleaned up silently. Idempotent.
pub async fn kill_mount(profile: &str) -> VmshareResult<()> {
    kill_mount_at(&*MOUNTS_DB_PATH, profile).await
}

/// `kill_mount` against an explicit database path.
pub async fn kill_mount_at(db_path: &Path, profile: &str) -> VmshareResult<()> {
    let pool = db::init_mounts_db(db_path).await?;

    let record = db::get_mount(&pool, profile)
        .await?
        .ok_or_else(|| VmshareError::NoActiveMount(profile.to_string()))?;

    terminate_pid(&pool, profile, record.pid).await
}

async fn terminate_pid(pool: &Pool<Sqlite>, profile: &str, pid: i64) -> VmshareResult<()> {
    // A non-positive pid would address a process group or every process
    let pid = i32::try_from(pid)
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| VmshareError::Termination {
            pid,
            reason: "recorded pid is not a valid process id".to_string(),
        })?;

    match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => {
            tracing::info!("sent SIGTERM to mount daemon (pid {})", pid);
        }
        // The process is already gone; only the record is stale
        Err(nix::errno::Errno::ESRCH) => {
            tracing::warn!("mount daemon (pid {}) already exited, removing stale record", pid);
        }
        Err(e) => {
            return Err(VmshareError::Termination {
                pid: pid.into(),
                reason: e.to_string(),
            });
        }
    }

    db::delete_mount(pool, profile).await?;
    Ok(())
}

async fn record_daemon(
    pool: &Pool<Sqlite>,
    options: &MountOptions,
    endpoint: &Endpoint,
) -> VmshareResult<()> {
    db::record_mount(
        pool,
        &options.profile,
        &options.spec.get_host_dir().display().to_string(),
        options.spec.get_guest_dir().as_str(),
        &endpoint.ip.to_string(),
        endpoint.port,
        std::process::id(),
    )
    .await
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::config::MountSpec;

    #[tokio::test]
    async fn test_validate_spec_accepts_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let spec = MountSpec::new(dir.path(), "/mnt/shared");
        validate_spec(&spec).await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_spec_rejects_relative_guest_path() {
        let dir = tempfile::tempdir().unwrap();
        for guest in ["", "relative/path"] {
            let spec = MountSpec::new(dir.path(), guest);
            assert!(matches!(
                validate_spec(&spec).await,
                Err(VmshareError::GuestPathNotAbsolute(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_validate_spec_distinguishes_missing_host_dir() {
        let dir = tempfile::tempdir().unwrap();
        let spec = MountSpec::new(dir.path().join("nope"), "/mnt/shared");
        assert!(matches!(
            validate_spec(&spec).await,
            Err(VmshareError::HostPathNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_spec_reports_inaccessible_host_dir() {
        // stat ignores permission bits for root, so there is nothing to test
        if nix::unistd::geteuid().is_root() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("outer");
        let inner = outer.join("inner");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::set_permissions(&outer, std::fs::Permissions::from_mode(0o000)).unwrap();

        let spec = MountSpec::new(inner, "/mnt/shared");
        let result = validate_spec(&spec).await;

        // Restore so the tempdir can be cleaned up
        std::fs::set_permissions(&outer, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(VmshareError::HostPathAccess { .. })));
    }

    #[tokio::test]
    async fn test_kill_without_record_is_no_active_mount() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mounts.db");

        let result = kill_mount_at(&db_path, "default").await;
        assert!(matches!(result, Err(VmshareError::NoActiveMount(_))));

        // Second attempt behaves identically
        let result = kill_mount_at(&db_path, "default").await;
        assert!(matches!(result, Err(VmshareError::NoActiveMount(_))));
    }

    #[tokio::test]
    async fn test_kill_with_stale_record_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mounts.db");
        let pool = db::init_mounts_db(&db_path).await.unwrap();

        // A pid that cannot exist on linux
        db::record_mount(&pool, "default", "/a", "/mnt/a", "10.0.2.2", 4000, 0x7fffffff)
            .await
            .unwrap();

        kill_mount_at(&db_path, "default").await.unwrap();
        assert!(db::get_mount(&pool, "default").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kill_refuses_non_positive_recorded_pid() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mounts.db");
        let pool = db::init_mounts_db(&db_path).await.unwrap();

        db::record_mount(&pool, "default", "/a", "/mnt/a", "10.0.2.2", 4000, 0)
            .await
            .unwrap();

        let result = kill_mount_at(&db_path, "default").await;
        assert!(matches!(
            result,
            Err(VmshareError::Termination { pid: 0, .. })
        ));

        // The record is left in place for inspection
        assert!(db::get_mount(&pool, "default").await.unwrap().is_some());
    }
}
