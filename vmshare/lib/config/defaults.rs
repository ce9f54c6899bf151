use std::{path::PathBuf, sync::LazyLock};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default 9P protocol version requested from the guest.
pub const DEFAULT_MOUNT_VERSION: &str = "9p2000.u";

/// The default 9P message size in bytes.
pub const DEFAULT_MSIZE: u32 = 262144;

/// The default uid all served files are mapped to in the guest.
pub const DEFAULT_MOUNT_UID: u32 = 1001;

/// The default gid all served files are mapped to in the guest.
pub const DEFAULT_MOUNT_GID: u32 = 1001;

/// The default machine profile name.
pub const DEFAULT_PROFILE: &str = "default";

/// The first port probed when allocating a share port.
pub const DEFAULT_SHARE_PORT: u32 = 41641;

/// The directory holding vmshare state (`~/.vmshare`).
pub static VMSHARE_HOME_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vmshare")
});

/// Path to the mount daemon database.
pub static MOUNTS_DB_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| VMSHARE_HOME_DIR.join("mounts.db"));

/// Directory holding machine profile files.
pub static PROFILES_DIR: LazyLock<PathBuf> = LazyLock::new(|| VMSHARE_HOME_DIR.join("profiles"));
