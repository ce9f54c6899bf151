use std::{
    error::Error,
    fmt::{self, Display},
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a vmshare operation.
pub type VmshareResult<T> = Result<T, VmshareError>;

/// An error that occurred during a vmshare operation.
#[derive(pretty_error_debug::Debug, Error)]
pub enum VmshareError {
    /// Mount argument is not of the form `HOST_DIR:GUEST_DIR`.
    #[error("Invalid mount spec, must be in the form HOST_DIR:GUEST_DIR: {0:?}")]
    InvalidMountSpec(String),

    /// Guest mount point is missing or not an absolute unix path.
    #[error("Guest mount point must be an absolute path: {0:?}")]
    GuestPathNotAbsolute(String),

    /// Host directory does not exist.
    #[error("Host directory not found: {0}")]
    HostPathNotFound(String),

    /// Host directory exists but could not be inspected.
    #[error("Cannot access host directory {path}: {source}")]
    HostPathAccess {
        /// The host directory.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// `--ip` was given but is not a valid address literal.
    #[error("Invalid mount ip: {0:?}")]
    InvalidMountIp(String),

    /// The host address visible from the guest could not be determined.
    #[error("Failed to discover host address for the guest: {0}")]
    NetworkDiscovery(String),

    /// No free port in the probed range.
    #[error("No available ports on {host} in range {start}-{end}")]
    NoAvailablePorts {
        /// The host address probed.
        host: String,
        /// First port probed.
        start: u32,
        /// Last port probed.
        end: u32,
    },

    /// The guest refused or failed the mount command.
    #[error("Guest mount failed: {0}")]
    GuestMount(String),

    /// No machine profile with the given name.
    #[error("Machine profile not found: {0:?}")]
    MachineNotFound(String),

    /// No mount daemon is recorded for the profile.
    #[error("No active mount for profile: {0:?}")]
    NoActiveMount(String),

    /// The recorded daemon could not be signalled.
    #[error("Failed to terminate mount daemon (pid {pid}): {reason}")]
    Termination {
        /// The recorded process id.
        pid: i64,
        /// Why the signal failed.
        reason: String,
    },

    /// 9P server error.
    #[error("9P server error: {0}")]
    Ninep(#[from] ninepserve::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Database migration error.
    #[error("Database migration error: {0}")]
    SqlxMigration(#[from] sqlx::migrate::MigrateError),

    /// Profile file could not be parsed.
    #[error("Profile parse error: {0}")]
    ProfileParse(#[from] serde_json::Error),

    /// Custom error.
    #[error("Custom error: {0}")]
    Custom(#[from] AnyError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VmshareError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> VmshareError {
        VmshareError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `VmshareResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> VmshareResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
