use clap::Parser;

use super::styles;
use crate::config::{DEFAULT_MOUNT_GID, DEFAULT_MOUNT_UID, DEFAULT_MOUNT_VERSION, DEFAULT_PROFILE};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// vmshare is a tool for sharing host directories into a local VM
#[derive(Debug, Parser)]
#[command(name = "vmshare", author, styles=styles::styles())]
pub struct VmshareArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<VmshareSubcommand>,

    /// Enable verbose logging
    #[arg(short = 'V', long)]
    pub verbose: bool,

    /// Show version
    #[arg(short = 'v', long)]
    pub version: bool,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum VmshareSubcommand {
    /// Share a host directory into the VM and keep the share alive
    #[command(name = "mount")]
    Mount {
        /// Directories to share, in the form HOST_DIR:VM_DIR
        #[arg()]
        spec: Option<String>,

        /// Host address the guest should connect to (skips discovery)
        #[arg(long)]
        ip: Option<String>,

        /// 9P protocol version to request
        #[arg(long = "9p-version", default_value = DEFAULT_MOUNT_VERSION)]
        version: String,

        /// Kill the running mount daemon for this profile instead of mounting
        #[arg(long)]
        kill: bool,

        /// Default uid all served files are mapped to in the guest
        #[arg(long, default_value_t = DEFAULT_MOUNT_UID)]
        uid: u32,

        /// Default gid all served files are mapped to in the guest
        #[arg(long, default_value_t = DEFAULT_MOUNT_GID)]
        gid: u32,

        /// 9P message size in bytes
        #[arg(long)]
        msize: Option<u32>,

        /// Machine profile to mount into
        #[arg(short = 'p', long, default_value = DEFAULT_PROFILE)]
        profile: String,
    },

    /// Show version information
    #[command(name = "version")]
    Version,
}
