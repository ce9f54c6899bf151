use std::path::PathBuf;

use getset::Getters;
use ninepserve::{NinepServer, ServerConfig};

use crate::server::HostFs;
use crate::VmshareResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A 9P share server for a single host directory.
#[derive(Debug, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ShareServer {
    /// The host directory being shared.
    root_dir: PathBuf,

    /// The address to bind to.
    host: String,

    /// The port to listen on.
    port: u16,

    /// Maximum 9P message size.
    msize: u32,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ShareServer {
    /// Creates a new share server.
    pub fn new(root_dir: impl Into<PathBuf>, host: impl Into<String>, port: u16, msize: u32) -> Self {
        Self {
            root_dir: root_dir.into(),
            host: host.into(),
            port,
            msize,
        }
    }

    /// Starts the server. Runs until the process is signalled or the listener
    /// fails.
    pub async fn start(&self) -> VmshareResult<()> {
        let mut config = ServerConfig::new(format!("{}:{}", self.host, self.port));
        config.max_msize = self.msize;

        let server = NinepServer::new(config, HostFs::new(&self.root_dir));
        server.run().await?;
        Ok(())
    }
}
