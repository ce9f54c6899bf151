use std::{fmt, path::PathBuf, str::FromStr};

use getset::Getters;
use typed_path::Utf8UnixPathBuf;

use crate::VmshareError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A host directory paired with the guest mount point it is shared at.
///
/// Parsed from `HOST_DIR:GUEST_DIR` raw text. The split happens at the **last**
/// colon so host paths containing colons stay intact: `/a:b:/c` maps host
/// `/a:b` to guest `/c`. Guest paths are always unix paths regardless of the
/// host platform.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct MountSpec {
    /// The host directory to share.
    host_dir: PathBuf,

    /// The guest mount point.
    guest_dir: Utf8UnixPathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MountSpec {
    /// Creates a mount spec from already-split paths.
    pub fn new(host_dir: impl Into<PathBuf>, guest_dir: impl Into<Utf8UnixPathBuf>) -> Self {
        Self {
            host_dir: host_dir.into(),
            guest_dir: guest_dir.into(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for MountSpec {
    type Err = VmshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, guest) = s
            .rsplit_once(':')
            .ok_or_else(|| VmshareError::InvalidMountSpec(s.to_string()))?;

        Ok(Self {
            host_dir: PathBuf::from(host),
            guest_dir: Utf8UnixPathBuf::from(guest),
        })
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_dir.display(), self.guest_dir)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_spec_parse_basic() {
        let spec: MountSpec = "/home/user/shared:/mnt/shared".parse().unwrap();
        assert_eq!(spec.get_host_dir(), &PathBuf::from("/home/user/shared"));
        assert_eq!(spec.get_guest_dir().as_str(), "/mnt/shared");
    }

    #[test]
    fn test_mount_spec_splits_at_last_colon() {
        let spec: MountSpec = "/a:b:/c".parse().unwrap();
        assert_eq!(spec.get_host_dir(), &PathBuf::from("/a:b"));
        assert_eq!(spec.get_guest_dir().as_str(), "/c");
    }

    #[test]
    fn test_mount_spec_no_colon_fails() {
        let result = "/just/a/path".parse::<MountSpec>();
        assert!(matches!(result, Err(VmshareError::InvalidMountSpec(_))));
    }

    #[test]
    fn test_mount_spec_empty_guest_parses() {
        // An empty guest path parses; validation rejects it later
        let spec: MountSpec = "/host:".parse().unwrap();
        assert_eq!(spec.get_guest_dir().as_str(), "");
    }

    #[test]
    fn test_mount_spec_display_roundtrip() {
        let spec: MountSpec = "/host/dir:/guest/dir".parse().unwrap();
        assert_eq!(spec.to_string(), "/host/dir:/guest/dir");
    }
}
