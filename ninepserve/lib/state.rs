//! Per-connection fid state management

use std::collections::HashMap;

use crate::error::Error;
use crate::message::{OpenMode, Qid};
use crate::Result;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// State attached to a single fid
#[derive(Debug)]
pub struct FidState {
    /// Path components relative to the served root (empty = root)
    pub path: Vec<String>,

    /// Qid of the file this fid refers to
    pub qid: Qid,

    /// Backend handle, present once the fid has been opened as a file
    pub handle: Option<u64>,

    /// Open mode, present once the fid has been opened
    pub mode: Option<OpenMode>,

    /// Cached directory listing for sequential directory reads
    pub dir_read: Option<DirReadState>,
}

/// Encoded directory entries cached between Tread calls on a directory fid
#[derive(Debug)]
pub struct DirReadState {
    /// All entries, packed in wire form
    pub entries: Vec<u8>,

    /// Offset the next read is expected to start at
    pub next_offset: u64,
}

impl FidState {
    /// Creates an unopened fid at the given path.
    pub fn new(path: Vec<String>, qid: Qid) -> Self {
        Self {
            path,
            qid,
            handle: None,
            mode: None,
            dir_read: None,
        }
    }

    /// Whether this fid has been opened for I/O.
    pub fn is_open(&self) -> bool {
        self.mode.is_some()
    }
}

/// The fid table for one client connection
#[derive(Debug, Default)]
pub struct FidTable {
    fids: HashMap<u32, FidState>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FidTable {
    /// Creates an empty fid table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new fid. Fails if the fid is already in use.
    pub fn insert(&mut self, fid: u32, state: FidState) -> Result<()> {
        if self.fids.contains_key(&fid) {
            return Err(Error::Fid(format!("fid {} already in use", fid)));
        }
        self.fids.insert(fid, state);
        Ok(())
    }

    /// Looks up a fid.
    pub fn get(&self, fid: u32) -> Result<&FidState> {
        self.fids
            .get(&fid)
            .ok_or_else(|| Error::Fid(format!("unknown fid {}", fid)))
    }

    /// Looks up a fid for mutation.
    pub fn get_mut(&mut self, fid: u32) -> Result<&mut FidState> {
        self.fids
            .get_mut(&fid)
            .ok_or_else(|| Error::Fid(format!("unknown fid {}", fid)))
    }

    /// Removes a fid, returning its state.
    pub fn take(&mut self, fid: u32) -> Result<FidState> {
        self.fids
            .remove(&fid)
            .ok_or_else(|| Error::Fid(format!("unknown fid {}", fid)))
    }

    /// Drops every fid, returning the open backend handles so the caller can
    /// release them. Used on Tversion (which resets the session) and when the
    /// connection closes.
    pub fn drain_handles(&mut self) -> Vec<u64> {
        self.fids
            .drain()
            .filter_map(|(_, state)| state.handle)
            .collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn root_state() -> FidState {
        FidState::new(vec![], Qid::default())
    }

    #[test]
    fn test_duplicate_fid_rejected() {
        let mut table = FidTable::new();
        table.insert(1, root_state()).unwrap();
        assert!(matches!(table.insert(1, root_state()), Err(Error::Fid(_))));
    }

    #[test]
    fn test_unknown_fid_rejected() {
        let mut table = FidTable::new();
        assert!(matches!(table.get(7), Err(Error::Fid(_))));
        assert!(matches!(table.take(7), Err(Error::Fid(_))));
    }

    #[test]
    fn test_take_releases_fid_for_reuse() {
        let mut table = FidTable::new();
        table.insert(1, root_state()).unwrap();
        table.take(1).unwrap();
        table.insert(1, root_state()).unwrap();
    }

    #[test]
    fn test_drain_handles_returns_open_handles() {
        let mut table = FidTable::new();
        let mut open = root_state();
        open.handle = Some(99);
        open.mode = Some(OpenMode(OpenMode::READ));
        table.insert(1, open).unwrap();
        table.insert(2, root_state()).unwrap();

        let handles = table.drain_handles();
        assert_eq!(handles, vec![99]);
        assert!(table.get(2).is_err());
    }
}
