//! 9P2000 server implementation

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, trace};

use crate::error::Error;
use crate::message::{
    MessageType, OpenMode, Rmessage, Stat, Tmessage, NOTAG, VERSION_9P2000, VERSION_9P2000U,
};
use crate::state::{DirReadState, FidState, FidTable};
use crate::wire::WireDecode;
use crate::Result;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default maximum message size offered to clients
pub const DEFAULT_MAX_MSIZE: u32 = 262144;

/// Bytes of protocol overhead in a Tread/Twrite frame
const IOHDRSZ: u32 = 24;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Trait for implementing filesystem backends served over 9P.
///
/// Paths are slices of components relative to the served root; an empty slice
/// is the root itself. Open files are identified by opaque `u64` handles
/// issued by the backend.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Stat the root of the served tree
    async fn root(&self) -> Result<Stat>;

    /// Stat the file at `path`
    async fn stat(&self, path: &[String]) -> Result<Stat>;

    /// Look up `name` inside the directory at `dir`
    async fn lookup(&self, dir: &[String], name: &str) -> Result<Stat>;

    /// Open the file at `path`, returning a backend handle
    async fn open(&self, path: &[String], mode: OpenMode) -> Result<u64>;

    /// Create `name` inside the directory at `dir`.
    ///
    /// Returns the new file's stat and, for plain files, an open handle.
    async fn create(
        &self,
        dir: &[String],
        name: &str,
        perm: u32,
        mode: OpenMode,
    ) -> Result<(Stat, Option<u64>)>;

    /// Read from an open file
    async fn read(&self, handle: u64, offset: u64, count: u32) -> Result<Vec<u8>>;

    /// Write to an open file
    async fn write(&self, handle: u64, offset: u64, data: &[u8]) -> Result<u32>;

    /// Release an open file handle
    async fn close(&self, handle: u64) -> Result<()>;

    /// List the directory at `path`
    async fn read_dir(&self, path: &[String]) -> Result<Vec<Stat>>;

    /// Remove the file or empty directory at `path`
    async fn remove(&self, path: &[String]) -> Result<()>;

    /// Update attributes of the file at `path` (rename, chmod, truncate)
    async fn wstat(&self, path: &[String], stat: &Stat) -> Result<()>;
}

#[async_trait]
impl<F: FileSystem + Send + Sync> FileSystem for Arc<F> {
    async fn root(&self) -> Result<Stat> {
        (**self).root().await
    }

    async fn stat(&self, path: &[String]) -> Result<Stat> {
        (**self).stat(path).await
    }

    async fn lookup(&self, dir: &[String], name: &str) -> Result<Stat> {
        (**self).lookup(dir, name).await
    }

    async fn open(&self, path: &[String], mode: OpenMode) -> Result<u64> {
        (**self).open(path, mode).await
    }

    async fn create(
        &self,
        dir: &[String],
        name: &str,
        perm: u32,
        mode: OpenMode,
    ) -> Result<(Stat, Option<u64>)> {
        (**self).create(dir, name, perm, mode).await
    }

    async fn read(&self, handle: u64, offset: u64, count: u32) -> Result<Vec<u8>> {
        (**self).read(handle, offset, count).await
    }

    async fn write(&self, handle: u64, offset: u64, data: &[u8]) -> Result<u32> {
        (**self).write(handle, offset, data).await
    }

    async fn close(&self, handle: u64) -> Result<()> {
        (**self).close(handle).await
    }

    async fn read_dir(&self, path: &[String]) -> Result<Vec<Stat>> {
        (**self).read_dir(path).await
    }

    async fn remove(&self, path: &[String]) -> Result<()> {
        (**self).remove(path).await
    }

    async fn wstat(&self, path: &[String], stat: &Stat) -> Result<()> {
        (**self).wstat(path, stat).await
    }
}

/// 9P server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to, `host:port`
    pub bind_addr: String,

    /// Maximum message size offered during version negotiation
    pub max_msize: u32,
}

impl ServerConfig {
    /// Creates a config with the default msize.
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            max_msize: DEFAULT_MAX_MSIZE,
        }
    }
}

/// 9P server
pub struct NinepServer<F> {
    /// Server configuration
    config: ServerConfig,

    /// Filesystem backend
    fs: Arc<F>,
}

/// Per-connection protocol state
struct Session<F> {
    fs: Arc<F>,
    fids: FidTable,
    msize: u32,
    dotu: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<F: FileSystem + 'static> NinepServer<F> {
    /// Creates a new 9P server.
    pub fn new(config: ServerConfig, fs: F) -> Self {
        NinepServer {
            config,
            fs: Arc::new(fs),
        }
    }

    /// Starts the server and serves connections until an unrecoverable
    /// listener error occurs.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("9P server listening on {}", self.config.bind_addr);

        loop {
            let (socket, peer) = listener.accept().await?;
            info!("new connection from {}", peer);

            let fs = self.fs.clone();
            let max_msize = self.config.max_msize;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, fs, max_msize).await {
                    error!("connection error from {}: {}", peer, e);
                }
            });
        }
    }
}

/// Handle a client connection until it closes
async fn handle_connection<F: FileSystem>(
    mut socket: TcpStream,
    fs: Arc<F>,
    max_msize: u32,
) -> Result<()> {
    let mut session = Session {
        fs,
        fids: FidTable::new(),
        msize: max_msize,
        dotu: false,
    };
    let mut buf = BytesMut::with_capacity(8192);

    loop {
        // Read frame size
        let mut size_bytes = [0u8; 4];
        match socket.read_exact(&mut size_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let size = u32::from_le_bytes(size_bytes);
        if size < 7 || size > session.msize.max(max_msize) {
            return Err(Error::Protocol(format!("invalid frame size: {}", size)));
        }

        // Read the rest of the frame: type[1] tag[2] body
        buf.resize(size as usize - 4, 0);
        socket.read_exact(&mut buf).await?;

        let mut reader = buf.clone().freeze();
        let mtype_byte = u8::decode(&mut reader)?;
        let tag = u16::decode(&mut reader)?;
        let mtype = MessageType::try_from(mtype_byte)
            .map_err(|_| Error::Protocol(format!("unknown message type: {}", mtype_byte)))?;

        let msg = Tmessage::decode(mtype, &mut reader, session.dotu)?;
        trace!(?tag, ?msg, "request");

        let reply = match session.dispatch(msg).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(?tag, error = %e, "request failed");
                Rmessage::Error {
                    ename: e.to_string(),
                    errno: e.errno(),
                }
            }
        };
        trace!(?tag, ?reply, "reply");

        // Tversion replies carry NOTAG
        let reply_tag = if matches!(reply, Rmessage::Version { .. }) {
            NOTAG
        } else {
            tag
        };
        let frame = reply.encode_frame(reply_tag, session.dotu)?;
        socket.write_all(&frame).await?;
    }

    // Release any handles the client left open
    for handle in session.fids.drain_handles() {
        let _ = session.fs.close(handle).await;
    }
    Ok(())
}

impl<F: FileSystem> Session<F> {
    /// Largest payload a read or write reply may carry
    fn iounit(&self) -> u32 {
        self.msize.saturating_sub(IOHDRSZ)
    }

    async fn dispatch(&mut self, msg: Tmessage) -> Result<Rmessage> {
        match msg {
            Tmessage::Version { msize, version } => self.version(msize, &version).await,
            Tmessage::Auth { .. } => Err(Error::fs(
                "authentication not required",
                libc::EOPNOTSUPP as u32,
            )),
            Tmessage::Attach { fid, .. } => self.attach(fid).await,
            Tmessage::Flush { .. } => Ok(Rmessage::Flush),
            Tmessage::Walk {
                fid,
                newfid,
                wnames,
            } => self.walk(fid, newfid, wnames).await,
            Tmessage::Open { fid, mode } => self.open(fid, mode).await,
            Tmessage::Create {
                fid,
                name,
                perm,
                mode,
                ..
            } => self.create(fid, name, perm, mode).await,
            Tmessage::Read { fid, offset, count } => self.read(fid, offset, count).await,
            Tmessage::Write { fid, offset, data } => self.write(fid, offset, data).await,
            Tmessage::Clunk { fid } => self.clunk(fid).await,
            Tmessage::Remove { fid } => self.remove(fid).await,
            Tmessage::Stat { fid } => self.stat(fid).await,
            Tmessage::Wstat { fid, stat } => self.wstat(fid, stat).await,
        }
    }

    async fn version(&mut self, msize: u32, version: &str) -> Result<Rmessage> {
        // Tversion resets the session: all outstanding fids are clunked
        for handle in self.fids.drain_handles() {
            let _ = self.fs.close(handle).await;
        }

        // Never offer more than the client can take
        self.msize = msize.min(self.msize);
        let negotiated = if version.starts_with(VERSION_9P2000U) {
            self.dotu = true;
            VERSION_9P2000U
        } else if version.starts_with(VERSION_9P2000) {
            self.dotu = false;
            VERSION_9P2000
        } else {
            "unknown"
        };
        debug!(msize = self.msize, version = negotiated, "negotiated version");

        Ok(Rmessage::Version {
            msize: self.msize,
            version: negotiated.to_string(),
        })
    }

    async fn attach(&mut self, fid: u32) -> Result<Rmessage> {
        let root = self.fs.root().await?;
        self.fids.insert(fid, FidState::new(vec![], root.qid))?;
        Ok(Rmessage::Attach { qid: root.qid })
    }

    async fn walk(&mut self, fid: u32, newfid: u32, wnames: Vec<String>) -> Result<Rmessage> {
        let (mut path, mut qid) = {
            let state = self.fids.get(fid)?;
            if state.is_open() {
                return Err(Error::Fid(format!("cannot walk open fid {}", fid)));
            }
            (state.path.clone(), state.qid)
        };

        let mut wqids = Vec::with_capacity(wnames.len());
        for (i, name) in wnames.iter().enumerate() {
            if !qid.is_dir() {
                if i == 0 {
                    return Err(Error::fs("not a directory", libc::ENOTDIR as u32));
                }
                break;
            }

            let step = if name == ".." {
                // ".." at the root stays at the root
                let mut parent = path.clone();
                parent.pop();
                self.fs.stat(&parent).await.map(|stat| (parent, stat))
            } else {
                self.fs
                    .lookup(&path, name)
                    .await
                    .map(|stat| (push_component(&path, name), stat))
            };

            match step {
                Ok((next_path, stat)) => {
                    path = next_path;
                    qid = stat.qid;
                    wqids.push(stat.qid);
                }
                Err(e) if i == 0 => return Err(e),
                Err(_) => break,
            }
        }

        // Only a complete walk binds the new fid
        if wqids.len() == wnames.len() {
            if newfid == fid {
                let state = self.fids.get_mut(fid)?;
                state.path = path;
                state.qid = qid;
            } else {
                self.fids.insert(newfid, FidState::new(path, qid))?;
            }
        }

        Ok(Rmessage::Walk { wqids })
    }

    async fn open(&mut self, fid: u32, mode: OpenMode) -> Result<Rmessage> {
        let (path, qid, is_dir) = {
            let state = self.fids.get(fid)?;
            if state.is_open() {
                return Err(Error::Fid(format!("fid {} already open", fid)));
            }
            (state.path.clone(), state.qid, state.qid.is_dir())
        };

        let handle = if is_dir {
            if mode.is_writable() {
                return Err(Error::fs("is a directory", libc::EISDIR as u32));
            }
            None
        } else {
            Some(self.fs.open(&path, mode).await?)
        };

        let state = self.fids.get_mut(fid)?;
        state.handle = handle;
        state.mode = Some(mode);

        Ok(Rmessage::Open { qid, iounit: 0 })
    }

    async fn create(&mut self, fid: u32, name: String, perm: u32, mode: OpenMode) -> Result<Rmessage> {
        let path = {
            let state = self.fids.get(fid)?;
            if state.is_open() {
                return Err(Error::Fid(format!("fid {} already open", fid)));
            }
            if !state.qid.is_dir() {
                return Err(Error::fs("not a directory", libc::ENOTDIR as u32));
            }
            state.path.clone()
        };

        let (stat, handle) = self.fs.create(&path, &name, perm, mode).await?;

        // The directory fid becomes a fid for the new file, open for I/O
        let state = self.fids.get_mut(fid)?;
        state.path = push_component(&path, &name);
        state.qid = stat.qid;
        state.handle = handle;
        state.mode = Some(mode);

        Ok(Rmessage::Create {
            qid: stat.qid,
            iounit: 0,
        })
    }

    async fn read(&mut self, fid: u32, offset: u64, count: u32) -> Result<Rmessage> {
        let count = count.min(self.iounit());
        let (is_dir, path, handle) = {
            let state = self.fids.get(fid)?;
            if !state.is_open() {
                return Err(Error::Fid(format!("fid {} not open", fid)));
            }
            (state.qid.is_dir(), state.path.clone(), state.handle)
        };

        if is_dir {
            return self.read_dir(fid, path, offset, count).await;
        }

        let handle = handle.ok_or_else(|| Error::Fid(format!("fid {} not open", fid)))?;
        let data = self.fs.read(handle, offset, count).await?;
        Ok(Rmessage::Read { data })
    }

    /// Directory reads return packed stat entries. The offset must be zero
    /// (restart) or exactly where the previous read ended, and entries are
    /// never split across replies.
    async fn read_dir(
        &mut self,
        fid: u32,
        path: Vec<String>,
        offset: u64,
        count: u32,
    ) -> Result<Rmessage> {
        if offset == 0 {
            let stats = self.fs.read_dir(&path).await?;
            let mut entries = VecDeque::with_capacity(stats.len());
            for stat in &stats {
                let mut entry = BytesMut::new();
                stat.encode_dialect(&mut entry, self.dotu)?;
                entries.push_back(entry.to_vec());
            }
            self.fids.get_mut(fid)?.dir_read = Some(DirReadState {
                entries: pack_entries(entries),
                next_offset: 0,
            });
        }

        let state = self.fids.get_mut(fid)?;
        let dir_read = state
            .dir_read
            .as_mut()
            .ok_or_else(|| Error::fs("bad offset in directory read", libc::EINVAL as u32))?;
        if offset != dir_read.next_offset {
            return Err(Error::fs(
                "bad offset in directory read",
                libc::EINVAL as u32,
            ));
        }

        let mut data = Vec::new();
        let mut consumed = 0usize;
        {
            let mut remaining = &dir_read.entries[..];
            while !remaining.is_empty() {
                // Each packed entry starts with its u16 size
                let entry_len = 2 + u16::from_le_bytes([remaining[0], remaining[1]]) as usize;
                if data.len() + entry_len > count as usize {
                    break;
                }
                data.extend_from_slice(&remaining[..entry_len]);
                consumed += entry_len;
                remaining = &remaining[entry_len..];
            }
        }
        dir_read.entries.drain(..consumed);
        dir_read.next_offset = offset + data.len() as u64;

        Ok(Rmessage::Read { data })
    }

    async fn write(&mut self, fid: u32, offset: u64, data: Vec<u8>) -> Result<Rmessage> {
        let handle = {
            let state = self.fids.get(fid)?;
            match (state.mode, state.handle) {
                (Some(mode), Some(handle)) if mode.is_writable() => handle,
                (Some(_), _) => {
                    return Err(Error::fs("fid not open for writing", libc::EBADF as u32))
                }
                _ => return Err(Error::Fid(format!("fid {} not open", fid))),
            }
        };

        let count = self.fs.write(handle, offset, &data).await?;
        Ok(Rmessage::Write { count })
    }

    async fn clunk(&mut self, fid: u32) -> Result<Rmessage> {
        let state = self.fids.take(fid)?;
        if let Some(handle) = state.handle {
            self.fs.close(handle).await?;
        }
        if let Some(mode) = state.mode {
            if mode.0 & OpenMode::RCLOSE != 0 {
                self.fs.remove(&state.path).await?;
            }
        }
        Ok(Rmessage::Clunk)
    }

    async fn remove(&mut self, fid: u32) -> Result<Rmessage> {
        // The fid is clunked whether or not the remove succeeds
        let state = self.fids.take(fid)?;
        if let Some(handle) = state.handle {
            let _ = self.fs.close(handle).await;
        }
        self.fs.remove(&state.path).await?;
        Ok(Rmessage::Remove)
    }

    async fn stat(&mut self, fid: u32) -> Result<Rmessage> {
        let path = self.fids.get(fid)?.path.clone();
        let stat = self.fs.stat(&path).await?;
        Ok(Rmessage::Stat { stat })
    }

    async fn wstat(&mut self, fid: u32, stat: Stat) -> Result<Rmessage> {
        let path = self.fids.get(fid)?.path.clone();
        self.fs.wstat(&path, &stat).await?;

        // A successful rename moves the fid with the file
        if !stat.name.is_empty() {
            let state = self.fids.get_mut(fid)?;
            if let Some(last) = state.path.last_mut() {
                *last = stat.name.clone();
            }
        }
        Ok(Rmessage::Wstat)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn push_component(path: &[String], name: &str) -> Vec<String> {
    let mut next = path.to_vec();
    next.push(name.to_string());
    next
}

fn pack_entries(entries: VecDeque<Vec<u8>>) -> Vec<u8> {
    let mut packed = Vec::new();
    for entry in entries {
        packed.extend_from_slice(&entry);
    }
    packed
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Qid, QTDIR, QTFILE};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A small in-memory backend: two files in the root
    struct MemFs {
        files: Mutex<HashMap<String, Vec<u8>>>,
        handles: Mutex<HashMap<u64, String>>,
        next_handle: Mutex<u64>,
    }

    impl MemFs {
        fn new() -> Self {
            let mut files = HashMap::new();
            files.insert("alpha".to_string(), b"alpha contents".to_vec());
            files.insert("beta".to_string(), b"beta".to_vec());
            Self {
                files: Mutex::new(files),
                handles: Mutex::new(HashMap::new()),
                next_handle: Mutex::new(1),
            }
        }

        fn file_stat(&self, name: &str, len: u64) -> Stat {
            Stat {
                qid: Qid {
                    qtype: QTFILE,
                    version: 0,
                    path: name.len() as u64,
                },
                mode: 0o644,
                length: len,
                name: name.to_string(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl FileSystem for MemFs {
        async fn root(&self) -> Result<Stat> {
            Ok(Stat {
                qid: Qid {
                    qtype: QTDIR,
                    version: 0,
                    path: 0,
                },
                mode: crate::message::DMDIR | 0o755,
                name: "/".to_string(),
                ..Default::default()
            })
        }

        async fn stat(&self, path: &[String]) -> Result<Stat> {
            match path {
                [] => self.root().await,
                [name] => {
                    let files = self.files.lock().unwrap();
                    let data = files
                        .get(name)
                        .ok_or_else(|| Error::fs("no such file", libc::ENOENT as u32))?;
                    Ok(self.file_stat(name, data.len() as u64))
                }
                _ => Err(Error::fs("no such file", libc::ENOENT as u32)),
            }
        }

        async fn lookup(&self, dir: &[String], name: &str) -> Result<Stat> {
            let mut path = dir.to_vec();
            path.push(name.to_string());
            self.stat(&path).await
        }

        async fn open(&self, path: &[String], _mode: OpenMode) -> Result<u64> {
            let name = path
                .last()
                .ok_or_else(|| Error::fs("is a directory", libc::EISDIR as u32))?;
            let mut next = self.next_handle.lock().unwrap();
            let handle = *next;
            *next += 1;
            self.handles.lock().unwrap().insert(handle, name.clone());
            Ok(handle)
        }

        async fn create(
            &self,
            _dir: &[String],
            name: &str,
            _perm: u32,
            mode: OpenMode,
        ) -> Result<(Stat, Option<u64>)> {
            self.files
                .lock()
                .unwrap()
                .insert(name.to_string(), Vec::new());
            let handle = self.open(&[name.to_string()], mode).await?;
            Ok((self.file_stat(name, 0), Some(handle)))
        }

        async fn read(&self, handle: u64, offset: u64, count: u32) -> Result<Vec<u8>> {
            let handles = self.handles.lock().unwrap();
            let name = handles
                .get(&handle)
                .ok_or_else(|| Error::Fid("bad handle".into()))?;
            let files = self.files.lock().unwrap();
            let data = &files[name];
            let start = (offset as usize).min(data.len());
            let end = (start + count as usize).min(data.len());
            Ok(data[start..end].to_vec())
        }

        async fn write(&self, handle: u64, offset: u64, data: &[u8]) -> Result<u32> {
            let handles = self.handles.lock().unwrap();
            let name = handles
                .get(&handle)
                .ok_or_else(|| Error::Fid("bad handle".into()))?;
            let mut files = self.files.lock().unwrap();
            let file = files.get_mut(name).unwrap();
            let end = offset as usize + data.len();
            if file.len() < end {
                file.resize(end, 0);
            }
            file[offset as usize..end].copy_from_slice(data);
            Ok(data.len() as u32)
        }

        async fn close(&self, handle: u64) -> Result<()> {
            self.handles.lock().unwrap().remove(&handle);
            Ok(())
        }

        async fn read_dir(&self, _path: &[String]) -> Result<Vec<Stat>> {
            let files = self.files.lock().unwrap();
            let mut names: Vec<_> = files.keys().cloned().collect();
            names.sort();
            Ok(names
                .into_iter()
                .map(|name| {
                    let len = files[&name].len() as u64;
                    self.file_stat(&name, len)
                })
                .collect())
        }

        async fn remove(&self, path: &[String]) -> Result<()> {
            let name = path
                .last()
                .ok_or_else(|| Error::fs("cannot remove root", libc::EPERM as u32))?;
            self.files
                .lock()
                .unwrap()
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| Error::fs("no such file", libc::ENOENT as u32))
        }

        async fn wstat(&self, _path: &[String], _stat: &Stat) -> Result<()> {
            Ok(())
        }
    }

    fn session() -> Session<MemFs> {
        Session {
            fs: Arc::new(MemFs::new()),
            fids: FidTable::new(),
            msize: DEFAULT_MAX_MSIZE,
            dotu: true,
        }
    }

    async fn attach(session: &mut Session<MemFs>, fid: u32) {
        let reply = session.attach(fid).await.unwrap();
        assert!(matches!(reply, Rmessage::Attach { qid } if qid.is_dir()));
    }

    #[tokio::test]
    async fn test_version_negotiation() {
        let mut s = session();
        let reply = s.version(8192, VERSION_9P2000U).await.unwrap();
        match reply {
            Rmessage::Version { msize, version } => {
                assert_eq!(msize, 8192);
                assert_eq!(version, VERSION_9P2000U);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert!(s.dotu);
    }

    #[tokio::test]
    async fn test_version_unknown_dialect() {
        let mut s = session();
        let reply = s.version(8192, "9P1999").await.unwrap();
        assert!(matches!(reply, Rmessage::Version { version, .. } if version == "unknown"));
    }

    #[tokio::test]
    async fn test_walk_to_file_and_read() {
        let mut s = session();
        attach(&mut s, 0).await;

        let reply = s.walk(0, 1, vec!["alpha".to_string()]).await.unwrap();
        assert!(matches!(&reply, Rmessage::Walk { wqids } if wqids.len() == 1));

        s.open(1, OpenMode(OpenMode::READ)).await.unwrap();
        let reply = s.read(1, 0, 1024).await.unwrap();
        match reply {
            Rmessage::Read { data } => assert_eq!(data, b"alpha contents"),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_walk_missing_first_element_errors() {
        let mut s = session();
        attach(&mut s, 0).await;

        let result = s.walk(0, 1, vec!["missing".to_string()]).await;
        assert!(result.is_err());
        // newfid must not have been created
        assert!(s.fids.get(1).is_err());
    }

    #[tokio::test]
    async fn test_walk_partial_does_not_bind_newfid() {
        let mut s = session();
        attach(&mut s, 0).await;

        let reply = s
            .walk(0, 1, vec!["alpha".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(matches!(&reply, Rmessage::Walk { wqids } if wqids.len() == 1));
        assert!(s.fids.get(1).is_err());
    }

    #[tokio::test]
    async fn test_dotdot_at_root_stays_at_root() {
        let mut s = session();
        attach(&mut s, 0).await;

        let reply = s.walk(0, 1, vec!["..".to_string()]).await.unwrap();
        match reply {
            Rmessage::Walk { wqids } => {
                assert_eq!(wqids.len(), 1);
                assert!(wqids[0].is_dir());
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_directory_read_offset_contract() {
        let mut s = session();
        attach(&mut s, 0).await;
        s.open(0, OpenMode(OpenMode::READ)).await.unwrap();

        let first = match s.read(0, 0, 4096).await.unwrap() {
            Rmessage::Read { data } => data,
            other => panic!("unexpected reply: {:?}", other),
        };
        assert!(!first.is_empty());

        // Continuing from the end yields no more entries
        let second = match s.read(0, first.len() as u64, 4096).await.unwrap() {
            Rmessage::Read { data } => data,
            other => panic!("unexpected reply: {:?}", other),
        };
        assert!(second.is_empty());

        // A stale offset is rejected
        assert!(s.read(0, 3, 4096).await.is_err());
    }

    #[tokio::test]
    async fn test_create_then_write_then_remove() {
        let mut s = session();
        attach(&mut s, 0).await;

        s.create(0, "gamma".to_string(), 0o644, OpenMode(OpenMode::RDWR))
            .await
            .unwrap();
        match s.write(0, 0, b"hello".to_vec()).await.unwrap() {
            Rmessage::Write { count } => assert_eq!(count, 5),
            other => panic!("unexpected reply: {:?}", other),
        }

        s.remove(0).await.unwrap();
        assert!(s.fids.get(0).is_err());
    }

    #[tokio::test]
    async fn test_write_requires_write_mode() {
        let mut s = session();
        attach(&mut s, 0).await;
        s.walk(0, 1, vec!["alpha".to_string()]).await.unwrap();
        s.open(1, OpenMode(OpenMode::READ)).await.unwrap();

        assert!(s.write(1, 0, b"x".to_vec()).await.is_err());
    }
}
