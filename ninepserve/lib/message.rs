//! 9P2000 protocol messages
//!
//! Grammar per the Plan 9 manual (intro(5)) plus the 9P2000.u extensions:
//! every message is `size[4] type[1] tag[2] body`, with all integers
//! little-endian. The `.u` variant adds an extension string and numeric
//! uid/gid fields to stat structures and an errno to Rerror.

use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::Error;
use crate::wire::{helpers, WireDecode, WireEncode};
use crate::Result;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Tag value indicating "no tag" (used by Tversion)
pub const NOTAG: u16 = 0xffff;

/// Fid value indicating "no fid"
pub const NOFID: u32 = 0xffffffff;

/// Maximum number of walk elements per Twalk
pub const MAXWELEM: usize = 16;

/// Qid type bit for directories
pub const QTDIR: u8 = 0x80;

/// Qid type bit for append-only files
pub const QTAPPEND: u8 = 0x40;

/// Qid type bit for symbolic links (9P2000.u)
pub const QTSYMLINK: u8 = 0x02;

/// Qid type for plain files
pub const QTFILE: u8 = 0x00;

/// Permission bit marking a directory
pub const DMDIR: u32 = 0x8000_0000;

/// Permission bit marking a symbolic link (9P2000.u)
pub const DMSYMLINK: u32 = 0x0200_0000;

/// Base protocol version
pub const VERSION_9P2000: &str = "9P2000";

/// Unix extension protocol version
pub const VERSION_9P2000U: &str = "9P2000.u";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// 9P message type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    /// Version negotiation request
    Tversion = 100,
    /// Version negotiation reply
    Rversion = 101,
    /// Authentication request
    Tauth = 102,
    /// Authentication reply
    Rauth = 103,
    /// Attach to a file tree
    Tattach = 104,
    /// Attach reply
    Rattach = 105,
    /// Error reply
    Rerror = 107,
    /// Abort an outstanding request
    Tflush = 108,
    /// Flush reply
    Rflush = 109,
    /// Walk a fid to a new path
    Twalk = 110,
    /// Walk reply
    Rwalk = 111,
    /// Open a fid
    Topen = 112,
    /// Open reply
    Ropen = 113,
    /// Create a file
    Tcreate = 114,
    /// Create reply
    Rcreate = 115,
    /// Read from a fid
    Tread = 116,
    /// Read reply
    Rread = 117,
    /// Write to a fid
    Twrite = 118,
    /// Write reply
    Rwrite = 119,
    /// Release a fid
    Tclunk = 120,
    /// Clunk reply
    Rclunk = 121,
    /// Remove the file a fid refers to
    Tremove = 122,
    /// Remove reply
    Rremove = 123,
    /// Stat a fid
    Tstat = 124,
    /// Stat reply
    Rstat = 125,
    /// Update file attributes
    Twstat = 126,
    /// Wstat reply
    Rwstat = 127,
}

/// Open mode bits for Topen/Tcreate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode(pub u8);

impl OpenMode {
    /// Read-only
    pub const READ: u8 = 0;
    /// Write-only
    pub const WRITE: u8 = 1;
    /// Read and write
    pub const RDWR: u8 = 2;
    /// Execute (treated as read)
    pub const EXEC: u8 = 3;
    /// Truncate on open
    pub const TRUNC: u8 = 0x10;
    /// Remove on clunk
    pub const RCLOSE: u8 = 0x40;

    /// Returns the access portion of the mode (lowest two bits).
    pub fn access(&self) -> u8 {
        self.0 & 0x03
    }

    /// Whether the file should be truncated on open.
    pub fn truncate(&self) -> bool {
        self.0 & Self::TRUNC != 0
    }

    /// Whether the caller requested read access.
    pub fn is_readable(&self) -> bool {
        matches!(self.access(), Self::READ | Self::RDWR | Self::EXEC)
    }

    /// Whether the caller requested write access.
    pub fn is_writable(&self) -> bool {
        matches!(self.access(), Self::WRITE | Self::RDWR)
    }
}

/// A 9P qid: the server's unique identifier for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qid {
    /// File type bits (QTDIR, QTFILE, ...)
    pub qtype: u8,
    /// Version number, incremented on modification
    pub version: u32,
    /// Unique path number (typically the inode number)
    pub path: u64,
}

impl Qid {
    /// Whether this qid refers to a directory.
    pub fn is_dir(&self) -> bool {
        self.qtype & QTDIR != 0
    }
}

impl WireEncode for Qid {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        self.qtype.encode(buf)?;
        self.version.encode(buf)?;
        self.path.encode(buf)?;
        Ok(())
    }
}

impl WireDecode for Qid {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        Ok(Qid {
            qtype: u8::decode(buf)?,
            version: u32::decode(buf)?,
            path: u64::decode(buf)?,
        })
    }
}

/// A 9P directory entry / stat structure (9P2000.u layout)
#[derive(Debug, Clone, Default)]
pub struct Stat {
    /// Server type (unused, kept for wire compatibility)
    pub typ: u16,
    /// Server subtype (unused)
    pub dev: u32,
    /// The file's qid
    pub qid: Qid,
    /// Permissions and flags (DMDIR for directories)
    pub mode: u32,
    /// Last access time, seconds since the epoch
    pub atime: u32,
    /// Last modification time, seconds since the epoch
    pub mtime: u32,
    /// File length in bytes (0 for directories)
    pub length: u64,
    /// Final path element
    pub name: String,
    /// Owner name
    pub uid: String,
    /// Group name
    pub gid: String,
    /// Name of the last modifying user
    pub muid: String,
    /// 9P2000.u extension field (symlink target, device info)
    pub extension: String,
    /// Numeric owner id (9P2000.u)
    pub n_uid: u32,
    /// Numeric group id (9P2000.u)
    pub n_gid: u32,
    /// Numeric id of the last modifying user (9P2000.u)
    pub n_muid: u32,
}

impl Stat {
    /// Encodes the stat body (with its own leading size field) in the
    /// requested dialect. Directory reads and Rstat both embed this form.
    pub fn encode_dialect<B: BufMut>(&self, buf: &mut B, dotu: bool) -> Result<()> {
        let mut body = BytesMut::new();
        self.typ.encode(&mut body)?;
        self.dev.encode(&mut body)?;
        self.qid.encode(&mut body)?;
        self.mode.encode(&mut body)?;
        self.atime.encode(&mut body)?;
        self.mtime.encode(&mut body)?;
        self.length.encode(&mut body)?;
        helpers::encode_string(&self.name, &mut body)?;
        helpers::encode_string(&self.uid, &mut body)?;
        helpers::encode_string(&self.gid, &mut body)?;
        helpers::encode_string(&self.muid, &mut body)?;
        if dotu {
            helpers::encode_string(&self.extension, &mut body)?;
            self.n_uid.encode(&mut body)?;
            self.n_gid.encode(&mut body)?;
            self.n_muid.encode(&mut body)?;
        }

        buf.put_u16_le(body.len() as u16);
        buf.put_slice(&body);
        Ok(())
    }

    /// Decodes a stat structure (with its leading size field).
    pub fn decode_dialect<B: Buf>(buf: &mut B, dotu: bool) -> Result<Self> {
        let size = u16::decode(buf)? as usize;
        helpers::need(buf, size)?;
        let mut body = buf.copy_to_bytes(size);

        let mut stat = Stat {
            typ: u16::decode(&mut body)?,
            dev: u32::decode(&mut body)?,
            qid: Qid::decode(&mut body)?,
            mode: u32::decode(&mut body)?,
            atime: u32::decode(&mut body)?,
            mtime: u32::decode(&mut body)?,
            length: u64::decode(&mut body)?,
            name: helpers::decode_string(&mut body)?,
            uid: helpers::decode_string(&mut body)?,
            gid: helpers::decode_string(&mut body)?,
            muid: helpers::decode_string(&mut body)?,
            ..Default::default()
        };
        if dotu {
            stat.extension = helpers::decode_string(&mut body)?;
            stat.n_uid = u32::decode(&mut body)?;
            stat.n_gid = u32::decode(&mut body)?;
            stat.n_muid = u32::decode(&mut body)?;
        }
        Ok(stat)
    }
}

/// A decoded request (T-message)
#[derive(Debug)]
pub enum Tmessage {
    /// size negotiation: msize, requested version
    Version {
        /// Client's maximum message size
        msize: u32,
        /// Requested protocol version
        version: String,
    },
    /// Authentication (not supported by this server)
    Auth {
        /// Proposed auth fid
        afid: u32,
        /// User name
        uname: String,
        /// File tree name
        aname: String,
    },
    /// Attach to the file tree root
    Attach {
        /// Fid to associate with the root
        fid: u32,
        /// Auth fid (NOFID when unauthenticated)
        afid: u32,
        /// User name
        uname: String,
        /// File tree name
        aname: String,
        /// Numeric user id (9P2000.u)
        n_uname: u32,
    },
    /// Abort an outstanding request
    Flush {
        /// Tag of the request to abort
        oldtag: u16,
    },
    /// Walk a fid through path elements
    Walk {
        /// Source fid
        fid: u32,
        /// Destination fid
        newfid: u32,
        /// Path elements to traverse
        wnames: Vec<String>,
    },
    /// Open a fid for I/O
    Open {
        /// Fid to open
        fid: u32,
        /// Open mode
        mode: OpenMode,
    },
    /// Create a file in the directory a fid refers to
    Create {
        /// Directory fid; becomes the new file's fid
        fid: u32,
        /// New file name
        name: String,
        /// Permissions (DMDIR for directories)
        perm: u32,
        /// Open mode for the new file
        mode: OpenMode,
        /// 9P2000.u extension (symlink target etc.)
        extension: String,
    },
    /// Read from an open fid
    Read {
        /// Open fid
        fid: u32,
        /// Byte offset
        offset: u64,
        /// Maximum byte count
        count: u32,
    },
    /// Write to an open fid
    Write {
        /// Open fid
        fid: u32,
        /// Byte offset
        offset: u64,
        /// Data to write
        data: Vec<u8>,
    },
    /// Release a fid
    Clunk {
        /// Fid to release
        fid: u32,
    },
    /// Remove the file a fid refers to (and clunk the fid)
    Remove {
        /// Fid to remove
        fid: u32,
    },
    /// Stat the file a fid refers to
    Stat {
        /// Fid to stat
        fid: u32,
    },
    /// Update attributes of the file a fid refers to
    Wstat {
        /// Fid to update
        fid: u32,
        /// New attributes (fields set to "don't touch" values are skipped)
        stat: Stat,
    },
}

/// A reply (R-message) ready for encoding
#[derive(Debug)]
pub enum Rmessage {
    /// Version negotiation reply
    Version {
        /// Negotiated maximum message size
        msize: u32,
        /// Negotiated version
        version: String,
    },
    /// Error reply
    Error {
        /// Error string
        ename: String,
        /// Unix errno (encoded only for 9P2000.u clients)
        errno: u32,
    },
    /// Attach reply
    Attach {
        /// Qid of the tree root
        qid: Qid,
    },
    /// Flush reply
    Flush,
    /// Walk reply
    Walk {
        /// Qids of the elements walked, in order
        wqids: Vec<Qid>,
    },
    /// Open reply
    Open {
        /// Qid of the opened file
        qid: Qid,
        /// Maximum atomic I/O size hint (0 = use msize)
        iounit: u32,
    },
    /// Create reply
    Create {
        /// Qid of the created file
        qid: Qid,
        /// Maximum atomic I/O size hint
        iounit: u32,
    },
    /// Read reply
    Read {
        /// Data read
        data: Vec<u8>,
    },
    /// Write reply
    Write {
        /// Number of bytes written
        count: u32,
    },
    /// Clunk reply
    Clunk,
    /// Remove reply
    Remove,
    /// Stat reply
    Stat {
        /// File attributes
        stat: Stat,
    },
    /// Wstat reply
    Wstat,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Tmessage {
    /// Decodes a request body for the given message type.
    ///
    /// `dotu` controls whether 9P2000.u extension fields are expected.
    pub fn decode<B: Buf>(mtype: MessageType, buf: &mut B, dotu: bool) -> Result<Self> {
        let msg = match mtype {
            MessageType::Tversion => Tmessage::Version {
                msize: u32::decode(buf)?,
                version: helpers::decode_string(buf)?,
            },
            MessageType::Tauth => Tmessage::Auth {
                afid: u32::decode(buf)?,
                uname: helpers::decode_string(buf)?,
                aname: helpers::decode_string(buf)?,
            },
            MessageType::Tattach => {
                let fid = u32::decode(buf)?;
                let afid = u32::decode(buf)?;
                let uname = helpers::decode_string(buf)?;
                let aname = helpers::decode_string(buf)?;
                let n_uname = if dotu { u32::decode(buf)? } else { 0 };
                Tmessage::Attach {
                    fid,
                    afid,
                    uname,
                    aname,
                    n_uname,
                }
            }
            MessageType::Tflush => Tmessage::Flush {
                oldtag: u16::decode(buf)?,
            },
            MessageType::Twalk => {
                let fid = u32::decode(buf)?;
                let newfid = u32::decode(buf)?;
                let nwname = u16::decode(buf)? as usize;
                if nwname > MAXWELEM {
                    return Err(Error::Protocol(format!(
                        "walk with {} elements exceeds limit of {}",
                        nwname, MAXWELEM
                    )));
                }
                let mut wnames = Vec::with_capacity(nwname);
                for _ in 0..nwname {
                    wnames.push(helpers::decode_string(buf)?);
                }
                Tmessage::Walk {
                    fid,
                    newfid,
                    wnames,
                }
            }
            MessageType::Topen => Tmessage::Open {
                fid: u32::decode(buf)?,
                mode: OpenMode(u8::decode(buf)?),
            },
            MessageType::Tcreate => {
                let fid = u32::decode(buf)?;
                let name = helpers::decode_string(buf)?;
                let perm = u32::decode(buf)?;
                let mode = OpenMode(u8::decode(buf)?);
                let extension = if dotu {
                    helpers::decode_string(buf)?
                } else {
                    String::new()
                };
                Tmessage::Create {
                    fid,
                    name,
                    perm,
                    mode,
                    extension,
                }
            }
            MessageType::Tread => Tmessage::Read {
                fid: u32::decode(buf)?,
                offset: u64::decode(buf)?,
                count: u32::decode(buf)?,
            },
            MessageType::Twrite => {
                let fid = u32::decode(buf)?;
                let offset = u64::decode(buf)?;
                let data = helpers::decode_bytes(buf)?;
                Tmessage::Write { fid, offset, data }
            }
            MessageType::Tclunk => Tmessage::Clunk {
                fid: u32::decode(buf)?,
            },
            MessageType::Tremove => Tmessage::Remove {
                fid: u32::decode(buf)?,
            },
            MessageType::Tstat => Tmessage::Stat {
                fid: u32::decode(buf)?,
            },
            MessageType::Twstat => {
                let fid = u32::decode(buf)?;
                // Twstat carries an outer size around the sized stat
                let _nstat = u16::decode(buf)?;
                let stat = Stat::decode_dialect(buf, dotu)?;
                Tmessage::Wstat { fid, stat }
            }
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected message type: {:?}",
                    other
                )))
            }
        };
        Ok(msg)
    }
}

impl Rmessage {
    /// Returns the wire type code for this reply.
    pub fn message_type(&self) -> MessageType {
        match self {
            Rmessage::Version { .. } => MessageType::Rversion,
            Rmessage::Error { .. } => MessageType::Rerror,
            Rmessage::Attach { .. } => MessageType::Rattach,
            Rmessage::Flush => MessageType::Rflush,
            Rmessage::Walk { .. } => MessageType::Rwalk,
            Rmessage::Open { .. } => MessageType::Ropen,
            Rmessage::Create { .. } => MessageType::Rcreate,
            Rmessage::Read { .. } => MessageType::Rread,
            Rmessage::Write { .. } => MessageType::Rwrite,
            Rmessage::Clunk => MessageType::Rclunk,
            Rmessage::Remove => MessageType::Rremove,
            Rmessage::Stat { .. } => MessageType::Rstat,
            Rmessage::Wstat => MessageType::Rwstat,
        }
    }

    /// Encodes a full reply frame: `size[4] type[1] tag[2] body`.
    pub fn encode_frame(&self, tag: u16, dotu: bool) -> Result<BytesMut> {
        let mut body = BytesMut::new();
        match self {
            Rmessage::Version { msize, version } => {
                msize.encode(&mut body)?;
                helpers::encode_string(version, &mut body)?;
            }
            Rmessage::Error { ename, errno } => {
                helpers::encode_string(ename, &mut body)?;
                if dotu {
                    errno.encode(&mut body)?;
                }
            }
            Rmessage::Attach { qid } => {
                qid.encode(&mut body)?;
            }
            Rmessage::Flush | Rmessage::Clunk | Rmessage::Remove | Rmessage::Wstat => {}
            Rmessage::Walk { wqids } => {
                body.put_u16_le(wqids.len() as u16);
                for qid in wqids {
                    qid.encode(&mut body)?;
                }
            }
            Rmessage::Open { qid, iounit } | Rmessage::Create { qid, iounit } => {
                qid.encode(&mut body)?;
                iounit.encode(&mut body)?;
            }
            Rmessage::Read { data } => {
                body.put_u32_le(data.len() as u32);
                body.put_slice(data);
            }
            Rmessage::Write { count } => {
                count.encode(&mut body)?;
            }
            Rmessage::Stat { stat } => {
                // Rstat carries an outer size around the sized stat
                let mut inner = BytesMut::new();
                stat.encode_dialect(&mut inner, dotu)?;
                body.put_u16_le(inner.len() as u16);
                body.put_slice(&inner);
            }
        }

        let size = 4 + 1 + 2 + body.len();
        let mut frame = BytesMut::with_capacity(size);
        frame.put_u32_le(size as u32);
        frame.put_u8(self.message_type().into());
        frame.put_u16_le(tag);
        frame.put_slice(&body);
        Ok(frame)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
