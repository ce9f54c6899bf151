use std::collections::HashMap;
use std::fs::Metadata;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ninepserve::message::{DMDIR, DMSYMLINK, QTDIR, QTFILE, QTSYMLINK};
use ninepserve::{Error, FileSystem, OpenMode, Qid, Stat};
use tokio::fs;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A 9P filesystem backend that serves a host directory tree.
///
/// Qid paths are inode numbers, so hard links and renames keep their identity
/// across walks. File I/O uses positioned reads and writes on duplicated
/// descriptors; no per-handle cursor is kept.
pub struct HostFs {
    /// The served root directory.
    root_dir: PathBuf,

    /// Open file handles issued to clients.
    handles: Mutex<HashMap<u64, std::fs::File>>,

    /// Next handle id.
    next_handle: AtomicU64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HostFs {
    /// Creates a backend serving `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Maps 9P path components onto a host path under the served root.
    fn resolve(&self, path: &[String]) -> ninepserve::Result<PathBuf> {
        let mut resolved = self.root_dir.clone();
        for component in path {
            if component.is_empty()
                || component == "."
                || component == ".."
                || component.contains('/')
                || component.contains('\0')
            {
                return Err(Error::fs("invalid path component", libc::EINVAL as u32));
            }
            resolved.push(component);
        }
        Ok(resolved)
    }

    fn stat_path(&self, host_path: &Path, name: &str) -> ninepserve::Result<Stat> {
        let md = std::fs::metadata(host_path)?;
        Ok(stat_from_metadata(&md, name))
    }

    fn issue_handle(&self, file: std::fs::File) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().unwrap().insert(handle, file);
        handle
    }

    fn clone_handle(&self, handle: u64) -> ninepserve::Result<std::fs::File> {
        let handles = self.handles.lock().unwrap();
        let file = handles
            .get(&handle)
            .ok_or_else(|| Error::fs("stale file handle", libc::EBADF as u32))?;
        Ok(file.try_clone()?)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn qid_from_metadata(md: &Metadata) -> Qid {
    let qtype = if md.is_dir() {
        QTDIR
    } else if md.file_type().is_symlink() {
        QTSYMLINK
    } else {
        QTFILE
    };
    Qid {
        qtype,
        version: md.mtime() as u32,
        path: md.ino(),
    }
}

fn stat_from_metadata(md: &Metadata, name: &str) -> Stat {
    let mut mode = md.permissions().mode() & 0o777;
    if md.is_dir() {
        mode |= DMDIR;
    } else if md.file_type().is_symlink() {
        mode |= DMSYMLINK;
    }

    Stat {
        qid: qid_from_metadata(md),
        mode,
        atime: md.atime() as u32,
        mtime: md.mtime() as u32,
        length: if md.is_dir() { 0 } else { md.len() },
        name: name.to_string(),
        uid: md.uid().to_string(),
        gid: md.gid().to_string(),
        muid: md.uid().to_string(),
        n_uid: md.uid(),
        n_gid: md.gid(),
        n_muid: md.uid(),
        ..Default::default()
    }
}

fn open_options(mode: OpenMode) -> std::fs::OpenOptions {
    let mut options = std::fs::OpenOptions::new();
    options
        .read(mode.is_readable())
        .write(mode.is_writable())
        .truncate(mode.truncate() && mode.is_writable());
    options
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl FileSystem for HostFs {
    async fn root(&self) -> ninepserve::Result<Stat> {
        self.stat_path(&self.root_dir, "/")
    }

    async fn stat(&self, path: &[String]) -> ninepserve::Result<Stat> {
        let host_path = self.resolve(path)?;
        let name = path.last().map(String::as_str).unwrap_or("/");
        self.stat_path(&host_path, name)
    }

    async fn lookup(&self, dir: &[String], name: &str) -> ninepserve::Result<Stat> {
        let mut path = dir.to_vec();
        path.push(name.to_string());
        self.stat(&path).await
    }

    async fn open(&self, path: &[String], mode: OpenMode) -> ninepserve::Result<u64> {
        let host_path = self.resolve(path)?;
        let file = tokio::task::spawn_blocking(move || open_options(mode).open(host_path))
            .await
            .map_err(|e| Error::fs(e.to_string(), libc::EIO as u32))??;
        Ok(self.issue_handle(file))
    }

    async fn create(
        &self,
        dir: &[String],
        name: &str,
        perm: u32,
        mode: OpenMode,
    ) -> ninepserve::Result<(Stat, Option<u64>)> {
        let mut path = dir.to_vec();
        path.push(name.to_string());
        let host_path = self.resolve(&path)?;

        if perm & DMDIR != 0 {
            fs::create_dir(&host_path).await?;
            fs::set_permissions(&host_path, std::fs::Permissions::from_mode(perm & 0o777)).await?;
            let stat = self.stat_path(&host_path, name)?;
            return Ok((stat, None));
        }

        let perm_bits = perm & 0o777;
        let create_path = host_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            let mut options = open_options(mode);
            options.create_new(true).mode(perm_bits);
            options.open(create_path)
        })
        .await
        .map_err(|e| Error::fs(e.to_string(), libc::EIO as u32))??;

        let stat = self.stat_path(&host_path, name)?;
        Ok((stat, Some(self.issue_handle(file))))
    }

    async fn read(&self, handle: u64, offset: u64, count: u32) -> ninepserve::Result<Vec<u8>> {
        let file = self.clone_handle(handle)?;
        let data = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; count as usize];
            let n = file.read_at(&mut buf, offset)?;
            buf.truncate(n);
            std::io::Result::Ok(buf)
        })
        .await
        .map_err(|e| Error::fs(e.to_string(), libc::EIO as u32))??;
        Ok(data)
    }

    async fn write(&self, handle: u64, offset: u64, data: &[u8]) -> ninepserve::Result<u32> {
        let file = self.clone_handle(handle)?;
        let data = data.to_vec();
        let written = tokio::task::spawn_blocking(move || file.write_at(&data, offset))
            .await
            .map_err(|e| Error::fs(e.to_string(), libc::EIO as u32))??;
        Ok(written as u32)
    }

    async fn close(&self, handle: u64) -> ninepserve::Result<()> {
        self.handles.lock().unwrap().remove(&handle);
        Ok(())
    }

    async fn read_dir(&self, path: &[String]) -> ninepserve::Result<Vec<Stat>> {
        let host_path = self.resolve(path)?;
        let mut entries = fs::read_dir(&host_path).await?;
        let mut stats = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            match entry.metadata().await {
                Ok(md) => stats.push(stat_from_metadata(&md, &name)),
                // Entries that vanish mid-listing are skipped
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stats)
    }

    async fn remove(&self, path: &[String]) -> ninepserve::Result<()> {
        if path.is_empty() {
            return Err(Error::fs("cannot remove the share root", libc::EPERM as u32));
        }
        let host_path = self.resolve(path)?;
        let md = fs::metadata(&host_path).await?;
        if md.is_dir() {
            fs::remove_dir(&host_path).await?;
        } else {
            fs::remove_file(&host_path).await?;
        }
        Ok(())
    }

    async fn wstat(&self, path: &[String], stat: &Stat) -> ninepserve::Result<()> {
        let host_path = self.resolve(path)?;

        // 9P marks untouched fields with all-ones / empty values
        if stat.mode != u32::MAX {
            fs::set_permissions(
                &host_path,
                std::fs::Permissions::from_mode(stat.mode & 0o777),
            )
            .await?;
        }

        if stat.length != u64::MAX {
            let length = stat.length;
            let truncate_path = host_path.clone();
            tokio::task::spawn_blocking(move || {
                let file = std::fs::OpenOptions::new().write(true).open(truncate_path)?;
                file.set_len(length)
            })
            .await
            .map_err(|e| Error::fs(e.to_string(), libc::EIO as u32))??;
        }

        if !stat.name.is_empty() {
            let new_path = host_path
                .parent()
                .ok_or_else(|| Error::fs("cannot rename the share root", libc::EPERM as u32))?
                .join(&stat.name);
            fs::rename(&host_path, &new_path).await?;
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn components(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    async fn fixture() -> (tempfile::TempDir, HostFs) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), b"hello from the host")
            .await
            .unwrap();
        fs::create_dir(dir.path().join("sub")).await.unwrap();
        fs::write(dir.path().join("sub/nested.txt"), b"nested")
            .await
            .unwrap();
        let hostfs = HostFs::new(dir.path());
        (dir, hostfs)
    }

    #[test_log::test(tokio::test)]
    async fn test_root_is_a_directory() {
        let (_dir, hostfs) = fixture().await;
        let root = hostfs.root().await.unwrap();
        assert!(root.qid.is_dir());
        assert_eq!(root.name, "/");
    }

    #[test_log::test(tokio::test)]
    async fn test_lookup_and_stat() {
        let (_dir, hostfs) = fixture().await;
        let stat = hostfs.lookup(&[], "hello.txt").await.unwrap();
        assert!(!stat.qid.is_dir());
        assert_eq!(stat.length, 19);

        let nested = hostfs
            .stat(&components(&["sub", "nested.txt"]))
            .await
            .unwrap();
        assert_eq!(nested.name, "nested.txt");
    }

    #[test_log::test(tokio::test)]
    async fn test_lookup_missing_is_enoent() {
        let (_dir, hostfs) = fixture().await;
        let err = hostfs.lookup(&[], "missing.txt").await.unwrap_err();
        assert_eq!(err.errno(), libc::ENOENT as u32);
    }

    #[test_log::test(tokio::test)]
    async fn test_resolve_rejects_traversal_components() {
        let (_dir, hostfs) = fixture().await;
        let err = hostfs.stat(&components(&[".."])).await.unwrap_err();
        assert_eq!(err.errno(), libc::EINVAL as u32);

        let err = hostfs.stat(&components(&["a/b"])).await.unwrap_err();
        assert_eq!(err.errno(), libc::EINVAL as u32);
    }

    #[test_log::test(tokio::test)]
    async fn test_open_read_close() {
        let (_dir, hostfs) = fixture().await;
        let handle = hostfs
            .open(&components(&["hello.txt"]), OpenMode(OpenMode::READ))
            .await
            .unwrap();

        let data = hostfs.read(handle, 0, 1024).await.unwrap();
        assert_eq!(data, b"hello from the host");

        let tail = hostfs.read(handle, 6, 1024).await.unwrap();
        assert_eq!(tail, b"from the host");

        hostfs.close(handle).await.unwrap();
        let err = hostfs.read(handle, 0, 1).await.unwrap_err();
        assert_eq!(err.errno(), libc::EBADF as u32);
    }

    #[test_log::test(tokio::test)]
    async fn test_create_write_readback() {
        let (dir, hostfs) = fixture().await;
        let (stat, handle) = hostfs
            .create(&[], "new.txt", 0o644, OpenMode(OpenMode::RDWR))
            .await
            .unwrap();
        assert_eq!(stat.name, "new.txt");
        let handle = handle.unwrap();

        let written = hostfs.write(handle, 0, b"fresh content").await.unwrap();
        assert_eq!(written, 13);

        let on_disk = fs::read(dir.path().join("new.txt")).await.unwrap();
        assert_eq!(on_disk, b"fresh content");
    }

    #[test_log::test(tokio::test)]
    async fn test_create_directory() {
        let (dir, hostfs) = fixture().await;
        let (stat, handle) = hostfs
            .create(&[], "newdir", DMDIR | 0o755, OpenMode(OpenMode::READ))
            .await
            .unwrap();
        assert!(stat.qid.is_dir());
        assert!(handle.is_none());
        assert!(dir.path().join("newdir").is_dir());
    }

    #[test_log::test(tokio::test)]
    async fn test_read_dir_lists_entries() {
        let (_dir, hostfs) = fixture().await;
        let entries = hostfs.read_dir(&[]).await.unwrap();
        let mut names: Vec<_> = entries.iter().map(|s| s.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["hello.txt", "sub"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_remove_file_and_refuse_root() {
        let (dir, hostfs) = fixture().await;
        hostfs.remove(&components(&["hello.txt"])).await.unwrap();
        assert!(!dir.path().join("hello.txt").exists());

        let err = hostfs.remove(&[]).await.unwrap_err();
        assert_eq!(err.errno(), libc::EPERM as u32);
    }

    #[test_log::test(tokio::test)]
    async fn test_wstat_rename_and_truncate() {
        let (dir, hostfs) = fixture().await;
        let stat = Stat {
            mode: u32::MAX,
            length: 5,
            name: "renamed.txt".to_string(),
            ..Default::default()
        };
        hostfs
            .wstat(&components(&["hello.txt"]), &stat)
            .await
            .unwrap();

        let on_disk = fs::read(dir.path().join("renamed.txt")).await.unwrap();
        assert_eq!(on_disk, b"hello");
    }
}
