//! The filesystem surface the facade wraps
//!
//! `FileSystem` is the contract shared by the real backend and the
//! instrumenting facade. `LocalFileSystem` is a directory-backed
//! implementation that follows Hadoop `FileSystem` conventions for return
//! values (`rename`/`delete` report `false` instead of failing on a missing
//! source).

use crate::path::FsPath;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

pub const DEFAULT_BUFFER_SIZE: usize = 131_072;
pub const DEFAULT_REPLICATION: u16 = 3;
pub const DEFAULT_BLOCK_SIZE: u64 = 134_217_728;
pub const DEFAULT_FILE_PERMISSION: u32 = 0o644;

/// Arguments of a `create` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// Unix permission bits for the new file
    pub permission: u32,
    /// Replace an existing file instead of failing
    pub overwrite: bool,
    pub buffer_size: usize,
    /// Advisory for replicated stores; ignored by local storage
    pub replication: u16,
    /// Advisory for block-based stores; ignored by local storage
    pub block_size: u64,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            permission: DEFAULT_FILE_PERMISSION,
            overwrite: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            replication: DEFAULT_REPLICATION,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Metadata of one file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: FsPath,
    pub len: u64,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
    pub permission: u32,
}

pub type OutputStream = Box<dyn Write + Send>;
pub type InputStream = Box<dyn Read + Send>;

/// Operations a storage filesystem exposes to callers
pub trait FileSystem: Send + Sync {
    fn create(&self, path: &FsPath, options: &CreateOptions) -> io::Result<OutputStream>;

    fn open(&self, path: &FsPath, buffer_size: usize) -> io::Result<InputStream>;

    /// Returns `Ok(false)` when the source is missing or the destination
    /// already exists as a file
    fn rename(&self, src: &FsPath, dst: &FsPath) -> io::Result<bool>;

    /// Returns `Ok(false)` when the path does not exist
    fn delete(&self, path: &FsPath, recursive: bool) -> io::Result<bool>;

    /// Children of a directory in name order, or the status of a file
    fn list_status(&self, path: &FsPath) -> io::Result<Vec<FileStatus>>;

    fn get_file_status(&self, path: &FsPath) -> io::Result<FileStatus>;

    fn copy_from_local_file(
        &self,
        delete_source: bool,
        overwrite: bool,
        src: &Path,
        dst: &FsPath,
    ) -> io::Result<()>;

    fn exists(&self, path: &FsPath) -> io::Result<bool> {
        match self.get_file_status(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Filesystem rooted at a local directory.
///
/// `scheme://authority/key` maps to `<root>/<authority>/<key>`; paths without
/// an authority map to `<root>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local location of `path`, rejecting anything that would escape the root
    pub fn resolve(&self, path: &FsPath) -> io::Result<PathBuf> {
        let escapes = || {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path escapes filesystem root: {path}"),
            )
        };

        let mut resolved = self.root.clone();
        if let Some(authority) = path.authority() {
            // The authority must be exactly one plain directory name
            let mut components = Path::new(authority).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) if part == authority => resolved.push(part),
                _ => return Err(escapes()),
            }
        }
        for component in Path::new(path.key()).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(escapes()),
            }
        }
        Ok(resolved)
    }

    fn status_of(path: FsPath, local: &Path) -> io::Result<FileStatus> {
        let meta = fs::metadata(local)?;
        Ok(FileStatus {
            path,
            len: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
            modified: meta.modified().ok(),
            permission: meta.permissions().mode() & 0o7777,
        })
    }
}

fn ensure_parent(local: &Path) -> io::Result<()> {
    match local.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

impl FileSystem for LocalFileSystem {
    fn create(&self, path: &FsPath, options: &CreateOptions) -> io::Result<OutputStream> {
        let local = self.resolve(path)?;
        if local.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{path} is a directory"),
            ));
        }
        if !options.overwrite && local.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{path} already exists"),
            ));
        }
        ensure_parent(&local)?;
        let file = fs::File::create(&local)?;
        file.set_permissions(fs::Permissions::from_mode(options.permission))?;
        Ok(Box::new(BufWriter::with_capacity(
            options.buffer_size.max(1),
            file,
        )))
    }

    fn open(&self, path: &FsPath, buffer_size: usize) -> io::Result<InputStream> {
        let local = self.resolve(path)?;
        if local.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path} is a directory"),
            ));
        }
        let file = fs::File::open(&local)?;
        Ok(Box::new(BufReader::with_capacity(buffer_size.max(1), file)))
    }

    fn rename(&self, src: &FsPath, dst: &FsPath) -> io::Result<bool> {
        let from = self.resolve(src)?;
        let mut to = self.resolve(dst)?;
        if !from.exists() {
            return Ok(false);
        }
        if to.is_dir() {
            match from.file_name() {
                Some(name) => to.push(name),
                None => return Ok(false),
            }
        }
        if to.exists() || to.starts_with(&from) {
            return Ok(false);
        }
        ensure_parent(&to)?;
        fs::rename(&from, &to)?;
        Ok(true)
    }

    fn delete(&self, path: &FsPath, recursive: bool) -> io::Result<bool> {
        let local = self.resolve(path)?;
        let meta = match fs::symlink_metadata(&local) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&local)?;
            } else if fs::read_dir(&local)?.next().is_some() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{path} is a non-empty directory"),
                ));
            } else {
                fs::remove_dir(&local)?;
            }
        } else {
            fs::remove_file(&local)?;
        }
        Ok(true)
    }

    fn list_status(&self, path: &FsPath) -> io::Result<Vec<FileStatus>> {
        let local = self.resolve(path)?;
        let status = Self::status_of(path.clone(), &local)?;
        if !status.is_dir {
            return Ok(vec![status]);
        }
        let mut children = Vec::new();
        for entry in fs::read_dir(&local)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            children.push(Self::status_of(path.join(&name), &entry.path())?);
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    fn get_file_status(&self, path: &FsPath) -> io::Result<FileStatus> {
        let local = self.resolve(path)?;
        Self::status_of(path.clone(), &local)
    }

    fn copy_from_local_file(
        &self,
        delete_source: bool,
        overwrite: bool,
        src: &Path,
        dst: &FsPath,
    ) -> io::Result<()> {
        let mut to = self.resolve(dst)?;
        if to.is_dir() {
            match src.file_name() {
                Some(name) => to.push(name),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("source {} has no file name", src.display()),
                    ))
                }
            }
        }
        if !overwrite && to.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{dst} already exists"),
            ));
        }
        ensure_parent(&to)?;
        fs::copy(src, &to)?;
        if delete_source {
            fs::remove_file(src)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, LocalFileSystem) {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(dir.path());
        (dir, fs)
    }

    fn write(fs: &LocalFileSystem, path: &str, body: &[u8]) {
        let mut out = fs
            .create(&FsPath::from(path), &CreateOptions::default())
            .unwrap();
        out.write_all(body).unwrap();
        out.flush().unwrap();
    }

    #[test]
    fn test_resolve_maps_authority_under_root() {
        let (dir, fs) = fixture();
        let local = fs.resolve(&FsPath::from("gs://bucket/a/b")).unwrap();
        assert_eq!(local, dir.path().join("bucket").join("a").join("b"));
        let plain = fs.resolve(&FsPath::from("/a/b")).unwrap();
        assert_eq!(plain, dir.path().join("a").join("b"));
    }

    #[test]
    fn test_resolve_rejects_parent_components() {
        let (_dir, fs) = fixture();
        let err = fs.resolve(&FsPath::from("gs://bucket/../etc")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_resolve_rejects_dot_authority() {
        let (_dir, fs) = fixture();
        for raw in ["gs://../escaped", "gs://./inside", "s3://../../etc/passwd"] {
            let err = fs.resolve(&FsPath::from(raw)).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{raw}");
        }
        let err = fs
            .get_file_status(&FsPath::from("gs://../escaped"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_create_then_open() {
        let (_dir, fs) = fixture();
        write(&fs, "gs://b/dir/file", b"hello");
        let mut body = String::new();
        fs.open(&FsPath::from("gs://b/dir/file"), 16)
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "hello");
    }

    #[test]
    fn test_create_without_overwrite_fails_on_existing() {
        let (_dir, fs) = fixture();
        write(&fs, "/f", b"x");
        let options = CreateOptions {
            overwrite: false,
            ..CreateOptions::default()
        };
        let err = fs.create(&FsPath::from("/f"), &options).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_create_applies_permission() {
        let (_dir, fs) = fixture();
        let options = CreateOptions {
            permission: 0o600,
            ..CreateOptions::default()
        };
        drop(fs.create(&FsPath::from("/secret"), &options).unwrap());
        let status = fs.get_file_status(&FsPath::from("/secret")).unwrap();
        assert_eq!(status.permission, 0o600);
    }

    #[test]
    fn test_rename_semantics() {
        let (_dir, fs) = fixture();
        write(&fs, "/a", b"1");
        write(&fs, "/b", b"2");
        assert!(!fs.rename(&FsPath::from("/missing"), &FsPath::from("/c")).unwrap());
        assert!(!fs.rename(&FsPath::from("/a"), &FsPath::from("/b")).unwrap());
        assert!(fs.rename(&FsPath::from("/a"), &FsPath::from("/c")).unwrap());
        assert!(!fs.exists(&FsPath::from("/a")).unwrap());
        assert!(fs.exists(&FsPath::from("/c")).unwrap());
    }

    #[test]
    fn test_rename_into_directory() {
        let (_dir, fs) = fixture();
        write(&fs, "/a", b"1");
        write(&fs, "/dir/other", b"2");
        assert!(fs.rename(&FsPath::from("/a"), &FsPath::from("/dir")).unwrap());
        assert!(fs.exists(&FsPath::from("/dir/a")).unwrap());
    }

    #[test]
    fn test_delete_semantics() {
        let (_dir, fs) = fixture();
        write(&fs, "/dir/f", b"1");
        assert!(!fs.delete(&FsPath::from("/nope"), false).unwrap());
        assert!(fs.delete(&FsPath::from("/dir"), false).is_err());
        assert!(fs.delete(&FsPath::from("/dir"), true).unwrap());
        assert!(!fs.exists(&FsPath::from("/dir")).unwrap());
    }

    #[test]
    fn test_list_status_sorted() {
        let (_dir, fs) = fixture();
        write(&fs, "gs://b/d/z", b"1");
        write(&fs, "gs://b/d/a", b"22");
        let listing = fs.list_status(&FsPath::from("gs://b/d")).unwrap();
        let names: Vec<_> = listing.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(names, vec!["gs://b/d/a", "gs://b/d/z"]);
        assert_eq!(listing[0].len, 2);
    }

    #[test]
    fn test_list_status_of_file_is_itself() {
        let (_dir, fs) = fixture();
        write(&fs, "/f", b"abc");
        let listing = fs.list_status(&FsPath::from("/f")).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].len, 3);
        assert!(!listing[0].is_dir);
    }

    #[test]
    fn test_list_status_missing_is_not_found() {
        let (_dir, fs) = fixture();
        let err = fs.list_status(&FsPath::from("/missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_copy_from_local() {
        let (dir, fs) = fixture();
        let src = dir.path().join("local.bin");
        std::fs::write(&src, b"payload").unwrap();
        fs.copy_from_local_file(true, false, &src, &FsPath::from("gs://b/up.bin"))
            .unwrap();
        assert!(!src.exists());
        assert_eq!(
            fs.get_file_status(&FsPath::from("gs://b/up.bin")).unwrap().len,
            7
        );
    }

    #[test]
    fn test_copy_from_local_refuses_overwrite() {
        let (dir, fs) = fixture();
        let src = dir.path().join("local.bin");
        std::fs::write(&src, b"payload").unwrap();
        write(&fs, "/dst", b"old");
        let err = fs
            .copy_from_local_file(false, false, &src, &FsPath::from("/dst"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(src.exists());
    }
}
