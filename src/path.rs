//! Storage paths
//!
//! An `FsPath` is either a URI-style object path (`gs://bucket/dir/file`) or a
//! plain slash-separated path (`/dir/file`). The string is kept verbatim so a
//! path handed to the facade reaches the measurement run unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A path on the instrumented filesystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsPath(String);

impl FsPath {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Wrap a local path as a `file://` URI
    pub fn from_local(path: &std::path::Path) -> Self {
        Self(format!("file://{}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// URI scheme, e.g. `gs` for `gs://bucket/key`
    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once("://").map(|(scheme, _)| scheme)
    }

    /// URI authority (the bucket for object stores)
    pub fn authority(&self) -> Option<&str> {
        let (_, rest) = self.0.split_once("://")?;
        let authority = rest.split('/').next().unwrap_or_default();
        (!authority.is_empty()).then_some(authority)
    }

    /// Path within the authority, without leading or trailing slashes
    pub fn key(&self) -> &str {
        let path = match self.0.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("", |idx| &rest[idx..]),
            None => self.0.as_str(),
        };
        path.trim_matches('/')
    }

    /// Same scheme and authority, different key
    pub fn with_key(&self, key: &str) -> FsPath {
        let key = key.trim_start_matches('/');
        match (self.scheme(), self.authority()) {
            (Some(scheme), Some(authority)) => FsPath(format!("{scheme}://{authority}/{key}")),
            (Some(scheme), None) => FsPath(format!("{scheme}:///{key}")),
            _ => FsPath(format!("/{key}")),
        }
    }

    /// Append a child component to the key
    pub fn join(&self, child: &str) -> FsPath {
        let key = self.key();
        if key.is_empty() {
            self.with_key(child)
        } else {
            self.with_key(&format!("{key}/{}", child.trim_matches('/')))
        }
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FsPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for FsPath {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_store_path_parts() {
        let path = FsPath::from("gs://bucket/dir/file.txt");
        assert_eq!(path.scheme(), Some("gs"));
        assert_eq!(path.authority(), Some("bucket"));
        assert_eq!(path.key(), "dir/file.txt");
    }

    #[test]
    fn test_plain_path_parts() {
        let path = FsPath::from("/dir/sub/");
        assert_eq!(path.scheme(), None);
        assert_eq!(path.authority(), None);
        assert_eq!(path.key(), "dir/sub");
    }

    #[test]
    fn test_bucket_root() {
        let path = FsPath::from("gs://bucket");
        assert_eq!(path.authority(), Some("bucket"));
        assert_eq!(path.key(), "");
        assert_eq!(path.join("a").as_str(), "gs://bucket/a");
    }

    #[test]
    fn test_with_key_keeps_authority() {
        let path = FsPath::from("gs://bucket/dir/file");
        assert_eq!(path.with_key("/scratch/x").as_str(), "gs://bucket/scratch/x");
        assert_eq!(FsPath::from("/a/b").with_key("c").as_str(), "/c");
    }

    #[test]
    fn test_file_uri_has_no_authority() {
        let path = FsPath::from_local(std::path::Path::new("/tmp/src.bin"));
        assert_eq!(path.as_str(), "file:///tmp/src.bin");
        assert_eq!(path.scheme(), Some("file"));
        assert_eq!(path.authority(), None);
        assert_eq!(path.key(), "tmp/src.bin");
    }

    #[test]
    fn test_empty_path() {
        assert!(FsPath::from("").is_empty());
        assert!(FsPath::from("  ").is_empty());
        assert!(!FsPath::from("/").is_empty());
    }
}
