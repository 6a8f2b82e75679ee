//! Intercepted filesystem calls
//!
//! An `OperationInvocation` captures one call as it arrived at the facade: the
//! operation kind, its target paths, and its original arguments. Invocations
//! are built per call and never mutated afterwards.

use crate::fs::CreateOptions;
use crate::params::ParamSet;
use crate::path::FsPath;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Filesystem operations the facade intercepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Open,
    Rename,
    Delete,
    ListStatus,
    GetFileStatus,
    CopyFromLocal,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Create,
        OperationKind::Open,
        OperationKind::Rename,
        OperationKind::Delete,
        OperationKind::ListStatus,
        OperationKind::GetFileStatus,
        OperationKind::CopyFromLocal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Open => "open",
            OperationKind::Rename => "rename",
            OperationKind::Delete => "delete",
            OperationKind::ListStatus => "list_status",
            OperationKind::GetFileStatus => "get_file_status",
            OperationKind::CopyFromLocal => "copy_from_local",
        }
    }

    /// Number of paths a well-formed invocation of this kind carries
    pub fn target_count(self) -> usize {
        match self {
            OperationKind::Rename | OperationKind::CopyFromLocal => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown operation kind '{s}'"))
    }
}

/// One intercepted call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInvocation {
    kind: OperationKind,
    targets: Vec<FsPath>,
    parameters: ParamSet,
}

impl OperationInvocation {
    /// Build an invocation from raw parts. Prefer the per-operation
    /// constructors; this one performs no validation.
    pub fn new(kind: OperationKind, targets: Vec<FsPath>, parameters: ParamSet) -> Self {
        Self {
            kind,
            targets,
            parameters,
        }
    }

    pub fn create(path: &FsPath, options: &CreateOptions) -> Self {
        let parameters = ParamSet::new()
            .with("overwrite", options.overwrite)
            .with("buffer_size", options.buffer_size)
            .with("replication", options.replication)
            .with("block_size", options.block_size)
            .with("permission", format!("{:o}", options.permission));
        Self::new(OperationKind::Create, vec![path.clone()], parameters)
    }

    pub fn open(path: &FsPath, buffer_size: usize) -> Self {
        let parameters = ParamSet::new().with("buffer_size", buffer_size);
        Self::new(OperationKind::Open, vec![path.clone()], parameters)
    }

    pub fn rename(src: &FsPath, dst: &FsPath) -> Self {
        Self::new(
            OperationKind::Rename,
            vec![src.clone(), dst.clone()],
            ParamSet::new(),
        )
    }

    pub fn delete(path: &FsPath, recursive: bool) -> Self {
        let parameters = ParamSet::new().with("recursive", recursive);
        Self::new(OperationKind::Delete, vec![path.clone()], parameters)
    }

    pub fn list_status(path: &FsPath) -> Self {
        Self::new(OperationKind::ListStatus, vec![path.clone()], ParamSet::new())
    }

    pub fn get_file_status(path: &FsPath) -> Self {
        Self::new(
            OperationKind::GetFileStatus,
            vec![path.clone()],
            ParamSet::new(),
        )
    }

    /// `file_size_kb` is the size of the local source, when known
    pub fn copy_from_local(
        delete_source: bool,
        overwrite: bool,
        src: &FsPath,
        dst: &FsPath,
        file_size_kb: Option<u64>,
    ) -> Self {
        let mut parameters = ParamSet::new()
            .with("delete_source", delete_source)
            .with("overwrite", overwrite);
        if let Some(kb) = file_size_kb {
            parameters.insert("file_size_kb", kb);
        }
        Self::new(
            OperationKind::CopyFromLocal,
            vec![src.clone(), dst.clone()],
            parameters,
        )
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn targets(&self) -> &[FsPath] {
        &self.targets
    }

    pub fn parameters(&self) -> &ParamSet {
        &self.parameters
    }
}

impl fmt::Display for OperationInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (i, target) in self.targets.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{target}")?;
        }
        f.write_str(")")
    }
}
