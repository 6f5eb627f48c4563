use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{application::engines::EngineError, domain::path::ArchiveError};

/// Failures surfaced while creating or building a package.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("source `{}` does not exist as a file or as a directory", path.display())]
    Missing { path: PathBuf },
    #[error(
        "source `{}` exists both as a file and as a directory; only one of them may be used",
        path.display()
    )]
    Ambiguous { path: PathBuf },
    #[error("`{name}` is not a zip archive")]
    NotAnArchive { name: String },
    #[error("failed to prepare package: {0}")]
    Io(#[from] io::Error),
    #[error("failed to unpack archive: {0}")]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl PackageError {
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::Missing { path: path.into() }
    }

    pub fn ambiguous(path: impl Into<PathBuf>) -> Self {
        Self::Ambiguous { path: path.into() }
    }

    pub fn not_an_archive(name: impl Into<String>) -> Self {
        Self::NotAnArchive { name: name.into() }
    }

    /// True for the "source missing or ambiguous" family.
    pub fn is_existence(&self) -> bool {
        matches!(self, Self::Missing { .. } | Self::Ambiguous { .. })
    }

    /// True when the source lacks the archive extension.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::NotAnArchive { .. })
    }
}

/// Unhandled failure inside the per-document pipeline. Propagated unmodified
/// out of `Package::assemble`.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{stage} failed for `{document}`: {source}")]
    Engine {
        stage: &'static str,
        document: String,
        #[source]
        source: EngineError,
    },
    #[error("filesystem error during build: {0}")]
    Io(#[from] io::Error),
    #[error("failed to write output archive: {0}")]
    Archive(#[from] ArchiveError),
}
