use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Tail monitor errors
#[derive(Error, Debug)]
pub enum TailError {
    /// Monitor constructed without any input path
    #[error("no input files given")]
    NoPaths,

    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),

    /// Open, stat, seek or read failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TailError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
