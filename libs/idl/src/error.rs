//! Error types for IDL loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating or parsing IDL documents.
#[derive(Debug, Error)]
pub enum IdlError {
    /// A document could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A document is not valid Thrift IDL.
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    /// No `<module>.thrift` exists on the search path.
    #[error("module '{module}' not found (searched: {})", display_paths(.searched))]
    ModuleNotFound {
        module: String,
        searched: Vec<PathBuf>,
    },

    /// An `include` names a file that does not exist.
    #[error("include \"{include}\" from {} not found", .from.display())]
    IncludeNotFound { include: String, from: PathBuf },

    /// Documents include each other.
    #[error("include cycle through {}", .0.display())]
    IncludeCycle(PathBuf),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
