use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Cap on how much captured stderr a metadata failure message carries.
const STDERR_SNIPPET_MAX: usize = 512;

/// Fatal failure of a whole refresh. Anything scoped to a single module or
/// parameter is degraded in place instead and never surfaces here.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("module registry {path} is not accessible")]
    EnvironmentUnsupported {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    pub(crate) fn environment_unsupported(path: PathBuf, source: io::Error) -> Self {
        ScanError::EnvironmentUnsupported { path, source }
    }
}

/// Failure to obtain metadata for one module. Callers degrade this to an
/// empty mapping plus a warning on the affected module; it never aborts a
/// refresh.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata tool `{bin}` not found")]
    ToolMissing { bin: PathBuf },

    #[error("metadata tool exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("metadata tool timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("metadata tool could not be run")]
    Io {
        #[source]
        source: io::Error,
    },
}

impl MetadataError {
    pub(crate) fn failed(status: std::process::ExitStatus, stderr: &[u8]) -> Self {
        let mut stderr = String::from_utf8_lossy(stderr).trim().to_string();
        if stderr.len() > STDERR_SNIPPET_MAX {
            let mut cut = STDERR_SNIPPET_MAX;
            while !stderr.is_char_boundary(cut) {
                cut -= 1;
            }
            stderr.truncate(cut);
        }
        MetadataError::Failed {
            status: status.to_string(),
            stderr,
        }
    }
}

/// Why an edit was refused. The first four are decided before any write is
/// attempted; the last three classify failures of the write itself, so a
/// caller can tell a permission race from a module that unloaded mid-edit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("module is not loaded or does not expose this parameter at runtime")]
    NotLoaded,

    #[error("parameter is read-only at runtime")]
    PermissionDenied,

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("no such parameter in the current snapshot")]
    UnknownParameter,

    #[error("kernel denied the write")]
    WriteDenied,

    #[error("parameter file disappeared during the write")]
    NotFoundDuringWrite,

    #[error("write failed: {0}")]
    WriteFailed(String),
}
