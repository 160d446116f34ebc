use std::path::Path;

/// Typed error taxonomy for every public store operation.
///
/// `NotFound` is a normal negative result, never logged as an error.
/// `Corrupt` isolates a single bad record; surrounding records stay usable.
/// `Unreadable` is transient I/O during verification, distinct from `Tamper`.
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("corrupt record in {store}: {detail}")]
    Corrupt { store: String, detail: String },

    #[error("tamper detected at {path}: expected {expected}, observed {observed}")]
    Tamper {
        path: String,
        expected: String,
        observed: String,
    },

    #[error("unreadable {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resource exhausted during {op} on {path}: {source}")]
    ResourceExhausted {
        op: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{op} {path}: {source}")]
    Io {
        op: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize for {store}: {source}")]
    Serialize {
        store: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store is locked by another process ({0})")]
    Locked(String),
}

pub type Result<T> = std::result::Result<T, MuninnError>;

impl MuninnError {
    /// Wrap a low-level I/O error with the operation and path that produced
    /// it. A full disk (ENOSPC) becomes `ResourceExhausted`.
    pub fn io(op: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        let op = op.into();
        let path_str = path.display().to_string();
        if source.kind() == std::io::ErrorKind::WriteZero || source.raw_os_error() == Some(28) {
            MuninnError::ResourceExhausted {
                op,
                path: path_str,
                source,
            }
        } else {
            MuninnError::Io {
                op,
                path: path_str,
                source,
            }
        }
    }

    /// Whether this error is a normal negative result rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MuninnError::NotFound(_))
    }
}
