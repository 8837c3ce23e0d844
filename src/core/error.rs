use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the version/installer backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url} after {retry_count} retries: {message}")]
    DownloadFailed {
        url: String,
        status: Option<u16>,
        retry_count: u32,
        message: String,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    HashVerification {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for {path:?}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    // ── Versions & libraries ────────────────────────────
    #[error("Version not found: {version_id}")]
    VersionNotFound { version_id: String, local_only: bool },

    #[error("Library {name} missing at {path:?} after download")]
    LibraryNotFound { name: String, path: PathBuf },

    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── Loader ──────────────────────────────────────────
    #[error("{loader_type} {loader_version} install for {base_version} failed during {stage}: {source}")]
    ModLoaderInstall {
        loader_type: String,
        loader_version: String,
        base_version: String,
        stage: String,
        #[source]
        source: Box<LauncherError>,
    },

    #[error("Processor {processor} ({jar:?}) exited with {exit_code:?}\n{output}")]
    ProcessorExecution {
        processor: String,
        jar: PathBuf,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Loader API unreachable: {0}")]
    LoaderApi(String),

    #[error("Unsupported mod loader type: {0}")]
    NotSupported(String),

    #[error("Version {0} is already installed")]
    AlreadyInstalled(String),

    // ── Assets ──────────────────────────────────────────
    #[error("{failed} of {total} asset objects failed to download for index {index_id}")]
    AssetDownload {
        index_id: String,
        failed: usize,
        total: usize,
    },

    // ── Parsing ─────────────────────────────────────────
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Control flow ────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LauncherError::Cancelled)
    }

    /// Whether a failed network attempt may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            LauncherError::Http(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_request(),
            LauncherError::DownloadFailed {
                status: Some(code), ..
            } => *code >= 500 || *code == 408 || *code == 429,
            LauncherError::DownloadFailed { status: None, .. } => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
