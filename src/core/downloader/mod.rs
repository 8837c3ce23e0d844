mod client;
pub mod fingerprint;
mod task;

pub use client::{sha1_file, Downloader};
pub use fingerprint::{fingerprint_bytes, fingerprint_file, fingerprint_files};
pub use task::{DownloadResult, DownloadTask};
