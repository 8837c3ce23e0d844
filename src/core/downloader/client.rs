use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::core::cancel::{cancel_requested, ensure_not_cancelled, CancelFlag};
use crate::core::config::DownloadSettings;
use crate::core::downloader::task::{DownloadResult, DownloadTask};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::progress::{report, BatchProgress, ItemFn, ProgressFn};

/// Concurrent, SHA-1 validated downloader with bounded retry.
///
/// Bytes are streamed to `<target>.part` and only renamed into place once
/// size and hash match, so a failed download never leaves a file at `target`.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    settings: DownloadSettings,
}

impl Downloader {
    pub fn new(settings: DownloadSettings) -> LauncherResult<Self> {
        let client = build_http_client(&settings)?;
        Ok(Self { client, settings })
    }

    pub fn with_client(client: Client, settings: DownloadSettings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    // ── Single file download ────────────────────────────

    /// Download `url` to `target`, verifying SHA-1 when given.
    pub async fn download_file(
        &self,
        url: &str,
        target: &Path,
        expected_sha1: Option<&str>,
        progress: Option<ProgressFn>,
        cancel: &CancelFlag,
    ) -> DownloadResult {
        self.fetch_verified(url, target, expected_sha1, None, progress.as_ref(), cancel)
            .await
    }

    pub async fn download_task(
        &self,
        task: &DownloadTask,
        progress: Option<ProgressFn>,
        cancel: &CancelFlag,
    ) -> DownloadResult {
        self.fetch_verified(
            &task.url,
            &task.target,
            task.expected_sha1.as_deref(),
            task.expected_size,
            progress.as_ref(),
            cancel,
        )
        .await
    }

    async fn fetch_verified(
        &self,
        url: &str,
        target: &Path,
        expected_sha1: Option<&str>,
        expected_size: Option<u64>,
        progress: Option<&ProgressFn>,
        cancel: &CancelFlag,
    ) -> DownloadResult {
        let mut attempt: u32 = 0;
        loop {
            if cancel_requested(cancel) {
                return DownloadResult::failed(url, target, attempt, LauncherError::Cancelled);
            }

            match self
                .stream_to_target(url, target, expected_sha1, expected_size, progress, cancel)
                .await
            {
                Ok(()) => {
                    debug!("Downloaded: {} -> {:?}", url, target);
                    return DownloadResult::succeeded(url, target, attempt);
                }
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "Download of {} failed ({}), retry {}/{} in {:?}",
                        url,
                        e,
                        attempt + 1,
                        self.settings.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Download of {} failed: {}", url, e);
                    return DownloadResult::failed(url, target, attempt, exhausted(url, e, attempt));
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.settings.retry_base_delay_ms.saturating_mul(factor))
    }

    async fn stream_to_target(
        &self,
        url: &str,
        target: &Path,
        expected_sha1: Option<&str>,
        expected_size: Option<u64>,
        progress: Option<&ProgressFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let part = part_path(target);
        let outcome = self
            .write_part(url, &part, expected_size, progress, cancel)
            .await
            .and_then(|(written, actual_sha1)| {
                check_integrity(target, written, &actual_sha1, expected_sha1, expected_size)
            });

        if let Err(e) = outcome {
            let _ = tokio::fs::remove_file(&part).await;
            if matches!(
                e,
                LauncherError::HashVerification { .. } | LauncherError::SizeMismatch { .. }
            ) {
                // A stale file at the target must not survive a failed verification either.
                let _ = tokio::fs::remove_file(target).await;
            }
            return Err(e);
        }

        tokio::fs::rename(&part, target)
            .await
            .map_err(|e| LauncherError::io(target, e))
    }

    /// Stream the response body into `part`, returning the byte count and SHA-1.
    async fn write_part(
        &self,
        url: &str,
        part: &Path,
        expected_size: Option<u64>,
        progress: Option<&ProgressFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<(u64, String)> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: Some(status.as_u16()),
                retry_count: 0,
                message: format!("HTTP {}", status),
            });
        }

        let total = response.content_length().or(expected_size);
        let mut hasher = Sha1::new();
        let mut written: u64 = 0;

        // Handle is dropped at the end of this block, before the rename.
        {
            let mut file = tokio::fs::File::create(part)
                .await
                .map_err(|e| LauncherError::io(part, e))?;
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                ensure_not_cancelled(cancel)?;
                let chunk = chunk?;
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(part, e))?;
                written += chunk.len() as u64;
                if let Some(total) = total.filter(|t| *t > 0) {
                    report(progress, written as f64 * 100.0 / total as f64);
                }
            }
            file.flush().await.map_err(|e| LauncherError::io(part, e))?;
        }

        report(progress, 100.0);
        Ok((written, hex::encode(hasher.finalize())))
    }

    // ── In-memory fetches ───────────────────────────────

    /// Fetch a small payload into memory. No retry.
    pub async fn download_bytes(&self, url: &str, cancel: &CancelFlag) -> LauncherResult<Vec<u8>> {
        ensure_not_cancelled(cancel)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: Some(status.as_u16()),
                retry_count: 0,
                message: format!("HTTP {}", status),
            });
        }
        let bytes = response.bytes().await?;
        ensure_not_cancelled(cancel)?;
        Ok(bytes.to_vec())
    }

    pub async fn download_string(&self, url: &str, cancel: &CancelFlag) -> LauncherResult<String> {
        let bytes = self.download_bytes(url, cancel).await?;
        String::from_utf8(bytes).map_err(|e| LauncherError::DownloadFailed {
            url: url.to_string(),
            status: None,
            retry_count: 0,
            message: format!("response is not valid UTF-8: {}", e),
        })
    }

    pub async fn download_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<T> {
        let bytes = self.download_bytes(url, cancel).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Run every task over a pool of `max_concurrency` workers.
    ///
    /// Always returns one result per task, in task order. Failures never abort
    /// the batch; once `cancel` is raised, tasks not yet started are reported
    /// as cancelled while started ones unwind.
    pub async fn download_files(
        &self,
        tasks: &[DownloadTask],
        max_concurrency: usize,
        progress: Option<ProgressFn>,
        cancel: &CancelFlag,
    ) -> Vec<DownloadResult> {
        self.download_files_reporting(tasks, max_concurrency, progress, None, cancel)
            .await
    }

    /// Same as [`download_files`](Self::download_files), also announcing each
    /// task's label to `current_item` as it starts.
    pub async fn download_files_reporting(
        &self,
        tasks: &[DownloadTask],
        max_concurrency: usize,
        progress: Option<ProgressFn>,
        current_item: Option<ItemFn>,
        cancel: &CancelFlag,
    ) -> Vec<DownloadResult> {
        let workers = max_concurrency.max(1);
        info!(
            "Starting batch download: {} files, concurrency={}",
            tasks.len(),
            workers
        );

        let batch = BatchProgress::new(tasks.len(), progress);
        let mut order: Vec<usize> = (0..tasks.len()).collect();
        order.sort_by_key(|&i| tasks[i].priority);

        let mut indexed: Vec<(usize, DownloadResult)> = stream::iter(order)
            .map(|i| {
                let task = &tasks[i];
                let batch = &batch;
                let current_item = current_item.as_ref();
                async move {
                    if cancel_requested(cancel) {
                        let result = DownloadResult::failed(
                            &task.url,
                            &task.target,
                            0,
                            LauncherError::Cancelled,
                        );
                        return (i, result);
                    }
                    if let Some(cb) = current_item {
                        cb(&task.label());
                    }
                    let result = self.download_task(task, None, cancel).await;
                    if !result.is_cancelled() {
                        batch.complete_one();
                    }
                    (i, result)
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        indexed.sort_by_key(|(i, _)| *i);
        let results: Vec<DownloadResult> = indexed.into_iter().map(|(_, r)| r).collect();

        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            warn!("Batch download finished with {}/{} failures", failed, results.len());
        } else {
            info!("Batch download finished: {} files", results.len());
        }
        results
    }

    // ── Verification ────────────────────────────────────

    /// Check an existing file against an optional SHA-1 and size.
    /// A missing file is simply not valid.
    pub async fn verify_file(
        path: &Path,
        expected_sha1: Option<&str>,
        expected_size: Option<u64>,
    ) -> LauncherResult<bool> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(LauncherError::io(path, e)),
        };
        if let Some(size) = expected_size {
            if meta.len() != size {
                return Ok(false);
            }
        }
        let Some(expected) = expected_sha1 else {
            return Ok(true);
        };

        let actual = sha1_file(path).await?;
        Ok(actual.eq_ignore_ascii_case(expected))
    }
}

/// Hex SHA-1 of a file, read in chunks.
pub async fn sha1_file(path: &Path) -> LauncherResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn part_path(target: &Path) -> PathBuf {
    let mut name: OsString = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

fn check_integrity(
    target: &Path,
    written: u64,
    actual_sha1: &str,
    expected_sha1: Option<&str>,
    expected_size: Option<u64>,
) -> LauncherResult<()> {
    if let Some(size) = expected_size {
        if size != written {
            return Err(LauncherError::SizeMismatch {
                path: target.to_path_buf(),
                expected: size,
                actual: written,
            });
        }
    }
    if let Some(expected) = expected_sha1 {
        if !actual_sha1.eq_ignore_ascii_case(expected) {
            return Err(LauncherError::HashVerification {
                path: target.to_path_buf(),
                expected: expected.to_string(),
                actual: actual_sha1.to_string(),
            });
        }
    }
    Ok(())
}

/// Final error for a download whose retries are spent: network failures become
/// `DownloadFailed` carrying the retry count, everything else passes through.
fn exhausted(url: &str, error: LauncherError, retry_count: u32) -> LauncherError {
    match error {
        LauncherError::Http(e) => LauncherError::DownloadFailed {
            url: url.to_string(),
            status: e.status().map(|s| s.as_u16()),
            retry_count,
            message: e.to_string(),
        },
        LauncherError::DownloadFailed {
            url, status, message, ..
        } => LauncherError::DownloadFailed {
            url,
            status,
            retry_count,
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        let p = part_path(Path::new("/libs/a/b-1.0.jar"));
        assert_eq!(p, PathBuf::from("/libs/a/b-1.0.jar.part"));
    }

    #[test]
    fn integrity_check_reports_hash_mismatch_for_target() {
        let target = Path::new("/libs/x.jar");
        let err = check_integrity(
            target,
            5,
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d",
            Some("0000000000000000000000000000000000000000"),
            Some(5),
        )
        .unwrap_err();
        assert!(matches!(err, LauncherError::HashVerification { ref path, .. } if path == target));

        assert!(check_integrity(
            target,
            5,
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d",
            Some("AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D"),
            None,
        )
        .is_ok());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let settings = DownloadSettings {
            retry_base_delay_ms: 100,
            ..DownloadSettings::default()
        };
        let downloader = Downloader::new(settings).unwrap();
        assert_eq!(downloader.backoff(0), Duration::from_millis(100));
        assert_eq!(downloader.backoff(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn verify_file_checks_size_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let good = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
        assert!(Downloader::verify_file(&path, Some(good), Some(5)).await.unwrap());
        assert!(!Downloader::verify_file(&path, Some(good), Some(6)).await.unwrap());
        assert!(!Downloader::verify_file(&path, Some("00"), None).await.unwrap());
        assert!(!Downloader::verify_file(&dir.path().join("none"), None, None)
            .await
            .unwrap());
    }
}
