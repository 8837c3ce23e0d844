use std::path::{Path, PathBuf};

use crate::core::error::{LauncherError, LauncherResult};

/// A single verified download. Immutable once handed to the downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub target: PathBuf,
    pub expected_sha1: Option<String>,
    pub expected_size: Option<u64>,
    /// Lower values are scheduled first.
    pub priority: i32,
    pub description: Option<String>,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            target: target.into(),
            expected_sha1: None,
            expected_size: None,
            priority: 0,
            description: None,
        }
    }

    pub fn with_sha1(mut self, sha1: Option<String>) -> Self {
        self.expected_sha1 = sha1.filter(|s| !s.is_empty());
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.expected_size = size.filter(|s| *s > 0);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Text handed to "current item" callbacks.
    pub fn label(&self) -> String {
        match &self.description {
            Some(d) => d.clone(),
            None => self
                .target
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.url.clone()),
        }
    }
}

/// Outcome of one task. Exactly one is produced per task.
#[derive(Debug)]
pub struct DownloadResult {
    pub url: String,
    pub target: PathBuf,
    pub retry_count: u32,
    pub error: Option<LauncherError>,
}

impl DownloadResult {
    pub fn succeeded(url: &str, target: &Path, retry_count: u32) -> Self {
        Self {
            url: url.to_string(),
            target: target.to_path_buf(),
            retry_count,
            error: None,
        }
    }

    pub fn failed(url: &str, target: &Path, retry_count: u32, error: LauncherError) -> Self {
        Self {
            url: url.to_string(),
            target: target.to_path_buf(),
            retry_count,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(LauncherError::is_cancelled)
    }

    /// Path of the written file, present only on success.
    pub fn file_path(&self) -> Option<&Path> {
        self.is_success().then_some(self.target.as_path())
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    pub fn into_result(self) -> LauncherResult<PathBuf> {
        match self.error {
            None => Ok(self.target),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_checksums_are_treated_as_absent() {
        let task = DownloadTask::new("https://example.com/a.jar", "/tmp/a.jar")
            .with_sha1(Some(String::new()))
            .with_size(Some(0));
        assert!(task.expected_sha1.is_none());
        assert!(task.expected_size.is_none());
        assert_eq!(task.label(), "a.jar");
    }

    #[test]
    fn failed_result_exposes_no_file_path() {
        let result = DownloadResult::failed(
            "https://example.com/a.jar",
            Path::new("/tmp/a.jar"),
            2,
            LauncherError::Cancelled,
        );
        assert!(!result.is_success());
        assert!(result.is_cancelled());
        assert!(result.file_path().is_none());
        assert_eq!(result.error_message().as_deref(), Some("Operation cancelled"));
    }
}
