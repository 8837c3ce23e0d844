use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::cancel::{ensure_not_cancelled, CancelFlag};
use crate::core::downloader::{DownloadTask, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::{report, ItemFn, ProgressFn};
use crate::core::version::{VersionDescriptor, VersionResolver};

/// Top-level asset index JSON structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub objects: BTreeMap<String, AssetObject>,
    /// Pre-1.7 indexes laid out as plain files under `assets/virtual/`.
    #[serde(default, rename = "virtual", skip_serializing_if = "std::ops::Not::not")]
    pub is_virtual: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// `<hash[0:2]>/<hash>`, or `None` for a malformed hash.
    pub fn relative_path(&self) -> Option<PathBuf> {
        let prefix = self.hash.get(..2)?;
        Some(PathBuf::from(prefix).join(&self.hash))
    }
}

pub fn index_path(root: &Path, index_id: &str) -> PathBuf {
    root.join("assets").join("indexes").join(format!("{}.json", index_id))
}

pub fn objects_dir(root: &Path) -> PathBuf {
    root.join("assets").join("objects")
}

/// Asset index and content-addressed object downloads.
pub struct AssetManager {
    downloader: Downloader,
    versions: Arc<VersionResolver>,
    resources_url: String,
    max_concurrency: usize,
}

impl AssetManager {
    pub fn new(
        downloader: Downloader,
        versions: Arc<VersionResolver>,
        resources_url: impl Into<String>,
    ) -> Self {
        let max_concurrency = downloader.settings().max_concurrency;
        Self {
            downloader,
            versions,
            resources_url: resources_url.into(),
            max_concurrency,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    /// Make sure the index referenced by `descriptor` is on disk and valid.
    pub async fn ensure_asset_index(
        &self,
        version_id: &str,
        descriptor: &VersionDescriptor,
        root: &Path,
        progress: Option<ProgressFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<PathBuf> {
        let index_ref = descriptor.asset_index.as_ref().ok_or_else(|| {
            LauncherError::InvalidArgument(format!("version {} has no asset index", version_id))
        })?;
        let path = index_path(root, &index_ref.id);

        if Downloader::verify_file(&path, index_ref.sha1.as_deref(), index_ref.size).await? {
            report(progress.as_ref(), 100.0);
            return Ok(path);
        }

        info!("Downloading asset index {} for {}", index_ref.id, version_id);
        let task = DownloadTask::new(index_ref.url.clone(), path)
            .with_sha1(index_ref.sha1.clone())
            .with_size(index_ref.size);
        self.downloader
            .download_task(&task, progress, cancel)
            .await
            .into_result()
    }

    /// Load a local index file.
    pub async fn get_asset_index(&self, index_id: &str, root: &Path) -> LauncherResult<AssetIndex> {
        let path = index_path(root, index_id);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Index entries whose object file is absent.
    pub async fn get_missing_asset_count(&self, index_id: &str, root: &Path) -> LauncherResult<usize> {
        let index = self.get_asset_index(index_id, root).await?;
        let objects = objects_dir(root);
        Ok(index
            .objects
            .values()
            .filter(|obj| match obj.relative_path() {
                Some(relative) => !objects.join(relative).exists(),
                None => true,
            })
            .count())
    }

    fn missing_object_tasks(&self, index: &AssetIndex, root: &Path) -> Vec<DownloadTask> {
        let objects = objects_dir(root);
        let base = self.resources_url.trim_end_matches('/');

        // Several names can share one hash; each object is fetched once.
        let mut by_hash: BTreeMap<&str, DownloadTask> = BTreeMap::new();
        for (name, obj) in &index.objects {
            let Some(relative) = obj.relative_path() else {
                warn!("Skipping asset {} with malformed hash {:?}", name, obj.hash);
                continue;
            };
            let dest = objects.join(&relative);
            if dest.exists() {
                continue;
            }
            let url = format!("{}/{}/{}", base, &obj.hash[..2], obj.hash);
            by_hash.entry(obj.hash.as_str()).or_insert_with(|| {
                DownloadTask::new(url, dest)
                    .with_sha1(Some(obj.hash.clone()))
                    .with_size(Some(obj.size))
                    .with_description(name.clone())
            });
        }
        by_hash.into_values().collect()
    }

    /// Fetch every object of the version's index that is not on disk yet.
    /// Present objects are trusted by path alone.
    pub async fn download_all_asset_objects(
        &self,
        version_id: &str,
        root: &Path,
        progress: Option<ProgressFn>,
        current_item: Option<ItemFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<()> {
        let descriptor = self
            .versions
            .get_descriptor(version_id, root, true, cancel)
            .await?;
        self.ensure_asset_index(version_id, &descriptor, root, None, cancel)
            .await?;
        let index_id = descriptor
            .asset_index_id()
            .map(str::to_string)
            .unwrap_or_default();
        let index = self.get_asset_index(&index_id, root).await?;

        let tasks = self.missing_object_tasks(&index, root);
        info!(
            "Downloading {} asset objects ({} already cached)",
            tasks.len(),
            index.objects.len().saturating_sub(tasks.len())
        );
        if tasks.is_empty() {
            report(progress.as_ref(), 100.0);
            return Ok(());
        }

        let results = self
            .downloader
            .download_files_reporting(&tasks, self.max_concurrency, progress, current_item, cancel)
            .await;
        ensure_not_cancelled(cancel)?;

        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            warn!("{} asset downloads failed", failed);
            return Err(LauncherError::AssetDownload {
                index_id,
                failed,
                total: results.len(),
            });
        }
        Ok(())
    }
}
