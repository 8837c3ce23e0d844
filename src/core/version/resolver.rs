// ─── Version Resolver ───
// Catalog fetch/cache, local-first descriptor loading and inheritance merging.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::cancel::{ensure_not_cancelled, CancelFlag};
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::manifest::VersionManifest;
use crate::core::version::version_config::{VersionConfig, VERSION_CONFIG_FILE};
use crate::core::version::version_file::VersionDescriptor;

const MANIFEST_CACHE_FILE: &str = "version_manifest_v2.json";

/// Owns the in-memory catalog and the remote-descriptor cache.
pub struct VersionResolver {
    downloader: Downloader,
    manifest_url: String,
    manifest: RwLock<Option<Arc<VersionManifest>>>,
    remote_descriptors: RwLock<HashMap<String, String>>,
}

pub fn versions_dir(root: &Path) -> PathBuf {
    root.join("versions")
}

pub fn version_dir(root: &Path, version_id: &str) -> PathBuf {
    versions_dir(root).join(version_id)
}

/// `<root>/versions/<id>/<id>.json`
pub fn descriptor_path(root: &Path, version_id: &str) -> PathBuf {
    version_dir(root, version_id).join(format!("{}.json", version_id))
}

/// `<root>/versions/<id>/<id>.jar`
pub fn client_jar_path(root: &Path, version_id: &str) -> PathBuf {
    version_dir(root, version_id).join(format!("{}.jar", version_id))
}

/// A version is installed once its descriptor exists.
pub fn is_installed(root: &Path, version_id: &str) -> bool {
    descriptor_path(root, version_id).is_file()
}

impl VersionResolver {
    pub fn new(downloader: Downloader, manifest_url: impl Into<String>) -> Self {
        Self {
            downloader,
            manifest_url: manifest_url.into(),
            manifest: RwLock::new(None),
            remote_descriptors: RwLock::new(HashMap::new()),
        }
    }

    // ── Catalog ─────────────────────────────────────────

    /// Fetch the remote catalog. Failures are returned as-is; whether a
    /// cached catalog is acceptable is the caller's call.
    pub async fn get_manifest(&self, cancel: &CancelFlag) -> LauncherResult<Arc<VersionManifest>> {
        info!("Fetching Minecraft version manifest...");
        let manifest: VersionManifest = self
            .downloader
            .download_json(&self.manifest_url, cancel)
            .await?;
        info!("Loaded {} versions from manifest", manifest.versions.len());

        let manifest = Arc::new(manifest);
        *self.manifest.write().await = Some(manifest.clone());
        Ok(manifest)
    }

    /// Last catalog fetched or loaded by this resolver.
    pub async fn cached_manifest(&self) -> Option<Arc<VersionManifest>> {
        self.manifest.read().await.clone()
    }

    pub async fn save_manifest(&self, root: &Path) -> LauncherResult<()> {
        let Some(manifest) = self.cached_manifest().await else {
            return Ok(());
        };
        let dir = versions_dir(root);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LauncherError::io(&dir, e))?;
        let path = dir.join(MANIFEST_CACHE_FILE);
        let json = serde_json::to_string(manifest.as_ref())?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| LauncherError::io(&path, e))
    }

    /// Load a catalog saved by [`save_manifest`](Self::save_manifest) and make it current.
    pub async fn load_cached_manifest(&self, root: &Path) -> LauncherResult<Arc<VersionManifest>> {
        let path = versions_dir(root).join(MANIFEST_CACHE_FILE);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
        let manifest = Arc::new(serde_json::from_str::<VersionManifest>(&raw)?);
        *self.manifest.write().await = Some(manifest.clone());
        Ok(manifest)
    }

    async fn manifest_for_lookup(&self, cancel: &CancelFlag) -> LauncherResult<Arc<VersionManifest>> {
        match self.cached_manifest().await {
            Some(m) => Ok(m),
            None => self.get_manifest(cancel).await,
        }
    }

    // ── Descriptors ─────────────────────────────────────

    /// Raw JSON of one descriptor, without resolving inheritance.
    ///
    /// Local file first; then, when `allow_network`, the catalog URL. Remote
    /// JSON is cached in memory only, never written under `versions/`.
    pub async fn get_descriptor_json(
        &self,
        version_id: &str,
        root: &Path,
        allow_network: bool,
        cancel: &CancelFlag,
    ) -> LauncherResult<String> {
        ensure_not_cancelled(cancel)?;

        let local = descriptor_path(root, version_id);
        if local.is_file() {
            debug!("Loading local descriptor {:?}", local);
            return tokio::fs::read_to_string(&local)
                .await
                .map_err(|e| LauncherError::io(&local, e));
        }

        if !allow_network {
            return Err(LauncherError::VersionNotFound {
                version_id: version_id.to_string(),
                local_only: true,
            });
        }

        if let Some(raw) = self.remote_descriptors.read().await.get(version_id) {
            return Ok(raw.clone());
        }

        match self.fetch_remote_descriptor(version_id, cancel).await {
            Ok(raw) => {
                self.remote_descriptors
                    .write()
                    .await
                    .insert(version_id.to_string(), raw.clone());
                Ok(raw)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Could not fetch descriptor for {}: {}", version_id, e);
                Err(LauncherError::VersionNotFound {
                    version_id: version_id.to_string(),
                    local_only: false,
                })
            }
        }
    }

    async fn fetch_remote_descriptor(
        &self,
        version_id: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<String> {
        let manifest = self.manifest_for_lookup(cancel).await?;
        let entry = manifest
            .find_version(version_id)
            .ok_or_else(|| LauncherError::VersionNotFound {
                version_id: version_id.to_string(),
                local_only: false,
            })?;
        info!("Fetching descriptor for {} from {}", version_id, entry.url);
        self.downloader.download_string(&entry.url, cancel).await
    }

    /// Load `version_id` and merge its parent. Exactly one level is resolved:
    /// a parent that itself declares `inheritsFrom` is refused.
    pub async fn get_descriptor(
        &self,
        version_id: &str,
        root: &Path,
        allow_network: bool,
        cancel: &CancelFlag,
    ) -> LauncherResult<VersionDescriptor> {
        let descriptor = self.load_descriptor(version_id, root, allow_network, cancel).await?;
        let Some(parent_id) = descriptor.inherits_from.clone() else {
            return Ok(descriptor);
        };

        let parent = self.load_descriptor(&parent_id, root, allow_network, cancel).await?;
        if let Some(grandparent) = &parent.inherits_from {
            return Err(LauncherError::InvalidArgument(format!(
                "{} inherits from {}, which is not a base version (it inherits from {})",
                version_id, parent_id, grandparent
            )));
        }
        debug!("Merging {} onto {}", version_id, parent_id);
        Ok(merge_version_info(&descriptor, Some(&parent)))
    }

    async fn load_descriptor(
        &self,
        version_id: &str,
        root: &Path,
        allow_network: bool,
        cancel: &CancelFlag,
    ) -> LauncherResult<VersionDescriptor> {
        let raw = self
            .get_descriptor_json(version_id, root, allow_network, cancel)
            .await?;
        let mut descriptor: VersionDescriptor = serde_json::from_str(&raw)?;
        if descriptor.id.is_empty() {
            descriptor.id = version_id.to_string();
        }
        Ok(descriptor)
    }

    /// Ids of version directories holding their `<id>.json`.
    pub async fn list_installed(&self, root: &Path) -> LauncherResult<Vec<String>> {
        list_installed(root).await
    }

    // ── Version config ──────────────────────────────────

    pub async fn save_version_config(
        &self,
        root: &Path,
        version_id: &str,
        config: &VersionConfig,
    ) -> LauncherResult<()> {
        let dir = version_dir(root, version_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LauncherError::io(&dir, e))?;
        let path = dir.join(VERSION_CONFIG_FILE);
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| LauncherError::io(&path, e))
    }

    /// `None` for plain versions that never got a config.
    pub async fn get_version_config(
        &self,
        root: &Path,
        version_id: &str,
    ) -> LauncherResult<Option<VersionConfig>> {
        let path = version_dir(root, version_id).join(VERSION_CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LauncherError::io(&path, e)),
        }
    }

    /// Write `<id>.json` through a temp file so it appears atomically.
    pub async fn write_descriptor(
        &self,
        root: &Path,
        descriptor: &VersionDescriptor,
    ) -> LauncherResult<PathBuf> {
        let path = descriptor_path(root, &descriptor.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(descriptor)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| LauncherError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
        Ok(path)
    }
}

pub async fn list_installed(root: &Path) -> LauncherResult<Vec<String>> {
    let dir = versions_dir(root);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LauncherError::io(&dir, e)),
    };

    let mut ids = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LauncherError::io(&dir, e))?
    {
        let Ok(id) = entry.file_name().into_string() else {
            continue;
        };
        if entry.path().is_dir() && is_installed(root, &id) {
            ids.push(id);
        }
    }
    ids.sort();
    Ok(ids)
}

/// Merge a child descriptor onto its parent.
///
/// Child scalars win when present, libraries are parent first then child, and
/// the result has no `inheritsFrom`. With no parent the child is returned as is.
pub fn merge_version_info(
    child: &VersionDescriptor,
    parent: Option<&VersionDescriptor>,
) -> VersionDescriptor {
    let Some(parent) = parent else {
        return child.clone();
    };

    let mut extra = parent.extra.clone();
    for (k, v) in &child.extra {
        extra.insert(k.clone(), v.clone());
    }

    let mut libraries = parent.libraries.clone();
    libraries.extend(child.libraries.iter().cloned());

    VersionDescriptor {
        id: if child.id.is_empty() {
            parent.id.clone()
        } else {
            child.id.clone()
        },
        version_type: child.version_type.clone().or_else(|| parent.version_type.clone()),
        main_class: child.main_class.clone().or_else(|| parent.main_class.clone()),
        inherits_from: None,
        arguments: child.arguments.clone().or_else(|| parent.arguments.clone()),
        minecraft_arguments: child
            .minecraft_arguments
            .clone()
            .or_else(|| parent.minecraft_arguments.clone()),
        libraries,
        asset_index: child.asset_index.clone().or_else(|| parent.asset_index.clone()),
        assets: child.assets.clone().or_else(|| parent.assets.clone()),
        downloads: child.downloads.clone().or_else(|| parent.downloads.clone()),
        java_version: child.java_version.clone().or_else(|| parent.java_version.clone()),
        release_time: child.release_time.clone().or_else(|| parent.release_time.clone()),
        time: child.time.clone().or_else(|| parent.time.clone()),
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DownloadSettings;
    use crate::core::version::version_file::Library;

    fn descriptor(json: serde_json::Value) -> VersionDescriptor {
        serde_json::from_value(json).unwrap()
    }

    fn resolver() -> VersionResolver {
        let downloader = Downloader::new(DownloadSettings::default()).unwrap();
        VersionResolver::new(downloader, "http://127.0.0.1:9/manifest.json")
    }

    fn write_local(root: &Path, d: &serde_json::Value) {
        let id = d["id"].as_str().unwrap();
        let path = descriptor_path(root, id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, d.to_string()).unwrap();
    }

    #[test]
    fn child_overrides_scalars_and_appends_libraries() {
        let parent = descriptor(serde_json::json!({
            "id": "1.20.4",
            "type": "release",
            "mainClass": "net.minecraft.client.main.Main",
            "assetIndex": { "id": "12", "url": "https://x/12.json" },
            "libraries": [{ "name": "a:b:1.0" }]
        }));
        let child = descriptor(serde_json::json!({
            "id": "fabric-1.20.4-0.15.0",
            "inheritsFrom": "1.20.4",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "libraries": [{ "name": "a:b:1.0" }, { "name": "c:d:2.0" }]
        }));

        let merged = merge_version_info(&child, Some(&parent));
        assert_eq!(merged.id, "fabric-1.20.4-0.15.0");
        assert_eq!(
            merged.main_class.as_deref(),
            Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
        );
        assert_eq!(merged.version_type.as_deref(), Some("release"));
        assert_eq!(merged.asset_index_id(), Some("12"));
        assert!(merged.inherits_from.is_none());
        let names: Vec<&str> = merged.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a:b:1.0", "a:b:1.0", "c:d:2.0"]);
    }

    #[test]
    fn merging_with_no_parent_is_identity() {
        let parent = descriptor(serde_json::json!({ "id": "p", "mainClass": "P" }));
        let mut child = descriptor(serde_json::json!({ "id": "c", "inheritsFrom": "p" }));
        child.libraries.push(Library::new("x:y:1"));

        let merged = merge_version_info(&child, Some(&parent));
        assert_eq!(merge_version_info(&merged, None), merged);
    }

    #[tokio::test]
    async fn local_chain_is_flattened_without_network() {
        let dir = tempfile::tempdir().unwrap();
        write_local(
            dir.path(),
            &serde_json::json!({ "id": "1.20.4", "mainClass": "M", "libraries": [{ "name": "a:b:1" }] }),
        );
        write_local(
            dir.path(),
            &serde_json::json!({ "id": "child", "inheritsFrom": "1.20.4", "libraries": [{ "name": "c:d:1" }] }),
        );

        let cancel = crate::core::cancel::new_cancel_flag();
        let merged = resolver()
            .get_descriptor("child", dir.path(), false, &cancel)
            .await
            .unwrap();
        assert_eq!(merged.main_class.as_deref(), Some("M"));
        assert_eq!(merged.libraries.len(), 2);
    }

    #[tokio::test]
    async fn missing_parent_without_network_is_version_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_local(
            dir.path(),
            &serde_json::json!({ "id": "child", "inheritsFrom": "1.20.4" }),
        );

        let cancel = crate::core::cancel::new_cancel_flag();
        let err = resolver()
            .get_descriptor("child", dir.path(), false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LauncherError::VersionNotFound { ref version_id, local_only: true } if version_id == "1.20.4"
        ));
    }

    #[tokio::test]
    async fn inheritance_cycle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), &serde_json::json!({ "id": "a", "inheritsFrom": "b" }));
        write_local(dir.path(), &serde_json::json!({ "id": "b", "inheritsFrom": "a" }));

        let cancel = crate::core::cancel::new_cancel_flag();
        let err = resolver()
            .get_descriptor("a", dir.path(), false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn parent_that_inherits_again_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), &serde_json::json!({ "id": "1.20.4", "mainClass": "M" }));
        write_local(
            dir.path(),
            &serde_json::json!({ "id": "fabric-1.20.4-0.15.0", "inheritsFrom": "1.20.4" }),
        );
        write_local(
            dir.path(),
            &serde_json::json!({ "id": "modpack", "inheritsFrom": "fabric-1.20.4-0.15.0" }),
        );

        let cancel = crate::core::cancel::new_cancel_flag();
        let err = resolver()
            .get_descriptor("modpack", dir.path(), false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::InvalidArgument(_)));

        let merged = resolver()
            .get_descriptor("fabric-1.20.4-0.15.0", dir.path(), false, &cancel)
            .await
            .unwrap();
        assert_eq!(merged.main_class.as_deref(), Some("M"));
    }

    #[tokio::test]
    async fn list_installed_requires_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), &serde_json::json!({ "id": "1.20.4" }));
        std::fs::create_dir_all(version_dir(dir.path(), "broken")).unwrap();

        let ids = list_installed(dir.path()).await.unwrap();
        assert_eq!(ids, vec!["1.20.4".to_string()]);
    }

    #[tokio::test]
    async fn version_config_round_trips_and_descriptor_write_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver();

        assert!(resolver
            .get_version_config(dir.path(), "fabric-1.20.4-0.15.0")
            .await
            .unwrap()
            .is_none());

        let config = VersionConfig::new("1.20.4", "Fabric", "0.15.0");
        resolver
            .save_version_config(dir.path(), "fabric-1.20.4-0.15.0", &config)
            .await
            .unwrap();
        let read = resolver
            .get_version_config(dir.path(), "fabric-1.20.4-0.15.0")
            .await
            .unwrap();
        assert_eq!(read, Some(config));
        assert!(!is_installed(dir.path(), "fabric-1.20.4-0.15.0"));

        let d = descriptor(serde_json::json!({ "id": "fabric-1.20.4-0.15.0" }));
        let path = resolver.write_descriptor(dir.path(), &d).await.unwrap();
        assert!(path.is_file());
        assert!(!path.with_extension("json.tmp").exists());
        assert!(is_installed(dir.path(), "fabric-1.20.4-0.15.0"));
    }
}
