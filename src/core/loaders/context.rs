use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::cancel::CancelFlag;
use crate::core::config::{Endpoints, LauncherConfig};
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::libraries::LibraryResolver;
use crate::core::version::{self, Platform, VersionResolver};

use super::kind::LoaderKind;

/// Shared collaborators every installer run draws on.
pub struct InstallServices {
    pub downloader: Downloader,
    pub versions: Arc<VersionResolver>,
    pub libraries: LibraryResolver,
    pub endpoints: Endpoints,
    pub cache_dir: PathBuf,
    /// Enables installer processors when set.
    pub java_path: Option<PathBuf>,
    pub max_concurrency: usize,
}

impl InstallServices {
    pub fn from_config(config: &LauncherConfig) -> LauncherResult<Self> {
        let downloader = Downloader::new(config.download.clone())?;
        let versions = Arc::new(VersionResolver::new(
            downloader.clone(),
            config.endpoints.version_manifest.clone(),
        ));
        Ok(Self::new(config, downloader, versions))
    }

    /// Build around an existing resolver so its caches are shared.
    pub fn new(
        config: &LauncherConfig,
        downloader: Downloader,
        versions: Arc<VersionResolver>,
    ) -> Self {
        Self {
            libraries: LibraryResolver::new(Platform::current(), config.endpoints.libraries.clone()),
            endpoints: config.endpoints.clone(),
            cache_dir: config.cache_dir.clone(),
            java_path: config.java_path.clone(),
            max_concurrency: config.download.max_concurrency.max(1),
            downloader,
            versions,
        }
    }
}

/// Target version id: the custom name when given, else
/// `<loader-lowercase>-<base>-<loaderVersion>`.
pub fn version_id_for(
    kind: LoaderKind,
    base_version_id: &str,
    loader_version: &str,
    custom_name: Option<&str>,
) -> String {
    match custom_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("{}-{}-{}", kind.slug(), base_version_id, loader_version),
    }
}

/// A version id names a single directory under `versions/`.
pub fn validate_version_id(version_id: &str) -> LauncherResult<()> {
    let bad = version_id.is_empty()
        || version_id.contains("..")
        || version_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if bad {
        return Err(LauncherError::InvalidArgument(format!(
            "invalid version id {:?}",
            version_id
        )));
    }
    Ok(())
}

/// Everything one installation run knows about itself.
pub struct InstallRun<'a> {
    pub services: &'a InstallServices,
    pub kind: LoaderKind,
    pub base_version_id: &'a str,
    pub loader_version: &'a str,
    pub version_id: &'a str,
    pub root: &'a Path,
    pub cancel: &'a CancelFlag,
}

impl InstallRun<'_> {
    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn version_dir(&self) -> PathBuf {
        version::version_dir(self.root, self.version_id)
    }

    /// `versions/<id>/<id>.jar`, the copy of the base client this version runs.
    pub fn client_jar(&self) -> PathBuf {
        version::client_jar_path(self.root, self.version_id)
    }

    /// `<cache_dir>/<loader>/<versionId>`
    pub fn scratch_path(&self) -> PathBuf {
        self.services
            .cache_dir
            .join(self.kind.slug())
            .join(self.version_id)
    }
}
