// ─── Profile Loaders ───
// Fabric and Quilt publish a ready-made launcher profile per (game, loader)
// pair. Installing one is: fetch the profile, pull its libraries, and write a
// descriptor that inherits from the base version.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::cancel::CancelFlag;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::{ProgressFn, StageProgress};
use crate::core::version::{Arguments, Library, VersionDescriptor};

use super::context::{InstallRun, InstallServices};
use super::kind::LoaderKind;
use super::pipeline::{run_install, InstallRequest, LoaderStrategy, StageSlices};

/// Where one profile ecosystem lives.
#[derive(Debug, Clone)]
pub struct ProfileSource {
    pub kind: LoaderKind,
    pub meta_url: String,
    pub maven_url: String,
    pub default_main_class: &'static str,
}

/// Typed subset of `<meta>/versions/loader/<game>/<loader>/profile/json`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub profile_type: Option<String>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub release_time: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoaderListEntry {
    loader: LoaderVersionInfo,
}

#[derive(Debug, Deserialize)]
struct LoaderVersionInfo {
    version: String,
}

pub struct ProfileInstaller {
    services: Arc<InstallServices>,
    source: ProfileSource,
}

impl ProfileInstaller {
    pub fn new(services: Arc<InstallServices>, source: ProfileSource) -> Self {
        Self { services, source }
    }

    pub fn source(&self) -> &ProfileSource {
        &self.source
    }

    pub async fn install(
        &self,
        request: &InstallRequest<'_>,
        progress: Option<ProgressFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<String> {
        run_install(self, &self.services, request, progress, cancel).await
    }

    fn profile_url(&self, base_version_id: &str, loader_version: &str) -> String {
        format!(
            "{}/versions/loader/{}/{}/profile/json",
            self.source.meta_url.trim_end_matches('/'),
            base_version_id,
            loader_version
        )
    }

    async fn fetch_profile(
        &self,
        base_version_id: &str,
        loader_version: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<LoaderProfile> {
        let url = self.profile_url(base_version_id, loader_version);
        debug!("Fetching {} profile: {}", self.source.kind, url);

        let profile: LoaderProfile = self
            .services
            .downloader
            .download_json(&url, cancel)
            .await
            .map_err(|e| self.api_error(e, &url))?;

        Ok(normalize_profile(profile, &self.source))
    }

    fn api_error(&self, e: LauncherError, url: &str) -> LauncherError {
        if e.is_cancelled() {
            return e;
        }
        LauncherError::LoaderApi(format!("{} meta request {} failed: {}", self.source.kind, url, e))
    }
}

/// Point libraries that name no repository at the ecosystem's maven. The
/// list itself is kept as the profile gives it.
fn normalize_profile(mut profile: LoaderProfile, source: &ProfileSource) -> LoaderProfile {
    for lib in &mut profile.libraries {
        if lib.downloads.is_none() && lib.url.as_deref().map_or(true, str::is_empty) {
            lib.url = Some(source.maven_url.clone());
        }
    }
    profile
}

#[async_trait]
impl LoaderStrategy for ProfileInstaller {
    type Metadata = LoaderProfile;

    fn kind(&self) -> LoaderKind {
        self.source.kind
    }

    fn slices(&self) -> StageSlices {
        StageSlices::PROFILE
    }

    async fn fetch_metadata(
        &self,
        run: &InstallRun<'_>,
        _base: &VersionDescriptor,
        _progress: &StageProgress,
    ) -> LauncherResult<LoaderProfile> {
        let profile = self
            .fetch_profile(run.base_version_id, run.loader_version, run.cancel)
            .await?;
        info!(
            "{} profile lists {} libraries",
            self.source.kind,
            profile.libraries.len()
        );
        Ok(profile)
    }

    async fn download_loader_libraries(
        &self,
        run: &InstallRun<'_>,
        profile: &mut LoaderProfile,
        progress: &StageProgress,
    ) -> LauncherResult<()> {
        let services = run.services;
        services
            .libraries
            .download_library_set(
                &profile.libraries,
                &run.libraries_dir(),
                &services.downloader,
                services.max_concurrency,
                progress.as_callback(),
                None,
                run.cancel,
            )
            .await
    }

    async fn transform(
        &self,
        run: &InstallRun<'_>,
        base: &VersionDescriptor,
        profile: LoaderProfile,
        _progress: &StageProgress,
    ) -> LauncherResult<VersionDescriptor> {
        let main_class = profile
            .main_class
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.source.default_main_class.to_string());

        Ok(VersionDescriptor {
            id: run.version_id.to_string(),
            version_type: profile.profile_type.or_else(|| base.version_type.clone()),
            main_class: Some(main_class),
            inherits_from: Some(run.base_version_id.to_string()),
            arguments: profile.arguments,
            libraries: profile.libraries,
            release_time: profile.release_time.or_else(|| base.release_time.clone()),
            time: profile.time.or_else(|| base.time.clone()),
            ..VersionDescriptor::default()
        })
    }

    async fn available_versions(
        &self,
        base_version_id: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<Vec<String>> {
        let url = format!(
            "{}/versions/loader/{}",
            self.source.meta_url.trim_end_matches('/'),
            base_version_id
        );
        let entries: Vec<LoaderListEntry> = self
            .services
            .downloader
            .download_json(&url, cancel)
            .await
            .map_err(|e| self.api_error(e, &url))?;

        Ok(entries.into_iter().map(|e| e.loader.version).collect())
    }
}
