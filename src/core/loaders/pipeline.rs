// ─── Install Pipeline ───
// One state machine for every loader. Strategies plug in metadata fetch,
// library download and the transform; the driver owns stage order, progress
// slices, base jar download, config/descriptor persistence and error tagging.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::cancel::{ensure_not_cancelled, CancelFlag};
use crate::core::downloader::{DownloadTask, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::{report, ProgressFn, StageProgress};
use crate::core::version::{self, VersionConfig, VersionDescriptor};

use super::context::{validate_version_id, version_id_for, InstallRun, InstallServices};
use super::kind::LoaderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Init,
    ResolveBase,
    FetchLoaderMetadata,
    PersistConfig,
    DownloadBaseArtifact,
    DownloadLoaderLibraries,
    Transform,
    WriteDescriptor,
    Done,
}

impl InstallStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStage::Init => "Init",
            InstallStage::ResolveBase => "ResolveBase",
            InstallStage::FetchLoaderMetadata => "FetchLoaderMetadata",
            InstallStage::PersistConfig => "PersistConfig",
            InstallStage::DownloadBaseArtifact => "DownloadBaseArtifact",
            InstallStage::DownloadLoaderLibraries => "DownloadLoaderLibraries",
            InstallStage::Transform => "Transform",
            InstallStage::WriteDescriptor => "WriteDescriptor",
            InstallStage::Done => "Done",
        }
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall progress range reserved for each reporting stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSlices {
    pub resolve_base: (f64, f64),
    pub loader_metadata: (f64, f64),
    pub base_artifact: (f64, f64),
    pub loader_libraries: (f64, f64),
    pub transform: (f64, f64),
    pub write_descriptor: (f64, f64),
}

impl StageSlices {
    pub const PROFILE: StageSlices = StageSlices {
        resolve_base: (0.0, 10.0),
        loader_metadata: (10.0, 15.0),
        base_artifact: (15.0, 35.0),
        loader_libraries: (35.0, 80.0),
        transform: (80.0, 95.0),
        write_descriptor: (95.0, 100.0),
    };

    pub const INSTALLER_JAR: StageSlices = StageSlices {
        resolve_base: (0.0, 5.0),
        loader_metadata: (5.0, 40.0),
        base_artifact: (40.0, 60.0),
        loader_libraries: (60.0, 85.0),
        transform: (85.0, 97.0),
        write_descriptor: (97.0, 100.0),
    };

    pub const BINARY_PATCH: StageSlices = StageSlices {
        resolve_base: (0.0, 5.0),
        loader_metadata: (5.0, 10.0),
        base_artifact: (10.0, 40.0),
        loader_libraries: (40.0, 70.0),
        transform: (70.0, 95.0),
        write_descriptor: (95.0, 100.0),
    };
}

/// The loader-specific parts of an install.
#[async_trait]
pub trait LoaderStrategy: Send + Sync {
    /// State carried from metadata fetch to transform. Owns any scratch
    /// directory, so dropping it cleans up.
    type Metadata: Send + Sync;

    fn kind(&self) -> LoaderKind;

    fn slices(&self) -> StageSlices;

    async fn fetch_metadata(
        &self,
        run: &InstallRun<'_>,
        base: &VersionDescriptor,
        progress: &StageProgress,
    ) -> LauncherResult<Self::Metadata>;

    async fn download_loader_libraries(
        &self,
        run: &InstallRun<'_>,
        metadata: &mut Self::Metadata,
        progress: &StageProgress,
    ) -> LauncherResult<()>;

    /// Produce the new version's descriptor. Its `id` is overwritten with the
    /// run's version id before writing.
    async fn transform(
        &self,
        run: &InstallRun<'_>,
        base: &VersionDescriptor,
        metadata: Self::Metadata,
        progress: &StageProgress,
    ) -> LauncherResult<VersionDescriptor>;

    async fn available_versions(
        &self,
        base_version_id: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<Vec<String>>;
}

/// Parameters of one install call.
pub struct InstallRequest<'a> {
    pub base_version_id: &'a str,
    pub loader_version: &'a str,
    pub root: &'a Path,
    pub custom_name: Option<&'a str>,
}

/// Drive `strategy` through every stage. Returns the new version id.
///
/// Failures come back as `ModLoaderInstall` tagged with the stage they hit;
/// cancellation comes back as plain `Cancelled`.
pub async fn run_install<S: LoaderStrategy>(
    strategy: &S,
    services: &InstallServices,
    request: &InstallRequest<'_>,
    progress: Option<ProgressFn>,
    cancel: &CancelFlag,
) -> LauncherResult<String> {
    let kind = strategy.kind();
    let version_id = version_id_for(
        kind,
        request.base_version_id,
        request.loader_version,
        request.custom_name,
    );
    let run = InstallRun {
        services,
        kind,
        base_version_id: request.base_version_id,
        loader_version: request.loader_version,
        version_id: &version_id,
        root: request.root,
        cancel,
    };

    info!(
        "Installing {} {} for Minecraft {} as {}",
        kind, request.loader_version, request.base_version_id, version_id
    );

    let mut stage = InstallStage::Init;
    match drive(strategy, &run, progress, &mut stage).await {
        Ok(()) => {
            info!("{} installed successfully as {}", kind, version_id);
            Ok(version_id)
        }
        Err(e) if e.is_cancelled() => {
            warn!("{} install of {} cancelled during {}", kind, version_id, stage);
            Err(e)
        }
        Err(e @ LauncherError::ModLoaderInstall { .. }) => Err(e),
        Err(e) => {
            warn!("{} install of {} failed during {}: {}", kind, version_id, stage, e);
            Err(LauncherError::ModLoaderInstall {
                loader_type: kind.as_str().to_string(),
                loader_version: request.loader_version.to_string(),
                base_version: request.base_version_id.to_string(),
                stage: stage.as_str().to_string(),
                source: Box::new(e),
            })
        }
    }
}

async fn drive<S: LoaderStrategy>(
    strategy: &S,
    run: &InstallRun<'_>,
    progress: Option<ProgressFn>,
    stage: &mut InstallStage,
) -> LauncherResult<()> {
    let services = run.services;
    let slices = strategy.slices();
    let slice = |range: (f64, f64)| StageProgress::new(range.0, range.1, progress.clone());

    // ── Init ──
    ensure_not_cancelled(run.cancel)?;
    if run.base_version_id.trim().is_empty() || run.loader_version.trim().is_empty() {
        return Err(LauncherError::InvalidArgument(
            "base version and loader version are required".into(),
        ));
    }
    validate_version_id(run.version_id)?;
    if version::is_installed(run.root, run.version_id) {
        return Err(LauncherError::AlreadyInstalled(run.version_id.to_string()));
    }

    // ── ResolveBase ──
    *stage = InstallStage::ResolveBase;
    ensure_not_cancelled(run.cancel)?;
    let resolve = slice(slices.resolve_base);
    resolve.begin();
    let base = services
        .versions
        .get_descriptor(run.base_version_id, run.root, true, run.cancel)
        .await?;
    resolve.finish();

    // ── FetchLoaderMetadata ──
    *stage = InstallStage::FetchLoaderMetadata;
    ensure_not_cancelled(run.cancel)?;
    let meta_progress = slice(slices.loader_metadata);
    meta_progress.begin();
    let mut metadata = strategy.fetch_metadata(run, &base, &meta_progress).await?;
    meta_progress.finish();

    // ── PersistConfig ──
    *stage = InstallStage::PersistConfig;
    ensure_not_cancelled(run.cancel)?;
    let config = VersionConfig::new(run.base_version_id, run.kind.as_str(), run.loader_version);
    services
        .versions
        .save_version_config(run.root, run.version_id, &config)
        .await?;

    // ── DownloadBaseArtifact ──
    *stage = InstallStage::DownloadBaseArtifact;
    ensure_not_cancelled(run.cancel)?;
    let jar_progress = slice(slices.base_artifact);
    jar_progress.begin();
    download_base_jar(&services.downloader, run, &base, &jar_progress).await?;
    jar_progress.finish();

    // ── DownloadLoaderLibraries ──
    *stage = InstallStage::DownloadLoaderLibraries;
    let lib_progress = slice(slices.loader_libraries);
    lib_progress.begin();
    ensure_not_cancelled(run.cancel)?;
    strategy
        .download_loader_libraries(run, &mut metadata, &lib_progress)
        .await?;
    lib_progress.finish();

    // ── Transform ──
    *stage = InstallStage::Transform;
    ensure_not_cancelled(run.cancel)?;
    let transform_progress = slice(slices.transform);
    transform_progress.begin();
    let mut descriptor = strategy
        .transform(run, &base, metadata, &transform_progress)
        .await?;
    transform_progress.finish();

    // ── WriteDescriptor ──
    *stage = InstallStage::WriteDescriptor;
    ensure_not_cancelled(run.cancel)?;
    descriptor.id = run.version_id.to_string();
    services.versions.write_descriptor(run.root, &descriptor).await?;
    slice(slices.write_descriptor).finish();

    *stage = InstallStage::Done;
    report(progress.as_ref(), 100.0);
    Ok(())
}

/// Fetch the base client jar into `versions/<id>/<id>.jar`, reusing a copy
/// that already verifies.
async fn download_base_jar(
    downloader: &Downloader,
    run: &InstallRun<'_>,
    base: &VersionDescriptor,
    progress: &StageProgress,
) -> LauncherResult<()> {
    let client = base.client_download().ok_or_else(|| {
        LauncherError::InvalidArgument(format!(
            "base version {} declares no client download",
            run.base_version_id
        ))
    })?;
    let target = run.client_jar();

    if Downloader::verify_file(&target, client.sha1.as_deref(), client.size).await?
        && client.sha1.is_some()
    {
        info!("Base client jar already present at {:?}", target);
        return Ok(());
    }

    let task = DownloadTask::new(client.url.clone(), target)
        .with_sha1(client.sha1.clone())
        .with_size(client.size)
        .with_description(format!("{}.jar", run.base_version_id));
    downloader
        .download_task(&task, progress.as_callback(), run.cancel)
        .await
        .into_result()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_contiguous(s: StageSlices) {
        let ranges = [
            s.resolve_base,
            s.loader_metadata,
            s.base_artifact,
            s.loader_libraries,
            s.transform,
            s.write_descriptor,
        ];
        assert_eq!(ranges[0].0, 0.0);
        assert_eq!(ranges[5].1, 100.0);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn stage_slices_cover_the_full_range() {
        assert_contiguous(StageSlices::PROFILE);
        assert_contiguous(StageSlices::INSTALLER_JAR);
        assert_contiguous(StageSlices::BINARY_PATCH);
    }

    #[test]
    fn stage_names_match_error_tags() {
        assert_eq!(InstallStage::DownloadLoaderLibraries.to_string(), "DownloadLoaderLibraries");
        assert_eq!(InstallStage::WriteDescriptor.as_str(), "WriteDescriptor");
    }
}
