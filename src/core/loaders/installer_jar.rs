// ─── Installer-jar Loaders ───
// Forge and NeoForge ship an installer archive holding `install_profile.json`
// (extra libraries plus client processors) and `version.json` (the loader's
// partial descriptor). The archive is unpacked into a scratch directory that
// lives exactly as long as the run's metadata.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::core::cancel::{cancel_requested, ensure_not_cancelled, CancelFlag};
use crate::core::config::Endpoints;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::{MavenArtifact, MavenMetadata};
use crate::core::progress::{ProgressFn, StageProgress};
use crate::core::version::{merge_version_info, Library, VersionDescriptor};

use super::context::{InstallRun, InstallServices};
use super::forge::{forge_installer_url, forge_metadata_url, forge_versions};
use super::kind::LoaderKind;
use super::neoforge::{neoforge_installer_urls, neoforge_versions, neoforge_versions_url, NeoForgeVersionList};
use super::pipeline::{run_install, InstallRequest, LoaderStrategy, StageSlices};
use super::scratch::ScratchDir;

const INSTALL_PROFILE: &str = "install_profile.json";
const VERSION_JSON: &str = "version.json";

/// Subset of `install_profile.json` as written by 1.13+ installers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallProfile {
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub minecraft: Option<String>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub processors: Vec<Processor>,
    #[serde(default)]
    pub data: BTreeMap<String, SidedValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SidedValue {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Processor {
    #[serde(default)]
    pub sides: Option<Vec<String>>,
    pub jar: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Processor {
    pub fn runs_on_client(&self) -> bool {
        self.sides
            .as_ref()
            .map_or(true, |sides| sides.iter().any(|s| s == "client"))
    }
}

/// State carried through one installer-jar run. Dropping it removes the
/// scratch directory.
pub struct InstallerJarMetadata {
    scratch: ScratchDir,
    installer: PathBuf,
    extracted: PathBuf,
    pub profile: InstallProfile,
    pub version_json: VersionDescriptor,
}

impl InstallerJarMetadata {
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerFlavor {
    Forge,
    NeoForge,
}

impl InstallerFlavor {
    pub fn kind(&self) -> LoaderKind {
        match self {
            InstallerFlavor::Forge => LoaderKind::Forge,
            InstallerFlavor::NeoForge => LoaderKind::NeoForge,
        }
    }

    pub fn installer_urls(&self, endpoints: &Endpoints, base: &str, loader_version: &str) -> Vec<String> {
        match self {
            InstallerFlavor::Forge => vec![forge_installer_url(&endpoints.forge_maven, base, loader_version)],
            InstallerFlavor::NeoForge => {
                neoforge_installer_urls(&endpoints.neoforge_maven, base, loader_version)
            }
        }
    }
}

pub struct InstallerJarInstaller {
    services: Arc<InstallServices>,
    flavor: InstallerFlavor,
}

impl InstallerJarInstaller {
    pub fn new(services: Arc<InstallServices>, flavor: InstallerFlavor) -> Self {
        Self { services, flavor }
    }

    pub fn flavor(&self) -> InstallerFlavor {
        self.flavor
    }

    pub async fn install(
        &self,
        request: &InstallRequest<'_>,
        progress: Option<ProgressFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<String> {
        run_install(self, &self.services, request, progress, cancel).await
    }

    /// Try each installer location in turn; the first error is reported when
    /// all of them fail.
    async fn download_installer(
        &self,
        run: &InstallRun<'_>,
        target: &Path,
        progress: &StageProgress,
    ) -> LauncherResult<()> {
        let urls = self
            .flavor
            .installer_urls(&self.services.endpoints, run.base_version_id, run.loader_version);

        let mut first_error = None;
        for url in urls {
            info!("Downloading {} installer: {}", self.flavor.kind(), url);
            let result = self
                .services
                .downloader
                .download_file(&url, target, None, progress.as_callback(), run.cancel)
                .await;
            match result.into_result() {
                Ok(_) => return Ok(()),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Installer not available at {}: {}", url, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| {
            LauncherError::Other(format!("no installer location for {}", self.flavor.kind()))
        }))
    }
}

#[async_trait]
impl LoaderStrategy for InstallerJarInstaller {
    type Metadata = InstallerJarMetadata;

    fn kind(&self) -> LoaderKind {
        self.flavor.kind()
    }

    fn slices(&self) -> StageSlices {
        StageSlices::INSTALLER_JAR
    }

    async fn fetch_metadata(
        &self,
        run: &InstallRun<'_>,
        _base: &VersionDescriptor,
        progress: &StageProgress,
    ) -> LauncherResult<InstallerJarMetadata> {
        let scratch = ScratchDir::create(run.scratch_path())?;
        let installer = scratch.join("installer.jar");
        let extracted = scratch.join("extracted");

        // Download takes most of this stage; extraction the rest.
        let download_progress = StageProgress::new(0.0, 80.0, progress.as_callback());
        self.download_installer(run, &installer, &download_progress).await?;

        let cancel = run.cancel.clone();
        let (archive, dest) = (installer.clone(), extracted.clone());
        let entries = tokio::task::spawn_blocking(move || extract_archive(&archive, &dest, &cancel))
            .await
            .map_err(|e| LauncherError::Other(format!("installer extraction task failed: {}", e)))??;
        debug!("Extracted {} installer entries into {:?}", entries, extracted);
        progress.report(90.0);

        let profile: InstallProfile = read_json(&extracted.join(INSTALL_PROFILE)).await?;
        let version_json: VersionDescriptor = read_json(&extracted.join(VERSION_JSON)).await?;
        info!(
            "{} installer lists {} libraries and {} processors",
            self.flavor.kind(),
            profile.libraries.len(),
            profile.processors.len()
        );

        Ok(InstallerJarMetadata {
            scratch,
            installer,
            extracted,
            profile,
            version_json,
        })
    }

    async fn download_loader_libraries(
        &self,
        run: &InstallRun<'_>,
        metadata: &mut InstallerJarMetadata,
        progress: &StageProgress,
    ) -> LauncherResult<()> {
        let libraries_dir = run.libraries_dir();
        let embedded = metadata
            .profile
            .libraries
            .iter()
            .chain(metadata.version_json.libraries.iter());
        let copied = copy_embedded_libraries(embedded, &metadata.extracted, &libraries_dir).await?;
        if copied > 0 {
            debug!("Copied {} embedded libraries from the installer", copied);
        }

        ensure_not_cancelled(run.cancel)?;
        let services = run.services;
        services
            .libraries
            .download_library_set(
                &metadata.profile.libraries,
                &libraries_dir,
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
        metadata: InstallerJarMetadata,
        progress: &StageProgress,
    ) -> LauncherResult<VersionDescriptor> {
        {
            let client: Vec<&Processor> = metadata
                .profile
                .processors
                .iter()
                .filter(|p| p.runs_on_client())
                .collect();

            match (&run.services.java_path, client.is_empty()) {
                (_, true) => {}
                (Some(java), false) => {
                    run_processors(run, java, &metadata, &client, progress).await?;
                }
                (None, false) => {
                    warn!(
                        "No Java configured, skipping {} {} processors",
                        client.len(),
                        self.flavor.kind()
                    );
                }
            }
        }

        let descriptor = build_descriptor(base, &metadata.version_json, &metadata.profile.libraries);
        drop(metadata);
        Ok(descriptor)
    }

    async fn available_versions(
        &self,
        base_version_id: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<Vec<String>> {
        let downloader = &self.services.downloader;
        let endpoints = &self.services.endpoints;
        let to_api = |e: LauncherError, url: &str| {
            if e.is_cancelled() {
                e
            } else {
                LauncherError::LoaderApi(format!("{} listing {} failed: {}", self.flavor.kind(), url, e))
            }
        };

        match self.flavor {
            InstallerFlavor::Forge => {
                let url = forge_metadata_url(&endpoints.forge_maven);
                let xml = downloader
                    .download_string(&url, cancel)
                    .await
                    .map_err(|e| to_api(e, &url))?;
                let metadata = MavenMetadata::parse(&xml)?;
                Ok(forge_versions(&metadata, base_version_id))
            }
            InstallerFlavor::NeoForge => {
                let url = neoforge_versions_url(&endpoints.neoforge_api);
                let list: NeoForgeVersionList = downloader
                    .download_json(&url, cancel)
                    .await
                    .map_err(|e| to_api(e, &url))?;
                Ok(neoforge_versions(&list.versions, base_version_id))
            }
        }
    }
}

/// Base descriptor + loader `version.json` + install-profile libraries, as one
/// descriptor that still names the base as its parent. The loader's
/// `mainClass` and `arguments` win when present.
fn build_descriptor(
    base: &VersionDescriptor,
    version_json: &VersionDescriptor,
    profile_libraries: &[Library],
) -> VersionDescriptor {
    let mut merged = merge_version_info(version_json, Some(base));
    merged.arguments = version_json.arguments.clone().or_else(|| base.arguments.clone());
    merged.libraries.extend(profile_libraries.iter().cloned());
    merged.inherits_from = Some(base.id.clone());
    merged
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> LauncherResult<T> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LauncherError::Other(format!(
                "installer has no {}",
                path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            )));
        }
        Err(e) => return Err(LauncherError::io(path, e)),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Unpack every entry of `archive` under `dest`, refusing paths that escape it.
fn extract_archive(archive: &Path, dest: &Path, cancel: &CancelFlag) -> LauncherResult<usize> {
    let file = std::fs::File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;
    std::fs::create_dir_all(dest).map_err(|e| LauncherError::io(dest, e))?;

    let mut count = 0;
    for i in 0..zip.len() {
        if cancel_requested(cancel) {
            return Err(LauncherError::Cancelled);
        }
        let mut entry = zip.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            warn!("Skipping unsafe installer entry {}", entry.name());
            continue;
        };
        let out = dest.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| LauncherError::io(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let mut writer = std::fs::File::create(&out).map_err(|e| LauncherError::io(&out, e))?;
        std::io::copy(&mut entry, &mut writer).map_err(|e| LauncherError::io(&out, e))?;
        count += 1;
    }
    Ok(count)
}

/// Libraries declared with an empty URL ship inside the installer under
/// `maven/<path>`; copy the ones not yet present.
async fn copy_embedded_libraries<'a>(
    libraries: impl Iterator<Item = &'a Library>,
    extracted: &Path,
    libraries_dir: &Path,
) -> LauncherResult<usize> {
    let mut copied = 0;
    for lib in libraries {
        let Some(artifact) = lib.main_artifact() else {
            continue;
        };
        if !artifact.url.is_empty() {
            continue;
        }
        let rel = match artifact.path.as_deref().filter(|p| !p.is_empty()) {
            Some(p) => PathBuf::from(p),
            None => lib.artifact()?.local_path(),
        };
        let target = libraries_dir.join(&rel);
        if target.is_file() {
            continue;
        }
        let source = extracted.join("maven").join(&rel);
        if !source.is_file() {
            debug!("Embedded library {} not present in installer", lib.name);
            continue;
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        tokio::fs::copy(&source, &target)
            .await
            .map_err(|e| LauncherError::io(&target, e))?;
        copied += 1;
    }
    Ok(copied)
}

// ── Processors ──────────────────────────────────────

async fn run_processors(
    run: &InstallRun<'_>,
    java: &Path,
    metadata: &InstallerJarMetadata,
    processors: &[&Processor],
    progress: &StageProgress,
) -> LauncherResult<()> {
    let libraries_dir = run.libraries_dir();
    let variables = processor_variables(run, metadata, &libraries_dir)?;

    for (idx, processor) in processors.iter().enumerate() {
        ensure_not_cancelled(run.cancel)?;

        let jar = MavenArtifact::parse(&processor.jar)?.path_under(&libraries_dir);
        if !jar.is_file() {
            return Err(LauncherError::LibraryNotFound {
                name: processor.jar.clone(),
                path: jar,
            });
        }

        let mut classpath = vec![jar.clone()];
        for coord in &processor.classpath {
            classpath.push(MavenArtifact::parse(coord)?.path_under(&libraries_dir));
        }
        let classpath = std::env::join_paths(&classpath)
            .map_err(|e| LauncherError::InvalidArgument(format!("processor classpath: {}", e)))?;

        let jar_for_manifest = jar.clone();
        let main_class = tokio::task::spawn_blocking(move || read_main_class_from_jar(&jar_for_manifest))
            .await
            .map_err(|e| LauncherError::Other(format!("manifest read task failed: {}", e)))??;

        let args = processor
            .args
            .iter()
            .map(|arg| resolve_processor_arg(arg, &variables, &libraries_dir))
            .collect::<LauncherResult<Vec<_>>>()?;

        info!("Running processor {} ({})", processor.jar, main_class);
        let output = tokio::process::Command::new(java)
            .arg("-cp")
            .arg(&classpath)
            .arg(&main_class)
            .args(&args)
            .current_dir(&libraries_dir)
            .output()
            .await
            .map_err(|e| LauncherError::io(java, e))?;

        if !output.status.success() {
            return Err(LauncherError::ProcessorExecution {
                processor: processor.jar.clone(),
                jar,
                exit_code: output.status.code(),
                output: format!(
                    "STDOUT:\n{}\nSTDERR:\n{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        progress.report((idx + 1) as f64 * 100.0 / processors.len() as f64);
    }
    Ok(())
}

/// `data` client values plus the installer's built-in variables.
fn processor_variables(
    run: &InstallRun<'_>,
    metadata: &InstallerJarMetadata,
    libraries_dir: &Path,
) -> LauncherResult<HashMap<String, String>> {
    let mut vars = HashMap::new();
    for (key, value) in &metadata.profile.data {
        if let Some(client) = value.client.as_deref() {
            vars.insert(
                key.clone(),
                resolve_data_value(client, &metadata.extracted, libraries_dir)?,
            );
        }
    }

    let display = |p: &Path| p.to_string_lossy().into_owned();
    vars.insert("SIDE".to_string(), "client".to_string());
    vars.insert("MINECRAFT_JAR".to_string(), display(&run.client_jar()));
    vars.insert("MINECRAFT_VERSION".to_string(), run.base_version_id.to_string());
    vars.insert("ROOT".to_string(), display(run.root));
    vars.insert("INSTALLER".to_string(), display(&metadata.installer));
    vars.insert("LIBRARY_DIR".to_string(), display(libraries_dir));
    Ok(vars)
}

/// `[coord]` is a library path, `'text'` a literal, `/path` an installer entry.
fn resolve_data_value(raw: &str, extracted: &Path, libraries_dir: &Path) -> LauncherResult<String> {
    if let Some(coord) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let path = MavenArtifact::parse(coord)?.path_under(libraries_dir);
        return Ok(path.to_string_lossy().into_owned());
    }
    if let Some(literal) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok(literal.to_string());
    }
    if let Some(entry) = raw.strip_prefix('/') {
        return Ok(extracted.join(entry).to_string_lossy().into_owned());
    }
    Ok(raw.to_string())
}

fn resolve_processor_arg(
    arg: &str,
    vars: &HashMap<String, String>,
    libraries_dir: &Path,
) -> LauncherResult<String> {
    if let Some(coord) = arg.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let path = MavenArtifact::parse(coord)?.path_under(libraries_dir);
        return Ok(path.to_string_lossy().into_owned());
    }

    let mut out = arg.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    Ok(out)
}

fn read_main_class_from_jar(path: &Path) -> LauncherResult<String> {
    let file = std::fs::File::open(path).map_err(|e| LauncherError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut manifest = archive.by_name("META-INF/MANIFEST.MF")?;

    let mut text = String::new();
    manifest
        .read_to_string(&mut text)
        .map_err(|e| LauncherError::io(path, e))?;

    main_class_from_manifest(&text).ok_or_else(|| {
        LauncherError::Other(format!("Main-Class missing in processor jar {}", path.display()))
    })
}

/// Read `Main-Class`, following manifest continuation lines.
fn main_class_from_manifest(text: &str) -> Option<String> {
    let mut main_class: Option<String> = None;
    let mut current_key: Option<String> = None;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(' ') {
            if current_key.as_deref() == Some("Main-Class") {
                if let Some(value) = &mut main_class {
                    value.push_str(rest.trim_end());
                }
            }
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            current_key = Some(key.trim().to_string());
            if key.trim() == "Main-Class" {
                main_class = Some(value.trim().to_string());
            }
        }
    }
    main_class.filter(|m| !m.is_empty())
}
