// ─── OptiFine ───
// OptiFine is not a launcher-side loader: its jar is overlaid onto the
// version's copy of the client jar, and the descriptor only gains a library
// entry naming the variant.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::cancel::{cancel_requested, CancelFlag};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;
use crate::core::progress::{ProgressFn, StageProgress};
use crate::core::version::{Library, LibraryArtifact, LibraryDownloads, VersionDescriptor};

use super::context::{InstallRun, InstallServices};
use super::kind::LoaderKind;
use super::pipeline::{run_install, InstallRequest, LoaderStrategy, StageSlices};
use super::scratch::ScratchDir;

/// One build in the mirror's `/optifine/<game>` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct OptifineBuild {
    #[serde(rename = "type")]
    pub build_type: String,
    pub patch: String,
    #[serde(default)]
    pub filename: Option<String>,
}

impl OptifineBuild {
    /// `<type>_<patch>`, e.g. `HD_U_I7`.
    pub fn version(&self) -> String {
        format!("{}_{}", self.build_type, self.patch)
    }
}

/// `optifine:OptiFine:<base>_<version>`
pub fn optifine_coordinate(base_version_id: &str, loader_version: &str) -> String {
    format!("optifine:OptiFine:{}_{}", base_version_id, loader_version)
}

pub struct OptifineMetadata {
    scratch: ScratchDir,
    loader_jar: PathBuf,
    library: Library,
}

pub struct PatchInstaller {
    services: Arc<InstallServices>,
}

impl PatchInstaller {
    pub fn new(services: Arc<InstallServices>) -> Self {
        Self { services }
    }

    pub async fn install(
        &self,
        request: &InstallRequest<'_>,
        progress: Option<ProgressFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<String> {
        run_install(self, &self.services, request, progress, cancel).await
    }

    fn mirror(&self) -> &str {
        self.services.endpoints.optifine_mirror.trim_end_matches('/')
    }

    async fn list_builds(
        &self,
        base_version_id: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<Vec<OptifineBuild>> {
        let url = format!("{}/optifine/{}", self.mirror(), base_version_id);
        self.services
            .downloader
            .download_json(&url, cancel)
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    e
                } else {
                    LauncherError::LoaderApi(format!("OptiFine listing {} failed: {}", url, e))
                }
            })
    }
}

/// Find `loader_version` in the listing. Unlisted versions fall back to a
/// split on the last `_`.
fn resolve_build(builds: &[OptifineBuild], loader_version: &str) -> Option<OptifineBuild> {
    if let Some(found) = builds.iter().find(|b| b.version() == loader_version) {
        return Some(found.clone());
    }
    let (build_type, patch) = loader_version.rsplit_once('_')?;
    if build_type.is_empty() || patch.is_empty() {
        return None;
    }
    Some(OptifineBuild {
        build_type: build_type.to_string(),
        patch: patch.to_string(),
        filename: None,
    })
}

#[async_trait]
impl LoaderStrategy for PatchInstaller {
    type Metadata = OptifineMetadata;

    fn kind(&self) -> LoaderKind {
        LoaderKind::Optifine
    }

    fn slices(&self) -> StageSlices {
        StageSlices::BINARY_PATCH
    }

    async fn fetch_metadata(
        &self,
        run: &InstallRun<'_>,
        _base: &VersionDescriptor,
        progress: &StageProgress,
    ) -> LauncherResult<OptifineMetadata> {
        let builds = self.list_builds(run.base_version_id, run.cancel).await?;
        let build = resolve_build(&builds, run.loader_version).ok_or_else(|| {
            LauncherError::VersionNotFound {
                version_id: format!("OptiFine {} for {}", run.loader_version, run.base_version_id),
                local_only: false,
            }
        })?;
        progress.report(20.0);

        let scratch = ScratchDir::create(run.scratch_path())?;
        let loader_jar = scratch.join("OptiFine.jar");
        let url = format!(
            "{}/optifine/{}/{}/{}",
            self.mirror(),
            run.base_version_id,
            build.build_type,
            build.patch
        );
        info!("Downloading OptiFine {}: {}", build.version(), url);
        let download_progress = StageProgress::new(20.0, 100.0, progress.as_callback());
        self.services
            .downloader
            .download_file(&url, &loader_jar, None, download_progress.as_callback(), run.cancel)
            .await
            .into_result()?;

        let coordinate = optifine_coordinate(run.base_version_id, run.loader_version);
        let rel_path = MavenArtifact::parse(&coordinate)?.repository_path();
        let library = Library {
            downloads: Some(LibraryDownloads {
                artifact: Some(LibraryArtifact {
                    path: Some(rel_path),
                    url: String::new(),
                    sha1: None,
                    size: None,
                }),
                classifiers: None,
            }),
            ..Library::new(coordinate)
        };

        Ok(OptifineMetadata {
            scratch,
            loader_jar,
            library,
        })
    }

    /// The only loader library is the downloaded jar itself.
    async fn download_loader_libraries(
        &self,
        run: &InstallRun<'_>,
        metadata: &mut OptifineMetadata,
        progress: &StageProgress,
    ) -> LauncherResult<()> {
        let target = run.services.libraries.artifact_path(&metadata.library, &run.libraries_dir())?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        tokio::fs::copy(&metadata.loader_jar, &target)
            .await
            .map_err(|e| LauncherError::io(&target, e))?;
        debug!("Installed OptiFine library at {:?}", target);
        progress.finish();
        Ok(())
    }

    async fn transform(
        &self,
        run: &InstallRun<'_>,
        base: &VersionDescriptor,
        metadata: OptifineMetadata,
        _progress: &StageProgress,
    ) -> LauncherResult<VersionDescriptor> {
        let client_jar = run.client_jar();
        let loader_jar = metadata.loader_jar.clone();
        let cancel = run.cancel.clone();
        let patched = client_jar.clone();
        let replaced = tokio::task::spawn_blocking(move || overlay_jar(&patched, &loader_jar, &cancel))
            .await
            .map_err(|e| LauncherError::Other(format!("jar overlay task failed: {}", e)))??;
        info!("Overlaid {} OptiFine entries onto {:?}", replaced, client_jar);

        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let descriptor = VersionDescriptor {
            id: run.version_id.to_string(),
            version_type: base.version_type.clone(),
            inherits_from: Some(run.base_version_id.to_string()),
            libraries: vec![metadata.library.clone()],
            release_time: Some(now.clone()),
            time: Some(now),
            ..VersionDescriptor::default()
        };
        drop(metadata.scratch);
        Ok(descriptor)
    }

    async fn available_versions(
        &self,
        base_version_id: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<Vec<String>> {
        let builds = self.list_builds(base_version_id, cancel).await?;
        Ok(builds.iter().map(OptifineBuild::version).collect())
    }
}

/// Rewrite `client_jar` so every non-`META-INF/` entry of `loader_jar`
/// replaces or joins the client's entries. Returns the number of loader
/// entries written.
fn overlay_jar(client_jar: &Path, loader_jar: &Path, cancel: &CancelFlag) -> LauncherResult<usize> {
    let loader_file = std::fs::File::open(loader_jar).map_err(|e| LauncherError::io(loader_jar, e))?;
    let mut loader = zip::ZipArchive::new(loader_file)?;
    let base_file = std::fs::File::open(client_jar).map_err(|e| LauncherError::io(client_jar, e))?;
    let mut base = zip::ZipArchive::new(base_file)?;

    let tmp = client_jar.with_extension("jar.tmp");
    let out = std::fs::File::create(&tmp).map_err(|e| LauncherError::io(&tmp, e))?;
    let mut writer = zip::ZipWriter::new(out);
    let mut written: HashSet<String> = HashSet::new();

    let result = (|| -> LauncherResult<usize> {
        let mut overlaid = 0;
        for i in 0..loader.len() {
            if cancel_requested(cancel) {
                return Err(LauncherError::Cancelled);
            }
            let entry = loader.by_index_raw(i)?;
            let name = entry.name().to_string();
            if is_meta_inf(&name) || !written.insert(name) {
                continue;
            }
            writer.raw_copy_file(entry)?;
            overlaid += 1;
        }

        for i in 0..base.len() {
            if cancel_requested(cancel) {
                return Err(LauncherError::Cancelled);
            }
            let entry = base.by_index_raw(i)?;
            let name = entry.name().to_string();
            // The patched jar no longer matches the vanilla signature.
            if is_signature_file(&name) || !written.insert(name) {
                continue;
            }
            writer.raw_copy_file(entry)?;
        }
        writer.finish()?;
        Ok(overlaid)
    })();

    match result {
        Ok(overlaid) => {
            std::fs::rename(&tmp, client_jar).map_err(|e| LauncherError::io(client_jar, e))?;
            Ok(overlaid)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn is_meta_inf(name: &str) -> bool {
    name.get(..9).is_some_and(|prefix| prefix.eq_ignore_ascii_case("META-INF/"))
}

fn is_signature_file(name: &str) -> bool {
    if !is_meta_inf(name) {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    [".SF", ".RSA", ".DSA", ".EC"].iter().any(|ext| upper.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use zip::write::SimpleFileOptions;

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_entry(path: &Path, name: &str) -> Option<Vec<u8>> {
        let mut zip = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut entry = zip.by_name(name).ok()?;
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).unwrap();
        Some(buf)
    }

    #[test]
    fn overlay_replaces_adds_and_skips_loader_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let client = dir.path().join("client.jar");
        let loader = dir.path().join("OptiFine.jar");
        write_jar(
            &client,
            &[
                ("net/minecraft/A.class", b"vanilla-a"),
                ("net/minecraft/B.class", b"vanilla-b"),
                ("META-INF/MANIFEST.MF", b"vanilla-manifest"),
            ],
        );
        write_jar(
            &loader,
            &[
                ("net/minecraft/A.class", b"patched-a"),
                ("net/optifine/Config.class", b"config"),
                ("META-INF/MANIFEST.MF", b"optifine-manifest"),
            ],
        );

        let overlaid = overlay_jar(&client, &loader, &crate::core::cancel::new_cancel_flag()).unwrap();
        assert_eq!(overlaid, 2);
        assert_eq!(read_entry(&client, "net/minecraft/A.class").unwrap(), b"patched-a");
        assert_eq!(read_entry(&client, "net/minecraft/B.class").unwrap(), b"vanilla-b");
        assert_eq!(read_entry(&client, "net/optifine/Config.class").unwrap(), b"config");
        assert_eq!(read_entry(&client, "META-INF/MANIFEST.MF").unwrap(), b"vanilla-manifest");
        assert!(!dir.path().join("client.jar.tmp").exists());
    }

    #[test]
    fn overlay_ignores_meta_inf_case_and_drops_vanilla_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let client = dir.path().join("client.jar");
        let loader = dir.path().join("OptiFine.jar");
        write_jar(
            &client,
            &[
                ("net/minecraft/A.class", b"vanilla-a"),
                ("META-INF/MANIFEST.MF", b"vanilla-manifest"),
                ("META-INF/MOJANGCS.SF", b"sig"),
                ("META-INF/MOJANGCS.RSA", b"cert"),
            ],
        );
        write_jar(
            &loader,
            &[
                ("net/minecraft/A.class", b"patched-a"),
                ("meta-inf/optifine.sf", b"loader-sig"),
                ("Meta-Inf/MANIFEST.MF", b"optifine-manifest"),
            ],
        );

        let overlaid = overlay_jar(&client, &loader, &crate::core::cancel::new_cancel_flag()).unwrap();
        assert_eq!(overlaid, 1);
        assert_eq!(read_entry(&client, "META-INF/MANIFEST.MF").unwrap(), b"vanilla-manifest");
        assert!(read_entry(&client, "Meta-Inf/MANIFEST.MF").is_none());
        assert!(read_entry(&client, "meta-inf/optifine.sf").is_none());
        assert!(read_entry(&client, "META-INF/MOJANGCS.SF").is_none());
        assert!(read_entry(&client, "META-INF/MOJANGCS.RSA").is_none());
    }

    #[test]
    fn signature_detection_is_case_insensitive() {
        assert!(is_signature_file("META-INF/MOJANGCS.SF"));
        assert!(is_signature_file("meta-inf/cert.rsa"));
        assert!(!is_signature_file("META-INF/MANIFEST.MF"));
        assert!(!is_signature_file("net/minecraft/Foo.SF"));
    }

    #[test]
    fn build_resolution_prefers_listing() {
        let builds: Vec<OptifineBuild> = serde_json::from_value(serde_json::json!([
            { "type": "HD_U", "patch": "I7", "filename": "OptiFine_1.20.4_HD_U_I7.jar" },
            { "type": "HD_U", "patch": "pre_I8" }
        ]))
        .unwrap();

        let listed = resolve_build(&builds, "HD_U_pre_I8").unwrap();
        assert_eq!(listed.build_type, "HD_U");
        assert_eq!(listed.patch, "pre_I8");

        let unlisted = resolve_build(&builds, "HD_U_J1").unwrap();
        assert_eq!((unlisted.build_type.as_str(), unlisted.patch.as_str()), ("HD_U", "J1"));
        assert!(resolve_build(&builds, "nounderscore").is_none());
    }

    #[test]
    fn coordinate_maps_to_library_path() {
        let coord = optifine_coordinate("1.20.4", "HD_U_I7");
        assert_eq!(coord, "optifine:OptiFine:1.20.4_HD_U_I7");
        let path = MavenArtifact::parse(&coord).unwrap().repository_path();
        assert_eq!(path, "optifine/OptiFine/1.20.4_HD_U_I7/OptiFine-1.20.4_HD_U_I7.jar");
    }
}
