// ─── Library Resolver ───
// Platform filtering, maven paths, library download tasks and natives extraction.
// Holds no state beyond the platform and the default repository.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::cancel::{ensure_not_cancelled, CancelFlag};
use crate::core::downloader::{DownloadTask, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;
use crate::core::progress::{ItemFn, ProgressFn};
use crate::core::version::{Library, LibraryArtifact, Platform, VersionDescriptor};

const NATIVE_EXTENSIONS: [&str; 4] = [".so", ".dll", ".dylib", ".jnilib"];

#[derive(Debug, Clone)]
pub struct LibraryResolver {
    platform: Platform,
    default_repository: String,
}

/// Deterministic maven path of `coordinate` under `root`, optionally with a
/// classifier replacing the coordinate's own. No I/O.
pub fn library_path(
    coordinate: &str,
    root: &Path,
    classifier: Option<&str>,
) -> LauncherResult<PathBuf> {
    let mut artifact = MavenArtifact::parse(coordinate)?;
    if let Some(c) = classifier {
        artifact = artifact.with_classifier(Some(c));
    }
    Ok(artifact.path_under(root))
}

impl LibraryResolver {
    pub fn new(platform: Platform, default_repository: impl Into<String>) -> Self {
        Self {
            platform,
            default_repository: default_repository.into(),
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn get_library_path(
        &self,
        coordinate: &str,
        root: &Path,
        classifier: Option<&str>,
    ) -> LauncherResult<PathBuf> {
        library_path(coordinate, root, classifier)
    }

    pub fn is_applicable(&self, library: &Library) -> bool {
        library.is_allowed(&self.platform)
    }

    /// Local path of the library's main artifact. A declared
    /// `downloads.artifact.path` wins over the coordinate layout.
    pub fn artifact_path(&self, library: &Library, root: &Path) -> LauncherResult<PathBuf> {
        if let Some(path) = library.main_artifact().and_then(|a| a.path.as_deref()) {
            return Ok(root.join(path));
        }
        library_path(&library.name, root, None)
    }

    pub fn is_library_downloaded(&self, library: &Library, root: &Path) -> bool {
        self.required_files(library, root)
            .map(|files| files.iter().all(|f| f.path.is_file()))
            .unwrap_or(false)
    }

    /// Applicable libraries with at least one required file absent.
    pub fn get_missing_libraries(
        &self,
        descriptor: &VersionDescriptor,
        root: &Path,
    ) -> LauncherResult<Vec<Library>> {
        self.missing_among(&descriptor.libraries, root)
    }

    fn missing_among(&self, libraries: &[Library], root: &Path) -> LauncherResult<Vec<Library>> {
        let mut missing = Vec::new();
        for lib in libraries {
            if !self.is_applicable(lib) {
                continue;
            }
            let files = self.required_files(lib, root)?;
            if files.iter().any(|f| !f.path.is_file()) {
                missing.push(lib.clone());
            }
        }
        Ok(missing)
    }

    /// Download every missing applicable library of `descriptor`.
    #[allow(clippy::too_many_arguments)]
    pub async fn download_libraries(
        &self,
        descriptor: &VersionDescriptor,
        root: &Path,
        downloader: &Downloader,
        max_concurrency: usize,
        progress: Option<ProgressFn>,
        current_item: Option<ItemFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<()> {
        self.download_library_set(
            &descriptor.libraries,
            root,
            downloader,
            max_concurrency,
            progress,
            current_item,
            cancel,
        )
        .await
    }

    /// Same as [`download_libraries`](Self::download_libraries) over an
    /// arbitrary library list. Tasks sharing a target path collapse to the
    /// last one declared.
    #[allow(clippy::too_many_arguments)]
    pub async fn download_library_set(
        &self,
        libraries: &[Library],
        root: &Path,
        downloader: &Downloader,
        max_concurrency: usize,
        progress: Option<ProgressFn>,
        current_item: Option<ItemFn>,
        cancel: &CancelFlag,
    ) -> LauncherResult<()> {
        ensure_not_cancelled(cancel)?;

        let tasks = self.download_tasks(libraries, root)?;
        if tasks.is_empty() {
            debug!("All {} libraries already present", libraries.len());
            if let Some(cb) = progress.as_ref() {
                cb(100.0);
            }
            return Ok(());
        }

        info!("Downloading {} library files", tasks.len());
        let results = downloader
            .download_files_reporting(&tasks, max_concurrency, progress, current_item, cancel)
            .await;

        ensure_not_cancelled(cancel)?;
        if let Some(err) = results.into_iter().find_map(|r| r.error) {
            return Err(err);
        }

        // Anything still absent means the metadata pointed at nothing.
        for lib in self.missing_among(libraries, root)? {
            for file in self.required_files(&lib, root)? {
                if !file.path.is_file() && !file.url.is_empty() {
                    return Err(LauncherError::LibraryNotFound {
                        name: lib.name.clone(),
                        path: file.path,
                    });
                }
            }
        }
        Ok(())
    }

    /// Download tasks for the absent files of applicable libraries.
    pub fn download_tasks(
        &self,
        libraries: &[Library],
        root: &Path,
    ) -> LauncherResult<Vec<DownloadTask>> {
        let mut by_target: BTreeMap<PathBuf, DownloadTask> = BTreeMap::new();
        for lib in libraries {
            if !self.is_applicable(lib) {
                continue;
            }
            for file in self.required_files(lib, root)? {
                if file.path.is_file() {
                    continue;
                }
                if file.url.is_empty() {
                    debug!("Library {} ships without a URL, not downloading", lib.name);
                    continue;
                }
                let task = DownloadTask::new(file.url, file.path.clone())
                    .with_sha1(file.sha1)
                    .with_size(file.size)
                    .with_description(lib.name.clone());
                by_target.insert(file.path, task);
            }
        }
        Ok(by_target.into_values().collect())
    }

    /// Files a library needs on this platform: the main artifact (unless the
    /// library is legacy natives-only) plus its native classifier archive.
    fn required_files(&self, library: &Library, root: &Path) -> LauncherResult<Vec<LibraryFile>> {
        let mut files = Vec::new();
        let native = library.native_classifier(&self.platform);

        match library.main_artifact() {
            Some(artifact) => files.push(self.declared_file(library, artifact, root, None)?),
            None if library.natives.is_none() => {
                files.push(self.repository_file(library, root, None)?);
            }
            None => {}
        }

        if let Some(classifier) = native {
            let declared = library
                .downloads
                .as_ref()
                .and_then(|d| d.classifiers.as_ref())
                .and_then(|c| c.get(&classifier));
            let file = match declared {
                Some(artifact) => self.declared_file(library, artifact, root, Some(&classifier))?,
                None => self.repository_file(library, root, Some(&classifier))?,
            };
            files.push(file);
        }
        Ok(files)
    }

    fn declared_file(
        &self,
        library: &Library,
        artifact: &LibraryArtifact,
        root: &Path,
        classifier: Option<&str>,
    ) -> LauncherResult<LibraryFile> {
        let path = match artifact.path.as_deref() {
            Some(p) if !p.is_empty() => root.join(p),
            _ => library_path(&library.name, root, classifier)?,
        };
        Ok(LibraryFile {
            path,
            url: artifact.url.clone(),
            sha1: artifact.sha1.clone(),
            size: artifact.size,
        })
    }

    /// Coordinate-only library: URL from its `url` base or the default repository.
    fn repository_file(
        &self,
        library: &Library,
        root: &Path,
        classifier: Option<&str>,
    ) -> LauncherResult<LibraryFile> {
        let mut artifact = library.artifact()?;
        if classifier.is_some() {
            artifact = artifact.with_classifier(classifier);
        }
        let base = library
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.default_repository);
        Ok(LibraryFile {
            path: artifact.path_under(root),
            url: artifact.url(base),
            sha1: if classifier.is_none() { library.sha1.clone() } else { None },
            size: if classifier.is_none() { library.size } else { None },
        })
    }

    /// Classpath entries for the applicable libraries, in declaration order,
    /// with later duplicates of the same path dropped.
    pub fn classpath(
        &self,
        descriptor: &VersionDescriptor,
        root: &Path,
    ) -> LauncherResult<Vec<PathBuf>> {
        let mut seen = std::collections::HashSet::new();
        let mut entries = Vec::new();
        for lib in &descriptor.libraries {
            if !self.is_applicable(lib) || lib.natives.is_some() {
                continue;
            }
            let path = self.artifact_path(lib, root)?;
            if seen.insert(path.clone()) {
                entries.push(path);
            }
        }
        Ok(entries)
    }

    // ── Natives ─────────────────────────────────────────

    /// Unpack platform natives into a flat `natives_dir`. Re-running
    /// overwrites identically.
    pub async fn extract_native_libraries(
        &self,
        descriptor: &VersionDescriptor,
        root: &Path,
        natives_dir: &Path,
        cancel: &CancelFlag,
    ) -> LauncherResult<usize> {
        tokio::fs::create_dir_all(natives_dir)
            .await
            .map_err(|e| LauncherError::io(natives_dir, e))?;

        let mut extracted = 0;
        for lib in &descriptor.libraries {
            ensure_not_cancelled(cancel)?;
            if !self.is_applicable(lib) {
                continue;
            }

            let archive = if let Some(classifier) = lib.native_classifier(&self.platform) {
                let declared = lib
                    .downloads
                    .as_ref()
                    .and_then(|d| d.classifiers.as_ref())
                    .and_then(|c| c.get(&classifier));
                match declared {
                    Some(artifact) => self.declared_file(lib, artifact, root, Some(&classifier))?.path,
                    None => library_path(&lib.name, root, Some(&classifier))?,
                }
            } else if lib.is_native_classified() {
                self.artifact_path(lib, root)?
            } else {
                continue;
            };

            if !archive.is_file() {
                warn!("Native archive for {} missing at {:?}", lib.name, archive);
                continue;
            }

            let excludes = lib
                .extract
                .as_ref()
                .map(|e| e.exclude.clone())
                .unwrap_or_default();
            let target = natives_dir.to_path_buf();
            let count = tokio::task::spawn_blocking(move || {
                extract_native_archive(&archive, &target, &excludes)
            })
            .await
            .map_err(|e| LauncherError::Other(format!("natives extraction task failed: {}", e)))??;
            extracted += count;
        }

        info!("Extracted {} native files into {:?}", extracted, natives_dir);
        Ok(extracted)
    }
}

struct LibraryFile {
    path: PathBuf,
    url: String,
    sha1: Option<String>,
    size: Option<u64>,
}

fn is_native_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    NATIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Copy native binaries out of one archive, flattened to their file names.
fn extract_native_archive(
    archive: &Path,
    natives_dir: &Path,
    excludes: &[String],
) -> LauncherResult<usize> {
    let file = std::fs::File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;

    let mut count = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.starts_with("META-INF/") || excludes.iter().any(|ex| name.starts_with(ex.as_str())) {
            continue;
        }
        if !is_native_entry(&name) {
            continue;
        }
        let Some(file_name) = Path::new(&name).file_name() else {
            continue;
        };

        let out_path = natives_dir.join(file_name);
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| LauncherError::io(&out_path, e))?;
        std::fs::write(&out_path, &buf).map_err(|e| LauncherError::io(&out_path, e))?;
        count += 1;
    }
    Ok(count)
}
