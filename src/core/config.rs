use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven;

const APP_DIR_NAME: &str = "InterfaceOficial";
pub const SETTINGS_FILE: &str = "launcher_settings.json";

/// Persisted launcher configuration (`launcher_settings.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Game root: holds `versions/`, `libraries/` and `assets/`.
    pub data_dir: PathBuf,
    /// Scratch space for installer archives. Emptied after each install.
    pub cache_dir: PathBuf,
    /// Java used for installer processors. Processors are skipped when unset.
    pub java_path: Option<PathBuf>,
    pub download: DownloadSettings,
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

/// Remote services. Every URL the core talks to comes from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub version_manifest: String,
    pub resources: String,
    pub libraries: String,
    pub fabric_meta: String,
    pub fabric_maven: String,
    pub quilt_meta: String,
    pub quilt_maven: String,
    pub forge_maven: String,
    pub neoforge_maven: String,
    pub neoforge_api: String,
    pub optifine_mirror: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_retries: 3,
            retry_base_delay_ms: 500,
            request_timeout_secs: 60,
            connect_timeout_secs: 15,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json"
                .to_string(),
            resources: "https://resources.download.minecraft.net".to_string(),
            libraries: maven::MOJANG_LIBRARIES.to_string(),
            fabric_meta: "https://meta.fabricmc.net/v2".to_string(),
            fabric_maven: maven::FABRIC_MAVEN.to_string(),
            quilt_meta: "https://meta.quiltmc.org/v3".to_string(),
            quilt_maven: maven::QUILT_MAVEN.to_string(),
            forge_maven: maven::FORGE_MAVEN.to_string(),
            neoforge_maven: maven::NEOFORGE_MAVEN.to_string(),
            neoforge_api: "https://maven.neoforged.net/api/maven/versions/releases".to_string(),
            optifine_mirror: "https://bmclapi2.bangbang93.com".to_string(),
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self::for_data_dir(default_data_dir())
    }
}

impl LauncherConfig {
    pub fn for_data_dir(data_dir: PathBuf) -> Self {
        Self {
            cache_dir: data_dir.join("cache"),
            data_dir,
            java_path: None,
            download: DownloadSettings::default(),
            endpoints: Endpoints::default(),
        }
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    /// Load settings from an explicit file.
    pub fn load(path: &Path) -> LauncherResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| LauncherError::io(path, e))?;
        let config: LauncherConfig = serde_json::from_str(&raw)?;
        debug!("Loaded launcher settings from {:?}", path);
        Ok(config)
    }

    /// Load `launcher_settings.json` from `data_dir`, falling back to defaults
    /// rooted at that directory when the file is missing or unreadable.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Self::for_data_dir(data_dir.to_path_buf());
        }

        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unreadable settings at {:?}: {}", path, e);
                Self::for_data_dir(data_dir.to_path_buf())
            }
        }
    }

    pub fn save(&self) -> LauncherResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| LauncherError::io(&self.data_dir, e))?;
        let path = self.data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| LauncherError::io(&path, e))
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_data_dir() -> PathBuf {
    default_base_dir().join(APP_DIR_NAME)
}
