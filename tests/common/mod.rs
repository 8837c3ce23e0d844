#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use httpmock::prelude::*;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use zip::write::SimpleFileOptions;

use interface_core::core::config::{DownloadSettings, LauncherConfig};
use interface_core::core::loaders::{InstallServices, ModLoaderInstallerFactory};
use interface_core::core::progress::ProgressFn;
use interface_core::core::version;

pub const CLIENT_JAR: &[u8] = b"vanilla client jar bytes";

pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// In-memory zip archive.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// Forge-style installer: `install_profile.json`, `version.json` and any
/// embedded `maven/` entries.
pub fn installer_jar(install_profile: &Value, version_json: &Value, embedded: &[(&str, &[u8])]) -> Vec<u8> {
    let profile = install_profile.to_string();
    let version = version_json.to_string();
    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("install_profile.json".to_string(), profile.into_bytes()),
        ("version.json".to_string(), version.into_bytes()),
    ];
    for (path, data) in embedded {
        entries.push((format!("maven/{}", path), data.to_vec()));
    }
    let borrowed: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, data)| (name.as_str(), data.as_slice()))
        .collect();
    zip_bytes(&borrowed)
}

pub fn read_zip_entry(path: &std::path::Path, name: &str) -> Option<Vec<u8>> {
    use std::io::Read;
    let mut zip = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut entry = zip.by_name(name).ok()?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).unwrap();
    Some(buf)
}

pub fn library_names(descriptor: &Value) -> Vec<String> {
    descriptor["libraries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["name"].as_str().unwrap().to_string())
        .collect()
}

pub fn recording_progress() -> (ProgressFn, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |p| sink.lock().unwrap().push(p));
    (progress, seen)
}

/// A game directory plus a mock server that serves the 1.20.4 manifest,
/// descriptor and client jar. Downloads run one at a time without retries.
pub struct Fixture {
    pub server: MockServer,
    _dir: tempfile::TempDir,
    pub root: PathBuf,
    pub cache: PathBuf,
    pub config: LauncherConfig,
    pub factory: ModLoaderInstallerFactory,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_client_jar(CLIENT_JAR.to_vec()).await
    }

    pub async fn with_client_jar(client_jar: Vec<u8>) -> Self {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        let cache = dir.path().join("cache");

        let mut config = LauncherConfig::for_data_dir(root.clone());
        config.cache_dir = cache.clone();
        config.download = DownloadSettings {
            max_concurrency: 1,
            max_retries: 0,
            retry_base_delay_ms: 5,
            ..DownloadSettings::default()
        };
        let endpoints = &mut config.endpoints;
        endpoints.version_manifest = server.url("/mc/version_manifest_v2.json");
        endpoints.resources = server.url("/resources");
        endpoints.libraries = server.url("/libraries");
        endpoints.fabric_meta = server.url("/fabric-meta/v2");
        endpoints.fabric_maven = server.url("/fabric-maven");
        endpoints.quilt_meta = server.url("/quilt-meta/v3");
        endpoints.quilt_maven = server.url("/quilt-maven");
        endpoints.forge_maven = server.url("/forge-maven");
        endpoints.neoforge_maven = server.url("/neoforge-maven");
        endpoints.neoforge_api = server.url("/neoforge-api");
        endpoints.optifine_mirror = server.url("/bmclapi");

        let services = Arc::new(InstallServices::from_config(&config).unwrap());
        let fixture = Self {
            server,
            _dir: dir,
            root,
            cache,
            config,
            factory: ModLoaderInstallerFactory::new(services),
        };
        fixture.mount_base_version(client_jar).await;
        fixture
    }

    pub fn base_descriptor(&self, client_jar: &[u8]) -> Value {
        json!({
            "id": "1.20.4",
            "type": "release",
            "mainClass": "net.minecraft.client.main.Main",
            "arguments": { "game": ["--username", "${auth_player_name}"], "jvm": ["-Xss1M"] },
            "assetIndex": { "id": "12", "url": self.server.url("/indexes/12.json") },
            "downloads": { "client": {
                "url": self.server.url("/objects/client.jar"),
                "sha1": sha1_hex(client_jar),
                "size": client_jar.len()
            }},
            "libraries": [{
                "name": "com.mojang:brigadier:1.2.9",
                "downloads": { "artifact": {
                    "path": "com/mojang/brigadier/1.2.9/brigadier-1.2.9.jar",
                    "url": self.server.url("/libraries/com/mojang/brigadier/1.2.9/brigadier-1.2.9.jar")
                }}
            }]
        })
    }

    async fn mount_base_version(&self, client_jar: Vec<u8>) {
        let manifest = json!({
            "latest": { "release": "1.20.4", "snapshot": "1.20.4" },
            "versions": [{
                "id": "1.20.4",
                "type": "release",
                "url": self.server.url("/v1/packages/1.20.4.json"),
                "releaseTime": "2023-12-07T12:56:20+00:00"
            }]
        });
        let descriptor = self.base_descriptor(&client_jar);

        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/mc/version_manifest_v2.json");
                then.status(200).json_body(manifest);
            })
            .await;
        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/packages/1.20.4.json");
                then.status(200).json_body(descriptor);
            })
            .await;
        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/objects/client.jar");
                then.status(200).body(client_jar);
            })
            .await;
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn read_descriptor(&self, id: &str) -> Value {
        let raw = std::fs::read_to_string(version::descriptor_path(&self.root, id)).unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}
