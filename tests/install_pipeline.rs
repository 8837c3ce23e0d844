mod common;

use std::path::Path;
use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::{json, Value};

use common::{installer_jar, library_names, recording_progress, sha1_hex, Fixture, CLIENT_JAR};
use interface_core::core::cancel::{new_cancel_flag, request_cancel};
use interface_core::core::progress::ProgressFn;
use interface_core::core::version;
use interface_core::LauncherError;

// ── Fabric ──────────────────────────────────────────

#[tokio::test]
async fn fabric_install_writes_inheriting_descriptor() {
    let fx = Fixture::new().await;
    let maven = fx.server.url("/fabric-maven");
    let profile = json!({
        "id": "fabric-loader-0.15.0-1.20.4",
        "inheritsFrom": "1.20.4",
        "type": "release",
        "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
        "arguments": { "game": [], "jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "] },
        "libraries": [
            { "name": "net.fabricmc:intermediary:1.20.4", "url": maven },
            { "name": "org.ow2.asm:asm:9.6", "url": maven },
            { "name": "net.fabricmc:fabric-loader:0.15.0", "url": maven }
        ]
    });
    fx.server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/fabric-meta/v2/versions/loader/1.20.4/0.15.0/profile/json");
            then.status(200).json_body(profile);
        })
        .await;
    let library_mock = fx
        .server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/fabric-maven/");
            then.status(200).body("library-jar");
        })
        .await;

    let installer = fx.factory.create("fabric").unwrap();
    let (progress, seen) = recording_progress();
    let id = installer
        .install("1.20.4", "0.15.0", &fx.root, Some(progress), &new_cancel_flag(), None)
        .await
        .unwrap();

    assert_eq!(id, "fabric-1.20.4-0.15.0");
    assert!(installer.is_installed("1.20.4", "0.15.0", &fx.root));

    let jar = version::client_jar_path(&fx.root, &id);
    assert_eq!(std::fs::read(jar).unwrap(), CLIENT_JAR);

    assert_eq!(library_mock.hits_async().await, 3);
    for rel in [
        "net/fabricmc/intermediary/1.20.4/intermediary-1.20.4.jar",
        "org/ow2/asm/asm/9.6/asm-9.6.jar",
        "net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar",
    ] {
        assert!(fx.libraries_dir().join(rel).is_file(), "{} missing", rel);
    }

    let descriptor = fx.read_descriptor(&id);
    assert_eq!(descriptor["id"], "fabric-1.20.4-0.15.0");
    assert_eq!(descriptor["inheritsFrom"], "1.20.4");
    assert_eq!(
        descriptor["mainClass"],
        "net.fabricmc.loader.impl.launch.knot.KnotClient"
    );
    assert_eq!(library_names(&descriptor).len(), 3);

    let config: Value = serde_json::from_str(
        &std::fs::read_to_string(version::version_dir(&fx.root, &id).join("version.config")).unwrap(),
    )
    .unwrap();
    assert_eq!(config["loaderType"], "Fabric");
    assert_eq!(config["baseVersionId"], "1.20.4");

    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
    assert_eq!(seen.last().copied(), Some(100.0));
}

#[tokio::test]
async fn fabric_install_twice_fails_at_init() {
    let fx = Fixture::new().await;
    let id = "fabric-1.20.4-0.15.0";
    let path = version::descriptor_path(&fx.root, id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{"id":"fabric-1.20.4-0.15.0"}"#).unwrap();

    let err = fx
        .factory
        .create("Fabric")
        .unwrap()
        .install("1.20.4", "0.15.0", &fx.root, None, &new_cancel_flag(), None)
        .await
        .unwrap_err();

    match err {
        LauncherError::ModLoaderInstall { stage, source, .. } => {
            assert_eq!(stage, "Init");
            assert!(matches!(*source, LauncherError::AlreadyInstalled(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_loader_profile_is_tagged_with_its_stage() {
    let fx = Fixture::new().await;
    fx.server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/fabric-meta/");
            then.status(404);
        })
        .await;

    let err = fx
        .factory
        .create("fabric")
        .unwrap()
        .install("1.20.4", "9.9.9", &fx.root, None, &new_cancel_flag(), Some("My Pack"))
        .await
        .unwrap_err();

    match err {
        LauncherError::ModLoaderInstall {
            loader_type,
            loader_version,
            base_version,
            stage,
            source,
        } => {
            assert_eq!(loader_type, "Fabric");
            assert_eq!(loader_version, "9.9.9");
            assert_eq!(base_version, "1.20.4");
            assert_eq!(stage, "FetchLoaderMetadata");
            assert!(matches!(*source, LauncherError::LoaderApi(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!version::is_installed(&fx.root, "My Pack"));
    assert!(!version::version_dir(&fx.root, "My Pack").join("version.config").exists());
}

#[tokio::test]
async fn fabric_versions_listing() {
    let fx = Fixture::new().await;
    fx.server
        .mock_async(|when, then| {
            when.method(GET).path("/fabric-meta/v2/versions/loader/1.20.4");
            then.status(200).json_body(json!([
                { "loader": { "version": "0.15.3", "stable": true } },
                { "loader": { "version": "0.15.0", "stable": true } }
            ]));
        })
        .await;

    let versions = fx
        .factory
        .create("fabric")
        .unwrap()
        .available_versions("1.20.4", &new_cancel_flag())
        .await
        .unwrap();
    assert_eq!(versions, vec!["0.15.3", "0.15.0"]);
}

#[tokio::test]
async fn custom_name_cannot_escape_versions_dir() {
    let fx = Fixture::new().await;

    let err = fx
        .factory
        .create("fabric")
        .unwrap()
        .install("1.20.4", "0.15.0", &fx.root, None, &new_cancel_flag(), Some("../escape"))
        .await
        .unwrap_err();

    match err {
        LauncherError::ModLoaderInstall { stage, source, .. } => {
            assert_eq!(stage, "Init");
            assert!(matches!(*source, LauncherError::InvalidArgument(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.root.join("escape").exists());
}

// ── NeoForge ────────────────────────────────────────

struct ProfileLib {
    name: &'static str,
    path: &'static str,
    body: &'static [u8],
}

const PROFILE_LIBS: [ProfileLib; 3] = [
    ProfileLib {
        name: "net.neoforged.installertools:installertools:2.1.2",
        path: "net/neoforged/installertools/installertools/2.1.2/installertools-2.1.2.jar",
        body: b"installertools",
    },
    ProfileLib {
        name: "net.neoforged:AutoRenamingTool:1.0.11",
        path: "net/neoforged/AutoRenamingTool/1.0.11/AutoRenamingTool-1.0.11.jar",
        body: b"art",
    },
    ProfileLib {
        name: "net.neoforged.installertools:binarypatcher:2.1.2",
        path: "net/neoforged/installertools/binarypatcher/2.1.2/binarypatcher-2.1.2.jar",
        body: b"binarypatcher",
    },
];

const UNIVERSAL_PATH: &str = "net/neoforged/neoforge/20.4.80/neoforge-20.4.80-universal.jar";

fn neoforge_installer(server: &MockServer) -> Vec<u8> {
    let libraries: Vec<Value> = PROFILE_LIBS
        .iter()
        .map(|lib| {
            json!({
                "name": lib.name,
                "downloads": { "artifact": {
                    "path": lib.path,
                    "url": server.url(format!("/neoforge-maven/{}", lib.path)),
                    "sha1": sha1_hex(lib.body),
                    "size": lib.body.len()
                }}
            })
        })
        .collect();
    let install_profile = json!({
        "profile": "NeoForge",
        "version": "neoforge-20.4.80",
        "minecraft": "1.20.4",
        "json": "/version.json",
        "data": {
            "MOJMAPS": { "client": "[net.minecraft:client:1.20.4:mappings@txt]", "server": "[net.minecraft:server:1.20.4:mappings@txt]" }
        },
        "processors": [{
            "sides": ["client"],
            "jar": "net.neoforged.installertools:installertools:2.1.2",
            "classpath": [],
            "args": ["--task", "DOWNLOAD_MOJMAPS", "--output", "{MOJMAPS}"]
        }],
        "libraries": libraries
    });
    let version_json = json!({
        "id": "neoforge-20.4.80",
        "inheritsFrom": "1.20.4",
        "type": "release",
        "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
        "arguments": { "game": ["--launchTarget", "forgeclient"], "jvm": ["-DlibraryDirectory=${library_directory}"] },
        "libraries": [
            {
                "name": "net.neoforged:bus:7.0.0",
                "downloads": { "artifact": {
                    "path": "net/neoforged/bus/7.0.0/bus-7.0.0.jar",
                    "url": server.url("/neoforge-maven/net/neoforged/bus/7.0.0/bus-7.0.0.jar")
                }}
            },
            {
                "name": "net.neoforged:neoforge:20.4.80:universal",
                "downloads": { "artifact": { "path": UNIVERSAL_PATH, "url": "" } }
            }
        ]
    });

    installer_jar(
        &install_profile,
        &version_json,
        &[(UNIVERSAL_PATH, b"universal jar")],
    )
}

async fn mount_neoforge(fx: &Fixture) -> Vec<httpmock::Mock<'_>> {
    let installer = neoforge_installer(&fx.server);
    fx.server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/neoforge-maven/net/neoforged/neoforge/20.4.80/neoforge-20.4.80-installer.jar");
            then.status(200).body(installer);
        })
        .await;

    let mut library_mocks = Vec::new();
    for lib in &PROFILE_LIBS {
        let mock = fx
            .server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/neoforge-maven/{}", lib.path));
                then.status(200).body(lib.body);
            })
            .await;
        library_mocks.push(mock);
    }
    library_mocks
}

fn preinstall(root: &Path, lib: &ProfileLib) {
    let path = root.join(lib.path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, lib.body).unwrap();
}

#[tokio::test]
async fn neoforge_install_downloads_only_missing_profile_libraries() {
    let fx = Fixture::new().await;
    let library_mocks = mount_neoforge(&fx).await;
    preinstall(&fx.libraries_dir(), &PROFILE_LIBS[0]);
    preinstall(&fx.libraries_dir(), &PROFILE_LIBS[1]);

    let installer = fx.factory.create("neoforge").unwrap();
    let id = installer
        .install("1.20.4", "20.4.80", &fx.root, None, &new_cancel_flag(), None)
        .await
        .unwrap();
    assert_eq!(id, "neoforge-1.20.4-20.4.80");

    let mut hits = 0;
    for mock in &library_mocks {
        hits += mock.hits_async().await;
    }
    assert_eq!(hits, 1);
    assert_eq!(library_mocks[2].hits_async().await, 1);
    assert!(fx.libraries_dir().join(PROFILE_LIBS[2].path).is_file());
    assert_eq!(
        std::fs::read(fx.libraries_dir().join(UNIVERSAL_PATH)).unwrap(),
        b"universal jar"
    );

    let descriptor = fx.read_descriptor(&id);
    assert_eq!(descriptor["inheritsFrom"], "1.20.4");
    assert_eq!(descriptor["mainClass"], "cpw.mods.bootstraplauncher.BootstrapLauncher");
    assert_eq!(
        descriptor["arguments"]["game"],
        json!(["--launchTarget", "forgeclient"])
    );
    assert_eq!(descriptor["assetIndex"]["id"], "12");
    assert_eq!(
        library_names(&descriptor),
        vec![
            "com.mojang:brigadier:1.2.9",
            "net.neoforged:bus:7.0.0",
            "net.neoforged:neoforge:20.4.80:universal",
            "net.neoforged.installertools:installertools:2.1.2",
            "net.neoforged:AutoRenamingTool:1.0.11",
            "net.neoforged.installertools:binarypatcher:2.1.2",
        ]
    );

    assert!(!fx.cache.join("neoforge").join(&id).exists());
}

#[tokio::test]
async fn cancelling_neoforge_install_removes_scratch_and_never_writes_descriptor() {
    let fx = Fixture::new().await;
    let library_mocks = mount_neoforge(&fx).await;

    let cancel = new_cancel_flag();
    let trigger = cancel.clone();
    let progress: ProgressFn = Arc::new(move |p| {
        if p >= 60.0 {
            request_cancel(&trigger);
        }
    });

    let err = fx
        .factory
        .create("NeoForge")
        .unwrap()
        .install("1.20.4", "20.4.80", &fx.root, Some(progress), &cancel, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LauncherError::Cancelled), "got {err}");
    assert!(!fx.cache.join("neoforge").join("neoforge-1.20.4-20.4.80").exists());
    assert!(!version::is_installed(&fx.root, "neoforge-1.20.4-20.4.80"));
    for mock in &library_mocks {
        assert_eq!(mock.hits_async().await, 0);
    }
}

#[tokio::test]
async fn cancelling_during_library_batch_stops_remaining_downloads() {
    let fx = Fixture::new().await;
    let library_mocks = mount_neoforge(&fx).await;

    // Library slice is 60..85; the first finished download lands inside it.
    let cancel = new_cancel_flag();
    let trigger = cancel.clone();
    let progress: ProgressFn = Arc::new(move |p| {
        if p > 61.0 && p < 85.0 {
            request_cancel(&trigger);
        }
    });

    let err = fx
        .factory
        .create("neoforge")
        .unwrap()
        .install("1.20.4", "20.4.80", &fx.root, Some(progress), &cancel, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LauncherError::Cancelled), "got {err}");
    let mut hits = 0;
    for mock in &library_mocks {
        hits += mock.hits_async().await;
    }
    assert_eq!(hits, 1);
    let present = PROFILE_LIBS
        .iter()
        .filter(|lib| fx.libraries_dir().join(lib.path).is_file())
        .count();
    assert_eq!(present, 1);
    assert!(!fx.cache.join("neoforge").join("neoforge-1.20.4-20.4.80").exists());
    assert!(!version::is_installed(&fx.root, "neoforge-1.20.4-20.4.80"));
}

#[tokio::test]
async fn neoforge_versions_follow_base_version() {
    let fx = Fixture::new().await;
    fx.server
        .mock_async(|when, then| {
            when.method(GET).path("/neoforge-api/net/neoforged/neoforge");
            then.status(200).json_body(json!({
                "isSnapshot": false,
                "versions": ["20.2.86", "20.4.80-beta", "20.4.190", "21.0.0-beta"]
            }));
        })
        .await;

    let versions = fx
        .factory
        .create("neoforge")
        .unwrap()
        .available_versions("1.20.4", &new_cancel_flag())
        .await
        .unwrap();
    assert_eq!(versions, vec!["20.4.190", "20.4.80-beta"]);
}

#[tokio::test]
async fn unknown_loader_type_is_not_supported() {
    let fx = Fixture::new().await;
    assert!(matches!(
        fx.factory.create("rift"),
        Err(LauncherError::NotSupported(_))
    ));
}
