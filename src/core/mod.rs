// ─── InterfaceOficial Core ───
// Version resolution, verified downloads and mod-loader installation.
//
// Architecture:
//   core/
//     version/    — Mojang manifest + version JSON + OS rules + inheritance
//     maven/      — Artifact coordinates, maven-metadata.xml
//     downloader/ — Concurrent downloads with SHA-1 validation + fingerprints
//     libraries/  — Library paths, missing-file detection, natives
//     assets/     — Asset index + object downloads
//     loaders/    — Fabric, Quilt, Forge, NeoForge, OptiFine
//     config, http, cancel, progress, error — shared plumbing

pub mod assets;
pub mod cancel;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod libraries;
pub mod loaders;
pub mod maven;
pub mod progress;
pub mod version;
