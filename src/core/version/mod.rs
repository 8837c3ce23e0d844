pub mod manifest;
pub mod resolver;
pub mod version_config;
pub mod version_file;

pub use manifest::{LatestVersions, VersionEntry, VersionManifest};
pub use resolver::{
    client_jar_path, descriptor_path, is_installed, merge_version_info, version_dir,
    VersionResolver,
};
pub use version_config::VersionConfig;
pub use version_file::{
    Argument, ArgumentValue, Arguments, AssetIndexRef, DownloadArtifact, ExtractRules,
    JavaVersion, Library, LibraryArtifact, LibraryDownloads, OsRule, Platform, Rule, RuleAction,
    VersionDescriptor,
};
