use crate::core::maven::{compare_versions, MavenMetadata};

/// Forge publishes installers as `<base>-<forge>`; callers may pass either the
/// bare Forge version or the full `<base>-<forge>` string.
pub fn forge_version_key(base_version_id: &str, loader_version: &str) -> String {
    let bare = loader_version
        .strip_prefix(&format!("{}-", base_version_id))
        .unwrap_or(loader_version);
    format!("{}-{}", base_version_id, bare)
}

pub fn forge_installer_url(maven: &str, base_version_id: &str, loader_version: &str) -> String {
    let key = forge_version_key(base_version_id, loader_version);
    format!(
        "{}/net/minecraftforge/forge/{}/forge-{}-installer.jar",
        maven.trim_end_matches('/'),
        key,
        key
    )
}

pub fn forge_metadata_url(maven: &str) -> String {
    format!(
        "{}/net/minecraftforge/forge/maven-metadata.xml",
        maven.trim_end_matches('/')
    )
}

/// Forge versions built for `base_version_id`, newest first, without the
/// `<base>-` prefix.
pub fn forge_versions(metadata: &MavenMetadata, base_version_id: &str) -> Vec<String> {
    let prefix = format!("{}-", base_version_id);
    let mut versions: Vec<String> = metadata
        .versions()
        .iter()
        .filter_map(|v| v.strip_prefix(&prefix))
        .map(str::to_string)
        .collect();
    versions.sort_by(|a, b| compare_versions(b, a));
    versions.dedup();
    versions
}
