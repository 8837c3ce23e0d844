use serde::Deserialize;

use crate::core::maven::compare_versions;

/// Response of the NeoForge maven API version listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeoForgeVersionList {
    #[serde(default)]
    pub is_snapshot: bool,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// Installer locations to try in order. NeoForge for 1.20.1 was published
/// under the legacy `net.neoforged:forge` artifact.
pub fn neoforge_installer_urls(maven: &str, base_version_id: &str, loader_version: &str) -> Vec<String> {
    let maven = maven.trim_end_matches('/');
    let mut urls = vec![format!(
        "{}/net/neoforged/neoforge/{}/neoforge-{}-installer.jar",
        maven, loader_version, loader_version
    )];
    if base_version_id == "1.20.1" {
        let legacy = if loader_version.starts_with("1.20.1-") {
            loader_version.to_string()
        } else {
            format!("1.20.1-{}", loader_version)
        };
        urls.push(format!(
            "{}/net/neoforged/forge/{}/forge-{}-installer.jar",
            maven, legacy, legacy
        ));
    }
    urls
}

pub fn neoforge_versions_url(api: &str) -> String {
    format!("{}/net/neoforged/neoforge", api.trim_end_matches('/'))
}

/// NeoForge numbers releases `<minor>.<patch>.<build>` after the game's
/// `1.<minor>.<patch>`; `1.21` maps to `21.0.`.
pub fn neoforge_version_prefix(base_version_id: &str) -> Option<String> {
    let rest = base_version_id.strip_prefix("1.")?;
    let mut parts = rest.split('.');
    let minor = parts.next().filter(|m| !m.is_empty() && m.chars().all(|c| c.is_ascii_digit()))?;
    let patch = match parts.next() {
        Some(p) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => p,
        Some(_) => return None,
        None => "0",
    };
    Some(format!("{}.{}.", minor, patch))
}

/// Versions matching `base_version_id`, newest first.
pub fn neoforge_versions(all: &[String], base_version_id: &str) -> Vec<String> {
    let Some(prefix) = neoforge_version_prefix(base_version_id) else {
        return Vec::new();
    };
    let mut versions: Vec<String> = all
        .iter()
        .filter(|v| v.starts_with(&prefix))
        .cloned()
        .collect();
    versions.sort_by(|a, b| compare_versions(b, a));
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_follows_minor_and_patch() {
        assert_eq!(neoforge_version_prefix("1.20.4").as_deref(), Some("20.4."));
        assert_eq!(neoforge_version_prefix("1.21").as_deref(), Some("21.0."));
        assert_eq!(neoforge_version_prefix("1.21.1").as_deref(), Some("21.1."));
        assert_eq!(neoforge_version_prefix("24w14a"), None);
    }

    #[test]
    fn versions_filtered_and_sorted() {
        let all: Vec<String> = ["20.4.80-beta", "20.4.237", "20.2.88", "20.4.190", "21.0.1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            neoforge_versions(&all, "1.20.4"),
            vec!["20.4.237", "20.4.190", "20.4.80-beta"]
        );
    }

    #[test]
    fn legacy_route_only_for_1_20_1() {
        assert_eq!(neoforge_installer_urls("https://m", "1.20.4", "20.4.80").len(), 1);
        let urls = neoforge_installer_urls("https://m/", "1.20.1", "47.1.84");
        assert_eq!(
            urls[1],
            "https://m/net/neoforged/forge/1.20.1-47.1.84/forge-1.20.1-47.1.84-installer.jar"
        );
    }
}
