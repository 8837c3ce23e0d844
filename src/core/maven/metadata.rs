use std::cmp::Ordering;

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::core::error::LauncherResult;

/// `maven-metadata.xml`, reduced to the version list.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MavenMetadata {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub versioning: Versioning,
}

#[derive(Debug, Deserialize, Default)]
pub struct Versioning {
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub versions: VersionList,
}

#[derive(Debug, Deserialize, Default)]
pub struct VersionList {
    #[serde(default, rename = "version")]
    pub items: Vec<String>,
}

impl MavenMetadata {
    pub fn parse(xml: &str) -> LauncherResult<Self> {
        Ok(from_str(xml)?)
    }

    pub fn versions(&self) -> &[String] {
        &self.versioning.versions.items
    }
}

fn numeric_parts(raw: &str) -> Vec<u32> {
    raw.split(|c: char| !c.is_ascii_digit())
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.parse::<u32>().ok())
        .collect()
}

/// Orders loader versions by their numeric components, falling back to text.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts = numeric_parts(a);
    let b_parts = numeric_parts(b);

    let max_len = a_parts.len().max(b_parts.len());
    for idx in 0..max_len {
        let a_val = a_parts.get(idx).copied().unwrap_or(0);
        let b_val = b_parts.get(idx).copied().unwrap_or(0);
        match a_val.cmp(&b_val) {
            Ordering::Equal => continue,
            non_eq => return non_eq,
        }
    }

    a.cmp(b)
}
