use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const VERSION_CONFIG_FILE: &str = "version.config";

/// What an installed version is made of, written next to its descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConfig {
    pub base_version_id: String,
    pub loader_type: String,
    pub loader_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl VersionConfig {
    pub fn new(base_version_id: &str, loader_type: &str, loader_version: &str) -> Self {
        Self {
            base_version_id: base_version_id.to_string(),
            loader_type: loader_type.to_string(),
            loader_version: loader_version.to_string(),
            created_at: Some(Utc::now()),
        }
    }
}
