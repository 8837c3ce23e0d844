// ─── Version Descriptor ───
// Typed Mojang-style version JSON plus platform rule evaluation.
// Fields the core does not read are kept in `extra` so a descriptor written
// back to disk loses nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::LauncherResult;
use crate::core::maven::MavenArtifact;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    /// Legacy space-separated game arguments (pre-1.13).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<BTreeMap<String, DownloadArtifact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Argument>,
    #[serde(default)]
    pub jvm: Vec<Argument>,
}

/// One entry of `arguments.game` / `arguments.jvm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    Plain(String),
    Conditional {
        #[serde(default)]
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub major_version: u32,
}

// ─── Libraries ───

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    /// Repository base for libraries without `downloads` (Fabric/Quilt style).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    /// Legacy natives map: OS name -> classifier, may contain `${arch}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<BTreeMap<String, LibraryArtifact>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Empty for artifacts shipped inside an installer.
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn artifact(&self) -> LauncherResult<MavenArtifact> {
        MavenArtifact::parse(&self.name)
    }

    pub fn main_artifact(&self) -> Option<&LibraryArtifact> {
        self.downloads.as_ref()?.artifact.as_ref()
    }

    /// Evaluate whether this library applies to `platform`.
    pub fn is_allowed(&self, platform: &Platform) -> bool {
        rules_allow(&self.rules, platform)
    }

    /// Classifier of the legacy natives archive for `platform`, if any.
    pub fn native_classifier(&self, platform: &Platform) -> Option<String> {
        let natives = self.natives.as_ref()?;
        natives
            .get(&platform.os)
            .map(|c| c.replace("${arch}", platform.arch_bits()))
    }

    /// Modern (1.19+) natives are ordinary libraries named `...:natives-<os>`.
    pub fn is_native_classified(&self) -> bool {
        self.name
            .split('@')
            .next()
            .and_then(|coord| coord.split(':').nth(3))
            .is_some_and(|c| c.starts_with("natives-"))
    }
}

// ─── Rules ───

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// OS/arch pair rules are evaluated against, in Mojang's naming
/// (`windows`/`osx`/`linux`, `x86`/`x86_64`/`arm64`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn current() -> Self {
        let os = if cfg!(target_os = "windows") {
            "windows"
        } else if cfg!(target_os = "macos") {
            "osx"
        } else {
            "linux"
        };
        let arch = match std::env::consts::ARCH {
            "aarch64" => "arm64",
            other => other,
        };
        Self::new(os, arch)
    }

    /// `${arch}` substitution value in legacy natives classifiers.
    pub fn arch_bits(&self) -> &'static str {
        if self.arch == "x86" || self.arch == "arm" {
            "32"
        } else {
            "64"
        }
    }
}

impl Rule {
    /// Whether this rule's conditions hold on `platform`. Rules gated on
    /// launcher features never match, as no features are enabled here.
    pub fn matches(&self, platform: &Platform) -> bool {
        if self.features.as_ref().is_some_and(|f| !f.is_empty()) {
            return false;
        }
        let Some(os) = &self.os else {
            return true;
        };
        let name_ok = os.name.as_deref().map_or(true, |n| n == platform.os);
        let arch_ok = os.arch.as_deref().map_or(true, |a| a == platform.arch);
        name_ok && arch_ok
    }
}

/// Rules logic:
/// - No rules: allowed.
/// - Otherwise start disallowed and walk top to bottom; every matching rule
///   sets the state, so the last matching rule wins.
pub fn rules_allow(rules: &[Rule], platform: &Platform) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;
    for rule in rules {
        if rule.matches(platform) {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}

impl Argument {
    /// Argument strings that apply on `platform`.
    pub fn values_for(&self, platform: &Platform) -> Vec<String> {
        match self {
            Argument::Plain(s) => vec![s.clone()],
            Argument::Conditional { rules, value } => {
                if !rules_allow(rules, platform) {
                    return vec![];
                }
                match value {
                    ArgumentValue::Single(s) => vec![s.clone()],
                    ArgumentValue::Many(v) => v.clone(),
                }
            }
        }
    }
}

impl VersionDescriptor {
    pub fn client_download(&self) -> Option<&DownloadArtifact> {
        self.downloads.as_ref()?.get("client")
    }

    pub fn is_base(&self) -> bool {
        self.inherits_from.is_none()
    }

    /// Game arguments for `platform`, falling back to the legacy string.
    pub fn game_args(&self, platform: &Platform) -> Vec<String> {
        match &self.arguments {
            Some(args) => args.game.iter().flat_map(|a| a.values_for(platform)).collect(),
            None => self
                .minecraft_arguments
                .as_deref()
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    pub fn jvm_args(&self, platform: &Platform) -> Vec<String> {
        self.arguments
            .as_ref()
            .map(|args| args.jvm.iter().flat_map(|a| a.values_for(platform)).collect())
            .unwrap_or_default()
    }

    /// Asset index id, from `assetIndex` or the legacy `assets` field.
    pub fn asset_index_id(&self) -> Option<&str> {
        self.asset_index
            .as_ref()
            .map(|a| a.id.as_str())
            .or(self.assets.as_deref())
    }
}
