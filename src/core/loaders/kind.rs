use std::fmt;
use std::str::FromStr;

use crate::core::error::LauncherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    Fabric,
    Quilt,
    Forge,
    NeoForge,
    Optifine,
}

impl LoaderKind {
    pub const ALL: [LoaderKind; 5] = [
        LoaderKind::Fabric,
        LoaderKind::Quilt,
        LoaderKind::Forge,
        LoaderKind::NeoForge,
        LoaderKind::Optifine,
    ];

    /// Display name, also stored as `loaderType` in `version.config`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::Fabric => "Fabric",
            LoaderKind::Quilt => "Quilt",
            LoaderKind::Forge => "Forge",
            LoaderKind::NeoForge => "NeoForge",
            LoaderKind::Optifine => "Optifine",
        }
    }

    /// Lowercase name used in version ids and cache paths.
    pub fn slug(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoaderKind {
    type Err = LauncherError;

    /// Case-insensitive. Empty input is an invalid argument, anything else
    /// unknown is unsupported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LauncherError::InvalidArgument(
                "mod loader type must not be empty".into(),
            ));
        }
        LoaderKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| LauncherError::NotSupported(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("neoforge".parse::<LoaderKind>().unwrap(), LoaderKind::NeoForge);
        assert_eq!(" FABRIC ".parse::<LoaderKind>().unwrap(), LoaderKind::Fabric);
        assert_eq!("OptiFine".parse::<LoaderKind>().unwrap(), LoaderKind::Optifine);
    }

    #[test]
    fn unknown_and_empty_types_are_distinguished() {
        assert!(matches!(
            "liteloader".parse::<LoaderKind>(),
            Err(LauncherError::NotSupported(_))
        ));
        assert!(matches!(
            "".parse::<LoaderKind>(),
            Err(LauncherError::InvalidArgument(_))
        ));
    }
}
