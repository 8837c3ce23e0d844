use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::cancel::CancelFlag;
use crate::core::error::LauncherResult;
use crate::core::progress::ProgressFn;
use crate::core::version;

use super::context::{version_id_for, InstallServices};
use super::fabric::fabric_source;
use super::installer_jar::{InstallerFlavor, InstallerJarInstaller};
use super::kind::LoaderKind;
use super::optifine::PatchInstaller;
use super::pipeline::{InstallRequest, LoaderStrategy};
use super::profile::ProfileInstaller;
use super::quilt::quilt_source;

/// Dispatcher sin Box<dyn>: one variant per loader, three install families.
pub enum Installer {
    Fabric(ProfileInstaller),
    Quilt(ProfileInstaller),
    Forge(InstallerJarInstaller),
    NeoForge(InstallerJarInstaller),
    Optifine(PatchInstaller),
}

impl Installer {
    pub fn new(kind: LoaderKind, services: Arc<InstallServices>) -> Self {
        match kind {
            LoaderKind::Fabric => {
                let source = fabric_source(&services.endpoints);
                Self::Fabric(ProfileInstaller::new(services, source))
            }
            LoaderKind::Quilt => {
                let source = quilt_source(&services.endpoints);
                Self::Quilt(ProfileInstaller::new(services, source))
            }
            LoaderKind::Forge => Self::Forge(InstallerJarInstaller::new(services, InstallerFlavor::Forge)),
            LoaderKind::NeoForge => {
                Self::NeoForge(InstallerJarInstaller::new(services, InstallerFlavor::NeoForge))
            }
            LoaderKind::Optifine => Self::Optifine(PatchInstaller::new(services)),
        }
    }

    pub fn kind(&self) -> LoaderKind {
        match self {
            Installer::Fabric(_) => LoaderKind::Fabric,
            Installer::Quilt(_) => LoaderKind::Quilt,
            Installer::Forge(_) => LoaderKind::Forge,
            Installer::NeoForge(_) => LoaderKind::NeoForge,
            Installer::Optifine(_) => LoaderKind::Optifine,
        }
    }

    /// Display name, e.g. `NeoForge`.
    pub fn mod_loader_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Install the loader on top of `base_version_id` and return the new
    /// version id.
    pub async fn install(
        &self,
        base_version_id: &str,
        loader_version: &str,
        root: &Path,
        progress: Option<ProgressFn>,
        cancel: &CancelFlag,
        custom_name: Option<&str>,
    ) -> LauncherResult<String> {
        let request = InstallRequest {
            base_version_id,
            loader_version,
            root,
            custom_name,
        };
        match self {
            Installer::Fabric(i) | Installer::Quilt(i) => i.install(&request, progress, cancel).await,
            Installer::Forge(i) | Installer::NeoForge(i) => i.install(&request, progress, cancel).await,
            Installer::Optifine(i) => i.install(&request, progress, cancel).await,
        }
    }

    /// Loader versions published for `base_version_id`. Errors from the
    /// loader's metadata service are returned, not swallowed.
    pub async fn available_versions(
        &self,
        base_version_id: &str,
        cancel: &CancelFlag,
    ) -> LauncherResult<Vec<String>> {
        match self {
            Installer::Fabric(i) | Installer::Quilt(i) => i.available_versions(base_version_id, cancel).await,
            Installer::Forge(i) | Installer::NeoForge(i) => {
                i.available_versions(base_version_id, cancel).await
            }
            Installer::Optifine(i) => i.available_versions(base_version_id, cancel).await,
        }
    }

    /// Whether the default-named version for this loader pair is installed.
    pub fn is_installed(&self, base_version_id: &str, loader_version: &str, root: &Path) -> bool {
        let id = version_id_for(self.kind(), base_version_id, loader_version, None);
        version::is_installed(root, &id)
    }
}

/// Builds installers sharing one set of services.
#[derive(Clone)]
pub struct ModLoaderInstallerFactory {
    services: Arc<InstallServices>,
}

impl ModLoaderInstallerFactory {
    pub fn new(services: Arc<InstallServices>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Arc<InstallServices> {
        &self.services
    }

    /// Case-insensitive: `fabric`, `NeoForge` and `OPTIFINE` all resolve.
    pub fn create(&self, loader_type: &str) -> LauncherResult<Installer> {
        let kind = LoaderKind::from_str(loader_type)?;
        Ok(Installer::new(kind, self.services.clone()))
    }

    pub fn supported_types(&self) -> Vec<&'static str> {
        LoaderKind::ALL.iter().map(LoaderKind::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LauncherConfig;
    use crate::core::error::LauncherError;

    fn factory(root: &Path) -> ModLoaderInstallerFactory {
        let config = LauncherConfig::for_data_dir(root.to_path_buf());
        ModLoaderInstallerFactory::new(Arc::new(InstallServices::from_config(&config).unwrap()))
    }

    #[test]
    fn factory_resolves_types_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());

        assert_eq!(factory.create("fabric").unwrap().mod_loader_type(), "Fabric");
        assert_eq!(factory.create("NEOFORGE").unwrap().mod_loader_type(), "NeoForge");
        assert_eq!(factory.create(" Optifine ").unwrap().kind(), LoaderKind::Optifine);
        assert!(matches!(factory.create("liteloader"), Err(LauncherError::NotSupported(_))));
        assert!(matches!(factory.create(""), Err(LauncherError::InvalidArgument(_))));
        assert_eq!(
            factory.supported_types(),
            vec!["Fabric", "Quilt", "Forge", "NeoForge", "Optifine"]
        );
    }

    #[test]
    fn is_installed_checks_default_version_id() {
        let dir = tempfile::tempdir().unwrap();
        let installer = factory(dir.path()).create("quilt").unwrap();
        assert!(!installer.is_installed("1.20.4", "0.23.1", dir.path()));

        let version_dir = dir.path().join("versions/quilt-1.20.4-0.23.1");
        std::fs::create_dir_all(&version_dir).unwrap();
        std::fs::write(version_dir.join("quilt-1.20.4-0.23.1.json"), "{}").unwrap();
        assert!(installer.is_installed("1.20.4", "0.23.1", dir.path()));
    }
}
