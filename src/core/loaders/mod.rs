pub mod context;
pub mod fabric;
pub mod forge;
pub mod installer;
pub mod installer_jar;
pub mod kind;
pub mod neoforge;
pub mod optifine;
pub mod pipeline;
pub mod profile;
pub mod quilt;
pub mod scratch;

pub use context::{validate_version_id, version_id_for, InstallRun, InstallServices};
pub use installer::{Installer, ModLoaderInstallerFactory};
pub use kind::LoaderKind;
pub use pipeline::{run_install, InstallRequest, InstallStage, LoaderStrategy, StageSlices};
pub use scratch::ScratchDir;
