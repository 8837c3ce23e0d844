use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;

use interface_core::core::assets::AssetManager;
use interface_core::core::cancel::new_cancel_flag;
use interface_core::core::config::{default_data_dir, LauncherConfig};
use interface_core::core::downloader::fingerprint_files;
use interface_core::core::loaders::{InstallServices, ModLoaderInstallerFactory};
use interface_core::core::progress::{ItemFn, ProgressFn};
use interface_core::LauncherResult;

#[derive(Parser, Debug)]
#[command(
    name = "interface-cli",
    author,
    version,
    about = "Resolve Minecraft versions, download libraries and assets, install mod loaders"
)]
struct Cli {
    /// Game directory holding versions/, libraries/ and assets/.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Explicit settings file instead of <data-dir>/launcher_settings.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List release versions from the Mojang manifest.
    Versions {
        /// Include snapshots and old versions.
        #[arg(long)]
        all: bool,
    },
    /// List installed versions.
    Installed,
    /// List loader versions available for a base game version.
    Loaders { loader_type: String, base_version: String },
    /// Install a mod loader on top of a base version.
    Install {
        loader_type: String,
        base_version: String,
        loader_version: String,
        /// Custom version id.
        #[arg(long)]
        name: Option<String>,
    },
    /// Download the missing libraries of a version.
    Libraries { version: String },
    /// Extract a version's natives into a directory.
    Natives { version: String, dir: PathBuf },
    /// Download the asset index and missing objects of a version.
    Assets { version: String },
    /// Print whitespace-insensitive fingerprints of files.
    Fingerprint { files: Vec<PathBuf> },
}

#[tokio::main]
async fn main() -> ExitCode {
    interface_core::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> LauncherResult<LauncherConfig> {
    let mut config = match &cli.config {
        Some(path) => LauncherConfig::load(path)?,
        None => LauncherConfig::load_or_default(
            &cli.data_dir.clone().unwrap_or_else(default_data_dir),
        ),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn console_progress() -> ProgressFn {
    Arc::new(|p| eprint!("\r{:>5.1}%", p))
}

fn console_item() -> ItemFn {
    Arc::new(|item| tracing::debug!("{}", item))
}

async fn run(cli: Cli) -> LauncherResult<()> {
    let config = load_config(&cli)?;
    let root = config.data_dir.clone();
    let services = Arc::new(InstallServices::from_config(&config)?);
    let cancel = new_cancel_flag();

    match cli.command {
        Command::Versions { all } => {
            let manifest = services.versions.get_manifest(&cancel).await?;
            services.versions.save_manifest(&root).await?;
            let entries = if all {
                manifest.versions.iter().collect()
            } else {
                manifest.releases()
            };
            for entry in entries {
                println!("{}\t{}", entry.id, entry.version_type);
            }
        }
        Command::Installed => {
            for id in services.versions.list_installed(&root).await? {
                match services.versions.get_version_config(&root, &id).await? {
                    Some(cfg) => println!(
                        "{}\t{} {} on {}",
                        id, cfg.loader_type, cfg.loader_version, cfg.base_version_id
                    ),
                    None => println!("{}", id),
                }
            }
        }
        Command::Loaders {
            loader_type,
            base_version,
        } => {
            let installer = ModLoaderInstallerFactory::new(services.clone()).create(&loader_type)?;
            for v in installer.available_versions(&base_version, &cancel).await? {
                println!("{}", v);
            }
        }
        Command::Install {
            loader_type,
            base_version,
            loader_version,
            name,
        } => {
            let installer = ModLoaderInstallerFactory::new(services.clone()).create(&loader_type)?;
            let id = installer
                .install(
                    &base_version,
                    &loader_version,
                    &root,
                    Some(console_progress()),
                    &cancel,
                    name.as_deref(),
                )
                .await?;
            eprintln!();
            println!("{}", id);
        }
        Command::Libraries { version } => {
            let descriptor = services.versions.get_descriptor(&version, &root, true, &cancel).await?;
            let libraries_dir = config.libraries_dir();
            let missing = services.libraries.get_missing_libraries(&descriptor, &libraries_dir)?;
            println!("{} missing libraries", missing.len());
            services
                .libraries
                .download_libraries(
                    &descriptor,
                    &libraries_dir,
                    &services.downloader,
                    services.max_concurrency,
                    Some(console_progress()),
                    Some(console_item()),
                    &cancel,
                )
                .await?;
            eprintln!();
        }
        Command::Natives { version, dir } => {
            let descriptor = services.versions.get_descriptor(&version, &root, true, &cancel).await?;
            let count = services
                .libraries
                .extract_native_libraries(&descriptor, &config.libraries_dir(), &dir, &cancel)
                .await?;
            println!("{} native files extracted", count);
        }
        Command::Assets { version } => {
            let assets = AssetManager::new(
                services.downloader.clone(),
                services.versions.clone(),
                config.endpoints.resources.clone(),
            );
            assets
                .download_all_asset_objects(
                    &version,
                    &root,
                    Some(console_progress()),
                    Some(console_item()),
                    &cancel,
                )
                .await?;
            eprintln!();
        }
        Command::Fingerprint { files } => {
            for (path, fp) in fingerprint_files(&files).await {
                println!("{}\t{}", fp, path.display());
            }
        }
    }
    Ok(())
}
