//! ollamab - compressed backups for Ollama model directories
//!
//! Reads the model store named by `OLLAMA_MODELS`, writes one compressed
//! tar archive per run into `OLLAMA_BACKUP_PATH`, and can back up a single
//! model by name instead of the whole store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ollamab_core::{registry, Archiver, BackupConfig, BackupReport, Settings};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// ollamab - back up Ollama model directories into compressed archives
#[derive(Parser)]
#[command(name = "ollamab")]
#[command(author, version, about = "Back up Ollama model directories into compressed archives", long_about = None)]
struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show a progress bar during operations
    #[arg(long, global = true)]
    progress: bool,

    /// Source model directory (overrides $OLLAMA_MODELS)
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Backup destination directory (overrides $OLLAMA_BACKUP_PATH)
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up the whole model directory
    Run {
        /// Compression codec (store, gzip, zstd, xz)
        #[arg(long)]
        codec: Option<String>,

        /// Compression level (defaults to the codec maximum)
        #[arg(long)]
        level: Option<u32>,

        /// Archive symlink targets instead of skipping links
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// List models found in the model directory
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Back up a single model (NAME is `model` or `model:tag`)
    Model {
        /// Model reference, e.g. `llama3.2:1b`
        name: String,

        /// Compression codec (store, gzip, zstd, xz)
        #[arg(long)]
        codec: Option<String>,

        /// Compression level (defaults to the codec maximum)
        #[arg(long)]
        level: Option<u32>,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let result = run();

    match result {
        Ok(_) => process::exit(0),
        Err(e) => {
            error!("Error: {}", e);

            let exit_code = map_error_to_exit_code(&e);
            process::exit(exit_code);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match &cli.command {
        Commands::Run {
            codec,
            level,
            follow_symlinks,
        } => {
            let config = resolve_config(&cli, codec.as_deref(), *level, *follow_symlinks)?;
            let archiver = Archiver::new(config)?.with_progress(cli.progress);

            let report = archiver.backup_all()?;
            print_report(&report);
        }

        Commands::List { json } => {
            let models_dir = resolve_path(
                cli.models_dir.clone(),
                ollamab_core::config::MODELS_ENV,
                "source model directory",
            )?;
            let models = registry::list_models(&models_dir)?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else if models.is_empty() {
                info!("No models found under {:?}", models_dir);
            } else {
                for model in &models {
                    println!(
                        "{}  {} blobs  {}",
                        model.name,
                        model.blob_paths.len(),
                        format_size(model.total_size())
                    );
                }
            }
        }

        Commands::Model { name, codec, level } => {
            let config = resolve_config(&cli, codec.as_deref(), *level, false)?;
            let archiver = Archiver::new(config)?.with_progress(cli.progress);

            let model = registry::find_model(&archiver.config().models_dir, name)?;
            info!(
                "Backing up model {} ({} blobs, {})",
                model.name,
                model.blob_paths.len(),
                format_size(model.total_size())
            );

            let report = archiver.backup_model(&model)?;
            print_report(&report);
        }
    }

    Ok(())
}

/// Fold settings, CLI overrides and environment paths into a BackupConfig
fn resolve_config(
    cli: &Cli,
    codec: Option<&str>,
    level: Option<u32>,
    follow_symlinks: bool,
) -> Result<BackupConfig, ollamab_core::Error> {
    let mut settings = Settings::load().unwrap_or_else(|e| {
        warn!("Falling back to default settings: {}", e);
        Settings::default()
    });

    if let Some(codec) = codec {
        settings.compression.codec = codec.to_string();
        // A level tuned for one codec rarely fits another
        settings.compression.level = None;
    }
    if let Some(level) = level {
        settings.compression.level = Some(level);
    }
    if follow_symlinks {
        settings.backup.follow_symlinks = true;
    }

    match (cli.models_dir.clone(), cli.backup_dir.clone()) {
        (None, None) => BackupConfig::from_env(&settings),
        (models, backup) => {
            let models_dir = resolve_path(
                models,
                ollamab_core::config::MODELS_ENV,
                "source model directory",
            )?;
            let backup_dir = resolve_path(
                backup,
                ollamab_core::config::BACKUP_ENV,
                "backup destination directory",
            )?;
            BackupConfig::new(models_dir, backup_dir, &settings)
        }
    }
}

/// Take a path from a CLI flag, falling back to the environment
fn resolve_path(
    flag: Option<PathBuf>,
    env_var: &str,
    what: &str,
) -> Result<PathBuf, ollamab_core::Error> {
    if let Some(path) = flag {
        return Ok(path);
    }

    std::env::var(env_var).map(PathBuf::from).map_err(|_| {
        ollamab_core::Error::Config(format!("{} is not set ({})", env_var, what))
    })
}

fn print_report(report: &BackupReport) {
    info!(
        "Archived {} files ({}) to {:?}",
        report.files_archived,
        format_size(report.bytes_archived),
        report.archive_path
    );
    info!("Checksum manifest: {:?}", report.manifest_path);

    if report.excluded > 0 {
        info!("{} files matched exclude patterns", report.excluded);
    }
    if !report.skipped.is_empty() {
        warn!("{} files were skipped:", report.skipped.len());
        for entry in &report.skipped {
            warn!("  {:?}: {}", entry.path, entry.reason);
        }
    }

    // Machine-readable: the archive path is the only stdout output
    println!("{}", report.archive_path.display());
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Map errors to exit codes:
/// - 0: Success
/// - 1: General error
/// - 2: IO error or missing model
/// - 3: Invalid path, configuration or argument
/// - 4: Archive or compression failure
fn map_error_to_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(core_err) = err.downcast_ref::<ollamab_core::Error>() {
        match core_err {
            ollamab_core::Error::Io(_) => 2,
            ollamab_core::Error::NotFound(_) => 2,
            ollamab_core::Error::InvalidPath(_) => 3,
            ollamab_core::Error::UnsupportedCodec(_) => 3,
            ollamab_core::Error::Config(_) => 3,
            ollamab_core::Error::Archive(_) => 4,
            ollamab_core::Error::Compression(_) => 4,
            ollamab_core::Error::Other(_) => 1,
        }
    } else if err.is::<std::io::Error>() {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_exit_code_mapping() {
        let config_err = anyhow::Error::new(ollamab_core::Error::Config("missing".into()));
        assert_eq!(map_error_to_exit_code(&config_err), 3);

        let not_found = anyhow::Error::new(ollamab_core::Error::NotFound("model".into()));
        assert_eq!(map_error_to_exit_code(&not_found), 2);

        let other = anyhow::anyhow!("something else");
        assert_eq!(map_error_to_exit_code(&other), 1);
    }
}
