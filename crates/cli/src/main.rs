//! metronome: convert a music library with bounded parallel ffmpeg jobs.

mod cli;
mod logging;
mod progress;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indicatif::MultiProgress;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use metronome_core::{
    config::{default_settings_path, ensure_roots, load_settings, validate_settings, PersistedSettings},
    converter::{Converter, ConverterConfig, FfmpegConverter},
    deps::{DescriptorTable, Platform, ProvisionStatus, Provisioner, Tool},
    scheduler::BatchScheduler,
};

use cli::{Cli, Command};
use progress::{BatchRenderer, DownloadRenderer};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if logging::is_installed() {
            error!("Fatal error: {:#}", e);
        } else {
            eprintln!("Fatal error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let multi = MultiProgress::new();

    let settings_path = cli.settings.clone().or_else(default_settings_path);
    let loaded = load_settings(settings_path.as_deref(), &cli.overrides());

    let level = match &loaded {
        Ok(settings) => settings.log_level.clone(),
        Err(_) => cli.log_level.clone().unwrap_or_else(|| "warn".to_string()),
    };
    logging::init(&level, cli.log_file.as_deref(), &multi)?;

    let settings = loaded.context("Failed to load settings")?;
    let settings = PersistedSettings::new(settings, if cli.no_save { None } else { settings_path });

    let platform = Platform::detect().context("Unsupported platform")?;
    let table = match &settings.descriptors {
        Some(path) => DescriptorTable::from_file(path)
            .with_context(|| format!("Failed to load descriptors from {}", path.display()))?,
        None => DescriptorTable::builtin().context("Failed to load built-in descriptors")?,
    };
    let provisioner = Provisioner::new(table, platform, settings.bin_dir.clone())
        .context("Failed to prepare tool directory")?;

    match &cli.command {
        Command::Convert(_) => convert(&settings, &provisioner, &multi).await,
        Command::Fetch(args) => {
            for tool in &args.tools {
                interruptible(fetch(&provisioner, *tool, &multi)).await?;
            }
            Ok(())
        }
    }
}

async fn convert(settings: &PersistedSettings, provisioner: &Provisioner, multi: &MultiProgress) -> Result<()> {
    validate_settings(settings).context("Invalid settings")?;
    ensure_roots(settings).context("Failed to create input/output directories")?;

    if !provisioner.is_available(Tool::Ffmpeg) {
        interruptible(fetch(provisioner, Tool::Ffmpeg, multi)).await?;
    }

    let converter = FfmpegConverter::new(ConverterConfig::resolve(provisioner.bin_dir()));
    converter.validate().await.context("FFmpeg is not usable")?;

    let scheduler = BatchScheduler::new(settings.scheduler_config(), converter);
    let renderer = BatchRenderer::new(multi.clone())?;
    let (tx, rx) = mpsc::channel(256);
    let rendering = tokio::spawn(renderer.drive(rx));

    info!(
        input = %settings.input.display(),
        output = %settings.output.display(),
        format = %settings.format,
        threads = settings.threads,
        "Converting"
    );

    let outcome = tokio::select! {
        result = scheduler.run_directory(&settings.input, &settings.output, Some(tx)) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    // The scheduler future is dropped by now, which closes the channel.
    let unfinished = rendering.await.unwrap_or_default();

    match outcome {
        Some(result) => {
            let result = result.context("Conversion failed")?;
            println!("{}", result);
            if result.failed > 0 {
                warn!(failed = result.failed, "Some files could not be converted");
            }
            Ok(())
        }
        None => {
            remove_unfinished(unfinished).await;
            Err(anyhow!("Interrupted"))
        }
    }
}

async fn fetch(provisioner: &Provisioner, tool: Tool, multi: &MultiProgress) -> Result<()> {
    let renderer = DownloadRenderer::new(multi.clone())?;
    let (tx, rx) = mpsc::channel(64);
    let rendering = tokio::spawn(renderer.drive(format!("Downloading {}", tool), rx));

    let status = provisioner.ensure(tool, Some(tx)).await;
    let _ = rendering.await;

    match status.with_context(|| format!("Failed to provision {}", tool))? {
        ProvisionStatus::AlreadyAvailable => info!(%tool, "Already available"),
        ProvisionStatus::Installed(paths) => {
            for path in paths {
                info!(%tool, path = %path.display(), "Installed");
            }
        }
    }
    Ok(())
}

/// Runs `work` unless Ctrl-C arrives first.
async fn interruptible<F>(work: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("Interrupted")),
    }
}

/// Deletes outputs of conversions cut off mid-write.
async fn remove_unfinished(paths: Vec<PathBuf>) {
    for path in paths {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!(path = %path.display(), "Removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove partial output"),
        }
    }
}
