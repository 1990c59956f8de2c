//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use metronome_core::config::SettingsOverrides;
use metronome_core::converter::OutputFormat;
use metronome_core::deps::Tool;
use metronome_core::scheduler::parse_extension_list;

/// Convert a music library with bounded parallel ffmpeg jobs.
#[derive(Debug, Parser)]
#[command(name = "metronome", version, about)]
pub struct Cli {
    /// Settings file (default: ~/.metronome.json).
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Do not write the merged settings back on exit.
    #[arg(long, global = true)]
    pub no_save: bool,

    /// Log filter, e.g. `info` or `metronome_core=debug`. RUST_LOG takes precedence.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Directory provisioned tools are installed into.
    #[arg(long, global = true)]
    pub bin_dir: Option<PathBuf>,

    /// Dependency descriptor file replacing the built-in table.
    #[arg(long, global = true)]
    pub descriptors: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert every audio file under the input directory.
    Convert(ConvertArgs),
    /// Download and install external tools.
    Fetch(FetchArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Input directory; its folder structure is mirrored.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory for converted files.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: mp3 (320 kbit/s) or opus (384 kbit/s).
    #[arg(short = 'c', long = "format")]
    pub format: Option<OutputFormat>,

    /// Maximum concurrent conversions (default: number of CPUs).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub threads: Option<u64>,

    /// Comma-separated extra extensions to include, e.g. `mp4,dsf`.
    #[arg(long)]
    pub extra_extensions: Option<String>,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Tools to install: ffmpeg, chromaprint.
    #[arg(required = true)]
    pub tools: Vec<Tool>,
}

impl Cli {
    /// Values the user gave explicitly; these win over persisted settings.
    pub fn overrides(&self) -> SettingsOverrides {
        let mut overrides = SettingsOverrides {
            bin_dir: self.bin_dir.clone(),
            descriptors: self.descriptors.clone(),
            log_level: self.log_level.clone(),
            ..Default::default()
        };

        if let Command::Convert(args) = &self.command {
            overrides.input = args.input.clone();
            overrides.output = args.output.clone();
            overrides.format = args.format;
            overrides.threads = args.threads.map(|t| t as usize);
            overrides.extra_extensions = args.extra_extensions.as_deref().map(parse_extension_list);
        }

        overrides
    }
}
