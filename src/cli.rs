use std::path::PathBuf;

use clap::Parser;

use crate::dataloader::DuplicatePolicy;
use crate::normalizer::ResizeFilter;
use crate::writer::OutputMode;
use crate::Config;

/// Flatten a tree of flawless/distorted/mask/reference images into an indexed training set
#[derive(Parser, Debug, Clone)]
#[command(name = "quadprep")]
#[command(version)]
pub struct Cli {
    /// Root of the source tree
    #[arg(long)]
    pub root_dir: Option<PathBuf>,

    /// Side length of the square output images
    #[arg(long)]
    pub resolution: Option<u32>,

    /// Directory receiving the role folders, archives and train.jsonl
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Caption written into every manifest entry
    #[arg(long)]
    pub prompt: Option<String>,

    /// Resampling filter for the final resize
    #[arg(long, value_enum)]
    pub filter: Option<ResizeFilter>,

    /// JPEG quality of the written images (1-100)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// What to do when a directory has several flawless, distorted or mask files
    #[arg(long, value_enum)]
    pub duplicates: Option<DuplicatePolicy>,

    /// Remove previous outputs instead of continuing after them
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Skip zipping the role directories
    #[arg(long, default_value_t = false)]
    pub no_archive: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Merge the optional config file with the flags given on the command line.
    pub fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)?,
            None => Config::default(),
        };

        if let Some(root_dir) = self.root_dir {
            config.root_dir = root_dir;
        }
        if let Some(resolution) = self.resolution {
            config.resolution = resolution;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(prompt) = self.prompt {
            config.prompt = prompt;
        }
        if let Some(filter) = self.filter {
            config.filter = filter;
        }
        if let Some(quality) = self.jpeg_quality {
            config.jpeg_quality = quality;
        }
        if let Some(duplicates) = self.duplicates {
            config.duplicates = duplicates;
        }
        if self.overwrite {
            config.output_mode = OutputMode::Overwrite;
        }
        if self.no_archive {
            config.archive = false;
        }

        config.validate()?;
        Ok(config)
    }
}
