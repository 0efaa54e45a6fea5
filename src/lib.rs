use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub mod archive;
pub mod cli;
pub mod dataloader;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod writer;

pub use dataloader::{DuplicatePolicy, QuadLoader, ResolvedSample, Role, RoleKeywords};
pub use error::PrepError;
pub use normalizer::{Normalizer, ResizeFilter};
pub use pipeline::{Pipeline, RunSummary};
pub use writer::{DatasetWriter, ManifestEntry, OutputMode};

/// Caption written into every manifest entry unless overridden.
pub const DEFAULT_PROMPT: &str = "high quality, detailed, professional photograph of a woman standing";

/// Configuration for a preparation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub root_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Side length of every output image.
    pub resolution: u32,
    pub prompt: String,
    pub keywords: RoleKeywords,
    pub duplicates: DuplicatePolicy,
    pub filter: ResizeFilter,
    pub jpeg_quality: u8,
    pub output_mode: OutputMode,
    /// Pack each role directory into `{role}.zip` after the run.
    pub archive: bool,
    /// Log progress every this many samples; 0 disables.
    pub log_interval: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            output_dir: PathBuf::from("."),
            resolution: 512,
            prompt: DEFAULT_PROMPT.to_string(),
            keywords: RoleKeywords::default(),
            duplicates: DuplicatePolicy::default(),
            filter: ResizeFilter::default(),
            jpeg_quality: 75,
            output_mode: OutputMode::default(),
            archive: true,
            log_interval: 100,
        }
    }
}

impl Config {
    /// Load a JSON config; missing fields take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PrepError> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(PrepError::InvalidConfig("root directory is required".to_string()));
        }
        if self.resolution == 0 {
            return Err(PrepError::InvalidConfig("resolution must be positive".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PrepError::InvalidConfig(format!(
                "jpeg quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        self.keywords.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.prompt, DEFAULT_PROMPT);
        assert_eq!(config.jpeg_quality, 75);
        assert_eq!(config.output_mode, OutputMode::Continue);
        assert!(config.archive);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config {
            root_dir: PathBuf::from("data"),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.resolution = 0;
        assert!(config.validate().is_err());

        config.resolution = 64;
        config.jpeg_quality = 101;
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_load_partial_config() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("prep.json");
        fs::write(
            &path,
            r#"{
                "root_dir": "raw",
                "resolution": 256,
                "duplicates": "reject",
                "filter": "lanczos3",
                "output_mode": "overwrite",
                "keywords": { "mask": "m_" }
            }"#,
        )?;

        let config = Config::load_from_file(&path)?;
        assert_eq!(config.root_dir, PathBuf::from("raw"));
        assert_eq!(config.resolution, 256);
        assert_eq!(config.duplicates, DuplicatePolicy::Reject);
        assert_eq!(config.filter, ResizeFilter::Lanczos3);
        assert_eq!(config.output_mode, OutputMode::Overwrite);
        assert_eq!(config.keywords.mask, "m_");
        assert_eq!(config.keywords.flawless, "flawless");
        assert_eq!(config.jpeg_quality, 75);
        Ok(())
    }
}
