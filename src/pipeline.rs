use std::path::PathBuf;

use tracing::info;

use crate::archive::archive_role;
use crate::dataloader::{DiscoveryStats, QuadLoader, Role};
use crate::error::Result;
use crate::normalizer::Normalizer;
use crate::writer::DatasetWriter;
use crate::Config;

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Index given to the first sample of this run.
    pub start_index: u64,
    /// Samples written by this run.
    pub samples: u64,
    pub stats: DiscoveryStats,
    pub archives: Vec<PathBuf>,
}

/// Drives discovery, normalization and writing for one run.
pub struct Pipeline {
    config: Config,
    normalizer: Normalizer,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let normalizer = Normalizer::new(config.resolution, config.filter)?;
        Ok(Self { config, normalizer })
    }

    pub fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        let loader = QuadLoader::new(&config.root_dir, config.keywords.clone(), config.duplicates)?;
        let mut writer = DatasetWriter::open(
            &config.output_dir,
            config.output_mode,
            config.prompt.as_str(),
            config.jpeg_quality,
        )?;
        let mut loader = loader.excluding_outputs(writer.output_dir());

        info!(
            root = %loader.root().display(),
            output = %config.output_dir.display(),
            resolution = config.resolution,
            "processing dataset"
        );

        for sample in loader.by_ref() {
            let sample = sample?;
            let normalized = self.normalizer.normalize_sample(&sample)?;
            writer.write_sample(&normalized)?;

            let written = writer.written();
            if config.log_interval > 0 && written % config.log_interval as u64 == 0 {
                info!(samples = written, "progress");
            }
        }

        let stats = loader.stats();
        info!(
            samples = writer.written(),
            directories = stats.directories,
            complete = stats.complete_groups,
            incomplete = stats.incomplete_groups,
            rejected = stats.rejected_groups,
            "Finished processing the dataset"
        );

        let mut archives = Vec::new();
        if config.archive {
            for role in Role::ALL {
                archives.push(archive_role(writer.output_dir(), role)?);
            }
            info!("Archived all the directories");
        }

        Ok(RunSummary {
            start_index: writer.start_index(),
            samples: writer.written(),
            stats,
            archives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ManifestEntry, OutputMode, MANIFEST_FILE};
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn rgb(path: &Path, width: u32, height: u32, color: [u8; 3]) -> anyhow::Result<()> {
        RgbImage::from_pixel(width, height, Rgb(color)).save(path)?;
        Ok(())
    }

    /// `flawless_a` is 100x50, so it is padded by 25 rows top and bottom.
    fn sample_tree(root: &Path) -> anyhow::Result<()> {
        let dir = root.join("sample1");
        fs::create_dir_all(&dir)?;
        rgb(&dir.join("flawless_a.png"), 100, 50, [30, 160, 30])?;
        rgb(&dir.join("distorted_a.png"), 100, 50, [160, 30, 30])?;
        DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 50, Luma([255])))
            .save(dir.join("mask_a.png"))?;
        rgb(&dir.join("reference_a.png"), 50, 80, [20, 20, 180])?;
        rgb(&dir.join("reference_b.png"), 80, 80, [180, 180, 20])?;

        let partial = root.join("sample2");
        fs::create_dir_all(&partial)?;
        rgb(&partial.join("flawless_x.png"), 10, 10, [0, 0, 0])?;
        rgb(&partial.join("distorted_x.png"), 10, 10, [0, 0, 0])?;
        Ok(())
    }

    fn config(root: &Path, output: &Path) -> Config {
        Config {
            root_dir: root.to_path_buf(),
            output_dir: output.to_path_buf(),
            resolution: 64,
            ..Default::default()
        }
    }

    fn close(pixel: &Rgb<u8>, expected: [u8; 3]) -> bool {
        pixel
            .0
            .iter()
            .zip(expected)
            .all(|(actual, expected)| actual.abs_diff(expected) <= 40)
    }

    #[test]
    fn test_end_to_end_run() -> anyhow::Result<()> {
        let source = TempDir::new()?;
        let output = TempDir::new()?;
        sample_tree(source.path())?;

        let summary = Pipeline::new(config(source.path(), output.path()))?.run()?;
        assert_eq!(summary.start_index, 0);
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.stats.complete_groups, 1);
        assert_eq!(summary.stats.incomplete_groups, 2);
        assert_eq!(summary.archives.len(), 4);

        for role in Role::ALL {
            let mut names = Vec::new();
            for entry in fs::read_dir(output.path().join(role.as_str()))? {
                names.push(entry?.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            assert_eq!(names, vec!["0.jpg", "1.jpg"]);
            assert!(output.path().join(format!("{}.zip", role.as_str())).is_file());

            for index in 0..2 {
                let image = image::open(output.path().join(format!("{}/{index}.jpg", role.as_str())))?;
                assert_eq!((image.width(), image.height()), (64, 64));
            }
        }

        let manifest = fs::read_to_string(output.path().join(MANIFEST_FILE))?;
        let entries: Vec<ManifestEntry> = manifest
            .lines()
            .map(|line| serde_json::from_str(line))
            .collect::<Result<_, _>>()?;
        assert_eq!(
            entries,
            vec![
                ManifestEntry::new(crate::DEFAULT_PROMPT, 0),
                ManifestEntry::new(crate::DEFAULT_PROMPT, 1),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_padding_colors_per_role() -> anyhow::Result<()> {
        let source = TempDir::new()?;
        let output = TempDir::new()?;
        sample_tree(source.path())?;
        Pipeline::new(config(source.path(), output.path()))?.run()?;

        let open = |role: Role, index: u32| -> anyhow::Result<RgbImage> {
            Ok(image::open(output.path().join(format!("{}/{index}.jpg", role.as_str())))?.to_rgb8())
        };

        let mask = open(Role::Mask, 0)?;
        assert!(close(mask.get_pixel(0, 0), [0, 0, 0]));
        assert!(close(mask.get_pixel(32, 32), [255, 255, 255]));

        let flawless = open(Role::Flawless, 0)?;
        assert!(close(flawless.get_pixel(0, 0), [255, 255, 255]));
        assert!(close(flawless.get_pixel(63, 63), [255, 255, 255]));
        assert!(close(flawless.get_pixel(32, 32), [30, 160, 30]));

        // The two samples share everything but the reference.
        assert_eq!(open(Role::Distorted, 0)?, open(Role::Distorted, 1)?);
        let reference_a = open(Role::Reference, 0)?;
        let reference_b = open(Role::Reference, 1)?;
        assert!(close(reference_a.get_pixel(0, 32), [255, 255, 255]));
        assert!(close(reference_b.get_pixel(0, 32), [180, 180, 20]));
        Ok(())
    }

    #[test]
    fn test_rerun_continues_indexing() -> anyhow::Result<()> {
        let source = TempDir::new()?;
        let output = TempDir::new()?;
        sample_tree(source.path())?;

        let mut config = config(source.path(), output.path());
        config.archive = false;
        Pipeline::new(config.clone())?.run()?;
        let second = Pipeline::new(config.clone())?.run()?;
        assert_eq!(second.start_index, 2);
        assert!(output.path().join("flawless/3.jpg").is_file());
        assert!(second.archives.is_empty());

        config.output_mode = OutputMode::Overwrite;
        let third = Pipeline::new(config)?.run()?;
        assert_eq!(third.start_index, 0);
        assert!(!output.path().join("flawless/2.jpg").exists());
        let lines = fs::read_to_string(output.path().join(MANIFEST_FILE))?.lines().count();
        assert_eq!(lines, 2);
        Ok(())
    }

    #[test]
    fn test_decode_failure_aborts_without_partial_sample() -> anyhow::Result<()> {
        let source = TempDir::new()?;
        let output = TempDir::new()?;
        sample_tree(source.path())?;
        fs::write(source.path().join("sample1/reference_b.png"), b"corrupt")?;

        let result = Pipeline::new(config(source.path(), output.path()))?.run();
        assert!(matches!(result, Err(crate::PrepError::Decode { .. })));

        assert!(output.path().join("reference/0.jpg").is_file());
        assert!(!output.path().join("flawless/1.jpg").exists());
        let lines = fs::read_to_string(output.path().join(MANIFEST_FILE))?.lines().count();
        assert_eq!(lines, 1);
        Ok(())
    }

    #[test]
    fn test_empty_tree() -> anyhow::Result<()> {
        let source = TempDir::new()?;
        let output = TempDir::new()?;

        let mut config = config(source.path(), output.path());
        config.archive = false;
        let summary = Pipeline::new(config)?.run()?;
        assert_eq!(summary.samples, 0);
        assert_eq!(fs::read_to_string(output.path().join(MANIFEST_FILE))?, "");
        Ok(())
    }

    #[test]
    fn test_output_inside_source_tree_is_not_rescanned() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        sample_tree(root.path())?;

        let config = config(root.path(), root.path());
        let first = Pipeline::new(config.clone())?.run()?;
        assert_eq!(first.samples, 2);
        assert!(root.path().join("reference.zip").is_file());

        let second = Pipeline::new(config)?.run()?;
        assert_eq!(second.start_index, 2);
        assert_eq!(second.samples, 2);
        assert_eq!(second.stats.complete_groups, 1);
        let lines = fs::read_to_string(root.path().join(MANIFEST_FILE))?.lines().count();
        assert_eq!(lines, 4);
        Ok(())
    }
}
