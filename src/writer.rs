use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataloader::Role;
use crate::error::{PrepError, Result};
use crate::normalizer::NormalizedSample;

pub const MANIFEST_FILE: &str = "train.jsonl";

/// How a run treats outputs left behind by an earlier run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Append after the last sample recorded in the manifest.
    #[default]
    Continue,
    /// Delete prior images, archives and manifest, then start at index 0.
    Overwrite,
}

/// One line of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub prompt: String,
    pub flawless: String,
    pub distorted: String,
    pub mask: String,
    pub reference: String,
}

impl ManifestEntry {
    pub fn new(prompt: &str, index: u64) -> Self {
        Self {
            prompt: prompt.to_string(),
            flawless: relative_path(Role::Flawless, index),
            distorted: relative_path(Role::Distorted, index),
            mask: relative_path(Role::Mask, index),
            reference: relative_path(Role::Reference, index),
        }
    }
}

/// `{role}/{index}.jpg`, relative to the output directory.
pub fn relative_path(role: Role, index: u64) -> String {
    format!("{}/{}.jpg", role.as_str(), index)
}

/// Writes normalized samples under shared indices and keeps the manifest in step.
pub struct DatasetWriter {
    output_dir: PathBuf,
    prompt: String,
    jpeg_quality: u8,
    manifest: BufWriter<File>,
    start_index: u64,
    next_index: u64,
}

impl DatasetWriter {
    pub fn open<P: AsRef<Path>>(
        output_dir: P,
        mode: OutputMode,
        prompt: impl Into<String>,
        jpeg_quality: u8,
    ) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        if !(1..=100).contains(&jpeg_quality) {
            return Err(PrepError::InvalidConfig(format!(
                "jpeg quality must be within 1..=100, got {jpeg_quality}"
            )));
        }

        if mode == OutputMode::Overwrite {
            clear_outputs(&output_dir)?;
        }
        for role in Role::ALL {
            let dir = output_dir.join(role.as_str());
            fs::create_dir_all(&dir).map_err(PrepError::io(&dir))?;
        }

        // The manifest is flushed last, so it decides where the run resumes.
        // Image sets past it belong to an interrupted sample and are overwritten.
        let manifest_path = output_dir.join(MANIFEST_FILE);
        let images = existing_samples(&output_dir);
        let start_index = count_manifest_lines(&manifest_path)?;
        if images < start_index {
            return Err(PrepError::ManifestMismatch {
                manifest_lines: start_index,
                images,
            });
        }
        if images > start_index {
            warn!(start_index, images, "overwriting image sets that have no manifest entry");
        }
        if start_index > 0 {
            info!(start_index, "continuing after existing samples");
        }

        let manifest = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest_path)
            .map_err(PrepError::io(&manifest_path))?;

        Ok(Self {
            output_dir,
            prompt: prompt.into(),
            jpeg_quality,
            manifest: BufWriter::new(manifest),
            start_index,
            next_index: start_index,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// Samples written by this writer so far.
    pub fn written(&self) -> u64 {
        self.next_index - self.start_index
    }

    /// Write the four images and the manifest line, returning the index they share.
    /// The index is only consumed once everything for the sample is on disk.
    pub fn write_sample(&mut self, sample: &NormalizedSample) -> Result<u64> {
        let index = self.next_index;
        for role in Role::ALL {
            let path = self.output_dir.join(relative_path(role, index));
            write_jpeg(&path, sample.image(role), self.jpeg_quality)?;
        }

        let manifest_path = self.output_dir.join(MANIFEST_FILE);
        serde_json::to_writer(&mut self.manifest, &ManifestEntry::new(&self.prompt, index))?;
        self.manifest
            .write_all(b"\n")
            .and_then(|()| self.manifest.flush())
            .map_err(PrepError::io(manifest_path))?;

        debug!(index, "wrote sample");
        self.next_index += 1;
        Ok(index)
    }
}

fn write_jpeg(path: &Path, image: &RgbImage, quality: u8) -> Result<()> {
    let file = File::create(path).map_err(PrepError::io(path))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(image)
        .map_err(|source| PrepError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(PrepError::io(path))
}

/// Number of leading indices for which every role already has an image.
fn existing_samples(output_dir: &Path) -> u64 {
    let mut index = 0;
    while Role::ALL
        .iter()
        .all(|role| output_dir.join(relative_path(*role, index)).is_file())
    {
        index += 1;
    }
    index
}

fn count_manifest_lines(path: &Path) -> Result<u64> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(PrepError::io(path)(err)),
    };
    let mut count = 0;
    for line in BufReader::new(file).lines() {
        if !line.map_err(PrepError::io(path))?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

fn clear_outputs(output_dir: &Path) -> Result<()> {
    for role in Role::ALL {
        let dir = output_dir.join(role.as_str());
        if dir.is_dir() {
            fs::remove_dir_all(&dir).map_err(PrepError::io(&dir))?;
        }
        let archive = output_dir.join(format!("{}.zip", role.as_str()));
        if archive.is_file() {
            fs::remove_file(&archive).map_err(PrepError::io(&archive))?;
        }
    }
    let manifest = output_dir.join(MANIFEST_FILE);
    if manifest.is_file() {
        fs::remove_file(&manifest).map_err(PrepError::io(&manifest))?;
    }
    Ok(())
}
