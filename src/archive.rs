//! Packs each role directory into a zip bundle next to it.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::dataloader::Role;
use crate::error::{PrepError, Result};

/// Write `{output_dir}/{role}.zip` holding `{role}/` and its images in index order.
pub fn archive_role(output_dir: &Path, role: Role) -> Result<PathBuf> {
    let source = output_dir.join(role.as_str());
    let archive_path = output_dir.join(format!("{}.zip", role.as_str()));

    let mut entries: Vec<(u64, PathBuf)> = fs::read_dir(&source)
        .map_err(PrepError::io(&source))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .map(|path| (index_of(&path), path))
        .collect();
    entries.sort();

    let file = File::create(&archive_path).map_err(PrepError::io(&archive_path))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.add_directory(format!("{}/", role.as_str()), options)?;
    for (_, path) in &entries {
        let Some(name) = path.file_name() else {
            continue;
        };
        zip.start_file(format!("{}/{}", role.as_str(), name.to_string_lossy()), options)?;
        let mut input = File::open(path).map_err(PrepError::io(path))?;
        io::copy(&mut input, &mut zip).map_err(PrepError::io(path))?;
    }
    zip.finish()?;

    info!(archive = %archive_path.display(), files = entries.len(), "archived directory");
    Ok(archive_path)
}

/// Numeric stem for `{index}.jpg`; anything else sorts last.
fn index_of(path: &Path) -> u64 {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse().ok())
        .unwrap_or(u64::MAX)
}
