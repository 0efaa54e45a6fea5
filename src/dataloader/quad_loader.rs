use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::dataloader::{
    sort_paths, DuplicatePolicy, GroupOutcome, ResolvedSample, Role, RoleKeywords, SampleGroup,
};
use crate::error::{PrepError, Result};
use crate::writer::MANIFEST_FILE;

/// Counters gathered while walking the source tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub directories: usize,
    pub complete_groups: usize,
    pub incomplete_groups: usize,
    pub rejected_groups: usize,
    pub samples: usize,
}

/// Lazily walks a source tree and yields one [`ResolvedSample`] per reference file
/// of every complete directory.
///
/// Directories are visited depth-first in file-name order, so two walks over the
/// same tree yield the same sequence.
pub struct QuadLoader {
    root: PathBuf,
    keywords: RoleKeywords,
    policy: DuplicatePolicy,
    walker: walkdir::IntoIter,
    /// Files and directories a run writes; never read back as sources.
    excluded: Vec<PathBuf>,
    pending: VecDeque<ResolvedSample>,
    stats: DiscoveryStats,
}

impl QuadLoader {
    pub fn new<P: AsRef<Path>>(
        root: P,
        keywords: RoleKeywords,
        policy: DuplicatePolicy,
    ) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PrepError::RootNotFound(root.to_path_buf()));
        }
        let root = fs::canonicalize(root).map_err(PrepError::io(root))?;

        Ok(Self {
            walker: Self::walker(&root),
            root,
            keywords,
            policy,
            excluded: Vec::new(),
            pending: VecDeque::new(),
            stats: DiscoveryStats::default(),
        })
    }

    fn walker(root: &Path) -> walkdir::IntoIter {
        WalkDir::new(root).sort_by_file_name().into_iter()
    }

    /// Skip the role directories, archives and manifest written under `output_dir`,
    /// so an output directory inside the source tree is not scanned on later runs.
    pub fn excluding_outputs(mut self, output_dir: &Path) -> Self {
        self.excluded = match fs::canonicalize(output_dir) {
            Ok(dir) => Role::ALL
                .iter()
                .flat_map(|role| {
                    [
                        dir.join(role.as_str()),
                        dir.join(format!("{}.zip", role.as_str())),
                    ]
                })
                .chain([dir.join(MANIFEST_FILE)])
                .collect(),
            Err(_) => Vec::new(),
        };
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|excluded| excluded == path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> DiscoveryStats {
        self.stats
    }

    /// Restart the walk from the root, clearing the counters.
    pub fn reset(&mut self) {
        self.walker = Self::walker(&self.root);
        self.pending.clear();
        self.stats = DiscoveryStats::default();
    }

    /// Files directly inside `dir`, in name order.
    fn list_files(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && !self.is_excluded(path))
            .collect();
        sort_paths(&mut files);
        Ok(files)
    }

    fn scan_dir(&mut self, dir: &Path) -> Result<()> {
        let files = match self.list_files(dir) {
            Ok(files) => files,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
                return Ok(());
            }
        };
        self.stats.directories += 1;

        let group = SampleGroup::classify(dir, files, &self.keywords);
        match group.resolve(self.policy)? {
            GroupOutcome::Complete(samples) => {
                debug!(dir = %dir.display(), samples = samples.len(), "found complete group");
                self.stats.complete_groups += 1;
                self.pending.extend(samples);
            }
            GroupOutcome::Incomplete(missing) => {
                self.stats.incomplete_groups += 1;
                if group.is_empty() {
                    debug!(dir = %dir.display(), "no role files");
                } else {
                    warn!(dir = %dir.display(), missing = ?missing, "skipping incomplete group");
                }
            }
            GroupOutcome::Rejected(_) => {
                self.stats.rejected_groups += 1;
            }
        }
        Ok(())
    }
}

impl Iterator for QuadLoader {
    type Item = Result<ResolvedSample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(sample) = self.pending.pop_front() {
                self.stats.samples += 1;
                return Some(Ok(sample));
            }

            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if self.is_excluded(entry.path()) {
                debug!(dir = %entry.path().display(), "skipping output directory");
                self.walker.skip_current_dir();
                continue;
            }
            if let Err(err) = self.scan_dir(entry.path()) {
                return Some(Err(err));
            }
        }
    }
}
