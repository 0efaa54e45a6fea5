use std::fmt;
use std::path::{Path, PathBuf};

use image::Rgb;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PrepError, Result};

pub mod quad_loader;

pub use quad_loader::{DiscoveryStats, QuadLoader};

/// Purpose of a source image within a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Reference,
    Mask,
    Distorted,
    Flawless,
}

impl Role {
    /// Classification check order, also the order roles are processed in.
    pub const ALL: [Role; 4] = [Role::Reference, Role::Mask, Role::Distorted, Role::Flawless];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reference => "reference",
            Role::Mask => "mask",
            Role::Distorted => "distorted",
            Role::Flawless => "flawless",
        }
    }

    /// Canvas color used when letterboxing images of this role.
    pub fn padding(&self) -> Rgb<u8> {
        match self {
            Role::Mask => Rgb([0, 0, 0]),
            _ => Rgb([255, 255, 255]),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filename prefixes that assign a source file to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleKeywords {
    pub flawless: String,
    pub distorted: String,
    pub mask: String,
    pub reference: String,
}

impl Default for RoleKeywords {
    fn default() -> Self {
        Self {
            flawless: Role::Flawless.as_str().to_string(),
            distorted: Role::Distorted.as_str().to_string(),
            mask: Role::Mask.as_str().to_string(),
            reference: Role::Reference.as_str().to_string(),
        }
    }
}

impl RoleKeywords {
    pub fn get(&self, role: Role) -> &str {
        match role {
            Role::Flawless => &self.flawless,
            Role::Distorted => &self.distorted,
            Role::Mask => &self.mask,
            Role::Reference => &self.reference,
        }
    }

    /// First role, in check order, whose keyword prefixes `file_name`.
    pub fn classify(&self, file_name: &str) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| file_name.starts_with(self.get(*role)))
    }

    /// Keywords must be non-empty and must not prefix one another.
    pub fn validate(&self) -> Result<()> {
        for role in Role::ALL {
            let keyword = self.get(role);
            if keyword.is_empty() {
                return Err(PrepError::InvalidConfig(format!(
                    "keyword for role '{role}' is empty"
                )));
            }
            for other in Role::ALL.into_iter().filter(|other| *other != role) {
                if self.get(other).starts_with(keyword) {
                    return Err(PrepError::InvalidConfig(format!(
                        "keyword '{keyword}' for role '{role}' is a prefix of '{}' for role '{other}'",
                        self.get(other)
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Tie-break applied when a directory holds several flawless, distorted or mask files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Keep the last file in name order.
    #[default]
    KeepLast,
    /// Keep the first file in name order.
    KeepFirst,
    /// Skip the whole directory.
    Reject,
    /// Abort the run.
    Error,
}

/// One flattened sample: a single reference paired with the group's other three files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSample {
    pub reference: PathBuf,
    pub mask: PathBuf,
    pub distorted: PathBuf,
    pub flawless: PathBuf,
}

impl ResolvedSample {
    pub fn path(&self, role: Role) -> &Path {
        match role {
            Role::Reference => &self.reference,
            Role::Mask => &self.mask,
            Role::Distorted => &self.distorted,
            Role::Flawless => &self.flawless,
        }
    }
}

/// Files found directly inside one source directory, bucketed by role.
#[derive(Debug, Clone, Default)]
pub struct SampleGroup {
    pub dir: PathBuf,
    pub flawless: Vec<PathBuf>,
    pub distorted: Vec<PathBuf>,
    pub mask: Vec<PathBuf>,
    pub reference: Vec<PathBuf>,
}

/// What a directory contributes once its group is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Complete(Vec<ResolvedSample>),
    /// Roles with no usable file.
    Incomplete(Vec<Role>),
    /// Dropped by [`DuplicatePolicy::Reject`].
    Rejected(Role),
}

impl SampleGroup {
    /// Bucket `files` (expected in name order) by the first matching keyword.
    pub fn classify<I>(dir: &Path, files: I, keywords: &RoleKeywords) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut group = SampleGroup {
            dir: dir.to_path_buf(),
            ..Default::default()
        };
        for path in files {
            let Some(name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
                continue;
            };
            if let Some(role) = keywords.classify(&name) {
                group.bucket_mut(role).push(path);
            }
        }
        group
    }

    pub fn files(&self, role: Role) -> &[PathBuf] {
        match role {
            Role::Flawless => &self.flawless,
            Role::Distorted => &self.distorted,
            Role::Mask => &self.mask,
            Role::Reference => &self.reference,
        }
    }

    fn bucket_mut(&mut self, role: Role) -> &mut Vec<PathBuf> {
        match role {
            Role::Flawless => &mut self.flawless,
            Role::Distorted => &mut self.distorted,
            Role::Mask => &mut self.mask,
            Role::Reference => &mut self.reference,
        }
    }

    pub fn is_empty(&self) -> bool {
        Role::ALL.iter().all(|role| self.files(*role).is_empty())
    }

    /// Pick the single file for a role, applying the duplicate policy.
    fn single(&self, role: Role, policy: DuplicatePolicy) -> Result<Single<'_>> {
        let files = self.files(role);
        if files.len() <= 1 {
            return Ok(files.first().map_or(Single::Missing, Single::Found));
        }
        match policy {
            DuplicatePolicy::KeepLast | DuplicatePolicy::KeepFirst => {
                let (kept, dropped) = if policy == DuplicatePolicy::KeepLast {
                    (&files[files.len() - 1], &files[..files.len() - 1])
                } else {
                    (&files[0], &files[1..])
                };
                warn!(
                    dir = %self.dir.display(),
                    %role,
                    kept = %kept.display(),
                    dropped = ?dropped,
                    "multiple files for role, keeping one"
                );
                Ok(Single::Found(kept))
            }
            DuplicatePolicy::Reject => {
                warn!(
                    dir = %self.dir.display(),
                    %role,
                    files = ?files,
                    "multiple files for role, skipping directory"
                );
                Ok(Single::Duplicate)
            }
            DuplicatePolicy::Error => Err(PrepError::DuplicateRoleFile {
                dir: self.dir.clone(),
                role,
                files: files.to_vec(),
            }),
        }
    }

    /// Apply the completeness predicate and fan out one sample per reference.
    pub fn resolve(&self, policy: DuplicatePolicy) -> Result<GroupOutcome> {
        let mut missing = Vec::new();
        let mut chosen = Vec::with_capacity(3);
        for role in [Role::Mask, Role::Distorted, Role::Flawless] {
            match self.single(role, policy)? {
                Single::Found(path) => chosen.push(path),
                Single::Missing => missing.push(role),
                Single::Duplicate => return Ok(GroupOutcome::Rejected(role)),
            }
        }
        if self.reference.is_empty() {
            missing.insert(0, Role::Reference);
        }
        if !missing.is_empty() {
            return Ok(GroupOutcome::Incomplete(missing));
        }

        let (mask, distorted, flawless) = (chosen[0], chosen[1], chosen[2]);
        let samples = self
            .reference
            .iter()
            .map(|reference| ResolvedSample {
                reference: reference.clone(),
                mask: mask.clone(),
                distorted: distorted.clone(),
                flawless: flawless.clone(),
            })
            .collect();
        Ok(GroupOutcome::Complete(samples))
    }
}

enum Single<'a> {
    Found(&'a PathBuf),
    Missing,
    Duplicate,
}

pub fn sort_paths(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
}
