//! Atomic publication of per-commit results.
//!
//! Artifacts are copied into `results/temp/<commit>/` and the directory is
//! then renamed to `results/new/<commit>/`. The rename is the only signal
//! downstream listeners watch for: they see either no directory or a complete
//! one, never a partial copy.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::artifacts::ArtifactKinds;
use crate::core::types::CommitId;
use crate::io::paths::WorkPaths;

/// A completed publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub dir: PathBuf,
    /// Published files, sorted by name.
    pub files: Vec<PathBuf>,
}

/// Moves staged results into their externally visible location.
#[derive(Debug, Clone)]
pub struct ResultPublisher {
    paths: WorkPaths,
}

impl ResultPublisher {
    pub fn new(paths: &WorkPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    /// Publish `commit`'s artifacts found in `source_dir`.
    ///
    /// Overwrites an earlier publication of the same commit. A commit that
    /// produced no matching files is published as an empty directory.
    #[instrument(skip_all, fields(commit = %commit.short()))]
    pub fn publish(
        &self,
        commit: &CommitId,
        source_dir: &Path,
        kinds: &ArtifactKinds,
    ) -> Result<Published> {
        let published = self.paths.published_for(commit);
        let staging = self.paths.staging_for(commit);

        remove_dir_if_exists(&published)?;
        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging)
            .with_context(|| format!("create staging dir {}", staging.display()))?;

        let sources = collect_artifacts(commit, source_dir, kinds)?;
        if sources.is_empty() {
            warn!(source = %source_dir.display(), "no artifacts found for commit");
        }
        let mut files = Vec::with_capacity(sources.len());
        for source in &sources {
            let name = source
                .file_name()
                .with_context(|| format!("artifact without file name {}", source.display()))?;
            fs::copy(source, staging.join(name))
                .with_context(|| format!("copy {} to staging", source.display()))?;
            files.push(published.join(name));
        }

        let published_root = &self.paths.published_dir;
        fs::create_dir_all(published_root)
            .with_context(|| format!("create {}", published_root.display()))?;
        fs::rename(&staging, &published).with_context(|| {
            format!(
                "promote {} to {}",
                staging.display(),
                published.display()
            )
        })?;

        info!(dir = %published.display(), files = files.len(), "results published");
        Ok(Published {
            dir: published,
            files,
        })
    }

    /// Remove every staging directory. None can be valid across invocations.
    pub fn sweep_staging(&self) -> Result<usize> {
        let staging_root = &self.paths.staging_dir;
        if !staging_root.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(staging_root)
            .with_context(|| format!("read {}", staging_root.display()))?
        {
            let entry = entry.context("read entry")?;
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("remove stale staging {}", path.display()))?;
            } else {
                fs::remove_file(&path)
                    .with_context(|| format!("remove stale staging {}", path.display()))?;
            }
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "removed stale staging directories");
        }
        Ok(removed)
    }
}

/// Artifact files of `commit` in `dir`, sorted by name. A missing directory
/// yields no artifacts.
pub fn collect_artifacts(
    commit: &CommitId,
    dir: &Path,
    kinds: &ArtifactKinds,
) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "artifact directory missing");
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if kinds.matches(commit, name) && entry.path().is_file() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!(dir = %dir.display(), "removing previous directory");
        fs::remove_dir_all(dir).with_context(|| format!("remove {}", dir.display()))?;
    }
    Ok(())
}
