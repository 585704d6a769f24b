use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{FileError, PatchError};
use crate::hunk_apply::{self, DEFAULT_SEARCH_WINDOW};
use crate::patch_format::{ApplySummary, FileOutcome, FileStatus, PatchSet, PatchedFile};
use crate::util::{self, DEV_NULL};

/// Where and how a patch set is applied.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Directory the patch paths are resolved against; the current directory when unset.
    pub root: Option<PathBuf>,
    /// Leading path components removed from every patch path.
    pub strip: usize,
    pub search_window: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            root: None,
            strip: 0,
            search_window: DEFAULT_SEARCH_WINDOW,
        }
    }
}

impl ApplyOptions {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_strip(mut self, strip: usize) -> Self {
        self.strip = strip;
        self
    }

    pub fn with_search_window(mut self, lines: usize) -> Self {
        self.search_window = lines;
        self
    }
}

impl PatchSet {
    /// Apply every file of the set. True only if every hunk of every file applied.
    pub fn apply(&self, root: Option<&Path>, strip: usize) -> bool {
        let options = ApplyOptions {
            root: root.map(Path::to_path_buf),
            strip,
            ..ApplyOptions::default()
        };
        self.apply_with(&options).is_ok_and(|s| s.is_success())
    }

    /// Undo a previously applied set. True only if every hunk of every file reverted.
    pub fn revert(&self, root: Option<&Path>, strip: usize) -> bool {
        let options = ApplyOptions {
            root: root.map(Path::to_path_buf),
            strip,
            ..ApplyOptions::default()
        };
        self.revert_with(&options).is_ok_and(|s| s.is_success())
    }

    pub fn apply_with(&self, options: &ApplyOptions) -> Result<ApplySummary, PatchError> {
        self.ensure_usable()?;
        Ok(patch_files(&self.files, options))
    }

    pub fn revert_with(&self, options: &ApplyOptions) -> Result<ApplySummary, PatchError> {
        self.ensure_usable()?;
        Ok(patch_files(&self.reversed().files, options))
    }
}

/// Apply entries, one file per task. Entries that resolve to the same path stay in one task
/// and run in patch order.
fn patch_files(files: &[PatchedFile], options: &ApplyOptions) -> ApplySummary {
    let mut unresolved = Vec::new();
    let mut groups: BTreeMap<PathBuf, Vec<(usize, &PatchedFile)>> = BTreeMap::new();
    for (index, entry) in files.iter().enumerate() {
        match resolve(entry, options) {
            Some(path) => groups.entry(path).or_default().push((index, entry)),
            None => unresolved.push(FileOutcome {
                index,
                path: None,
                result: Err(FileError::NoPath),
            }),
        }
    }

    let mut outcomes: Vec<FileOutcome> = groups
        .into_par_iter()
        .flat_map_iter(|(path, entries)| {
            entries
                .into_iter()
                .map(|(index, entry)| {
                    let result = patch_file(entry, &path, options.search_window);
                    match &result {
                        Ok(status) => info!(path = %path.display(), ?status, "file done"),
                        Err(err) => warn!(path = %path.display(), "{err}"),
                    }
                    FileOutcome {
                        index,
                        path: Some(path.clone()),
                        result,
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    outcomes.extend(unresolved);
    outcomes.sort_by_key(|o| o.index);
    ApplySummary::from_outcomes(outcomes)
}

/// Pick the on-disk file for an entry: the target name first, then the source name; the
/// first that exists wins, otherwise the first candidate is created.
fn resolve(entry: &PatchedFile, options: &ApplyOptions) -> Option<PathBuf> {
    let base = options.root.clone().unwrap_or_default();
    let candidates: Vec<PathBuf> = [&entry.target, &entry.source]
        .into_iter()
        .filter(|name| name.as_str() != DEV_NULL)
        .map(|name| base.join(util::strip_components(name, options.strip)))
        .collect();

    candidates
        .iter()
        .find(|p| p.exists())
        .or(candidates.first())
        .cloned()
}

fn patch_file(entry: &PatchedFile, path: &Path, window: usize) -> Result<FileStatus, FileError> {
    let existed = path.exists();
    let original = if existed {
        if !path.is_file() {
            return Err(FileError::NotAFile(path.to_path_buf()));
        }
        util::read_file(path).map_err(|source| FileError::Read {
            path: path.to_path_buf(),
            source,
        })?
    } else if entry.only_adds() {
        Vec::new()
    } else if entry.is_deleted_file() {
        warn!(path = %path.display(), "already deleted");
        return Ok(FileStatus::AlreadyPatched);
    } else {
        return Err(FileError::NotFound(path.to_path_buf()));
    };

    if entry.is_new_file() && !original.is_empty() {
        return if entry.is_applied_to(&original) {
            warn!(path = %path.display(), "already patched");
            Ok(FileStatus::AlreadyPatched)
        } else {
            Err(FileError::AlreadyExists(path.to_path_buf()))
        };
    }

    let lines = hunk_apply::split_lines(&original);
    let patched = hunk_apply::apply_hunks(lines.clone(), &entry.hunks, window);

    if !patched.is_clean() {
        if hunk_apply::is_applied(&lines, &entry.hunks, window) {
            warn!(path = %path.display(), "already patched");
            return Ok(FileStatus::AlreadyPatched);
        }
        let hunks: Vec<usize> = patched.failed.iter().map(|i| i + 1).collect();
        if patched.failed.len() < entry.hunks.len() {
            // Keep the hunks that did apply.
            write(path, &hunk_apply::join_lines(&patched.lines))?;
        }
        return Err(FileError::HunkMismatch {
            path: path.to_path_buf(),
            hunks,
        });
    }

    if entry.is_deleted_file() {
        if patched.lines.is_empty() {
            std::fs::remove_file(path).map_err(|source| FileError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            return Ok(FileStatus::Deleted);
        }
        warn!(path = %path.display(), "not deleting file, content remains after patching");
    }

    if !existed {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| FileError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    write(path, &hunk_apply::join_lines(&patched.lines))?;

    Ok(if existed {
        FileStatus::Patched
    } else {
        FileStatus::Created
    })
}

fn write(path: &Path, data: &[u8]) -> Result<(), FileError> {
    util::write_atomic(path, data).map_err(|source| FileError::Write {
        path: path.to_path_buf(),
        source,
    })
}
