use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PatchError;
use crate::hunk_apply::{self, DEFAULT_SEARCH_WINDOW};
use crate::patch_format::{PatchSet, PatchedFile};
use crate::util::{self, DEV_NULL};

/// Answer to "can this file be patched by this patch set?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanPatch {
    Yes,
    No,
    /// No entry declares the file as its source, or the file does not exist.
    NotFound,
}

impl PatchSet {
    pub(crate) fn ensure_usable(&self) -> Result<(), PatchError> {
        if self.errors > 0 {
            return Err(PatchError::Unusable {
                errors: self.errors,
            });
        }
        Ok(())
    }

    /// Check whether `file` holds the content the hunks of its entry expect. With `index`
    /// only that entry is considered.
    pub fn can_patch(
        &self,
        file: impl AsRef<Path>,
        index: Option<usize>,
    ) -> Result<CanPatch, PatchError> {
        self.ensure_usable()?;
        let file = file.as_ref();

        let entry = match index {
            Some(i) => self.files.get(i).filter(|e| e.declares_source(file)),
            None => self.files.iter().find(|e| e.declares_source(file)),
        };
        let Some(entry) = entry else {
            debug!(file = %file.display(), "no patch entry has this file as its source");
            return Ok(CanPatch::NotFound);
        };

        let content = match util::read_file(file) {
            Ok(content) => content,
            Err(err) => {
                debug!(file = %file.display(), error = %err, "cannot read file");
                return Ok(CanPatch::NotFound);
            }
        };
        Ok(if entry.can_patch_content(&content) {
            CanPatch::Yes
        } else {
            CanPatch::No
        })
    }
}

impl PatchedFile {
    /// True when this entry names `file` as its source. Relative paths are compared lexically;
    /// absolute ones against the source resolved from the current directory.
    pub fn declares_source(&self, file: &Path) -> bool {
        if self.source == DEV_NULL {
            return false;
        }
        let wanted = util::normalize(&file.to_string_lossy());
        if !util::is_absolute(&wanted) {
            return wanted == self.source;
        }
        match std::env::current_dir() {
            Ok(cwd) => {
                let resolved: PathBuf = cwd.join(&self.source);
                util::normalize(&resolved.to_string_lossy()) == wanted
            }
            Err(_) => false,
        }
    }

    /// True when `content` is the pre-patch state the hunks expect.
    pub fn can_patch_content(&self, content: &[u8]) -> bool {
        let lines = hunk_apply::split_lines(content);
        hunk_apply::apply_hunks(lines, &self.hunks, DEFAULT_SEARCH_WINDOW).is_clean()
    }

    /// True when `content` already holds the post-patch state.
    pub fn is_applied_to(&self, content: &[u8]) -> bool {
        let lines = hunk_apply::split_lines(content);
        hunk_apply::is_applied(&lines, &self.hunks, DEFAULT_SEARCH_WINDOW)
    }
}
