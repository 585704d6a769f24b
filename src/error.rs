use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop a whole operation on a [`PatchSet`](crate::PatchSet).
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch set has {errors} parse error(s) and cannot be applied")]
    Unusable { errors: usize },
    #[error("failed to read patch from {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why one file of a patch set could not be patched.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("patch entry names no file on either side")]
    NoPath,
    #[error("no file to patch: {}", .0.display())]
    NotFound(PathBuf),
    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("refusing to create {}: file exists with different content", .0.display())]
    AlreadyExists(PathBuf),
    #[error("hunk(s) {} do not match {}", join_hunks(.hunks), .path.display())]
    HunkMismatch { path: PathBuf, hunks: Vec<usize> },
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join_hunks(hunks: &[usize]) -> String {
    hunks
        .iter()
        .map(|n| format!("#{n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hunk_mismatch_lists_hunk_numbers() {
        let err = FileError::HunkMismatch {
            path: PathBuf::from("src/lib.rs"),
            hunks: vec![2, 4],
        };
        assert_eq!(err.to_string(), "hunk(s) #2, #4 do not match src/lib.rs");
    }

    #[test]
    fn test_unusable_mentions_error_count() {
        let err = PatchError::Unusable { errors: 3 };
        assert!(err.to_string().contains("3 parse error(s)"));
    }
}
