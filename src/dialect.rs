use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::patch_format::{Dialect, PatchedFile};
use crate::util::{self, DEV_NULL};

static HG_DIFF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^diff -r [0-9a-fA-F]{12,} ").expect("invalid regex"));

const SVN_RULE_WIDTH: usize = 67;

/// Classify one file entry by its header lines. `document_start` is the first header line of
/// the whole document, where Mercurial puts its changeset banner.
pub fn detect_file(file: &PatchedFile, document_start: Option<&str>) -> Dialect {
    let header = &file.header;

    if let [.., index, rule] = header.as_slice() {
        if index.starts_with("Index: ") && rule.starts_with(&"=".repeat(SVN_RULE_WIDTH)) {
            return Dialect::Svn;
        }
    }

    let hg_banner = document_start.is_some_and(|l| l.starts_with("# HG changeset patch"));
    let hg_plain = header.last().is_some_and(|l| HG_DIFF_RE.is_match(l));
    if hg_banner || hg_plain {
        return Dialect::Hg;
    }

    if header.iter().any(|l| l.starts_with("diff --git ")) {
        return Dialect::Git;
    }

    Dialect::Plain
}

/// The dialect shared by all files; documents mixing conventions are reported as plain.
pub fn detect_set(files: &[PatchedFile]) -> Dialect {
    let mut dialects = files.iter().map(|f| f.dialect);
    let Some(first) = dialects.next() else {
        return Dialect::Plain;
    };
    if dialects.all(|d| d == first) {
        first
    } else {
        debug!("files use different diff dialects, reporting plain");
        Dialect::Plain
    }
}

/// Turn the names in a file header into safe relative paths. Returns the number of warnings
/// raised while doing so.
pub fn fix_paths(file: &mut PatchedFile, position: usize) -> usize {
    let mut warnings = 0;

    if file.dialect.uses_ab_prefixes() {
        strip_ab_prefix(&mut file.source, "a/");
        strip_ab_prefix(&mut file.target, "b/");
    }

    for path in [&mut file.source, &mut file.target] {
        if *path != DEV_NULL {
            *path = util::normalize(path);
        }
    }

    // Source and target are fixed and counted separately.
    let escapes = |p: &str| p == ".." || p.starts_with("../");
    for (side, path) in [("source", &mut file.source), ("target", &mut file.target)] {
        if escapes(path.as_str()) {
            warn!(file = position, side, "stripping parent path references");
            warnings += 1;
            while escapes(path.as_str()) {
                *path = path[2..].trim_start_matches('/').to_string();
            }
        }
    }

    let absolute = |p: &str| p != DEV_NULL && util::is_absolute(p);
    if absolute(&file.source) || absolute(&file.target) {
        warn!(file = position, "absolute paths are not allowed, stripping root");
        warnings += 1;
        for path in [&mut file.source, &mut file.target] {
            if absolute(path.as_str()) {
                *path = util::strip_drive_prefix(path).to_string();
            }
        }
    }

    warnings
}

fn strip_ab_prefix(path: &mut String, prefix: &str) {
    if *path == DEV_NULL {
        return;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => *path = rest.to_string(),
        None => debug!(path = %path, prefix, "path lacks the expected dialect prefix"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_header(header: &[&str]) -> PatchedFile {
        PatchedFile {
            source: "a/x".to_string(),
            target: "b/x".to_string(),
            header: header.iter().map(|l| format!("{l}\n")).collect(),
            hunks: Vec::new(),
            dialect: Dialect::Plain,
        }
    }

    #[test]
    fn test_detect_svn() {
        let rule = "=".repeat(67);
        let file = file_with_header(&["Index: x", &rule]);
        assert_eq!(detect_file(&file, None), Dialect::Svn);
    }

    #[test]
    fn test_detect_git() {
        let file = file_with_header(&["diff --git a/x b/x", "index 1234567..89abcde 100644"]);
        assert_eq!(detect_file(&file, None), Dialect::Git);
    }

    #[test]
    fn test_detect_hg_plain_and_exported() {
        let plain = file_with_header(&["diff -r b2d9961ff1f5 x"]);
        assert_eq!(detect_file(&plain, None), Dialect::Hg);

        let exported = file_with_header(&[
            "# HG changeset patch",
            "# User someone",
            "diff --git a/x b/x",
        ]);
        assert_eq!(detect_file(&exported, Some("# HG changeset patch\n")), Dialect::Hg);
    }

    #[test]
    fn test_detect_plain() {
        assert_eq!(detect_file(&file_with_header(&[]), None), Dialect::Plain);
        assert_eq!(detect_file(&file_with_header(&["some commentary"]), None), Dialect::Plain);
    }

    #[test]
    fn test_mixed_set_is_plain() {
        let mut git = file_with_header(&[]);
        git.dialect = Dialect::Git;
        let mut svn = file_with_header(&[]);
        svn.dialect = Dialect::Svn;
        assert_eq!(detect_set(&[git.clone(), git.clone()]), Dialect::Git);
        assert_eq!(detect_set(&[git, svn]), Dialect::Plain);
        assert_eq!(detect_set(&[]), Dialect::Plain);
    }

    #[test]
    fn test_fix_paths_strips_git_prefixes() {
        let mut file = file_with_header(&[]);
        file.dialect = Dialect::Git;
        assert_eq!(fix_paths(&mut file, 0), 0);
        assert_eq!(file.source, "x");
        assert_eq!(file.target, "x");
    }

    #[test]
    fn test_fix_paths_absolute_and_parent() {
        let mut file = file_with_header(&[]);
        file.source = "c:\\winnt\\tests\\run_tests.py".to_string();
        file.target = "/winnt/tests/run_tests.py".to_string();
        assert_eq!(fix_paths(&mut file, 0), 1);
        assert_eq!(file.source, "winnt/tests/run_tests.py");
        assert_eq!(file.target, "winnt/tests/run_tests.py");

        let mut file = file_with_header(&[]);
        file.source = "../../patch.py".to_string();
        file.target = "../patch.py".to_string();
        assert_eq!(fix_paths(&mut file, 1), 2);
        assert_eq!(file.source, "patch.py");
        assert_eq!(file.target, "patch.py");
    }

    #[test]
    fn test_fix_paths_counts_parent_references_per_side() {
        let mut file = file_with_header(&[]);
        file.source = "../patch.py".to_string();
        file.target = "patch.py".to_string();
        assert_eq!(fix_paths(&mut file, 0), 1);
        assert_eq!(file.source, "patch.py");
    }

    #[test]
    fn test_fix_paths_keeps_dev_null() {
        let mut file = file_with_header(&[]);
        file.dialect = Dialect::Git;
        file.source = DEV_NULL.to_string();
        assert_eq!(fix_paths(&mut file, 0), 0);
        assert_eq!(file.source, DEV_NULL);
        assert_eq!(file.target, "x");
    }
}
