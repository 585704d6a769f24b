use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

use crate::error::FileError;
use crate::util::DEV_NULL;

/// Header convention of the tool that produced a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Plain,
    Svn,
    Git,
    Hg,
}

impl Dialect {
    /// Git and Mercurial prefix paths with `a/` and `b/`.
    pub fn uses_ab_prefixes(self) -> bool {
        matches!(self, Dialect::Git | Dialect::Hg)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Plain => "plain",
            Dialect::Svn => "svn",
            Dialect::Git => "git",
            Dialect::Hg => "hg",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Context,
    Removed,
    Added,
}

impl LineKind {
    pub fn marker(self) -> u8 {
        match self {
            LineKind::Context => b' ',
            LineKind::Removed => b'-',
            LineKind::Added => b'+',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HunkLine {
    pub kind: LineKind,
    #[serde(serialize_with = "lossy")]
    pub text: Vec<u8>,
    /// `None` for a final line without a newline.
    pub ending: Option<LineEnding>,
}

impl HunkLine {
    /// Length in bytes including the line ending.
    pub fn byte_len(&self) -> usize {
        self.text.len() + self.ending.map_or(0, |e| e.as_bytes().len())
    }
}

/// Which version of the file a hunk block describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Old,
    New,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    pub start_src: usize,
    pub len_src: usize,
    pub start_tgt: usize,
    pub len_tgt: usize,
    pub desc: String,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Lines present in the given version: context plus removed (old) or added (new).
    pub fn block(&self, side: Side) -> impl Iterator<Item = &HunkLine> {
        self.lines.iter().filter(move |l| match side {
            Side::Old => l.kind != LineKind::Added,
            Side::New => l.kind != LineKind::Removed,
        })
    }

    /// Zero-based index where the block starts in the given version. An empty block is an
    /// insertion point after line `start`.
    pub fn anchor(&self, side: Side) -> usize {
        let (start, len) = match side {
            Side::Old => (self.start_src, self.len_src),
            Side::New => (self.start_tgt, self.len_tgt),
        };
        if len == 0 {
            start
        } else {
            start.saturating_sub(1)
        }
    }

    pub fn added(&self) -> usize {
        self.count(LineKind::Added)
    }

    pub fn removed(&self) -> usize {
        self.count(LineKind::Removed)
    }

    fn count(&self, kind: LineKind) -> usize {
        self.lines.iter().filter(|l| l.kind == kind).count()
    }

    /// The hunk that undoes this one.
    pub fn reversed(&self) -> Hunk {
        Hunk {
            start_src: self.start_tgt,
            len_src: self.len_tgt,
            start_tgt: self.start_src,
            len_tgt: self.len_src,
            desc: self.desc.clone(),
            lines: self
                .lines
                .iter()
                .map(|l| HunkLine {
                    kind: match l.kind {
                        LineKind::Added => LineKind::Removed,
                        LineKind::Removed => LineKind::Added,
                        LineKind::Context => LineKind::Context,
                    },
                    ..l.clone()
                })
                .collect(),
        }
    }
}

/// One file's changes within a [`PatchSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchedFile {
    pub source: String,
    pub target: String,
    /// Lines preceding the `---`/`+++` pair, verbatim with their line endings.
    pub header: Vec<String>,
    pub hunks: Vec<Hunk>,
    pub dialect: Dialect,
}

impl PatchedFile {
    pub fn is_new_file(&self) -> bool {
        self.source == DEV_NULL
    }

    pub fn is_deleted_file(&self) -> bool {
        self.target == DEV_NULL
    }

    /// True when every hunk only inserts into an empty region.
    pub fn only_adds(&self) -> bool {
        self.hunks.iter().all(|h| h.len_src == 0)
    }

    /// Name used in reports: the target, or the source for deletions.
    pub fn display_name(&self) -> &str {
        if self.is_deleted_file() {
            &self.source
        } else {
            &self.target
        }
    }

    pub fn reversed(&self) -> PatchedFile {
        PatchedFile {
            source: self.target.clone(),
            target: self.source.clone(),
            header: self.header.clone(),
            hunks: self.hunks.iter().map(Hunk::reversed).collect(),
            dialect: self.dialect,
        }
    }

    /// Write this entry back out as unified diff text.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for line in &self.header {
            out.extend_from_slice(line.as_bytes());
        }
        let (src_prefix, tgt_prefix) = if self.dialect.uses_ab_prefixes() {
            ("a/", "b/")
        } else {
            ("", "")
        };
        let side = |prefix: &str, path: &str| {
            if path == DEV_NULL {
                path.to_string()
            } else {
                format!("{prefix}{path}")
            }
        };
        out.extend_from_slice(format!("--- {}\n", side(src_prefix, &self.source)).as_bytes());
        out.extend_from_slice(format!("+++ {}\n", side(tgt_prefix, &self.target)).as_bytes());

        for hunk in &self.hunks {
            let mut head = format!(
                "@@ -{},{} +{},{} @@",
                hunk.start_src, hunk.len_src, hunk.start_tgt, hunk.len_tgt
            );
            if !hunk.desc.is_empty() {
                head.push(' ');
                head.push_str(&hunk.desc);
            }
            head.push('\n');
            out.extend_from_slice(head.as_bytes());

            for line in &hunk.lines {
                out.push(line.kind.marker());
                out.extend_from_slice(&line.text);
                match line.ending {
                    Some(ending) => out.extend_from_slice(ending.as_bytes()),
                    None => out.extend_from_slice(b"\n\\ No newline at end of file\n"),
                }
            }
        }
    }
}

/// A parsed diff document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchSet {
    pub files: Vec<PatchedFile>,
    pub dialect: Dialect,
    pub errors: usize,
    pub warnings: usize,
}

impl PatchSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchedFile> {
        self.files.iter()
    }

    /// The set with every entry reversed, as used by revert.
    pub fn reversed(&self) -> PatchSet {
        PatchSet {
            files: self.files.iter().map(PatchedFile::reversed).collect(),
            ..self.clone()
        }
    }

    /// Re-emit the set as unified diff text.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for file in &self.files {
            file.write_to(&mut out);
        }
        out
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a PatchedFile;
    type IntoIter = std::slice::Iter<'a, PatchedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Patched,
    Created,
    Deleted,
    AlreadyPatched,
}

/// Result of applying (or reverting) one entry.
#[derive(Debug)]
pub struct FileOutcome {
    /// Position of the entry in the patch set.
    pub index: usize,
    pub path: Option<PathBuf>,
    pub result: Result<FileStatus, FileError>,
}

#[derive(Debug, Default)]
pub struct ApplySummary {
    pub files_patched: usize,
    pub files_created: usize,
    pub files_deleted: usize,
    pub already_patched: usize,
    pub files_failed: usize,
    pub outcomes: Vec<FileOutcome>,
}

impl ApplySummary {
    pub fn from_outcomes(outcomes: Vec<FileOutcome>) -> Self {
        let mut summary = ApplySummary::default();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(FileStatus::Patched) => summary.files_patched += 1,
                Ok(FileStatus::Created) => summary.files_created += 1,
                Ok(FileStatus::Deleted) => summary.files_deleted += 1,
                Ok(FileStatus::AlreadyPatched) => summary.already_patched += 1,
                Err(_) => summary.files_failed += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }

    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&FileOutcome, &FileError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o, e)))
    }
}

fn lossy<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(kind: LineKind, text: &str) -> HunkLine {
        HunkLine {
            kind,
            text: text.as_bytes().to_vec(),
            ending: Some(LineEnding::Lf),
        }
    }

    fn sample_hunk() -> Hunk {
        Hunk {
            start_src: 3,
            len_src: 3,
            start_tgt: 3,
            len_tgt: 3,
            desc: "fn main()".to_string(),
            lines: vec![
                line(LineKind::Context, "a"),
                line(LineKind::Removed, "b"),
                line(LineKind::Added, "B"),
                line(LineKind::Context, "c"),
            ],
        }
    }

    #[test]
    fn test_blocks_by_side() {
        let hunk = sample_hunk();
        let old: Vec<&[u8]> = hunk.block(Side::Old).map(|l| l.text.as_slice()).collect();
        let new: Vec<&[u8]> = hunk.block(Side::New).map(|l| l.text.as_slice()).collect();
        assert_eq!(old, vec![b"a" as &[u8], b"b", b"c"]);
        assert_eq!(new, vec![b"a" as &[u8], b"B", b"c"]);
        assert_eq!(hunk.anchor(Side::Old), 2);
    }

    #[test]
    fn test_reversed_swaps_sides() {
        let hunk = sample_hunk().reversed();
        assert_eq!(hunk.lines[1].kind, LineKind::Added);
        assert_eq!(hunk.lines[2].kind, LineKind::Removed);
        assert_eq!(hunk.reversed(), sample_hunk());
    }

    #[test]
    fn test_empty_block_anchor_is_insertion_point() {
        let hunk = Hunk {
            start_src: 0,
            len_src: 0,
            start_tgt: 1,
            len_tgt: 1,
            desc: String::new(),
            lines: vec![line(LineKind::Added, "new")],
        };
        assert_eq!(hunk.anchor(Side::Old), 0);
        assert_eq!(hunk.anchor(Side::New), 0);
    }

    #[test]
    fn test_write_to_restores_prefixes_and_eof_marker() {
        let mut last = line(LineKind::Added, "tail");
        last.ending = None;
        let file = PatchedFile {
            source: "src/x.txt".to_string(),
            target: "src/x.txt".to_string(),
            header: vec!["diff --git a/src/x.txt b/src/x.txt\n".to_string()],
            hunks: vec![Hunk {
                start_src: 0,
                len_src: 0,
                start_tgt: 1,
                len_tgt: 1,
                desc: String::new(),
                lines: vec![last],
            }],
            dialect: Dialect::Git,
        };
        let mut out = Vec::new();
        file.write_to(&mut out);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "diff --git a/src/x.txt b/src/x.txt\n--- a/src/x.txt\n+++ b/src/x.txt\n\
             @@ -0,0 +1,1 @@\n+tail\n\\ No newline at end of file\n"
        );
    }
}
