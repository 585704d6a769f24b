//! Unified diff parser.
//!
//! Works line by line over raw bytes. Problems are never raised: the parser counts them on the
//! returned [`PatchSet`] and moves on to the next file header, so one damaged entry does not
//! hide the rest of the document.

use regex::bytes::Regex;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::dialect;
use crate::error::PatchError;
use crate::patch_format::{Hunk, HunkLine, LineEnding, LineKind, PatchSet, PatchedFile};
use crate::util;

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("invalid regex")
});

impl PatchSet {
    /// Parse diff text held in memory.
    pub fn parse(text: impl AsRef<[u8]>) -> PatchSet {
        Parser::default().run(text.as_ref())
    }

    pub fn from_reader(mut reader: impl Read) -> Result<PatchSet, PatchError> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|source| PatchError::Read {
                path: "<stream>".to_string(),
                source,
            })?;
        Ok(PatchSet::parse(buf))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<PatchSet, PatchError> {
        let path = path.as_ref();
        let data = util::read_file(path).map_err(|source| PatchError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(PatchSet::parse(data))
    }
}

/// Split a raw line into its content and line ending.
fn split_ending(raw: &[u8]) -> (&[u8], Option<LineEnding>) {
    if let Some(body) = raw.strip_suffix(b"\r\n") {
        (body, Some(LineEnding::CrLf))
    } else if let Some(body) = raw.strip_suffix(b"\n") {
        (body, Some(LineEnding::Lf))
    } else {
        (raw, None)
    }
}

/// A hunk whose body is still being read.
struct OpenHunk {
    hunk: Hunk,
    seen_src: usize,
    seen_tgt: usize,
}

impl OpenHunk {
    fn is_complete(&self) -> bool {
        self.seen_src == self.hunk.len_src && self.seen_tgt == self.hunk.len_tgt
    }

    fn overflows(&self) -> bool {
        self.seen_src > self.hunk.len_src || self.seen_tgt > self.hunk.len_tgt
    }
}

#[derive(Default)]
struct Parser {
    files: Vec<PatchedFile>,
    /// Lines collected since the last hunk; they become the next file's header.
    header: Vec<String>,
    /// The file whose hunks are being read, if its header was valid.
    current: Option<PatchedFile>,
    open: Option<OpenHunk>,
    /// A hunk just finished, so a `\ No newline` marker may still follow.
    just_closed: bool,
    errors: usize,
    warnings: usize,
}

impl Parser {
    fn run(mut self, data: &[u8]) -> PatchSet {
        let lines: Vec<&[u8]> = data.split_inclusive(|&b| b == b'\n').collect();
        let document_start = lines.first().map(|l| String::from_utf8_lossy(l).into_owned());

        let mut idx = 0;
        while idx < lines.len() {
            let next = lines.get(idx + 1).copied();
            idx += self.feed(idx + 1, lines[idx], next);
        }
        self.finish_at_eof(lines.len());

        let mut set = PatchSet {
            files: self.files,
            dialect: Default::default(),
            errors: self.errors,
            warnings: self.warnings,
        };

        for (position, file) in set.files.iter_mut().enumerate() {
            file.dialect = dialect::detect_file(file, document_start.as_deref());
            set.warnings += dialect::fix_paths(file, position);
        }
        set.dialect = dialect::detect_set(&set.files);

        if set.files.is_empty() {
            warn!("no patch data found");
            set.errors = set.errors.max(1);
        }
        debug!(
            files = set.files.len(),
            dialect = %set.dialect,
            errors = set.errors,
            warnings = set.warnings,
            "parsed patch"
        );
        set
    }

    /// Consume one line (numbered from 1). Returns how many lines were used.
    fn feed(&mut self, lineno: usize, raw: &[u8], next: Option<&[u8]>) -> usize {
        let (body, ending) = split_ending(raw);

        if self.open.is_some() {
            self.feed_hunk_body(lineno, body, ending);
            return 1;
        }

        if body.starts_with(b"\\") && self.just_closed {
            self.mark_no_newline(lineno);
            return 1;
        }
        self.just_closed = false;

        if body.starts_with(b"@@") && self.current.is_some() {
            self.open_hunk(lineno, body);
            return 1;
        }

        if body.starts_with(b"--- ") {
            if let Some(next) = next.filter(|n| n.starts_with(b"+++ ")) {
                let (next_body, _) = split_ending(next);
                self.open_file(lineno, &body[4..], &next_body[4..]);
                return 2;
            }
            debug!(line = lineno, "'---' without '+++', treating as header text");
        }

        self.close_file();
        self.header.push(String::from_utf8_lossy(raw).into_owned());
        1
    }

    fn feed_hunk_body(&mut self, lineno: usize, body: &[u8], ending: Option<LineEnding>) {
        let (kind, text) = match body.split_first() {
            Some((b' ', rest)) => (LineKind::Context, rest),
            Some((b'-', rest)) => (LineKind::Removed, rest),
            Some((b'+', rest)) => (LineKind::Added, rest),
            Some((b'\\', _)) => {
                self.mark_no_newline(lineno);
                return;
            }
            None if ending.is_some() => {
                warn!(line = lineno, "empty line in hunk body, reading it as context");
                self.warnings += 1;
                (LineKind::Context, body)
            }
            _ => {
                self.fail_file(lineno, "invalid line in hunk body");
                return;
            }
        };

        let Some(open) = self.open.as_mut() else {
            return;
        };
        match kind {
            LineKind::Context => {
                open.seen_src += 1;
                open.seen_tgt += 1;
            }
            LineKind::Removed => open.seen_src += 1,
            LineKind::Added => open.seen_tgt += 1,
        }
        open.hunk.lines.push(HunkLine {
            kind,
            text: text.to_vec(),
            ending,
        });

        if open.overflows() {
            self.fail_file(lineno, "hunk has more lines than its header declares");
        } else if open.is_complete() {
            self.close_hunk();
        }
    }

    fn mark_no_newline(&mut self, lineno: usize) {
        let last = match (&mut self.open, &mut self.current) {
            (Some(open), _) => open.hunk.lines.last_mut(),
            (None, Some(file)) => file.hunks.last_mut().and_then(|h| h.lines.last_mut()),
            (None, None) => None,
        };
        match last {
            Some(line) => line.ending = None,
            None => debug!(line = lineno, "stray end-of-file marker"),
        }
    }

    fn open_hunk(&mut self, lineno: usize, body: &[u8]) {
        let Some(caps) = HUNK_HEADER_RE.captures(body) else {
            self.fail_file(lineno, "invalid hunk header");
            return;
        };
        let number = |i: usize, default: usize| {
            caps.get(i)
                .map(|m| {
                    std::str::from_utf8(m.as_bytes())
                        .ok()
                        .and_then(|s| s.parse::<usize>().ok())
                })
                .unwrap_or(Some(default))
        };
        let (Some(start_src), Some(len_src), Some(start_tgt), Some(len_tgt)) =
            (number(1, 0), number(2, 1), number(3, 0), number(4, 1))
        else {
            self.fail_file(lineno, "hunk header numbers out of range");
            return;
        };
        if len_src == 0 && len_tgt == 0 {
            self.fail_file(lineno, "hunk header declares no lines");
            return;
        }

        let rest = &body[caps.get(0).map_or(body.len(), |m| m.end())..];
        let desc = String::from_utf8_lossy(rest.strip_prefix(b" ").unwrap_or(rest))
            .trim_end()
            .to_string();

        debug!(line = lineno, start_src, len_src, start_tgt, len_tgt, "hunk header");
        self.open = Some(OpenHunk {
            hunk: Hunk {
                start_src,
                len_src,
                start_tgt,
                len_tgt,
                desc,
                lines: Vec::new(),
            },
            seen_src: 0,
            seen_tgt: 0,
        });
    }

    fn close_hunk(&mut self) {
        if let (Some(open), Some(file)) = (self.open.take(), self.current.as_mut()) {
            file.hunks.push(open.hunk);
            self.just_closed = true;
        }
    }

    fn open_file(&mut self, lineno: usize, source: &[u8], target: &[u8]) {
        self.close_file();
        let source = self.header_path(lineno, source);
        let target = self.header_path(lineno + 1, target);
        debug!(line = lineno, %source, %target, "file header");
        self.current = Some(PatchedFile {
            source,
            target,
            header: std::mem::take(&mut self.header),
            hunks: Vec::new(),
            dialect: Default::default(),
        });
    }

    /// Extract the path from the text following `--- ` or `+++ `.
    fn header_path(&mut self, lineno: usize, raw: &[u8]) -> String {
        let name = raw.split(|&b| b == b'\t').next().unwrap_or_default();
        let name = String::from_utf8_lossy(name);
        let trimmed = name.trim_end();
        if trimmed.len() != name.len() {
            warn!(line = lineno, "stripping trailing whitespace from file name");
            self.warnings += 1;
        }
        let unquoted = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(trimmed);
        unquoted.to_string()
    }

    fn close_file(&mut self) {
        let Some(file) = self.current.take() else {
            return;
        };
        if file.hunks.is_empty() {
            warn!(source = %file.source, "file header without hunks");
            self.errors += 1;
        } else {
            self.files.push(file);
        }
    }

    /// Drop the file being read after a structural error.
    fn fail_file(&mut self, lineno: usize, reason: &str) {
        let name = self.current.as_ref().map(|f| f.target.clone()).unwrap_or_default();
        warn!(line = lineno, file = %name, "{reason}, skipping file");
        self.errors += 1;
        self.open = None;
        self.current = None;
        self.just_closed = false;
    }

    fn finish_at_eof(&mut self, lineno: usize) {
        if self.open.is_some() {
            self.fail_file(lineno, "unexpected end of patch inside a hunk");
        }
        self.close_file();
    }
}
