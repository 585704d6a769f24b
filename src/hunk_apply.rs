use tracing::debug;

use crate::patch_format::{Hunk, HunkLine, LineEnding, LineKind, Side};

/// How far (in lines, each direction) a hunk may be moved from its expected position.
pub const DEFAULT_SEARCH_WINDOW: usize = 32;

/// One line of a file being patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: Vec<u8>,
    pub ending: Option<LineEnding>,
}

pub fn split_lines(data: &[u8]) -> Vec<Line> {
    data.split_inclusive(|&b| b == b'\n')
        .map(|raw| {
            if let Some(text) = raw.strip_suffix(b"\r\n") {
                Line {
                    text: text.to_vec(),
                    ending: Some(LineEnding::CrLf),
                }
            } else if let Some(text) = raw.strip_suffix(b"\n") {
                Line {
                    text: text.to_vec(),
                    ending: Some(LineEnding::Lf),
                }
            } else {
                Line {
                    text: raw.to_vec(),
                    ending: None,
                }
            }
        })
        .collect()
}

pub fn join_lines(lines: &[Line]) -> Vec<u8> {
    let size = lines.iter().map(|l| l.text.len() + 2).sum();
    let mut out = Vec::with_capacity(size);
    for line in lines {
        out.extend_from_slice(&line.text);
        if let Some(ending) = line.ending {
            out.extend_from_slice(ending.as_bytes());
        }
    }
    out
}

/// The line ending used by every terminated line, or `None` when the file mixes styles or
/// has no terminated lines.
pub fn uniform_ending(lines: &[Line]) -> Option<LineEnding> {
    let mut endings = lines.iter().filter_map(|l| l.ending);
    let first = endings.next()?;
    endings.all(|e| e == first).then_some(first)
}

/// Outcome of running a hunk sequence over a file.
#[derive(Debug)]
pub struct Patched {
    pub lines: Vec<Line>,
    /// Zero-based indices of hunks that could not be placed.
    pub failed: Vec<usize>,
}

impl Patched {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tracks where the next hunk is expected while walking a file.
#[derive(Default)]
struct Cursor {
    /// Net lines added by the hunks placed so far.
    shift: isize,
    /// Distance between declared and actual position of the last placed hunk.
    drift: isize,
    /// Hunks may not start before the end of the previous one.
    floor: usize,
}

impl Cursor {
    fn expected(&self, declared: usize) -> usize {
        signed(declared)
            .saturating_add(self.shift)
            .saturating_add(self.drift)
            .max(0) as usize
    }

    fn placed(&mut self, declared: usize, pos: usize, old_len: usize, new_len: usize) {
        self.drift = signed(pos).saturating_sub(signed(declared).saturating_add(self.shift));
        self.shift += new_len as isize - old_len as isize;
        self.floor = pos + new_len;
    }
}

/// Line numbers come from patch text, so out-of-range values saturate.
fn signed(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX)
}

/// Apply `hunks` in order, replacing each hunk's old block with its new block. Hunks that
/// cannot be located within `window` lines are skipped and reported.
pub fn apply_hunks(mut lines: Vec<Line>, hunks: &[Hunk], window: usize) -> Patched {
    let ending = uniform_ending(&lines);
    let mut cursor = Cursor::default();
    let mut failed = Vec::new();

    for (idx, hunk) in hunks.iter().enumerate() {
        let old: Vec<&HunkLine> = hunk.block(Side::Old).collect();
        let declared = hunk.anchor(Side::Old);
        let expected = cursor.expected(declared);

        let Some(pos) = find_block(&lines, &old, expected, cursor.floor, window) else {
            debug!(hunk = idx + 1, expected = expected + 1, "hunk not found");
            failed.push(idx);
            continue;
        };
        if pos != expected {
            let offset = pos as isize - expected as isize;
            debug!(hunk = idx + 1, offset, "hunk placed with offset");
        }

        let replacement = replacement(&lines[pos..pos + old.len()], hunk, ending);
        let new_len = replacement.len();
        lines.splice(pos..pos + old.len(), replacement);
        cursor.placed(declared, pos, old.len(), new_len);
    }

    Patched { lines, failed }
}

/// True when every hunk's block for `side` can be found in order.
pub fn contains_hunks<'a>(
    lines: &[Line],
    hunks: impl IntoIterator<Item = &'a Hunk>,
    side: Side,
    window: usize,
) -> bool {
    let mut cursor = Cursor::default();
    hunks.into_iter().all(|hunk| {
        let block: Vec<&HunkLine> = hunk.block(side).collect();
        let declared = hunk.anchor(side);
        match find_block(lines, &block, cursor.expected(declared), cursor.floor, window) {
            Some(pos) => {
                // Positions already refer to this version, so only drift carries over.
                cursor.placed(declared, pos, block.len(), block.len());
                true
            }
            None => false,
        }
    })
}

/// True when `lines` already holds what `hunks` produce. An empty new-side block fits
/// anywhere, so those hunks prove nothing: when every block is empty the file must be empty,
/// otherwise every non-empty block has to be found in order.
pub fn is_applied(lines: &[Line], hunks: &[Hunk], window: usize) -> bool {
    let mut evidence = hunks
        .iter()
        .filter(|h| h.block(Side::New).next().is_some())
        .peekable();
    if evidence.peek().is_none() {
        return lines.is_empty();
    }
    contains_hunks(lines, evidence, Side::New, window)
}

/// Search outward from `expected` (0, +1, -1, +2, -2, ...) for `block`, never before `floor`
/// and never more than `window` lines away.
fn find_block(
    lines: &[Line],
    block: &[&HunkLine],
    expected: usize,
    floor: usize,
    window: usize,
) -> Option<usize> {
    let last = lines.len().checked_sub(block.len())?;
    if floor > last {
        return None;
    }
    let fits = |pos: usize| {
        (floor..=last).contains(&pos)
            && lines[pos..]
                .iter()
                .zip(block)
                .all(|(line, want)| line.text == want.text)
    };

    if fits(expected) {
        return Some(expected);
    }
    // Only distances that land inside floor..=last are worth trying.
    let nearest = if expected > last {
        expected - last
    } else {
        floor.saturating_sub(expected)
    }
    .max(1);
    let farthest = expected
        .abs_diff(floor)
        .max(expected.abs_diff(last))
        .min(window);
    (nearest..=farthest).find_map(|distance| {
        expected
            .checked_add(distance)
            .filter(|&after| fits(after))
            .or_else(|| expected.checked_sub(distance).filter(|&before| fits(before)))
    })
}

/// Build the new block for a hunk placed over `matched`. Context keeps the file's own bytes;
/// inserted lines follow the file's line ending when it has a single one.
fn replacement(matched: &[Line], hunk: &Hunk, ending: Option<LineEnding>) -> Vec<Line> {
    let mut originals = matched.iter();
    let mut out = Vec::with_capacity(hunk.len_tgt);
    for line in &hunk.lines {
        match line.kind {
            LineKind::Context => {
                if let Some(original) = originals.next() {
                    out.push(original.clone());
                }
            }
            LineKind::Removed => {
                originals.next();
            }
            LineKind::Added => out.push(Line {
                text: line.text.clone(),
                ending: line.ending.map(|own| ending.unwrap_or(own)),
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(lines: &[Line]) -> String {
        String::from_utf8(join_lines(lines)).unwrap()
    }

    fn hunk(start_src: usize, start_tgt: usize, body: &[&str]) -> Hunk {
        let lines: Vec<HunkLine> = body
            .iter()
            .map(|l| {
                let (marker, rest) = l.split_at(1);
                HunkLine {
                    kind: match marker {
                        "+" => LineKind::Added,
                        "-" => LineKind::Removed,
                        _ => LineKind::Context,
                    },
                    text: rest.as_bytes().to_vec(),
                    ending: Some(LineEnding::Lf),
                }
            })
            .collect();
        let len_src = lines.iter().filter(|l| l.kind != LineKind::Added).count();
        let len_tgt = lines.iter().filter(|l| l.kind != LineKind::Removed).count();
        Hunk {
            start_src,
            len_src,
            start_tgt,
            len_tgt,
            desc: String::new(),
            lines,
        }
    }

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    #[test]
    fn test_split_and_join_preserve_bytes() {
        for data in ["a\nb\r\nc", "", "\n\n", "only\r\n"] {
            assert_eq!(join_lines(&split_lines(data.as_bytes())), data.as_bytes());
        }
    }

    #[test]
    fn test_uniform_ending() {
        assert_eq!(uniform_ending(&split_lines(b"a\r\nb\r\nc")), Some(LineEnding::CrLf));
        assert_eq!(uniform_ending(&split_lines(b"a\r\nb\n")), None);
        assert_eq!(uniform_ending(&split_lines(b"")), None);
    }

    #[test]
    fn test_apply_at_declared_position() {
        let lines = split_lines(b"a\nb\nc\n");
        let patched = apply_hunks(lines, &[hunk(1, 1, &[" a", "-b", "+B", " c"])], 4);
        assert!(patched.is_clean());
        assert_eq!(text(&patched.lines), "a\nB\nc\n");
    }

    #[test]
    fn test_stale_line_numbers_within_window() {
        // Ten lines were inserted at the top since the diff was made.
        let mut original = String::from("x\n").repeat(10);
        original.push_str(&numbered(30));
        let hunks = [
            hunk(3, 3, &[" line 3", "-line 4", "+LINE 4", " line 5"]),
            hunk(20, 20, &[" line 20", "+inserted", " line 21"]),
        ];

        let patched = apply_hunks(split_lines(original.as_bytes()), &hunks, DEFAULT_SEARCH_WINDOW);
        assert!(patched.is_clean());
        let out = text(&patched.lines);
        assert!(out.contains("line 3\nLINE 4\nline 5\n"));
        assert!(out.contains("line 20\ninserted\nline 21\n"));
    }

    #[test]
    fn test_hunk_outside_window_fails() {
        let mut original = String::from("x\n").repeat(50);
        original.push_str(&numbered(5));
        let hunks = [hunk(2, 2, &[" line 2", "-line 3", "+LINE 3"])];
        let patched = apply_hunks(split_lines(original.as_bytes()), &hunks, 10);
        assert_eq!(patched.failed, vec![0]);
        assert_eq!(text(&patched.lines), original);
    }

    #[test]
    fn test_failed_hunk_keeps_earlier_edits() {
        let hunks = [
            hunk(1, 1, &["-line 1", "+LINE 1"]),
            hunk(4, 4, &[" nowhere", "-to be", "+found"]),
        ];
        let patched = apply_hunks(split_lines(numbered(5).as_bytes()), &hunks, 8);
        assert_eq!(patched.failed, vec![1]);
        assert!(text(&patched.lines).starts_with("LINE 1\nline 2\n"));
    }

    #[test]
    fn test_added_lines_follow_file_line_ending() {
        let lines = split_lines(b"a\r\nb\r\n");
        let patched = apply_hunks(lines, &[hunk(1, 1, &[" a", "+new", " b"])], 2);
        assert_eq!(text(&patched.lines), "a\r\nnew\r\nb\r\n");
    }

    #[test]
    fn test_insert_into_empty_file() {
        let patched = apply_hunks(Vec::new(), &[hunk(0, 1, &["+hello", "+world"])], 2);
        assert!(patched.is_clean());
        assert_eq!(text(&patched.lines), "hello\nworld\n");
    }

    #[test]
    fn test_reverse_restores_original() {
        let original = numbered(12);
        let hunks = [
            hunk(2, 2, &[" line 2", "-line 3", "+three", "+3.5", " line 4"]),
            hunk(9, 10, &[" line 9", "-line 10", " line 11"]),
        ];
        let forward = apply_hunks(split_lines(original.as_bytes()), &hunks, 4);
        assert!(forward.is_clean());

        let reversed: Vec<Hunk> = hunks.iter().map(Hunk::reversed).collect();
        let back = apply_hunks(forward.lines, &reversed, 4);
        assert!(back.is_clean());
        assert_eq!(text(&back.lines), original);
    }

    #[test]
    fn test_contains_hunks_by_side() {
        let hunks = [hunk(1, 1, &[" a", "-b", "+B", " c"])];
        let before = split_lines(b"a\nb\nc\n");
        let after = split_lines(b"a\nB\nc\n");
        assert!(contains_hunks(&before, &hunks, Side::Old, 2));
        assert!(!contains_hunks(&before, &hunks, Side::New, 2));
        assert!(contains_hunks(&after, &hunks, Side::New, 2));
        assert!(!contains_hunks(&after, &hunks, Side::Old, 2));
    }

    #[test]
    fn test_huge_window_and_line_numbers_stay_bounded() {
        let lines = split_lines(b"a\nb\nc\n");
        let missing = [hunk(2, 2, &[" x", "-y", "+z"])];
        let patched = apply_hunks(lines.clone(), &missing, usize::MAX);
        assert_eq!(patched.failed, vec![0]);

        let far = [hunk(usize::MAX, usize::MAX, &[" b", "-c", "+C"])];
        let patched = apply_hunks(lines.clone(), &far, usize::MAX);
        assert!(patched.is_clean());
        assert_eq!(text(&patched.lines), "a\nb\nC\n");

        let patched = apply_hunks(lines, &far, 4);
        assert_eq!(patched.failed, vec![0]);
    }

    #[test]
    fn test_empty_new_blocks_only_match_an_empty_file() {
        let removal = [hunk(2, 1, &["-gone"])];
        assert!(!is_applied(&split_lines(b"keep\nother\n"), &removal, 2));
        assert!(!is_applied(&split_lines(b"keep\ngone\n"), &removal, 2));
        assert!(is_applied(&[], &removal, 2));

        let mixed = [hunk(1, 1, &["-a", "+A"]), hunk(3, 3, &["-c"])];
        assert!(is_applied(&split_lines(b"A\nb\n"), &mixed, 2));
        assert!(!is_applied(&split_lines(b"a\nb\nc\n"), &mixed, 2));
    }
}
