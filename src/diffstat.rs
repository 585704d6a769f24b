use crate::patch_format::{LineKind, PatchSet};

const TERMINAL_WIDTH: usize = 80;

struct FileStat<'a> {
    name: &'a str,
    insertions: usize,
    deletions: usize,
}

impl PatchSet {
    /// Summarize insertions and deletions per file, `git diff --stat` style.
    pub fn diffstat(&self) -> String {
        let mut delta: i64 = 0;
        let stats: Vec<FileStat<'_>> = self
            .files
            .iter()
            .map(|file| {
                let mut stat = FileStat {
                    name: file.display_name(),
                    insertions: 0,
                    deletions: 0,
                };
                for line in file.hunks.iter().flat_map(|h| &h.lines) {
                    match line.kind {
                        LineKind::Added => {
                            stat.insertions += 1;
                            delta += line.byte_len() as i64;
                        }
                        LineKind::Removed => {
                            stat.deletions += 1;
                            delta -= line.byte_len() as i64;
                        }
                        LineKind::Context => {}
                    }
                }
                stat
            })
            .collect();

        let name_width = stats.iter().map(|s| s.name.chars().count()).max().unwrap_or(0);
        let max_changes = stats
            .iter()
            .map(|s| s.insertions + s.deletions)
            .max()
            .unwrap_or(0);
        let count_width = max_changes.to_string().len();
        // Row layout is " {name} | {count} {bar}\n".
        let hist_width = TERMINAL_WIDTH
            .saturating_sub(name_width + count_width + 6)
            .max(2);

        let mut out = String::new();
        for stat in &stats {
            let bar = if max_changes < hist_width {
                format!("{}{}", "+".repeat(stat.insertions), "-".repeat(stat.deletions))
            } else {
                let plus = scaled(stat.insertions, max_changes, hist_width);
                let minus = scaled(stat.deletions, max_changes, hist_width);
                format!("{}{}", "+".repeat(plus), "-".repeat(minus))
            };
            out.push_str(&format!(
                " {:<name_width$} | {:>count_width$} {}\n",
                stat.name,
                stat.insertions + stat.deletions,
                bar
            ));
        }

        let insertions: usize = stats.iter().map(|s| s.insertions).sum();
        let deletions: usize = stats.iter().map(|s| s.deletions).sum();
        out.push_str(&format!(
            " {} files changed, {} insertions(+), {} deletions(-), {:+} bytes",
            stats.len(),
            insertions,
            deletions,
            delta
        ));
        out
    }
}

/// Scale `count` onto the histogram; any non-zero count gets at least one mark.
fn scaled(count: usize, max_changes: usize, hist_width: usize) -> usize {
    let ratio = count as f64 / max_changes as f64 * hist_width as f64;
    if ratio > 0.0 && ratio < 1.0 {
        1
    } else {
        ratio as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diffstat_rows_and_totals() {
        let text = "\
--- updatedlg.cpp
+++ updatedlg.cpp
@@ -1,3 +1,4 @@
 a
-b
+B
+C
 c
--- conf.h
+++ conf.h
@@ -1 +1,2 @@
 x
+y
";
        let set = PatchSet::parse(text);
        assert_eq!(
            set.diffstat(),
            " updatedlg.cpp | 3 ++-\n conf.h        | 1 +\n \
             2 files changed, 3 insertions(+), 1 deletions(-), +4 bytes"
        );
    }

    #[test]
    fn test_diffstat_scales_large_changes() {
        let mut text = String::from("--- big.txt\n+++ big.txt\n@@ -0,0 +1,200 @@\n");
        for i in 0..200 {
            text.push_str(&format!("+line {i}\n"));
        }
        text.push_str("--- small.txt\n+++ small.txt\n@@ -1 +0,0 @@\n-gone\n");
        let set = PatchSet::parse(text);
        let stat = set.diffstat();
        let rows: Vec<&str> = stat.lines().collect();

        let big_bar = rows[0].rsplit(' ').next().unwrap();
        assert!(big_bar.len() <= 80 && big_bar.chars().all(|c| c == '+'));
        assert!(rows[1].ends_with(" -"), "small change keeps one mark: {}", rows[1]);
        assert!(rows[2].starts_with(" 2 files changed, 200 insertions(+), 1 deletions(-)"));
    }

    #[test]
    fn test_deleted_file_listed_by_source() {
        let set = PatchSet::parse("--- old.txt\n+++ /dev/null\n@@ -1 +0,0 @@\n-bye\n");
        assert!(set.diffstat().starts_with(" old.txt | 1 -\n"));
    }
}
