// Hunk walking: map a unified-diff patch onto the line numbers it touches.
//
// Removed lines are numbered on the pre-change side, added lines on the
// post-change side. Context lines advance both counters.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{PatchError, Result};

/// A parsed `@@ -old_start,old_len +new_start,new_len @@` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkHeader {
    pub old_start: u32,
    pub old_len: u32,
    pub new_start: u32,
    pub new_len: u32,
}

impl HunkHeader {
    /// Parse a hunk header. `line` is only used for error reporting.
    ///
    /// Lengths may be omitted (`@@ -5 +5 @@`), in which case they default to 1.
    pub fn parse(header: &str, line: usize) -> Result<Self> {
        let malformed = || PatchError::MalformedHunk {
            line,
            header: header.to_string(),
        };

        let mut parts = header
            .strip_prefix("@@")
            .ok_or_else(malformed)?
            .split_whitespace();
        let old = parts
            .next()
            .and_then(|p| p.strip_prefix('-'))
            .ok_or_else(malformed)?;
        let new = parts
            .next()
            .and_then(|p| p.strip_prefix('+'))
            .ok_or_else(malformed)?;

        let (old_start, old_len) = parse_range(old).ok_or_else(malformed)?;
        let (new_start, new_len) = parse_range(new).ok_or_else(malformed)?;

        Ok(Self {
            old_start,
            old_len,
            new_start,
            new_len,
        })
    }
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Line numbers touched by a patch, split by side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedLines {
    /// Pre-change line numbers of `-` lines.
    pub removed: BTreeSet<u32>,
    /// Post-change line numbers of `+` lines.
    pub added: BTreeSet<u32>,
}

impl ChangedLines {
    /// Union of both sides: the set the tracer blames.
    pub fn all(&self) -> BTreeSet<u32> {
        self.removed.union(&self.added).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Position inside an open hunk.
struct Cursor<'a> {
    header: &'a str,
    header_line: usize,
    old: u32,
    new: u32,
    old_left: u32,
    new_left: u32,
}

impl<'a> Cursor<'a> {
    fn open(header: &HunkHeader, text: &'a str, line: usize) -> Self {
        Self {
            header: text,
            header_line: line,
            old: header.old_start,
            new: header.new_start,
            old_left: header.old_len,
            new_left: header.new_len,
        }
    }

    fn advance_old(&mut self) -> Result<()> {
        self.old = self.old.checked_add(1).ok_or_else(|| self.overflow())?;
        self.old_left = self.old_left.saturating_sub(1);
        Ok(())
    }

    fn advance_new(&mut self) -> Result<()> {
        self.new = self.new.checked_add(1).ok_or_else(|| self.overflow())?;
        self.new_left = self.new_left.saturating_sub(1);
        Ok(())
    }

    /// Both declared ranges have been consumed.
    fn is_done(&self) -> bool {
        self.old_left == 0 && self.new_left == 0
    }

    fn overflow(&self) -> PatchError {
        PatchError::MalformedHunk {
            line: self.header_line,
            header: self.header.to_string(),
        }
    }
}

/// Walk every hunk in `patch` and collect the touched line numbers.
///
/// Text before the first hunk header (file headers, `index` lines) is ignored,
/// so a patch without any hunk yields an empty result. A hunk closes once the
/// line counts in its header are consumed, or at the next `diff --git` line.
/// A hunk whose line numbers run past `u32::MAX` is reported as malformed.
pub fn changed_lines(patch: &str) -> Result<ChangedLines> {
    let mut changed = ChangedLines::default();
    let mut cursor: Option<Cursor<'_>> = None;

    for (idx, line) in patch.lines().enumerate() {
        if line.starts_with("@@") {
            let header = HunkHeader::parse(line, idx + 1)?;
            cursor = Some(Cursor::open(&header, line, idx + 1)).filter(|c| !c.is_done());
            continue;
        }
        if line.starts_with("diff --git") {
            cursor = None;
            continue;
        }

        let Some(hunk) = cursor.as_mut() else {
            continue;
        };

        match line.as_bytes().first() {
            Some(b'-') => {
                changed.removed.insert(hunk.old);
                hunk.advance_old()?;
            }
            Some(b'+') => {
                changed.added.insert(hunk.new);
                hunk.advance_new()?;
            }
            // "\ No newline at end of file"
            Some(b'\\') => {}
            _ => {
                hunk.advance_old()?;
                hunk.advance_new()?;
            }
        }

        if hunk.is_done() {
            cursor = None;
        }
    }

    Ok(changed)
}

/// Convenience wrapper returning the deduplicated union of both sides.
pub fn changed_line_numbers(patch: &str) -> Result<BTreeSet<u32>> {
    changed_lines(patch).map(|c| c.all())
}
