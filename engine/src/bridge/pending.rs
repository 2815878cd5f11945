//! Per-file batches of edits awaiting review in the editor.
//!
//! Ranges are never trusted across edits: before every send the whole batch
//! for a file is relocated against the live file content. The byte offset
//! recorded with each edit is only a hint for choosing between repeated
//! occurrences of the same text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Zero-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    #[serde(rename = "char")]
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRange {
    pub start: Position,
    pub end: Position,
}

/// One applied edit, with `range` covering `new_text` in the current file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEdit {
    #[serde(skip)]
    pub file_path: PathBuf,
    pub range: EditRange,
    pub old_text: String,
    pub new_text: String,
    /// Byte offset of `new_text` when last located
    #[serde(skip)]
    pub anchor: usize,
}

#[derive(Debug, Default)]
pub struct PendingEdits {
    files: HashMap<PathBuf, Vec<PendingEdit>>,
}

impl PendingEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit that replaced `old_text` at byte `offset` with `new_text`.
    ///
    /// `live` is the file content after the edit. Anchors of earlier edits
    /// further down the file are shifted by the size change.
    pub fn record(
        &mut self,
        file: &Path,
        live: &str,
        offset: usize,
        old_text: &str,
        new_text: &str,
    ) {
        let batch = self.files.entry(file.to_path_buf()).or_default();

        let replaced_end = offset + old_text.len();
        for edit in batch.iter_mut() {
            if edit.anchor >= replaced_end {
                edit.anchor = (edit.anchor + new_text.len()).saturating_sub(old_text.len());
            }
        }

        let offset = floor_char_boundary(live, offset);
        let end = floor_char_boundary(live, offset + new_text.len());
        batch.push(PendingEdit {
            file_path: file.to_path_buf(),
            range: range_for(live, offset, end),
            old_text: old_text.to_string(),
            new_text: new_text.to_string(),
            anchor: offset,
        });
    }

    /// Relocate every pending edit for `file` against `live` content.
    ///
    /// Edits whose `new_text` can no longer be found are dropped. Returns the
    /// refreshed batch.
    pub fn refresh(&mut self, file: &Path, live: &str) -> Vec<PendingEdit> {
        let Some(batch) = self.files.get_mut(file) else {
            return Vec::new();
        };

        let mut claimed: Vec<usize> = Vec::new();
        batch.retain_mut(|edit| {
            let Some(start) = locate(live, &edit.new_text, edit.anchor, &claimed) else {
                debug!(
                    "Dropping stale pending edit in {}: {:?} no longer present",
                    file.display(),
                    preview(&edit.new_text)
                );
                return false;
            };
            claimed.push(start);
            edit.anchor = start;
            edit.range = range_for(live, start, start + edit.new_text.len());
            true
        });

        let refreshed = batch.clone();
        if batch.is_empty() {
            self.files.remove(file);
        }
        refreshed
    }

    pub fn get(&self, file: &Path) -> &[PendingEdit] {
        self.files.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self, file: &Path) {
        self.files.remove(file);
    }

    pub fn clear_all(&mut self) {
        self.files.clear();
    }

    /// Total pending edits across all files
    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Nearest unclaimed occurrence of `needle` to `hint`.
fn locate(haystack: &str, needle: &str, hint: usize, claimed: &[usize]) -> Option<usize> {
    if needle.is_empty() {
        let at = floor_char_boundary(haystack, hint);
        return (!claimed.contains(&at)).then_some(at);
    }

    haystack
        .match_indices(needle)
        .map(|(i, _)| i)
        .filter(|i| !claimed.contains(i))
        .min_by_key(|i| i.abs_diff(hint))
}

fn range_for(text: &str, start: usize, end: usize) -> EditRange {
    EditRange {
        start: position_at(text, start),
        end: position_at(text, end),
    }
}

/// Line and UTF-16 column of a byte offset. `offset` must be a char boundary.
pub fn position_at(text: &str, offset: usize) -> Position {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let character = before[line_start..].encode_utf16().count();

    Position {
        line: line as u32,
        character: character as u32,
    }
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut at = offset.min(text.len());
    while !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

fn preview(text: &str) -> String {
    text.chars().take(40).collect()
}
