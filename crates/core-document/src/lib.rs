//! Two-view markdown document.
//!
//! A `Document` holds a committed segment list (the text at the current
//! version) and a working list that accumulates this tick's pending edits.
//! Every edit operation targets an explicit version; a stale version is
//! rejected outright rather than rebased. `commit` atomically folds the
//! working list into the committed view and bumps the version, so readers
//! only ever observe whole batches.
//!
//! Positions throughout are byte offsets in the flatten view. UTF-8 is
//! assumed but not validated.

pub mod segment;

mod markdown;

pub use segment::{SegState, Segment, SegmentList};

use thiserror::Error;
use tracing::trace;

/// Rejection codes for edit operations.
///
/// `DeletedPosition` is part of the result vocabulary but is not produced by
/// any of the operations below; it is reserved for future delete semantics.
/// `OutdatedVersion` is only produced by the version gate, for callers
/// outside the batching path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("invalid position")]
    InvalidPosition,
    #[error("deleted position")]
    DeletedPosition,
    #[error("outdated version")]
    OutdatedVersion,
}

pub type EditResult = Result<(), EditError>;

/// The shared document: committed view, optional working view, and a
/// monotonic version counter.
#[derive(Debug, Default)]
pub struct Document {
    committed: SegmentList,
    working: Option<SegmentList>,
    version: u64,
    total_length: usize,
}

impl Document {
    /// Empty document at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Byte length of the committed flatten.
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    /// The committed text. Queries and snapshots read this; pending edits
    /// are invisible until the next commit.
    pub fn flatten(&self) -> Vec<u8> {
        self.committed.flatten()
    }

    /// The view edit operations read: the working list once one exists,
    /// otherwise the committed list.
    fn view(&self) -> &SegmentList {
        self.working.as_ref().unwrap_or(&self.committed)
    }

    /// Working list, materialised from the committed list on the first
    /// mutation of a new version. Cloned segments are all `Original`.
    fn working_mut(&mut self) -> &mut SegmentList {
        self.working.get_or_insert_with(|| self.committed.clone())
    }

    fn gate(&self, version: u64) -> EditResult {
        if version != self.version {
            return Err(EditError::OutdatedVersion);
        }
        Ok(())
    }

    /// Insert `text` at `pos`. Empty text is a no-op.
    pub fn insert(&mut self, version: u64, pos: usize, text: &str) -> EditResult {
        self.gate(version)?;
        if pos > self.view().visible_len() {
            return Err(EditError::InvalidPosition);
        }
        if text.is_empty() {
            return Ok(());
        }
        self.working_mut().insert(pos, text.as_bytes())
    }

    /// Tombstone `len` bytes at `pos`. Zero length is a no-op.
    pub fn delete(&mut self, version: u64, pos: usize, len: usize) -> EditResult {
        self.gate(version)?;
        let visible = self.view().visible_len();
        if pos > visible || len > visible - pos {
            return Err(EditError::InvalidPosition);
        }
        if len == 0 {
            return Ok(());
        }
        self.working_mut().delete(pos, len)
    }

    /// Insert a line break at `pos`.
    pub fn newline(&mut self, version: u64, pos: usize) -> EditResult {
        self.insert(version, pos, "\n")
    }

    /// Insert a level 1-3 heading marker at `pos`, breaking the line first
    /// when `pos` is not already at a line start.
    pub fn heading(&mut self, version: u64, level: u8, pos: usize) -> EditResult {
        self.gate(version)?;
        if !(1..=3).contains(&level) {
            return Err(EditError::InvalidPosition);
        }
        let mut marker = String::with_capacity(level as usize + 1);
        for _ in 0..level {
            marker.push('#');
        }
        marker.push(' ');
        self.block_insert(version, pos, &marker)
    }

    pub fn bold(&mut self, version: u64, start: usize, end: usize) -> EditResult {
        self.wrap(version, start, end, "**")
    }

    pub fn italic(&mut self, version: u64, start: usize, end: usize) -> EditResult {
        self.wrap(version, start, end, "*")
    }

    pub fn code(&mut self, version: u64, start: usize, end: usize) -> EditResult {
        self.wrap(version, start, end, "`")
    }

    pub fn blockquote(&mut self, version: u64, pos: usize) -> EditResult {
        self.block_insert(version, pos, "> ")
    }

    pub fn unordered_list(&mut self, version: u64, pos: usize) -> EditResult {
        self.block_insert(version, pos, "- ")
    }

    pub fn horizontal_rule(&mut self, version: u64, pos: usize) -> EditResult {
        self.block_insert(version, pos, "---\n")
    }

    /// Wrap `start..end` as a markdown link: `[text](url)`. The closing part
    /// goes in first so `end` stays valid.
    pub fn link(&mut self, version: u64, start: usize, end: usize, url: &str) -> EditResult {
        self.gate(version)?;
        let visible = self.view().visible_len();
        if start >= end || end > visible {
            return Err(EditError::InvalidPosition);
        }
        let close = format!("]({url})");
        let working = self.working_mut();
        working.insert(end, close.as_bytes())?;
        working.insert(start, b"[")
    }

    /// Insert an ordered list item at `pos`, numbered one past the item on
    /// the preceding line, then renumber the consecutive run of item lines
    /// that follows so the sequence stays contiguous.
    ///
    /// When the run begins exactly at `pos` the displaced items are rewritten
    /// onto their own lines after the new marker; the run is removed with one
    /// delete and re-inserted renumbered so the rewrite is atomic within the
    /// batch.
    pub fn ordered_list(&mut self, version: u64, pos: usize) -> EditResult {
        self.gate(version)?;
        let flat = self.view().flatten();
        if pos > flat.len() {
            return Err(EditError::InvalidPosition);
        }
        let at_line_start = pos == 0 || flat[pos - 1] == b'\n';
        let number = markdown::prev_item_number(&flat, pos) + 1;

        let mut marker = Vec::new();
        if !at_line_start {
            marker.push(b'\n');
        }
        marker.extend_from_slice(number.to_string().as_bytes());
        marker.extend_from_slice(b". ");

        // The walk starts on the line the new item claims: at `pos` itself
        // when it is a line start, otherwise on the next line.
        let scan_start = if at_line_start {
            Some(pos)
        } else {
            flat[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| pos + i + 1)
        };
        let run = scan_start
            .map(|start| (start, markdown::item_run_len(&flat, start)))
            .filter(|&(_, len)| len > 0);

        match run {
            Some((start, len)) if start == pos => {
                let renumbered = markdown::renumber_run(&flat[start..start + len], number + 1);
                let working = self.working_mut();
                working.delete(pos, len)?;
                let mut text = marker;
                text.push(b'\n');
                text.extend_from_slice(&renumbered);
                working.insert(pos, &text)
            }
            Some((start, len)) => {
                let renumbered = markdown::renumber_run(&flat[start..start + len], number + 1);
                let working = self.working_mut();
                working.delete(start, len)?;
                working.insert(start, &renumbered)?;
                working.insert(pos, &marker)
            }
            None => self.working_mut().insert(pos, &marker),
        }
    }

    /// Block markers start a fresh line: `pos` at a line start takes the
    /// marker as-is, anywhere else gets a leading newline.
    fn block_insert(&mut self, version: u64, pos: usize, marker: &str) -> EditResult {
        self.gate(version)?;
        let view = self.view();
        if pos > view.visible_len() {
            return Err(EditError::InvalidPosition);
        }
        let needs_break = pos > 0 && view.byte_at(pos - 1) != Some(b'\n');
        let mut text = Vec::with_capacity(marker.len() + 1);
        if needs_break {
            text.push(b'\n');
        }
        text.extend_from_slice(marker.as_bytes());
        self.working_mut().insert(pos, &text)
    }

    /// Range wrap shared by bold, italic and code: the closing marker goes
    /// in at `end` first so `start` does not shift under it.
    fn wrap(&mut self, version: u64, start: usize, end: usize, marker: &str) -> EditResult {
        self.gate(version)?;
        let visible = self.view().visible_len();
        if start >= end || end > visible {
            return Err(EditError::InvalidPosition);
        }
        let working = self.working_mut();
        working.insert(end, marker.as_bytes())?;
        working.insert(start, marker.as_bytes())
    }

    /// Fold the working list into the committed view and bump the version.
    /// Runs once per non-empty batch, whether or not any edit succeeded, so
    /// the version doubles as a tick counter. Returns the new version.
    pub fn commit(&mut self) -> u64 {
        if let Some(mut working) = self.working.take() {
            working.commit();
            self.committed = working;
        }
        self.version += 1;
        self.total_length = self.committed.visible_len();
        trace!(
            target: "doc.commit",
            version = self.version,
            length = self.total_length,
            "commit"
        );
        self.version
    }
}
