//! Typed errors for the note editor core.
//!
//! Scanning and serialization never fail: malformed markers fall back to
//! plain text. Only buffer transactions and the AI improvement path produce
//! errors that callers need to match on.

use thiserror::Error;

/// Rejected buffer edits.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("edit range {start}..{end} is outside the buffer (len {len})")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error(
        "edit {next_start}..{next_end} overlaps earlier edit {first_start}..{first_end}"
    )]
    OverlappingChanges {
        first_start: usize,
        first_end: usize,
        next_start: usize,
        next_end: usize,
    },

    /// The range does not fall on UTF-8 character boundaries.
    #[error("edit range {start}..{end} splits a character")]
    NotCharBoundary { start: usize, end: usize },
}

/// Failures on the AI improvement round trip. Shown to the user as a status
/// message; the note content is never touched.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ImproveError {
    #[error("AI request failed: {0}")]
    Request(String),

    #[error("nothing to improve: the selection is empty")]
    EmptySelection,

    #[error("no note is open")]
    NoActiveNote,
}
