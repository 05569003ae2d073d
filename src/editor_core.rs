use crate::error::CoreError;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn cursor(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn is_cursor(self) -> bool {
        self.start == self.end
    }

    pub fn clamp(self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end.min(len))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChange {
    pub start: usize,
    pub end: usize,
    pub insert: String,
}

impl TextChange {
    pub fn new(start: usize, end: usize, insert: impl Into<String>) -> Self {
        Self {
            start,
            end,
            insert: insert.into(),
        }
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Self::new(start, end, "")
    }

    /// Net change in buffer length caused by this edit.
    pub fn delta(&self) -> isize {
        self.insert.len() as isize - (self.end - self.start) as isize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChangeOrigin {
    Input,
    Command,
    Widget,
    Assistant,
    #[default]
    System,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub changes: Vec<TextChange>,
    pub selection_after: Option<Selection>,
    pub origin: ChangeOrigin,
    pub label: &'static str,
}

impl Transaction {
    pub fn single(
        change: TextChange,
        selection_after: Option<Selection>,
        origin: ChangeOrigin,
        label: &'static str,
    ) -> Self {
        Self {
            changes: vec![change],
            selection_after,
            origin,
            label,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub text_changed: bool,
    pub selection_changed: bool,
    pub revision: u64,
}

/// How many change sets a snapshot remembers for anchor mapping.
const HISTORY_LIMIT: usize = 64;

/// The changes that produced `revision` from the one before it.
#[derive(Clone, Debug, PartialEq, Eq)]
struct RecordedEdit {
    revision: u64,
    changes: Vec<TextChange>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditorSnapshot {
    pub text: String,
    pub selection: Selection,
    pub revision: u64,
    history: VecDeque<RecordedEdit>,
}

impl EditorSnapshot {
    pub fn new(text: String) -> Self {
        let len = text.len();
        Self {
            text,
            selection: Selection::cursor(len),
            revision: 0,
            history: VecDeque::new(),
        }
    }

    /// Change sets applied after `revision`, oldest first. `None` once the
    /// history no longer reaches back that far.
    pub fn changes_since(&self, revision: u64) -> Option<Vec<&[TextChange]>> {
        if revision == self.revision {
            return Some(Vec::new());
        }
        if revision > self.revision {
            return None;
        }
        let first = self.history.iter().position(|e| e.revision == revision + 1)?;
        Some(
            self.history
                .iter()
                .skip(first)
                .map(|e| e.changes.as_slice())
                .collect(),
        )
    }

    fn record(&mut self, changes: Vec<TextChange>) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(RecordedEdit {
            revision: self.revision,
            changes,
        });
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection.clamp(self.text.len());
    }

    pub fn replace_from_input(&mut self, new_text: String, selection: Selection) -> ApplyOutcome {
        let next_selection = selection.clamp(new_text.len());
        let change = diff_change(&self.text, &new_text);
        let text_changed = change.is_some();
        let selection_changed = self.selection != next_selection;

        self.text = new_text;
        self.selection = next_selection;
        if let Some(change) = change {
            self.revision += 1;
            self.record(vec![change]);
        }

        ApplyOutcome {
            text_changed,
            selection_changed,
            revision: self.revision,
        }
    }

    /// Applies a single edit, keeping the selection mapped through it.
    pub fn apply_edit(
        &mut self,
        change: TextChange,
        origin: ChangeOrigin,
        label: &'static str,
    ) -> Result<ApplyOutcome, CoreError> {
        self.apply_transaction(Transaction::single(change, None, origin, label))
    }

    pub fn apply_transaction(
        &mut self,
        transaction: Transaction,
    ) -> Result<ApplyOutcome, CoreError> {
        let normalized = normalize_changes(&transaction.changes, &self.text)?;
        let next_text = if normalized.is_empty() {
            self.text.clone()
        } else {
            apply_changes_to_text(&self.text, &normalized)
        };

        let next_selection = transaction
            .selection_after
            .map(|selection| selection.clamp(next_text.len()))
            .unwrap_or_else(|| {
                Selection::new(
                    map_position_through_changes(self.selection.start, &normalized),
                    map_position_through_changes(self.selection.end, &normalized),
                )
                .clamp(next_text.len())
            });

        let text_changed = self.text != next_text;
        let selection_changed = self.selection != next_selection;

        self.text = next_text;
        self.selection = next_selection;
        if text_changed {
            self.revision += 1;
            self.record(normalized);
        }

        Ok(ApplyOutcome {
            text_changed,
            selection_changed,
            revision: self.revision,
        })
    }
}

/// The in-memory text of the note that currently owns the editor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteBuffer {
    pub note_id: String,
    pub snapshot: EditorSnapshot,
}

impl NoteBuffer {
    pub fn new(note_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            snapshot: EditorSnapshot::new(text.into()),
        }
    }

    pub fn text(&self) -> &str {
        &self.snapshot.text
    }

    pub fn revision(&self) -> u64 {
        self.snapshot.revision
    }
}

fn normalize_changes(changes: &[TextChange], text: &str) -> Result<Vec<TextChange>, CoreError> {
    let len = text.len();
    let mut sorted = changes.to_vec();
    sorted.sort_by_key(|change| (change.start, change.end));

    for change in &sorted {
        if change.start > change.end || change.end > len {
            return Err(CoreError::InvalidRange {
                start: change.start,
                end: change.end,
                len,
            });
        }
        if !text.is_char_boundary(change.start) || !text.is_char_boundary(change.end) {
            return Err(CoreError::NotCharBoundary {
                start: change.start,
                end: change.end,
            });
        }
    }

    for pair in sorted.windows(2) {
        let first = &pair[0];
        let next = &pair[1];
        if next.start < first.end {
            return Err(CoreError::OverlappingChanges {
                first_start: first.start,
                first_end: first.end,
                next_start: next.start,
                next_end: next.end,
            });
        }
    }

    Ok(sorted)
}

fn apply_changes_to_text(text: &str, changes: &[TextChange]) -> String {
    let mut out = String::new();
    let mut cursor = 0usize;
    for change in changes {
        out.push_str(&text[cursor..change.start]);
        out.push_str(&change.insert);
        cursor = change.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Maps a position in the old text to the new text. `changes` must be sorted
/// and non-overlapping, as produced for a transaction.
pub fn map_position_through_changes(pos: usize, changes: &[TextChange]) -> usize {
    let mut shift = 0isize;
    for change in changes {
        if pos < change.start {
            break;
        }
        if pos <= change.end {
            // Inside a replaced range: land after the inserted text.
            return change.start.saturating_add_signed(shift) + change.insert.len();
        }
        shift += change.delta();
    }
    pos.saturating_add_signed(shift)
}

/// The smallest single edit turning `old` into `new`.
pub fn diff_change(old: &str, new: &str) -> Option<TextChange> {
    if old == new {
        return None;
    }
    let prefix = old
        .char_indices()
        .zip(new.chars())
        .find(|((_, a), b)| a != b)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| old.len().min(new.len()));
    let suffix: usize = old[prefix..]
        .chars()
        .rev()
        .zip(new[prefix..].chars().rev())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum();
    Some(TextChange::new(
        prefix,
        old.len() - suffix,
        &new[prefix..new.len() - suffix],
    ))
}

/// Editing commands bound to toolbar buttons and shortcuts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoteCommand {
    InsertCodeBlock { language: String },
    WrapCodeMention,
    InsertFileMention { path: String },
    InsertFileLink { name: String, path: String },
    ToggleCheckboxPrefix,
    ContinueChecklist,
}

pub fn apply_note_command(
    snapshot: &mut EditorSnapshot,
    command: &NoteCommand,
) -> Result<bool, CoreError> {
    let Some(transaction) = build_note_transaction(snapshot, command) else {
        return Ok(false);
    };
    let outcome = snapshot.apply_transaction(transaction)?;
    Ok(outcome.text_changed || outcome.selection_changed)
}

fn build_note_transaction(snapshot: &EditorSnapshot, command: &NoteCommand) -> Option<Transaction> {
    match command {
        NoteCommand::InsertCodeBlock { language } => code_block_transaction(snapshot, language),
        NoteCommand::WrapCodeMention => code_mention_transaction(snapshot),
        NoteCommand::InsertFileMention { path } => {
            if path.is_empty() || path.contains('}') {
                return None;
            }
            Some(replace_selection(
                snapshot,
                format!("@file{{{path}}}"),
                "insert-file-mention",
            ))
        }
        NoteCommand::InsertFileLink { name, path } => file_link_transaction(snapshot, name, path),
        NoteCommand::ToggleCheckboxPrefix => Some(toggle_checkbox_prefix_transaction(snapshot)),
        NoteCommand::ContinueChecklist => continue_checklist_transaction(snapshot),
    }
}

fn is_bare_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn code_block_transaction(snapshot: &EditorSnapshot, language: &str) -> Option<Transaction> {
    let text = &snapshot.text;
    let selection = snapshot.selection.clamp(text.len());
    let body = &text[selection.start..selection.end];
    // A delimiter inside the body would close the fence early.
    if body.contains("```") {
        return None;
    }
    let language = if is_bare_word(language) {
        language
    } else {
        "plaintext"
    };

    let lead = if selection.start == line_start(text, selection.start) {
        ""
    } else {
        "\n"
    };
    let open = format!("{lead}```{language}\n");
    let insert = format!("{open}{body}\n```");

    let selection_after = if selection.is_cursor() {
        Selection::cursor(selection.start + open.len())
    } else {
        Selection::cursor(selection.start + insert.len())
    };
    Some(Transaction::single(
        TextChange::new(selection.start, selection.end, insert),
        Some(selection_after),
        ChangeOrigin::Command,
        "insert-code-block",
    ))
}

fn code_mention_transaction(snapshot: &EditorSnapshot) -> Option<Transaction> {
    let selection = snapshot.selection.clamp(snapshot.text.len());
    let selected = &snapshot.text[selection.start..selection.end];
    if selected.contains('}') || selected.contains('\n') {
        return None;
    }
    let insert = format!("@code{{{selected}}}");
    let selection_after = if selection.is_cursor() {
        Selection::cursor(selection.start + "@code{".len())
    } else {
        Selection::cursor(selection.start + insert.len())
    };
    Some(Transaction::single(
        TextChange::new(selection.start, selection.end, insert),
        Some(selection_after),
        ChangeOrigin::Command,
        "wrap-code-mention",
    ))
}

fn file_link_transaction(snapshot: &EditorSnapshot, name: &str, path: &str) -> Option<Transaction> {
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.contains(')') {
        return None;
    }
    let name = if name.trim().is_empty() {
        path.rsplit('/').next().unwrap_or(path)
    } else {
        name
    };
    if name.contains(']') {
        return None;
    }
    Some(replace_selection(
        snapshot,
        format!("[{name}](file:///{path})"),
        "insert-file-link",
    ))
}

fn replace_selection(snapshot: &EditorSnapshot, insert: String, label: &'static str) -> Transaction {
    let selection = snapshot.selection.clamp(snapshot.text.len());
    let selection_after = Selection::cursor(selection.start + insert.len());
    Transaction::single(
        TextChange::new(selection.start, selection.end, insert),
        Some(selection_after),
        ChangeOrigin::Command,
        label,
    )
}

fn checkbox_prefix_re() -> &'static Regex {
    static RE_PREFIX: OnceLock<Regex> = OnceLock::new();
    RE_PREFIX.get_or_init(|| Regex::new(r"^(\s*)\[(?: |x|X)\] ?").unwrap())
}

fn toggle_checkbox_prefix_transaction(snapshot: &EditorSnapshot) -> Transaction {
    let text = &snapshot.text;
    let selection = snapshot.selection.clamp(text.len());
    let ls = line_start(text, selection.start);
    let le = line_end(text, selection.start);
    let line = &text[ls..le];

    if let Some(cap) = checkbox_prefix_re().captures(line) {
        let indent = cap.get(1).map(|m| m.len()).unwrap_or_default();
        let marker_len = cap.get(0).map(|m| m.len()).unwrap_or_default() - indent;
        let from = ls + indent;
        let shift = |pos: usize| {
            if pos <= from {
                pos
            } else {
                pos.saturating_sub(marker_len).max(from)
            }
        };
        return Transaction::single(
            TextChange::delete(from, from + marker_len),
            Some(Selection::new(shift(selection.start), shift(selection.end))),
            ChangeOrigin::Command,
            "remove-checkbox",
        );
    }

    let prefix = "[ ] ";
    Transaction::single(
        TextChange::new(ls, ls, prefix),
        Some(Selection::new(
            selection.start + prefix.len(),
            selection.end + prefix.len(),
        )),
        ChangeOrigin::Command,
        "add-checkbox",
    )
}

fn continue_checklist_transaction(snapshot: &EditorSnapshot) -> Option<Transaction> {
    let text = &snapshot.text;
    let selection = snapshot.selection.clamp(text.len());
    if !selection.is_cursor() {
        return None;
    }

    static RE_ITEM: OnceLock<Regex> = OnceLock::new();
    let re_item = RE_ITEM.get_or_init(|| Regex::new(r"^(\s*)\[(?: |x|X)\]\s*(.*)$").unwrap());

    let ls = line_start(text, selection.start);
    let le = line_end(text, selection.start);
    let line = &text[ls..le];
    let cap = re_item.captures(line)?;

    let body = cap.get(2).map(|m| m.as_str()).unwrap_or_default();
    if body.trim().is_empty() {
        // Enter on an empty item ends the list: the bare marker goes away.
        return Some(Transaction::single(
            TextChange::delete(ls, le),
            Some(Selection::cursor(ls)),
            ChangeOrigin::Command,
            "end-checklist",
        ));
    }
    let indent = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
    let insert = format!("\n{indent}[ ] ");

    let next_cursor = selection.start + insert.len();
    Some(Transaction::single(
        TextChange::new(selection.start, selection.end, insert),
        Some(Selection::cursor(next_cursor)),
        ChangeOrigin::Command,
        "continue-checklist",
    ))
}

pub(crate) fn line_start(text: &str, pos: usize) -> usize {
    let clamped = pos.min(text.len());
    text[..clamped].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

pub(crate) fn line_end(text: &str, pos: usize) -> usize {
    let clamped = pos.min(text.len());
    text[clamped..]
        .find('\n')
        .map(|i| clamped + i)
        .unwrap_or(text.len())
}

/// Converts a browser (UTF-16) offset into a byte offset of `s`.
pub fn utf16_to_byte_idx(s: &str, pos_utf16: u32) -> usize {
    if pos_utf16 == 0 {
        return 0;
    }
    let mut acc: u32 = 0;
    for (i, ch) in s.char_indices() {
        let w = ch.len_utf16() as u32;
        if acc + w > pos_utf16 {
            return i;
        }
        acc += w;
        if acc == pos_utf16 {
            return i + ch.len_utf8();
        }
    }
    s.len()
}

pub fn byte_idx_to_utf16(s: &str, byte_idx: usize) -> u32 {
    let mut idx = byte_idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    s[..idx].encode_utf16().count() as u32
}
