//! Interactive widgets drawn in place of markers.
//!
//! Each controller is anchored to the note, span and exact source text of the
//! marker it was built from. UI events reach it as [`WidgetAction`] values and
//! every mutation goes through a [`WidgetHost`], never through shared globals.
//! A controller whose marker can no longer be found does nothing.

use crate::decorations::{Decoration, DecorationSet, RenderPayload};
use crate::editor_core::{map_position_through_changes, ApplyOutcome, ChangeOrigin, NoteBuffer, TextChange};
use crate::error::CoreError;
use crate::scanner::{checkbox_re, scan, MarkerKind, Span};
use crate::serializer::line_numbers;

/// The buffer a widget writes back into.
pub trait WidgetHost {
    fn note_id(&self) -> &str;
    fn text(&self) -> &str;
    fn revision(&self) -> u64;
    /// Change sets applied after `revision`, oldest first, or `None` when
    /// they are no longer known.
    fn changes_since(&self, revision: u64) -> Option<Vec<&[TextChange]>>;
    fn apply_widget_edit(
        &mut self,
        change: TextChange,
        label: &'static str,
    ) -> Result<ApplyOutcome, CoreError>;
}

impl WidgetHost for NoteBuffer {
    fn note_id(&self) -> &str {
        &self.note_id
    }

    fn text(&self) -> &str {
        &self.snapshot.text
    }

    fn revision(&self) -> u64 {
        self.snapshot.revision
    }

    fn changes_since(&self, revision: u64) -> Option<Vec<&[TextChange]>> {
        self.snapshot.changes_since(revision)
    }

    fn apply_widget_edit(
        &mut self,
        change: TextChange,
        label: &'static str,
    ) -> Result<ApplyOutcome, CoreError> {
        self.snapshot.apply_edit(change, ChangeOrigin::Widget, label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetAction {
    BeginEdit,
    UpdateDraft(String),
    Commit,
    Cancel,
    Delete,
    Copy,
    Toggle,
    Open,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetOutcome {
    /// The buffer changed; decorations must be rebuilt.
    Applied(ApplyOutcome),
    /// Widget-local state changed, or nothing happened.
    Unchanged,
    /// Hand the path to the file-open callback.
    Open(String),
    /// Put this text on the clipboard.
    Copy(String),
    /// The widget's marker is gone; nothing was touched.
    Stale,
}

/// Where a widget's marker was when the widget was built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WidgetAnchor {
    pub note_id: String,
    pub revision: u64,
    pub span: Span,
    pub source: String,
}

impl WidgetAnchor {
    fn new(host: &impl WidgetHost, span: Span) -> Self {
        Self {
            note_id: host.note_id().to_string(),
            revision: host.revision(),
            span,
            source: host.text()[span.start..span.end].to_string(),
        }
    }

    /// Current span of the anchored marker in `host`, if it can still be found.
    ///
    /// The old span is mapped through every edit made since the anchor was
    /// taken and must still hold the same marker. Only when the edit history
    /// is gone is the marker looked up by its source text, which must then be
    /// unique.
    pub fn resolve(&self, host: &impl WidgetHost) -> Option<Span> {
        if host.note_id() != self.note_id {
            return None;
        }
        let text = host.text();
        let Some(edits) = host.changes_since(self.revision) else {
            return self.relocate_by_source(text);
        };

        let start = edits
            .iter()
            .fold(self.span.start, |pos, changes| map_position_through_changes(pos, changes));
        let span = Span::new(start, start + self.source.len());
        if text.get(span.start..span.end) != Some(self.source.as_str()) {
            return None;
        }
        if edits.is_empty() || scan(text).iter().any(|m| m.span == span) {
            Some(span)
        } else {
            None
        }
    }

    fn relocate_by_source(&self, text: &str) -> Option<Span> {
        let markers = scan(text);
        let mut same_source = markers
            .iter()
            .filter(|m| m.source(text) == self.source)
            .map(|m| m.span);
        match (same_source.next(), same_source.next()) {
            (Some(span), None) => Some(span),
            _ => None,
        }
    }

    fn rebase(&mut self, host: &impl WidgetHost, span: Span) {
        *self = WidgetAnchor::new(host, span);
    }
}

fn stale(widget: &str, anchor: &WidgetAnchor) -> WidgetOutcome {
    log::warn!(
        "stale {widget} widget in note {} (was {}..{} at revision {}); ignoring",
        anchor.note_id,
        anchor.span.start,
        anchor.span.end,
        anchor.revision
    );
    WidgetOutcome::Stale
}

fn apply(
    host: &mut impl WidgetHost,
    change: TextChange,
    label: &'static str,
) -> WidgetOutcome {
    match host.apply_widget_edit(change, label) {
        Ok(outcome) => WidgetOutcome::Applied(outcome),
        Err(err) => {
            log::warn!("widget edit {label} rejected: {err}");
            WidgetOutcome::Stale
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeBlockState {
    Viewing,
    Editing { draft: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeBlockController {
    pub anchor: WidgetAnchor,
    pub language: String,
    pub code: String,
    pub state: CodeBlockState,
}

impl CodeBlockController {
    pub fn begin_edit(&mut self) {
        if self.state == CodeBlockState::Viewing {
            self.state = CodeBlockState::Editing {
                draft: self.code.clone(),
            };
        }
    }

    pub fn update_draft(&mut self, text: impl Into<String>) {
        self.state = CodeBlockState::Editing { draft: text.into() };
    }

    pub fn cancel(&mut self) {
        self.state = CodeBlockState::Viewing;
    }

    pub fn copy_text(&self) -> String {
        self.code.clone()
    }

    /// Gutter contents: one number per code line.
    pub fn line_numbers(&self) -> String {
        let code = match &self.state {
            CodeBlockState::Editing { draft } => draft,
            CodeBlockState::Viewing => &self.code,
        };
        line_numbers(code)
    }

    /// Writes the draft back as a canonical fence over the block's span.
    pub fn commit(&mut self, host: &mut impl WidgetHost) -> WidgetOutcome {
        let CodeBlockState::Editing { draft } = std::mem::replace(&mut self.state, CodeBlockState::Viewing)
        else {
            return WidgetOutcome::Unchanged;
        };
        if draft == self.code {
            return WidgetOutcome::Unchanged;
        }
        if draft.contains("```") {
            log::debug!("code block draft holds a fence delimiter; keeping it in edit");
            self.state = CodeBlockState::Editing { draft };
            return WidgetOutcome::Unchanged;
        }
        let Some(span) = self.anchor.resolve(&*host) else {
            return stale("code block", &self.anchor);
        };

        let replacement = MarkerKind::CodeFence {
            language: self.language.clone(),
            body: draft.clone(),
        }
        .canonical_text();
        let new_len = replacement.len();
        let outcome = apply(
            host,
            TextChange::new(span.start, span.end, replacement),
            "code-block-commit",
        );
        if let WidgetOutcome::Applied(_) = outcome {
            self.code = draft;
            self.anchor
                .rebase(&*host, Span::new(span.start, span.start + new_len));
        }
        outcome
    }

    pub fn delete(&self, host: &mut impl WidgetHost) -> WidgetOutcome {
        match self.anchor.resolve(&*host) {
            Some(span) => apply(host, TextChange::delete(span.start, span.end), "code-block-delete"),
            None => stale("code block", &self.anchor),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckboxController {
    pub anchor: WidgetAnchor,
    pub checked: bool,
}

impl CheckboxController {
    pub fn toggle(&mut self, host: &mut impl WidgetHost) -> WidgetOutcome {
        let Some(span) = self.anchor.resolve(&*host) else {
            return stale("checkbox", &self.anchor);
        };
        let Some(next) = toggled_marker(&host.text()[span.start..span.end]) else {
            return stale("checkbox", &self.anchor);
        };
        let outcome = apply(host, TextChange::new(span.start, span.end, next), "checkbox-toggle");
        if let WidgetOutcome::Applied(_) = outcome {
            self.checked = !self.checked;
            self.anchor.rebase(&*host, span);
        }
        outcome
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileLinkController {
    pub anchor: WidgetAnchor,
    pub path: String,
    pub label: Option<String>,
}

impl FileLinkController {
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.path)
    }

    pub fn open(&self) -> WidgetOutcome {
        WidgetOutcome::Open(self.path.clone())
    }

    /// Removes the link from the note text, not just from view.
    pub fn delete(&self, host: &mut impl WidgetHost) -> WidgetOutcome {
        match self.anchor.resolve(&*host) {
            Some(span) => apply(host, TextChange::delete(span.start, span.end), "file-link-delete"),
            None => stale("file link", &self.anchor),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetController {
    CodeBlock(CodeBlockController),
    InlineCode { anchor: WidgetAnchor, code: String },
    Checkbox(CheckboxController),
    FileLink(FileLinkController),
}

impl WidgetController {
    /// Builds the controller for a marker decoration. Overlay decorations
    /// have no controller.
    pub fn for_decoration(host: &impl WidgetHost, decoration: &Decoration) -> Option<Self> {
        let span = decoration.span;
        host.text().get(span.start..span.end)?;
        let anchor = WidgetAnchor::new(host, span);
        let controller = match &decoration.payload {
            RenderPayload::CodeBlock { language, code } => WidgetController::CodeBlock(CodeBlockController {
                anchor,
                language: language.clone(),
                code: code.clone(),
                state: CodeBlockState::Viewing,
            }),
            RenderPayload::InlineCode { code } => WidgetController::InlineCode {
                anchor,
                code: code.clone(),
            },
            RenderPayload::Checkbox { checked } => WidgetController::Checkbox(CheckboxController {
                anchor,
                checked: *checked,
            }),
            RenderPayload::FileLink { path, label } => WidgetController::FileLink(FileLinkController {
                anchor,
                path: path.clone(),
                label: label.clone(),
            }),
            RenderPayload::ZoneHighlight | RenderPayload::ZoneSpinner { .. } => return None,
        };
        Some(controller)
    }

    pub fn anchor(&self) -> &WidgetAnchor {
        match self {
            WidgetController::CodeBlock(c) => &c.anchor,
            WidgetController::InlineCode { anchor, .. } => anchor,
            WidgetController::Checkbox(c) => &c.anchor,
            WidgetController::FileLink(c) => &c.anchor,
        }
    }

    pub fn handle(&mut self, action: WidgetAction, host: &mut impl WidgetHost) -> WidgetOutcome {
        match (self, action) {
            (WidgetController::CodeBlock(c), WidgetAction::BeginEdit) => {
                c.begin_edit();
                WidgetOutcome::Unchanged
            }
            (WidgetController::CodeBlock(c), WidgetAction::UpdateDraft(text)) => {
                c.update_draft(text);
                WidgetOutcome::Unchanged
            }
            (WidgetController::CodeBlock(c), WidgetAction::Commit) => c.commit(host),
            (WidgetController::CodeBlock(c), WidgetAction::Cancel) => {
                c.cancel();
                WidgetOutcome::Unchanged
            }
            (WidgetController::CodeBlock(c), WidgetAction::Delete) => c.delete(host),
            (WidgetController::CodeBlock(c), WidgetAction::Copy) => WidgetOutcome::Copy(c.copy_text()),
            (WidgetController::InlineCode { code, .. }, WidgetAction::Copy) => {
                WidgetOutcome::Copy(code.clone())
            }
            (WidgetController::Checkbox(c), WidgetAction::Toggle) => c.toggle(host),
            (WidgetController::FileLink(c), WidgetAction::Open) => c.open(),
            (WidgetController::FileLink(c), WidgetAction::Delete) => c.delete(host),
            (controller, action) => {
                log::debug!(
                    "action {action:?} not supported by widget at {:?}",
                    controller.anchor().span
                );
                WidgetOutcome::Unchanged
            }
        }
    }
}

/// Controllers for every widget decoration of the buffer's current text.
pub fn controllers_for(buffer: &NoteBuffer, decorations: &DecorationSet) -> Vec<WidgetController> {
    decorations
        .iter()
        .filter_map(|d| WidgetController::for_decoration(buffer, d))
        .collect()
}

fn toggled_marker(marker: &str) -> Option<&'static str> {
    match marker {
        "[ ]" => Some("[x]"),
        "[x]" | "[X]" => Some("[ ]"),
        _ => None,
    }
}

/// Flips the checkbox starting at byte `pos`, leaving every other byte alone.
///
/// Returns `None` when no checkbox marker starts at `pos`.
pub fn toggle_checkbox_at(text: &str, pos: usize) -> Option<String> {
    let marker = text.get(pos..pos.checked_add(3)?)?;
    if !checkbox_re().is_match(marker) {
        return None;
    }
    let next = toggled_marker(marker)?;
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..pos]);
    out.push_str(next);
    out.push_str(&text[pos + 3..]);
    Some(out)
}
