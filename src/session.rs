//! The note that currently owns the editor.
//!
//! Everything asynchronous (saving, AI requests) is expressed as effects: the
//! session hands out [`SaveRequest`] / [`ImproveRequest`] values and is told
//! about their results later. Time comes in as `now_ms` so the debounce can be
//! driven by any clock.

use crate::checklist::{self, NoteMode};
use crate::config::EditorConfig;
use crate::decorations::{build_decorations, Decoration, DecorationSet, ZoneState};
use crate::editor_core::{
    apply_note_command, diff_change, ApplyOutcome, ChangeOrigin, NoteBuffer, NoteCommand, Selection,
    TextChange,
};
use crate::error::{CoreError, ImproveError};
use crate::scanner::Span;
use crate::widgets::{controllers_for, WidgetAction, WidgetController, WidgetOutcome};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveRequest {
    pub note_id: String,
    pub content: String,
    pub is_list: bool,
    pub revision: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImproveRequest {
    pub ticket: u64,
    pub note_id: String,
    pub text: String,
}

/// An AI rewrite waiting for the user's decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub ticket: u64,
    pub original: String,
    pub replacement: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingImprovement {
    ticket: u64,
    original: String,
}

#[derive(Clone, Debug)]
struct ActiveNote {
    buffer: NoteBuffer,
    mode: NoteMode,
    decorations: DecorationSet,
    zone: ZoneState,
    dirty: bool,
    last_edit_ms: u64,
    saving_revision: Option<u64>,
    pending: Option<PendingImprovement>,
    proposal: Option<Proposal>,
}

impl ActiveNote {
    fn save_request(&mut self) -> SaveRequest {
        self.saving_revision = Some(self.buffer.revision());
        SaveRequest {
            note_id: self.buffer.note_id.clone(),
            content: self.buffer.text().to_string(),
            is_list: self.mode.is_list(),
            revision: self.buffer.revision(),
        }
    }

    /// Bookkeeping after the buffer text moved from `old_text`.
    fn text_changed(&mut self, old_text: &str, now_ms: u64) {
        if let Some(change) = diff_change(old_text, self.buffer.text()) {
            self.zone.map_through(&[change]);
        }
        self.decorations = build_decorations(self.buffer.text(), Some(&self.decorations));
        self.dirty = true;
        self.last_edit_ms = now_ms;
    }

    fn replace_text(&mut self, next: String, now_ms: u64) -> ApplyOutcome {
        let old_text = self.buffer.text().to_string();
        let selection = Selection::cursor(next.len());
        let outcome = self.buffer.snapshot.replace_from_input(next, selection);
        if outcome.text_changed {
            self.text_changed(&old_text, now_ms);
        }
        outcome
    }
}

#[derive(Clone, Debug)]
pub struct NoteSession {
    config: EditorConfig,
    active: Option<ActiveNote>,
    next_ticket: u64,
    status: Option<String>,
}

impl NoteSession {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            active: None,
            next_ticket: 1,
            status: None,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EditorConfig) {
        self.config = config;
    }

    /// Makes `note_id` the active note. A pending edit of the previous note
    /// is flushed first and returned as a save request.
    pub fn open_note(&mut self, note_id: &str, content: &str, mode: NoteMode) -> Option<SaveRequest> {
        if self.active_note_id() == Some(note_id) {
            return None;
        }
        let flush = self.active.as_mut().filter(|a| a.dirty).map(ActiveNote::save_request);
        let buffer = NoteBuffer::new(note_id, content);
        log::debug!("opening note {note_id} ({} bytes)", content.len());
        self.active = Some(ActiveNote {
            decorations: build_decorations(buffer.text(), None),
            buffer,
            mode,
            zone: ZoneState::default(),
            dirty: false,
            last_edit_ms: 0,
            saving_revision: None,
            pending: None,
            proposal: None,
        });
        flush
    }

    /// Drops all state of a note that no longer exists.
    pub fn note_deleted(&mut self, note_id: &str) {
        if self.active_note_id() == Some(note_id) {
            log::info!("active note {note_id} deleted");
            self.active = None;
        }
    }

    pub fn active_note_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.buffer.note_id.as_str())
    }

    pub fn buffer(&self) -> Option<&NoteBuffer> {
        self.active.as_ref().map(|a| &a.buffer)
    }

    pub fn text(&self) -> &str {
        self.active.as_ref().map(|a| a.buffer.text()).unwrap_or_default()
    }

    pub fn mode(&self) -> NoteMode {
        self.active.as_ref().map(|a| a.mode).unwrap_or_default()
    }

    pub fn decorations(&self) -> Option<&DecorationSet> {
        self.active.as_ref().map(|a| &a.decorations)
    }

    pub fn zone(&self) -> Option<Span> {
        self.active.as_ref().and_then(|a| a.zone.span())
    }

    pub fn zone_decorations(&self) -> Vec<Decoration> {
        match &self.active {
            Some(a) => a.zone.decorations(a.buffer.text(), &self.config.spinner),
            None => Vec::new(),
        }
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.active.as_ref().and_then(|a| a.proposal.as_ref())
    }

    pub fn is_dirty(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.dirty)
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    /// The textarea reported new contents.
    pub fn input(&mut self, new_text: String, selection: Selection, now_ms: u64) -> Option<ApplyOutcome> {
        let active = self.active.as_mut()?;
        let old_text = active.buffer.text().to_string();
        let outcome = active.buffer.snapshot.replace_from_input(new_text, selection);
        if outcome.text_changed {
            active.text_changed(&old_text, now_ms);
        }
        Some(outcome)
    }

    pub fn set_selection(&mut self, selection: Selection) {
        if let Some(active) = self.active.as_mut() {
            active.buffer.snapshot.set_selection(selection);
        }
    }

    pub fn apply_command(&mut self, command: &NoteCommand, now_ms: u64) -> Result<bool, CoreError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        let old_text = active.buffer.text().to_string();
        let changed = apply_note_command(&mut active.buffer.snapshot, command)?;
        if changed && old_text != active.buffer.text() {
            active.text_changed(&old_text, now_ms);
        }
        Ok(changed)
    }

    /// Controllers for the widgets currently on screen.
    pub fn controllers(&self) -> Vec<WidgetController> {
        match &self.active {
            Some(a) => controllers_for(&a.buffer, &a.decorations),
            None => Vec::new(),
        }
    }

    pub fn handle_widget(
        &mut self,
        controller: &mut WidgetController,
        action: WidgetAction,
        now_ms: u64,
    ) -> WidgetOutcome {
        let Some(active) = self.active.as_mut() else {
            return WidgetOutcome::Stale;
        };
        let old_text = active.buffer.text().to_string();
        let outcome = controller.handle(action, &mut active.buffer);
        if matches!(outcome, WidgetOutcome::Applied(ref o) if o.text_changed) {
            active.text_changed(&old_text, now_ms);
        }
        outcome
    }

    /// Switches between free text and checklist, rewriting the content.
    pub fn set_mode(&mut self, mode: NoteMode, now_ms: u64) {
        let suffix = self.config.checked_suffix.clone();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.mode == mode {
            return;
        }
        let converted = mode.convert(active.buffer.text(), &suffix);
        active.mode = mode;
        active.replace_text(converted, now_ms);
        // The mode flag itself must be persisted even if the text survived.
        active.dirty = true;
        active.last_edit_ms = now_ms;
    }

    pub fn toggle_item(&mut self, index: usize, now_ms: u64) -> bool {
        self.edit_checklist(now_ms, |content| checklist::toggle_item(content, index))
    }

    pub fn update_item_text(&mut self, index: usize, text: &str, now_ms: u64) -> bool {
        self.edit_checklist(now_ms, |content| checklist::update_item_text(content, index, text))
    }

    pub fn add_item(&mut self, text: &str, now_ms: u64) -> bool {
        self.edit_checklist(now_ms, |content| checklist::add_item(content, text))
    }

    fn edit_checklist(&mut self, now_ms: u64, edit: impl FnOnce(&str) -> Option<String>) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        match edit(active.buffer.text()) {
            Some(next) => active.replace_text(next, now_ms).text_changed,
            None => false,
        }
    }

    /// Called periodically; flushes once the note has been idle long enough.
    pub fn tick(&mut self, now_ms: u64) -> Option<SaveRequest> {
        let idle_ms = self.config.autosave_idle_ms;
        let active = self.active.as_mut()?;
        if !active.dirty || active.saving_revision == Some(active.buffer.revision()) {
            return None;
        }
        if now_ms.saturating_sub(active.last_edit_ms) < idle_ms {
            return None;
        }
        self.status = Some("Saving…".to_string());
        Some(active.save_request())
    }

    pub fn save_now(&mut self) -> Option<SaveRequest> {
        let active = self.active.as_mut().filter(|a| a.dirty)?;
        self.status = Some("Saving…".to_string());
        Some(active.save_request())
    }

    /// The backend stored `revision` of `note_id`.
    pub fn save_succeeded(&mut self, note_id: &str, revision: u64) {
        let Some(active) = self.active.as_mut().filter(|a| a.buffer.note_id == note_id) else {
            return;
        };
        if active.saving_revision == Some(revision) {
            active.saving_revision = None;
        }
        if active.buffer.revision() == revision {
            active.dirty = false;
            self.status = Some("Saved".to_string());
        }
    }

    /// The save failed; the note stays dirty and is retried after another
    /// idle period.
    pub fn save_failed(&mut self, note_id: &str, error: &str, now_ms: u64) {
        log::warn!("saving note {note_id} failed: {error}");
        self.status = Some(format!("Error saving: {error}"));
        if let Some(active) = self.active.as_mut().filter(|a| a.buffer.note_id == note_id) {
            active.saving_revision = None;
            active.last_edit_ms = now_ms;
        }
    }

    /// Starts an AI rewrite of `selection`. Any earlier request or proposal
    /// is superseded.
    pub fn request_improvement(&mut self, selection: Selection) -> Result<ImproveRequest, ImproveError> {
        let active = self.active.as_mut().ok_or(ImproveError::NoActiveNote)?;
        let text = active.buffer.text();
        let selection = selection.clamp(text.len());
        let original = text
            .get(selection.start..selection.end)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ImproveError::EmptySelection)?
            .to_string();

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        active.zone.mark_zone(selection.start, selection.end);
        active.proposal = None;
        active.pending = Some(PendingImprovement {
            ticket,
            original: original.clone(),
        });
        self.status = Some("Improving…".to_string());
        Ok(ImproveRequest {
            ticket,
            note_id: active.buffer.note_id.clone(),
            text: original,
        })
    }

    /// Delivers the result for `ticket`. Results for superseded tickets, or
    /// for a note that is no longer active, are dropped.
    pub fn complete_improvement(&mut self, ticket: u64, result: Result<String, ImproveError>) -> bool {
        let Some(active) = self
            .active
            .as_mut()
            .filter(|a| a.pending.as_ref().is_some_and(|p| p.ticket == ticket))
        else {
            log::debug!("discarding result of superseded improvement {ticket}");
            return false;
        };
        let Some(pending) = active.pending.take() else {
            return false;
        };
        match result {
            Ok(replacement) => {
                active.proposal = Some(Proposal {
                    ticket,
                    original: pending.original,
                    replacement,
                });
                self.status = Some("Suggestion ready".to_string());
            }
            Err(err) => {
                log::warn!("improvement {ticket} failed: {err}");
                active.zone.clear_zone();
                self.status = Some(err.to_string());
            }
        }
        true
    }

    /// Applies the pending proposal if the zone still holds the text that
    /// was sent.
    pub fn accept_proposal(&mut self, now_ms: u64) -> Result<bool, CoreError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        let Some(proposal) = active.proposal.take() else {
            return Ok(false);
        };
        let zone = active.zone.span();
        active.zone.clear_zone();
        let Some(span) = zone.filter(|s| active.buffer.text().get(s.start..s.end) == Some(proposal.original.as_str()))
        else {
            log::debug!("proposal {} no longer matches the note", proposal.ticket);
            self.status = Some("Suggestion discarded: the text changed".to_string());
            return Ok(false);
        };

        let old_text = active.buffer.text().to_string();
        let outcome = active.buffer.snapshot.apply_edit(
            TextChange::new(span.start, span.end, proposal.replacement),
            ChangeOrigin::Assistant,
            "ai-improvement",
        )?;
        if outcome.text_changed {
            active.text_changed(&old_text, now_ms);
        }
        self.status = Some("Suggestion applied".to_string());
        Ok(outcome.text_changed)
    }

    pub fn reject_proposal(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.proposal = None;
            active.pending = None;
            active.zone.clear_zone();
        }
        self.status = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> NoteSession {
        NoteSession::new(EditorConfig::default())
    }

    fn type_text(session: &mut NoteSession, text: &str, now_ms: u64) {
        session.input(text.to_string(), Selection::cursor(text.len()), now_ms);
    }

    #[test]
    fn switching_notes_flushes_pending_edit() {
        let mut s = session();
        assert_eq!(s.open_note("a", "first", NoteMode::FreeText), None);
        type_text(&mut s, "first edit", 100);

        let flushed = s.open_note("b", "second", NoteMode::FreeText).expect("flush");
        assert_eq!(flushed.note_id, "a");
        assert_eq!(flushed.content, "first edit");
        assert_eq!(s.active_note_id(), Some("b"));
        assert_eq!(s.text(), "second");
        assert!(!s.is_dirty());
    }

    #[test]
    fn autosave_waits_for_idle_period() {
        let mut s = session();
        s.open_note("a", "", NoteMode::FreeText);
        type_text(&mut s, "h", 0);
        assert_eq!(s.tick(5_000), None);
        type_text(&mut s, "hi", 6_000);
        assert_eq!(s.tick(15_999), None);

        let save = s.tick(16_000).expect("idle save");
        assert_eq!(save.content, "hi");
        assert_eq!(s.tick(17_000), None, "save already in flight");

        s.save_succeeded("a", save.revision);
        assert!(!s.is_dirty());
        assert_eq!(s.status(), Some("Saved"));
    }

    #[test]
    fn edits_during_save_keep_note_dirty() {
        let mut s = session();
        s.open_note("a", "x", NoteMode::FreeText);
        type_text(&mut s, "xy", 0);
        let save = s.save_now().expect("dirty");
        type_text(&mut s, "xyz", 10);
        s.save_succeeded("a", save.revision);
        assert!(s.is_dirty());
        assert_eq!(s.tick(10_010).map(|r| r.content), Some("xyz".to_string()));
    }

    #[test]
    fn failed_save_reports_and_retries_later() {
        let mut s = session();
        s.open_note("a", "", NoteMode::FreeText);
        type_text(&mut s, "draft", 0);
        assert!(s.tick(10_000).is_some());
        s.save_failed("a", "disk full", 10_500);
        assert_eq!(s.status(), Some("Error saving: disk full"));
        assert!(s.is_dirty());
        assert_eq!(s.tick(11_000), None);
        assert!(s.tick(20_500).is_some());
    }

    #[test]
    fn superseded_improvement_is_discarded() {
        let mut s = session();
        s.open_note("a", "make this better", NoteMode::FreeText);
        let first = s.request_improvement(Selection::new(5, 9)).unwrap();
        let second = s.request_improvement(Selection::new(0, 4)).unwrap();
        assert_ne!(first.ticket, second.ticket);
        assert_eq!(second.text, "make");

        assert!(!s.complete_improvement(first.ticket, Ok("THIS".to_string())));
        assert_eq!(s.proposal(), None);
        assert!(s.complete_improvement(second.ticket, Ok("craft".to_string())));
        assert_eq!(s.proposal().map(|p| p.replacement.as_str()), Some("craft"));
        assert_eq!(s.text(), "make this better", "nothing applied automatically");
    }

    #[test]
    fn result_for_other_note_is_dropped() {
        let mut s = session();
        s.open_note("a", "hello", NoteMode::FreeText);
        let req = s.request_improvement(Selection::new(0, 5)).unwrap();
        s.open_note("b", "other", NoteMode::FreeText);
        assert!(!s.complete_improvement(req.ticket, Ok("HELLO".to_string())));
        assert_eq!(s.text(), "other");
        assert_eq!(s.proposal(), None);
    }

    #[test]
    fn failed_improvement_leaves_content_alone() {
        let mut s = session();
        s.open_note("a", "keep me", NoteMode::FreeText);
        let req = s.request_improvement(Selection::new(0, 4)).unwrap();
        assert!(s.zone().is_some());
        assert!(s.complete_improvement(req.ticket, Err(ImproveError::Request("timeout".to_string()))));
        assert_eq!(s.text(), "keep me");
        assert_eq!(s.zone(), None);
        assert_eq!(s.status(), Some("AI request failed: timeout"));
    }

    #[test]
    fn accepted_proposal_follows_shifted_zone() {
        let mut s = session();
        s.open_note("a", "fix teh typo", NoteMode::FreeText);
        let req = s.request_improvement(Selection::new(4, 7)).unwrap();
        type_text(&mut s, "> fix teh typo", 50);
        assert_eq!(s.zone(), Some(Span::new(6, 9)));
        assert_eq!(s.zone_decorations().len(), 2);

        s.complete_improvement(req.ticket, Ok("the".to_string()));
        assert_eq!(s.accept_proposal(60), Ok(true));
        assert_eq!(s.text(), "> fix the typo");
        assert_eq!(s.zone(), None);
        assert!(s.is_dirty());
    }

    #[test]
    fn proposal_is_dropped_when_zone_text_changed() {
        let mut s = session();
        s.open_note("a", "one two", NoteMode::FreeText);
        let req = s.request_improvement(Selection::new(4, 7)).unwrap();
        type_text(&mut s, "one tw", 10);
        s.complete_improvement(req.ticket, Ok("2".to_string()));
        assert_eq!(s.accept_proposal(20), Ok(false));
        assert_eq!(s.text(), "one tw");
    }

    #[test]
    fn rejected_proposal_changes_nothing() {
        let mut s = session();
        s.open_note("a", "as is", NoteMode::FreeText);
        let req = s.request_improvement(Selection::new(0, 5)).unwrap();
        s.complete_improvement(req.ticket, Ok("as was".to_string()));
        s.reject_proposal();
        assert_eq!(s.proposal(), None);
        assert_eq!(s.accept_proposal(0), Ok(false));
        assert_eq!(s.text(), "as is");
    }

    #[test]
    fn improvement_needs_note_and_selection() {
        let mut s = session();
        assert_eq!(
            s.request_improvement(Selection::new(0, 1)),
            Err(ImproveError::NoActiveNote)
        );
        s.open_note("a", "text   here", NoteMode::FreeText);
        assert_eq!(
            s.request_improvement(Selection::new(4, 7)),
            Err(ImproveError::EmptySelection)
        );
    }

    #[test]
    fn deleting_active_note_drops_everything() {
        let mut s = session();
        s.open_note("a", "bye", NoteMode::FreeText);
        let req = s.request_improvement(Selection::new(0, 3)).unwrap();
        s.note_deleted("a");
        assert_eq!(s.active_note_id(), None);
        assert!(!s.complete_improvement(req.ticket, Ok("ciao".to_string())));
        assert_eq!(s.tick(u64::MAX), None);
    }

    #[test]
    fn mode_switch_converts_and_marks_dirty() {
        let mut s = session();
        s.open_note("a", "milk\n\neggs", NoteMode::FreeText);
        s.set_mode(NoteMode::Checklist, 0);
        assert_eq!(s.text(), "[ ] milk\n[ ] eggs");
        assert!(s.toggle_item(1, 5));
        assert!(s.add_item("bread", 6));
        s.set_mode(NoteMode::FreeText, 7);
        assert_eq!(s.text(), "milk\neggs ✓\nbread");
        assert_eq!(s.save_now().map(|r| r.is_list), Some(false));
    }

    #[test]
    fn widget_toggle_goes_through_session() {
        let mut s = session();
        s.open_note("a", "[ ] task", NoteMode::FreeText);
        let mut widgets = s.controllers();
        assert_eq!(widgets.len(), 1);
        let outcome = s.handle_widget(&mut widgets[0], WidgetAction::Toggle, 3);
        assert!(matches!(outcome, WidgetOutcome::Applied(_)));
        assert_eq!(s.text(), "[x] task");
        assert!(s.is_dirty());
        assert_eq!(s.decorations().map(DecorationSet::len), Some(1));
    }
}
