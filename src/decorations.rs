//! Render instructions derived from scanned markers.
//!
//! A [`DecorationSet`] is a throwaway projection of the note text: it is
//! rebuilt whenever the text changes and never feeds back into the buffer.
//! The AI zone overlay lives in [`ZoneState`] and is managed independently.

use crate::editor_core::{map_position_through_changes, TextChange};
use crate::scanner::{scan, MarkerKind, Span};
use crate::serializer::escape_html;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecorationKind {
    /// The span is hidden and a widget is drawn in its place.
    Replace,
    /// The span keeps its text and gets a style overlay.
    Inline,
    /// A widget drawn at `span.start`; the span is empty.
    Point,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "widget", rename_all = "camelCase")]
pub enum RenderPayload {
    CodeBlock { language: String, code: String },
    InlineCode { code: String },
    FileLink { path: String, label: Option<String> },
    Checkbox { checked: bool },
    ZoneHighlight,
    ZoneSpinner { glyph: String },
}

impl RenderPayload {
    pub fn from_marker(kind: &MarkerKind) -> Self {
        match kind {
            MarkerKind::CodeFence { language, body } => RenderPayload::CodeBlock {
                language: language.clone(),
                code: body.clone(),
            },
            MarkerKind::CodeMention { code } => RenderPayload::InlineCode { code: code.clone() },
            MarkerKind::FileMention { path, label } => RenderPayload::FileLink {
                path: path.clone(),
                label: label.clone(),
            },
            MarkerKind::Checkbox { checked } => RenderPayload::Checkbox { checked: *checked },
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            RenderPayload::CodeBlock { .. } => "cm-code-block-widget",
            RenderPayload::InlineCode { .. } => "cm-inline-code",
            RenderPayload::FileLink { label: Some(_), .. } => "cm-file-link",
            RenderPayload::FileLink { label: None, .. } => "cm-file-mention",
            RenderPayload::Checkbox { .. } => "cm-checkbox-widget",
            RenderPayload::ZoneHighlight => "ai-improvement-zone",
            RenderPayload::ZoneSpinner { .. } => "ai-zone-spinner",
        }
    }

    /// Text shown by the widget itself.
    pub fn label(&self) -> &str {
        match self {
            RenderPayload::CodeBlock { language, .. } => language,
            RenderPayload::InlineCode { code } => code,
            RenderPayload::FileLink {
                label: Some(label), ..
            } => label,
            RenderPayload::FileLink { path, label: None } => path,
            RenderPayload::Checkbox { .. } | RenderPayload::ZoneHighlight => "",
            RenderPayload::ZoneSpinner { glyph } => glyph,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    pub span: Span,
    pub kind: DecorationKind,
    pub payload: RenderPayload,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecorationSet {
    decorations: Vec<Decoration>,
    source_len: usize,
    source_hash: u64,
}

fn fingerprint(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

impl DecorationSet {
    fn scanned(text: &str) -> Self {
        let decorations = scan(text)
            .into_iter()
            .map(|marker| Decoration {
                span: marker.span,
                kind: DecorationKind::Replace,
                payload: RenderPayload::from_marker(&marker.kind),
            })
            .collect();
        Self {
            decorations,
            source_len: text.len(),
            source_hash: fingerprint(text),
        }
    }

    pub fn is_built_from(&self, text: &str) -> bool {
        self.source_len == text.len() && self.source_hash == fingerprint(text)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decoration> {
        self.decorations.iter()
    }

    pub fn as_slice(&self) -> &[Decoration] {
        &self.decorations
    }

    pub fn len(&self) -> usize {
        self.decorations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorations.is_empty()
    }

    /// The decoration whose span contains `pos`, if any.
    pub fn at(&self, pos: usize) -> Option<&Decoration> {
        let idx = self.decorations.partition_point(|d| d.span.end <= pos);
        self.decorations
            .get(idx)
            .filter(|d| d.span.start <= pos && pos < d.span.end)
    }

    /// Shifts every decoration through `changes` without rescanning.
    ///
    /// Interface only: [`build_decorations`] always rescans, and nothing in
    /// this crate calls this. It is kept for hosts that want incremental
    /// updates and is checked against a rescan in the tests below.
    ///
    /// Returns `None` when any change touches or borders a decoration, in which
    /// case the caller has to rebuild from a full scan. `new_text` is the
    /// text after the changes.
    pub fn map_through(&self, new_text: &str, changes: &[TextChange]) -> Option<Self> {
        let mut sorted = changes.to_vec();
        sorted.sort_by_key(|change| (change.start, change.end));

        let touched = self.decorations.iter().any(|d| {
            sorted
                .iter()
                .any(|change| d.span.touches(change.start, change.end))
        });
        if touched {
            return None;
        }

        let decorations = self
            .decorations
            .iter()
            .map(|d| Decoration {
                span: Span::new(
                    map_position_through_changes(d.span.start, &sorted),
                    map_position_through_changes(d.span.end, &sorted),
                ),
                kind: d.kind,
                payload: d.payload.clone(),
            })
            .collect();
        Some(Self {
            decorations,
            source_len: new_text.len(),
            source_hash: fingerprint(new_text),
        })
    }
}

/// Builds the decorations for `text`.
///
/// `previous` is reused untouched when it was built from identical text (a
/// viewport change, a re-render); any other change triggers a full rescan.
pub fn build_decorations(text: &str, previous: Option<&DecorationSet>) -> DecorationSet {
    if let Some(previous) = previous.filter(|p| p.is_built_from(text)) {
        return previous.clone();
    }
    let set = DecorationSet::scanned(text);
    log::debug!(
        "rescanned {} bytes into {} decorations",
        text.len(),
        set.len()
    );
    set
}

/// The "AI is rewriting this" overlay. At most one zone exists at a time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneState {
    span: Option<Span>,
}

impl ZoneState {
    /// Marks `from..to` as under revision, replacing any previous zone.
    pub fn mark_zone(&mut self, from: usize, to: usize) {
        self.span = Some(Span::new(from.min(to), from.max(to)));
    }

    pub fn clear_zone(&mut self) {
        self.span = None;
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    /// Follows the zone through an edit of the underlying text.
    pub fn map_through(&mut self, changes: &[TextChange]) {
        let Some(span) = self.span else {
            return;
        };
        let mut sorted = changes.to_vec();
        sorted.sort_by_key(|change| (change.start, change.end));
        let start = map_position_through_changes(span.start, &sorted);
        let end = map_position_through_changes(span.end, &sorted);
        self.span = Some(Span::new(start.min(end), end.max(start)));
    }

    /// Highlight plus spinner for the current zone, clamped to `text`.
    pub fn decorations(&self, text: &str, glyph: &str) -> Vec<Decoration> {
        let Some(span) = self.span else {
            return Vec::new();
        };
        let start = floor_char_boundary(text, span.start);
        let end = floor_char_boundary(text, span.end).max(start);
        vec![
            Decoration {
                span: Span::new(start, start),
                kind: DecorationKind::Point,
                payload: RenderPayload::ZoneSpinner {
                    glyph: glyph.to_string(),
                },
            },
            Decoration {
                span: Span::new(start, end),
                kind: DecorationKind::Inline,
                payload: RenderPayload::ZoneHighlight,
            },
        ]
    }
}

fn floor_char_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Markup for the highlight layer drawn under the editor textarea.
///
/// Every byte of `text` is emitted exactly once so the layer lines up with the
/// textarea; decorated spans are wrapped in their widget class and point
/// decorations become empty anchors. `decorations` must be sorted by start;
/// anything overlapping an earlier decoration is skipped.
pub fn overlay_html(text: &str, decorations: &[Decoration]) -> String {
    let mut html = String::with_capacity(text.len() + 64);
    let mut cursor = 0usize;
    for d in decorations {
        if d.span.start < cursor || d.span.end > text.len() {
            continue;
        }
        push_escaped(&mut html, &text[cursor..d.span.start]);
        let class = d.payload.css_class();
        match d.kind {
            DecorationKind::Point => {
                html.push_str(&format!(
                    "<span class=\"{class}\" data-glyph=\"{}\"></span>",
                    escape_html(d.payload.label())
                ));
            }
            DecorationKind::Replace | DecorationKind::Inline => {
                html.push_str(&format!("<span class=\"{class}\">"));
                push_escaped(&mut html, &text[d.span.start..d.span.end]);
                html.push_str("</span>");
            }
        }
        cursor = d.span.end;
    }
    push_escaped(&mut html, &text[cursor..]);
    // Keeps a trailing newline from collapsing the layer's last line.
    html.push_str("\n ");
    html
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_wraps_each_marker_once() {
        let text = "a<b [x] @code{c}";
        let set = build_decorations(text, None);
        assert_eq!(
            overlay_html(text, set.as_slice()),
            "a&lt;b <span class=\"cm-checkbox-widget\">[x]</span> \
             <span class=\"cm-inline-code\">@code{c}</span>\n "
        );
    }

    #[test]
    fn overlay_draws_zone_spinner_before_highlight() {
        let mut zone = ZoneState::default();
        zone.mark_zone(4, 6);
        let html = overlay_html("fix teh typo", &zone.decorations("fix teh typo", "✨"));
        assert_eq!(
            html,
            "fix <span class=\"ai-zone-spinner\" data-glyph=\"✨\"></span>\
             <span class=\"ai-improvement-zone\">te</span>h typo\n "
        );
    }

    #[test]
    fn overlay_escapes_configured_glyph() {
        let mut zone = ZoneState::default();
        zone.mark_zone(0, 1);
        let html = overlay_html("a", &zone.decorations("a", "\"><b>"));
        assert!(html.starts_with("<span class=\"ai-zone-spinner\" data-glyph=\"&quot;&gt;&lt;b&gt;\"></span>"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn one_replace_decoration_per_marker() {
        let text = "[ ] ship @code{it}\n```sh\nmake\n```";
        let set = build_decorations(text, None);
        let payloads: Vec<_> = set.iter().map(|d| d.payload.clone()).collect();
        assert_eq!(
            payloads,
            vec![
                RenderPayload::Checkbox { checked: false },
                RenderPayload::InlineCode {
                    code: "it".to_string()
                },
                RenderPayload::CodeBlock {
                    language: "sh".to_string(),
                    code: "make".to_string()
                },
            ]
        );
        assert!(set.iter().all(|d| d.kind == DecorationKind::Replace));
        for pair in set.as_slice().windows(2) {
            assert!(pair[0].span.end <= pair[1].span.start);
        }
    }

    #[test]
    fn reuses_previous_set_for_same_text() {
        let text = "@file{a.txt}";
        let first = build_decorations(text, None);
        let second = build_decorations(text, Some(&first));
        assert_eq!(first, second);
        assert!(second.is_built_from(text));
        assert!(!second.is_built_from("@file{b.txt}"));
    }

    #[test]
    fn rescans_when_text_changed() {
        let first = build_decorations("[ ] a", None);
        let second = build_decorations("[x] a", Some(&first));
        assert_eq!(
            second.as_slice()[0].payload,
            RenderPayload::Checkbox { checked: true }
        );
    }

    #[test]
    fn remap_matches_rescan_for_unrelated_edit() {
        let old_text = "intro [ ] a\nmore @code{b} end";
        let change = TextChange::new(0, 5, "prologue");
        let new_text = format!("prologue{}", &old_text[5..]);

        let previous = build_decorations(old_text, None);
        let mapped = previous
            .map_through(&new_text, &[change])
            .expect("edit does not touch any marker");
        assert_eq!(mapped, build_decorations(&new_text, None));
    }

    #[test]
    fn remap_refuses_edits_touching_a_marker() {
        let text = "a [ ] b";
        let set = build_decorations(text, None);
        assert!(set
            .map_through("a [x] b", &[TextChange::new(3, 4, "x")])
            .is_none());
        assert!(set
            .map_through("a [ ]! b", &[TextChange::new(5, 5, "!")])
            .is_none());
    }

    #[test]
    fn finds_decoration_at_position() {
        let set = build_decorations("xx [ ] yy [x]", None);
        assert_eq!(set.at(3).map(|d| d.span), Some(Span::new(3, 6)));
        assert_eq!(set.at(5).map(|d| d.span), Some(Span::new(3, 6)));
        assert!(set.at(6).is_none());
        assert_eq!(set.at(10).map(|d| d.span), Some(Span::new(10, 13)));
    }

    #[test]
    fn css_classes_follow_widget_kind() {
        let set = build_decorations("@file{a} [b](file:///b)", None);
        let classes: Vec<_> = set.iter().map(|d| d.payload.css_class()).collect();
        assert_eq!(classes, vec!["cm-file-mention", "cm-file-link"]);
        assert_eq!(set.as_slice()[1].payload.label(), "b");
    }

    #[test]
    fn zone_replaces_and_clears() {
        let mut zone = ZoneState::default();
        zone.mark_zone(8, 2);
        assert_eq!(zone.span(), Some(Span::new(2, 8)));
        zone.mark_zone(0, 4);
        assert_eq!(zone.span(), Some(Span::new(0, 4)));
        zone.clear_zone();
        assert_eq!(zone.span(), None);
        assert!(zone.decorations("text", "*").is_empty());
    }

    #[test]
    fn zone_decorations_are_spinner_and_highlight() {
        let mut zone = ZoneState::default();
        zone.mark_zone(2, 40);
        let decos = zone.decorations("hello world", "✨");
        assert_eq!(decos.len(), 2);
        assert_eq!(decos[0].kind, DecorationKind::Point);
        assert_eq!(decos[0].span, Span::new(2, 2));
        assert_eq!(decos[0].payload.label(), "✨");
        assert_eq!(decos[1].kind, DecorationKind::Inline);
        assert_eq!(decos[1].span, Span::new(2, 11));
    }

    #[test]
    fn zone_follows_edits_before_it() {
        let mut zone = ZoneState::default();
        zone.mark_zone(6, 11);
        zone.map_through(&[TextChange::new(0, 0, ">> ")]);
        assert_eq!(zone.span(), Some(Span::new(9, 14)));
        zone.map_through(&[TextChange::delete(0, 3)]);
        assert_eq!(zone.span(), Some(Span::new(6, 11)));
    }
}
