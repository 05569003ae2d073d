//! Free text <-> checklist conversion and checklist item editing.
//!
//! Converting back to free text is lossy on purpose: checked items become
//! `text ✓` and the marker syntax is gone.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const CHECKED_SUFFIX: &str = "✓";

fn checked_prefix_re() -> &'static Regex {
    static RE_CHECKED: OnceLock<Regex> = OnceLock::new();
    RE_CHECKED.get_or_init(|| Regex::new(r"^\s*\[[xX]\]\s*").unwrap())
}

fn unchecked_prefix_re() -> &'static Regex {
    static RE_UNCHECKED: OnceLock<Regex> = OnceLock::new();
    RE_UNCHECKED.get_or_init(|| Regex::new(r"^\s*\[\s?\]\s*").unwrap())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub checked: bool,
    pub text: String,
}

impl ChecklistItem {
    pub fn render(&self) -> String {
        let marker = if self.checked { "[x]" } else { "[ ]" };
        format!("{marker} {}", self.text)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteMode {
    #[default]
    FreeText,
    Checklist,
}

impl NoteMode {
    pub fn from_is_list(is_list: bool) -> Self {
        if is_list {
            NoteMode::Checklist
        } else {
            NoteMode::FreeText
        }
    }

    pub fn is_list(self) -> bool {
        self == NoteMode::Checklist
    }

    pub fn toggled(self) -> Self {
        match self {
            NoteMode::FreeText => NoteMode::Checklist,
            NoteMode::Checklist => NoteMode::FreeText,
        }
    }

    /// Rewrites `content` into the shape this mode expects.
    pub fn convert(self, content: &str, checked_suffix: &str) -> String {
        match self {
            NoteMode::Checklist => to_checklist(content),
            NoteMode::FreeText => from_checklist_with_suffix(content, checked_suffix),
        }
    }
}

/// One item per line, blank lines included, so indices match line numbers.
pub fn parse_items(content: &str) -> Vec<ChecklistItem> {
    content.split('\n').map(parse_line).collect()
}

fn parse_line(line: &str) -> ChecklistItem {
    if let Some(m) = checked_prefix_re().find(line) {
        return ChecklistItem {
            checked: true,
            text: line[m.end()..].to_string(),
        };
    }
    if let Some(m) = unchecked_prefix_re().find(line) {
        return ChecklistItem {
            checked: false,
            text: line[m.end()..].to_string(),
        };
    }
    ChecklistItem {
        checked: false,
        text: line.to_string(),
    }
}

pub fn render_items(items: &[ChecklistItem]) -> String {
    items
        .iter()
        .map(ChecklistItem::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Free text to checklist: every non-empty line becomes an item, lines that
/// already carry a marker keep it.
pub fn to_checklist(text: &str) -> String {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.starts_with("[ ]") || line.starts_with("[x]") || line.starts_with("[X]") {
                line.to_string()
            } else {
                format!("[ ] {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Checklist to free text, marking checked items with a trailing `✓`.
pub fn from_checklist(text: &str) -> String {
    from_checklist_with_suffix(text, CHECKED_SUFFIX)
}

pub fn from_checklist_with_suffix(text: &str, checked_suffix: &str) -> String {
    parse_items(text)
        .into_iter()
        .map(|item| {
            if item.checked {
                format!("{} {checked_suffix}", item.text)
            } else {
                item.text
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn toggle_item(content: &str, index: usize) -> Option<String> {
    let mut items = parse_items(content);
    let item = items.get_mut(index)?;
    item.checked = !item.checked;
    Some(render_items(&items))
}

pub fn update_item_text(content: &str, index: usize, text: &str) -> Option<String> {
    let mut items = parse_items(content);
    items.get_mut(index)?.text = text.to_string();
    Some(render_items(&items))
}

/// Appends an unchecked item. Blank input adds nothing.
pub fn add_item(content: &str, text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if content.is_empty() {
        Some(format!("[ ] {text}"))
    } else {
        Some(format!("{content}\n[ ] {text}"))
    }
}

/// Sidebar preview line for a note.
pub fn preview(content: &str, mode: NoteMode) -> String {
    if content.trim().is_empty() {
        return "No content".to_string();
    }
    match mode {
        NoteMode::Checklist => parse_items(content)
            .into_iter()
            .find(|item| !item.text.trim().is_empty())
            .map(|item| {
                let mark = if item.checked { "✓ " } else { "☐ " };
                format!("{mark}{}", item.text)
            })
            .unwrap_or_else(|| "Empty list".to_string()),
        NoteMode::FreeText => content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checklist_text_is_kept_as_is() {
        let text = "[ ] buy milk\n[x] walk dog";
        assert_eq!(to_checklist(text), text);
        assert_eq!(from_checklist(text), "buy milk\nwalk dog ✓");
    }

    #[test]
    fn plain_lines_become_unchecked_items() {
        assert_eq!(
            to_checklist("  eggs \n\n[X] bread\n\t\nflour"),
            "[ ] eggs\n[X] bread\n[ ] flour"
        );
        assert_eq!(to_checklist(""), "");
    }

    #[test]
    fn conversions_are_idempotent() {
        for text in ["a\nb", "[ ] a\n\n  [x] b  ", "[] odd\n[X]tight", ""] {
            let once = to_checklist(text);
            assert_eq!(to_checklist(&once), once, "to_checklist of {text:?}");
        }
        for text in ["plain\nlines", "with ✓ inside", "", "  indented"] {
            let once = from_checklist(text);
            assert_eq!(from_checklist(&once), once, "from_checklist of {text:?}");
        }
    }

    #[test]
    fn parses_marker_variants() {
        let items = parse_items("[x] a\n  [X]b\n[] c\n[ ]   d\nplain");
        assert_eq!(
            items,
            vec![
                ChecklistItem { checked: true, text: "a".to_string() },
                ChecklistItem { checked: true, text: "b".to_string() },
                ChecklistItem { checked: false, text: "c".to_string() },
                ChecklistItem { checked: false, text: "d".to_string() },
                ChecklistItem { checked: false, text: "plain".to_string() },
            ]
        );
    }

    #[test]
    fn item_edits_rewrite_canonical_markers() {
        let content = "[X] one\n[ ] two";
        assert_eq!(toggle_item(content, 1).as_deref(), Some("[x] one\n[x] two"));
        assert_eq!(
            update_item_text(content, 0, "uno").as_deref(),
            Some("[x] uno\n[ ] two")
        );
        assert_eq!(toggle_item(content, 2), None);
    }

    #[test]
    fn add_item_appends_unchecked() {
        assert_eq!(add_item("", " milk ").as_deref(), Some("[ ] milk"));
        assert_eq!(add_item("[ ] a", "b").as_deref(), Some("[ ] a\n[ ] b"));
        assert_eq!(add_item("[ ] a", "   "), None);
    }

    #[test]
    fn mode_conversion_uses_configured_suffix() {
        assert_eq!(
            NoteMode::FreeText.convert("[x] done\n[ ] open", "(done)"),
            "done (done)\nopen"
        );
        assert_eq!(NoteMode::Checklist.convert("a\nb", CHECKED_SUFFIX), "[ ] a\n[ ] b");
        assert_eq!(NoteMode::from_is_list(true).toggled(), NoteMode::FreeText);
    }

    #[test]
    fn previews_follow_mode() {
        assert_eq!(preview("", NoteMode::Checklist), "No content");
        assert_eq!(preview("[x] first\n[ ] second", NoteMode::Checklist), "✓ first");
        assert_eq!(preview("[ ] \n[ ] later", NoteMode::Checklist), "☐ later");
        assert_eq!(preview("[ ]\n[x]", NoteMode::Checklist), "Empty list");
        assert_eq!(preview("\n  title line\nbody", NoteMode::FreeText), "title line");
    }
}
