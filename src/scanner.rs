//! Marker scanner.
//!
//! Finds the inline micro-syntaxes embedded in note text: fenced code blocks,
//! `@code{..}` / `@file{..}` mentions, markdown file links and `[ ]` / `[x]`
//! checkboxes. Each construct gets its own global left-to-right pass; the
//! candidates are then merged so that the earliest-starting marker wins and any
//! later candidate overlapping it is dropped.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Half-open byte range into a note's text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} past end {end}");
        Self { start, end }
    }

    pub fn len(self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    pub fn intersects(self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when an edit over `start..end` changes or borders this span.
    pub fn touches(self, start: usize, end: usize) -> bool {
        start <= self.end && self.start <= end
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MarkerKind {
    CodeFence {
        language: String,
        body: String,
    },
    CodeMention {
        code: String,
    },
    /// `@file{path}` when `label` is `None`, `[label](file:///path)` otherwise.
    FileMention {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Checkbox {
        checked: bool,
    },
}

impl MarkerKind {
    /// The single canonical text form of this marker.
    pub fn canonical_text(&self) -> String {
        match self {
            MarkerKind::CodeFence { language, body } => {
                // The scanner strips one leading newline from the body.
                let lead = if body.starts_with('\n') { "\n" } else { "" };
                format!("```{language}\n{lead}{body}\n```")
            }
            MarkerKind::CodeMention { code } => format!("@code{{{code}}}"),
            MarkerKind::FileMention { path, label: None } => format!("@file{{{path}}}"),
            MarkerKind::FileMention {
                path,
                label: Some(label),
            } => format!("[{label}](file:///{path})"),
            MarkerKind::Checkbox { checked: true } => "[x]".to_string(),
            MarkerKind::Checkbox { checked: false } => "[ ]".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub span: Span,
    pub kind: MarkerKind,
}

impl Marker {
    pub fn source<'a>(&self, text: &'a str) -> &'a str {
        &text[self.span.start..self.span.end]
    }
}

fn fence_re() -> &'static Regex {
    static RE_FENCE: OnceLock<Regex> = OnceLock::new();
    RE_FENCE.get_or_init(|| Regex::new(r"(?s)```([A-Za-z0-9_]+)\n(.*?)```").unwrap())
}

fn code_mention_re() -> &'static Regex {
    static RE_CODE: OnceLock<Regex> = OnceLock::new();
    RE_CODE.get_or_init(|| Regex::new(r"@code\{([^}]+)\}").unwrap())
}

fn file_mention_re() -> &'static Regex {
    static RE_FILE: OnceLock<Regex> = OnceLock::new();
    RE_FILE.get_or_init(|| Regex::new(r"@file\{([^}]+)\}").unwrap())
}

fn file_link_re() -> &'static Regex {
    static RE_LINK: OnceLock<Regex> = OnceLock::new();
    RE_LINK.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(file:///([^)]+)\)").unwrap())
}

pub(crate) fn checkbox_re() -> &'static Regex {
    static RE_CHECKBOX: OnceLock<Regex> = OnceLock::new();
    RE_CHECKBOX.get_or_init(|| Regex::new(r"\[([ xX])\]").unwrap())
}

/// Strips at most one newline from each end of a fence body.
fn trim_fence_body(raw: &str) -> &str {
    let body = raw.strip_prefix('\n').unwrap_or(raw);
    body.strip_suffix('\n').unwrap_or(body)
}

fn scan_fences(text: &str, out: &mut Vec<Marker>) {
    for cap in fence_re().captures_iter(text) {
        let (Some(whole), Some(language), Some(body)) = (cap.get(0), cap.get(1), cap.get(2))
        else {
            continue;
        };
        out.push(Marker {
            span: Span::new(whole.start(), whole.end()),
            kind: MarkerKind::CodeFence {
                language: language.as_str().to_string(),
                body: trim_fence_body(body.as_str()).to_string(),
            },
        });
    }
}

fn scan_mentions(text: &str, re: &Regex, make: fn(String) -> MarkerKind, out: &mut Vec<Marker>) {
    for cap in re.captures_iter(text) {
        let (Some(whole), Some(inner)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        out.push(Marker {
            span: Span::new(whole.start(), whole.end()),
            kind: make(inner.as_str().to_string()),
        });
    }
}

fn scan_file_links(text: &str, out: &mut Vec<Marker>) {
    for cap in file_link_re().captures_iter(text) {
        let (Some(whole), Some(label), Some(path)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        out.push(Marker {
            span: Span::new(whole.start(), whole.end()),
            kind: MarkerKind::FileMention {
                path: path.as_str().to_string(),
                label: Some(label.as_str().to_string()),
            },
        });
    }
}

fn scan_checkboxes(text: &str, out: &mut Vec<Marker>) {
    let mut offset = 0usize;
    for line in text.split('\n') {
        for cap in checkbox_re().captures_iter(line) {
            let (Some(whole), Some(mark)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            out.push(Marker {
                span: Span::new(offset + whole.start(), offset + whole.end()),
                kind: MarkerKind::Checkbox {
                    checked: mark.as_str().eq_ignore_ascii_case("x"),
                },
            });
        }
        offset += line.len() + 1;
    }
}

/// Scans `text` for every recognized construct.
///
/// The result is sorted by start offset and never contains overlapping spans.
/// Malformed constructs (an unclosed fence, `@code{` without `}`) produce no
/// marker and stay plain text.
pub fn scan(text: &str) -> Vec<Marker> {
    // Candidate order doubles as the tie-break for equal starts.
    let mut passes: [Vec<Marker>; 5] = Default::default();
    scan_fences(text, &mut passes[0]);
    scan_mentions(
        text,
        code_mention_re(),
        |code| MarkerKind::CodeMention { code },
        &mut passes[1],
    );
    scan_mentions(
        text,
        file_mention_re(),
        |path| MarkerKind::FileMention { path, label: None },
        &mut passes[2],
    );
    scan_file_links(text, &mut passes[3]);
    scan_checkboxes(text, &mut passes[4]);

    let mut candidates: Vec<(usize, Marker)> = passes
        .into_iter()
        .enumerate()
        .flat_map(|(pass, markers)| markers.into_iter().map(move |m| (pass, m)))
        .collect();
    candidates.sort_by_key(|(pass, m)| (m.span.start, *pass));

    let mut accepted: Vec<Marker> = Vec::with_capacity(candidates.len());
    let mut last_end = 0usize;
    for (_, marker) in candidates {
        if !accepted.is_empty() && marker.span.start < last_end {
            log::trace!(
                "dropping marker at {}..{} overlapping earlier marker",
                marker.span.start,
                marker.span.end
            );
            continue;
        }
        last_end = marker.span.end;
        accepted.push(marker);
    }
    accepted
}

/// Scans `text` and returns the marker only when it covers the whole string.
pub fn scan_exact(text: &str) -> Option<Marker> {
    let mut markers = scan(text);
    if markers.len() != 1 {
        return None;
    }
    let marker = markers.pop()?;
    (marker.span == Span::new(0, text.len())).then_some(marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<MarkerKind> {
        scan(text).into_iter().map(|m| m.kind).collect()
    }

    #[test]
    fn finds_code_mention_over_whole_input() {
        let markers = scan("@code{foo()}");
        assert_eq!(
            markers,
            vec![Marker {
                span: Span::new(0, 12),
                kind: MarkerKind::CodeMention {
                    code: "foo()".to_string()
                },
            }]
        );
    }

    #[test]
    fn finds_fence_and_trims_one_newline() {
        let text = "```js\nconsole.log(1)\n```";
        let markers = scan(text);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].span, Span::new(0, text.len()));
        assert_eq!(
            markers[0].kind,
            MarkerKind::CodeFence {
                language: "js".to_string(),
                body: "console.log(1)".to_string(),
            }
        );
    }

    #[test]
    fn keeps_inner_blank_lines_of_fence_body() {
        let kinds = kinds("```py\n\n\nx = 1\n\n```");
        assert_eq!(
            kinds,
            vec![MarkerKind::CodeFence {
                language: "py".to_string(),
                body: "\nx = 1\n".to_string(),
            }]
        );
    }

    #[test]
    fn finds_checkboxes_with_absolute_offsets() {
        let markers = scan("Check [ ] and [x] here");
        let found: Vec<(Span, bool)> = markers
            .iter()
            .map(|m| match m.kind {
                MarkerKind::Checkbox { checked } => (m.span, checked),
                _ => panic!("unexpected marker {:?}", m.kind),
            })
            .collect();
        assert_eq!(found, vec![(Span::new(6, 9), false), (Span::new(14, 17), true)]);
    }

    #[test]
    fn reads_uppercase_checkbox_on_later_lines() {
        let markers = scan("first\n[X] second");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].span, Span::new(6, 9));
        assert_eq!(markers[0].kind, MarkerKind::Checkbox { checked: true });
    }

    #[test]
    fn ignores_unclosed_fence() {
        assert!(scan("```js\nno closing").is_empty());
    }

    #[test]
    fn ignores_unclosed_and_empty_mentions() {
        assert!(scan("@code{foo").is_empty());
        assert!(scan("@file{}").is_empty());
    }

    #[test]
    fn fence_swallows_markers_inside_it() {
        let text = "```md\n[ ] @code{x}\n```\n[x] done";
        let markers = scan(text);
        assert_eq!(markers.len(), 2);
        assert!(matches!(markers[0].kind, MarkerKind::CodeFence { .. }));
        assert_eq!(markers[1].kind, MarkerKind::Checkbox { checked: true });
        assert_eq!(markers[1].span.start, text.find("[x]").unwrap());
    }

    #[test]
    fn file_link_beats_checkbox_at_same_start() {
        let kinds = kinds("[x](file:///tmp/a.txt)");
        assert_eq!(
            kinds,
            vec![MarkerKind::FileMention {
                path: "tmp/a.txt".to_string(),
                label: Some("x".to_string()),
            }]
        );
    }

    #[test]
    fn mention_wins_over_later_overlapping_checkbox() {
        let kinds = kinds("@code{[ ]} and @file{notes/[x].md}");
        assert_eq!(
            kinds,
            vec![
                MarkerKind::CodeMention {
                    code: "[ ]".to_string()
                },
                MarkerKind::FileMention {
                    path: "notes/[x].md".to_string(),
                    label: None,
                },
            ]
        );
    }

    #[test]
    fn spans_never_overlap() {
        let text = "```rs\n@file{a}\n``` [ ][x]@code{b}[f](file:///c) @code{[ ]}\n[X]";
        let markers = scan(text);
        assert!(!markers.is_empty());
        for pair in markers.windows(2) {
            assert!(pair[0].span.end <= pair[1].span.start, "{pair:?}");
        }
    }

    #[test]
    fn canonical_text_scans_back_to_same_kind() {
        for kind in [
            MarkerKind::CodeFence {
                language: "rust".to_string(),
                body: "fn main() {}".to_string(),
            },
            MarkerKind::CodeMention {
                code: "x + 1".to_string(),
            },
            MarkerKind::FileMention {
                path: "src/lib.rs".to_string(),
                label: None,
            },
            MarkerKind::FileMention {
                path: "home/me/a.md".to_string(),
                label: Some("a".to_string()),
            },
            MarkerKind::CodeFence {
                language: "py".to_string(),
                body: "\nx = 1\n".to_string(),
            },
            MarkerKind::CodeFence {
                language: "txt".to_string(),
                body: String::new(),
            },
            MarkerKind::Checkbox { checked: false },
        ] {
            let text = kind.canonical_text();
            let marker = scan_exact(&text).expect("canonical text should scan");
            assert_eq!(marker.kind, kind);
        }
    }
}
