//! Canonical text <-> rich document.
//!
//! `encode` turns note text into a [`RichDoc`]: runs of plain text separated by
//! widget nodes, one per scanned marker. `decode` flattens it back. Widget
//! nodes remember the exact text they were scanned from, so an unedited widget
//! decodes to its original bytes and an edited one to its canonical form.

use crate::scanner::{scan, scan_exact, MarkerKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RichNode {
    Text {
        text: String,
    },
    Widget {
        marker: MarkerKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichDoc {
    pub nodes: Vec<RichNode>,
}

/// Encodes note text. Total: anything that does not scan stays text.
pub fn encode(text: &str) -> RichDoc {
    let mut nodes = Vec::new();
    let mut cursor = 0usize;
    for marker in scan(text) {
        if marker.span.start > cursor {
            nodes.push(RichNode::Text {
                text: text[cursor..marker.span.start].to_string(),
            });
        }
        nodes.push(RichNode::Widget {
            source: Some(marker.source(text).to_string()),
            marker: marker.kind,
        });
        cursor = marker.span.end;
    }
    if cursor < text.len() {
        nodes.push(RichNode::Text {
            text: text[cursor..].to_string(),
        });
    }
    RichDoc { nodes }
}

/// Decodes a rich document back into canonical note text.
pub fn decode(doc: &RichDoc) -> String {
    let mut out = String::new();
    for node in &doc.nodes {
        match node {
            RichNode::Text { text } => out.push_str(text),
            RichNode::Widget { marker, source } => out.push_str(&widget_text(marker, source.as_deref())),
        }
    }
    out
}

fn widget_text(marker: &MarkerKind, source: Option<&str>) -> String {
    match source {
        Some(source) if scan_exact(source).is_some_and(|m| &m.kind == marker) => source.to_string(),
        _ => marker.canonical_text(),
    }
}

impl RichDoc {
    pub fn widgets(&self) -> impl Iterator<Item = (usize, &MarkerKind)> {
        self.nodes.iter().enumerate().filter_map(|(i, node)| match node {
            RichNode::Widget { marker, .. } => Some((i, marker)),
            RichNode::Text { .. } => None,
        })
    }

    fn widget_mut(&mut self, index: usize) -> Option<(&mut MarkerKind, &mut Option<String>)> {
        match self.nodes.get_mut(index)? {
            RichNode::Widget { marker, source } => Some((marker, source)),
            RichNode::Text { .. } => None,
        }
    }

    /// Flips the checkbox node at `index`.
    pub fn toggle_checkbox(&mut self, index: usize) -> bool {
        let Some((MarkerKind::Checkbox { checked }, source)) = self.widget_mut(index) else {
            return false;
        };
        *checked = !*checked;
        *source = None;
        true
    }

    /// Replaces the code of a code block or inline code node.
    ///
    /// Refuses code that would not scan back as the same widget.
    pub fn replace_code(&mut self, index: usize, code: &str) -> bool {
        let Some((marker, source)) = self.widget_mut(index) else {
            return false;
        };
        match marker {
            MarkerKind::CodeFence { body, .. } => {
                if code.contains("```") {
                    return false;
                }
                *body = code.to_string();
            }
            MarkerKind::CodeMention { code: current } => {
                if code.is_empty() || code.contains('}') {
                    return false;
                }
                *current = code.to_string();
            }
            _ => return false,
        }
        *source = None;
        true
    }

    /// Removes a node, merging the text around it.
    pub fn remove_node(&mut self, index: usize) -> bool {
        if index >= self.nodes.len() {
            return false;
        }
        self.nodes.remove(index);
        if index > 0 && index < self.nodes.len() {
            if let (RichNode::Text { .. }, RichNode::Text { text: next }) =
                (&self.nodes[index - 1], &self.nodes[index])
            {
                let next = next.clone();
                if let RichNode::Text { text } = &mut self.nodes[index - 1] {
                    text.push_str(&next);
                }
                self.nodes.remove(index);
            }
        }
        true
    }

    /// Markup for the editing surface. Every widget carries `data-node`, its
    /// index in `nodes`, so UI events can be routed back to it.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                RichNode::Text { text } => html.push_str(&escape_html(text).replace('\n', "<br>")),
                RichNode::Widget { marker, .. } => push_widget_html(&mut html, index, marker),
            }
        }
        html
    }
}

fn push_widget_html(html: &mut String, index: usize, marker: &MarkerKind) {
    match marker {
        MarkerKind::CodeFence { language, body } => {
            let lang = escape_html(language);
            html.push_str(&format!(
                "<div class=\"code-block-component\" contenteditable=\"false\" data-node=\"{index}\" data-lang=\"{lang}\" data-code=\"{code_attr}\">\
                 <div class=\"code-block-header\"><span class=\"code-block-language\">{lang}</span></div>\
                 <div class=\"code-block-content\"><pre class=\"code-block-line-numbers\">{numbers}</pre>\
                 <pre class=\"code-block-code\" contenteditable=\"true\" spellcheck=\"false\">{code}</pre></div></div>",
                code_attr = escape_html(body),
                numbers = line_numbers(body),
                code = escape_html(body),
            ));
        }
        MarkerKind::CodeMention { code } => {
            html.push_str(&format!(
                "<code class=\"inline-code\" data-node=\"{index}\">{}</code>",
                escape_html(code)
            ));
        }
        MarkerKind::FileMention { path, label: None } => {
            let path = escape_html(path);
            html.push_str(&format!(
                "<a href=\"#\" class=\"file-mention\" data-node=\"{index}\" data-filepath=\"{path}\">{path}</a>"
            ));
        }
        MarkerKind::FileMention {
            path,
            label: Some(label),
        } => {
            html.push_str(&format!(
                "<span data-type=\"file-link\" class=\"file-link-widget\" data-node=\"{index}\" data-path=\"{}\">{}</span>",
                escape_html(path),
                escape_html(label)
            ));
        }
        MarkerKind::Checkbox { checked } => {
            let checked = if *checked { " checked" } else { "" };
            html.push_str(&format!(
                "<input type=\"checkbox\" class=\"cm-checkbox\" data-node=\"{index}\"{checked}>"
            ));
        }
    }
}

/// One line number per line of `code`, newline separated.
pub fn line_numbers(code: &str) -> String {
    (1..=code.split('\n').count())
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) {
        let doc = encode(text);
        assert_eq!(decode(&doc), text, "round trip of {text:?} via {doc:?}");
    }

    #[test]
    fn round_trips_well_formed_and_malformed_text() {
        for text in [
            "",
            "plain words only",
            "@code{foo()}",
            "```js\nconsole.log(1)\n```",
            "```js\nno trailing newline```",
            "```py\n\n\nbody\n\n\n```",
            "[X] shout\n[x] quiet\n[ ] open",
            "see [a b](file:///tmp/a b.txt) and @file{src/main.rs}",
            "```js\nno closing",
            "@code{unterminated",
            "mixed ✓ unicode [ ] ñ @code{é}",
        ] {
            round_trip(text);
        }
    }

    #[test]
    fn encode_splits_text_and_widgets() {
        let doc = encode("a @code{b} c");
        assert_eq!(
            doc.nodes,
            vec![
                RichNode::Text {
                    text: "a ".to_string()
                },
                RichNode::Widget {
                    marker: MarkerKind::CodeMention {
                        code: "b".to_string()
                    },
                    source: Some("@code{b}".to_string()),
                },
                RichNode::Text {
                    text: " c".to_string()
                },
            ]
        );
    }

    #[test]
    fn edited_widget_changes_only_its_own_text() {
        let text = "[X] one\n```js\nlet a;```\n[ ] two";
        let mut doc = encode(text);
        let checkboxes: Vec<usize> = doc
            .widgets()
            .filter(|(_, m)| matches!(m, MarkerKind::Checkbox { .. }))
            .map(|(i, _)| i)
            .collect();
        assert!(doc.toggle_checkbox(checkboxes[1]));
        assert_eq!(decode(&doc), "[X] one\n```js\nlet a;```\n[x] two");
    }

    #[test]
    fn edited_code_block_uses_canonical_fence() {
        let mut doc = encode("```js\nlet a;```");
        assert!(doc.replace_code(0, "let b;"));
        assert_eq!(decode(&doc), "```js\nlet b;\n```");
        assert!(!doc.replace_code(0, "``` breaks out"));
    }

    #[test]
    fn source_that_no_longer_matches_is_ignored() {
        let doc = RichDoc {
            nodes: vec![RichNode::Widget {
                marker: MarkerKind::CodeMention {
                    code: "new".to_string(),
                },
                source: Some("@code{old}".to_string()),
            }],
        };
        assert_eq!(decode(&doc), "@code{new}");
    }

    #[test]
    fn removing_a_link_merges_surrounding_text() {
        let mut doc = encode("see [plan](file:///plan.md) now");
        assert!(doc.remove_node(1));
        assert_eq!(
            doc.nodes,
            vec![RichNode::Text {
                text: "see  now".to_string()
            }]
        );
        assert!(!doc.remove_node(5));
    }

    #[test]
    fn html_escapes_text_and_attributes() {
        let doc = encode("<b> & \"q\"\n@code{a<b}");
        assert_eq!(
            doc.to_html(),
            "&lt;b&gt; &amp; &quot;q&quot;<br><code class=\"inline-code\" data-node=\"1\">a&lt;b</code>"
        );
    }

    #[test]
    fn html_renders_code_block_with_gutter() {
        let html = encode("```rs\na\nb\n```").to_html();
        assert!(html.contains("data-lang=\"rs\""));
        assert!(html.contains("<pre class=\"code-block-line-numbers\">1\n2</pre>"));
        assert!(html.contains("data-code=\"a\nb\""));
    }

    #[test]
    fn rich_doc_survives_json() {
        let doc = encode("[x] @file{a.txt}");
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"type\":\"widget\""));
        let back: RichDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(decode(&back), "[x] @file{a.txt}");
    }
}
