//! Read-only markdown preview of a note.

use crate::scanner::{scan, MarkerKind};
use crate::serializer::escape_html;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};

// Private-use delimiters around the index of a stashed mention.
const STASH_OPEN: char = '\u{E000}';
const STASH_CLOSE: char = '\u{E001}';

/// A mention pulled out of the text before markdown parsing.
struct Stashed {
    source: String,
    html: String,
}

/// Renders `text` as HTML. Soft line breaks are kept as `<br />`, and inline
/// markers outside code blocks are drawn as their widgets.
///
/// Mentions are swapped for placeholders before parsing so their contents
/// (`@code{a*b*c}`) are never read as emphasis or links.
pub fn render_preview(text: &str) -> String {
    let (stashed_text, stash) = stash_mentions(text);

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut events = Vec::new();
    let mut pending = String::new();
    let mut in_code_block = false;
    for event in Parser::new_ext(&stashed_text, options) {
        match event {
            // The parser splits runs like "[ ]" into pieces; join them first.
            Event::Text(t) if !in_code_block => pending.push_str(&t),
            other => {
                flush_text(&mut pending, &stash, &mut events);
                if matches!(other, Event::Start(Tag::CodeBlock(_))) {
                    in_code_block = true;
                } else if matches!(other, Event::End(TagEnd::CodeBlock)) {
                    in_code_block = false;
                }
                events.push(match other {
                    Event::SoftBreak => Event::HardBreak,
                    Event::Text(t) => Event::Text(restore(&t, &stash).into()),
                    Event::Code(t) => Event::Code(restore(&t, &stash).into()),
                    Event::Html(t) => Event::Html(restore(&t, &stash).into()),
                    Event::InlineHtml(t) => Event::InlineHtml(restore(&t, &stash).into()),
                    e => e,
                });
            }
        }
    }
    flush_text(&mut pending, &stash, &mut events);

    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());
    out
}

fn stash_mentions(text: &str) -> (String, Vec<Stashed>) {
    let mut out = String::with_capacity(text.len());
    let mut stash = Vec::new();
    let mut cursor = 0usize;
    for marker in scan(text) {
        let html = match &marker.kind {
            MarkerKind::CodeMention { code } => {
                format!("<code class=\"inline-code\">{}</code>", escape_html(code))
            }
            MarkerKind::FileMention { path, label: None } => {
                let path = escape_html(path);
                format!("<a href=\"#\" class=\"file-mention\" data-filepath=\"{path}\">{path}</a>")
            }
            _ => continue,
        };
        out.push_str(&text[cursor..marker.span.start]);
        out.push(STASH_OPEN);
        out.push_str(&stash.len().to_string());
        out.push(STASH_CLOSE);
        stash.push(Stashed {
            source: marker.source(text).to_string(),
            html,
        });
        cursor = marker.span.end;
    }
    out.push_str(&text[cursor..]);
    (out, stash)
}

enum Piece<'a> {
    Literal(&'a str),
    Mention(usize),
}

/// Splits `text` at stash placeholders.
fn split_stashed<'a>(text: &'a str, stash: &[Stashed]) -> Vec<Piece<'a>> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(STASH_OPEN) {
        let after = &rest[open + STASH_OPEN.len_utf8()..];
        let index = after
            .find(STASH_CLOSE)
            .and_then(|close| after[..close].parse::<usize>().ok().map(|i| (i, close)))
            .filter(|(i, _)| *i < stash.len());
        let Some((index, close)) = index else {
            pieces.push(Piece::Literal(&rest[..open + STASH_OPEN.len_utf8()]));
            rest = after;
            continue;
        };
        if open > 0 {
            pieces.push(Piece::Literal(&rest[..open]));
        }
        pieces.push(Piece::Mention(index));
        rest = &after[close + STASH_CLOSE.len_utf8()..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    pieces
}

/// Puts the original mention text back, for code where nothing is drawn.
fn restore(text: &str, stash: &[Stashed]) -> String {
    split_stashed(text, stash)
        .into_iter()
        .map(|piece| match piece {
            Piece::Literal(literal) => literal,
            Piece::Mention(index) => stash[index].source.as_str(),
        })
        .collect()
}

fn flush_text(pending: &mut String, stash: &[Stashed], events: &mut Vec<Event<'_>>) {
    if pending.is_empty() {
        return;
    }
    let text = std::mem::take(pending);
    for piece in split_stashed(&text, stash) {
        match piece {
            Piece::Literal(literal) => push_with_checkboxes(literal, events),
            Piece::Mention(index) => events.push(Event::InlineHtml(CowStr::from(stash[index].html.clone()))),
        }
    }
}

fn push_with_checkboxes(text: &str, events: &mut Vec<Event<'_>>) {
    let mut cursor = 0usize;
    for marker in scan(text) {
        let MarkerKind::Checkbox { checked } = marker.kind else {
            continue;
        };
        if marker.span.start > cursor {
            events.push(Event::Text(text[cursor..marker.span.start].to_string().into()));
        }
        events.push(Event::InlineHtml(
            format!(
                "<input type=\"checkbox\" class=\"cm-checkbox\" disabled{}>",
                if checked { " checked" } else { "" }
            )
            .into(),
        ));
        cursor = marker.span.end;
    }
    if cursor < text.len() {
        events.push(Event::Text(text[cursor..].to_string().into()));
    }
}
