//! Inline annotation and round-trip serialization core of the notas editor.
//!
//! Note text stays the single source of truth. [`scan`] finds the embedded
//! micro-syntaxes, [`build_decorations`] turns them into render instructions,
//! widget controllers edit the text back through a [`widgets::WidgetHost`], and
//! [`encode`] / [`decode`] convert to and from the rich document losslessly.

pub mod checklist;
pub mod config;
pub mod decorations;
pub mod drawing;
pub mod editor_core;
pub mod error;
pub mod preview;
pub mod scanner;
pub mod serializer;
pub mod session;
pub mod widgets;

pub use checklist::{from_checklist, to_checklist, NoteMode};
pub use config::EditorConfig;
pub use decorations::{build_decorations, DecorationSet, ZoneState};
pub use error::{CoreError, ImproveError};
pub use preview::render_preview;
pub use scanner::{scan, Marker, MarkerKind, Span};
pub use serializer::{decode, encode, RichDoc, RichNode};
pub use session::NoteSession;
