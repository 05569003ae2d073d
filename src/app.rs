use leptos::task::spawn_local;

use leptos::prelude::*;
use notas_ui::checklist::{self, NoteMode};
use notas_ui::decorations::overlay_html;
use notas_ui::editor_core::{byte_idx_to_utf16, utf16_to_byte_idx, NoteCommand, Selection};
use notas_ui::session::SaveRequest;
use notas_ui::widgets::{CodeBlockState, WidgetAction, WidgetController, WidgetOutcome};
use notas_ui::{render_preview, EditorConfig, ImproveError, NoteSession};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["window", "__TAURI__", "core"], catch)]
    async fn invoke(cmd: &str, args: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["navigator", "clipboard"], js_name = writeText)]
    fn write_clipboard_text(text: &str) -> js_sys::Promise;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveNoteArgs<'a> { id: &'a str, content: &'a str, is_list: bool }
#[derive(Serialize)]
struct NoteIdArgs<'a> { id: &'a str }
#[derive(Serialize)]
struct ImproveTextArgs<'a> { text: &'a str }
#[derive(Serialize)]
struct OpenPathArgs<'a> { path: &'a str }

/// A note as the backend lists it.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct NoteSummary {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default, alias = "is_list")]
    is_list: bool,
}

fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

fn to_args<T: Serialize>(args: &T) -> JsValue {
    serde_wasm_bindgen::to_value(args).unwrap_or(JsValue::NULL)
}

fn js_error_text(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

fn read_selection(el: &leptos::web_sys::HtmlTextAreaElement, text: &str) -> Selection {
    let start = el.selection_start().ok().flatten().unwrap_or(0);
    let end = el.selection_end().ok().flatten().unwrap_or(start);
    Selection::new(utf16_to_byte_idx(text, start), utf16_to_byte_idx(text, end))
}

fn dispatch_save(request: SaveRequest, session: RwSignal<NoteSession>, notes: RwSignal<Vec<NoteSummary>>) {
    spawn_local(async move {
        let args = to_args(&SaveNoteArgs {
            id: &request.note_id,
            content: &request.content,
            is_list: request.is_list,
        });
        match invoke("save_note", args).await {
            Ok(_) => {
                notes.update(|list| {
                    if let Some(note) = list.iter_mut().find(|n| n.id == request.note_id) {
                        note.content = request.content.clone();
                        note.is_list = request.is_list;
                    }
                });
                session.update(|s| s.save_succeeded(&request.note_id, request.revision));
            }
            Err(err) => {
                let message = js_error_text(err);
                session.update(|s| s.save_failed(&request.note_id, &message, now_ms()));
            }
        }
    });
}

fn open_path(path: String, session: RwSignal<NoteSession>) {
    spawn_local(async move {
        if let Err(err) = invoke("open_path", to_args(&OpenPathArgs { path: &path })).await {
            let message = js_error_text(err);
            log::warn!("opening {path} failed: {message}");
            session.update(|s| s.set_status(format!("Could not open {path}: {message}")));
        }
    });
}

fn widget_view<A>(index: usize, controller: WidgetController, act: A) -> AnyView
where
    A: Fn(usize, WidgetAction) + Copy + Send + Sync + 'static,
{
    match controller {
        WidgetController::CodeBlock(block) => {
            let numbers = block.line_numbers();
            let language = block.language.clone();
            match block.state {
                CodeBlockState::Viewing => view! {
                    <div class="code-block-component">
                        <div class="code-block-header">
                            <span class="code-block-language">{language}</span>
                            <button on:click=move |_| act(index, WidgetAction::BeginEdit)>"Edit"</button>
                            <button on:click=move |_| act(index, WidgetAction::Copy)>"Copy"</button>
                            <button on:click=move |_| act(index, WidgetAction::Delete)>"Delete"</button>
                        </div>
                        <div class="code-block-content">
                            <pre class="code-block-line-numbers">{numbers}</pre>
                            <pre class="code-block-code">{block.code}</pre>
                        </div>
                    </div>
                }
                .into_any(),
                CodeBlockState::Editing { draft } => view! {
                    <div class="code-block-component editing">
                        <div class="code-block-header">
                            <span class="code-block-language">{language}</span>
                            <button on:click=move |_| act(index, WidgetAction::Commit)>"Save"</button>
                            <button on:click=move |_| act(index, WidgetAction::Cancel)>"Cancel"</button>
                        </div>
                        <div class="code-block-content">
                            <pre class="code-block-line-numbers">{numbers}</pre>
                            <textarea
                                class="code-block-code"
                                spellcheck="false"
                                prop:value=draft
                                on:input=move |e| act(index, WidgetAction::UpdateDraft(event_target_value(&e)))
                            ></textarea>
                        </div>
                    </div>
                }
                .into_any(),
            }
        }
        WidgetController::InlineCode { code, .. } => view! {
            <code class="inline-code" title="Click to copy" on:click=move |_| act(index, WidgetAction::Copy)>
                {code}
            </code>
        }
        .into_any(),
        WidgetController::Checkbox(checkbox) => view! {
            <label class="cm-checkbox-widget">
                <input
                    type="checkbox"
                    class="cm-checkbox"
                    prop:checked=checkbox.checked
                    on:change=move |_| act(index, WidgetAction::Toggle)
                />
            </label>
        }
        .into_any(),
        WidgetController::FileLink(link) => {
            let class = if link.label.is_some() { "file-link-widget" } else { "file-mention" };
            let name = link.display_name().to_string();
            view! {
                <span class=class title=link.path.clone()>
                    <a href="#" on:click=move |e| {
                        e.prevent_default();
                        act(index, WidgetAction::Open);
                    }>{name}</a>
                    <button class="file-link-remove" on:click=move |_| act(index, WidgetAction::Delete)>"×"</button>
                </span>
            }
            .into_any()
        }
    }
}

#[component]
pub fn App() -> impl IntoView {
    let session = RwSignal::new(NoteSession::new(EditorConfig::default()));
    let notes = RwSignal::new(Vec::<NoteSummary>::new());
    let controllers = RwSignal::new(Vec::<WidgetController>::new());
    let (show_preview, set_show_preview) = signal(false);
    let (scroll_top, set_scroll_top) = signal(0);
    let textarea_ref = NodeRef::<leptos::html::Textarea>::new();
    // Coarse views only re-render when these change, not on every keystroke.
    let has_note = Memo::new(move |_| session.with(|s| s.active_note_id().is_some()));
    let mode = Memo::new(move |_| session.with(|s| s.mode()));
    let active_id = Memo::new(move |_| session.with(|s| s.active_note_id().map(str::to_string)));

    Effect::new(move |_| {
        spawn_local(async move {
            match invoke("load_settings", JsValue::NULL).await {
                Ok(raw) => {
                    if let Some(raw) = raw.as_string() {
                        session.update(|s| s.set_config(EditorConfig::from_json(&raw)));
                    }
                }
                Err(err) => log::warn!("no editor settings: {}", js_error_text(err)),
            }
            match invoke("list_notes", JsValue::NULL).await {
                Ok(value) => match serde_wasm_bindgen::from_value::<Vec<NoteSummary>>(value) {
                    Ok(list) => {
                        log::info!("loaded {} notes", list.len());
                        notes.set(list);
                    }
                    Err(err) => log::error!("unexpected note list: {err}"),
                },
                Err(err) => log::error!("listing notes failed: {}", js_error_text(err)),
            }
        });
    });

    // Rebuild widget controllers when the text moves, keeping the local
    // state (an open code editor) of widgets that are still there.
    Effect::new(move |_| {
        let fresh = session.with(|s| s.controllers());
        controllers.update(|current| {
            *current = fresh
                .into_iter()
                .map(|f| {
                    current
                        .iter()
                        .find(|c| c.anchor().span == f.anchor().span && c.anchor().source == f.anchor().source)
                        .filter(|c| c.anchor().note_id == f.anchor().note_id)
                        .cloned()
                        .unwrap_or(f)
                })
                .collect();
        });
    });

    set_interval(
        move || {
            let mut request = None;
            session.update_untracked(|s| request = s.tick(now_ms()));
            if let Some(request) = request {
                session.notify();
                dispatch_save(request, session, notes);
            }
        },
        Duration::from_secs(1),
    );

    let sync_textarea = move || {
        let Some(el) = textarea_ref.get_untracked() else {
            return;
        };
        session.with_untracked(|s| {
            let text = s.text();
            el.set_value(text);
            if let Some(buffer) = s.buffer() {
                let selection = buffer.snapshot.selection;
                let _ = el.set_selection_range(
                    byte_idx_to_utf16(text, selection.start),
                    byte_idx_to_utf16(text, selection.end),
                );
            }
        });
    };

    let capture_selection = move || {
        if let Some(el) = textarea_ref.get_untracked() {
            let selection = session.with_untracked(|s| read_selection(&el, s.text()));
            session.update_untracked(|s| s.set_selection(selection));
        }
    };

    let open_note = move |note: NoteSummary| {
        let mut flush = None;
        session.update(|s| flush = s.open_note(&note.id, &note.content, NoteMode::from_is_list(note.is_list)));
        if let Some(request) = flush {
            dispatch_save(request, session, notes);
        }
    };

    let delete_note = move |id: String| {
        spawn_local(async move {
            match invoke("delete_note", to_args(&NoteIdArgs { id: &id })).await {
                Ok(_) => {
                    session.update(|s| s.note_deleted(&id));
                    notes.update(|list| list.retain(|n| n.id != id));
                }
                Err(err) => {
                    let message = js_error_text(err);
                    session.update(|s| s.set_status(format!("Error deleting: {message}")));
                }
            }
        });
    };

    let save_now = move || {
        let mut request = None;
        session.update(|s| request = s.save_now());
        if let Some(request) = request {
            dispatch_save(request, session, notes);
        }
    };

    let toggle_mode = move || {
        session.update(|s| s.set_mode(s.mode().toggled(), now_ms()));
        sync_textarea();
    };

    let run_command = move |command: NoteCommand| -> bool {
        capture_selection();
        let mut changed = false;
        session.update(|s| match s.apply_command(&command, now_ms()) {
            Ok(applied) => changed = applied,
            Err(err) => log::warn!("{command:?} rejected: {err}"),
        });
        if changed {
            sync_textarea();
        }
        changed
    };

    let improve = move || {
        capture_selection();
        let selection = session.with_untracked(|s| s.buffer().map(|b| b.snapshot.selection).unwrap_or_default());
        let mut request = None;
        session.update(|s| match s.request_improvement(selection) {
            Ok(r) => request = Some(r),
            Err(err) => s.set_status(err.to_string()),
        });
        let Some(request) = request else {
            return;
        };
        spawn_local(async move {
            let args = to_args(&ImproveTextArgs { text: &request.text });
            let result = match invoke("improve_text", args).await {
                Ok(value) => value
                    .as_string()
                    .ok_or_else(|| ImproveError::Request("empty response".to_string())),
                Err(err) => Err(ImproveError::Request(js_error_text(err))),
            };
            session.update(|s| {
                s.complete_improvement(request.ticket, result);
            });
        });
    };

    let accept_proposal = move || {
        session.update(|s| {
            if let Err(err) = s.accept_proposal(now_ms()) {
                log::warn!("applying suggestion failed: {err}");
                s.set_status(format!("Could not apply suggestion: {err}"));
            }
        });
        sync_textarea();
    };

    let act = move |index: usize, action: WidgetAction| {
        let Some(mut controller) = controllers.with_untracked(|cs| cs.get(index).cloned()) else {
            return;
        };
        let is_draft = matches!(action, WidgetAction::UpdateDraft(_));
        let mut outcome = WidgetOutcome::Unchanged;
        session.update_untracked(|s| outcome = s.handle_widget(&mut controller, action, now_ms()));

        let write_back = |cs: &mut Vec<WidgetController>| {
            if let Some(slot) = cs.get_mut(index) {
                *slot = controller;
            }
        };
        // Typing into a code draft must not re-render the editor under the caret.
        if is_draft {
            controllers.update_untracked(write_back);
        } else {
            controllers.update(write_back);
        }

        match outcome {
            WidgetOutcome::Applied(_) => {
                session.notify();
                sync_textarea();
            }
            WidgetOutcome::Open(path) => open_path(path, session),
            WidgetOutcome::Copy(text) => {
                let _ = write_clipboard_text(&text);
                session.update(|s| s.set_status("Copied"));
            }
            WidgetOutcome::Stale => session.update(|s| s.set_status("That widget is out of date")),
            WidgetOutcome::Unchanged => {}
        }
    };

    let on_keydown = move |ev: leptos::ev::KeyboardEvent| {
        let ctrl = ev.ctrl_key() || ev.meta_key();
        let key = ev.key();
        let handled = match (ctrl, ev.shift_key(), key.as_str()) {
            (false, false, "Enter") => run_command(NoteCommand::ContinueChecklist),
            (true, false, "Enter") => run_command(NoteCommand::ToggleCheckboxPrefix),
            (true, false, "e" | "E") => run_command(NoteCommand::WrapCodeMention),
            (true, true, "k" | "K") => {
                let language = session.with_untracked(|s| s.config().default_code_language.clone());
                run_command(NoteCommand::InsertCodeBlock { language })
            }
            (true, _, "i" | "I") => {
                improve();
                true
            }
            (true, false, "s" | "S") => {
                save_now();
                true
            }
            (true, false, "l" | "L") => {
                toggle_mode();
                true
            }
            _ => false,
        };
        if handled {
            ev.prevent_default();
        }
    };

    let sidebar = move || {
        let active = active_id.get();
        notes
            .get()
            .into_iter()
            .map(|note| {
                let is_active = active.as_deref() == Some(note.id.as_str());
                let preview = checklist::preview(&note.content, NoteMode::from_is_list(note.is_list));
                let title = if note.title.is_empty() { "Untitled".to_string() } else { note.title.clone() };
                let id = note.id.clone();
                view! {
                    <div
                        class="note-item"
                        style=if is_active { "background: var(--accent-color); color: white;" } else { "" }
                        on:click=move |_| open_note(note.clone())
                    >
                        <div class="note-item-title">{title}</div>
                        <div class="note-item-preview">{preview}</div>
                        <button
                            class="note-item-delete"
                            title="Delete note"
                            on:click=move |e| {
                                e.stop_propagation();
                                delete_note(id.clone());
                            }
                        >
                            "🗑"
                        </button>
                    </div>
                }
            })
            .collect::<Vec<_>>()
    };

    let checklist_view = move || {
        let rows = move || {
            session
                .with(|s| checklist::parse_items(s.text()))
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    view! {
                        <div class=if item.checked { "checklist-item checked" } else { "checklist-item" }>
                            <input
                                type="checkbox"
                                class="checklist-checkbox"
                                prop:checked=item.checked
                                on:change=move |_| {
                                    session.update(|s| {
                                        s.toggle_item(i, now_ms());
                                    });
                                }
                            />
                            <input
                                type="text"
                                class="checklist-text"
                                placeholder="List item..."
                                prop:value=item.text
                                on:input=move |e| {
                                    let text = event_target_value(&e);
                                    session.update_untracked(|s| {
                                        s.update_item_text(i, &text, now_ms());
                                    });
                                }
                            />
                        </div>
                    }
                })
                .collect::<Vec<_>>()
        };
        view! {
            <div class="checklist-container">
                {rows}
                <div class="checklist-item">
                    <span style="width: 18px; text-align: center; opacity: 0.5;">"+"</span>
                    <input
                        type="text"
                        class="checklist-text"
                        placeholder="Add item..."
                        on:keydown=move |e: leptos::ev::KeyboardEvent| {
                            if e.key() != "Enter" {
                                return;
                            }
                            e.prevent_default();
                            let input: leptos::web_sys::HtmlInputElement = event_target(&e);
                            let text = input.value();
                            input.set_value("");
                            session.update(|s| {
                                s.add_item(&text, now_ms());
                            });
                        }
                    />
                </div>
            </div>
        }
    };

    let editor_view = move || {
        view! {
            <div class="editor-container" style="flex: 1; position: relative; overflow: hidden;">
                <div
                    class="marker-highlight-layer"
                    style="position: absolute; inset: 0; padding: 2rem 3rem; font-family: var(--font-editor); line-height: 1.6; white-space: pre-wrap; word-wrap: break-word; pointer-events: none; box-sizing: border-box; overflow-y: hidden;"
                    inner_html=move || session.with(|s| overlay_html(s.text(), s.decorations().map(|d| d.as_slice()).unwrap_or_default()))
                    prop:scrollTop=move || scroll_top.get()
                ></div>
                <div
                    class="ai-zone-layer"
                    style="position: absolute; inset: 0; padding: 2rem 3rem; font-family: var(--font-editor); line-height: 1.6; white-space: pre-wrap; word-wrap: break-word; pointer-events: none; box-sizing: border-box; overflow-y: hidden; color: transparent;"
                    inner_html=move || session.with(|s| overlay_html(s.text(), &s.zone_decorations()))
                    prop:scrollTop=move || scroll_top.get()
                ></div>
                <textarea
                    node_ref=textarea_ref
                    class="raw-editor"
                    style="position: absolute; inset: 0; padding: 2rem 3rem; font-family: var(--font-editor); line-height: 1.6; color: transparent; background: transparent; caret-color: var(--text-primary); outline: none; border: none; resize: none; box-sizing: border-box; overflow-y: auto;"
                    prop:value=move || session.with(|s| s.text().to_string())
                    on:input=move |e| {
                        let value = event_target_value(&e);
                        let selection = textarea_ref
                            .get_untracked()
                            .map(|el| read_selection(&el, &value))
                            .unwrap_or_default();
                        session.update(|s| {
                            s.input(value, selection, now_ms());
                        });
                    }
                    on:keydown=on_keydown
                    on:scroll=move |e| {
                        let target: leptos::web_sys::Element = event_target(&e);
                        set_scroll_top.set(target.scroll_top());
                    }
                    placeholder="Start writing... @code{..}, @file{..}, [ ] and ```lang fences become widgets"
                    spellcheck="false"
                ></textarea>
            </div>
            <div class="widget-pane" style="border-top: 1px solid var(--border-color); padding: 0.75rem 1.5rem; display: flex; flex-wrap: wrap; gap: 0.5rem; max-height: 40%; overflow-y: auto;">
                {move || {
                    controllers
                        .get()
                        .into_iter()
                        .enumerate()
                        .map(|(i, c)| widget_view(i, c, act))
                        .collect::<Vec<_>>()
                }}
            </div>
        }
    };

    let proposal_gate = move || {
        session.with(|s| s.proposal().cloned()).map(|proposal| {
            view! {
                <div class="ai-proposal" style="border-top: 1px solid var(--border-color); padding: 0.75rem 1.5rem;">
                    <div class="ai-proposal-original" style="text-decoration: line-through; opacity: 0.6;">{proposal.original}</div>
                    <div class="ai-proposal-replacement">{proposal.replacement}</div>
                    <button on:click=move |_| accept_proposal()>"Accept"</button>
                    <button on:click=move |_| session.update(|s| s.reject_proposal())>"Reject"</button>
                </div>
            }
        })
    };

    view! {
        <main class="app-layout" style="display: flex; height: 100vh; width: 100vw; background: var(--bg-primary); color: var(--text-primary);">
            <nav class="sidebar" style="width: var(--sidebar-width); border-right: 1px solid var(--border-color); display: flex; flex-direction: column; background: var(--bg-secondary);">
                <div class="sidebar-header" style="height: var(--topbar-height); display: flex; align-items: center; padding: 0 1rem; border-bottom: 1px solid var(--border-color); font-weight: 600; color: var(--accent-color);">
                    "Notas"
                </div>
                <div class="note-list" style="flex: 1; overflow-y: auto; padding: 0.75rem 0.5rem;">
                    {sidebar}
                </div>
            </nav>
            <section class="editor-pane" style="flex: 1; display: flex; flex-direction: column;">
                {move || if !has_note.get() {
                    view! {
                        <div style="flex: 1; display: flex; align-items: center; justify-content: center; color: var(--text-muted);">
                            "Select a note from the sidebar to start editing."
                        </div>
                    }.into_any()
                } else {
                    view! {
                        <header class="topbar" style="height: var(--topbar-height); border-bottom: 1px solid var(--border-color); display: flex; align-items: center; gap: 0.5rem; padding: 0 1.5rem;">
                            <button on:click=move |_| toggle_mode()>
                                {move || if mode.get().is_list() { "Note" } else { "Checklist" }}
                            </button>
                            <button on:click=move |_| set_show_preview.update(|p| *p = !*p)>
                                {move || if show_preview.get() { "Edit" } else { "Preview" }}
                            </button>
                            <button on:click=move |_| improve()>"✨ Improve"</button>
                            <button on:click=move |_| save_now()>"Save"</button>
                        </header>
                        {move || match (mode.get(), show_preview.get()) {
                            (NoteMode::Checklist, _) => checklist_view().into_any(),
                            (NoteMode::FreeText, true) => view! {
                                <div
                                    class="markdown-preview"
                                    style="flex: 1; padding: 2rem 3rem; overflow-y: auto;"
                                    inner_html=move || session.with(|s| render_preview(s.text()))
                                ></div>
                            }.into_any(),
                            (NoteMode::FreeText, false) => editor_view().into_any(),
                        }}
                        {proposal_gate}
                    }.into_any()
                }}
                <footer class="status-bar" style="height: 1.75rem; border-top: 1px solid var(--border-color); padding: 0 1rem; font-size: 0.8rem; color: var(--text-muted); display: flex; align-items: center;">
                    {move || session.with(|s| s.status().unwrap_or_default().to_string())}
                </footer>
            </section>
        </main>
    }
}
