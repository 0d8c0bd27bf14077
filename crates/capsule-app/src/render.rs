use std::fmt::Write;

use capsule_browser::{InputKind, MessageKind, Mode};

use crate::app_state::{AppState, PAGE_LINES};

/// Draw the tab bar, the active page window and any pending prompt.
pub fn draw(state: &mut AppState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", tab_bar(state));

    if let Some(tab) = state.active_tab() {
        let status = if tab.is_loading() { " (loading)" } else { "" };
        let _ = writeln!(out, "== {}{status}", tab.current_url());

        match tab.mode() {
            Mode::Page => {
                if let Some(view) = state.view() {
                    if let Some(title) = &view.title {
                        let _ = writeln!(out, "-- {title}");
                    }
                    for line in view.content.lines().skip(tab.scroll_pos()).take(PAGE_LINES) {
                        let _ = writeln!(out, "{line}");
                    }
                }
            },
            Mode::Input { prompt, kind } => {
                let hint = match kind {
                    InputKind::Query { sensitive: true, .. } => " (sensitive)",
                    _ => "",
                };
                let _ = writeln!(out, "{prompt}{hint} ('.' cancels)");
            },
            Mode::Message { text, kind } => {
                let _ = writeln!(out, "{text}");
                if kind.needs_confirmation() {
                    let _ = writeln!(out, "[y/n]");
                } else if *kind == MessageKind::Plain {
                    let _ = writeln!(out, "[enter]");
                }
            },
        }
    }

    for line in state.output_lines.drain(..) {
        let _ = writeln!(out, "{line}");
    }
    out
}

fn tab_bar(state: &AppState) -> String {
    state
        .browser
        .tabs()
        .iter()
        .enumerate()
        .map(|(i, tab)| {
            if tab.id() == state.active {
                format!("[*{}]", i + 1)
            } else {
                format!("[{}]", i + 1)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
