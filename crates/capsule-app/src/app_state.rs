use std::path::PathBuf;

use capsule_browser::{Browser, PlainRenderer, Rendered, Renderer, Tab, TabId};

/// Lines shown per screen; `j`/`k` scroll by this much.
pub const PAGE_LINES: usize = 24;

/// Everything the shell needs between input lines.
pub struct AppState {
    pub browser: Browser,
    /// Tab the shell is looking at.
    pub active: TabId,
    pub renderer: PlainRenderer,
    /// Notes for the user printed after the next redraw.
    pub output_lines: Vec<String>,
    pub history_path: PathBuf,
}

impl AppState {
    pub fn new(browser: Browser, history_path: PathBuf) -> Self {
        let active = browser.tabs().first().map_or(0, Tab::id);
        Self {
            browser,
            active,
            renderer: PlainRenderer,
            output_lines: Vec::new(),
            history_path,
        }
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.browser.tab(self.active)
    }

    /// 1-based position of the active tab.
    pub fn active_index(&self) -> Option<usize> {
        self.browser
            .tabs()
            .iter()
            .position(|t| t.id() == self.active)
            .map(|i| i + 1)
    }

    /// Point `active` at a live tab after one was closed.
    pub fn fix_active(&mut self) {
        if self.active_tab().is_none() {
            self.active = self.browser.tabs().last().map_or(0, Tab::id);
        }
    }

    /// Render the active tab's committed page.
    pub fn view(&self) -> Option<Rendered> {
        let response = self.active_tab()?.last_response()?;
        let media_type = response.media_type();
        if !media_type.starts_with("text/") {
            return Some(Rendered {
                content: format!(
                    "[{media_type}, {} bytes; use d <path> to save]\n",
                    response.data().len()
                ),
                ..Rendered::default()
            });
        }
        match response.text() {
            Ok(body) => Some(self.renderer.render(&body, media_type, response.url())),
            Err(e) => Some(Rendered {
                content: format!("[could not decode page: {e}]\n"),
                ..Rendered::default()
            }),
        }
    }
}
