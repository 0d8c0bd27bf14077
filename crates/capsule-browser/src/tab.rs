//! Tab state machine.
//!
//! A tab is in one of three modes: showing a page, asking for a line of
//! input, or showing a message. Every transition is a synchronous method
//! that may return a [`Command`] for the event loop to carry out; network
//! results come back through [`Tab::complete`].
//!
//! Each fetch carries a cancellation token. Starting a new load cancels
//! the previous token, and a completion whose token was cancelled is
//! dropped, so at most one fetch result is ever applied per load.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::sync::CancellationToken;
use url::Url;

use capsule_net::fetch::FetchRequest;
use capsule_types::error::{CapsuleError, Result};
use capsule_types::response::{Response, Status};

use crate::history::History;
use crate::pages::Pages;

pub type TabId = u64;

/// Redirects followed before giving up.
pub const MAX_REDIRECTS: u8 = 5;

/// Largest redirect limit a configuration may ask for.
pub const REDIRECT_LIMIT_CEILING: u8 = 20;

/// Deadline for a single fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters left unescaped in a query string (RFC 3986 unreserved).
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabSettings {
    pub fetch_timeout: Duration,
    pub max_redirects: u8,
}

impl Default for TabSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: FETCH_TIMEOUT,
            max_redirects: MAX_REDIRECTS,
        }
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// What a submitted input line is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Server asked for input (status 1x); the answer becomes the query of `url`.
    Query { url: String, sensitive: bool },
    /// Go-to-URL prompt.
    Navigate,
    /// Path to save the current page to.
    Download,
}

/// What answering a message does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Informational; any answer dismisses it.
    Plain,
    /// "Yes" reloads `url` re-pinning the server certificate.
    ForceCert { url: String },
    /// "Yes" hands `url` to the external opener.
    OpenExternal { url: String },
}

impl MessageKind {
    pub fn needs_confirmation(&self) -> bool {
        !matches!(self, MessageKind::Plain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Page,
    Input { prompt: String, kind: InputKind },
    Message { text: String, kind: MessageKind },
}

// ---------------------------------------------------------------------------
// Loads and commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Scroll position to restore once the page is shown.
    pub scroll_pos: usize,
    /// Record the page in history when it is committed.
    pub add_history: bool,
    /// Redirects already followed to reach this load.
    pub level: u8,
    /// Replace the server's pinned certificate.
    pub force_repin: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            scroll_pos: 0,
            add_history: true,
            level: 0,
            force_repin: false,
        }
    }
}

/// A fetch the event loop should run on the tab's behalf.
#[derive(Debug)]
pub struct FetchJob {
    pub tab: TabId,
    pub request: FetchRequest,
    pub options: LoadOptions,
    pub token: CancellationToken,
    pub timeout: Duration,
}

impl FetchJob {
    /// Package the outcome of this job for [`Tab::complete`].
    pub fn complete(self, result: Result<Response>) -> Completion {
        Completion {
            tab: self.tab,
            url: self.request.url.to_string(),
            options: self.options,
            token: self.token,
            result,
        }
    }
}

/// The outcome of a [`FetchJob`].
#[derive(Debug)]
pub struct Completion {
    pub tab: TabId,
    pub url: String,
    pub options: LoadOptions,
    pub token: CancellationToken,
    pub result: Result<Response>,
}

/// Side effects requested by a transition.
#[derive(Debug)]
pub enum Command {
    Fetch(FetchJob),
    OpenExternal(String),
}

// ---------------------------------------------------------------------------
// Tab
// ---------------------------------------------------------------------------

pub struct Tab {
    id: TabId,
    mode: Mode,
    current_url: String,
    loading: bool,
    scroll_pos: usize,
    cancel: Option<CancellationToken>,
    history: History,
    last_response: Option<Response>,
    pages: Arc<Pages>,
    settings: TabSettings,
}

impl Tab {
    pub fn new(id: TabId, pages: Arc<Pages>, settings: TabSettings) -> Self {
        Self::with_history(id, History::new(), pages, settings)
    }

    /// A tab restored from a saved session.
    pub fn with_history(id: TabId, history: History, pages: Arc<Pages>, settings: TabSettings) -> Self {
        Self {
            id,
            mode: Mode::Page,
            current_url: String::new(),
            loading: false,
            scroll_pos: 0,
            cancel: None,
            history,
            last_response: None,
            pages,
            settings,
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn scroll_pos(&self) -> usize {
        self.scroll_pos
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    // -- intents --------------------------------------------------------

    /// Load a URL typed or clicked by the user.
    pub fn open(&mut self, url: &str) -> Option<Command> {
        self.load_or_report(url, LoadOptions::default())
    }

    /// Fetch the current page again without touching history.
    pub fn reload(&mut self) -> Option<Command> {
        if self.current_url.is_empty() {
            return None;
        }
        let url = self.current_url.clone();
        self.load_or_report(&url, LoadOptions {
            scroll_pos: self.scroll_pos,
            add_history: false,
            ..LoadOptions::default()
        })
    }

    /// Load the history cursor's entry, e.g. after session restore.
    pub fn restore(&mut self) -> Option<Command> {
        let entry = self.history.current()?.clone();
        self.load_or_report(&entry.url, LoadOptions {
            scroll_pos: entry.scroll_pos,
            add_history: false,
            ..LoadOptions::default()
        })
    }

    pub fn go_back(&mut self) -> Option<Command> {
        self.history.update_scroll(self.scroll_pos);
        let entry = self.history.back()?.clone();
        self.load_or_report(&entry.url, LoadOptions {
            scroll_pos: entry.scroll_pos,
            add_history: false,
            ..LoadOptions::default()
        })
    }

    pub fn go_forward(&mut self) -> Option<Command> {
        self.history.update_scroll(self.scroll_pos);
        let entry = self.history.forward()?.clone();
        self.load_or_report(&entry.url, LoadOptions {
            scroll_pos: entry.scroll_pos,
            add_history: false,
            ..LoadOptions::default()
        })
    }

    pub fn scroll_to(&mut self, pos: usize) {
        self.scroll_pos = pos;
    }

    pub fn prompt_navigate(&mut self) {
        self.show_input("Go to".to_string(), InputKind::Navigate);
    }

    pub fn prompt_download(&mut self) {
        self.show_input("Download to".to_string(), InputKind::Download);
    }

    pub fn submit_input(&mut self, value: &str) -> Option<Command> {
        let Mode::Input { kind, .. } = &self.mode else {
            return None;
        };
        let kind = kind.clone();
        self.mode = Mode::Page;

        match kind {
            InputKind::Query { url, .. } => self.open(&query_url(&url, value)),
            InputKind::Navigate => self.open(value.trim()),
            InputKind::Download => {
                if let Err(e) = self.save_last_response(Path::new(value.trim())) {
                    self.show_message(format!("could not complete download: {e}"), MessageKind::Plain);
                }
                None
            },
        }
    }

    pub fn cancel_input(&mut self) {
        if matches!(self.mode, Mode::Input { .. }) {
            self.mode = Mode::Page;
        }
    }

    pub fn answer_message(&mut self, yes: bool) -> Option<Command> {
        let Mode::Message { kind, .. } = &self.mode else {
            return None;
        };
        let kind = kind.clone();
        self.mode = Mode::Page;

        match kind {
            MessageKind::ForceCert { url } if yes => {
                log::info!("tab {}: re-pinning certificate for {url}", self.id);
                self.load_or_report(&url, LoadOptions {
                    force_repin: true,
                    ..LoadOptions::default()
                })
            },
            MessageKind::OpenExternal { url } if yes => Some(Command::OpenExternal(url)),
            _ => None,
        }
    }

    /// Abandon any in-flight fetch.
    pub fn cancel_in_flight(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.loading = false;
    }

    /// Write the raw bytes of the last committed page to `path`.
    pub fn save_last_response(&self, path: &Path) -> Result<()> {
        let response = self
            .last_response
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no page loaded"))?;
        std::fs::write(path, response.data())?;
        log::info!("Saved {} to {}", response.url(), path.display());
        Ok(())
    }

    // -- loading --------------------------------------------------------

    /// Start loading `url`.
    ///
    /// Fails with [`CapsuleError::TooManyRedirects`] when `options.level`
    /// exceeds the redirect limit; nothing is cancelled or fetched in that
    /// case. Pseudo-pages are committed immediately and other schemes turn
    /// into an "open externally?" question, so only `gemini` and `gopher`
    /// URLs produce a [`Command::Fetch`].
    pub fn load(&mut self, url: &str, options: LoadOptions) -> Result<Option<Command>> {
        if options.level > self.settings.max_redirects {
            return Err(CapsuleError::TooManyRedirects);
        }
        let url = normalize_url(url);
        if options.add_history {
            self.history.update_scroll(self.scroll_pos);
        }

        if Pages::is_pseudo(&url)
            && let Some(body) = self.pages.render(&url)
        {
            self.cancel_in_flight();
            log::debug!("tab {}: showing {url}", self.id);
            self.commit(Response::synthetic(&url, body), options);
            return Ok(None);
        }

        let parsed = match Url::parse(&url) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.cancel_in_flight();
                return Err(e.into());
            },
        };
        if !matches!(parsed.scheme(), "gemini" | "gopher") {
            self.cancel_in_flight();
            self.show_message(
                format!("Open {url:?} externally?"),
                MessageKind::OpenExternal { url },
            );
            return Ok(None);
        }

        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.loading = true;
        log::debug!("tab {}: loading {parsed} (level {})", self.id, options.level);

        Ok(Some(Command::Fetch(FetchJob {
            tab: self.id,
            request: FetchRequest {
                url: parsed,
                force_repin: options.force_repin,
            },
            options,
            token,
            timeout: self.settings.fetch_timeout,
        })))
    }

    /// Apply the outcome of a fetch started by this tab.
    pub fn complete(&mut self, completion: Completion) -> Option<Command> {
        if completion.token.is_cancelled() {
            log::debug!("tab {}: dropping superseded result for {}", self.id, completion.url);
            return None;
        }
        self.cancel = None;
        self.loading = false;

        match completion.result {
            Ok(response) => self.handle_response(response, completion.options),
            Err(e) if e.is_canceled() => None,
            Err(CapsuleError::CertChanged { host }) => {
                log::warn!("tab {}: certificate for {host} changed", self.id);
                self.show_message(
                    format!(
                        "The certificate for {:?} has changed since last time.\n\
                         Would you like to see the page anyway?",
                        completion.url
                    ),
                    MessageKind::ForceCert {
                        url: completion.url,
                    },
                );
                None
            },
            Err(e) => {
                log::warn!("tab {}: could not load {}: {e}", self.id, completion.url);
                self.show_message(format!("could not load URL: {e}"), MessageKind::Plain);
                None
            },
        }
    }

    fn handle_response(&mut self, response: Response, options: LoadOptions) -> Option<Command> {
        let (header, url) = match &response {
            Response::Gopher(_) => {
                self.commit(response, options);
                return None;
            },
            Response::Gemini(r) => (r.header.clone(), r.url.clone()),
        };
        log::debug!("tab {}: {} {} for {url}", self.id, header.code(), header.meta);

        let meta = header.meta;
        let text = match header.status {
            Status::Success => {
                self.commit(response, options);
                return None;
            },
            Status::Input => {
                let prompt = if meta.is_empty() { "Input".to_string() } else { meta };
                self.show_input(prompt, InputKind::Query {
                    url,
                    sensitive: header.status_detail == 1,
                });
                return None;
            },
            Status::Redirect => return self.follow_redirect(&url, &meta, options),
            Status::TemporaryFailure => with_meta("Temporary failure", &meta),
            Status::PermanentFailure if header.status_detail == 1 => {
                with_meta(&format!("Not found: {url}"), &meta)
            },
            Status::PermanentFailure => with_meta("Permanent failure", &meta),
            Status::ClientCertRequired => with_meta("Client certificate required", &meta),
        };
        self.show_message(text, MessageKind::Plain);
        None
    }

    fn follow_redirect(&mut self, from: &str, target: &str, options: LoadOptions) -> Option<Command> {
        let resolved = match Url::parse(from).and_then(|base| base.join(target)) {
            Ok(url) => url.to_string(),
            Err(e) => {
                self.show_message(format!("invalid redirect to {target:?}: {e}"), MessageKind::Plain);
                return None;
            },
        };
        log::debug!("tab {}: redirect {from} -> {resolved}", self.id);
        let Some(level) = options.level.checked_add(1) else {
            self.too_many_redirects();
            return None;
        };
        self.load_or_report(&resolved, LoadOptions {
            level,
            force_repin: false,
            ..options
        })
    }

    fn load_or_report(&mut self, url: &str, options: LoadOptions) -> Option<Command> {
        match self.load(url, options) {
            Ok(command) => command,
            Err(CapsuleError::TooManyRedirects) => {
                self.too_many_redirects();
                None
            },
            Err(e) => {
                self.loading = false;
                self.show_message(format!("could not load URL: {e}"), MessageKind::Plain);
                None
            },
        }
    }

    fn too_many_redirects(&mut self) {
        self.loading = false;
        self.show_message(
            "Too many redirects. Welcome to the Web from Hell.".to_string(),
            MessageKind::Plain,
        );
    }

    /// Commit a page. A "Go to" or "Download to" prompt the user opened
    /// while it was loading stays up.
    fn commit(&mut self, response: Response, options: LoadOptions) {
        let url = response.url().to_string();
        if options.add_history {
            self.history.add(&url);
        }
        self.current_url = url;
        self.scroll_pos = options.scroll_pos;
        self.last_response = Some(response);
        self.loading = false;
        if !matches!(
            self.mode,
            Mode::Input {
                kind: InputKind::Navigate | InputKind::Download,
                ..
            }
        ) {
            self.mode = Mode::Page;
        }
    }

    fn show_message(&mut self, text: String, kind: MessageKind) {
        self.mode = Mode::Message { text, kind };
    }

    fn show_input(&mut self, prompt: String, kind: InputKind) {
        self.mode = Mode::Input { prompt, kind };
    }
}

/// Input without a scheme is a Gemini host.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("gemini://{url}")
    }
}

/// `base` with its query replaced by the escaped `value`.
pub fn query_url(base: &str, value: &str) -> String {
    let base = base.split_once('?').map_or(base, |(b, _)| b);
    format!("{base}?{}", utf8_percent_encode(value, QUERY))
}

fn with_meta(prefix: &str, meta: &str) -> String {
    if meta.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}: {meta}")
    }
}
