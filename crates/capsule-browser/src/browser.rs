//! The browser event loop.
//!
//! All tab state is mutated here, one [`Event`] at a time. Fetches run as
//! independent tokio tasks and report back with exactly one
//! [`Event::Fetched`] each, so no tab state is ever shared with a task.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use capsule_net::fetch::Fetcher;
use capsule_types::error::{CapsuleError, Result};

use crate::history::History;
use crate::opener::ExternalOpener;
use crate::pages::Pages;
use crate::session;
use crate::tab::{Command, Completion, FetchJob, Tab, TabId, TabSettings};

/// Inputs to [`Browser::update`].
#[derive(Debug)]
pub enum Event {
    Load { tab: TabId, url: String },
    Reload(TabId),
    Back(TabId),
    Forward(TabId),
    PromptNavigate(TabId),
    PromptDownload(TabId),
    SubmitInput { tab: TabId, value: String },
    CancelInput(TabId),
    AnswerMessage { tab: TabId, yes: bool },
    Scroll { tab: TabId, pos: usize },
    OpenTab { url: String },
    CloseTab(TabId),
    /// A fetch task finished.
    Fetched(Completion),
}

pub struct Browser {
    tabs: Vec<Tab>,
    next_id: TabId,
    home_url: String,
    fetcher: Arc<dyn Fetcher>,
    opener: Arc<dyn ExternalOpener>,
    pages: Arc<Pages>,
    settings: TabSettings,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    in_flight: usize,
}

impl Browser {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        opener: Arc<dyn ExternalOpener>,
        pages: Arc<Pages>,
        settings: TabSettings,
        home_url: &str,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            tabs: Vec::new(),
            next_id: 1,
            home_url: home_url.to_string(),
            fetcher,
            opener,
            pages,
            settings,
            events_tx,
            events_rx,
            in_flight: 0,
        }
    }

    /// Handle for posting events from outside the loop.
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id() == id)
    }

    fn tab_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id() == id)
    }

    /// Number of fetches whose completion has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn home_url(&self) -> &str {
        &self.home_url
    }

    // -- tabs -----------------------------------------------------------

    /// Open a tab and start loading `url` in it.
    pub fn open_tab(&mut self, url: &str) -> TabId {
        let id = self.push_tab(History::new());
        let command = self.tab_mut(id).and_then(|tab| tab.open(url));
        self.dispatch(command);
        id
    }

    pub fn close_tab(&mut self, id: TabId) {
        if let Some(index) = self.tabs.iter().position(|t| t.id() == id) {
            let mut tab = self.tabs.remove(index);
            tab.cancel_in_flight();
            log::debug!("closed tab {id}");
        }
    }

    fn push_tab(&mut self, history: History) -> TabId {
        let id = self.next_id;
        self.next_id += 1;
        self.tabs.push(Tab::with_history(
            id,
            history,
            Arc::clone(&self.pages),
            self.settings,
        ));
        id
    }

    // -- session --------------------------------------------------------

    /// Recreate tabs from a loaded session.
    ///
    /// A failed load is not fatal: it is logged and a single home tab is
    /// opened instead. Tabs with empty histories open the home page.
    pub fn restore(&mut self, session: Result<Vec<History>>) {
        let histories = match session {
            Ok(histories) => histories,
            Err(e) => {
                log::warn!("Could not restore session, starting fresh: {e}");
                Vec::new()
            },
        };
        if histories.is_empty() {
            let home = self.home_url.clone();
            self.open_tab(&home);
            return;
        }

        log::info!("Restoring {} tabs", histories.len());
        for history in histories {
            let id = self.push_tab(history);
            let home = self.home_url.clone();
            let command = self
                .tab_mut(id)
                .and_then(|tab| if tab.history().is_empty() { tab.open(&home) } else { tab.restore() });
            self.dispatch(command);
        }
    }

    /// Load the session file at `path` and restore it.
    pub fn restore_from(&mut self, path: &Path) {
        self.restore(session::load(path));
    }

    pub fn save_session(&self, path: &Path) -> Result<()> {
        session::save(path, self.tabs.iter().map(Tab::history))
    }

    // -- event loop -----------------------------------------------------

    /// Apply one event.
    pub fn update(&mut self, event: Event) {
        let command = match event {
            Event::Fetched(completion) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let id = completion.tab;
                match self.tab_mut(id) {
                    Some(tab) => tab.complete(completion),
                    None => {
                        log::debug!("dropping result for closed tab {id}");
                        None
                    },
                }
            },
            Event::OpenTab { url } => {
                self.open_tab(&url);
                None
            },
            Event::CloseTab(id) => {
                self.close_tab(id);
                None
            },
            Event::Load { tab, url } => self.with_tab(tab, |t| t.open(&url)),
            Event::Reload(tab) => self.with_tab(tab, Tab::reload),
            Event::Back(tab) => self.with_tab(tab, Tab::go_back),
            Event::Forward(tab) => self.with_tab(tab, Tab::go_forward),
            Event::PromptNavigate(tab) => self.with_tab(tab, |t| {
                t.prompt_navigate();
                None
            }),
            Event::PromptDownload(tab) => self.with_tab(tab, |t| {
                t.prompt_download();
                None
            }),
            Event::SubmitInput { tab, value } => self.with_tab(tab, |t| t.submit_input(&value)),
            Event::CancelInput(tab) => self.with_tab(tab, |t| {
                t.cancel_input();
                None
            }),
            Event::AnswerMessage { tab, yes } => self.with_tab(tab, |t| t.answer_message(yes)),
            Event::Scroll { tab, pos } => self.with_tab(tab, |t| {
                t.scroll_to(pos);
                None
            }),
        };
        self.dispatch(command);
    }

    /// Apply queued events, waiting for in-flight fetches, until there is
    /// nothing left to do.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.apply_pending();
            if self.in_flight == 0 {
                return;
            }
            match self.next_event().await {
                Some(event) => self.update(event),
                None => return,
            }
        }
    }

    /// Apply every event already queued without waiting.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.update(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next queued event. Cancel safe, so it can sit in a
    /// `select!` next to user input; pass the result to [`Browser::update`].
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }

    fn with_tab(&mut self, id: TabId, f: impl FnOnce(&mut Tab) -> Option<Command>) -> Option<Command> {
        match self.tab_mut(id) {
            Some(tab) => f(tab),
            None => {
                log::debug!("no tab {id}");
                None
            },
        }
    }

    fn dispatch(&mut self, command: Option<Command>) {
        match command {
            Some(Command::Fetch(job)) => self.spawn_fetch(job),
            Some(Command::OpenExternal(url)) => {
                if let Err(e) = self.opener.open(&url) {
                    log::warn!("Could not open {url}: {e}");
                }
            },
            None => {},
        }
    }

    fn spawn_fetch(&mut self, job: FetchJob) {
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events_tx.clone();
        self.in_flight += 1;

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = job.token.cancelled() => Err(CapsuleError::Canceled),
                r = tokio::time::timeout(job.timeout, fetcher.fetch(&job.request)) => {
                    r.unwrap_or(Err(CapsuleError::Timeout))
                },
            };
            if let Err(e) = &result {
                log::debug!("fetch {} failed: {e}", job.request.url);
            }
            if events.send(Event::Fetched(job.complete(result))).is_err() {
                log::debug!("event loop gone, dropping fetch result");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pages::{Bookmark, HOME_URL};
    use crate::tab::{MessageKind, Mode};
    use crate::test_utils::{MockFetcher, RecordingOpener};

    fn browser_with(fetcher: MockFetcher, settings: TabSettings) -> (Browser, Arc<MockFetcher>, RecordingOpener) {
        let fetcher = Arc::new(fetcher);
        let opener = RecordingOpener::default();
        let pages = Pages::new(vec![Bookmark::new("gemini://a.example/", "A")], Arc::new(Vec::<Bookmark>::new()));
        let browser = Browser::new(
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Arc::new(opener.clone()),
            Arc::new(pages),
            settings,
            HOME_URL,
        );
        (browser, fetcher, opener)
    }

    fn browser(fetcher: MockFetcher) -> (Browser, Arc<MockFetcher>, RecordingOpener) {
        browser_with(fetcher, TabSettings::default())
    }

    #[tokio::test]
    async fn open_tab_fetches_and_commits() {
        let (mut b, fetcher, _) = browser(MockFetcher::new().gemini(
            "gemini://example.org/",
            "20 text/gemini",
            "# Hi\n",
        ));
        let id = b.open_tab("gemini://example.org/");
        assert!(b.tab(id).unwrap().is_loading());
        b.run_until_idle().await;

        let tab = b.tab(id).unwrap();
        assert_eq!(tab.current_url(), "gemini://example.org/");
        assert_eq!(tab.last_response().unwrap().data(), b"# Hi\n");
        assert_eq!(fetcher.request_urls(), ["gemini://example.org/"]);
        assert_eq!(b.in_flight(), 0);
    }

    #[tokio::test]
    async fn newer_load_wins_when_older_is_slower() {
        let fetcher = MockFetcher::new()
            .gemini_after("gemini://x.example/slow", Duration::from_millis(200), "20 text/gemini", "slow\n")
            .gemini("gemini://x.example/fast", "20 text/gemini", "fast\n");
        let (mut b, _, _) = browser(fetcher);
        let id = b.open_tab(HOME_URL);

        b.update(Event::Load {
            tab: id,
            url: "gemini://x.example/slow".into(),
        });
        b.update(Event::Load {
            tab: id,
            url: "gemini://x.example/fast".into(),
        });
        b.run_until_idle().await;

        let tab = b.tab(id).unwrap();
        assert_eq!(tab.current_url(), "gemini://x.example/fast");
        assert_eq!(tab.mode(), &Mode::Page);
        let urls: Vec<_> = tab.history().entries().iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, [HOME_URL, "gemini://x.example/fast"]);
    }

    #[tokio::test]
    async fn newer_load_wins_when_older_is_faster() {
        let fetcher = MockFetcher::new()
            .gemini("gemini://x.example/first", "20 text/gemini", "first\n")
            .gemini_after("gemini://x.example/second", Duration::from_millis(50), "20 text/gemini", "second\n");
        let (mut b, _, _) = browser(fetcher);
        let id = b.open_tab(HOME_URL);

        b.update(Event::Load {
            tab: id,
            url: "gemini://x.example/first".into(),
        });
        // Let the first fetch finish before it is superseded.
        tokio::time::sleep(Duration::from_millis(20)).await;
        b.update(Event::Load {
            tab: id,
            url: "gemini://x.example/second".into(),
        });
        b.run_until_idle().await;

        let tab = b.tab(id).unwrap();
        assert_eq!(tab.current_url(), "gemini://x.example/second");
        assert_eq!(tab.history().len(), 2);
    }

    #[tokio::test]
    async fn timeout_shows_message() {
        let fetcher = MockFetcher::new().gemini_after(
            "gemini://x.example/",
            Duration::from_secs(5),
            "20 text/gemini",
            "late\n",
        );
        let settings = TabSettings {
            fetch_timeout: Duration::from_millis(50),
            ..TabSettings::default()
        };
        let (mut b, _, _) = browser_with(fetcher, settings);
        let id = b.open_tab("gemini://x.example/");
        b.run_until_idle().await;

        match b.tab(id).unwrap().mode() {
            Mode::Message { text, kind } => {
                assert!(text.contains("timed out"), "{text}");
                assert_eq!(kind, &MessageKind::Plain);
            },
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_error_shows_message() {
        let fetcher = MockFetcher::new().error("gemini://down.example/", || {
            CapsuleError::Dial("connection refused".into())
        });
        let (mut b, _, _) = browser(fetcher);
        let id = b.open_tab("gemini://down.example/");
        b.run_until_idle().await;

        let tab = b.tab(id).unwrap();
        assert!(!tab.is_loading());
        match tab.mode() {
            Mode::Message { text, .. } => assert!(text.contains("connection refused"), "{text}"),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn input_is_handled_while_a_fetch_is_in_flight() {
        let fetcher = MockFetcher::new()
            .gemini_after("gemini://x.example/slow", Duration::from_secs(5), "20 text/gemini", "slow\n")
            .gemini("gemini://x.example/fast", "20 text/gemini", "fast\n");
        let (mut b, fetcher, _) = browser(fetcher);
        let id = b.open_tab("gemini://x.example/slow");

        // Stands in for a line typed while the slow page is loading.
        let typed = tokio::time::sleep(Duration::from_millis(20));
        tokio::pin!(typed);
        let mut typed_done = false;
        let started = tokio::time::Instant::now();
        while b.in_flight() > 0 {
            tokio::select! {
                () = &mut typed, if !typed_done => {
                    typed_done = true;
                    b.update(Event::Load { tab: id, url: "gemini://x.example/fast".into() });
                },
                Some(event) = b.next_event() => b.update(event),
            }
            b.apply_pending();
        }

        assert!(started.elapsed() < Duration::from_secs(2));
        let tab = b.tab(id).unwrap();
        assert_eq!(tab.current_url(), "gemini://x.example/fast");
        assert_eq!(tab.mode(), &Mode::Page);
        assert_eq!(fetcher.request_urls(), ["gemini://x.example/slow", "gemini://x.example/fast"]);
    }

    #[tokio::test]
    async fn redirects_stop_after_limit_without_fetching() {
        let mut fetcher = MockFetcher::new();
        for i in 0..=6 {
            fetcher = fetcher.gemini(
                &format!("gemini://x.example/r{i}"),
                &format!("31 /r{}", i + 1),
                "",
            );
        }
        let (mut b, fetcher, _) = browser(fetcher);
        let id = b.open_tab("gemini://x.example/r0");
        b.run_until_idle().await;

        // r0 plus five followed redirects; r6 is never requested.
        let urls = fetcher.request_urls();
        assert_eq!(urls.len(), 6);
        assert_eq!(urls.last().unwrap(), "gemini://x.example/r5");
        match b.tab(id).unwrap().mode() {
            Mode::Message { text, .. } => assert!(text.contains("Too many redirects")),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn five_redirects_reach_the_page() {
        let mut fetcher = MockFetcher::new();
        for i in 0..5 {
            fetcher = fetcher.gemini(
                &format!("gemini://x.example/r{i}"),
                &format!("31 /r{}", i + 1),
                "",
            );
        }
        let fetcher = fetcher.gemini("gemini://x.example/r5", "20 text/gemini", "done\n");
        let (mut b, _, _) = browser(fetcher);
        let id = b.open_tab("gemini://x.example/r0");
        b.run_until_idle().await;

        let tab = b.tab(id).unwrap();
        assert_eq!(tab.current_url(), "gemini://x.example/r5");
        assert_eq!(tab.history().len(), 1);
    }

    #[tokio::test]
    async fn cert_change_confirmation_repins() {
        let fetcher = MockFetcher::new().route("gemini://x.example/", Duration::ZERO, |req| {
            if req.force_repin {
                Ok(crate::test_utils::gemini_response(
                    req.url.as_str(),
                    "20 text/gemini",
                    "trusted\n",
                ))
            } else {
                Err(CapsuleError::CertChanged {
                    host: "x.example".into(),
                })
            }
        });
        let (mut b, fetcher, _) = browser(fetcher);
        let id = b.open_tab("gemini://x.example/");
        b.run_until_idle().await;
        assert!(matches!(
            b.tab(id).unwrap().mode(),
            Mode::Message {
                kind: MessageKind::ForceCert { .. },
                ..
            }
        ));

        b.update(Event::AnswerMessage { tab: id, yes: true });
        b.run_until_idle().await;

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].force_repin);
        assert!(requests[1].force_repin);
        assert_eq!(b.tab(id).unwrap().last_response().unwrap().data(), b"trusted\n");
    }

    #[tokio::test]
    async fn external_urls_go_to_opener_on_confirmation() {
        let (mut b, fetcher, opener) = browser(MockFetcher::new());
        let id = b.open_tab("https://example.org/");
        b.run_until_idle().await;
        assert!(fetcher.requests().is_empty());

        b.update(Event::AnswerMessage { tab: id, yes: true });
        assert_eq!(*opener.opened.lock().unwrap(), ["https://example.org/"]);
    }

    #[tokio::test]
    async fn input_round_trip() {
        let fetcher = MockFetcher::new()
            .gemini("gemini://x.example/search", "10 Query", "")
            .gemini("gemini://x.example/search?two%20words", "20 text/gemini", "results\n");
        let (mut b, _, _) = browser(fetcher);
        let id = b.open_tab("gemini://x.example/search");
        b.run_until_idle().await;
        assert!(matches!(b.tab(id).unwrap().mode(), Mode::Input { .. }));

        b.update(Event::SubmitInput {
            tab: id,
            value: "two words".into(),
        });
        b.run_until_idle().await;
        assert_eq!(
            b.tab(id).unwrap().current_url(),
            "gemini://x.example/search?two%20words"
        );
    }

    #[tokio::test]
    async fn closing_tab_drops_its_result() {
        let fetcher = MockFetcher::new().gemini_after(
            "gemini://x.example/",
            Duration::from_millis(50),
            "20 text/gemini",
            "x\n",
        );
        let (mut b, _, _) = browser(fetcher);
        let id = b.open_tab("gemini://x.example/");
        b.update(Event::CloseTab(id));
        b.run_until_idle().await;
        assert!(b.tabs().is_empty());
        assert_eq!(b.in_flight(), 0);
    }

    #[tokio::test]
    async fn events_posted_through_sender_are_applied() {
        let (mut b, _, _) = browser(MockFetcher::new());
        b.sender()
            .send(Event::OpenTab {
                url: HOME_URL.into(),
            })
            .unwrap();
        b.run_until_idle().await;
        assert_eq!(b.tabs().len(), 1);
        assert_eq!(b.tabs()[0].current_url(), HOME_URL);
    }

    #[tokio::test]
    async fn corrupt_session_falls_back_to_home_tab() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{definitely not json").unwrap();

        let (mut b, _, _) = browser(MockFetcher::new());
        b.restore_from(&path);
        assert_eq!(b.tabs().len(), 1);
        assert_eq!(b.tabs()[0].current_url(), HOME_URL);
    }

    #[tokio::test]
    async fn session_round_trip_restores_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let fetcher = MockFetcher::new()
            .gemini("gemini://a.example/", "20 text/gemini", "a\n")
            .gemini("gemini://b.example/", "20 text/gemini", "b\n");
        let (mut b, _, _) = browser(fetcher);
        let first = b.open_tab("gemini://a.example/");
        b.open_tab("gemini://b.example/");
        b.run_until_idle().await;
        b.update(Event::Scroll { tab: first, pos: 9 });
        b.update(Event::Load {
            tab: first,
            url: HOME_URL.into(),
        });
        b.save_session(&path).unwrap();

        let fetcher = MockFetcher::new()
            .gemini("gemini://a.example/", "20 text/gemini", "a\n")
            .gemini("gemini://b.example/", "20 text/gemini", "b\n");
        let (mut restored, fetcher, _) = browser(fetcher);
        restored.restore_from(&path);
        restored.run_until_idle().await;

        assert_eq!(restored.tabs().len(), 2);
        let tab = &restored.tabs()[0];
        assert_eq!(tab.current_url(), HOME_URL);
        assert_eq!(tab.history().len(), 2);
        assert_eq!(tab.history().entries()[0].scroll_pos, 9);
        assert_eq!(restored.tabs()[1].current_url(), "gemini://b.example/");
        assert_eq!(restored.tabs()[1].history().len(), 1);
        assert_eq!(fetcher.request_urls(), ["gemini://b.example/"]);
    }

    #[tokio::test]
    async fn empty_session_opens_home() {
        let (mut b, _, _) = browser(MockFetcher::new());
        b.restore(Ok(Vec::new()));
        assert_eq!(b.tabs().len(), 1);
        assert_eq!(b.tabs()[0].current_url(), HOME_URL);
    }
}
