use capsule_browser::{Event, Mode};

use crate::app_state::{AppState, PAGE_LINES};

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Follow { index: usize, new_tab: bool },
    Go(Option<String>),
    Back,
    Forward,
    Reload,
    Home,
    NewTab(Option<String>),
    SwitchTab(usize),
    CloseTab,
    ScrollDown,
    ScrollUp,
    Download(Option<String>),
    Status,
    Unknown(String),
}

/// What the shell should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn parse_action(line: &str) -> Option<Action> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
        None => (line, None),
    };

    if let Ok(index) = cmd.parse::<usize>() {
        return Some(Action::Follow { index, new_tab: false });
    }
    let action = match (cmd, arg) {
        ("t", Some(n)) => match n.parse() {
            Ok(index) => Action::Follow { index, new_tab: true },
            Err(_) => Action::Unknown(line.to_string()),
        },
        ("g", arg) => Action::Go(arg),
        ("b", None) => Action::Back,
        ("f", None) => Action::Forward,
        ("r", None) => Action::Reload,
        ("H", None) => Action::Home,
        ("n", arg) => Action::NewTab(arg),
        ("tab", Some(n)) => match n.parse() {
            Ok(index) => Action::SwitchTab(index),
            Err(_) => Action::Unknown(line.to_string()),
        },
        ("q", None) => Action::CloseTab,
        ("j", None) => Action::ScrollDown,
        ("k", None) => Action::ScrollUp,
        ("d", arg) => Action::Download(arg),
        ("s", None) => Action::Status,
        _ => Action::Unknown(line.to_string()),
    };
    Some(action)
}

/// Feed one input line to the browser.
///
/// Prompts and questions on the active tab take the line first; anything
/// else is parsed as a command.
pub fn process_line(state: &mut AppState, line: &str) -> Flow {
    let id = state.active;
    let line = line.trim_end_matches(['\r', '\n']);

    match state.active_tab().map(|t| t.mode().clone()) {
        Some(Mode::Input { .. }) => {
            let event = if line.trim() == "." {
                Event::CancelInput(id)
            } else {
                Event::SubmitInput {
                    tab: id,
                    value: line.to_string(),
                }
            };
            state.browser.update(event);
            return Flow::Continue;
        },
        Some(Mode::Message { .. }) => {
            let answer = line.trim();
            state.browser.update(Event::AnswerMessage {
                tab: id,
                yes: answer == "y",
            });
            if matches!(answer, "" | "y" | "n") {
                return Flow::Continue;
            }
        },
        Some(Mode::Page) | None => {},
    }

    match parse_action(line) {
        Some(action) => apply(state, action),
        None => Flow::Continue,
    }
}

pub fn apply(state: &mut AppState, action: Action) -> Flow {
    let id = state.active;
    match action {
        Action::Follow { index, new_tab } => {
            let link = state
                .view()
                .and_then(|v| index.checked_sub(1).and_then(|i| v.links.into_iter().nth(i)));
            match link {
                Some(link) if new_tab => {
                    let tab = state.browser.open_tab(&link.url);
                    state.active = tab;
                },
                Some(link) => state.browser.update(Event::Load { tab: id, url: link.url }),
                None => state.output_lines.push(format!("No link {index}.")),
            }
        },
        Action::Go(Some(url)) => state.browser.update(Event::Load { tab: id, url }),
        Action::Go(None) => state.browser.update(Event::PromptNavigate(id)),
        Action::Back => state.browser.update(Event::Back(id)),
        Action::Forward => state.browser.update(Event::Forward(id)),
        Action::Reload => state.browser.update(Event::Reload(id)),
        Action::Home => {
            let url = state.browser.home_url().to_string();
            state.browser.update(Event::Load { tab: id, url });
        },
        Action::NewTab(url) => {
            let url = url.unwrap_or_else(|| state.browser.home_url().to_string());
            state.active = state.browser.open_tab(&url);
        },
        Action::SwitchTab(index) => {
            match index.checked_sub(1).and_then(|i| state.browser.tabs().get(i)) {
                Some(tab) => state.active = tab.id(),
                None => state.output_lines.push(format!("No tab {index}.")),
            }
        },
        Action::CloseTab => {
            state.browser.update(Event::CloseTab(id));
            state.fix_active();
            if state.browser.tabs().is_empty() {
                return Flow::Quit;
            }
        },
        Action::ScrollDown => scroll(state, true),
        Action::ScrollUp => scroll(state, false),
        Action::Download(path) => {
            state.browser.update(Event::PromptDownload(id));
            if let Some(path) = path {
                state.browser.update(Event::SubmitInput { tab: id, value: path });
            }
        },
        Action::Status => {
            let tabs = state.browser.tabs();
            for (i, tab) in tabs.iter().enumerate() {
                let marker = if tab.id() == id { "*" } else { " " };
                state.output_lines.push(format!(
                    "{marker}{} {} [{}]",
                    i + 1,
                    tab.current_url(),
                    tab.history().status()
                ));
            }
            state
                .output_lines
                .push(format!("{} fetches in flight", state.browser.in_flight()));
        },
        Action::Unknown(line) => {
            state
                .output_lines
                .push(format!("Unknown command: {line} (g help:// for help)"));
        },
    }
    Flow::Continue
}

fn scroll(state: &mut AppState, down: bool) {
    let Some(current) = state.active_tab().map(|t| t.scroll_pos()) else {
        return;
    };
    let lines = state.view().map_or(0, |v| v.content.lines().count());
    let pos = if down {
        (current + PAGE_LINES).min(lines.saturating_sub(1))
    } else {
        current.saturating_sub(PAGE_LINES)
    };
    state.browser.update(Event::Scroll {
        tab: state.active,
        pos,
    });
}
