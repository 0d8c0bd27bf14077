//! Navigation engine for capsule.
//!
//! Ties the protocol clients in `capsule-net` to per-tab state: link
//! resolution, history with scroll positions, the tab state machine
//! (page / input / message), redirect and trust prompts, and the
//! [`Browser`] event loop that runs fetches concurrently while applying
//! their results one at a time. Rendering, bookmark storage and the
//! external URL opener are collaborators behind traits.

pub mod browser;
pub mod config;
pub mod history;
pub mod link;
pub mod opener;
pub mod pages;
pub mod render;
pub mod session;
pub mod tab;

#[cfg(test)]
pub(crate) mod test_utils;

// -----------------------------------------------------------------------
// Public re-exports
// -----------------------------------------------------------------------

pub use browser::{Browser, Event};
pub use config::BrowserConfig;
pub use history::{History, HistoryEntry};
pub use link::{Link, links_in, parse_link};
pub use opener::{ExternalOpener, SystemOpener};
pub use pages::{Bookmark, BookmarkSource, HELP_URL, HOME_URL, Pages};
pub use render::{LinkAnchor, PlainRenderer, Rendered, Renderer};
pub use tab::{Command, InputKind, LoadOptions, MessageKind, Mode, Tab, TabId, TabSettings};
