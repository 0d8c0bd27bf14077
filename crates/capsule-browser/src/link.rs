//! Link lines in text/gemini documents.
//!
//! A link line is `=>` followed by a URL and an optional label, separated
//! by whitespace. URLs may be relative; they are resolved against the
//! document's own URL when followed.

use url::Url;

use capsule_types::error::{CapsuleError, Result};

/// A link from a text/gemini document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// As written in the document; possibly relative.
    pub url: String,
    /// Display label. Equal to `url` when the line had none.
    pub name: String,
}

impl Link {
    /// Resolve against `base`.
    ///
    /// URLs containing `://` are already absolute and returned unchanged.
    /// Returns an empty string when the link cannot be resolved.
    pub fn full_url(&self, base: &str) -> String {
        if self.url.contains("://") {
            return self.url.clone();
        }
        match Url::parse(base).and_then(|b| b.join(&self.url)) {
            Ok(url) => url.to_string(),
            Err(e) => {
                log::debug!("could not resolve {:?} against {base:?}: {e}", self.url);
                String::new()
            },
        }
    }
}

/// Parse a link line. The two-character `=>` marker is skipped without
/// being checked; callers only pass lines that start with it.
pub fn parse_link(line: &str) -> Result<Link> {
    let rest = line.get(2..).unwrap_or_default().trim();
    if rest.is_empty() {
        return Err(CapsuleError::Parse(format!("incorrect format for link: {line:?}")));
    }

    match rest.find(char::is_whitespace) {
        None => Ok(Link {
            url: rest.to_string(),
            name: rest.to_string(),
        }),
        Some(pos) => Ok(Link {
            url: rest[..pos].to_string(),
            name: rest[pos..].trim().to_string(),
        }),
    }
}

/// All links in a text/gemini document, in order. Lines inside
/// preformatted blocks are not links.
pub fn links_in(body: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut preformatted = false;
    for line in body.lines() {
        if line.starts_with("```") {
            preformatted = !preformatted;
            continue;
        }
        if preformatted || !line.starts_with("=>") {
            continue;
        }
        match parse_link(line) {
            Ok(link) => links.push(link),
            Err(e) => log::debug!("skipping link line: {e}"),
        }
    }
    links
}
