//! Renderer contract and a plain-text implementation.
//!
//! The engine never interprets page content itself. A front end hands the
//! decoded body of the committed response to a [`Renderer`] and gets back
//! displayable text plus the link anchors it can follow.

use std::fmt::Write;

use capsule_net::gopher::parse_menu;

use crate::link::parse_link;

/// A followable link in rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAnchor {
    /// Line of `content` the anchor sits on.
    pub position: usize,
    /// Absolute URL.
    pub url: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub content: String,
    pub links: Vec<LinkAnchor>,
    pub title: Option<String>,
}

pub trait Renderer: Send + Sync {
    fn render(&self, body: &str, media_type: &str, base_url: &str) -> Rendered;
}

/// Renders text/gemini and Gopher menus as numbered plain text; anything
/// else is passed through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render(&self, body: &str, media_type: &str, base_url: &str) -> Rendered {
        match media_type {
            "text/gemini" => render_gemtext(body, base_url),
            "text/gopher-menu" => render_menu(body),
            _ => Rendered {
                content: body.to_string(),
                ..Rendered::default()
            },
        }
    }
}

fn render_gemtext(body: &str, base_url: &str) -> Rendered {
    let mut out = Rendered::default();
    let mut preformatted = false;

    for (position, line) in body.lines().enumerate() {
        if line.starts_with("```") {
            preformatted = !preformatted;
            out.content.push('\n');
            continue;
        }
        if !preformatted && line.starts_with("=>") {
            if let Ok(link) = parse_link(line) {
                let url = link.full_url(base_url);
                if !url.is_empty() {
                    out.links.push(LinkAnchor {
                        position,
                        url,
                        label: link.name.clone(),
                    });
                    let _ = writeln!(out.content, "[{}] {}", out.links.len(), link.name);
                    continue;
                }
            }
        }
        if !preformatted && out.title.is_none() {
            let heading = line.trim_start_matches('#');
            if heading.len() < line.len() {
                out.title = Some(heading.trim().to_string());
            }
        }
        out.content.push_str(line);
        out.content.push('\n');
    }
    out
}

fn render_menu(body: &str) -> Rendered {
    let mut out = Rendered::default();
    for (position, item) in parse_menu(body).into_iter().enumerate() {
        match item.url {
            Some(url) => {
                out.links.push(LinkAnchor {
                    position,
                    url,
                    label: item.display.clone(),
                });
                let _ = writeln!(out.content, "[{}] {}", out.links.len(), item.display);
            },
            None => {
                out.content.push_str(&item.display);
                out.content.push('\n');
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemtext_links_are_numbered_and_resolved() {
        let body = "# Title\n\nintro\n=> /a First\n=> gemini://other.example/ \n```\n=> not a link\n```\n";
        let out = PlainRenderer.render(body, "text/gemini", "gemini://example.org/dir/");
        assert_eq!(out.title.as_deref(), Some("Title"));
        assert_eq!(out.links.len(), 2);
        assert_eq!(out.links[0], LinkAnchor {
            position: 3,
            url: "gemini://example.org/a".into(),
            label: "First".into(),
        });
        assert_eq!(out.links[1].url, "gemini://other.example/");
        assert!(out.content.contains("[1] First\n"));
        assert!(out.content.contains("=> not a link\n"));

        let lines: Vec<_> = out.content.lines().collect();
        assert_eq!(lines[3], "[1] First");
    }

    #[test]
    fn gopher_menu_links_skip_info_lines() {
        let body = "iWelcome\t\terror.host\t1\r\n1Docs\t/docs\texample.org\t70\r\n.\r\n";
        let out = PlainRenderer.render(body, "text/gopher-menu", "gopher://example.org/");
        assert_eq!(out.content, "Welcome\n[1] Docs\n");
        assert_eq!(out.links.len(), 1);
        assert_eq!(out.links[0].position, 1);
        assert_eq!(out.links[0].url, "gopher://example.org/1/docs");
    }

    #[test]
    fn other_media_passes_through() {
        let out = PlainRenderer.render("=> not parsed\n", "text/plain", "gemini://x/");
        assert_eq!(out.content, "=> not parsed\n");
        assert!(out.links.is_empty());
        assert!(out.title.is_none());
    }
}
