//! Gopher protocol client and menu parsing.
//!
//! Gopher URLs carry the item type as the first path character and the
//! selector after it: `gopher://host/0/docs/readme.txt` requests selector
//! `/docs/readme.txt` expecting a text item.

use percent_encoding::percent_decode_str;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use url::Url;

use capsule_types::error::{CapsuleError, Result};
use capsule_types::response::{GopherResponse, ItemType, Response};

use crate::gemini::{MAX_BODY_SIZE, read_capped};

/// Default Gopher port.
pub const DEFAULT_PORT: u16 = 70;

/// Plaintext Gopher client. Stateless; one connection per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct GopherClient;

impl GopherClient {
    pub fn new() -> Self {
        Self
    }

    pub async fn load_url(&self, url: &Url) -> Result<Response> {
        let host = url
            .host_str()
            .ok_or_else(|| CapsuleError::Parse(format!("missing host in {url}")))?;
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let (item_type, mut selector) = split_path(url.path());
        if let Some(query) = url.query() {
            selector.push('\t');
            selector.push_str(&percent_decode_str(query).decode_utf8_lossy());
        }

        log::debug!("gopher: dialing {host}:{port} for {selector:?}");
        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| CapsuleError::Dial(format!("{host}:{port}: {e}")))?;
        stream
            .write_all(format!("{selector}\r\n").as_bytes())
            .await
            .map_err(|e| CapsuleError::Dial(format!("sending selector to {host}: {e}")))?;

        let mut data = Vec::new();
        read_capped(&mut stream, MAX_BODY_SIZE, &mut data).await?;
        log::info!("gopher: {} bytes from {url}", data.len());

        Ok(Response::Gopher(GopherResponse {
            item_type,
            url: url.to_string(),
            data,
        }))
    }
}

/// Split a URL path into item type and selector.
///
/// An empty path or `/` is the server's root menu, requested with an
/// empty selector.
pub fn split_path(path: &str) -> (ItemType, String) {
    let rest = path.strip_prefix('/').unwrap_or(path);
    let mut chars = rest.char_indices();
    match chars.next() {
        None => (ItemType::Directory, String::new()),
        Some((_, c)) => {
            let item_type = if c.is_ascii() {
                ItemType::from_byte(c as u8)
            } else {
                ItemType::Other(b'?')
            };
            let selector = &rest[c.len_utf8()..];
            (item_type, percent_decode_str(selector).decode_utf8_lossy().into_owned())
        },
    }
}

// ---------------------------------------------------------------------------
// Menus
// ---------------------------------------------------------------------------

/// One line of a Gopher menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub item_type: ItemType,
    pub display: String,
    /// Where the item points. `None` for informational lines and errors.
    pub url: Option<String>,
}

/// Parse a Gopher menu (RFC 1436 directory listing).
///
/// Parsing stops at the lone `.` terminator. Malformed lines are kept as
/// informational text so nothing the server sent is lost.
pub fn parse_menu(data: &str) -> Vec<MenuItem> {
    let mut items = Vec::new();
    for line in data.lines() {
        let line = line.trim_end_matches('\r');
        if line == "." {
            break;
        }
        if line.is_empty() {
            continue;
        }
        items.push(parse_menu_line(line));
    }
    items
}

fn parse_menu_line(line: &str) -> MenuItem {
    let item_type = match line.as_bytes()[0] {
        b if b.is_ascii() => ItemType::from_byte(b),
        _ => {
            return MenuItem {
                item_type: ItemType::Info,
                display: line.to_string(),
                url: None,
            };
        },
    };
    let mut fields = line[1..].split('\t');
    let display = fields.next().unwrap_or_default().to_string();
    let selector = fields.next();
    let host = fields.next();
    let port = fields.next().map(str::trim);

    let url = match (item_type, selector, host, port) {
        (ItemType::Info | ItemType::Error, ..) => None,
        (_, Some(selector), ..) if selector.starts_with("URL:") => Some(selector[4..].to_string()),
        (_, Some(selector), Some(host), Some(port)) if !host.is_empty() => {
            let authority = match port {
                "" | "70" => host.to_string(),
                p => format!("{host}:{p}"),
            };
            Some(format!(
                "gopher://{authority}/{}{selector}",
                item_type.as_byte() as char
            ))
        },
        _ => None,
    };

    MenuItem {
        item_type,
        display,
        url,
    }
}
