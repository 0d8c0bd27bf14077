//! Protocol responses: the Gemini status header and the closed set of
//! response kinds the navigation engine consumes.

use crate::error::{CapsuleError, Result};

/// Maximum length of the header meta field in bytes.
pub const MAX_META_LEN: usize = 1024;

/// Longest header line a server may send: two status digits, a space,
/// the meta field, and CRLF.
pub const MAX_HEADER_LEN: usize = MAX_META_LEN + 5;

/// Media type assumed when a success header carries an empty meta.
pub const DEFAULT_MEDIA_TYPE: &str = "text/gemini";

// -----------------------------------------------------------------------
// Status
// -----------------------------------------------------------------------

/// Coarse outcome class, taken from the first digit of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 1x: the server wants a line of user input.
    Input,
    /// 2x: success, a body follows.
    Success,
    /// 3x: redirect, meta holds the new URL.
    Redirect,
    /// 4x: temporary failure.
    TemporaryFailure,
    /// 5x: permanent failure.
    PermanentFailure,
    /// 6x: a client certificate is required.
    ClientCertRequired,
}

impl Status {
    /// Classify the leading status digit (`1`..=`6`).
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            1 => Some(Status::Input),
            2 => Some(Status::Success),
            3 => Some(Status::Redirect),
            4 => Some(Status::TemporaryFailure),
            5 => Some(Status::PermanentFailure),
            6 => Some(Status::ClientCertRequired),
            _ => None,
        }
    }

    /// The numeric class (`1`..=`6`).
    pub fn code(self) -> u8 {
        match self {
            Status::Input => 1,
            Status::Success => 2,
            Status::Redirect => 3,
            Status::TemporaryFailure => 4,
            Status::PermanentFailure => 5,
            Status::ClientCertRequired => 6,
        }
    }
}

// -----------------------------------------------------------------------
// Header
// -----------------------------------------------------------------------

/// A parsed Gemini response header: `<status><detail> <meta>\r\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub status: Status,
    /// Second status digit, refining the class (e.g. 51 = not found).
    pub status_detail: u8,
    /// MIME type on success, redirect target, prompt or error text.
    pub meta: String,
}

impl Header {
    /// Parse one raw header line, including its line terminator.
    ///
    /// A missing terminator, a line shorter than two bytes, a status byte
    /// outside `1`..=`6`, a non-digit detail byte, anything but a space
    /// between the status and the meta, non-UTF-8 meta, or a meta longer
    /// than [`MAX_META_LEN`] is a parse error.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let Some(line) = line.strip_suffix(b"\n") else {
            return Err(CapsuleError::Parse(
                "header is missing its line terminator".to_string(),
            ));
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() < 2 {
            return Err(CapsuleError::Parse("header too short".to_string()));
        }

        let status = line[0]
            .checked_sub(b'0')
            .and_then(Status::from_digit)
            .ok_or_else(|| CapsuleError::Parse(format!("malformed status byte {:#04x}", line[0])))?;
        if !line[1].is_ascii_digit() {
            return Err(CapsuleError::Parse(format!(
                "malformed status detail byte {:#04x}",
                line[1]
            )));
        }
        let status_detail = line[1] - b'0';

        let rest = match &line[2..] {
            [] => &line[2..],
            [b' ', meta @ ..] => meta,
            [other, ..] => {
                return Err(CapsuleError::Parse(format!(
                    "expected a space after the status, found {other:#04x}"
                )));
            },
        };
        let meta = std::str::from_utf8(rest)
            .map_err(|e| CapsuleError::Parse(format!("meta is not UTF-8: {e}")))?
            .trim();
        if meta.len() > MAX_META_LEN {
            return Err(CapsuleError::Parse("meta too long".to_string()));
        }

        Ok(Header {
            status,
            status_detail,
            meta: meta.to_string(),
        })
    }

    /// Two-digit status code, e.g. `51`.
    pub fn code(&self) -> u8 {
        self.status.code() * 10 + self.status_detail
    }

    /// The media type part of a success meta, without parameters.
    pub fn media_type(&self) -> &str {
        let mime = self.meta.split(';').next().unwrap_or("").trim();
        if mime.is_empty() { DEFAULT_MEDIA_TYPE } else { mime }
    }

    /// The declared `charset` parameter, lowercased.
    pub fn charset(&self) -> Option<String> {
        self.meta.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
        })
    }
}

// -----------------------------------------------------------------------
// Gopher item types
// -----------------------------------------------------------------------

/// Gopher item type, selected by the first character of a URL path or a
/// menu line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Text,
    Directory,
    Error,
    Search,
    Binary,
    Gif,
    Image,
    Html,
    Info,
    Other(u8),
}

impl ItemType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            b'0' => ItemType::Text,
            b'1' => ItemType::Directory,
            b'3' => ItemType::Error,
            b'7' => ItemType::Search,
            b'9' => ItemType::Binary,
            b'g' => ItemType::Gif,
            b'I' => ItemType::Image,
            b'h' => ItemType::Html,
            b'i' => ItemType::Info,
            other => ItemType::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            ItemType::Text => b'0',
            ItemType::Directory => b'1',
            ItemType::Error => b'3',
            ItemType::Search => b'7',
            ItemType::Binary => b'9',
            ItemType::Gif => b'g',
            ItemType::Image => b'I',
            ItemType::Html => b'h',
            ItemType::Info => b'i',
            ItemType::Other(b) => b,
        }
    }

    /// Media type a renderer should assume for this item.
    pub fn media_type(self) -> &'static str {
        match self {
            ItemType::Directory | ItemType::Search => "text/gopher-menu",
            ItemType::Html => "text/html",
            ItemType::Gif => "image/gif",
            ItemType::Image => "image/jpeg",
            ItemType::Binary => "application/octet-stream",
            _ => "text/plain",
        }
    }
}

// -----------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------

/// A completed Gemini exchange. The body is only populated for
/// [`Status::Success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiResponse {
    pub header: Header,
    pub url: String,
    pub body: Vec<u8>,
}

/// A completed Gopher exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GopherResponse {
    pub item_type: ItemType,
    pub url: String,
    pub data: Vec<u8>,
}

/// Everything a fetch can produce. The protocol set is fixed, so this is
/// a closed enum rather than a trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Gemini(GeminiResponse),
    Gopher(GopherResponse),
}

impl Response {
    /// Build a locally synthesized `20 text/gemini` page.
    pub fn synthetic(url: &str, body: String) -> Self {
        Response::Gemini(GeminiResponse {
            header: Header {
                status: Status::Success,
                status_detail: 0,
                meta: DEFAULT_MEDIA_TYPE.to_string(),
            },
            url: url.to_string(),
            body: body.into_bytes(),
        })
    }

    pub fn url(&self) -> &str {
        match self {
            Response::Gemini(r) => &r.url,
            Response::Gopher(r) => &r.url,
        }
    }

    /// Raw body bytes, exactly as received.
    pub fn data(&self) -> &[u8] {
        match self {
            Response::Gemini(r) => &r.body,
            Response::Gopher(r) => &r.data,
        }
    }

    pub fn media_type(&self) -> &str {
        match self {
            Response::Gemini(r) => r.header.media_type(),
            Response::Gopher(r) => r.item_type.media_type(),
        }
    }

    /// Decode the body as text using the declared charset, if any.
    pub fn text(&self) -> Result<String> {
        match self {
            Response::Gemini(r) => decode_text(&r.body, r.header.charset().as_deref()),
            Response::Gopher(r) => decode_text(&r.data, None),
        }
    }
}

/// Decode `bytes` for a declared charset.
///
/// Only charsets that need no tables are handled here; anything else is
/// reported so the caller can pass the raw bytes to a real decoder.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> Result<String> {
    match charset {
        None | Some("utf-8" | "utf8" | "us-ascii" | "ascii") => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        },
        Some("iso-8859-1" | "latin1" | "latin-1") => Ok(bytes.iter().map(|&b| b as char).collect()),
        Some(other) => Err(CapsuleError::Parse(format!("unsupported charset: {other}"))),
    }
}
