//! Foundation types for capsule.
//!
//! Shared by every capsule crate: the Gemini header and response model,
//! Gopher item types, body decoding, and the error taxonomy.

pub mod error;
pub mod response;

pub use error::{CapsuleError, Result};
pub use response::{GeminiResponse, GopherResponse, Header, ItemType, Response, Status};
