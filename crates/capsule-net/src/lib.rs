//! Networking for capsule: trust-on-first-use certificate store, async
//! Gemini and Gopher clients, and the [`Fetcher`] seam the browser
//! drives them through.

pub mod fetch;
pub mod gemini;
pub mod gopher;
pub mod pinning;
pub mod tls;

pub use fetch::{FetchRequest, Fetcher, NetFetcher};
pub use gemini::GeminiClient;
pub use gopher::{GopherClient, MenuItem, parse_menu};
pub use pinning::{CertStore, Fingerprint, PinOutcome};
pub use tls::ClientIdentity;
