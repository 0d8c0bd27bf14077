//! The seam between navigation and the network.
//!
//! Tabs never talk to protocol clients directly; they hand a
//! [`FetchRequest`] to a [`Fetcher`]. Production uses [`NetFetcher`],
//! tests substitute a scripted one.

use futures::FutureExt;
use futures::future::BoxFuture;
use url::Url;

use capsule_types::error::{CapsuleError, Result};
use capsule_types::response::Response;

use crate::gemini::GeminiClient;
use crate::gopher::GopherClient;

/// A single network fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    /// Replace the host's pinned key instead of checking against it.
    pub force_repin: bool,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            force_repin: false,
        }
    }
}

/// Something that can turn a URL into a [`Response`].
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<Response>>;
}

/// Dispatches `gemini://` and `gopher://` URLs to the protocol clients.
#[derive(Clone)]
pub struct NetFetcher {
    gemini: GeminiClient,
    gopher: GopherClient,
}

impl NetFetcher {
    pub fn new(gemini: GeminiClient) -> Self {
        Self {
            gemini,
            gopher: GopherClient::new(),
        }
    }

    pub fn gemini(&self) -> &GeminiClient {
        &self.gemini
    }
}

impl Fetcher for NetFetcher {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<Response>> {
        async move {
            match request.url.scheme() {
                "gemini" => self.gemini.load_url(&request.url, request.force_repin).await,
                "gopher" => self.gopher.load_url(&request.url).await,
                other => Err(CapsuleError::UnsupportedScheme(other.to_string())),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pinning::CertStore;

    #[tokio::test]
    async fn other_schemes_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CertStore::new(dir.path().join("certs.json")));
        let fetcher = NetFetcher::new(GeminiClient::new(store));

        let request = FetchRequest::new(Url::parse("https://example.org/").unwrap());
        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, CapsuleError::UnsupportedScheme(ref s) if s == "https"));
    }

    #[test]
    fn fetcher_is_object_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NetFetcher>();
        let _: Option<Arc<dyn Fetcher>> = None;
    }
}
