//! Gemini protocol client.
//!
//! One request per connection: TLS handshake with pin verification, the
//! absolute URL plus CRLF, then a `<status><detail> <meta>\r\n` header and,
//! for success responses only, a body that runs until the server closes.

use std::io;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use capsule_types::error::{CapsuleError, Result};
use capsule_types::response::{GeminiResponse, Header, MAX_HEADER_LEN, Response, Status};

use crate::pinning::CertStore;
use crate::tls::{self, ClientIdentity};

/// Default Gemini port.
pub const DEFAULT_PORT: u16 = 1965;

/// Bodies are truncated at 1 MiB.
pub const MAX_BODY_SIZE: u64 = 1024 * 1024;

/// Gemini client sharing one certificate store across all requests.
#[derive(Clone)]
pub struct GeminiClient {
    store: Arc<CertStore>,
    provider: Arc<CryptoProvider>,
    identity: Option<Arc<ClientIdentity>>,
}

impl GeminiClient {
    pub fn new(store: Arc<CertStore>) -> Self {
        Self {
            store,
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            identity: None,
        }
    }

    /// Load the certificate store at `certs_path` and build a client on it.
    pub fn open(certs_path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(CertStore::load(certs_path)?)))
    }

    /// Present `identity` to servers that request a client certificate.
    pub fn with_client_identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    pub fn cert_store(&self) -> &Arc<CertStore> {
        &self.store
    }

    /// Fetch `url`. With `force_repin` the presented key replaces any
    /// existing pin for the host instead of being checked against it.
    pub async fn load_url(&self, url: &Url, force_repin: bool) -> Result<Response> {
        let url = request_url(url);
        let host = url
            .host_str()
            .ok_or_else(|| CapsuleError::Parse(format!("missing host in {url}")))?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let (config, verifier) = tls::client_config(
            &self.provider,
            &self.store,
            &host,
            force_repin,
            self.identity.as_deref(),
        )?;
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| CapsuleError::Tls(format!("invalid server name {host}: {e}")))?;

        log::debug!("gemini: dialing {host}:{port}");
        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| CapsuleError::Dial(format!("{host}:{port}: {e}")))?;

        let mut stream = match TlsConnector::from(config).connect(server_name, tcp).await {
            Ok(stream) => stream,
            Err(e) => {
                return Err(verifier
                    .take_rejection()
                    .unwrap_or_else(|| CapsuleError::Tls(format!("handshake with {host}: {e}"))));
            },
        };
        let outcome = verifier.commit()?;
        log::debug!("gemini: certificate for {host}: {outcome:?}");

        stream
            .write_all(format!("{url}\r\n").as_bytes())
            .await
            .map_err(|e| CapsuleError::Dial(format!("sending request to {host}: {e}")))?;
        stream.flush().await?;

        let response = read_response(stream, url.as_str()).await?;
        log::info!("gemini: {} {}", response_code(&response), url);
        Ok(response)
    }
}

/// Normalize a URL into the form sent on the wire: no fragment, and an
/// empty path becomes `/`.
pub fn request_url(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    if url.path().is_empty() {
        url.set_path("/");
    }
    url
}

/// Read a Gemini header and, for status 2x, the body from `stream`.
pub async fn read_response<R: AsyncRead + Unpin>(stream: R, url: &str) -> Result<Response> {
    let mut reader = BufReader::new(stream);

    let mut line = Vec::with_capacity(64);
    (&mut reader)
        .take(MAX_HEADER_LEN as u64)
        .read_until(b'\n', &mut line)
        .await?;
    let header = Header::parse(&line)?;

    let mut body = Vec::new();
    if header.status == Status::Success {
        read_capped(&mut reader, MAX_BODY_SIZE, &mut body).await?;
    }

    Ok(Response::Gemini(GeminiResponse {
        header,
        url: url.to_string(),
        body,
    }))
}

/// Read until EOF or `cap` bytes.
///
/// Many servers close without a TLS close_notify; the truncation error that
/// produces is treated as a normal end of body.
pub(crate) async fn read_capped<R: AsyncRead + Unpin>(reader: R, cap: u64, out: &mut Vec<u8>) -> Result<()> {
    let mut limited = reader.take(cap);
    let mut chunk = [0u8; 8192];
    loop {
        match limited.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn response_code(response: &Response) -> u8 {
    match response {
        Response::Gemini(r) => r.header.code(),
        Response::Gopher(_) => 0,
    }
}
