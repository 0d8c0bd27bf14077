//! TLS client configuration with trust-on-first-use verification.
//!
//! No CA roots are consulted. A server is trusted when its certificate
//! names the host we dialed and its public key matches the pin in the
//! [`CertStore`] (or is pinned now, on first use).

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, SignatureScheme};

use capsule_types::error::{CapsuleError, Result};

use crate::pinning::{CertStore, Fingerprint, PinOutcome};

/// A client certificate chain and its private key, presented to servers
/// that ask for one (Gemini status 6x).
#[derive(Debug)]
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    pub fn new(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { chain, key }
    }

    /// Load a PEM certificate chain and PEM private key.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let chain = CertificateDer::pem_file_iter(cert_path)
            .map_err(|e| CapsuleError::Config(format!("{}: {e}", cert_path.display())))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CapsuleError::Config(format!("{}: {e}", cert_path.display())))?;
        if chain.is_empty() {
            return Err(CapsuleError::Config(format!(
                "{}: no certificates found",
                cert_path.display()
            )));
        }
        let key = PrivateKeyDer::from_pem_file(key_path)
            .map_err(|e| CapsuleError::Config(format!("{}: {e}", key_path.display())))?;
        Ok(Self { chain, key })
    }
}

/// Build a client config for one connection to `host`.
///
/// The returned verifier records why it rejected a certificate; read it
/// with [`TofuVerifier::take_rejection`] after a failed handshake.
pub(crate) fn client_config(
    provider: &Arc<CryptoProvider>,
    store: &Arc<CertStore>,
    host: &str,
    force_repin: bool,
    identity: Option<&ClientIdentity>,
) -> Result<(Arc<ClientConfig>, Arc<TofuVerifier>)> {
    let verifier = Arc::new(TofuVerifier {
        store: Arc::clone(store),
        host: host.to_string(),
        force_repin,
        provider: Arc::clone(provider),
        presented: Mutex::new(None),
        rejection: Mutex::new(None),
    });

    let builder = ClientConfig::builder_with_provider(Arc::clone(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| CapsuleError::Tls(format!("TLS init: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::clone(&verifier) as Arc<dyn ServerCertVerifier>);

    let config = match identity {
        Some(id) => builder
            .with_client_auth_cert(id.chain.clone(), id.key.clone_key())
            .map_err(|e| CapsuleError::Tls(format!("client certificate: {e}")))?,
        None => builder.with_no_client_auth(),
    };

    Ok((Arc::new(config), verifier))
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct TofuVerifier {
    store: Arc<CertStore>,
    host: String,
    force_repin: bool,
    provider: Arc<CryptoProvider>,
    /// Key of the accepted certificate, pinned by [`TofuVerifier::commit`].
    presented: Mutex<Option<Fingerprint>>,
    rejection: Mutex<Option<CapsuleError>>,
}

impl TofuVerifier {
    /// The error behind the last rejected certificate, if any.
    pub(crate) fn take_rejection(&self) -> Option<CapsuleError> {
        self.rejection.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Pin the accepted key. Only call once the handshake has completed,
    /// so the server has proven it holds the private key.
    pub(crate) fn commit(&self) -> Result<PinOutcome> {
        let fingerprint = self
            .presented
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| CapsuleError::Tls(format!("no certificate accepted for {}", self.host)))?;
        self.store.check(&self.host, &fingerprint, self.force_repin)
    }

    fn check(&self, end_entity: &CertificateDer<'_>, server_name: &ServerName<'_>) -> Result<()> {
        verify_hostname(end_entity, server_name)?;
        let fingerprint = Fingerprint::from_certificate(end_entity)?;
        self.store.verify(&self.host, &fingerprint, self.force_repin)?;
        *self.presented.lock().unwrap_or_else(PoisonError::into_inner) = Some(fingerprint);
        Ok(())
    }
}

impl ServerCertVerifier for TofuVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self.check(end_entity, server_name) {
            Ok(()) => {
                log::debug!("certificate for {} accepted", self.host);
                Ok(ServerCertVerified::assertion())
            },
            Err(e) => {
                let reason = match e {
                    CapsuleError::CertChanged { .. } => CertificateError::ApplicationVerificationFailure,
                    _ => CertificateError::NotValidForName,
                };
                *self.rejection.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
                Err(rustls::Error::InvalidCertificate(reason))
            },
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Check that the certificate names `server_name`.
///
/// Subject alternative names are authoritative. Certificates without a
/// matching SAN are still accepted when their Common Name matches, since
/// many self-signed capsule certificates carry only a CN.
fn verify_hostname(end_entity: &CertificateDer<'_>, server_name: &ServerName<'_>) -> Result<()> {
    let parsed = ParsedCertificate::try_from(end_entity)
        .map_err(|e| CapsuleError::Tls(format!("could not parse certificate: {e}")))?;
    match rustls::client::verify_server_name(&parsed, server_name) {
        Ok(()) => Ok(()),
        Err(_) if common_name_matches(end_entity, server_name) => Ok(()),
        Err(e) => Err(CapsuleError::Tls(format!(
            "certificate is not valid for {}: {e}",
            server_name.to_str()
        ))),
    }
}

fn common_name_matches(end_entity: &CertificateDer<'_>, server_name: &ServerName<'_>) -> bool {
    let ServerName::DnsName(dns) = server_name else {
        return false;
    };
    let Ok((_, cert)) = x509_parser::parse_x509_certificate(end_entity) else {
        return false;
    };
    cert.subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .any(|cn| hostname_matches(cn, dns.as_ref()))
}

/// Case-insensitive host match with single-label `*.` wildcards.
fn hostname_matches(pattern: &str, host: &str) -> bool {
    if !pattern.contains('.') {
        return false;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
            None => false,
        };
    }
    pattern.eq_ignore_ascii_case(host)
}
