//! Trust-on-first-use certificate store.
//!
//! A host's public key is pinned the first time we see it and every later
//! handshake must present the same key. The store is shared by every tab,
//! so all access goes through one mutex around check-pin-persist.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use capsule_types::error::{CapsuleError, Result};

/// The pinned identity of a server: base64 of its SubjectPublicKeyInfo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the public key of a DER-encoded X.509 certificate.
    pub fn from_certificate(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| CapsuleError::Tls(format!("could not parse certificate: {e}")))?;
        Ok(Self::from_public_key(cert.public_key().raw))
    }

    /// Fingerprint a DER-encoded SubjectPublicKeyInfo.
    pub fn from_public_key(spki_der: &[u8]) -> Self {
        Self(STANDARD.encode(spki_der))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of a successful [`CertStore::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// The presented key matches the existing pin.
    Matched,
    /// The key was pinned (first use or forced re-pin). `persisted` is
    /// false when writing the store to disk failed; the pin still holds
    /// for the lifetime of the process.
    Pinned { persisted: bool },
}

/// On-disk layout: `{"Certificates": {"host": "<base64 spki>"}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PinFile {
    #[serde(rename = "Certificates", default)]
    certificates: BTreeMap<String, String>,
}

/// Per-host public key pins, persisted as JSON after every change.
#[derive(Debug)]
pub struct CertStore {
    save_path: PathBuf,
    pins: Mutex<BTreeMap<String, String>>,
}

impl CertStore {
    /// An empty store that will persist to `save_path`.
    pub fn new(save_path: impl Into<PathBuf>) -> Self {
        Self {
            save_path: save_path.into(),
            pins: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load the store from `save_path`. A missing file is an empty store.
    pub fn load(save_path: impl Into<PathBuf>) -> Result<Self> {
        let save_path = save_path.into();
        let bytes = match std::fs::read(&save_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no certificate store at {}", save_path.display());
                return Ok(Self::new(save_path));
            },
            Err(e) => return Err(e.into()),
        };
        let file: PinFile = serde_json::from_slice(&bytes)?;
        log::info!(
            "Loaded {} certificate pins from {}",
            file.certificates.len(),
            save_path.display()
        );
        Ok(Self {
            save_path,
            pins: Mutex::new(file.certificates),
        })
    }

    /// Check `fingerprint` against the pin for `host` without recording
    /// anything. Fails with [`CapsuleError::CertChanged`] exactly when
    /// [`CertStore::check`] would.
    pub fn verify(&self, host: &str, fingerprint: &Fingerprint, force_repin: bool) -> Result<()> {
        let pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        match pins.get(host) {
            Some(pinned) if !force_repin && pinned != fingerprint.as_str() => {
                log::warn!("Certificate for {host} does not match its pin");
                Err(CapsuleError::CertChanged {
                    host: host.to_string(),
                })
            },
            _ => Ok(()),
        }
    }

    /// Check `fingerprint` against the pin for `host`.
    ///
    /// Pins on first use or when `force_repin` is set. A mismatch fails
    /// with [`CapsuleError::CertChanged`].
    pub fn check(&self, host: &str, fingerprint: &Fingerprint, force_repin: bool) -> Result<PinOutcome> {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(pinned) = pins.get(host)
            && !force_repin
        {
            if pinned == fingerprint.as_str() {
                return Ok(PinOutcome::Matched);
            }
            log::warn!("Certificate for {host} does not match its pin");
            return Err(CapsuleError::CertChanged {
                host: host.to_string(),
            });
        }

        pins.insert(host.to_string(), fingerprint.as_str().to_string());
        log::info!("Pinned certificate for {host}");
        let persisted = match self.save(&pins) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not persist certificate pin for {host}: {e}");
                false
            },
        };
        Ok(PinOutcome::Pinned { persisted })
    }

    /// The current pin for `host`, if any.
    pub fn pin_for(&self, host: &str) -> Option<Fingerprint> {
        let pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        pins.get(host).cloned().map(Fingerprint)
    }

    pub fn len(&self) -> usize {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    fn save(&self, pins: &BTreeMap<String, String>) -> Result<()> {
        #[derive(Serialize)]
        struct PinFileRef<'a> {
            #[serde(rename = "Certificates")]
            certificates: &'a BTreeMap<String, String>,
        }

        let json = serde_json::to_vec_pretty(&PinFileRef { certificates: pins })?;
        std::fs::write(&self.save_path, json)?;
        Ok(())
    }
}
