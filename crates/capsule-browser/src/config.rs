//! Browser configuration, loaded from `config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use capsule_types::error::{CapsuleError, Result};

use crate::pages::{Bookmark, HOME_URL};
use crate::tab::{FETCH_TIMEOUT, MAX_REDIRECTS, REDIRECT_LIMIT_CEILING, TabSettings};

/// User-tunable settings. Every field has a default, so an empty or
/// missing file is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Page opened in new tabs.
    #[serde(default = "default_home_url")]
    pub home_url: String,
    /// Per-fetch deadline in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Redirects followed before giving up.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u8,
    /// Directory holding the certificate store and session file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Certificate store file name, relative to `data_dir`.
    #[serde(default = "default_certs_file")]
    pub certs_file: String,
    /// Session file name, relative to `data_dir`.
    #[serde(default = "default_history_file")]
    pub history_file: String,
    /// PEM client certificate presented to servers that ask for one.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    /// PEM private key for `client_cert`.
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    /// Links listed at the top of the home page.
    #[serde(default = "default_builtin_links")]
    pub builtin_links: Vec<Bookmark>,
}

fn default_home_url() -> String {
    HOME_URL.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    FETCH_TIMEOUT.as_secs()
}

fn default_max_redirects() -> u8 {
    MAX_REDIRECTS
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("capsule")
}

fn default_certs_file() -> String {
    "certs.json".to_string()
}

fn default_history_file() -> String {
    "history.json".to_string()
}

fn default_builtin_links() -> Vec<Bookmark> {
    vec![
        Bookmark::new("gemini://geminiprotocol.net/", "Project Gemini"),
        Bookmark::new("gemini://kennedy.gemi.dev/", "Kennedy - Gemini search"),
        Bookmark::new("gopher://gopher.floodgap.com/", "Floodgap gopher"),
        Bookmark::new(crate::pages::HELP_URL, "Help"),
    ]
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            home_url: default_home_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_redirects: default_max_redirects(),
            data_dir: default_data_dir(),
            certs_file: default_certs_file(),
            history_file: default_history_file(),
            client_cert: None,
            client_key: None,
            builtin_links: default_builtin_links(),
        }
    }
}

impl BrowserConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(s) => Self::from_toml_str(&s)
                .map_err(|e| CapsuleError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capsule")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.fetch_timeout_secs == 0 {
            return Err(CapsuleError::Config("fetch_timeout_secs must be positive".into()));
        }
        if self.max_redirects > REDIRECT_LIMIT_CEILING {
            return Err(CapsuleError::Config(format!(
                "max_redirects must be at most {REDIRECT_LIMIT_CEILING}"
            )));
        }
        if self.client_cert.is_some() != self.client_key.is_some() {
            return Err(CapsuleError::Config(
                "client_cert and client_key must be set together".into(),
            ));
        }
        Ok(())
    }

    pub fn certs_path(&self) -> PathBuf {
        self.data_dir.join(&self.certs_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file)
    }

    /// Client certificate and key paths, when both are configured.
    pub fn client_identity_paths(&self) -> Option<(&Path, &Path)> {
        Some((self.client_cert.as_deref()?, self.client_key.as_deref()?))
    }

    pub fn tab_settings(&self) -> TabSettings {
        TabSettings {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_redirects: self.max_redirects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = BrowserConfig::from_toml_str("").unwrap();
        assert_eq!(config.home_url, "home://");
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.tab_settings(), TabSettings::default());
        assert!(config.certs_path().ends_with("capsule/certs.json"));
        assert!(config.history_path().ends_with("capsule/history.json"));
        assert!(config.client_identity_paths().is_none());
        assert!(!config.builtin_links.is_empty());
    }

    #[test]
    fn fields_override_defaults() {
        let config = BrowserConfig::from_toml_str(
            r#"
            home_url = "gemini://example.org/"
            fetch_timeout_secs = 5
            data_dir = "/tmp/capsule-test"
            client_cert = "me.crt"
            client_key = "me.key"

            [[builtin_links]]
            url = "gemini://a.example/"
            name = "A"
            "#,
        )
        .unwrap();
        assert_eq!(config.home_url, "gemini://example.org/");
        assert_eq!(config.tab_settings().fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.certs_path(), PathBuf::from("/tmp/capsule-test/certs.json"));
        assert_eq!(config.builtin_links, vec![Bookmark::new("gemini://a.example/", "A")]);
        let (cert, key) = config.client_identity_paths().unwrap();
        assert_eq!(cert, Path::new("me.crt"));
        assert_eq!(key, Path::new("me.key"));
    }

    #[test]
    fn invalid_toml_is_error() {
        assert!(matches!(
            BrowserConfig::from_toml_str("home_url = ["),
            Err(CapsuleError::TomlParse(_))
        ));
    }

    #[test]
    fn half_configured_identity_is_rejected() {
        assert!(matches!(
            BrowserConfig::from_toml_str("client_cert = \"me.crt\""),
            Err(CapsuleError::Config(_))
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(BrowserConfig::from_toml_str("fetch_timeout_secs = 0").is_err());
    }

    #[test]
    fn redirect_limit_is_bounded() {
        assert_eq!(
            BrowserConfig::from_toml_str("max_redirects = 20")
                .unwrap()
                .tab_settings()
                .max_redirects,
            20
        );
        assert!(matches!(
            BrowserConfig::from_toml_str("max_redirects = 255"),
            Err(CapsuleError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrowserConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.home_url, "home://");
    }

    #[test]
    fn load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_redirects = \"many\"").unwrap();
        let err = BrowserConfig::load(&path).unwrap_err();
        assert!(format!("{err}").contains("config.toml"));
    }
}
