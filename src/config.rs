use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use url::Url;

use crate::auth_cache::cache_key;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Which normalization contract a provider speaks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Gazelle-style tracker JSON API (ajax.php)
    Gazelle,
    /// Spotify "saved albums" paging API
    SpotifySavedAlbums,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gazelle => "gazelle",
            ProviderKind::SpotifySavedAlbums => "spotify_saved_albums",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    // Gazelle
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_key: String,
    #[serde(default)]
    pub pass_key: String,
    #[serde(default)]
    pub search_term: String,
    /// Spend a freeleech token on eligible torrents when building download URLs.
    #[serde(default)]
    pub use_freeleech_token: bool,

    // Spotify
    #[serde(default = "default_spotify_auth_base")]
    pub auth_base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_log_dir() -> PathBuf { "/var/log/catalog-ingest".into() }
fn default_request_timeout() -> u64 { 30 }
fn default_enabled() -> bool { true }
fn default_spotify_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_max_pages() -> usize { crate::pagination::DEFAULT_MAX_PAGES }

impl ProviderConfig {
    /// Minimal config for a provider kind; remaining fields take their defaults.
    pub fn new(name: &str, kind: ProviderKind, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base_url: base_url.to_string(),
            enabled: default_enabled(),
            username: String::new(),
            password: String::new(),
            api_key: None,
            auth_key: String::new(),
            pass_key: String::new(),
            search_term: String::new(),
            use_freeleech_token: false,
            auth_base_url: default_spotify_auth_base(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            max_pages: default_max_pages(),
        }
    }

    /// Key under which this provider's credentials are cached.
    pub fn cache_key(&self) -> String {
        cache_key(&self.base_url)
    }

    /// The base endpoint as a URL that paths can be appended to.
    pub fn base(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.base_url.trim())
            .with_context(|| format!("{}: invalid base_url '{}'", self.name, self.base_url))?;
        if url.cannot_be_a_base() {
            bail!("{}: base_url '{}' cannot carry a path", self.name, self.base_url);
        }
        Ok(url)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            bail!("provider name must not be empty");
        }
        self.base()?;
        if self.max_pages == 0 {
            bail!("{}: max_pages must be at least 1", self.name);
        }
        match self.kind {
            ProviderKind::Gazelle => {
                let has_key = self
                    .api_key
                    .as_deref()
                    .map(|k| !k.trim().is_empty())
                    .unwrap_or(false);
                if !has_key && (self.username.is_empty() || self.password.is_empty()) {
                    bail!("{}: gazelle needs api_key or username and password", self.name);
                }
                if self.auth_key.is_empty() || self.pass_key.is_empty() {
                    bail!("{}: gazelle needs auth_key and pass_key", self.name);
                }
            }
            ProviderKind::SpotifySavedAlbums => {
                Url::parse(&self.auth_base_url)
                    .with_context(|| format!("{}: invalid auth_base_url", self.name))?;
                if self.client_id.is_empty()
                    || self.client_secret.is_empty()
                    || self.refresh_token.is_empty()
                {
                    bail!(
                        "{}: spotify needs client_id, client_secret and refresh_token",
                        self.name
                    );
                }
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for p in &self.providers {
            p.validate()?;
            if !seen.insert(p.name.as_str()) {
                return Err(anyhow!("duplicate provider name '{}'", p.name));
            }
        }
        Ok(())
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}
