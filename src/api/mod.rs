pub mod gazelle;
pub mod mock;
pub mod proxy;
pub mod spotify;

use crate::auth_cache::{AuthCache, Credentials};
use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{IngestError, Result};
use crate::http::{HttpRequest, ResponseEnvelope, Transport};
use crate::models::ReleaseInfo;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Opaque continuation token taken from a page; its meaning belongs to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Cursor(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page after normalization.
#[derive(Debug, Default)]
pub struct NormalizedPage {
    pub records: Vec<ReleaseInfo>,
    pub next: Option<Cursor>,
    /// Raw entries skipped as null, malformed or missing their names.
    pub dropped: usize,
}

/// Provider client: executes one page request.
///
/// `Ok(None)` is a well-formed page with nothing in it and ends pagination.
/// `Err` is reserved for transport and authentication failures.
#[async_trait]
pub trait Proxy: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Option<Value>>;
}

/// Turns one raw page into records. Pure: no I/O, no shared state.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, page: Option<&Value>) -> NormalizedPage;
}

/// Builds the requests a provider needs. Implementations hold the provider
/// config; `HttpProxy` drives them.
pub trait RequestGenerator: Send + Sync {
    /// Credentials known up front (e.g. an API key). When present no login
    /// exchange takes place.
    fn preset_credentials(&self) -> Option<Credentials> {
        None
    }

    /// Request that establishes a session.
    fn login_request(&self) -> Result<HttpRequest>;

    /// Extract credentials from the login response; anything unusable is an
    /// `IngestError::UnexpectedResponse`.
    fn credentials_from_login(&self, response: ResponseEnvelope) -> Result<Credentials>;

    /// Request for the page identified by `cursor` (first page when None),
    /// without credentials attached.
    fn page_request(&self, cursor: Option<&Cursor>) -> HttpRequest;
}

/// A configured provider: the client that fetches pages and the normalizer
/// that understands them.
pub struct Provider {
    pub proxy: Box<dyn Proxy>,
    pub normalizer: Box<dyn Normalizer>,
    pub max_pages: usize,
}

/// Select the implementation for a provider config.
pub fn build_provider(
    config: Arc<ProviderConfig>,
    transport: Arc<dyn Transport>,
    auth_cache: Arc<AuthCache>,
) -> Result<Provider> {
    let base = config
        .base()
        .map_err(|e| IngestError::config(&config.name, format!("{:#}", e)))?;
    let max_pages = config.max_pages.max(1);
    let (proxy, normalizer): (Box<dyn Proxy>, Box<dyn Normalizer>) = match config.kind {
        ProviderKind::Gazelle => (
            Box::new(proxy::HttpProxy::new(
                config.clone(),
                gazelle::GazelleRequests::new(config.clone(), base.clone()),
                transport,
                auth_cache,
            )),
            Box::new(gazelle::GazelleParser::new(config.clone(), base)),
        ),
        ProviderKind::SpotifySavedAlbums => (
            Box::new(proxy::HttpProxy::new(
                config.clone(),
                spotify::SpotifySavedAlbumsRequests::new(config.clone(), base),
                transport,
                auth_cache,
            )),
            Box::new(spotify::SpotifySavedAlbumsParser::new(config.clone())),
        ),
    };
    Ok(Provider {
        proxy,
        normalizer,
        max_pages,
    })
}
