use super::{Cursor, Proxy, RequestGenerator};
use crate::auth_cache::{AuthCache, Credentials};
use crate::config::ProviderConfig;
use crate::error::{IngestError, Result};
use crate::http::{HttpRequest, ResponseEnvelope, Transport, JSON_CONTENT_TYPE};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

/// HTTP provider client shared by every provider kind. The request generator
/// supplies the provider-specific URLs; this type owns the credential
/// lifecycle and the response checks.
pub struct HttpProxy<G> {
    config: Arc<ProviderConfig>,
    requests: G,
    transport: Arc<dyn Transport>,
    auth_cache: Arc<AuthCache>,
}

impl<G: RequestGenerator> HttpProxy<G> {
    pub fn new(
        config: Arc<ProviderConfig>,
        requests: G,
        transport: Arc<dyn Transport>,
        auth_cache: Arc<AuthCache>,
    ) -> Self {
        Self {
            config,
            requests,
            transport,
            auth_cache,
        }
    }

    async fn send(&self, request: &HttpRequest) -> Result<ResponseEnvelope> {
        self.transport
            .execute(request)
            .await
            .map_err(|e| IngestError::Connection {
                provider: self.config.name.clone(),
                url: request.url.clone(),
                reason: e.to_string(),
            })
    }

    /// Cached credentials, or a fresh set from the generator which is then cached.
    async fn credentials(&self) -> Result<Credentials> {
        if let Some(credentials) = self.auth_cache.get(&self.config.cache_key()) {
            return Ok(credentials);
        }
        let credentials = match self.requests.preset_credentials() {
            Some(credentials) => credentials,
            None => {
                debug!("{}: no cached session, authenticating", self.config.name);
                let login = self.requests.login_request()?;
                let response = self.send(&login).await?;
                self.requests.credentials_from_login(response)?
            }
        };
        self.auth_cache.put(&self.config.cache_key(), credentials.clone());
        Ok(credentials)
    }

    /// Drop the cached session and build the error for the caller.
    fn invalidate(&self, reason: String, response: ResponseEnvelope) -> IngestError {
        let removed = self.auth_cache.remove(&self.config.cache_key());
        warn!(
            "{}: {} (cached session removed: {})",
            self.config.name, reason, removed
        );
        IngestError::unexpected_response(&self.config.name, reason, response)
    }
}

#[async_trait]
impl<G: RequestGenerator> Proxy for HttpProxy<G> {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Option<Value>> {
        let credentials = self.credentials().await?;
        let request = self
            .requests
            .page_request(cursor)
            .with_credentials(&credentials);
        debug!("{}: fetching page (cursor {:?})", self.config.name, cursor.map(Cursor::as_str));
        let response = self.send(&request).await?;

        if response.status != 200 {
            let reason = format!(
                "Unexpected response status {} code from API request",
                response.status
            );
            return Err(self.invalidate(reason, response));
        }
        if !response.is_json() {
            let reason = format!(
                "Unexpected response header {} from API request, expected {}",
                response.content_type().unwrap_or("(none)"),
                JSON_CONTENT_TYPE
            );
            return Err(self.invalidate(reason, response));
        }

        if response.body.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&response.body) {
            Ok(Value::Null) => Ok(None),
            Ok(page) => Ok(Some(page)),
            Err(e) => {
                warn!("{}: discarding unparseable page: {}", self.config.name, e);
                Ok(None)
            }
        }
    }
}
