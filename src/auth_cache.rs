use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Session material for one provider: a cookie jar and/or an
/// `Authorization` header value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub cookies: BTreeMap<String, String>,
    pub authorization: Option<String>,
}

impl Credentials {
    pub fn from_cookies(cookies: BTreeMap<String, String>) -> Self {
        Self {
            cookies,
            authorization: None,
        }
    }

    pub fn authorization(value: impl Into<String>) -> Self {
        Self {
            cookies: BTreeMap::new(),
            authorization: Some(value.into()),
        }
    }

    pub fn bearer(token: &str) -> Self {
        Self::authorization(format!("Bearer {}", token))
    }

    /// `Cookie` header value, or None when the jar is empty.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Normalized cache key for a provider base endpoint.
pub fn cache_key(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Per-provider credential cache shared by every proxy in the process.
///
/// Entries never expire on their own: a proxy removes its entry as soon as the
/// provider answers with an unexpected status or content type, and the next
/// fetch authenticates again. Two fetches racing on the same provider may both
/// invalidate or both re-authenticate; the last `put` wins.
#[derive(Debug, Default)]
pub struct AuthCache {
    entries: DashMap<String, Credentials>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, base_url: &str) -> Option<Credentials> {
        self.entries
            .get(&cache_key(base_url))
            .map(|entry| entry.value().clone())
    }

    pub fn put(&self, base_url: &str, credentials: Credentials) {
        let key = cache_key(base_url);
        debug!(provider = %key, "caching credentials");
        self.entries.insert(key, credentials);
    }

    /// Drop the entry for a provider. Returns whether one was present.
    pub fn remove(&self, base_url: &str) -> bool {
        self.entries.remove(&cache_key(base_url)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
