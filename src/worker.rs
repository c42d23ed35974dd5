use crate::api::build_provider;
use crate::assemble::assemble;
use crate::auth_cache::AuthCache;
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::http::Transport;
use crate::models::ReleaseInfo;
use crate::pagination::{CancelPolicy, PageWalker, Termination};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Result of walking one provider to completion.
#[derive(Debug)]
pub struct ProviderFetch {
    pub provider: String,
    /// Newest first.
    pub records: Vec<ReleaseInfo>,
    pub pages: usize,
    pub dropped: usize,
    pub termination: Termination,
}

/// Runs the fetch/normalize/assemble pipeline for configured providers.
///
/// One `Ingestor` is built per process; the transport and auth cache it holds
/// are shared by every provider fetch it runs.
pub struct Ingestor {
    transport: Arc<dyn Transport>,
    auth_cache: Arc<AuthCache>,
    cancel: CancellationToken,
    on_cancel: CancelPolicy,
}

impl Ingestor {
    pub fn new(transport: Arc<dyn Transport>, auth_cache: Arc<AuthCache>) -> Self {
        Self {
            transport,
            auth_cache,
            cancel: CancellationToken::new(),
            on_cancel: CancelPolicy::default(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken, policy: CancelPolicy) -> Self {
        self.cancel = token;
        self.on_cancel = policy;
        self
    }

    pub fn auth_cache(&self) -> &Arc<AuthCache> {
        &self.auth_cache
    }

    /// Fetch every page of one provider and return its records newest first.
    pub async fn fetch_provider(&self, config: Arc<ProviderConfig>) -> Result<ProviderFetch> {
        let provider = build_provider(
            config.clone(),
            self.transport.clone(),
            self.auth_cache.clone(),
        )?;
        let outcome = PageWalker::new(provider.proxy.as_ref(), provider.normalizer.as_ref())
            .max_pages(provider.max_pages)
            .cancel_token(self.cancel.clone())
            .on_cancel(self.on_cancel)
            .walk()
            .await?;

        let records = assemble([outcome.records]);
        info!(
            provider = %config.name,
            kind = config.kind.as_str(),
            records = records.len(),
            pages = outcome.pages,
            dropped = outcome.dropped,
            termination = ?outcome.termination,
            "provider fetch finished"
        );
        Ok(ProviderFetch {
            provider: config.name.clone(),
            records,
            pages: outcome.pages,
            dropped: outcome.dropped,
            termination: outcome.termination,
        })
    }

    /// Fetch all enabled providers concurrently. Results come back in config
    /// order, one per enabled provider; a failing provider does not affect
    /// the others.
    pub async fn fetch_all(
        &self,
        configs: &[Arc<ProviderConfig>],
    ) -> Vec<(String, Result<ProviderFetch>)> {
        let fetches = configs
            .iter()
            .filter(|c| c.enabled)
            .map(|c| async move {
                let result = self.fetch_provider(c.clone()).await;
                if let Err(e) = &result {
                    error!(provider = %c.name, error = %e, "provider fetch failed");
                }
                (c.name.clone(), result)
            });
        join_all(fetches).await
    }
}

/// Merge the successful provider fetches into one sequence, newest first.
pub fn aggregate(results: Vec<(String, Result<ProviderFetch>)>) -> Vec<ReleaseInfo> {
    assemble(
        results
            .into_iter()
            .filter_map(|(_, result)| result.ok())
            .map(|fetch| fetch.records),
    )
}
