use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use crate::model::{Page, PageToken};
use crate::retry::{NoRetry, RetryPolicy};
use crate::source::SourceError;

/// Drains a cursor-paged listing into one ordered `Vec`.
///
/// The walk starts without a token and follows `next_page_token` until a page
/// comes back without one. Items keep page order and in-page order. A token
/// that was already used in this walk is a protocol violation, so a looping
/// source fails instead of hanging. Any fetch error ends the walk and drops
/// what was collected so far.
#[derive(Clone)]
pub struct PageWalker {
    retry: Arc<dyn RetryPolicy>,
}

impl Default for PageWalker {
    fn default() -> Self {
        Self {
            retry: Arc::new(NoRetry),
        }
    }
}

impl std::fmt::Debug for PageWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageWalker").finish_non_exhaustive()
    }
}

impl PageWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(policy: impl RetryPolicy + 'static) -> Self {
        Self {
            retry: Arc::new(policy),
        }
    }

    /// Fetch every page. `listing` names the enumeration in logs and errors.
    pub async fn collect<T, F, Fut>(
        &self,
        listing: &str,
        mut fetch: F,
    ) -> Result<Vec<T>, SourceError>
    where
        F: FnMut(Option<PageToken>) -> Fut,
        Fut: Future<Output = Result<Page<T>, SourceError>>,
    {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut token: Option<PageToken> = None;
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(&mut fetch, token.clone()).await?;
            pages += 1;

            let count = page.items.len();
            items.extend(page.items);

            tracing::debug!(
                listing,
                page = pages,
                count,
                total_so_far = items.len(),
                total_results = page.total_results,
                "fetched page"
            );

            let next = match page.next_page_token {
                Some(next) if !next.as_str().is_empty() => next,
                _ => break,
            };

            if let Some(current) = token.take() {
                seen.insert(current);
            }
            if seen.contains(&next) {
                return Err(SourceError::Protocol(format!(
                    "{listing}: page token {next} repeated after {pages} pages"
                )));
            }
            token = Some(next);
        }

        Ok(items)
    }

    async fn fetch_page<T, F, Fut>(
        &self,
        fetch: &mut F,
        token: Option<PageToken>,
    ) -> Result<Page<T>, SourceError>
    where
        F: FnMut(Option<PageToken>) -> Fut,
        Fut: Future<Output = Result<Page<T>, SourceError>>,
    {
        let mut attempt = 0u32;

        loop {
            let error = match fetch(token.clone()).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            attempt += 1;
            let Some(delay) = self.retry.next_delay(attempt, &error) else {
                return Err(error);
            };

            tracing::warn!(attempt, ?delay, error = %error, "page fetch failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Fetch every page of a listing with the default, fail-fast walker.
pub async fn collect_pages<T, F, Fut>(listing: &str, fetch: F) -> Result<Vec<T>, SourceError>
where
    F: FnMut(Option<PageToken>) -> Fut,
    Fut: Future<Output = Result<Page<T>, SourceError>>,
{
    PageWalker::default().collect(listing, fetch).await
}
