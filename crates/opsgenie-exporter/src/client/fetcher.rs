//! Authenticated GET + cursor-following pagination against one base URL.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use opsgenie_core::error::{ExporterError, Result};
use opsgenie_core::model::{Page, Single};

/// Shared, stateless HTTP fetcher. Cloning shares the connection pool.
#[derive(Clone)]
pub struct ApiFetcher {
    http: reqwest::Client,
    base: Url,
    max_pages: usize,
}

impl ApiFetcher {
    pub fn new(base_url: &str, api_key: &str, request_timeout: Duration, max_pages: usize) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ExporterError::Config(format!("invalid base url {base_url}: {e}")))?;

        let mut auth = HeaderValue::from_str(&format!("GenieKey {api_key}"))
            .map_err(|_| ExporterError::Config("api key contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ExporterError::Internal(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            base,
            max_pages: max_pages.max(1),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve an endpoint relative to the base URL.
    pub fn endpoint(&self, relative: &str) -> Result<Url> {
        self.base
            .join(relative)
            .map_err(|e| ExporterError::Internal(format!("bad endpoint {relative}: {e}")))
    }

    /// One authenticated GET of `endpoint`, resolved against the base URL.
    pub async fn fetch_page(&self, endpoint: &str) -> Result<Bytes> {
        let url = self.endpoint(endpoint)?;
        self.fetch_url(url).await
    }

    /// One authenticated GET of an absolute URL. Any non-2xx status is an error.
    async fn fetch_url(&self, url: Url) -> Result<Bytes> {
        debug!(endpoint = %url, "GET");
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ExporterError::Status {
                status: status.as_u16(),
                endpoint: url.to_string(),
            });
        }

        resp.bytes().await.map_err(transport_error)
    }

    /// Fetch every page starting at `start`, decoding each with `decode` and
    /// following `paging.next` until a page has no cursor.
    ///
    /// Items are returned in cursor order. Any failure discards the pages
    /// already fetched.
    pub async fn fetch_all<T, F>(&self, start: &str, decode: F) -> Result<Vec<T>>
    where
        F: Fn(&[u8]) -> serde_json::Result<Page<T>>,
    {
        let mut items = Vec::new();
        let mut url = self.endpoint(start)?;
        let mut body = self.fetch_page(start).await?;
        let mut pages = 1usize;

        loop {
            let page = decode(&body[..]).map_err(|e| ExporterError::decode(url.as_str(), e))?;
            let next = page
                .next_cursor()
                .map(|cursor| resolve_cursor(&self.base, cursor))
                .transpose()?;
            items.extend(page.data);

            let Some(next) = next else { break };
            if pages == self.max_pages {
                return Err(ExporterError::PageLimit {
                    endpoint: start.to_string(),
                    max_pages: self.max_pages,
                });
            }
            pages += 1;
            body = self.fetch_url(next.clone()).await?;
            url = next;
        }

        debug!(endpoint = start, pages, items = items.len(), "pagination complete");
        Ok(items)
    }

    /// `fetch_all` with the standard JSON page decoder.
    pub async fn fetch_all_json<T: DeserializeOwned>(&self, start: &str) -> Result<Vec<T>> {
        self.fetch_all(start, |body| serde_json::from_slice::<Page<T>>(body)).await
    }

    /// Fetch a singular `{ "data": ... }` resource at `endpoint`.
    pub async fn fetch_single<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let body = self.fetch_page(endpoint).await?;
        let single: Single<T> =
            serde_json::from_slice(&body).map_err(|e| ExporterError::decode(endpoint, e))?;
        Ok(single.data)
    }
}

/// Resolve a next-page cursor against the base URL.
///
/// The API hands out absolute URLs; anything that does not land under the
/// base URL is rejected instead of being requested.
pub fn resolve_cursor(base: &Url, cursor: &str) -> Result<Url> {
    let url = base
        .join(cursor)
        .map_err(|e| ExporterError::Cursor(format!("{cursor}: {e}")))?;
    if !url.as_str().starts_with(base.as_str()) {
        return Err(ExporterError::Cursor(cursor.to_string()));
    }
    Ok(url)
}

fn transport_error(e: reqwest::Error) -> ExporterError {
    if e.is_timeout() {
        ExporterError::Transport(format!("request timed out: {e}"))
    } else {
        ExporterError::Transport(e.to_string())
    }
}
