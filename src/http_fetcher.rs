//! HTTP client boundary (§6 "HTTP client").
//!
//! A narrow trait over "fetch a URL, get back a status and body", so C9
//! never depends on `reqwest` directly — matching the `HtmlExtractor`/
//! `KvStore`/`DurableQueue` external-collaborator pattern used throughout
//! this core.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Response contract to C9: `(status, body)` (§6).
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Bytes,
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// `reqwest`-backed default [`HttpFetcher`]: per-request timeout,
/// redirects followed (§4.9 step 2).
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(Error::Http)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let response = self.client.get(url).send().await.map_err(Error::Http)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Error::Http)?;
        Ok(FetchResponse { status, body })
    }
}

/// In-memory [`HttpFetcher`] used by C9's unit tests: a canned sequence of
/// responses keyed by URL, so pagination/stop-detection logic is testable
/// without a network.
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub enum Canned {
        Ok(u16, &'static str),
        Err,
    }

    #[derive(Default)]
    pub struct FakeFetcher {
        pub responses: Mutex<HashMap<String, Vec<Canned>>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue(&self, url: &str, response: Canned) {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push(response);
        }
    }

    #[async_trait]
    impl HttpFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            let mut responses = self.responses.lock().unwrap();
            let queue = responses
                .get_mut(url)
                .ok_or_else(|| Error::Validation(format!("no canned response for {url}")))?;
            if queue.is_empty() {
                return Err(Error::Validation(format!(
                    "canned responses exhausted for {url}"
                )));
            }
            match queue.remove(0) {
                Canned::Ok(status, body) => Ok(FetchResponse {
                    status,
                    body: Bytes::from_static(body.as_bytes()),
                }),
                Canned::Err => Err(Error::Validation(format!("network error for {url}"))),
            }
        }
    }
}
