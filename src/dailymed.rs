//! DailyMed label registry client.
//!
//! Two operations: resolve a brand name to an SPL set id, and fetch the
//! raw SPL XML for a set id. Resolution deliberately absorbs transport
//! failures into "not found" — downstream consumers cannot tell a
//! registry outage from a genuinely unknown brand, and that is the
//! documented contract. Fetch failures, by contrast, propagate.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum DailyMedError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("DailyMed returned status {0}")]
    Status(u16),
}

/// Reply shape of `GET {base}/spls.json?title=...`. Anything that does
/// not decode to this is treated as no results.
#[derive(Debug, Deserialize)]
struct SplSearchReply {
    #[serde(default)]
    data: Vec<SplSearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SplSearchEntry {
    setid: String,
}

pub struct DailyMedClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl DailyMedClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Resolve a brand name to an SPL set id via title search.
    ///
    /// Returns the first match when one or more exist, `None` when the
    /// registry has no entry, and also `None` on any transport, status,
    /// or decode failure (logged, not propagated).
    pub fn resolve_set_id(&self, brand_name: &str) -> Option<String> {
        let url = format!("{}/spls.json", self.base_url);
        tracing::debug!(brand_name, "resolving SPL set id");

        let response = match self
            .client
            .get(&url)
            .query(&[("title", brand_name)])
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(brand_name, error = %e, "SPL search request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::error!(
                brand_name,
                status = response.status().as_u16(),
                "SPL search returned non-success status"
            );
            return None;
        }

        let reply: SplSearchReply = match response.json() {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(brand_name, error = %e, "SPL search reply did not decode");
                return None;
            }
        };

        match reply.data.into_iter().next() {
            Some(entry) => {
                tracing::debug!(brand_name, set_id = %entry.setid, "resolved SPL set id");
                Some(entry.setid)
            }
            None => {
                tracing::warn!(brand_name, "no SPL entry found");
                None
            }
        }
    }

    /// Fetch the raw SPL XML for a set id. Failures propagate; the
    /// pipeline classifies them as retrieval errors.
    pub fn fetch_spl(&self, set_id: &str) -> Result<String, DailyMedError> {
        let url = format!("{}/spls/{}.xml", self.base_url, set_id);
        tracing::debug!(set_id, "fetching SPL document");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DailyMedError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DailyMedError::Status(status.as_u16()));
        }

        response
            .text()
            .map_err(|e| DailyMedError::Http(e.to_string()))
    }
}
