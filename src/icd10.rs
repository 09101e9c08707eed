//! NIH Clinical Tables ICD-10-CM terminology client.
//!
//! The search endpoint replies with a positional JSON array:
//! `[total, [code, ...], extra, [[code, title], ...]]` where the code
//! list and the pair list run in parallel. The decoder is strict and
//! fails closed: any shape it does not recognize, any length mismatch,
//! and any transport or status failure all yield an empty candidate
//! list. An indication with no candidates is a normal outcome for the
//! pipeline, not a failure.

use std::time::Duration;

use serde::Deserialize;

use crate::models::Icd10Code;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Positional reply: total count, codes, display-field extra, (code, title) pairs.
#[derive(Debug, Deserialize)]
struct TermSearchReply(
    #[allow(dead_code)] i64,
    Vec<String>,
    #[allow(dead_code)] serde_json::Value,
    Vec<(String, String)>,
);

/// Decode a terminology reply body into candidates. Pure so the shape
/// rules are testable without a server.
fn decode_candidates(body: &str) -> Vec<Icd10Code> {
    let reply: TermSearchReply = match serde_json::from_str(body) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "terminology reply did not decode, treating as no results");
            return Vec::new();
        }
    };

    if reply.1.len() != reply.3.len() {
        tracing::warn!(
            codes = reply.1.len(),
            pairs = reply.3.len(),
            "terminology reply lists are not parallel, treating as no results"
        );
        return Vec::new();
    }

    reply
        .1
        .into_iter()
        .zip(reply.3)
        .map(|(code, (_id, title))| Icd10Code { code, title })
        .collect()
}

pub struct Icd10Client {
    /// Full URL of the search endpoint, query string excluded.
    base_url: String,
    client: reqwest::blocking::Client,
}

impl Icd10Client {
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

    /// Look up ICD-10 candidates for an indication title. Order is the
    /// service's own ranking. Never fails; degraded calls return `[]`.
    pub fn lookup(&self, term: &str) -> Vec<Icd10Code> {
        tracing::debug!(term, "querying ICD-10 candidates");

        let response = match self
            .client
            .get(&self.base_url)
            .query(&[("sf", "name"), ("terms", term)])
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(term, error = %e, "ICD-10 lookup request failed");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::error!(
                term,
                status = response.status().as_u16(),
                "ICD-10 lookup returned non-success status"
            );
            return Vec::new();
        }

        let body = match response.text() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(term, error = %e, "ICD-10 lookup body read failed");
                return Vec::new();
            }
        };

        let candidates = decode_candidates(&body);
        tracing::debug!(term, count = candidates.len(), "ICD-10 candidates found");
        candidates
    }
}
