//! The label-to-indication resolution pipeline.
//!
//! One `process_label` run chains: brand name → SPL set id → raw SPL
//! XML → indication drafts → (per draft) ICD-10 candidates → resolved
//! code and provenance → persisted rows → aggregated response. Drafts
//! are resolved and staged strictly in document order, one external
//! call at a time, and the whole batch of indication inserts commits in
//! a single transaction: a persistence failure leaves nothing from the
//! run behind.

use rusqlite::Connection;
use thiserror::Error;

use crate::ai::{suggest_icd10, LlmClient};
use crate::dailymed::{DailyMedClient, DailyMedError};
use crate::db::{self, DatabaseError};
use crate::icd10::Icd10Client;
use crate::models::{Icd10Code, IndicationRecord, ProvenanceSource};
use crate::spl::{self, SplError};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The brand name has no resolvable SPL document. Not retryable
    /// without a different input.
    #[error("no DailyMed entry found for label \"{0}\"")]
    NotFound(String),

    /// The SPL fetch failed after a set id was resolved. Retryable.
    #[error("failed to fetch SPL document for \"{label}\"")]
    Retrieval {
        label: String,
        #[source]
        source: DailyMedError,
    },

    /// The SPL markup could not be parsed at all. Distinct from "no
    /// indications found", which is a success with empty output.
    #[error("failed to parse indications for \"{label}\"")]
    Parse {
        label: String,
        #[source]
        source: SplError,
    },

    /// A write failed; the batch was rolled back, nothing from this run
    /// was committed.
    #[error("failed to persist indications for \"{label}\"")]
    Persist {
        label: String,
        #[source]
        source: DatabaseError,
    },
}

pub struct LabelPipeline<'a> {
    dailymed: &'a DailyMedClient,
    icd10: &'a Icd10Client,
    llm: &'a dyn LlmClient,
}

impl<'a> LabelPipeline<'a> {
    pub fn new(
        dailymed: &'a DailyMedClient,
        icd10: &'a Icd10Client,
        llm: &'a dyn LlmClient,
    ) -> Self {
        Self {
            dailymed,
            icd10,
            llm,
        }
    }

    /// Process one drug label end to end, returning the persisted
    /// indications in document order.
    pub fn process_label(
        &self,
        conn: &mut Connection,
        brand_name: &str,
    ) -> Result<Vec<IndicationRecord>, PipelineError> {
        tracing::info!(brand_name, "processing label");

        let set_id = self
            .dailymed
            .resolve_set_id(brand_name)
            .ok_or_else(|| PipelineError::NotFound(brand_name.to_string()))?;

        let xml = self.dailymed.fetch_spl(&set_id).map_err(|e| {
            tracing::error!(brand_name, %set_id, error = %e, "SPL fetch failed");
            PipelineError::Retrieval {
                label: brand_name.to_string(),
                source: e,
            }
        })?;

        let drafts = spl::extract_indications(&xml).map_err(|e| {
            tracing::error!(brand_name, %set_id, error = %e, "SPL parse failed");
            PipelineError::Parse {
                label: brand_name.to_string(),
                source: e,
            }
        })?;

        if drafts.is_empty() {
            tracing::warn!(brand_name, %set_id, "no indications found in SPL document");
        } else {
            tracing::info!(brand_name, %set_id, count = drafts.len(), "parsed indications");
        }

        let program = db::find_or_create_program(conn, brand_name, &set_id)
            .map_err(|e| self.persist_error(brand_name, e))?;

        let tx = conn
            .transaction()
            .map_err(|e| self.persist_error(brand_name, DatabaseError::Sqlite(e)))?;

        let mut records = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            let candidates = self.icd10.lookup(&draft.title);
            let (code, source) = resolve_candidates(self.llm, &draft.title, candidates);

            let id = db::insert_indication(
                &tx,
                program.id,
                &draft.title,
                &draft.description,
                code.as_ref().map(|c| c.code.as_str()),
                code.as_ref().map(|c| c.title.as_str()),
                source,
            )
            .map_err(|e| {
                tracing::error!(brand_name, title = %draft.title, error = %e, "indication insert failed");
                self.persist_error(brand_name, e)
            })?;

            records.push(IndicationRecord {
                id,
                title: draft.title.clone(),
                description: draft.description.clone(),
                icd10_code: code.as_ref().map(|c| c.code.clone()),
                icd10_title: code.map(|c| c.title),
                source,
            });
        }

        tx.commit()
            .map_err(|e| self.persist_error(brand_name, DatabaseError::Sqlite(e)))?;

        tracing::info!(
            brand_name,
            count = records.len(),
            "finished processing label"
        );
        Ok(records)
    }

    fn persist_error(&self, brand_name: &str, source: DatabaseError) -> PipelineError {
        PipelineError::Persist {
            label: brand_name.to_string(),
            source,
        }
    }
}

/// Resolve a candidate list to a code and provenance tag.
///
/// Zero candidates: unmappable. Exactly one: accepted as-is from the
/// dataset. Two or more: the model picks, and a failed or unparsable
/// pick degrades to unmappable rather than failing the run.
fn resolve_candidates(
    llm: &dyn LlmClient,
    term: &str,
    mut candidates: Vec<Icd10Code>,
) -> (Option<Icd10Code>, ProvenanceSource) {
    match candidates.len() {
        0 => (None, ProvenanceSource::Unmappable),
        1 => (Some(candidates.remove(0)), ProvenanceSource::Dataset),
        _ => match suggest_icd10(llm, term, &candidates) {
            Some(code) => (Some(code), ProvenanceSource::Ai),
            None => (None, ProvenanceSource::Unmappable),
        },
    }
}
