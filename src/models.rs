//! Domain types shared across the pipeline and the persistence layer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// How an indication's diagnosis code was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    /// Single unambiguous terminology match.
    Dataset,
    /// Disambiguated among multiple candidates by the AI coder.
    Ai,
    /// Set by a human through the editing surface, never by the pipeline.
    Manual,
    /// No confident code could be determined.
    Unmappable,
}

impl ProvenanceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Ai => "ai",
            Self::Manual => "manual",
            Self::Unmappable => "unmappable",
        }
    }

    /// Parse a stored column value. Returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dataset" => Some(Self::Dataset),
            "ai" => Some(Self::Ai),
            "manual" => Some(Self::Manual),
            "unmappable" => Some(Self::Unmappable),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProvenanceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog grouping of a drug brand name with its resolved SPL set id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub id: i64,
    pub drug_name: String,
    /// DailyMed SPL set id — the external document identifier.
    pub set_id: String,
    pub created_at: NaiveDateTime,
}

/// A persisted clinical indication belonging to one program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indication {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub icd10_code: Option<String>,
    pub icd10_title: Option<String>,
    pub source: ProvenanceSource,
    pub created_at: NaiveDateTime,
    pub program_id: i64,
}

/// One indication draft extracted from the SPL document. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIndication {
    pub title: String,
    pub description: String,
}

/// One ICD-10 candidate returned by the terminology service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icd10Code {
    pub code: String,
    pub title: String,
}

/// Pipeline output for one resolved indication, in persisted form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicationRecord {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub icd10_code: Option<String>,
    pub icd10_title: Option<String>,
    pub source: ProvenanceSource,
}
