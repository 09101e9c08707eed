//! Maps drug brand names to ICD-10-coded clinical indications.
//!
//! The pipeline resolves a brand name against the DailyMed label
//! registry, extracts the "Indications and Usage" subsections from the
//! SPL document, matches each indication title against the NIH Clinical
//! Tables ICD-10-CM terminology, disambiguates multi-candidate matches
//! with a chat-completion model, and persists the results with a
//! provenance tag per indication.

pub mod ai;
pub mod config;
pub mod dailymed;
pub mod db;
pub mod icd10;
pub mod models;
pub mod pipeline;
pub mod spl;

pub use config::Config;
pub use models::{Icd10Code, Indication, IndicationRecord, ParsedIndication, Program, ProvenanceSource};
pub use pipeline::{LabelPipeline, PipelineError};
