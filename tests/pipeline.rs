//! End-to-end pipeline tests against mock DailyMed, terminology, and
//! completion servers, with an in-memory database.

use httpmock::prelude::*;
use serde_json::json;

use indimap::ai::OpenAiClient;
use indimap::dailymed::DailyMedClient;
use indimap::db;
use indimap::icd10::Icd10Client;
use indimap::{LabelPipeline, PipelineError, ProvenanceSource};

const SET_ID: &str = "11111111-2222-3333-4444-555555555555";

const SAMPLE_SPL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<document xmlns="urn:hl7-org:v3">
  <component>
    <structuredBody>
      <component>
        <section>
          <title>1 INDICATIONS AND USAGE</title>
          <component>
            <section>
              <title>1.1 Asthma</title>
              <text><paragraph>Patient has chronic asthma symptoms.</paragraph></text>
            </section>
          </component>
          <component>
            <section>
              <title>1.2 Hypertension</title>
              <text><paragraph>Blood pressure is consistently high.</paragraph></text>
            </section>
          </component>
        </section>
      </component>
    </structuredBody>
  </component>
</document>"#;

const NO_INDICATIONS_SPL: &str = r#"<document>
  <component>
    <structuredBody>
      <component>
        <section>
          <title>DOSAGE AND ADMINISTRATION</title>
          <text><paragraph>Take twice daily.</paragraph></text>
        </section>
      </component>
    </structuredBody>
  </component>
</document>"#;

struct Harness {
    dailymed: MockServer,
    terminology: MockServer,
    openai: MockServer,
}

impl Harness {
    fn start() -> Self {
        Self {
            dailymed: MockServer::start(),
            terminology: MockServer::start(),
            openai: MockServer::start(),
        }
    }

    fn mock_resolve(&self, brand: &str, set_ids: &[&str]) -> httpmock::Mock<'_> {
        let entries: Vec<_> = set_ids.iter().map(|id| json!({"setid": id})).collect();
        self.dailymed.mock(|when, then| {
            when.method(GET)
                .path("/spls.json")
                .query_param("title", brand);
            then.status(200).json_body(json!({"data": entries}));
        })
    }

    fn mock_spl(&self, set_id: &str, body: &str) -> httpmock::Mock<'_> {
        let body = body.to_string();
        self.dailymed.mock(move |when, then| {
            when.method(GET).path(format!("/spls/{set_id}.xml"));
            then.status(200).body(&body);
        })
    }

    fn mock_codes(&self, term: &str, pairs: &[(&str, &str)]) -> httpmock::Mock<'_> {
        let codes: Vec<_> = pairs.iter().map(|(c, _)| c.to_string()).collect();
        let titled: Vec<_> = pairs
            .iter()
            .map(|(c, t)| json!([c, t]))
            .collect();
        let body = json!([pairs.len(), codes, null, titled]);
        self.terminology.mock(move |when, then| {
            when.method(GET)
                .path("/search")
                .query_param("sf", "name")
                .query_param("terms", term);
            then.status(200).json_body(body.clone());
        })
    }

    fn mock_completion(&self, content: &str) -> httpmock::Mock<'_> {
        let content = content.to_string();
        self.openai.mock(move |when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            }));
        })
    }

    fn run(&self, conn: &mut rusqlite::Connection, brand: &str) -> Result<Vec<indimap::IndicationRecord>, PipelineError> {
        let dailymed = DailyMedClient::new(&self.dailymed.base_url());
        let icd10 = Icd10Client::new(&format!("{}/search", self.terminology.base_url()));
        let openai = OpenAiClient::new(&self.openai.base_url(), "sk-test", "gpt-4o");
        let pipeline = LabelPipeline::new(&dailymed, &icd10, &openai);
        pipeline.process_label(conn, brand)
    }
}

#[test]
fn full_run_resolves_and_persists_in_order() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID]);
    h.mock_spl(SET_ID, SAMPLE_SPL);
    // Two candidates for Asthma → AI pick; one for Hypertension → dataset
    h.mock_codes(
        "Asthma",
        &[("J45", "Asthma"), ("J45.909", "Unspecified asthma")],
    );
    h.mock_codes("Hypertension", &[("I10", "Essential (primary) hypertension")]);
    h.mock_completion(r#"{"code": "J45", "title": "Asthma"}"#);

    let mut conn = db::open_memory_database().unwrap();
    let records = h.run(&mut conn, "Dupixent").unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].title, "Asthma");
    assert_eq!(records[0].description, "Patient has chronic asthma symptoms.");
    assert_eq!(records[0].source, ProvenanceSource::Ai);
    assert_eq!(records[0].icd10_code.as_deref(), Some("J45"));
    assert_eq!(records[0].icd10_title.as_deref(), Some("Asthma"));

    assert_eq!(records[1].title, "Hypertension");
    assert_eq!(records[1].source, ProvenanceSource::Dataset);
    assert_eq!(records[1].icd10_code.as_deref(), Some("I10"));

    // Rows are committed and readable through the catalog surface
    let program = db::get_program_by_set_id(&conn, SET_ID).unwrap().unwrap();
    assert_eq!(program.drug_name, "Dupixent");
    let stored = db::get_indications_for_program(&conn, program.id).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].id, records[0].id);
    assert_eq!(stored[1].title, "Hypertension");
}

#[test]
fn unknown_brand_fails_fast_without_downstream_calls() {
    let h = Harness::start();
    h.mock_resolve("Nosuchdrug", &[]);
    let spl_mock = h.mock_spl(SET_ID, SAMPLE_SPL);

    let mut conn = db::open_memory_database().unwrap();
    let err = h.run(&mut conn, "Nosuchdrug").unwrap_err();

    assert!(matches!(err, PipelineError::NotFound(_)));
    assert_eq!(spl_mock.hits(), 0);

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM programs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn registry_outage_reads_as_not_found() {
    let h = Harness::start();
    h.dailymed.mock(|when, then| {
        when.method(GET).path("/spls.json");
        then.status(500);
    });

    let mut conn = db::open_memory_database().unwrap();
    let err = h.run(&mut conn, "Dupixent").unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[test]
fn fetch_failure_is_a_retrieval_error_with_no_writes() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID]);
    h.dailymed.mock(|when, then| {
        when.method(GET).path(format!("/spls/{SET_ID}.xml"));
        then.status(503);
    });

    let mut conn = db::open_memory_database().unwrap();
    let err = h.run(&mut conn, "Dupixent").unwrap_err();
    assert!(matches!(err, PipelineError::Retrieval { .. }));

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM programs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn malformed_document_is_a_parse_error() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID]);
    h.mock_spl(SET_ID, "<document><component></document>");

    let mut conn = db::open_memory_database().unwrap();
    let err = h.run(&mut conn, "Dupixent").unwrap_err();
    assert!(matches!(err, PipelineError::Parse { .. }));
}

#[test]
fn document_without_indication_section_succeeds_empty() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID]);
    h.mock_spl(SET_ID, NO_INDICATIONS_SPL);

    let mut conn = db::open_memory_database().unwrap();
    let records = h.run(&mut conn, "Dupixent").unwrap();
    assert!(records.is_empty());

    // The program row still exists; it just has no indications
    let program = db::get_program_by_set_id(&conn, SET_ID).unwrap().unwrap();
    assert!(db::get_indications_for_program(&conn, program.id)
        .unwrap()
        .is_empty());
}

#[test]
fn terminology_outage_degrades_to_unmappable() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID]);
    h.mock_spl(SET_ID, SAMPLE_SPL);
    h.terminology.mock(|when, then| {
        when.method(GET).path("/search");
        then.status(500);
    });

    let mut conn = db::open_memory_database().unwrap();
    let records = h.run(&mut conn, "Dupixent").unwrap();

    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.source, ProvenanceSource::Unmappable);
        assert_eq!(record.icd10_code, None);
        assert_eq!(record.icd10_title, None);
    }
}

#[test]
fn unconfident_model_reply_degrades_to_unmappable() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID]);
    h.mock_spl(SET_ID, SAMPLE_SPL);
    h.mock_codes(
        "Asthma",
        &[("J45", "Asthma"), ("J45.909", "Unspecified asthma")],
    );
    h.mock_codes("Hypertension", &[("I10", "Essential (primary) hypertension")]);
    h.mock_completion("I really could not say.");

    let mut conn = db::open_memory_database().unwrap();
    let records = h.run(&mut conn, "Dupixent").unwrap();

    assert_eq!(records[0].source, ProvenanceSource::Unmappable);
    assert_eq!(records[0].icd10_code, None);
    // The single-candidate row is unaffected
    assert_eq!(records[1].source, ProvenanceSource::Dataset);
}

#[test]
fn first_of_several_registry_matches_wins() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID, "some-other-set"]);
    h.mock_spl(SET_ID, NO_INDICATIONS_SPL);

    let mut conn = db::open_memory_database().unwrap();
    h.run(&mut conn, "Dupixent").unwrap();

    assert!(db::get_program_by_set_id(&conn, SET_ID).unwrap().is_some());
}

#[test]
fn rerun_conflicts_and_leaves_first_batch_intact() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID]);
    h.mock_spl(SET_ID, SAMPLE_SPL);
    h.mock_codes("Asthma", &[("J45", "Asthma")]);
    h.mock_codes("Hypertension", &[("I10", "Essential (primary) hypertension")]);

    let mut conn = db::open_memory_database().unwrap();
    let first = h.run(&mut conn, "Dupixent").unwrap();
    assert_eq!(first.len(), 2);

    // Second run reuses the program but collides on (title, program)
    let err = h.run(&mut conn, "Dupixent").unwrap_err();
    assert!(matches!(err, PipelineError::Persist { .. }));

    let program = db::get_program_by_set_id(&conn, SET_ID).unwrap().unwrap();
    let stored = db::get_indications_for_program(&conn, program.id).unwrap();
    assert_eq!(stored.len(), 2, "first run's rows must survive the rerun");

    let program_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM programs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(program_count, 1, "program row is reused, not duplicated");
}

#[test]
fn failed_batch_commits_nothing() {
    let h = Harness::start();
    h.mock_resolve("Dupixent", &[SET_ID]);
    // Two subsections with the same title collide mid-batch
    let dup_spl = r#"<document><component><structuredBody>
        <component><section>
          <title>INDICATIONS AND USAGE</title>
          <component><section>
            <title>1.1 Asthma</title>
            <text><paragraph>a</paragraph></text>
          </section></component>
          <component><section>
            <title>1.2 Asthma</title>
            <text><paragraph>b</paragraph></text>
          </section></component>
        </section></component>
    </structuredBody></component></document>"#;
    h.mock_spl(SET_ID, dup_spl);
    h.mock_codes("Asthma", &[("J45", "Asthma")]);

    let mut conn = db::open_memory_database().unwrap();
    let err = h.run(&mut conn, "Dupixent").unwrap_err();
    assert!(matches!(err, PipelineError::Persist { .. }));

    let program = db::get_program_by_set_id(&conn, SET_ID).unwrap().unwrap();
    let stored = db::get_indications_for_program(&conn, program.id).unwrap();
    assert!(stored.is_empty(), "rolled-back batch must leave no rows");
}
