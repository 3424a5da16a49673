//! End-to-end runs through the back-coding pipeline.

use std::collections::HashMap;

use backcode::csv_io;
use backcode::prelude::*;

fn telco_use_case() -> UseCase {
    UseCase {
        mergers: HashMap::from([("mobitel".to_string(), "telekom".to_string())]),
        renamers: HashMap::from([(
            "telekom".to_string(),
            "telekom slovenije".to_string(),
        )]),
        identifiers: HashMap::from([
            ("telekom slovenije".to_string(), "1".to_string()),
            ("a1".to_string(), "2".to_string()),
        ]),
        columns: "provider".to_string(),
        recommended: "telekom, a1".to_string(),
    }
}

fn table_from_csv(content: &str) -> Table {
    csv_io::read_table_from(content.as_bytes(), b',').unwrap()
}

#[test]
fn full_flow_from_upload_to_export() {
    let mut session = Session::new("telco", &telco_use_case());
    session
        .load_table(table_from_csv(
            "id,provider,age\n\
             1,telekom,34\n\
             2,telekom slovenije,28\n\
             3,,51\n\
             4,A1,40\n",
        ))
        .unwrap();
    session.run_matcher().unwrap();

    // Only the verbose answer needs an operator.
    assert_eq!(session.state(), SessionState::UnderReview);
    assert_eq!(session.review_queue().len(), 1);
    let key = RowKey::new("provider", 1);
    let entry = session.review_queue().get(&key).unwrap();
    assert_eq!(entry.original_value.as_deref(), Some("telekom slovenije"));
    assert_eq!(entry.suggested.as_deref(), Some("telekom"));

    session.resolve(&key, "telekom").unwrap();
    session.canonicalize().unwrap();
    session.assemble().unwrap();
    assert_eq!(session.state(), SessionState::Exported);

    // Round-trip the export through a file the way the CLI would.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv");
    csv_io::write_table(session.output_table().unwrap(), &path, b',').unwrap();
    let exported = csv_io::read_table(&path, b',').unwrap();

    assert_eq!(
        exported.headers(),
        &[
            "id",
            "provider",
            "provider_best_match",
            "provider_identifier",
            "age"
        ]
    );
    // The rename rule promotes "telekom" to its published label everywhere.
    assert_eq!(
        exported.column("provider_best_match").unwrap(),
        vec![
            Some("telekom slovenije"),
            Some("telekom slovenije"),
            None,
            Some("a1")
        ]
    );
    assert_eq!(
        exported.column("provider_identifier").unwrap(),
        vec![Some("1"), Some("1"), None, Some("2")]
    );
    // Untouched columns survive verbatim.
    assert_eq!(
        exported.column("age").unwrap(),
        vec![Some("34"), Some("28"), Some("51"), Some("40")]
    );
}

#[test]
fn accepted_labels_missing_from_the_identifier_table_get_the_fallback() {
    let mut session = Session::new("telco", &telco_use_case());
    session
        .set_vocabulary(vec![
            "telekom".to_string(),
            "a1".to_string(),
            "bob".to_string(),
        ])
        .unwrap();
    session
        .load_table(table_from_csv("id,provider\n1,bob\n"))
        .unwrap();
    session.run_matcher().unwrap();
    assert_eq!(session.state(), SessionState::Matched);

    session.canonicalize().unwrap();
    let row = &session.enriched()[0].rows[0];
    // No merge, rename or identifier rule knows "bob": max identifier is 2,
    // so it gets 3.
    assert_eq!(row.canonical_label.as_deref(), Some("bob"));
    assert_eq!(row.identifier.as_deref(), Some("3"));
}

#[test]
fn the_unknown_sentinel_flows_through_to_the_fallback_identifier() {
    let mut session = Session::new("telco", &telco_use_case());
    session
        .load_table(table_from_csv("id,provider\n1,zzzz\n"))
        .unwrap();
    session.run_matcher().unwrap();
    assert_eq!(session.state(), SessionState::UnderReview);

    let key = RowKey::new("provider", 0);
    session.resolve(&key, UNKNOWN_LABEL).unwrap();
    session.canonicalize().unwrap();
    session.assemble().unwrap();

    let output = session.output_table().unwrap();
    assert_eq!(
        output.column("provider_best_match").unwrap(),
        vec![Some("unknown")]
    );
    assert_eq!(
        output.column("provider_identifier").unwrap(),
        vec![Some("3")]
    );
}

#[test]
fn identical_inputs_produce_identical_outputs() {
    let csv = "id,provider\n1,telekom\n2,telekcm\n3,a2\n4,\n";
    let run = || {
        let mut session = Session::new("telco", &telco_use_case());
        session.load_table(table_from_csv(csv)).unwrap();
        session.run_matcher().unwrap();
        session.canonicalize().unwrap();
        session.assemble().unwrap();
        (
            session.enriched().to_vec(),
            session.output_table().unwrap().clone(),
        )
    };
    let (enriched_a, output_a) = run();
    let (enriched_b, output_b) = run();
    assert_eq!(enriched_a, enriched_b);
    assert_eq!(output_a, output_b);
}

#[test]
fn derived_name_collisions_are_reported_and_skipped() {
    let mut session = Session::new("telco", &telco_use_case());
    session
        .load_table(table_from_csv(
            "id,provider,provider_best_match\n1,telekom,stale\n",
        ))
        .unwrap();
    session.run_matcher().unwrap();
    session.canonicalize().unwrap();
    session.assemble().unwrap();

    assert!(session.warnings().contains(&PipelineWarning::ColumnCollision {
        column: "provider_best_match".to_string()
    }));
    let output = session.output_table().unwrap();
    // The stale column is untouched; the identifier column still arrives.
    assert_eq!(
        output.column("provider_best_match").unwrap(),
        vec![Some("stale")]
    );
    assert_eq!(
        output.column("provider_identifier").unwrap(),
        vec![Some("1")]
    );
}

#[test]
fn missing_tracked_columns_warn_but_do_not_block_siblings() {
    let use_case = UseCase {
        columns: "provider, landline".to_string(),
        ..telco_use_case()
    };
    let mut session = Session::new("telco", &use_case);
    session
        .load_table(table_from_csv("id,provider\n1,telekom\n"))
        .unwrap();
    session.run_matcher().unwrap();

    assert_eq!(session.classified().len(), 1);
    assert!(session.warnings().contains(&PipelineWarning::UnknownColumn {
        column: "landline".to_string()
    }));

    session.canonicalize().unwrap();
    session.assemble().unwrap();
    assert_eq!(
        session.output_table().unwrap().column("provider_identifier").unwrap(),
        vec![Some("1")]
    );
}

#[test]
fn registry_file_round_trip_feeds_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("use_cases.yaml");

    let mut store = UseCaseStore::new();
    store.upsert("telco", telco_use_case());
    store.save(&path).unwrap();

    let store = UseCaseStore::load(&path).unwrap();
    let mut session = Session::new("telco", store.get("telco").unwrap());
    assert_eq!(session.vocabulary(), &["telekom", "a1"]);
    assert_eq!(session.tracked_columns(), &["provider"]);

    session
        .load_table(table_from_csv("id,provider\n1,mobitel\n"))
        .unwrap();
    session.run_matcher().unwrap();
    // "mobitel" is too far from either word, so the operator decides.
    let key = RowKey::new("provider", 0);
    session.resolve(&key, "telekom").unwrap();
    session.canonicalize().unwrap();
    session.assemble().unwrap();

    // telekom -> (rename) telekom slovenije -> identifier 1.
    assert_eq!(
        session.output_table().unwrap().column("provider_identifier").unwrap(),
        vec![Some("1")]
    );
}

#[test]
fn unique_values_support_vocabulary_curation() {
    let mut session = Session::new("telco", &telco_use_case());
    session
        .load_table(table_from_csv(
            "id,provider\n1, telekom \n2,A1\n3,telekom\n4,\n",
        ))
        .unwrap();
    let (values, warnings) = session.unique_values().unwrap();
    assert!(warnings.is_empty());
    // Trimmed, case preserved, deduplicated, sorted.
    assert_eq!(values, vec!["A1", "telekom"]);
}
