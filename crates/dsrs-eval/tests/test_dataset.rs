use std::collections::HashSet;
use std::fs;

use dsrs_eval::{DataLoader, Dataset, DatasetError, Example, example};
use rstest::*;
use tempfile::tempdir;

fn ticket(text: &str, category: &str) -> Example {
    example! {
        "ticket": "input" => text,
        "category": "output" => category,
    }
}

#[fixture]
fn tickets() -> Vec<Example> {
    (0..20)
        .map(|i| ticket(&format!("ticket #{i}"), if i % 2 == 0 { "Hardware" } else { "Network" }))
        .collect()
}

#[rstest]
fn split_partitions_without_overlap(tickets: Vec<Example>) {
    let dataset = Dataset::split(tickets, 0.75, 42).expect("valid fraction");

    assert_eq!(dataset.train().len(), 15);
    assert_eq!(dataset.validation().len(), 5);
    assert_eq!(dataset.len(), 20);

    let train: HashSet<Vec<&str>> = dataset.train().iter().map(Example::identity).collect();
    assert!(
        dataset
            .validation()
            .iter()
            .all(|example| !train.contains(&example.identity()))
    );
}

#[rstest]
fn split_is_reproducible_for_a_seed(tickets: Vec<Example>) {
    let first = Dataset::split(tickets.clone(), 0.5, 7).expect("valid fraction");
    let second = Dataset::split(tickets, 0.5, 7).expect("valid fraction");
    assert_eq!(first.train(), second.train());
    assert_eq!(first.validation(), second.validation());
}

#[rstest]
fn split_drops_duplicate_inputs_before_partitioning() {
    let examples = vec![
        ticket("écran noir", "Hardware"),
        ticket("écran noir", "Hardware"),
        ticket("wifi lent", "Network"),
    ];
    let dataset = Dataset::split(examples, 0.5, 0).expect("valid fraction");

    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.train().len(), 1);
    assert_eq!(dataset.validation().len(), 1);
}

#[rstest]
#[case(0.0)]
#[case(1.0)]
#[case(-0.2)]
#[case(f32::NAN)]
fn split_rejects_degenerate_fractions(tickets: Vec<Example>, #[case] fraction: f32) {
    let err = Dataset::split(tickets, fraction, 0).expect_err("fraction out of range");
    assert!(matches!(err, DatasetError::InvalidFraction { .. }));
}

#[rstest]
fn new_rejects_examples_in_both_splits() {
    let train = vec![ticket("écran noir", "Hardware"), ticket("wifi lent", "Network")];
    // Same input, different label: still the same ticket.
    let validation = vec![ticket("wifi lent", "Hardware")];

    let err = Dataset::new(train, validation).expect_err("overlap detected");
    assert!(matches!(err, DatasetError::Overlap { count: 1 }));
}

#[rstest]
fn new_accepts_disjoint_splits() {
    let dataset = Dataset::new(
        vec![ticket("écran noir", "Hardware")],
        vec![ticket("wifi lent", "Network")],
    )
    .expect("disjoint");
    assert_eq!(dataset.train().len(), 1);
    assert_eq!(dataset.validation().len(), 1);
}

#[rstest]
fn json_lines_load_assigns_caller_keys() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tickets.jsonl");
    fs::write(
        &path,
        "{\"ticket\": \"VPN coupé\", \"category\": \"Network\", \"id\": 3}\n\n\
         {\"ticket\": \"Souris HS\", \"category\": \"Peripherals\", \"id\": 4}\n",
    )?;

    let examples = DataLoader::load_json(&path, true, &["ticket"], &["category"])?;

    assert_eq!(examples.len(), 2);
    assert_eq!(examples[0].get("id"), Some("3"));
    assert_eq!(examples[1].label("category"), Some("Peripherals"));
    assert_eq!(examples[1].label("ticket"), None);
    assert_eq!(examples[0].inputs().keys(), vec!["ticket".to_string()]);
    Ok(())
}

#[rstest]
fn json_array_save_then_load_keeps_fields() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tickets.json");
    let original = vec![ticket("écran noir", "Hardware"), ticket("wifi lent", "Network")];

    DataLoader::save_json(&path, &original, false)?;
    let loaded = DataLoader::load_json(&path, false, &["ticket"], &["category"])?;

    assert_eq!(loaded, original);
    Ok(())
}

#[rstest]
fn csv_load_with_custom_delimiter() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tickets.csv");
    fs::write(
        &path,
        "ticket;category;priority\nÉcran noir;Hardware;High\nWifi lent;Network;Low\n",
    )?;

    let examples = DataLoader::load_csv(&path, ';', &["ticket"], &["category", "priority"])?;

    assert_eq!(examples.len(), 2);
    assert_eq!(examples[1].get("ticket"), Some("Wifi lent"));
    assert_eq!(examples[1].label("priority"), Some("Low"));
    Ok(())
}

#[rstest]
fn csv_load_reports_missing_column() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tickets.csv");
    fs::write(&path, "ticket,category\nÉcran noir,Hardware\n")?;

    let err = DataLoader::load_csv(&path, ',', &["ticket"], &["category", "priority"])
        .expect_err("priority column is absent");

    match err {
        DatasetError::MissingColumn { row, column } => {
            assert_eq!(row, 0);
            assert_eq!(column, "priority");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[rstest]
fn csv_round_trip_through_save() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("out.csv");
    let original = vec![ticket("écran, noir", "Hardware")];

    DataLoader::save_csv(&path, &original, ',')?;
    let loaded = DataLoader::load_csv(&path, ',', &["ticket"], &["category"])?;

    assert_eq!(loaded[0].get("ticket"), Some("écran, noir"));
    Ok(())
}

#[rstest]
fn missing_file_is_an_io_error() {
    let err = DataLoader::load_json("/definitely/not/here.json", false, &["ticket"], &[])
        .expect_err("no such file");
    assert!(matches!(err, DatasetError::Io(_)));
}
