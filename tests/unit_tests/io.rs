use matrixcompare::assert_scalar_eq;
use rbeim::collective::SerialCommunicator;
use rbeim::error::RbError;
use rbeim::io::{ErrorAnalysisTable, Folder};
use std::path::PathBuf;

fn output_folder(test_name: &str) -> Folder {
    let path = PathBuf::from("data/unit_tests/io").join(test_name);
    let _ = std::fs::remove_dir_all(&path);
    Folder::new(path)
}

fn example_table() -> ErrorAnalysisTable {
    let mut table = ErrorAnalysisTable::new(vec![1, 2], 3);
    table.add_column("error");
    for (sample, value) in [1.0, 2.0, 6.0].into_iter().enumerate() {
        table.set("error", 1, sample, value);
        table.set("error", 2, sample, value / 10.0);
    }
    table
}

#[test]
fn error_analysis_table_statistics() {
    let table = example_table();
    assert_eq!(table.n_values(), &[1, 2]);
    assert_eq!(table.num_samples(), 3);
    assert_scalar_eq!(table.mean("error", 1), 3.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(table.max("error", 2), 0.6, comp = abs, tol = 1e-14);
    assert_eq!(table.get("error", 2, 1), 0.2);
    let printed = table.to_string();
    assert!(printed.contains("mean(error)"));
    assert!(printed.lines().count() == 3);
}

#[test]
#[should_panic(expected = "Duplicate column")]
fn duplicate_columns_are_rejected() {
    let mut table = example_table();
    table.add_column("error");
}

#[test]
fn artifacts_round_trip_through_json() {
    let folder = output_folder("artifacts_round_trip_through_json");
    let table = example_table();
    assert!(!folder.contains("table"));
    table.save(&folder, "table", &SerialCommunicator).unwrap();
    assert!(folder.contains("table"));
    assert!(folder.artifact_path("table").ends_with("table.json"));
    let loaded: ErrorAnalysisTable = folder.load("table").unwrap();
    assert_eq!(loaded, table);
}

#[test]
fn loading_missing_artifact_reports_path() {
    let folder = output_folder("loading_missing_artifact_reports_path");
    let error = folder.load::<ErrorAnalysisTable>("nothing").unwrap_err();
    match error.downcast_ref::<RbError>() {
        Some(RbError::MissingArtifact { path }) => assert!(path.ends_with("nothing.json")),
        other => panic!("Expected a missing artifact error, got {other:?}"),
    }
}

#[test]
fn joined_folders_are_nested() {
    let folder = Folder::new("root").join("child");
    assert_eq!(folder.path(), PathBuf::from("root/child").as_path());
}
