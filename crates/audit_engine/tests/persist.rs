use std::fs;

use audit_engine::{ensure_output_dir, AtomicFileWriter, PersistError};
use serde::Serialize;
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("reports").join("nested");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("report.json", "{}").unwrap();
    assert_eq!(first.file_name().unwrap(), "report.json");
    assert_eq!(fs::read_to_string(&first).unwrap(), "{}");

    let second = writer.write("report.json", "[]").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "[]");
}

#[test]
fn write_json_is_pretty_with_trailing_newline() {
    #[derive(Serialize)]
    struct Doc {
        domain: &'static str,
        pages: u32,
    }

    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());
    let path = writer
        .write_json(
            "doc.json",
            &Doc {
                domain: "example.com",
                pages: 2,
            },
        )
        .unwrap();

    let written = fs::read_to_string(path).unwrap();
    assert_eq!(written, "{\n  \"domain\": \"example.com\",\n  \"pages\": 2\n}\n");
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("report.json", "data");
    assert!(matches!(result, Err(PersistError::OutputDir(_))));
    assert!(!file_path.with_file_name("report.json").exists());
}
