use std::fs;
use jobmon_engine::{ensure_state_dir, AtomicFileWriter};
use tempfile::TempDir;

#[test]
fn creates_missing_state_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("state");
    assert!(!new_dir.exists());
    ensure_state_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("running.ron", "(jobs: [])").unwrap();
    assert_eq!(first.file_name().unwrap(), "running.ron");
    assert_eq!(fs::read_to_string(&first).unwrap(), "(jobs: [])");

    let second = writer.write("running.ron", "(jobs: [\"a\"])").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "(jobs: [\"a\"])");
}

#[test]
fn state_dir_that_is_a_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    assert!(writer.write("running.ron", "data").is_err());
    assert!(!file_path.with_file_name("running.ron").exists());
}

#[test]
fn remove_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());
    writer.write("running.ron", "x").unwrap();

    writer.remove("running.ron").unwrap();
    assert!(!temp.path().join("running.ron").exists());
    writer.remove("running.ron").unwrap();
}
