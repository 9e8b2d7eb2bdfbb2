mod common;

use std::fs;

use common::{small_config, write_split};
use medimg::train::read_status;
use medimg::{index_split, CancelToken, ClassSchema, Error, RunState, Trainer};
use tempfile::TempDir;

#[test]
fn indexes_images_by_schema_label() {
    let dir = TempDir::new().unwrap();
    let root = write_split(dir.path(), "train", 3, 2);
    fs::write(root.join("normal").join("notes.txt"), "not an image").unwrap();

    let schema = ClassSchema::new(["normal", "lesao"]).unwrap();
    let index = index_split(&root, &schema).unwrap();
    assert_eq!(index.len(), 5);
    assert_eq!(index.class_counts, vec![3, 2]);
    assert!(index.missing_classes.is_empty());
    assert_eq!(index.entries.iter().filter(|e| e.label == 1).count(), 2);
}

#[test]
fn one_epoch_run_completes_and_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", 2, 2);
    write_split(dir.path(), "val", 1, 1);
    let config = small_config(dir.path(), 1);

    let outcome = Trainer::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.last_epoch, 1);
    assert_eq!(outcome.best_epoch, Some(1));
    assert!(config.best_checkpoint_path().is_file());
    assert!(config.latest_checkpoint_path().is_file());

    let metrics = fs::read_to_string(config.metrics_path()).unwrap();
    assert_eq!(metrics.lines().count(), 1);

    let status = read_status(&config.status_path()).unwrap();
    assert_eq!(status.state, RunState::Completed);
    assert_eq!(status.history.len(), 1);
    assert_eq!(status.best_metric, outcome.best_metric);
}

#[test]
fn minimal_split_leaves_exactly_two_checkpoints() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", 1, 1);
    write_split(dir.path(), "val", 1, 1);
    let config = small_config(dir.path(), 1);

    let outcome = Trainer::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);

    let mut names: Vec<String> = fs::read_dir(config.checkpoints_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["best.json", "latest.json"]);
    assert_eq!(fs::read_to_string(config.metrics_path()).unwrap().lines().count(), 1);
}

#[test]
fn cancelled_run_stops_before_training() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", 2, 2);
    write_split(dir.path(), "val", 1, 1);
    let config = small_config(dir.path(), 3);

    let token = CancelToken::new();
    token.cancel();
    let outcome = Trainer::new(config.clone()).with_cancel_token(token).run().unwrap();
    assert_eq!(outcome.state, RunState::Stopped);
    assert_eq!(outcome.last_epoch, 0);
    assert!(outcome.history.is_empty());
    assert_eq!(read_status(&config.status_path()).unwrap().state, RunState::Stopped);
}

#[test]
fn undecodable_images_are_skipped_and_counted() {
    let dir = TempDir::new().unwrap();
    let train = write_split(dir.path(), "train", 2, 2);
    fs::write(train.join("normal").join("broken.png"), b"definitely not a png").unwrap();
    write_split(dir.path(), "val", 1, 1);
    let config = small_config(dir.path(), 1);

    let outcome = Trainer::new(config).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.history[0].skipped, 1);
}

#[test]
fn resume_continues_from_the_next_epoch() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", 2, 2);
    write_split(dir.path(), "val", 1, 1);

    let first = Trainer::new(small_config(dir.path(), 1)).run().unwrap();
    assert_eq!(first.last_epoch, 1);

    let mut config = small_config(dir.path(), 2);
    config.train.resume = true;
    let second = Trainer::new(config.clone()).run().unwrap();
    assert_eq!(second.state, RunState::Completed);
    assert_eq!(second.last_epoch, 2);
    assert_eq!(second.history.len(), 2);
    assert_eq!(second.history[0], first.history[0]);

    let metrics = fs::read_to_string(config.metrics_path()).unwrap();
    assert_eq!(metrics.lines().count(), 2);
}

#[test]
fn missing_training_class_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", 2, 0);
    write_split(dir.path(), "val", 1, 1);
    let config = small_config(dir.path(), 1);

    let err = Trainer::new(config.clone()).run().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(read_status(&config.status_path()).unwrap().state, RunState::Failed);
}

#[test]
fn test_split_is_evaluated_after_completion() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", 2, 2);
    write_split(dir.path(), "val", 1, 1);
    let test = write_split(dir.path(), "test", 1, 1);
    let mut config = small_config(dir.path(), 1);
    config.paths.test = Some(test);

    let outcome = Trainer::new(config.clone()).run().unwrap();
    let report = outcome.test_report.unwrap();
    assert_eq!(report.examples, 2);
    assert!(config.test_metrics_path().is_file());
}

fn metric_epochs(path: &std::path::Path) -> Vec<u64> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["epoch"].as_u64().unwrap())
        .collect()
}

#[test]
fn resume_from_best_does_not_duplicate_metric_records() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", 2, 2);
    write_split(dir.path(), "val", 1, 1);

    let first = small_config(dir.path(), 1);
    Trainer::new(first.clone()).run().unwrap();
    let best_after_epoch_1 = fs::read(first.best_checkpoint_path()).unwrap();

    let mut config = small_config(dir.path(), 3);
    config.train.resume = true;
    Trainer::new(config.clone()).run().unwrap();
    assert_eq!(metric_epochs(&config.metrics_path()), vec![1, 2, 3]);

    // Only "best" from epoch 1 is usable: epochs 2 and 3 run again.
    fs::write(config.best_checkpoint_path(), best_after_epoch_1).unwrap();
    fs::write(config.latest_checkpoint_path(), "{truncated").unwrap();
    let outcome = Trainer::new(config.clone()).run().unwrap();

    let history: Vec<usize> = outcome.history.iter().map(|s| s.epoch).collect();
    assert_eq!(history, vec![1, 2, 3]);
    assert_eq!(metric_epochs(&config.metrics_path()), vec![1, 2, 3]);
    let status = read_status(&config.status_path()).unwrap();
    assert_eq!(status.history.len(), 3);
}

#[test]
fn unwritable_metrics_file_marks_the_run_failed() {
    let dir = TempDir::new().unwrap();
    write_split(dir.path(), "train", 2, 2);
    write_split(dir.path(), "val", 1, 1);
    let config = small_config(dir.path(), 1);
    fs::create_dir_all(config.metrics_path()).unwrap();

    let err = Trainer::new(config.clone()).run().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    let status = read_status(&config.status_path()).unwrap();
    assert_eq!(status.state, RunState::Failed);
}
