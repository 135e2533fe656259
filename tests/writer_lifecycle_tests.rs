use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rotolog::{
    AsynchronousTextWriter, ErrorHandler, FileCountRetentionPolicy, FileNamingPolicy,
    IntervalRotationPolicy, MultifileTextWriter, SizeRotationPolicy, TextWriter, TimestampNaming,
    WriterConfig, WriterFailure,
};

struct NullHandler;

impl ErrorHandler for NullHandler {
    fn handle(&self, _failure: WriterFailure) {}
}

fn new_writer(path: &Path, config: &WriterConfig) -> MultifileTextWriter {
    MultifileTextWriter::new(
        Arc::new(TimestampNaming::new(path)),
        config,
        Arc::new(NullHandler),
    )
    .expect("create writer")
}

/// Poll `condition` until it holds or two seconds pass.
fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// All files of the stream in write order: rotated files by generation
/// (timestamp, then collision counter), live file last.
fn files_in_write_order(base: &Path) -> Vec<PathBuf> {
    let naming = TimestampNaming::new(base);
    let mut rotated: Vec<(String, u32, PathBuf)> = Vec::new();
    for file in naming.list_files().unwrap() {
        if file == base {
            continue;
        }
        let name = file.to_string_lossy().into_owned();
        let suffix = name
            .strip_prefix(&format!("{}.", base.display()))
            .unwrap()
            .to_string();
        let (stamp, counter) = match suffix.split_once('.') {
            Some((stamp, counter)) => (stamp.to_string(), counter.parse().unwrap()),
            None => (suffix, 0),
        };
        rotated.push((stamp, counter, file));
    }
    rotated.sort();
    let mut ordered: Vec<PathBuf> = rotated.into_iter().map(|(_, _, f)| f).collect();
    ordered.push(base.to_path_buf());
    ordered
}

fn all_lines(base: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for file in files_in_write_order(base) {
        lines.extend(
            fs::read_to_string(file)
                .unwrap()
                .lines()
                .map(str::to_string),
        );
    }
    lines
}

#[test]
fn no_record_lost_across_concurrent_rotations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let writer = Arc::new(new_writer(
        &path,
        &WriterConfig::new().with_check_interval(Duration::from_secs(3600)),
    ));
    writer.add_rotation_policy(Arc::new(SizeRotationPolicy::new(500).unwrap()));

    let mut producers = Vec::new();
    for t in 0..4 {
        let writer = Arc::clone(&writer);
        producers.push(thread::spawn(move || {
            for i in 0..50 {
                writer.write_record(&format!("t{t} {i:03}"));
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }
    writer.shutdown();

    let lines = all_lines(&path);
    assert_eq!(lines.len(), 200, "every record appears exactly once");
    assert!(writer.total_files_rotated() > 0, "rotations did happen");

    // no completed file exceeds the limit
    for file in files_in_write_order(&path) {
        if file != path {
            assert!(fs::metadata(&file).unwrap().len() <= 500);
        }
    }

    // each producer's records appear in its submission order
    for t in 0..4 {
        let prefix = format!("t{t} ");
        let own: Vec<&String> = lines.iter().filter(|l| l.starts_with(&prefix)).collect();
        assert_eq!(own.len(), 50);
        let mut sorted = own.clone();
        sorted.sort();
        assert_eq!(own, sorted, "producer {t} records reordered");
    }
}

#[test]
fn size_rotation_boundary_splits_at_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let writer = new_writer(
        &path,
        &WriterConfig::new()
            .with_append(false)
            .with_check_interval(Duration::from_secs(3600)),
    );
    writer.add_rotation_policy(Arc::new(SizeRotationPolicy::new(100).unwrap()));

    // five 30-byte records against a 100-byte limit: the write that would
    // reach 120 bytes rotates first
    for i in 0..5 {
        writer.write_record(&format!("record {i} {}", "x".repeat(20)));
    }
    writer.shutdown();

    let files = files_in_write_order(&path);
    assert_eq!(files.len(), 2);
    assert_eq!(writer.total_files_rotated(), 1);
    assert_eq!(fs::metadata(&files[0]).unwrap().len(), 90);
    assert_eq!(fs::metadata(&path).unwrap().len(), 60);
    assert_eq!(all_lines(&path).len(), 5);
}

#[test]
fn retention_keeps_newest_files_and_live_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let writer = new_writer(
        &path,
        &WriterConfig::new().with_check_interval(Duration::from_millis(50)),
    );

    // live file is created first, so it is the *oldest* file on disk;
    // retention must protect it anyway
    let mut rotated = Vec::new();
    for i in 1..=5 {
        thread::sleep(Duration::from_millis(30));
        let file = dir.path().join(format!("app.log.2025010100000{i}"));
        fs::write(&file, format!("generation {i}\n")).unwrap();
        rotated.push(file);
    }

    writer.add_retention_policy(Arc::new(FileCountRetentionPolicy::new(3).unwrap()));

    assert!(wait_until(|| writer.total_files_cleaned() >= 2));
    writer.shutdown();

    assert!(path.exists(), "live file must never be deleted");
    assert!(!rotated[0].exists(), "oldest rotated file deleted");
    assert!(!rotated[1].exists(), "second-oldest rotated file deleted");
    for file in &rotated[2..] {
        assert!(file.exists(), "three newest rotated files retained");
    }
    assert_eq!(writer.total_files_cleaned(), 2);
}

#[test]
fn checker_applies_interval_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let writer = new_writer(
        &path,
        &WriterConfig::new().with_check_interval(Duration::from_millis(50)),
    );
    writer.add_rotation_policy(Arc::new(
        IntervalRotationPolicy::new(Duration::from_millis(100)).unwrap(),
    ));

    writer.write_record("before rotation");
    assert!(wait_until(|| writer.total_files_rotated() >= 1));
    writer.write_record("after rotation");
    writer.shutdown();

    let lines = all_lines(&path);
    assert!(lines.contains(&"before rotation".to_string()));
    assert!(lines.contains(&"after rotation".to_string()));
    assert!(files_in_write_order(&path).len() >= 2);
}

#[test]
fn interval_change_wakes_sleeping_checker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    // checker sleeps an hour between ticks
    let writer = new_writer(
        &path,
        &WriterConfig::new().with_check_interval(Duration::from_secs(3600)),
    );
    writer.add_rotation_policy(Arc::new(
        IntervalRotationPolicy::new(Duration::from_millis(50)).unwrap(),
    ));

    thread::sleep(Duration::from_millis(150));
    assert_eq!(writer.total_files_rotated(), 0, "checker still asleep");

    // shrinking the interval must take effect now, not an hour from now
    writer.set_interval(Duration::from_millis(50)).unwrap();
    assert!(wait_until(|| writer.total_files_rotated() >= 1));
    writer.shutdown();
}

#[test]
fn async_writer_delivers_in_order_through_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let inner = new_writer(
        &path,
        &WriterConfig::new()
            .with_auto_flush(false)
            .with_check_interval(Duration::from_secs(3600)),
    );
    inner.add_rotation_policy(Arc::new(SizeRotationPolicy::new(300).unwrap()));

    let writer =
        AsynchronousTextWriter::new(inner, Some(16), true, Arc::new(NullHandler)).unwrap();
    let expected: Vec<String> = (0..100).map(|i| format!("record {i:03}")).collect();
    for record in &expected {
        writer.write_record(record);
    }
    writer.shutdown();
    writer.shutdown(); // idempotent

    assert_eq!(all_lines(&path), expected);
}

#[test]
fn shutdown_preserves_enqueued_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let inner = new_writer(
        &path,
        &WriterConfig::new().with_check_interval(Duration::from_secs(3600)),
    );

    let writer = AsynchronousTextWriter::new(inner, None, false, Arc::new(NullHandler)).unwrap();
    for i in 0..500 {
        writer.write_record(&format!("queued {i}"));
    }
    // everything accepted before shutdown must reach the file
    writer.shutdown();

    assert_eq!(all_lines(&path).len(), 500);
}
