mod common;

use common::{ZipBuilder, patterned, sample_archive};
use std::time::Duration;
use tokio::sync::broadcast;
use ziptap::{ArchiveReader, ExtractionEvent, ExtractorConfig, ProgressSample, ReaderOptions};

/// Collect progress samples until the terminal event.
async fn run_to_finish(
    events: &mut broadcast::Receiver<ExtractionEvent>,
) -> (Vec<ProgressSample>, bool, String) {
    let mut samples = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("extraction did not finish")
        {
            Ok(ExtractionEvent::Progress(sample)) => samples.push(sample),
            Ok(ExtractionEvent::Finished { success, message }) => {
                return (samples, success, message);
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(e) => panic!("event channel closed: {e}"),
        }
    }
}

fn fast_options() -> ReaderOptions {
    ReaderOptions {
        sample_interval: Duration::from_millis(20),
        ..ReaderOptions::default()
    }
}

#[tokio::test]
async fn extracts_everything_in_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_archive().write_to(dir.path(), "sample.zip");
    let dest = dir.path().join("out");

    let mut reader = ArchiveReader::new(fast_options());
    assert!(reader.set_source(&path).await);
    let mut events = reader.subscribe();
    assert!(reader.extract_all_to(&dest).await);

    let (_, success, message) = run_to_finish(&mut events).await;
    assert!(success, "{message}");
    assert!(message.starts_with("Extracted to: "));

    assert!(dest.join("docs").is_dir());
    assert_eq!(std::fs::read(dest.join("docs/a.txt")).unwrap(), vec![b'a'; 100]);
    assert_eq!(std::fs::read(dest.join("b.bin")).unwrap(), vec![7u8; 200]);

    reader.wait_idle().await;
    let status = reader.status();
    assert!(!status.extracting);
    assert_eq!(status.progress_percent, 100.0);
    assert_eq!(status.extracted_bytes, 300);
    assert_eq!(status.extracted_files, 2);
    assert_eq!(status.eta_seconds, 0);
    assert_eq!(status.last_extracted_path.as_deref(), Some(dest.as_path()));
    assert_eq!(status.error_string, "");
}

#[tokio::test]
async fn progress_never_goes_backwards() {
    let dir = tempfile::tempdir().unwrap();
    let big = patterned(4 * 1024 * 1024);
    let path = ZipBuilder::new()
        .deflated("one.bin", &big)
        .stored("two.bin", &big[..1024 * 1024])
        .write_to(dir.path(), "big.zip");

    let mut reader = ArchiveReader::new(fast_options());
    assert!(reader.set_source(&path).await);
    let mut events = reader.subscribe();
    assert!(reader.extract_all_to(dir.path().join("out")).await);

    let (samples, success, _) = run_to_finish(&mut events).await;
    assert!(success);
    assert!(!samples.is_empty());
    for pair in samples.windows(2) {
        assert!(pair[1].extracted_bytes >= pair[0].extracted_bytes);
        assert!(pair[1].progress_percent >= pair[0].progress_percent);
    }
    let last = samples.last().unwrap();
    assert_eq!(last.progress_percent, 100.0);
    assert_eq!(last.extracted_bytes, 5 * 1024 * 1024);
}

#[tokio::test]
async fn traversal_entries_never_leave_the_destination() {
    let dir = tempfile::tempdir().unwrap();
    let path = ZipBuilder::new()
        .stored("../../evil.txt", b"gotcha")
        .stored("good.txt", b"fine")
        .write_to(dir.path(), "evil.zip");
    let dest = dir.path().join("a/b/out");

    let mut reader = ArchiveReader::new(fast_options());
    assert!(reader.set_source(&path).await);
    assert!(reader.extract_all_to(&dest).await);
    reader.wait_idle().await;

    assert!(dest.join("good.txt").is_file());
    assert!(!dir.path().join("a/evil.txt").exists());
    assert!(!dir.path().join("evil.txt").exists());
    assert!(!dest.join("evil.txt").exists());
}

#[tokio::test]
async fn preconditions_emit_failure_events() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = ArchiveReader::new(fast_options());
    let mut events = reader.subscribe();

    assert!(!reader.extract_all_to(dir.path().join("out")).await);
    assert_eq!(reader.error_string(), "No ZIP source selected.");
    assert_eq!(
        events.recv().await.unwrap(),
        ExtractionEvent::Finished {
            success: false,
            message: "No ZIP source selected.".into()
        }
    );

    let path = sample_archive().write_to(dir.path(), "sample.zip");
    assert!(reader.set_source(&path).await);
    assert!(!reader.extract_all_to("").await);
    assert_eq!(reader.error_string(), "Please select a destination folder.");

    std::fs::remove_file(&path).unwrap();
    assert!(!reader.extract_all_to(dir.path().join("out")).await);
    assert_eq!(reader.error_string(), "ZIP source does not exist.");
    assert!(!reader.is_extracting());
}

#[tokio::test]
async fn missing_custom_extractor_does_not_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_archive().write_to(dir.path(), "sample.zip");
    let dest = dir.path().join("out");

    let mut reader = ArchiveReader::new(ReaderOptions {
        extractor: ExtractorConfig::new("/no/such/dir/extractor", "{zip} {dest}"),
        ..fast_options()
    });
    assert!(reader.set_source(&path).await);
    let mut events = reader.subscribe();

    assert!(!reader.extract_all_to(&dest).await);
    match events.recv().await.unwrap() {
        ExtractionEvent::Finished { success, message } => {
            assert!(!success);
            assert!(message.starts_with("Custom extractor not found"), "{message}");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(!dest.join("b.bin").exists());
    assert!(!reader.is_extracting());
}

#[cfg(unix)]
fn shell_extractor(script: &str) -> ExtractorConfig {
    ExtractorConfig::new("sh", format!("-c \"{script}\""))
}

#[cfg(unix)]
#[tokio::test]
async fn directory_sampling_subtracts_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = ZipBuilder::new()
        .stored("x/out.bin", &[0u8; 300])
        .write_to(dir.path(), "sample.zip");
    let dest = dir.path().join("out");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("already-here.bin"), vec![1u8; 500]).unwrap();

    let mut reader = ArchiveReader::new(ReaderOptions {
        extractor: shell_extractor(
            "mkdir -p '{dest}/x' && head -c 300 /dev/zero > '{dest}/x/out.bin'",
        ),
        ..fast_options()
    });
    assert!(reader.set_source(&path).await);
    let mut events = reader.subscribe();
    assert!(reader.extract_all_to(&dest).await);

    let (_, success, message) = run_to_finish(&mut events).await;
    assert!(success, "{message}");
    let status = reader.status();
    assert_eq!(status.extracted_bytes, 300);
    assert_eq!(status.extracted_files, 1);
    assert_eq!(status.progress_percent, 100.0);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_extractor_reports_its_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_archive().write_to(dir.path(), "sample.zip");

    let mut reader = ArchiveReader::new(ReaderOptions {
        extractor: shell_extractor("echo cannot read archive >&2; exit 2"),
        ..fast_options()
    });
    assert!(reader.set_source(&path).await);
    let mut events = reader.subscribe();
    assert!(reader.extract_all_to(dir.path().join("out")).await);

    let (_, success, message) = run_to_finish(&mut events).await;
    assert!(!success);
    assert_eq!(message, "cannot read archive");
    assert_eq!(reader.error_string(), "cannot read archive");
    assert_eq!(reader.status().eta_seconds, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn second_request_is_rejected_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_archive().write_to(dir.path(), "sample.zip");
    let dest = dir.path().join("out");

    let mut reader = ArchiveReader::new(ReaderOptions {
        extractor: shell_extractor("sleep 1"),
        ..fast_options()
    });
    assert!(reader.set_source(&path).await);
    assert!(reader.extract_all_to(&dest).await);
    assert!(reader.is_extracting());
    let before = reader.status();

    assert!(!reader.extract_all_to(dir.path().join("elsewhere")).await);
    let during = reader.status();
    assert!(during.extracting);
    assert_eq!(during.error_string, "Extraction already in progress.");
    assert!(during.extracted_bytes >= before.extracted_bytes);
    assert!(!dir.path().join("elsewhere").exists());

    reader.wait_idle().await;
    let after = reader.status();
    assert!(!after.extracting);
    assert_eq!(after.error_string, "");
    assert!(after.elapsed_seconds >= 1);
}

#[tokio::test]
async fn empty_archive_extracts_to_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = ZipBuilder::new().write_to(dir.path(), "empty.zip");
    let dest = dir.path().join("out");

    let mut reader = ArchiveReader::new(fast_options());
    assert!(reader.set_source(&path).await);
    assert_eq!(reader.file_count(), 0);
    assert!(reader.extract_all_to(&dest).await);
    reader.wait_idle().await;

    let status = reader.status();
    assert_eq!(status.extracted_bytes, 0);
    assert_eq!(status.progress_percent, 100.0);
    assert_eq!(status.error_string, "");
    assert!(dest.is_dir());
}

#[tokio::test]
async fn corrupted_payload_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = sample_archive().build();
    // docs/ header (35 bytes) + docs/a.txt header (40 bytes)
    bytes[75] ^= 0xFF;
    let path = dir.path().join("corrupt.zip");
    std::fs::write(&path, bytes).unwrap();

    let mut reader = ArchiveReader::new(fast_options());
    assert!(reader.set_source(&path).await);
    let mut events = reader.subscribe();
    assert!(reader.extract_all_to(dir.path().join("out")).await);

    let (_, success, message) = run_to_finish(&mut events).await;
    assert!(!success);
    assert_eq!(message, "Checksum mismatch for docs/a.txt");
    assert_eq!(reader.error_string(), message);
}

#[tokio::test]
async fn entry_that_cannot_be_created_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = ZipBuilder::new()
        .stored("a", b"plain file")
        .stored("a/b.txt", b"needs a directory named a")
        .stored("z.txt", b"last")
        .write_to(dir.path(), "conflict.zip");
    let dest = dir.path().join("out");

    let mut reader = ArchiveReader::new(fast_options());
    assert!(reader.set_source(&path).await);
    let mut events = reader.subscribe();
    assert!(reader.extract_all_to(&dest).await);

    let (_, success, message) = run_to_finish(&mut events).await;
    assert!(success, "{message}");
    assert_eq!(std::fs::read(dest.join("a")).unwrap(), b"plain file");
    assert_eq!(std::fs::read(dest.join("z.txt")).unwrap(), b"last");
    assert_eq!(reader.status().extracted_files, 2);
}

#[tokio::test]
async fn extracted_files_keep_their_archived_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_archive().write_to(dir.path(), "sample.zip");
    let dest = dir.path().join("out");

    let mut reader = ArchiveReader::new(fast_options());
    assert!(reader.set_source(&path).await);
    assert!(reader.extract_all_to(&dest).await);
    reader.wait_idle().await;
    assert_eq!(reader.error_string(), "");

    // Fixtures are stamped 2021-01-01 12:00 local time.
    let expected = chrono::NaiveDate::from_ymd_opt(2021, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_local_timezone(chrono::Local)
        .earliest()
        .unwrap()
        .timestamp();
    for name in ["docs/a.txt", "b.bin"] {
        let modified = std::fs::metadata(dest.join(name)).unwrap().modified().unwrap();
        let secs = modified
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        assert_eq!(secs, expected, "{name}");
    }
}
