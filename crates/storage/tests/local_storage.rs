// SPDX-License-Identifier: Apache-2.0

//! Local storage behavior: root validation, path operations, chunk reads
//! and streaming round trips through full pipelines.

use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;
use strata_pipeline::error::Error;
use strata_pipeline::testing::{CollectSink, ScriptedSource, run_local};
use strata_pipeline::{PipelineBuilder, SinkHandle, SourceHandle, TransformHandle};
use strata_storage::{FileType, ListOptions, LocalFileStorage};

fn storage(dir: &tempfile::TempDir) -> LocalFileStorage {
    LocalFileStorage::new("test_storage", dir.path(), false).expect("valid root")
}

#[test]
fn root_must_exist_and_be_a_directory() {
    let missing = LocalFileStorage::new("s", "/definitely/not/a/real/path", true);
    assert!(matches!(missing, Err(Error::StartupConfig { .. })));

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("plain_file");
    std::fs::write(&file_path, b"x").expect("write");
    let not_a_dir = LocalFileStorage::new("s", &file_path, true);
    assert!(matches!(not_a_dir, Err(Error::StartupConfig { .. })));
}

#[test]
fn paths_cannot_escape_the_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage(&dir);

    run_local(async move {
        for bad in ["", "/abs/path", "a/../b", "./x", "a//b"] {
            let result = storage.exists(bad).await;
            assert!(matches!(result, Err(Error::Storage { .. })), "path: {bad}");
        }
    });
}

#[test]
fn mkdir_stat_list_delete_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage(&dir);

    run_local(async move {
        storage.mkdir("data/batch_1", true).await.expect("mkdir");
        assert!(storage.dir_exists("data/batch_1").await.expect("dir_exists"));

        std::fs::write(dir.path().join("data/batch_1/part-0.csv"), b"a,b\n").expect("write");
        std::fs::write(dir.path().join("data/batch_1/part-1.csv"), b"c,d\n").expect("write");

        let stat = storage
            .stat("data/batch_1/part-0.csv")
            .await
            .expect("stat");
        assert_eq!(stat.file_type, FileType::File);
        assert_eq!(stat.size, 4);
        assert_eq!(stat.file_name, "part-0.csv");

        let listed = storage
            .list("data", &ListOptions {
                recursive: true,
                ..ListOptions::default()
            })
            .await
            .expect("list");
        let paths: Vec<&str> = listed
            .iter()
            .map(|entry| entry.storage_path.as_str())
            .collect();
        assert_eq!(
            paths,
            [
                "data/batch_1",
                "data/batch_1/part-0.csv",
                "data/batch_1/part-1.csv"
            ]
        );

        let after = storage
            .list("data", &ListOptions {
                recursive: true,
                start_after: Some("data/batch_1/part-0.csv".to_owned()),
                max_keys: Some(1),
            })
            .await
            .expect("list");
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].storage_path, "data/batch_1/part-1.csv");

        storage
            .delete_file("data/batch_1/part-0.csv")
            .await
            .expect("delete_file");
        assert!(!storage.exists("data/batch_1/part-0.csv").await.expect("exists"));

        storage.delete_dir("data").await.expect("delete_dir");
        assert!(!storage.dir_exists("data").await.expect("dir_exists"));
    });
}

#[test]
fn read_chunk_returns_exact_ranges_and_flags_short_reads() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("object.bin"), b"0123456789").expect("write");
    let storage = storage(&dir);

    run_local(async move {
        let chunk = storage.read_chunk("object.bin", 2, 5).await.expect("chunk");
        assert_eq!(&chunk[..], b"23456");

        let short = storage.read_chunk("object.bin", 8, 5).await;
        match short {
            Err(Error::Storage { key, path, message }) => {
                assert!(key.contains("read_chunk"));
                assert_eq!(path, "object.bin");
                assert!(message.contains("object too small"));
            }
            other => panic!("expected a short-read error, got {other:?}"),
        }
    });
}

#[test]
fn read_only_mode_rejects_mutations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = LocalFileStorage::new("ro_storage", dir.path(), true).expect("valid root");

    run_local(async move {
        assert!(matches!(
            storage.mkdir("x", false).await,
            Err(Error::Storage { .. })
        ));
        assert!(matches!(
            storage.delete_file("x").await,
            Err(Error::Storage { .. })
        ));
        assert!(storage.write_stream("x").is_err());
    });
}

#[test]
fn streaming_write_then_read_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage(&dir);

    let payload: Vec<Bytes> = (0..64)
        .map(|index| Bytes::from(vec![index as u8; 1000]))
        .collect();
    let expected: Vec<u8> = payload.iter().flat_map(|chunk| chunk.to_vec()).collect();

    // Write pipeline: scripted chunks -> file sink.
    let sink = storage
        .write_stream("outputs/run_1/result.bin")
        .expect("write stream");
    let bytes_written = sink.bytes_written();
    let write = PipelineBuilder::from_source(SourceHandle::new(ScriptedSource::new(payload)))
        .to_sink(SinkHandle::byte_stream(sink))
        .expect("compatible interfaces");
    run_local(write.execute()).expect("write pipeline");
    assert_eq!(bytes_written.get(), expected.len() as u64);

    // Read pipeline: file source -> elastic -> collecting sink.
    let collected = Rc::new(RefCell::new(Vec::new()));
    let sink_error = Rc::new(RefCell::new(None));
    let source = storage
        .read_stream("outputs/run_1/result.bin")
        .expect("read stream");
    let read = PipelineBuilder::from_source(SourceHandle::new(
        source.with_chunk_size(777),
    ))
    .add_stage(TransformHandle::byte_stream(
        strata_pipeline::ElasticBuffer::new(),
    ))
    .to_sink(SinkHandle::byte_stream(CollectSink::new(
        collected.clone(),
        sink_error,
    )))
    .expect("compatible interfaces");
    run_local(read.execute()).expect("read pipeline");

    assert_eq!(*collected.borrow(), expected);
}

#[test]
fn reading_a_missing_file_fails_with_the_storage_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage(&dir);

    let collected = Rc::new(RefCell::new(Vec::new()));
    let sink_error = Rc::new(RefCell::new(None));
    let source = storage.read_stream("missing.bin").expect("path is valid");
    let pipeline = PipelineBuilder::from_source(SourceHandle::new(source))
        .to_sink(SinkHandle::byte_stream(CollectSink::new(
            collected,
            sink_error.clone(),
        )))
        .expect("compatible interfaces");

    let result = run_local(pipeline.execute());
    match result {
        Err(Error::Storage { key, path, .. }) => {
            assert!(key.contains("test_storage"));
            assert_eq!(path, "missing.bin");
        }
        other => panic!("expected a storage error, got {other:?}"),
    }
    // The sink saw the same terminal error.
    assert!(matches!(&*sink_error.borrow(), Some(Error::Storage { .. })));
}
