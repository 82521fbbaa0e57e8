// SPDX-License-Identifier: Apache-2.0

//! End-to-end codec behavior through full pipelines: encode/decode round
//! trips, null handling, range errors and the empty-stream contract.

use arrow_array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use strata_codec::{CodecFormat, CodecOptions, decoder, encoder};
use strata_pipeline::error::Error;
use strata_pipeline::testing::{
    BatchCollectSink, CollectSink, ScriptedBatchSource, ScriptedSource, run_local,
};
use strata_pipeline::{PipelineBuilder, SinkHandle, SourceHandle};

fn scenario_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("amount", DataType::Float64, true),
    ]))
}

fn scenario_batch() -> RecordBatch {
    let schema = scenario_schema();
    let id: ArrayRef = Arc::new(Int64Array::from(vec![1, 2]));
    let name: ArrayRef = Arc::new(StringArray::from(vec![Some("a"), Some("b")]));
    let amount: ArrayRef = Arc::new(Float64Array::from(vec![Some(1.5), None]));
    RecordBatch::try_new(schema, vec![id, name, amount]).expect("valid batch")
}

/// Runs `schema + batches → encoder(format) → collected bytes`.
fn encode_pipeline(
    format: CodecFormat,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    options: &CodecOptions,
) -> Vec<u8> {
    let collected = Rc::new(RefCell::new(Vec::new()));
    let sink_error = Rc::new(RefCell::new(None));

    let pipeline =
        PipelineBuilder::from_source(SourceHandle::new(ScriptedBatchSource::new(schema, batches)))
            .add_stage(encoder(format, options))
            .to_sink(SinkHandle::byte_stream(CollectSink::new(
                collected.clone(),
                sink_error.clone(),
            )))
            .expect("compatible interfaces");

    let result = run_local(pipeline.execute());
    assert!(result.is_ok(), "encode failed: {result:?}");
    assert!(sink_error.borrow().is_none());

    let bytes = collected.borrow().clone();
    bytes
}

/// Runs `bytes → decoder(format, schema) → collected batches`.
fn decode_pipeline(
    format: CodecFormat,
    schema: SchemaRef,
    bytes: Vec<u8>,
    options: &CodecOptions,
) -> Result<Vec<RecordBatch>, Error> {
    // Deliver in small chunks so lexer state crosses chunk boundaries.
    let chunks: Vec<Bytes> = bytes
        .chunks(7)
        .map(|chunk| Bytes::from(chunk.to_vec()))
        .collect();

    let batches = Rc::new(RefCell::new(Vec::new()));
    let seen_schema = Rc::new(RefCell::new(None));
    let sink_error = Rc::new(RefCell::new(None));

    let pipeline = PipelineBuilder::from_source(SourceHandle::new(ScriptedSource::new(chunks)))
        .add_stage(decoder(format, schema, options))
        .to_sink(SinkHandle::batch(BatchCollectSink::new(
            seen_schema,
            batches.clone(),
            sink_error,
        )))
        .expect("compatible interfaces");

    run_local(pipeline.execute())?;
    let batches = batches.borrow().clone();
    Ok(batches)
}

#[test]
fn json_round_trip_preserves_values_and_nulls() {
    let options = CodecOptions::default();
    let encoded = encode_pipeline(
        CodecFormat::Json,
        scenario_schema(),
        vec![scenario_batch()],
        &options,
    );

    let text = String::from_utf8(encoded.clone()).expect("utf8 json");
    assert!(text.starts_with('['));
    assert!(text.ends_with(']'));

    let batches =
        decode_pipeline(CodecFormat::Json, scenario_schema(), encoded, &options).expect("decode");

    let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    assert_eq!(total_rows, 2);

    let batch = &batches[0];
    let names = batch
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("string column");
    assert_eq!(names.value(0), "a");

    let amounts = batch
        .column(2)
        .as_any()
        .downcast_ref::<Float64Array>()
        .expect("float column");
    assert_eq!(amounts.value(0), 1.5);
    assert!(amounts.is_null(1));
}

#[test]
fn csv_distinguishes_empty_string_from_null() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("c1", DataType::Utf8, true),
        Field::new("c2", DataType::Utf8, true),
        Field::new("c3", DataType::Utf8, true),
    ]));

    let input = b"a,,b\n,\"\",\n".to_vec();
    let batches = decode_pipeline(CodecFormat::Csv, schema, input, &CodecOptions::default())
        .expect("decode");

    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 2);

    let column = |index: usize| {
        batch
            .column(index)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("string column")
    };

    // Row 1: ("a", null, "b")
    assert_eq!(column(0).value(0), "a");
    assert!(column(1).is_null(0));
    assert_eq!(column(2).value(0), "b");

    // Row 2: (null, "", null)
    assert!(column(0).is_null(1));
    assert!(!column(1).is_null(1));
    assert_eq!(column(1).value(1), "");
    assert!(column(2).is_null(1));
}

#[test]
fn csv_round_trip_preserves_empty_vs_null() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("c1", DataType::Utf8, true),
        Field::new("c2", DataType::Utf8, true),
    ]));
    let c1: ArrayRef = Arc::new(StringArray::from(vec![Some("x"), None, Some("")]));
    let c2: ArrayRef = Arc::new(StringArray::from(vec![None, Some(""), Some("y")]));
    let batch = RecordBatch::try_new(schema.clone(), vec![c1, c2]).expect("valid batch");

    let options = CodecOptions::default();
    let encoded = encode_pipeline(CodecFormat::Csv, schema.clone(), vec![batch], &options);
    assert_eq!(String::from_utf8(encoded.clone()).expect("utf8"), "x,\n,\"\"\n\"\",y\n");

    let batches = decode_pipeline(CodecFormat::Csv, schema, encoded, &options).expect("decode");
    let batch = &batches[0];
    let c1 = batch
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("string column");
    let c2 = batch
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("string column");

    assert_eq!(c1.value(0), "x");
    assert!(c1.is_null(1));
    assert_eq!(c1.value(2), "");
    assert!(c2.is_null(0));
    assert_eq!(c2.value(1), "");
    assert_eq!(c2.value(2), "y");
}

#[test]
fn unsigned_decoder_rejects_values_out_of_range() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
        "counter",
        DataType::UInt64,
        true,
    )]));

    let in_range = decode_pipeline(
        CodecFormat::Csv,
        schema.clone(),
        b"18446744073709551615\n".to_vec(),
        &CodecOptions::default(),
    );
    assert!(in_range.is_ok());

    let out_of_range = decode_pipeline(
        CodecFormat::Csv,
        schema,
        b"18446744073709551616\n".to_vec(),
        &CodecOptions::default(),
    );
    match out_of_range {
        Err(Error::DataCorruption { message, line, .. }) => {
            assert!(message.contains("Value out of range"));
            assert_eq!(line, Some(1));
        }
        other => panic!("expected a range error, got {other:?}"),
    }
}

#[test]
fn empty_stream_is_a_corruption_error() {
    let result = decode_pipeline(
        CodecFormat::Json,
        scenario_schema(),
        Vec::new(),
        &CodecOptions::default(),
    );
    match result {
        Err(Error::DataCorruption { message, .. }) => assert!(message.contains("Data is empty")),
        other => panic!("expected the empty-data error, got {other:?}"),
    }
}

#[test]
fn json_unknown_field_reports_its_line() {
    let input = b"[\n{\"id\": 1, \"name\": \"a\", \"amount\": 1.5},\n{\"id\": 2, \"wrong\": \"b\", \"amount\": null}\n]".to_vec();
    let result = decode_pipeline(
        CodecFormat::Json,
        scenario_schema(),
        input,
        &CodecOptions::default(),
    );
    match result {
        Err(Error::DataCorruption { message, line, .. }) => {
            assert!(message.contains("Unrecognised field"));
            assert_eq!(line, Some(3));
        }
        other => panic!("expected an unknown-field error, got {other:?}"),
    }
}

#[test]
fn json_field_matching_can_be_case_insensitive() {
    let input = b"[{\"ID\": 1, \"Name\": \"a\", \"AMOUNT\": 1.5}]".to_vec();

    let strict = decode_pipeline(
        CodecFormat::Json,
        scenario_schema(),
        input.clone(),
        &CodecOptions::default(),
    );
    assert!(strict.is_err());

    let lenient_options = CodecOptions {
        case_sensitive: false,
        ..CodecOptions::default()
    };
    let batches = decode_pipeline(CodecFormat::Json, scenario_schema(), input, &lenient_options)
        .expect("case-insensitive decode");
    assert_eq!(batches[0].num_rows(), 1);
}

#[test]
fn json_missing_required_field_is_an_error() {
    let input = b"[{\"name\": \"a\", \"amount\": 1.5}]".to_vec();
    let result = decode_pipeline(
        CodecFormat::Json,
        scenario_schema(),
        input,
        &CodecOptions::default(),
    );
    match result {
        Err(Error::DataCorruption { message, .. }) => {
            assert!(message.contains("Missing required field id"));
        }
        other => panic!("expected a missing-field error, got {other:?}"),
    }
}

#[test]
fn arrow_round_trip_through_the_buffering_stage() {
    let options = CodecOptions::default();
    let encoded = encode_pipeline(
        CodecFormat::Arrow,
        scenario_schema(),
        vec![scenario_batch(), scenario_batch()],
        &options,
    );

    // The arrow decoder consumes the buffer-list interface; assembling it
    // after a byte source exercises the automatic buffering insertion.
    let batches =
        decode_pipeline(CodecFormat::Arrow, scenario_schema(), encoded, &options).expect("decode");

    let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    assert_eq!(total_rows, 4);
    assert_eq!(batches[0].schema(), scenario_schema());
}

#[test]
fn decoder_batches_respect_the_configured_size() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
        "n",
        DataType::Int64,
        false,
    )]));
    let mut input = Vec::new();
    for value in 0..10 {
        input.extend_from_slice(format!("{value}\n").as_bytes());
    }

    let options = CodecOptions {
        batch_size: 4,
        ..CodecOptions::default()
    };
    let batches = decode_pipeline(CodecFormat::Csv, schema, input, &options).expect("decode");

    let sizes: Vec<usize> = batches.iter().map(RecordBatch::num_rows).collect();
    assert_eq!(sizes, [4, 4, 2]);
}
