// Copyright The Strata Dataflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Schema-aware streaming codecs for tabular data.
//!
//! Decoders consume a byte stream (or, for framed binary formats, the fully
//! buffered stream) and produce record batches; encoders do the reverse.
//! Both are ordinary pipeline stages and follow the engine's ownership
//! rules: chunks and batches move, error paths drop.
//!
//! Text decoding is driven by chunk-fed lexers so arbitrarily split input —
//! a UTF-8 sequence, a quoted field or an escape straddling a chunk
//! boundary — decodes identically to contiguous input. Parse errors are
//! data-corruption errors carrying the one-based line they occurred on.

pub mod arrow;
pub mod column;
pub mod config;
pub mod csv;
pub mod json;
pub mod schema;

use arrow_schema::SchemaRef;
use strata_pipeline::TransformHandle;
use strata_pipeline::pipeline::PumpHandle;

pub use config::CodecOptions;

/// Routes a stage error to the right pipeline failure path.
pub(crate) fn report(scheduler: Option<&PumpHandle>, error: strata_pipeline::Error) {
    if let Some(scheduler) = scheduler {
        if error.is_regular() {
            scheduler.report_regular_error(error);
        } else {
            scheduler.report_unhandled_error(error);
        }
    }
}

/// The serialization formats the data layer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFormat {
    /// Delimited text, RFC-4180 quoting.
    Csv,
    /// One top-level array of row objects.
    Json,
    /// Arrow IPC stream framing.
    Arrow,
}

/// Creates a decoder stage for the given format and schema.
#[must_use]
pub fn decoder(format: CodecFormat, schema: SchemaRef, options: &CodecOptions) -> TransformHandle {
    match format {
        CodecFormat::Csv => {
            TransformHandle::byte_stream(csv::CsvDecoder::new(schema, options.clone()))
        }
        CodecFormat::Json => {
            TransformHandle::byte_stream(json::JsonDecoder::new(schema, options.clone()))
        }
        CodecFormat::Arrow => TransformHandle::buffer_list(arrow::ArrowDecoder::new()),
    }
}

/// Creates an encoder stage for the given format.
#[must_use]
pub fn encoder(format: CodecFormat, options: &CodecOptions) -> TransformHandle {
    match format {
        CodecFormat::Csv => TransformHandle::batch(csv::CsvEncoder::new(options.clone())),
        CodecFormat::Json => TransformHandle::batch(json::JsonEncoder::new()),
        CodecFormat::Arrow => TransformHandle::batch(arrow::ArrowEncoder::new()),
    }
}
