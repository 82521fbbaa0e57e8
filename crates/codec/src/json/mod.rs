// SPDX-License-Identifier: Apache-2.0

//! Streaming JSON codec.
//!
//! The wire form is one top-level array of row objects. The decoder parses
//! the token stream incrementally, matching field names against the target
//! schema (case-sensitively by default) and filling column builders; rows
//! may omit nullable fields, while unknown fields, missing required fields
//! and structured values are corruption errors carrying the line number.
//!
//! The encoder writes the begin-array marker, one object per row with
//! explicit nulls, and the end marker.

pub mod lexer;

use crate::column::{ColumnReader, ColumnWriter, write_json_string};
use crate::config::CodecOptions;
use crate::report;
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use lexer::{JsonLexer, JsonToken};
use std::cell::RefCell;
use std::rc::Rc;
use strata_pipeline::Error;
use strata_pipeline::pipeline::PumpHandle;
use strata_pipeline::stage::{
    BatchConsumer, ByteStreamConsumer, Consumer, DataInterface, Producer, Stage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    RowOrEnd,
    NameOrEnd,
    Colon,
    Value,
    AfterValue,
    AfterRow,
    Done,
}

/// Streaming JSON decoder: byte stream in, record batches out.
pub struct JsonDecoder {
    schema: SchemaRef,
    options: CodecOptions,
    lexer: JsonLexer,
    parse_state: ParseState,
    current_field: Option<usize>,
    row_seen: Vec<bool>,
    row_line: u64,
    writers: Vec<ColumnWriter>,
    consumer: Option<Rc<RefCell<dyn BatchConsumer>>>,
    scheduler: Option<PumpHandle>,
    rows_in_batch: usize,
    bytes_consumed: u64,
    done: bool,
}

impl JsonDecoder {
    /// Creates a decoder for the given arrow schema.
    #[must_use]
    pub fn new(schema: SchemaRef, options: CodecOptions) -> Self {
        let field_count = schema.fields().len();
        JsonDecoder {
            schema,
            options,
            lexer: JsonLexer::new(),
            parse_state: ParseState::Start,
            current_field: None,
            row_seen: vec![false; field_count],
            row_line: 1,
            writers: Vec::new(),
            consumer: None,
            scheduler: None,
            rows_in_batch: 0,
            bytes_consumed: 0,
            done: false,
        }
    }

    fn fail(&mut self, error: Error) {
        self.done = true;
        self.writers.clear();
        report(self.scheduler.as_ref(), error);
    }

    fn corruption(&self, message: impl Into<String>, line: u64) -> Error {
        Error::DataCorruption {
            message: message.into(),
            line: Some(line),
            column: None,
        }
    }

    fn field_index(&self, name: &str, line: u64) -> Result<usize, Error> {
        let matcher = |field_name: &str| {
            if self.options.case_sensitive {
                field_name == name
            } else {
                field_name.eq_ignore_ascii_case(name)
            }
        };
        self.schema
            .fields()
            .iter()
            .position(|field| matcher(field.name()))
            .ok_or_else(|| self.corruption(format!("Unrecognised field [{name}]"), line))
    }

    fn unexpected(&self, token: &JsonToken, line: u64) -> Error {
        self.corruption(format!("Unexpected token {token:?}"), line)
    }

    fn apply_token(&mut self, token: JsonToken, line: u64) -> Result<(), Error> {
        match self.parse_state {
            ParseState::Start => match token {
                JsonToken::StartArray => self.parse_state = ParseState::RowOrEnd,
                other => return Err(self.unexpected(&other, line)),
            },
            ParseState::RowOrEnd => match token {
                JsonToken::StartObject => {
                    self.row_seen.fill(false);
                    self.row_line = line;
                    self.parse_state = ParseState::NameOrEnd;
                }
                JsonToken::EndArray => self.parse_state = ParseState::Done,
                other => return Err(self.unexpected(&other, line)),
            },
            ParseState::NameOrEnd => match token {
                JsonToken::String(name) => {
                    let index = self.field_index(&name, line)?;
                    if self.row_seen[index] {
                        return Err(self.corruption(format!("Duplicate field [{name}]"), line));
                    }
                    self.current_field = Some(index);
                    self.parse_state = ParseState::Colon;
                }
                JsonToken::EndObject => self.end_row()?,
                other => return Err(self.unexpected(&other, line)),
            },
            ParseState::Colon => match token {
                JsonToken::Colon => self.parse_state = ParseState::Value,
                other => return Err(self.unexpected(&other, line)),
            },
            ParseState::Value => {
                let index = self.current_field.take().ok_or_else(|| {
                    Error::internal("JSON decoder lost its field position")
                })?;
                self.append_value(index, token, line)?;
                self.row_seen[index] = true;
                self.parse_state = ParseState::AfterValue;
            }
            ParseState::AfterValue => match token {
                JsonToken::Comma => self.parse_state = ParseState::NameOrEnd,
                JsonToken::EndObject => self.end_row()?,
                other => return Err(self.unexpected(&other, line)),
            },
            ParseState::AfterRow => match token {
                JsonToken::Comma => self.parse_state = ParseState::RowOrEnd,
                JsonToken::EndArray => self.parse_state = ParseState::Done,
                other => return Err(self.unexpected(&other, line)),
            },
            ParseState::Done => return Err(self.unexpected(&token, line)),
        }
        Ok(())
    }

    fn append_value(&mut self, index: usize, token: JsonToken, line: u64) -> Result<(), Error> {
        let field = self.schema.field(index);
        let writer = &mut self.writers[index];
        match token {
            JsonToken::String(text) => writer.append_text(&text, line)?,
            JsonToken::Number(text) => writer.append_text(&text, line)?,
            JsonToken::True => writer.append_bool(true, line)?,
            JsonToken::False => writer.append_bool(false, line)?,
            JsonToken::Null => {
                if !field.is_nullable() {
                    return Err(self.corruption(
                        format!("Null value for non-nullable field {}", field.name()),
                        line,
                    ));
                }
                writer.append_null();
            }
            other @ (JsonToken::StartObject | JsonToken::StartArray) => {
                return Err(self.corruption(
                    format!(
                        "Unexpected token {other:?}, field {} requires a primitive value",
                        field.name()
                    ),
                    line,
                ));
            }
            other => return Err(self.unexpected(&other, line)),
        }
        Ok(())
    }

    fn end_row(&mut self) -> Result<(), Error> {
        for index in 0..self.row_seen.len() {
            if self.row_seen[index] {
                continue;
            }
            let field = self.schema.field(index);
            if !field.is_nullable() {
                return Err(self.corruption(
                    format!("Missing required field {}", field.name()),
                    self.row_line,
                ));
            }
            self.writers[index].append_null();
        }
        self.rows_in_batch += 1;
        self.parse_state = ParseState::AfterRow;
        if self.rows_in_batch >= self.options.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<(), Error> {
        if self.rows_in_batch == 0 {
            return Ok(());
        }
        let columns = self.writers.iter_mut().map(ColumnWriter::finish).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), columns)
            .map_err(|error| Error::internal(format!("Decoded batch is invalid: {error}")))?;
        self.rows_in_batch = 0;
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_batch(batch);
        }
        Ok(())
    }

    fn process_chunk(&mut self, chunk: &Bytes) -> Result<(), Error> {
        let tokens = self.lexer.feed(chunk)?;
        for (token, line) in tokens {
            self.apply_token(token, line)?;
        }
        Ok(())
    }

    fn finish_stream(&mut self) -> Result<(), Error> {
        if self.bytes_consumed == 0 {
            return Err(Error::corruption("Data is empty"));
        }
        self.lexer.finish()?;
        if self.parse_state != ParseState::Done {
            return Err(self.corruption("Unexpected end of stream", self.lexer.line()));
        }
        self.flush_batch()
    }
}

impl Stage for JsonDecoder {
    fn name(&self) -> &'static str {
        "json-decoder"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::BatchStream)
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler);
    }

    fn is_ready(&self) -> bool {
        !self.done
            && self
                .consumer
                .as_ref()
                .is_some_and(|consumer| consumer.borrow().is_ready())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.writers.clear();
        self.done = true;
    }
}

impl Producer for JsonDecoder {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(Error::internal(
                "JSON decoder is already bound to a consumer",
            ));
        }
        match consumer {
            Consumer::Batch(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(Error::internal(format!(
                "JSON decoder produces a batch stream but its consumer expects {}",
                other.interface()
            ))),
        }
    }
}

impl ByteStreamConsumer for JsonDecoder {
    fn on_start(&mut self) {
        if self.done {
            return;
        }
        match self
            .schema
            .fields()
            .iter()
            .map(|field| ColumnWriter::for_field(field))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(writers) => {
                self.writers = writers;
                if let Some(consumer) = self.consumer.clone() {
                    consumer.borrow_mut().on_start(self.schema.clone());
                }
            }
            Err(error) => self.fail(error),
        }
    }

    fn on_next(&mut self, chunk: Bytes) {
        if self.done {
            tracing::warn!(stage = self.name(), "dropping chunk delivered after done");
            return;
        }
        self.bytes_consumed += chunk.len() as u64;
        if let Err(error) = self.process_chunk(&chunk) {
            self.fail(error);
        }
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        match self.finish_stream() {
            Ok(()) => {
                self.done = true;
                if let Some(consumer) = self.consumer.clone() {
                    consumer.borrow_mut().on_complete();
                }
            }
            Err(error) => self.fail(error),
        }
    }

    fn on_error(&mut self, error: Error) {
        self.fail(error);
    }
}

/// Streaming JSON encoder: record batches in, byte chunks out.
pub struct JsonEncoder {
    consumer: Option<Rc<RefCell<dyn ByteStreamConsumer>>>,
    scheduler: Option<PumpHandle>,
    first_row: bool,
    done: bool,
}

impl JsonEncoder {
    /// Creates an encoder.
    #[must_use]
    pub fn new() -> Self {
        JsonEncoder {
            consumer: None,
            scheduler: None,
            first_row: true,
            done: false,
        }
    }

    fn fail(&mut self, error: Error) {
        self.done = true;
        report(self.scheduler.as_ref(), error);
    }

    fn emit(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_next(Bytes::from(bytes));
        }
    }

    fn render_batch(&mut self, batch: &RecordBatch) -> Result<Vec<u8>, Error> {
        let schema = batch.schema();
        let readers = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, column)| ColumnReader::for_column(column, field.name()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::new();
        for row in 0..batch.num_rows() {
            if self.first_row {
                self.first_row = false;
            } else {
                out.extend_from_slice(b",\n");
            }
            out.push(b'{');
            for (index, (field, reader)) in
                schema.fields().iter().zip(readers.iter()).enumerate()
            {
                if index > 0 {
                    out.extend_from_slice(b", ");
                }
                write_json_string(field.name(), &mut out);
                out.extend_from_slice(b": ");
                reader.render_json(row, &mut out);
            }
            out.push(b'}');
        }
        Ok(out)
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        JsonEncoder::new()
    }
}

impl Stage for JsonEncoder {
    fn name(&self) -> &'static str {
        "json-encoder"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::BatchStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler);
    }

    fn is_ready(&self) -> bool {
        !self.done
            && self
                .consumer
                .as_ref()
                .is_some_and(|consumer| consumer.borrow().is_ready())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.done = true;
    }
}

impl Producer for JsonEncoder {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(Error::internal(
                "JSON encoder is already bound to a consumer",
            ));
        }
        match consumer {
            Consumer::ByteStream(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(Error::internal(format!(
                "JSON encoder produces a byte stream but its consumer expects {}",
                other.interface()
            ))),
        }
    }
}

impl BatchConsumer for JsonEncoder {
    fn on_start(&mut self, _schema: SchemaRef) {
        if self.done {
            return;
        }
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_start();
        }
        self.emit(b"[\n".to_vec());
    }

    fn on_batch(&mut self, batch: RecordBatch) {
        if self.done {
            tracing::warn!(stage = self.name(), "dropping batch delivered after done");
            return;
        }
        match self.render_batch(&batch) {
            Ok(bytes) => self.emit(bytes),
            Err(error) => self.fail(error),
        }
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.emit(b"\n]".to_vec());
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_complete();
        }
    }

    fn on_error(&mut self, error: Error) {
        self.fail(error);
    }
}
