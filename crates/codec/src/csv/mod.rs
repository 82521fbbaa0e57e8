// SPDX-License-Identifier: Apache-2.0

//! Streaming CSV codec.
//!
//! The decoder consumes byte chunks, lexes them incrementally and fills
//! column builders per the target schema, emitting a record batch whenever
//! the configured row count accumulates. Columns map to schema fields by
//! position. Empty cells decode to null for every type; for string columns
//! a quoted empty token (raw width > 1) decodes to the empty string
//! instead, so empty-vs-null survives a round trip.
//!
//! The encoder mirrors the decoder: one line per row, RFC-4180 quoting,
//! nulls as empty cells and empty strings as `""`.

pub mod lexer;

use crate::column::{ColumnReader, ColumnWriter};
use crate::config::CodecOptions;
use crate::report;
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use lexer::{CsvLexer, CsvRecord};
use std::cell::RefCell;
use std::rc::Rc;
use strata_pipeline::Error;
use strata_pipeline::pipeline::PumpHandle;
use strata_pipeline::stage::{
    BatchConsumer, ByteStreamConsumer, Consumer, DataInterface, Producer, Stage,
};

/// Streaming CSV decoder: byte stream in, record batches out.
pub struct CsvDecoder {
    schema: SchemaRef,
    options: CodecOptions,
    lexer: CsvLexer,
    writers: Vec<ColumnWriter>,
    consumer: Option<Rc<RefCell<dyn BatchConsumer>>>,
    scheduler: Option<PumpHandle>,
    header_pending: bool,
    rows_in_batch: usize,
    bytes_consumed: u64,
    done: bool,
}

impl CsvDecoder {
    /// Creates a decoder for the given arrow schema.
    #[must_use]
    pub fn new(schema: SchemaRef, options: CodecOptions) -> Self {
        let header_pending = options.csv_header;
        CsvDecoder {
            schema,
            options,
            lexer: CsvLexer::new(),
            writers: Vec::new(),
            consumer: None,
            scheduler: None,
            header_pending,
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

    fn decode_record(&mut self, record: &CsvRecord) -> Result<(), Error> {
        if record.fields.len() != self.schema.fields().len() {
            return Err(Error::DataCorruption {
                message: format!(
                    "Wrong number of fields, expected {} but got {}",
                    self.schema.fields().len(),
                    record.fields.len()
                ),
                line: Some(record.line),
                column: None,
            });
        }

        for (index, token) in record.fields.iter().enumerate() {
            let field = self.schema.field(index);
            let writer = &mut self.writers[index];

            if token.text.is_empty() {
                // Quoted empty (width > 1) is the empty string for string
                // columns; anything narrower is null for every type.
                let is_string = matches!(writer, ColumnWriter::String(_));
                if is_string && token.width > 1 {
                    writer.append_text("", record.line)?;
                } else {
                    if !field.is_nullable() {
                        return Err(Error::DataCorruption {
                            message: format!(
                                "Null value for non-nullable field {}",
                                field.name()
                            ),
                            line: Some(record.line),
                            column: None,
                        });
                    }
                    writer.append_null();
                }
            } else {
                writer.append_text(&token.text, record.line)?;
            }
        }

        self.rows_in_batch += 1;
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
        let records = self.lexer.feed(chunk)?;
        for record in records {
            if self.header_pending {
                self.header_pending = false;
                continue;
            }
            self.decode_record(&record)?;
        }
        Ok(())
    }

    fn finish_stream(&mut self) -> Result<(), Error> {
        if self.bytes_consumed == 0 {
            return Err(Error::corruption("Data is empty"));
        }
        if let Some(record) = self.lexer.finish()? {
            if self.header_pending {
                self.header_pending = false;
            } else {
                self.decode_record(&record)?;
            }
        }
        self.flush_batch()
    }
}

impl Stage for CsvDecoder {
    fn name(&self) -> &'static str {
        "csv-decoder"
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

impl Producer for CsvDecoder {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(Error::internal("CSV decoder is already bound to a consumer"));
        }
        match consumer {
            Consumer::Batch(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(Error::internal(format!(
                "CSV decoder produces a batch stream but its consumer expects {}",
                other.interface()
            ))),
        }
    }
}

impl ByteStreamConsumer for CsvDecoder {
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

/// Streaming CSV encoder: record batches in, byte chunks out.
pub struct CsvEncoder {
    options: CodecOptions,
    schema: Option<SchemaRef>,
    consumer: Option<Rc<RefCell<dyn ByteStreamConsumer>>>,
    scheduler: Option<PumpHandle>,
    done: bool,
}

impl CsvEncoder {
    /// Creates an encoder with the given options.
    #[must_use]
    pub fn new(options: CodecOptions) -> Self {
        CsvEncoder {
            options,
            schema: None,
            consumer: None,
            scheduler: None,
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
            for (index, reader) in readers.iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                render_csv_value(reader, row, &mut out);
            }
            out.push(b'\n');
        }
        Ok(out)
    }
}

fn render_csv_value(reader: &ColumnReader, row: usize, out: &mut Vec<u8>) {
    if reader.is_null(row) {
        return;
    }
    if let Some(text) = reader.string_value(row) {
        let needs_quotes =
            text.is_empty() || text.bytes().any(|byte| matches!(byte, b',' | b'"' | b'\n' | b'\r'));
        if needs_quotes {
            out.push(b'"');
            for byte in text.bytes() {
                if byte == b'"' {
                    out.push(b'"');
                }
                out.push(byte);
            }
            out.push(b'"');
        } else {
            out.extend_from_slice(text.as_bytes());
        }
        return;
    }
    reader.render_csv_plain(row, out);
}

impl Stage for CsvEncoder {
    fn name(&self) -> &'static str {
        "csv-encoder"
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

impl Producer for CsvEncoder {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(Error::internal("CSV encoder is already bound to a consumer"));
        }
        match consumer {
            Consumer::ByteStream(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(Error::internal(format!(
                "CSV encoder produces a byte stream but its consumer expects {}",
                other.interface()
            ))),
        }
    }
}

impl BatchConsumer for CsvEncoder {
    fn on_start(&mut self, schema: SchemaRef) {
        if self.done {
            return;
        }
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_start();
        }
        if self.options.csv_header {
            let mut header = Vec::new();
            for (index, field) in schema.fields().iter().enumerate() {
                if index > 0 {
                    header.push(b',');
                }
                header.extend_from_slice(field.name().as_bytes());
            }
            header.push(b'\n');
            self.emit(header);
        }
        self.schema = Some(schema);
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
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_complete();
        }
    }

    fn on_error(&mut self, error: Error) {
        self.fail(error);
    }
}
