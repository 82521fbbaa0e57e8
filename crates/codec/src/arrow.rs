// SPDX-License-Identifier: Apache-2.0

//! Arrow IPC stream codec.
//!
//! The binary columnar format. Decoding needs random access into the
//! framed stream, so the decoder consumes the buffer-list interface; the
//! assembler inserts a buffering stage automatically when the upstream is
//! a plain byte stream. Encoding streams incrementally, one IPC message
//! per batch.

use crate::report;
use arrow_array::RecordBatch;
use arrow_ipc::reader::StreamReader;
use arrow_ipc::writer::StreamWriter;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;
use strata_pipeline::Error;
use strata_pipeline::pipeline::PumpHandle;
use strata_pipeline::stage::{
    BatchConsumer, BufferListConsumer, ByteStreamConsumer, Consumer, DataInterface, Producer,
    Stage,
};

/// Arrow IPC decoder: buffered stream in, record batches out.
pub struct ArrowDecoder {
    consumer: Option<Rc<RefCell<dyn BatchConsumer>>>,
    scheduler: Option<PumpHandle>,
    done: bool,
}

impl ArrowDecoder {
    /// Creates a decoder.
    #[must_use]
    pub fn new() -> Self {
        ArrowDecoder {
            consumer: None,
            scheduler: None,
            done: false,
        }
    }

    fn fail(&mut self, error: Error) {
        self.done = true;
        report(self.scheduler.as_ref(), error);
    }

    fn decode(&mut self, buffers: Vec<Bytes>) -> Result<(), Error> {
        let total: usize = buffers.iter().map(Bytes::len).sum();
        if total == 0 {
            return Err(Error::corruption("Data is empty"));
        }

        let mut data = Vec::with_capacity(total);
        for buffer in buffers {
            data.extend_from_slice(&buffer);
        }

        let reader = StreamReader::try_new(Cursor::new(data), None)
            .map_err(|error| Error::corruption(format!("Invalid Arrow stream: {error}")))?;

        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_start(reader.schema());
            for batch in reader {
                let batch = batch.map_err(|error| {
                    Error::corruption(format!("Invalid Arrow stream: {error}"))
                })?;
                consumer.borrow_mut().on_batch(batch);
            }
            consumer.borrow_mut().on_complete();
        }
        Ok(())
    }
}

impl Default for ArrowDecoder {
    fn default() -> Self {
        ArrowDecoder::new()
    }
}

impl Stage for ArrowDecoder {
    fn name(&self) -> &'static str {
        "arrow-decoder"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::BufferList)
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
        self.done = true;
    }
}

impl Producer for ArrowDecoder {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(Error::internal(
                "Arrow decoder is already bound to a consumer",
            ));
        }
        match consumer {
            Consumer::Batch(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(Error::internal(format!(
                "Arrow decoder produces a batch stream but its consumer expects {}",
                other.interface()
            ))),
        }
    }
}

impl BufferListConsumer for ArrowDecoder {
    fn on_buffer(&mut self, buffers: Vec<Bytes>) {
        if self.done {
            tracing::warn!(stage = self.name(), "dropping buffers delivered after done");
            return;
        }
        match self.decode(buffers) {
            Ok(()) => self.done = true,
            Err(error) => self.fail(error),
        }
    }

    fn on_error(&mut self, error: Error) {
        self.fail(error);
    }
}

/// Write target that drains into byte chunks between IPC messages.
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Arrow IPC encoder: record batches in, byte chunks out.
pub struct ArrowEncoder {
    writer: Option<StreamWriter<SharedBuf>>,
    buffer: Rc<RefCell<Vec<u8>>>,
    consumer: Option<Rc<RefCell<dyn ByteStreamConsumer>>>,
    scheduler: Option<PumpHandle>,
    done: bool,
}

impl ArrowEncoder {
    /// Creates an encoder.
    #[must_use]
    pub fn new() -> Self {
        ArrowEncoder {
            writer: None,
            buffer: Rc::new(RefCell::new(Vec::new())),
            consumer: None,
            scheduler: None,
            done: false,
        }
    }

    fn fail(&mut self, error: Error) {
        self.done = true;
        self.writer = None;
        report(self.scheduler.as_ref(), error);
    }

    fn drain(&mut self) {
        let bytes = std::mem::take(&mut *self.buffer.borrow_mut());
        if bytes.is_empty() {
            return;
        }
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_next(Bytes::from(bytes));
        }
    }
}

impl Default for ArrowEncoder {
    fn default() -> Self {
        ArrowEncoder::new()
    }
}

impl Stage for ArrowEncoder {
    fn name(&self) -> &'static str {
        "arrow-encoder"
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
        self.writer = None;
        self.done = true;
    }
}

impl Producer for ArrowEncoder {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(Error::internal(
                "Arrow encoder is already bound to a consumer",
            ));
        }
        match consumer {
            Consumer::ByteStream(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(Error::internal(format!(
                "Arrow encoder produces a byte stream but its consumer expects {}",
                other.interface()
            ))),
        }
    }
}

impl BatchConsumer for ArrowEncoder {
    fn on_start(&mut self, schema: SchemaRef) {
        if self.done {
            return;
        }
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_start();
        }
        match StreamWriter::try_new(SharedBuf(self.buffer.clone()), &schema) {
            Ok(writer) => {
                self.writer = Some(writer);
                self.drain();
            }
            Err(error) => {
                self.fail(Error::internal(format!(
                    "Arrow stream writer failed to open: {error}"
                )));
            }
        }
    }

    fn on_batch(&mut self, batch: RecordBatch) {
        if self.done {
            tracing::warn!(stage = self.name(), "dropping batch delivered after done");
            return;
        }
        let result = match &mut self.writer {
            Some(writer) => writer.write(&batch),
            None => {
                self.fail(Error::internal("Arrow encoder received a batch before its schema"));
                return;
            }
        };
        match result {
            Ok(()) => self.drain(),
            Err(error) => self.fail(Error::corruption(format!(
                "Arrow encoding failed: {error}"
            ))),
        }
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        let result = match &mut self.writer {
            Some(writer) => writer.finish(),
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                self.done = true;
                self.drain();
                if let Some(consumer) = self.consumer.clone() {
                    consumer.borrow_mut().on_complete();
                }
            }
            Err(error) => self.fail(Error::corruption(format!(
                "Arrow encoding failed: {error}"
            ))),
        }
    }

    fn on_error(&mut self, error: Error) {
        self.fail(error);
    }
}
