// SPDX-License-Identifier: Apache-2.0

//! The stage protocol.
//!
//! A pipeline is an ordered list of stages: one source, zero or more
//! transforms, one sink. Stages exchange data over three interfaces — raw
//! byte chunks, fully buffered chunk lists, and columnar record batches —
//! and every producer binds exactly one consumer of a matching interface.
//!
//! Everything here is `!Send` by design: a stage belongs to a single
//! pipeline bound to a single event loop, and all callbacks run there. A
//! chunk or batch that reaches a consumer is owned by it from that point;
//! the transfer is a move, so releasing on error paths is dropping.

use crate::error::Error;
use crate::pipeline::PumpHandle;
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The data interface a stage consumes or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataInterface {
    /// Raw reference-counted byte chunks, delivered in order.
    ByteStream,
    /// The whole stream as one list of chunks, for consumers that need
    /// random access.
    BufferList,
    /// Columnar record batches, opened by a schema message.
    BatchStream,
}

impl fmt::Display for DataInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataInterface::ByteStream => "byte-stream",
            DataInterface::BufferList => "buffer-list",
            DataInterface::BatchStream => "batch-stream",
        };
        write!(f, "{label}")
    }
}

/// Common protocol for every pipeline stage.
///
/// `pump` does a bounded amount of work and returns; a stage that has more
/// to do requests another tick through [`PumpHandle::pump_data`]. All
/// methods run on the pipeline's event loop.
pub trait Stage {
    /// Short stage name for diagnostics.
    fn name(&self) -> &'static str;

    /// The interface this stage consumes; `None` for sources.
    fn data_interface(&self) -> Option<DataInterface>;

    /// The interface this stage produces; `None` for sinks.
    fn output_interface(&self) -> Option<DataInterface>;

    /// Hands the stage its scheduler handle; called once before the first
    /// pump cycle.
    fn connect(&mut self, scheduler: PumpHandle);

    /// True iff the stage can accept another unit from its upstream now.
    fn is_ready(&self) -> bool;

    /// Does a bounded amount of work; may emit to the bound consumer.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] to fail the pipeline; regular error kinds take
    /// the ordinary failure path, anything else is treated as an internal
    /// fault.
    fn pump(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// True once the stage will neither accept nor produce anything more.
    fn is_done(&self) -> bool;

    /// Releases owned resources; idempotent, never fails.
    fn close(&mut self);
}

/// Consumer of a byte-chunk stream.
pub trait ByteStreamConsumer: Stage {
    /// Signals the start of the stream.
    fn on_start(&mut self);

    /// Delivers one chunk; ownership transfers to the consumer.
    fn on_next(&mut self, chunk: Bytes);

    /// Signals a successful end of stream.
    fn on_complete(&mut self);

    /// Signals upstream failure; the consumer releases anything queued.
    fn on_error(&mut self, error: Error);
}

/// Consumer of a fully buffered stream.
pub trait BufferListConsumer: Stage {
    /// Delivers the entire stream at once; ownership transfers.
    fn on_buffer(&mut self, buffers: Vec<Bytes>);

    /// Signals upstream failure.
    fn on_error(&mut self, error: Error);
}

/// Consumer of a record-batch stream.
pub trait BatchConsumer: Stage {
    /// Opens the stream with its schema.
    fn on_start(&mut self, schema: SchemaRef);

    /// Delivers one batch; ownership transfers to the consumer.
    fn on_batch(&mut self, batch: RecordBatch);

    /// Signals a successful end of stream.
    fn on_complete(&mut self);

    /// Signals upstream failure.
    fn on_error(&mut self, error: Error);
}

/// A bound consumer, tagged by the interface it accepts.
#[derive(Clone)]
pub enum Consumer {
    /// A byte-stream consumer.
    ByteStream(Rc<RefCell<dyn ByteStreamConsumer>>),
    /// A buffer-list consumer.
    BufferList(Rc<RefCell<dyn BufferListConsumer>>),
    /// A batch-stream consumer.
    Batch(Rc<RefCell<dyn BatchConsumer>>),
}

impl Consumer {
    /// The interface this consumer accepts.
    #[must_use]
    pub fn interface(&self) -> DataInterface {
        match self {
            Consumer::ByteStream(_) => DataInterface::ByteStream,
            Consumer::BufferList(_) => DataInterface::BufferList,
            Consumer::Batch(_) => DataInterface::BatchStream,
        }
    }

    /// Whether the consumer can accept another unit right now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match self {
            Consumer::ByteStream(consumer) => consumer.borrow().is_ready(),
            Consumer::BufferList(consumer) => consumer.borrow().is_ready(),
            Consumer::Batch(consumer) => consumer.borrow().is_ready(),
        }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Consumer({})", self.interface())
    }
}

/// A stage that produces into a downstream consumer.
pub trait Producer {
    /// Binds the single downstream consumer.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a consumer is already bound or the
    /// consumer's interface does not match this producer's output.
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error>;
}

/// A source stage: feeds the pipeline from outside.
pub trait SourceStage: Stage + Producer {
    /// Stops producing; called when the pipeline terminates early.
    fn cancel(&mut self);
}

/// A sink stage: delivers the pipeline's output to the outside.
pub trait SinkStage: Stage {
    /// Terminates the sink with an error; the external party is signalled
    /// exactly once across `on_complete` and `terminate`.
    fn terminate(&mut self, error: Error);
}

/// A transform stage: consumes from upstream, produces downstream.
pub trait TransformStage: Stage + Producer {}

impl<T> TransformStage for T where T: Stage + Producer {}

/// Checks a producer/consumer interface pair, used during assembly.
pub(crate) fn binding_error(
    stage: &'static str,
    expected: DataInterface,
    actual: DataInterface,
) -> Error {
    Error::internal(format!(
        "Stage {stage} produces a {expected} but its consumer expects a {actual}"
    ))
}

/// The standard double-bind error for producers.
pub(crate) fn already_bound(stage: &'static str) -> Error {
    Error::internal(format!("Stage {stage} is already bound to a consumer"))
}
