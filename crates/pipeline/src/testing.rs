// SPDX-License-Identifier: Apache-2.0

//! Common testing utilities for pipeline components.
//!
//! Provides a single-threaded test runtime plus scripted sources, sinks and
//! reactive endpoints shared by the engine's own tests and by codec and
//! storage tests in dependent crates.

use crate::error::Error;
use crate::pipeline::PumpHandle;
use crate::stage::{
    BatchConsumer, ByteStreamConsumer, Consumer, DataInterface, Producer, SinkStage, SourceStage,
    Stage, already_bound, binding_error,
};
use crate::reactive::{ChunkPublisher, ChunkSubscriber, ChunkSubscription};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use tokio::runtime::Builder;
use tokio::task::LocalSet;

/// Creates a single-threaded runtime with a local task set for driving
/// `!Send` pipelines in tests.
///
/// # Panics
///
/// Panics if the tokio runtime cannot be built.
#[must_use]
pub fn setup_test_runtime() -> (tokio::runtime::Runtime, LocalSet) {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime");
    let local_tasks = LocalSet::new();
    (rt, local_tasks)
}

/// Runs a `!Send` future to completion on a fresh local event loop.
pub fn run_local<F>(future: F) -> F::Output
where
    F: Future,
{
    let (rt, local_tasks) = setup_test_runtime();
    rt.block_on(local_tasks.run_until(future))
}

/// A source stage that emits a scripted list of chunks, one per pump.
pub struct ScriptedSource {
    chunks: VecDeque<Bytes>,
    consumer: Option<Rc<RefCell<dyn ByteStreamConsumer>>>,
    scheduler: Option<PumpHandle>,
    started: bool,
    done: bool,
}

impl ScriptedSource {
    /// Creates a source that will emit the given chunks in order.
    #[must_use]
    pub fn new(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        ScriptedSource {
            chunks: chunks.into_iter().collect(),
            consumer: None,
            scheduler: None,
            started: false,
            done: false,
        }
    }
}

impl Stage for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted-source"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        None
    }

    fn output_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler);
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn pump(&mut self) -> Result<(), Error> {
        if self.done {
            return Ok(());
        }
        let Some(consumer) = self.consumer.clone() else {
            return Ok(());
        };
        if !self.started {
            self.started = true;
            consumer.borrow_mut().on_start();
        }
        if consumer.borrow().is_ready() {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    consumer.borrow_mut().on_next(chunk);
                    // More data on hand: ask for another cycle.
                    if let Some(scheduler) = &self.scheduler {
                        scheduler.pump_data();
                    }
                }
                None => {
                    self.done = true;
                    consumer.borrow_mut().on_complete();
                }
            }
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.chunks.clear();
        self.done = true;
    }
}

impl Producer for ScriptedSource {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(already_bound(self.name()));
        }
        match consumer {
            Consumer::ByteStream(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(binding_error(
                self.name(),
                DataInterface::ByteStream,
                other.interface(),
            )),
        }
    }
}

impl SourceStage for ScriptedSource {
    fn cancel(&mut self) {
        self.chunks.clear();
        self.done = true;
    }
}

/// A source stage that emits a schema followed by scripted record batches.
pub struct ScriptedBatchSource {
    schema: SchemaRef,
    batches: VecDeque<RecordBatch>,
    consumer: Option<Rc<RefCell<dyn BatchConsumer>>>,
    scheduler: Option<PumpHandle>,
    started: bool,
    done: bool,
}

impl ScriptedBatchSource {
    /// Creates a source for the given schema and batches.
    #[must_use]
    pub fn new(schema: SchemaRef, batches: impl IntoIterator<Item = RecordBatch>) -> Self {
        ScriptedBatchSource {
            schema,
            batches: batches.into_iter().collect(),
            consumer: None,
            scheduler: None,
            started: false,
            done: false,
        }
    }
}

impl Stage for ScriptedBatchSource {
    fn name(&self) -> &'static str {
        "scripted-batch-source"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        None
    }

    fn output_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::BatchStream)
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler);
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn pump(&mut self) -> Result<(), Error> {
        if self.done {
            return Ok(());
        }
        let Some(consumer) = self.consumer.clone() else {
            return Ok(());
        };
        if !self.started {
            self.started = true;
            consumer.borrow_mut().on_start(self.schema.clone());
        }
        if consumer.borrow().is_ready() {
            match self.batches.pop_front() {
                Some(batch) => {
                    consumer.borrow_mut().on_batch(batch);
                    if let Some(scheduler) = &self.scheduler {
                        scheduler.pump_data();
                    }
                }
                None => {
                    self.done = true;
                    consumer.borrow_mut().on_complete();
                }
            }
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.batches.clear();
        self.done = true;
    }
}

impl Producer for ScriptedBatchSource {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(already_bound(self.name()));
        }
        match consumer {
            Consumer::Batch(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(binding_error(
                self.name(),
                DataInterface::BatchStream,
                other.interface(),
            )),
        }
    }
}

impl SourceStage for ScriptedBatchSource {
    fn cancel(&mut self) {
        self.batches.clear();
        self.done = true;
    }
}

/// A byte-stream sink collecting everything it receives.
pub struct CollectSink {
    collected: Rc<RefCell<Vec<u8>>>,
    error: Rc<RefCell<Option<Error>>>,
    scheduler: Option<PumpHandle>,
    terminal_sent: bool,
    done: bool,
}

impl CollectSink {
    /// Creates a sink writing into the shared byte vector.
    #[must_use]
    pub fn new(collected: Rc<RefCell<Vec<u8>>>, error: Rc<RefCell<Option<Error>>>) -> Self {
        CollectSink {
            collected,
            error,
            scheduler: None,
            terminal_sent: false,
            done: false,
        }
    }
}

impl Stage for CollectSink {
    fn name(&self) -> &'static str {
        "collect-sink"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        None
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler);
    }

    fn is_ready(&self) -> bool {
        !self.done
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.done = true;
    }
}

impl ByteStreamConsumer for CollectSink {
    fn on_start(&mut self) {}

    fn on_next(&mut self, chunk: Bytes) {
        if self.done {
            return;
        }
        self.collected.borrow_mut().extend_from_slice(&chunk);
    }

    fn on_complete(&mut self) {
        if self.terminal_sent {
            return;
        }
        self.terminal_sent = true;
        self.done = true;
        if let Some(scheduler) = &self.scheduler {
            scheduler.report_complete();
        }
    }

    fn on_error(&mut self, error: Error) {
        if let Some(scheduler) = &self.scheduler {
            if error.is_regular() {
                scheduler.report_regular_error(error);
            } else {
                scheduler.report_unhandled_error(error);
            }
        }
    }
}

impl SinkStage for CollectSink {
    fn terminate(&mut self, error: Error) {
        if self.terminal_sent {
            return;
        }
        self.terminal_sent = true;
        self.done = true;
        *self.error.borrow_mut() = Some(error);
    }
}

/// A batch sink collecting the schema and every batch it receives.
pub struct BatchCollectSink {
    schema: Rc<RefCell<Option<SchemaRef>>>,
    batches: Rc<RefCell<Vec<RecordBatch>>>,
    error: Rc<RefCell<Option<Error>>>,
    scheduler: Option<PumpHandle>,
    terminal_sent: bool,
    done: bool,
}

impl BatchCollectSink {
    /// Creates a sink writing into the shared recorders.
    #[must_use]
    pub fn new(
        schema: Rc<RefCell<Option<SchemaRef>>>,
        batches: Rc<RefCell<Vec<RecordBatch>>>,
        error: Rc<RefCell<Option<Error>>>,
    ) -> Self {
        BatchCollectSink {
            schema,
            batches,
            error,
            scheduler: None,
            terminal_sent: false,
            done: false,
        }
    }
}

impl Stage for BatchCollectSink {
    fn name(&self) -> &'static str {
        "batch-collect-sink"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::BatchStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        None
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler);
    }

    fn is_ready(&self) -> bool {
        !self.done
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.done = true;
    }
}

impl BatchConsumer for BatchCollectSink {
    fn on_start(&mut self, schema: SchemaRef) {
        *self.schema.borrow_mut() = Some(schema);
    }

    fn on_batch(&mut self, batch: RecordBatch) {
        if self.done {
            return;
        }
        self.batches.borrow_mut().push(batch);
    }

    fn on_complete(&mut self) {
        if self.terminal_sent {
            return;
        }
        self.terminal_sent = true;
        self.done = true;
        if let Some(scheduler) = &self.scheduler {
            scheduler.report_complete();
        }
    }

    fn on_error(&mut self, error: Error) {
        if let Some(scheduler) = &self.scheduler {
            if error.is_regular() {
                scheduler.report_regular_error(error);
            } else {
                scheduler.report_unhandled_error(error);
            }
        }
    }
}

impl SinkStage for BatchCollectSink {
    fn terminate(&mut self, error: Error) {
        if self.terminal_sent {
            return;
        }
        self.terminal_sent = true;
        self.done = true;
        *self.error.borrow_mut() = Some(error);
    }
}

/// A byte sink that drains only against externally granted credits,
/// simulating a consumer slower than the producer. The test driving the
/// pipeline grants credits (one per consumption interval) and calls
/// [`PumpHandle::pump_data`], exactly like demand signals from a real
/// request-based transport.
pub struct ThrottledSink {
    delegate: CollectSink,
    credits: Rc<Cell<usize>>,
}

impl ThrottledSink {
    /// Creates a throttled sink draining one chunk per credit.
    #[must_use]
    pub fn new(
        collected: Rc<RefCell<Vec<u8>>>,
        error: Rc<RefCell<Option<Error>>>,
        credits: Rc<Cell<usize>>,
    ) -> Self {
        ThrottledSink {
            delegate: CollectSink::new(collected, error),
            credits,
        }
    }
}

impl Stage for ThrottledSink {
    fn name(&self) -> &'static str {
        "throttled-sink"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        None
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.delegate.connect(scheduler);
    }

    fn is_ready(&self) -> bool {
        self.delegate.is_ready() && self.credits.get() > 0
    }

    fn is_done(&self) -> bool {
        self.delegate.is_done()
    }

    fn close(&mut self) {
        self.delegate.close();
    }
}

impl ByteStreamConsumer for ThrottledSink {
    fn on_start(&mut self) {
        self.delegate.on_start();
    }

    fn on_next(&mut self, chunk: Bytes) {
        self.credits.set(self.credits.get().saturating_sub(1));
        self.delegate.on_next(chunk);
    }

    fn on_complete(&mut self) {
        self.delegate.on_complete();
    }

    fn on_error(&mut self, error: Error) {
        self.delegate.on_error(error);
    }
}

impl SinkStage for ThrottledSink {
    fn terminate(&mut self, error: Error) {
        self.delegate.terminate(error);
    }
}

/// State shared between a [`ScriptedPublisher`] and its subscription.
struct PublisherState {
    chunks: VecDeque<Bytes>,
    subscriber: Rc<RefCell<dyn ChunkSubscriber>>,
    requests: Rc<RefCell<Vec<usize>>>,
    cancelled: Rc<Cell<bool>>,
    completed: bool,
}

struct ScriptedSubscription {
    state: Rc<RefCell<PublisherState>>,
}

impl ChunkSubscription for ScriptedSubscription {
    fn request(&mut self, n: usize) {
        self.state.borrow().requests.borrow_mut().push(n);
        // Deliver outside the state borrow; on_next may re-enter.
        let mut remaining = n;
        while remaining > 0 {
            let chunk = {
                let mut state = self.state.borrow_mut();
                if state.completed || state.cancelled.get() {
                    return;
                }
                state.chunks.pop_front()
            };
            match chunk {
                Some(chunk) => {
                    let subscriber = self.state.borrow().subscriber.clone();
                    subscriber.borrow_mut().on_next(chunk);
                    remaining -= 1;
                }
                None => {
                    let subscriber = {
                        let mut state = self.state.borrow_mut();
                        state.completed = true;
                        state.subscriber.clone()
                    };
                    subscriber.borrow_mut().on_complete();
                    return;
                }
            }
        }
    }

    fn cancel(&mut self) {
        self.state.borrow().cancelled.set(true);
    }
}

/// A publisher that synchronously serves a scripted chunk list against
/// demand, recording every request it receives.
pub struct ScriptedPublisher {
    chunks: Vec<Bytes>,
    /// Requests received, in order.
    pub requests: Rc<RefCell<Vec<usize>>>,
    /// Set once the subscription is cancelled.
    pub cancelled: Rc<Cell<bool>>,
}

impl ScriptedPublisher {
    /// Creates a publisher serving the given chunks.
    #[must_use]
    pub fn new(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        ScriptedPublisher {
            chunks: chunks.into_iter().collect(),
            requests: Rc::new(RefCell::new(Vec::new())),
            cancelled: Rc::new(Cell::new(false)),
        }
    }
}

impl ChunkPublisher for ScriptedPublisher {
    fn subscribe(self: Box<Self>, subscriber: Rc<RefCell<dyn ChunkSubscriber>>) {
        let state = Rc::new(RefCell::new(PublisherState {
            chunks: self.chunks.into(),
            subscriber: subscriber.clone(),
            requests: self.requests,
            cancelled: self.cancelled,
            completed: false,
        }));
        subscriber
            .borrow_mut()
            .on_subscribe(Box::new(ScriptedSubscription { state }));
    }
}

/// A subscriber recording everything it receives, with scripted demand.
pub struct RecordingSubscriber {
    subscription: Option<Box<dyn ChunkSubscription>>,
    /// Chunks received, in order.
    pub received: Rc<RefCell<Vec<Bytes>>>,
    /// Set when the stream completes.
    pub completed: Rc<Cell<bool>>,
    /// The terminal error, if any.
    pub error: Rc<RefCell<Option<Error>>>,
    request_on_subscribe: usize,
    request_per_chunk: usize,
}

impl RecordingSubscriber {
    /// Creates a subscriber that requests `initial` chunks up front and
    /// `per_chunk` more after each delivery.
    #[must_use]
    pub fn new(initial: usize, per_chunk: usize) -> Self {
        RecordingSubscriber {
            subscription: None,
            received: Rc::new(RefCell::new(Vec::new())),
            completed: Rc::new(Cell::new(false)),
            error: Rc::new(RefCell::new(None)),
            request_on_subscribe: initial,
            request_per_chunk: per_chunk,
        }
    }

    /// Cancels the subscription, if one was received.
    pub fn cancel(&mut self) {
        if let Some(subscription) = &mut self.subscription {
            subscription.cancel();
        }
    }
}

impl ChunkSubscriber for RecordingSubscriber {
    fn on_subscribe(&mut self, mut subscription: Box<dyn ChunkSubscription>) {
        if self.request_on_subscribe > 0 {
            subscription.request(self.request_on_subscribe);
        }
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, chunk: Bytes) {
        self.received.borrow_mut().push(chunk);
        if self.request_per_chunk > 0 {
            if let Some(subscription) = &mut self.subscription {
                subscription.request(self.request_per_chunk);
            }
        }
    }

    fn on_complete(&mut self) {
        self.completed.set(true);
    }

    fn on_error(&mut self, error: Error) {
        *self.error.borrow_mut() = Some(error);
    }
}
