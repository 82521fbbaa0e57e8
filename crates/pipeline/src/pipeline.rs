// SPDX-License-Identifier: Apache-2.0

//! The pipeline coordinator.
//!
//! A pipeline owns an ordered list of stages and drives them with pump
//! cycles on a single event loop. Each cycle walks from the sink toward the
//! source, pumping every stage whose consumer is ready; stages request
//! further cycles through their [`PumpHandle`] when new work arrives.
//!
//! Terminal transitions (completion, failure, cancellation) are recorded as
//! a pending event and applied between cycles, never from inside a stage
//! callback, so shutdown cannot re-enter a stage that is still on the call
//! stack. Every stage receives exactly one `close`, the completion future
//! resolves exactly once, and the sink sees exactly one of
//! complete / terminate.

use crate::error::{Error, PipelineState};
use crate::stage::{
    BufferListConsumer, ByteStreamConsumer, Consumer, DataInterface, Producer, SinkStage,
    SourceStage, Stage, TransformStage, binding_error,
};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tokio::sync::{Notify, oneshot};

/// A terminal event recorded by a stage or an external caller.
#[derive(Debug)]
enum TerminalEvent {
    Complete,
    Failed(Error),
    Cancelled(Error),
}

struct PipelineCore {
    stages: RefCell<Vec<Rc<RefCell<dyn Stage>>>>,
    source: RefCell<Option<Rc<RefCell<dyn SourceStage>>>>,
    sink: RefCell<Option<Rc<RefCell<dyn SinkStage>>>>,
    state: Cell<PipelineState>,
    pending: RefCell<Option<TerminalEvent>>,
    rescheduled: Cell<bool>,
    notify: Notify,
    completion: RefCell<Option<oneshot::Sender<Result<(), Error>>>>,
}

impl PipelineCore {
    fn pump_data(&self) {
        // One reschedule per tick; the flag is cleared when a cycle starts.
        if !self.rescheduled.replace(true) {
            self.notify.notify_one();
        }
    }

    fn record_terminal(&self, event: TerminalEvent) {
        if self.state.get().is_terminal() {
            return;
        }
        let mut pending = self.pending.borrow_mut();
        if pending.is_none() {
            *pending = Some(event);
            drop(pending);
            self.notify.notify_one();
        }
    }

    fn report_complete(&self) {
        self.record_terminal(TerminalEvent::Complete);
    }

    fn report_regular_error(&self, error: Error) {
        self.record_terminal(TerminalEvent::Failed(error));
    }

    fn report_unhandled_error(&self, error: Error) {
        let wrapped = match error {
            internal @ Error::Internal { .. } => internal,
            other => Error::internal(format!("Unhandled error in data pipeline: {other}")),
        };
        self.record_terminal(TerminalEvent::Failed(wrapped));
    }

    fn request_cancel(&self) {
        self.record_terminal(TerminalEvent::Cancelled(Error::cancelled()));
    }

    /// One pump cycle: sink toward source, carrying the readiness bit.
    fn pump_cycle(&self) {
        if self.state.get().is_terminal() || self.pending.borrow().is_some() {
            return;
        }
        self.rescheduled.set(false);

        let stages: Vec<Rc<RefCell<dyn Stage>>> = self.stages.borrow().clone();
        let mut consumer_ready = true;
        for stage in stages.iter().rev() {
            if stage.borrow().is_done() {
                continue;
            }
            if consumer_ready {
                let result = stage.borrow_mut().pump();
                if let Err(error) = result {
                    if error.is_regular() {
                        self.report_regular_error(error);
                    } else {
                        self.report_unhandled_error(error);
                    }
                    return;
                }
            }
            consumer_ready = stage.borrow().is_ready();
            if self.pending.borrow().is_some() {
                return;
            }
        }
    }

    /// Applies a terminal event: resolve the completion future, cancel the
    /// source, settle the sink, close every stage.
    fn shutdown(&self, event: TerminalEvent) {
        let (state, result) = match event {
            TerminalEvent::Complete => (PipelineState::Complete, Ok(())),
            TerminalEvent::Failed(error) => (PipelineState::Failed, Err(error)),
            TerminalEvent::Cancelled(error) => (PipelineState::Cancelled, Err(error)),
        };
        self.state.set(state);
        tracing::debug!(%state, "data pipeline shutting down");

        if let Some(source) = self.source.borrow_mut().take() {
            let mut source = source.borrow_mut();
            if !source.is_done() {
                source.cancel();
            }
        }

        if let Some(sink) = self.sink.borrow_mut().take() {
            let mut sink = sink.borrow_mut();
            match &result {
                Ok(()) => {
                    if !sink.is_done() {
                        sink.terminate(Error::internal(
                            "Data pipeline reported completion before the sink finished",
                        ));
                    }
                }
                Err(error) => sink.terminate(error.clone()),
            }
        }

        for stage in self.stages.borrow().iter() {
            stage.borrow_mut().close();
        }
        self.stages.borrow_mut().clear();

        if let Some(sender) = self.completion.borrow_mut().take() {
            let _ = sender.send(result);
        }
        self.notify.notify_one();
    }

    fn take_pending(&self) -> Option<TerminalEvent> {
        self.pending.borrow_mut().take()
    }
}

/// Scheduler handle held by stages and external callers.
///
/// Handles are weak: once the pipeline has shut down, calls are no-ops, so
/// late callbacks from external transports cannot resurrect a dead
/// pipeline.
#[derive(Clone)]
pub struct PumpHandle {
    core: Weak<PipelineCore>,
}

impl PumpHandle {
    /// Requests another pump cycle; idempotent within a tick.
    pub fn pump_data(&self) {
        if let Some(core) = self.core.upgrade() {
            core.pump_data();
        }
    }

    /// Reports that the sink has fully delivered the stream.
    pub fn report_complete(&self) {
        if let Some(core) = self.core.upgrade() {
            core.report_complete();
        }
    }

    /// Reports an expected error kind; fails the pipeline.
    pub fn report_regular_error(&self, error: Error) {
        if let Some(core) = self.core.upgrade() {
            core.report_regular_error(error);
        }
    }

    /// Reports an invariant violation; wrapped as an internal error.
    pub fn report_unhandled_error(&self, error: Error) {
        if let Some(core) = self.core.upgrade() {
            core.report_unhandled_error(error);
        }
    }

    /// Cancels the pipeline with the public cancellation error.
    pub fn request_cancel(&self) {
        if let Some(core) = self.core.upgrade() {
            core.request_cancel();
        }
    }
}

/// Handle for registering a source stage with the assembler.
pub struct SourceHandle {
    stage: Rc<RefCell<dyn Stage>>,
    source: Rc<RefCell<dyn SourceStage>>,
}

impl SourceHandle {
    /// Wraps a concrete source stage.
    #[must_use]
    pub fn new<S>(source: S) -> Self
    where
        S: SourceStage + 'static,
    {
        let rc = Rc::new(RefCell::new(source));
        SourceHandle {
            stage: rc.clone(),
            source: rc,
        }
    }
}

/// Handle for registering a transform stage with the assembler.
pub struct TransformHandle {
    stage: Rc<RefCell<dyn Stage>>,
    transform: Rc<RefCell<dyn TransformStage>>,
    consumer: Consumer,
}

impl TransformHandle {
    /// Wraps a transform that consumes a byte stream.
    #[must_use]
    pub fn byte_stream<S>(stage: S) -> Self
    where
        S: TransformStage + ByteStreamConsumer + 'static,
    {
        let rc = Rc::new(RefCell::new(stage));
        TransformHandle {
            stage: rc.clone(),
            transform: rc.clone(),
            consumer: Consumer::ByteStream(rc),
        }
    }

    /// Wraps a transform that consumes a buffered chunk list.
    #[must_use]
    pub fn buffer_list<S>(stage: S) -> Self
    where
        S: TransformStage + BufferListConsumer + 'static,
    {
        let rc = Rc::new(RefCell::new(stage));
        TransformHandle {
            stage: rc.clone(),
            transform: rc.clone(),
            consumer: Consumer::BufferList(rc),
        }
    }

    /// Wraps a transform that consumes record batches.
    #[must_use]
    pub fn batch<S>(stage: S) -> Self
    where
        S: TransformStage + crate::stage::BatchConsumer + 'static,
    {
        let rc = Rc::new(RefCell::new(stage));
        TransformHandle {
            stage: rc.clone(),
            transform: rc.clone(),
            consumer: Consumer::Batch(rc),
        }
    }
}

/// Handle for registering a sink stage with the assembler.
pub struct SinkHandle {
    stage: Rc<RefCell<dyn Stage>>,
    sink: Rc<RefCell<dyn SinkStage>>,
    consumer: Consumer,
}

impl SinkHandle {
    /// Wraps a sink that consumes a byte stream.
    #[must_use]
    pub fn byte_stream<S>(sink: S) -> Self
    where
        S: SinkStage + ByteStreamConsumer + 'static,
    {
        let rc = Rc::new(RefCell::new(sink));
        SinkHandle {
            stage: rc.clone(),
            sink: rc.clone(),
            consumer: Consumer::ByteStream(rc),
        }
    }

    /// Wraps a sink that consumes record batches.
    #[must_use]
    pub fn batch<S>(sink: S) -> Self
    where
        S: SinkStage + crate::stage::BatchConsumer + 'static,
    {
        let rc = Rc::new(RefCell::new(sink));
        SinkHandle {
            stage: rc.clone(),
            sink: rc.clone(),
            consumer: Consumer::Batch(rc),
        }
    }
}

/// Assembles a pipeline from a source, transforms and a sink.
pub struct PipelineBuilder {
    source: SourceHandle,
    transforms: Vec<TransformHandle>,
}

impl PipelineBuilder {
    /// Starts assembly from a source stage.
    #[must_use]
    pub fn from_source(source: SourceHandle) -> Self {
        PipelineBuilder {
            source,
            transforms: Vec::new(),
        }
    }

    /// Appends a transform stage.
    #[must_use]
    pub fn add_stage(mut self, stage: TransformHandle) -> Self {
        self.transforms.push(stage);
        self
    }

    /// Terminates assembly with a sink and wires every producer to its
    /// consumer, inserting a buffering stage where a byte stream feeds a
    /// buffer-list consumer.
    ///
    /// # Errors
    ///
    /// Returns an internal error for any other interface mismatch.
    pub fn to_sink(self, sink: SinkHandle) -> Result<DataPipeline, Error> {
        let core = Rc::new(PipelineCore {
            stages: RefCell::new(Vec::new()),
            source: RefCell::new(Some(self.source.source.clone())),
            sink: RefCell::new(Some(sink.sink.clone())),
            state: Cell::new(PipelineState::Idle),
            pending: RefCell::new(None),
            rescheduled: Cell::new(false),
            notify: Notify::new(),
            completion: RefCell::new(None),
        });

        let mut stages: Vec<Rc<RefCell<dyn Stage>>> = vec![self.source.stage.clone()];

        // Wire each producer to the next consumer in the chain.
        let bind_next = |stages: &mut Vec<Rc<RefCell<dyn Stage>>>,
                             producer_stage: &Rc<RefCell<dyn Stage>>,
                             bind: &mut dyn FnMut(Consumer) -> Result<(), Error>,
                             consumer: Consumer|
         -> Result<(), Error> {
            let produced = producer_stage.borrow().output_interface().ok_or_else(|| {
                Error::internal("Producer stage declares no output interface")
            })?;
            let wanted = consumer.interface();
            if produced == wanted {
                return bind(consumer);
            }
            if produced == DataInterface::ByteStream && wanted == DataInterface::BufferList {
                let buffering = Rc::new(RefCell::new(crate::buffering::BufferingStage::new()));
                bind(Consumer::ByteStream(buffering.clone()))?;
                buffering.borrow_mut().bind(consumer)?;
                stages.push(buffering);
                return Ok(());
            }
            Err(binding_error(
                producer_stage.borrow().name(),
                produced,
                wanted,
            ))
        };

        let mut upstream_stage = self.source.stage.clone();
        let mut upstream_bind: Box<dyn FnMut(Consumer) -> Result<(), Error>> = {
            let source = self.source.source;
            Box::new(move |consumer| source.borrow_mut().bind(consumer))
        };

        for transform in self.transforms {
            bind_next(
                &mut stages,
                &upstream_stage,
                upstream_bind.as_mut(),
                transform.consumer.clone(),
            )?;
            stages.push(transform.stage.clone());
            upstream_stage = transform.stage;
            upstream_bind = {
                let producer = transform.transform;
                Box::new(move |consumer| producer.borrow_mut().bind(consumer))
            };
        }

        bind_next(
            &mut stages,
            &upstream_stage,
            upstream_bind.as_mut(),
            sink.consumer,
        )?;
        stages.push(sink.stage);

        *core.stages.borrow_mut() = stages;
        Ok(DataPipeline { core })
    }
}

/// An assembled pipeline, ready to execute on the current event loop.
pub struct DataPipeline {
    core: Rc<PipelineCore>,
}

impl DataPipeline {
    /// Returns a scheduler handle, e.g. for external cancellation.
    #[must_use]
    pub fn handle(&self) -> PumpHandle {
        PumpHandle {
            core: Rc::downgrade(&self.core),
        }
    }

    /// The pipeline's current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.core.state.get()
    }

    /// Runs the pipeline to a terminal state.
    ///
    /// Must be driven on a single-threaded event loop (a tokio `LocalSet`):
    /// stages are `!Send` and all their callbacks run on the caller's task.
    ///
    /// # Errors
    ///
    /// Resolves to the pipeline's terminal error on failure or
    /// cancellation.
    pub async fn execute(self) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();
        *self.core.completion.borrow_mut() = Some(sender);

        self.core.state.set(PipelineState::Running);
        let handle = self.handle();
        // Sink to source, so every stage holds its scheduler before the
        // stage upstream of it can fire a callback.
        for stage in self.core.stages.borrow().iter().rev() {
            stage.borrow_mut().connect(handle.clone());
        }
        self.core.pump_data();

        loop {
            if let Some(event) = self.core.take_pending() {
                self.core.shutdown(event);
            }
            if self.core.state.get().is_terminal() {
                break;
            }
            self.core.notify.notified().await;
            self.core.pump_cycle();
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(Error::internal(
                "Data pipeline dropped its completion before resolving it",
            )),
        }
    }
}
