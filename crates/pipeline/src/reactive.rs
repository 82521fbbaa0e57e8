// SPDX-License-Identifier: Apache-2.0

//! Reactive boundary adapters.
//!
//! Two-way bridges between the cooperative pump and request-based streaming
//! transports. The contract is a minimal, `!Send` rendition of the
//! reactive-streams handshake: a publisher accepts one subscriber, hands it
//! a subscription, and delivers chunks only against outstanding demand.
//!
//! [`ReactiveByteSource`] subscribes to an external publisher and feeds the
//! pipeline's first consumer, keeping a bounded request window open.
//! [`ReactiveByteSink`] plays the publisher role toward an external
//! subscriber, translating its demand into pipeline readiness.

use crate::config::ReactiveSourceConfig;
use crate::error::Error;
use crate::pipeline::PumpHandle;
use crate::stage::{
    ByteStreamConsumer, Consumer, DataInterface, Producer, SinkStage, SourceStage, Stage,
    already_bound, binding_error,
};
use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;

/// Demand-tracking handle a publisher gives its subscriber.
pub trait ChunkSubscription {
    /// Requests `n` more chunks.
    fn request(&mut self, n: usize);

    /// Cancels the subscription; no further signals are expected.
    fn cancel(&mut self);
}

/// Receiver side of a chunk stream.
pub trait ChunkSubscriber {
    /// Hands over the subscription; called exactly once.
    fn on_subscribe(&mut self, subscription: Box<dyn ChunkSubscription>);

    /// Delivers one chunk against outstanding demand.
    fn on_next(&mut self, chunk: Bytes);

    /// Signals a successful end of stream; terminal.
    fn on_complete(&mut self);

    /// Signals failure; terminal.
    fn on_error(&mut self, error: Error);
}

/// Producer side of a chunk stream; accepts a single subscriber.
pub trait ChunkPublisher {
    /// Attaches the subscriber, consuming the publisher.
    fn subscribe(self: Box<Self>, subscriber: Rc<RefCell<dyn ChunkSubscriber>>);
}

/// Subscriber state of a reactive source, shared with the subscription
/// callbacks which can fire while the stage itself is borrowed.
struct SourceInner {
    subscription: Option<Box<dyn ChunkSubscription>>,
    consumer: Option<Rc<RefCell<dyn ByteStreamConsumer>>>,
    scheduler: Option<PumpHandle>,
    outstanding: usize,
    done: bool,
}

impl SourceInner {
    fn report(&self, error: Error) {
        if let Some(scheduler) = &self.scheduler {
            if error.is_regular() {
                scheduler.report_regular_error(error);
            } else {
                scheduler.report_unhandled_error(error);
            }
        }
    }
}

impl ChunkSubscriber for SourceInner {
    fn on_subscribe(&mut self, subscription: Box<dyn ChunkSubscription>) {
        if self.subscription.is_some() {
            self.report(Error::internal(
                "Reactive source received a second subscription",
            ));
            return;
        }
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, chunk: Bytes) {
        if self.done {
            tracing::warn!(stage = "reactive-source", "dropping chunk delivered after done");
            return;
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_next(chunk);
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.pump_data();
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
        if let Some(scheduler) = &self.scheduler {
            scheduler.pump_data();
        }
    }

    fn on_error(&mut self, error: Error) {
        if self.done {
            return;
        }
        self.done = true;
        self.report(error);
    }
}

/// Source stage bridging an external publisher into the pipeline.
pub struct ReactiveByteSource {
    publisher: Option<Box<dyn ChunkPublisher>>,
    inner: Rc<RefCell<SourceInner>>,
    config: ReactiveSourceConfig,
}

impl ReactiveByteSource {
    /// Creates a source over the given publisher with the default window.
    #[must_use]
    pub fn new(publisher: Box<dyn ChunkPublisher>) -> Self {
        ReactiveByteSource::with_config(publisher, ReactiveSourceConfig::default())
    }

    /// Creates a source with an explicit request window.
    #[must_use]
    pub fn with_config(publisher: Box<dyn ChunkPublisher>, config: ReactiveSourceConfig) -> Self {
        ReactiveByteSource {
            publisher: Some(publisher),
            inner: Rc::new(RefCell::new(SourceInner {
                subscription: None,
                consumer: None,
                scheduler: None,
                outstanding: 0,
                done: false,
            })),
            config,
        }
    }
}

impl Stage for ReactiveByteSource {
    fn name(&self) -> &'static str {
        "reactive-source"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        None
    }

    fn output_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.scheduler = Some(scheduler);
            if let Some(consumer) = inner.consumer.clone() {
                consumer.borrow_mut().on_start();
            }
        }
        if let Some(publisher) = self.publisher.take() {
            publisher.subscribe(self.inner.clone());
        }
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn pump(&mut self) -> Result<(), Error> {
        // Refill the request window when demand has drained below half.
        let refill = {
            let mut inner = self.inner.borrow_mut();
            if inner.done || inner.subscription.is_none() {
                0
            } else {
                let consumer_ready = inner
                    .consumer
                    .as_ref()
                    .is_some_and(|consumer| consumer.borrow().is_ready());
                if consumer_ready && inner.outstanding <= self.config.window / 2 {
                    let refill = self.config.window - inner.outstanding;
                    inner.outstanding = self.config.window;
                    refill
                } else {
                    0
                }
            }
        };

        if refill > 0 {
            // The subscription leaves the cell while it runs: request() may
            // deliver chunks synchronously, re-entering the inner state.
            let subscription = self.inner.borrow_mut().subscription.take();
            if let Some(mut subscription) = subscription {
                subscription.request(refill);
                let mut inner = self.inner.borrow_mut();
                if !inner.done && inner.subscription.is_none() {
                    inner.subscription = Some(subscription);
                }
            }
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.inner.borrow().done
    }

    fn close(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.done = true;
        inner.subscription = None;
        inner.consumer = None;
    }
}

impl Producer for ReactiveByteSource {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        if inner.consumer.is_some() {
            return Err(already_bound(self.name()));
        }
        match consumer {
            Consumer::ByteStream(consumer) => {
                inner.consumer = Some(consumer);
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

impl SourceStage for ReactiveByteSource {
    fn cancel(&mut self) {
        let subscription = {
            let mut inner = self.inner.borrow_mut();
            inner.done = true;
            inner.subscription.take()
        };
        if let Some(mut subscription) = subscription {
            subscription.cancel();
        }
    }
}

/// Demand counters of a reactive sink, shared with the subscription the
/// external subscriber holds.
struct SinkInner {
    requested: u64,
    delivered: u64,
    terminal_sent: bool,
    done: bool,
}

struct SinkSubscription {
    inner: Rc<RefCell<SinkInner>>,
    scheduler: PumpHandle,
}

impl ChunkSubscription for SinkSubscription {
    fn request(&mut self, n: usize) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.done {
                return;
            }
            inner.requested = inner.requested.saturating_add(n as u64);
        }
        self.scheduler.pump_data();
    }

    fn cancel(&mut self) {
        self.scheduler.request_cancel();
    }
}

/// Sink stage bridging the pipeline to an external subscriber.
pub struct ReactiveByteSink {
    subscriber: Rc<RefCell<dyn ChunkSubscriber>>,
    inner: Rc<RefCell<SinkInner>>,
    scheduler: Option<PumpHandle>,
}

impl ReactiveByteSink {
    /// Creates a sink delivering to the given subscriber.
    #[must_use]
    pub fn new(subscriber: Rc<RefCell<dyn ChunkSubscriber>>) -> Self {
        ReactiveByteSink {
            subscriber,
            inner: Rc::new(RefCell::new(SinkInner {
                requested: 0,
                delivered: 0,
                terminal_sent: false,
                done: false,
            })),
            scheduler: None,
        }
    }
}

impl Stage for ReactiveByteSink {
    fn name(&self) -> &'static str {
        "reactive-sink"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        None
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler.clone());
        let subscription = Box::new(SinkSubscription {
            inner: self.inner.clone(),
            scheduler,
        });
        self.subscriber.borrow_mut().on_subscribe(subscription);
    }

    fn is_ready(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.done && inner.requested > inner.delivered
    }

    fn is_done(&self) -> bool {
        self.inner.borrow().done
    }

    fn close(&mut self) {
        self.inner.borrow_mut().done = true;
    }
}

impl ByteStreamConsumer for ReactiveByteSink {
    fn on_start(&mut self) {}

    fn on_next(&mut self, chunk: Bytes) {
        if self.inner.borrow().done {
            tracing::warn!(stage = self.name(), "dropping chunk delivered after done");
            return;
        }
        self.subscriber.borrow_mut().on_next(chunk);
        self.inner.borrow_mut().delivered += 1;
    }

    fn on_complete(&mut self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.done || inner.terminal_sent {
                return;
            }
            inner.terminal_sent = true;
            inner.done = true;
        }
        self.subscriber.borrow_mut().on_complete();
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

impl SinkStage for ReactiveByteSink {
    fn terminate(&mut self, error: Error) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.terminal_sent {
                return;
            }
            inner.terminal_sent = true;
            inner.done = true;
        }
        self.subscriber.borrow_mut().on_error(error);
    }
}
