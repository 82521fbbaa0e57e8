// SPDX-License-Identifier: Apache-2.0

//! The elastic buffer stage.
//!
//! A bounded FIFO of byte chunks bridging a producer and a consumer with
//! mismatched tempos. The buffer advertises readiness only while its queue
//! sits below the safety threshold, leaving the margin up to the hard limit
//! free for chunks a bursty producer already has in flight. End-of-stream
//! is tracked as a separate flag, never as a sentinel chunk, so an empty
//! chunk from an upstream adapter cannot be mistaken for EOS.

use crate::config::ElasticBufferConfig;
use crate::error::Error;
use crate::pipeline::PumpHandle;
use crate::stage::{
    ByteStreamConsumer, Consumer, DataInterface, Producer, Stage, already_bound,
};
use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// A bounded FIFO of byte chunks between a fast producer and a slow
/// consumer.
pub struct ElasticBuffer {
    config: ElasticBufferConfig,
    queue: VecDeque<Bytes>,
    consumer: Option<Rc<RefCell<dyn ByteStreamConsumer>>>,
    scheduler: Option<PumpHandle>,
    depth_probe: Option<Rc<Cell<usize>>>,
    started: bool,
    eos_pending: bool,
    done: bool,
}

impl ElasticBuffer {
    /// Creates a buffer with the default queue limits.
    #[must_use]
    pub fn new() -> Self {
        ElasticBuffer::with_config(ElasticBufferConfig::default())
    }

    /// Creates a buffer with explicit queue limits.
    #[must_use]
    pub fn with_config(config: ElasticBufferConfig) -> Self {
        ElasticBuffer {
            config,
            queue: VecDeque::new(),
            consumer: None,
            scheduler: None,
            depth_probe: None,
            started: false,
            eos_pending: false,
            done: false,
        }
    }

    /// Attaches a probe recording the maximum queue depth observed, for
    /// flow-control diagnostics and tests.
    #[must_use]
    pub fn with_depth_probe(mut self, probe: Rc<Cell<usize>>) -> Self {
        self.depth_probe = Some(probe);
        self
    }

    /// Current queue depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.queue.len()
    }

    fn consumer(&self) -> Option<Rc<RefCell<dyn ByteStreamConsumer>>> {
        self.consumer.clone()
    }
}

impl Default for ElasticBuffer {
    fn default() -> Self {
        ElasticBuffer::new()
    }
}

impl Stage for ElasticBuffer {
    fn name(&self) -> &'static str {
        "elastic-buffer"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler);
    }

    fn is_ready(&self) -> bool {
        !self.done && self.queue.len() < self.config.ready_threshold()
    }

    fn pump(&mut self) -> Result<(), Error> {
        if self.done {
            return Ok(());
        }
        let Some(consumer) = self.consumer() else {
            return Ok(());
        };

        // Drain in order while the consumer keeps accepting.
        while !self.queue.is_empty() && consumer.borrow().is_ready() {
            let chunk = self
                .queue
                .pop_front()
                .ok_or_else(|| Error::internal("Elastic buffer queue drained concurrently"))?;
            consumer.borrow_mut().on_next(chunk);
        }

        if self.queue.is_empty() && self.eos_pending {
            self.eos_pending = false;
            self.done = true;
            consumer.borrow_mut().on_complete();
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.queue.clear();
        self.eos_pending = false;
        self.done = true;
    }
}

impl Producer for ElasticBuffer {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(already_bound(self.name()));
        }
        match consumer {
            Consumer::ByteStream(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(crate::stage::binding_error(
                self.name(),
                DataInterface::ByteStream,
                other.interface(),
            )),
        }
    }
}

impl ByteStreamConsumer for ElasticBuffer {
    fn on_start(&mut self) {
        if self.started || self.done {
            return;
        }
        self.started = true;
        if let Some(consumer) = self.consumer() {
            consumer.borrow_mut().on_start();
        }
    }

    fn on_next(&mut self, chunk: Bytes) {
        if self.done {
            tracing::warn!(stage = self.name(), "dropping chunk delivered after done");
            return;
        }
        if self.queue.len() >= self.config.queue_limit {
            // The producer ignored readiness all the way past the margin.
            if let Some(scheduler) = &self.scheduler {
                scheduler.report_unhandled_error(Error::internal("Elastic buffer overflowed"));
            }
            return;
        }
        self.queue.push_back(chunk);
        if let Some(probe) = &self.depth_probe {
            probe.set(probe.get().max(self.queue.len()));
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.pump_data();
        }
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.eos_pending = true;
        if let Some(scheduler) = &self.scheduler {
            scheduler.pump_data();
        }
    }

    fn on_error(&mut self, error: Error) {
        self.queue.clear();
        self.done = true;
        if let Some(scheduler) = &self.scheduler {
            if error.is_regular() {
                scheduler.report_regular_error(error);
            } else {
                scheduler.report_unhandled_error(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Downstream recorder with switchable readiness.
    struct Recorder {
        chunks: Rc<RefCell<Vec<Bytes>>>,
        complete: Rc<Cell<bool>>,
        ready: Rc<Cell<bool>>,
    }

    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn data_interface(&self) -> Option<DataInterface> {
            Some(DataInterface::ByteStream)
        }
        fn output_interface(&self) -> Option<DataInterface> {
            None
        }
        fn connect(&mut self, _scheduler: PumpHandle) {}
        fn is_ready(&self) -> bool {
            self.ready.get()
        }
        fn is_done(&self) -> bool {
            false
        }
        fn close(&mut self) {}
    }

    impl ByteStreamConsumer for Recorder {
        fn on_start(&mut self) {}
        fn on_next(&mut self, chunk: Bytes) {
            self.chunks.borrow_mut().push(chunk);
        }
        fn on_complete(&mut self) {
            self.complete.set(true);
        }
        fn on_error(&mut self, _error: Error) {}
    }

    fn harness(
        config: ElasticBufferConfig,
    ) -> (
        ElasticBuffer,
        Rc<RefCell<Vec<Bytes>>>,
        Rc<Cell<bool>>,
        Rc<Cell<bool>>,
    ) {
        let chunks = Rc::new(RefCell::new(Vec::new()));
        let complete = Rc::new(Cell::new(false));
        let ready = Rc::new(Cell::new(true));
        let recorder = Rc::new(RefCell::new(Recorder {
            chunks: chunks.clone(),
            complete: complete.clone(),
            ready: ready.clone(),
        }));
        let mut buffer = ElasticBuffer::with_config(config);
        buffer
            .bind(Consumer::ByteStream(recorder))
            .expect("bind recorder");
        (buffer, chunks, complete, ready)
    }

    #[test]
    fn readiness_tracks_the_safety_threshold() {
        let config = ElasticBufferConfig {
            queue_limit: 4,
            safety_margin: 2,
        };
        let (mut buffer, _chunks, _complete, ready) = harness(config);
        ready.set(false); // hold everything in the queue

        assert!(buffer.is_ready());
        buffer.on_next(Bytes::from_static(b"a"));
        assert!(buffer.is_ready());
        buffer.on_next(Bytes::from_static(b"b"));
        // At the threshold (limit - margin = 2) the buffer stops accepting.
        assert!(!buffer.is_ready());
        assert_eq!(buffer.depth(), 2);
    }

    #[test]
    fn empty_chunk_is_not_confused_with_eos() {
        let (mut buffer, chunks, complete, _ready) = harness(ElasticBufferConfig::default());

        buffer.on_next(Bytes::new());
        buffer.pump().expect("pump");

        assert_eq!(chunks.borrow().len(), 1);
        assert!(chunks.borrow()[0].is_empty());
        assert!(!complete.get(), "an empty chunk must not complete the stream");
        assert!(!buffer.is_done());

        buffer.on_complete();
        buffer.pump().expect("pump");
        assert!(complete.get());
        assert!(buffer.is_done());
    }

    #[test]
    fn eos_waits_until_the_queue_drains() {
        let (mut buffer, chunks, complete, ready) = harness(ElasticBufferConfig::default());
        ready.set(false);

        buffer.on_next(Bytes::from_static(b"tail"));
        buffer.on_complete();
        buffer.pump().expect("pump");
        assert!(!complete.get(), "EOS must not overtake queued chunks");

        ready.set(true);
        buffer.pump().expect("pump");
        assert_eq!(chunks.borrow().len(), 1);
        assert!(complete.get());
    }

    #[test]
    fn chunks_flow_through_in_order() {
        let (mut buffer, chunks, _complete, ready) = harness(ElasticBufferConfig::default());
        ready.set(false);
        for byte in 0u8..5 {
            buffer.on_next(Bytes::from(vec![byte]));
        }
        ready.set(true);
        buffer.pump().expect("pump");

        let seen: Vec<u8> = chunks.borrow().iter().map(|chunk| chunk[0]).collect();
        assert_eq!(seen, [0, 1, 2, 3, 4]);
    }
}
