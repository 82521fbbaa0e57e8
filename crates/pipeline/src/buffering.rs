// SPDX-License-Identifier: Apache-2.0

//! The buffering stage.
//!
//! Accumulates an entire byte stream in memory and hands the complete
//! chunk list to a consumer that needs random access, e.g. a framed binary
//! decoder. The assembler inserts this stage automatically when a byte
//! stream feeds a buffer-list consumer.

use crate::error::Error;
use crate::pipeline::PumpHandle;
use crate::stage::{
    BufferListConsumer, ByteStreamConsumer, Consumer, DataInterface, Producer, Stage,
    already_bound, binding_error,
};
use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;

/// Accumulates a whole byte stream and delivers it as one buffer list.
pub struct BufferingStage {
    buffers: Vec<Bytes>,
    consumer: Option<Rc<RefCell<dyn BufferListConsumer>>>,
    scheduler: Option<PumpHandle>,
    done: bool,
}

impl BufferingStage {
    /// Creates an empty buffering stage.
    #[must_use]
    pub fn new() -> Self {
        BufferingStage {
            buffers: Vec::new(),
            consumer: None,
            scheduler: None,
            done: false,
        }
    }
}

impl Default for BufferingStage {
    fn default() -> Self {
        BufferingStage::new()
    }
}

impl Stage for BufferingStage {
    fn name(&self) -> &'static str {
        "buffering"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::BufferList)
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler);
    }

    fn is_ready(&self) -> bool {
        // Absorbs the whole stream regardless of downstream tempo.
        !self.done
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.buffers.clear();
        self.done = true;
    }
}

impl Producer for BufferingStage {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(already_bound(self.name()));
        }
        match consumer {
            Consumer::BufferList(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(binding_error(
                self.name(),
                DataInterface::BufferList,
                other.interface(),
            )),
        }
    }
}

impl ByteStreamConsumer for BufferingStage {
    fn on_start(&mut self) {}

    fn on_next(&mut self, chunk: Bytes) {
        if self.done {
            tracing::warn!(stage = self.name(), "dropping chunk delivered after done");
            return;
        }
        self.buffers.push(chunk);
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        let buffers = std::mem::take(&mut self.buffers);
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_buffer(buffers);
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.pump_data();
        }
    }

    fn on_error(&mut self, error: Error) {
        self.buffers.clear();
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
