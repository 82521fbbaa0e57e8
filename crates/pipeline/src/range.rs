// SPDX-License-Identifier: Apache-2.0

//! The range selector stage.
//!
//! A transparent transform over a batch stream that delivers only the rows
//! whose absolute index falls in `[offset, offset + limit)`, or
//! `[offset, ∞)` when the limit is zero. Row projection is zero-copy:
//! batches fully inside the range pass through untouched, partial overlaps
//! are sliced, and batches outside the range are dropped.

use crate::error::Error;
use crate::pipeline::PumpHandle;
use crate::stage::{
    BatchConsumer, Consumer, DataInterface, Producer, Stage, already_bound, binding_error,
};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use std::cell::RefCell;
use std::rc::Rc;

/// Selects a row range out of a batch stream.
pub struct RangeSelector {
    offset: u64,
    limit: u64,
    seen: u64,
    consumer: Option<Rc<RefCell<dyn BatchConsumer>>>,
    scheduler: Option<PumpHandle>,
    done: bool,
}

impl RangeSelector {
    /// Creates a selector for `[offset, offset + limit)`; a zero limit
    /// keeps everything from `offset` on.
    #[must_use]
    pub fn new(offset: u64, limit: u64) -> Self {
        RangeSelector {
            offset,
            limit,
            seen: 0,
            consumer: None,
            scheduler: None,
            done: false,
        }
    }

    /// End of the selected range, exclusive; `None` when unbounded.
    fn range_end(&self) -> Option<u64> {
        if self.limit == 0 {
            None
        } else {
            Some(self.offset + self.limit)
        }
    }
}

impl Stage for RangeSelector {
    fn name(&self) -> &'static str {
        "range-selector"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::BatchStream)
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

impl Producer for RangeSelector {
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

impl BatchConsumer for RangeSelector {
    fn on_start(&mut self, schema: SchemaRef) {
        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_start(schema);
        }
    }

    fn on_batch(&mut self, batch: RecordBatch) {
        if self.done {
            tracing::warn!(stage = self.name(), "dropping batch delivered after done");
            return;
        }
        let rows = batch.num_rows() as u64;
        let batch_start = self.seen;
        let batch_end = batch_start + rows;
        self.seen = batch_end;

        let select_start = self.offset.max(batch_start);
        let select_end = match self.range_end() {
            Some(end) => end.min(batch_end),
            None => batch_end,
        };
        if select_start >= select_end {
            return;
        }

        let selected = if select_start == batch_start && select_end == batch_end {
            batch
        } else {
            let slice_offset = (select_start - batch_start) as usize;
            let slice_len = (select_end - select_start) as usize;
            batch.slice(slice_offset, slice_len)
        };

        if let Some(consumer) = self.consumer.clone() {
            consumer.borrow_mut().on_batch(selected);
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
