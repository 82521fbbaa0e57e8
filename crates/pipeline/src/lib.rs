// Copyright The Strata Dataflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Cooperative streaming engine for tabular data.
//!
//! A pipeline is a `source → [transform …] → sink` chain of stages bound to
//! one single-threaded event loop. The coordinator drives the chain with
//! pump cycles: each cycle walks from the sink toward the source and pumps
//! every stage whose consumer is ready, so backpressure falls naturally out
//! of the walk order. Stages exchange reference-counted byte chunks
//! ([`bytes::Bytes`]) and columnar record batches; ownership transfers on
//! every delivery, which in Rust is simply a move.
//!
//! # Scheduling model
//!
//! Single-threaded cooperative per pipeline. All stage callbacks, pump
//! cycles, reactive subscription callbacks and IO completions run on the
//! pipeline's event loop (a tokio current-thread runtime with a
//! `LocalSet`). No stage state is shared across threads and no locks
//! exist anywhere in the engine.

pub mod buffering;
pub mod config;
pub mod elastic;
pub mod error;
pub mod pipeline;
pub mod range;
pub mod reactive;
pub mod stage;
pub mod testing;

pub use buffering::BufferingStage;
pub use elastic::ElasticBuffer;
pub use error::{Error, PipelineState};
pub use pipeline::{DataPipeline, PipelineBuilder, PumpHandle, SinkHandle, SourceHandle, TransformHandle};
pub use range::RangeSelector;
pub use reactive::{ReactiveByteSink, ReactiveByteSource};
pub use stage::{
    BatchConsumer, BufferListConsumer, ByteStreamConsumer, Consumer, DataInterface, Producer,
    SinkStage, SourceStage, Stage, TransformStage,
};
