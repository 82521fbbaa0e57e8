// SPDX-License-Identifier: Apache-2.0

//! Streaming file stages.
//!
//! Reads and writes run in local tasks on the pipeline's event loop; the
//! stages exchange data with those tasks over small local channels, and
//! every IO completion signals the pump so flow control stays demand
//! driven. All chunk ownership follows the pipeline contract: a chunk
//! handed to `on_next` belongs to the receiver.

use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use strata_pipeline::Error;
use strata_pipeline::pipeline::PumpHandle;
use strata_pipeline::stage::{
    ByteStreamConsumer, Consumer, DataInterface, Producer, SinkStage, SourceStage, Stage,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

/// Bytes read from disk per chunk.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the stage and its IO task.
const IO_QUEUE_DEPTH: usize = 8;

fn storage_error(key: &str, operation: &str, path: &str, message: impl Into<String>) -> Error {
    Error::Storage {
        key: format!("{key}:{operation}"),
        path: path.to_owned(),
        message: message.into(),
    }
}

enum ReadEvent {
    Chunk(Bytes),
    Eos,
    Failed(Error),
}

/// Pipeline source streaming a local file's bytes.
pub struct FileByteSource {
    storage_key: String,
    storage_path: String,
    absolute: PathBuf,
    chunk_size: usize,
    consumer: Option<Rc<RefCell<dyn ByteStreamConsumer>>>,
    events: Option<mpsc::Receiver<ReadEvent>>,
    started: bool,
    done: bool,
}

impl FileByteSource {
    /// Creates a source for the resolved file path.
    #[must_use]
    pub fn new(storage_key: String, storage_path: String, absolute: PathBuf) -> Self {
        FileByteSource {
            storage_key,
            storage_path,
            absolute,
            chunk_size: READ_CHUNK_SIZE,
            consumer: None,
            events: None,
            started: false,
            done: false,
        }
    }

    /// Overrides the read chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

async fn read_file_task(
    absolute: PathBuf,
    storage_key: String,
    storage_path: String,
    chunk_size: usize,
    events: mpsc::Sender<ReadEvent>,
    scheduler: PumpHandle,
) {
    let failed = |message: String| {
        storage_error(&storage_key, "read_stream", &storage_path, message)
    };

    let mut file = match tokio::fs::File::open(&absolute).await {
        Ok(file) => file,
        Err(error) => {
            let _ = events.send(ReadEvent::Failed(failed(error.to_string()))).await;
            scheduler.pump_data();
            return;
        }
    };

    loop {
        let mut buffer = vec![0u8; chunk_size];
        match file.read(&mut buffer).await {
            Ok(0) => {
                let _ = events.send(ReadEvent::Eos).await;
                scheduler.pump_data();
                return;
            }
            Ok(read) => {
                buffer.truncate(read);
                if events.send(ReadEvent::Chunk(Bytes::from(buffer))).await.is_err() {
                    // Pipeline went away; nothing left to notify.
                    return;
                }
                scheduler.pump_data();
            }
            Err(error) => {
                let _ = events.send(ReadEvent::Failed(failed(error.to_string()))).await;
                scheduler.pump_data();
                return;
            }
        }
    }
}

impl Stage for FileByteSource {
    fn name(&self) -> &'static str {
        "file-source"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        None
    }

    fn output_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        let (sender, receiver) = mpsc::channel(IO_QUEUE_DEPTH);
        self.events = Some(receiver);
        let _ = tokio::task::spawn_local(read_file_task(
            self.absolute.clone(),
            self.storage_key.clone(),
            self.storage_path.clone(),
            self.chunk_size,
            sender,
            scheduler,
        ));
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
        let Some(events) = &mut self.events else {
            return Ok(());
        };

        while consumer.borrow().is_ready() {
            match events.try_recv() {
                Ok(ReadEvent::Chunk(chunk)) => consumer.borrow_mut().on_next(chunk),
                Ok(ReadEvent::Eos) => {
                    self.done = true;
                    consumer.borrow_mut().on_complete();
                    return Ok(());
                }
                Ok(ReadEvent::Failed(error)) => {
                    self.done = true;
                    return Err(error);
                }
                Err(_) => break,
            }
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.events = None;
        self.done = true;
    }
}

impl Producer for FileByteSource {
    fn bind(&mut self, consumer: Consumer) -> Result<(), Error> {
        if self.consumer.is_some() {
            return Err(Error::internal("File source is already bound to a consumer"));
        }
        match consumer {
            Consumer::ByteStream(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            other => Err(Error::internal(format!(
                "File source produces a byte stream but its consumer expects {}",
                other.interface()
            ))),
        }
    }
}

impl SourceStage for FileByteSource {
    fn cancel(&mut self) {
        // Dropping the receiver stops the read task on its next send.
        self.events = None;
        self.done = true;
    }
}

enum WriteEvent {
    Chunk(Bytes),
    Eos,
}

/// Pipeline sink streaming bytes into a local file.
///
/// Parent directories are created on demand; a terminated write removes
/// the partial file so failed jobs never leave half-written objects.
pub struct FileByteSink {
    events: Option<mpsc::UnboundedSender<WriteEvent>>,
    pending: mpsc::UnboundedReceiver<WriteEvent>,
    absolute: PathBuf,
    storage_key: String,
    storage_path: String,
    queued: Rc<Cell<usize>>,
    bytes_written: Rc<Cell<u64>>,
    aborted: Rc<Cell<bool>>,
    scheduler: Option<PumpHandle>,
    terminal_sent: bool,
    done: bool,
}

impl FileByteSink {
    /// Creates a sink for the resolved file path.
    #[must_use]
    pub fn new(storage_key: String, storage_path: String, absolute: PathBuf) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        FileByteSink {
            events: Some(sender),
            pending: receiver,
            absolute,
            storage_key,
            storage_path,
            queued: Rc::new(Cell::new(0)),
            bytes_written: Rc::new(Cell::new(0)),
            aborted: Rc::new(Cell::new(false)),
            scheduler: None,
            terminal_sent: false,
            done: false,
        }
    }

    /// Shared counter of bytes flushed to disk; read it after the
    /// pipeline completes.
    #[must_use]
    pub fn bytes_written(&self) -> Rc<Cell<u64>> {
        self.bytes_written.clone()
    }
}

struct WriterShared {
    queued: Rc<Cell<usize>>,
    bytes_written: Rc<Cell<u64>>,
    aborted: Rc<Cell<bool>>,
}

async fn write_file_task(
    absolute: PathBuf,
    storage_key: String,
    storage_path: String,
    mut pending: mpsc::UnboundedReceiver<WriteEvent>,
    shared: WriterShared,
    scheduler: PumpHandle,
) {
    let failed = |message: String| {
        storage_error(&storage_key, "write_stream", &storage_path, message)
    };
    let abort_cleanup = |absolute: &PathBuf| {
        if std::fs::remove_file(absolute).is_err() {
            tracing::warn!(path = %absolute.display(), "could not remove partial file");
        }
    };

    if let Some(parent) = absolute.parent() {
        if let Err(error) = tokio::fs::create_dir_all(parent).await {
            scheduler.report_regular_error(failed(error.to_string()));
            return;
        }
    }

    let mut file = match tokio::fs::File::create(&absolute).await {
        Ok(file) => file,
        Err(error) => {
            scheduler.report_regular_error(failed(error.to_string()));
            return;
        }
    };

    while let Some(event) = pending.recv().await {
        match event {
            WriteEvent::Chunk(chunk) => {
                shared.queued.set(shared.queued.get().saturating_sub(1));
                if let Err(error) = file.write_all(&chunk).await {
                    scheduler.report_regular_error(failed(error.to_string()));
                    abort_cleanup(&absolute);
                    return;
                }
                shared
                    .bytes_written
                    .set(shared.bytes_written.get() + chunk.len() as u64);
                // Capacity freed: let the pump push more.
                scheduler.pump_data();
            }
            WriteEvent::Eos => {
                if let Err(error) = file.flush().await {
                    scheduler.report_regular_error(failed(error.to_string()));
                    abort_cleanup(&absolute);
                    return;
                }
                scheduler.report_complete();
                return;
            }
        }
    }

    // Channel closed without EOS: the pipeline terminated early.
    if shared.aborted.get() {
        abort_cleanup(&absolute);
    }
}

impl Stage for FileByteSink {
    fn name(&self) -> &'static str {
        "file-sink"
    }

    fn data_interface(&self) -> Option<DataInterface> {
        Some(DataInterface::ByteStream)
    }

    fn output_interface(&self) -> Option<DataInterface> {
        None
    }

    fn connect(&mut self, scheduler: PumpHandle) {
        self.scheduler = Some(scheduler.clone());
        let (_drained_sender, receiver) = mpsc::unbounded_channel();
        let pending = std::mem::replace(&mut self.pending, receiver);
        let _ = tokio::task::spawn_local(write_file_task(
            self.absolute.clone(),
            self.storage_key.clone(),
            self.storage_path.clone(),
            pending,
            WriterShared {
                queued: self.queued.clone(),
                bytes_written: self.bytes_written.clone(),
                aborted: self.aborted.clone(),
            },
            scheduler,
        ));
    }

    fn is_ready(&self) -> bool {
        !self.done && self.queued.get() < IO_QUEUE_DEPTH
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn close(&mut self) {
        self.events = None;
        self.done = true;
    }
}

impl ByteStreamConsumer for FileByteSink {
    fn on_start(&mut self) {}

    fn on_next(&mut self, chunk: Bytes) {
        if self.done {
            tracing::warn!(stage = self.name(), "dropping chunk delivered after done");
            return;
        }
        if let Some(events) = &self.events {
            self.queued.set(self.queued.get() + 1);
            let _ = events.send(WriteEvent::Chunk(chunk));
        }
    }

    fn on_complete(&mut self) {
        if self.done || self.terminal_sent {
            return;
        }
        self.terminal_sent = true;
        self.done = true;
        if let Some(events) = self.events.take() {
            let _ = events.send(WriteEvent::Eos);
        }
    }

    fn on_error(&mut self, error: Error) {
        self.aborted.set(true);
        self.events = None;
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

impl SinkStage for FileByteSink {
    fn terminate(&mut self, _error: Error) {
        if self.terminal_sent {
            return;
        }
        self.terminal_sent = true;
        self.done = true;
        self.aborted.set(true);
        // Dropping the sender wakes the writer, which removes the file.
        self.events = None;
    }
}
