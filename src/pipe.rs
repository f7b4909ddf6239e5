//! In-process frame transport.
//!
//! A bounded single-producer/single-consumer channel of frames built on
//! `tokio::sync::mpsc`. The writer lives on the database thread, the reader
//! inside the decode task. Neither handle is `Clone`. Dropping or closing the
//! writer ends the stream once buffered frames are read; dropping or closing
//! the reader makes further writes fail with `TransportClosed`.

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::error::{CodecError, CodecResult};
use crate::meta::framer::FrameSink;

/// Default number of frames buffered between producer and consumer.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Create a connected writer/reader pair holding at most `capacity` frames.
pub fn frame_pipe(capacity: usize) -> (FrameWriter, FrameReader) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (FrameWriter { tx: Some(tx) }, FrameReader { rx })
}

/// Outcome of a non-blocking write.
#[derive(Debug)]
pub enum TryWrite {
    Written,
    /// Buffer is full; the frame is handed back untouched
    Full(Bytes),
}

/// Outcome of a non-blocking read.
#[derive(Debug, PartialEq, Eq)]
pub enum TryRead {
    Frame(Bytes),
    /// Nothing buffered yet, the writer is still open
    Empty,
    /// The writer is gone and every buffered frame has been read
    Closed,
}

pub struct FrameWriter {
    tx: Option<mpsc::Sender<Bytes>>,
}

impl FrameWriter {
    fn sender(&self) -> CodecResult<&mpsc::Sender<Bytes>> {
        self.tx.as_ref().ok_or(CodecError::TransportClosed)
    }

    /// Queue a frame if there is room.
    pub fn try_write(&self, frame: Bytes) -> CodecResult<TryWrite> {
        match self.sender()?.try_send(frame) {
            Ok(()) => Ok(TryWrite::Written),
            Err(TrySendError::Full(frame)) => Ok(TryWrite::Full(frame)),
            Err(TrySendError::Closed(_)) => Err(CodecError::TransportClosed),
        }
    }

    /// Queue a frame, parking the thread while the buffer is full.
    ///
    /// For producers running outside the async runtime (`spawn_blocking`,
    /// the SQLite connection thread). Panics if called from async code.
    pub fn write_blocking(&self, frame: Bytes) -> CodecResult<()> {
        self.sender()?
            .blocking_send(frame)
            .map_err(|_| CodecError::TransportClosed)
    }

    /// Queue a frame, waiting for room.
    pub async fn write(&self, frame: Bytes) -> CodecResult<()> {
        self.sender()?
            .send(frame)
            .await
            .map_err(|_| CodecError::TransportClosed)
    }

    /// Frames currently buffered.
    pub fn pending(&self) -> usize {
        self.tx
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    /// Mark the stream finished. Frames already queued remain readable.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

impl FrameSink for FrameWriter {
    fn send(&mut self, frame: Bytes) -> CodecResult<()> {
        self.write_blocking(frame)
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("open", &self.tx.is_some())
            .field("pending", &self.pending())
            .finish()
    }
}

#[derive(Debug)]
pub struct FrameReader {
    rx: mpsc::Receiver<Bytes>,
}

impl FrameReader {
    /// Take the next frame if one is ready.
    #[inline]
    pub fn try_read(&mut self) -> TryRead {
        match self.rx.try_recv() {
            Ok(frame) => TryRead::Frame(frame),
            Err(TryRecvError::Empty) => TryRead::Empty,
            Err(TryRecvError::Disconnected) => TryRead::Closed,
        }
    }

    /// Refuse further frames. The writer sees `TransportClosed` on its next
    /// write, including one already waiting for room.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
