//! Frame decoder and the decode loop.
//!
//! `MetaDecoder` turns one frame into zero or more `Entry` values.
//! `MetaDumper` drives it over a `FrameReader` until the stream ends or a stop
//! request has been honored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::catalog::{Catalog, TemplateId};
use super::object::{JsonObjectCodec, ObjectCodec};
use super::protocol::{read_header, MetaMessage, Scalar};
use super::types::Entry;
use crate::error::{CodecError, CodecResult};
use crate::pipe::{FrameReader, TryRead};

/// What an unnamed nullable template contributes when its value is null.
///
/// Named nullables always contribute `(name, null)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnnamedNullPolicy {
    /// Append a single `Entry::Null`
    #[default]
    Placeholder,
    /// Append nothing
    Omit,
}

/// Decoder state between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    AwaitingMessage,
    DispatchingFields(TemplateId),
}

/// Diagnostics hook for the decode path.
///
/// All methods default to no-ops.
pub trait DecodeObserver: Send + Sync {
    fn message_decoded(&self, _id: TemplateId, _entries: usize) {}

    fn decode_failed(&self, _error: &CodecError) {}

    fn drained(&self, _frames: u64) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DecodeObserver for NoopObserver {}

pub struct MetaDecoder {
    catalog: Arc<Catalog>,
    objects: Arc<dyn ObjectCodec>,
    unnamed_nulls: UnnamedNullPolicy,
    observer: Arc<dyn DecodeObserver>,
    state: DecodeState,
    frames: u64,
}

impl std::fmt::Debug for MetaDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaDecoder")
            .field("unnamed_nulls", &self.unnamed_nulls)
            .field("state", &self.state)
            .field("frames", &self.frames)
            .finish()
    }
}

impl MetaDecoder {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            objects: Arc::new(JsonObjectCodec),
            unnamed_nulls: UnnamedNullPolicy::default(),
            observer: Arc::new(NoopObserver),
            state: DecodeState::AwaitingMessage,
            frames: 0,
        }
    }

    pub fn with_object_codec(mut self, objects: Arc<dyn ObjectCodec>) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_unnamed_nulls(mut self, policy: UnnamedNullPolicy) -> Self {
        self.unnamed_nulls = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DecodeObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[inline]
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Frames decoded successfully so far.
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Decode one complete frame, appending its entries to `out`.
    ///
    /// On error nothing from this frame is appended and `out` keeps every
    /// entry from earlier frames.
    pub fn decode_frame(&mut self, frame: Bytes, out: &mut Vec<Entry>) -> CodecResult<()> {
        match self.decode_inner(frame, out) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = DecodeState::AwaitingMessage;
                match &e {
                    CodecError::UnknownTemplate(id) => {
                        tracing::error!("Unknown template {} after {} frames", id, self.frames)
                    }
                    other => tracing::error!("Decode failed after {} frames: {}", self.frames, other),
                }
                self.observer.decode_failed(&e);
                Err(e)
            }
        }
    }

    /// Decode a batch of frames in order, stopping at the first error.
    pub fn decode_frames<I>(&mut self, frames: I, out: &mut Vec<Entry>) -> CodecResult<()>
    where
        I: IntoIterator<Item = Bytes>,
    {
        for frame in frames {
            self.decode_frame(frame, out)?;
        }
        Ok(())
    }

    fn decode_inner(&mut self, mut frame: Bytes, out: &mut Vec<Entry>) -> CodecResult<()> {
        debug_assert_eq!(self.state, DecodeState::AwaitingMessage);

        let id = read_header(&mut frame)?;
        let template = self
            .catalog
            .by_id(id)
            .map_err(|_| CodecError::UnknownTemplate(id.as_u32()))?;
        self.state = DecodeState::DispatchingFields(id);

        let message = MetaMessage::decode_body(template, &mut frame)?;
        if frame.has_remaining() {
            return Err(CodecError::Malformed(format!(
                "{} trailing bytes after template {}",
                frame.remaining(),
                id
            )));
        }

        let mut entries: SmallVec<[Entry; 4]> = SmallVec::new();
        self.push_message(message, &mut entries)?;

        self.observer.message_decoded(id, entries.len());
        out.extend(entries);
        self.frames += 1;
        self.state = DecodeState::AwaitingMessage;
        Ok(())
    }

    fn push_message(
        &self,
        message: MetaMessage,
        entries: &mut SmallVec<[Entry; 4]>,
    ) -> CodecResult<()> {
        match message {
            MetaMessage::Value(value) => self.push_scalar(value, entries)?,
            MetaMessage::Named { name, value } => {
                entries.push(Entry::Name(name));
                self.push_scalar(value, entries)?;
            }
            MetaMessage::Nullable { value, .. } => match value {
                Some(value) => self.push_scalar(value, entries)?,
                None => {
                    if self.unnamed_nulls == UnnamedNullPolicy::Placeholder {
                        entries.push(Entry::Null);
                    }
                }
            },
            MetaMessage::NamedNullable { name, value, .. } => {
                entries.push(Entry::Name(name));
                match value {
                    Some(value) => self.push_scalar(value, entries)?,
                    None => entries.push(Entry::Null),
                }
            }
            MetaMessage::BeginGroup => entries.push(Entry::BeginGroup),
            MetaMessage::EndGroup => entries.push(Entry::EndGroup),
        }
        Ok(())
    }

    fn push_scalar(&self, value: Scalar, entries: &mut SmallVec<[Entry; 4]>) -> CodecResult<()> {
        let entry = match value {
            Scalar::UInt32(v) => Entry::UInt32(v),
            Scalar::Int32(v) => Entry::Int32(v),
            Scalar::Int64(v) => Entry::Int64(v),
            Scalar::Ascii(s) | Scalar::Utf8(s) => Entry::Text(s),
            Scalar::Decimal(d) => Entry::Decimal(d),
            Scalar::ByteArray(b) => Entry::Bytes(b.to_vec()),
            Scalar::Boolean(b) => Entry::Bool(b),
            Scalar::Float(v) => Entry::Float(v),
            Scalar::Double(v) => Entry::Double(v),
            Scalar::DateTime(millis) => Entry::DateTime(datetime(millis)?),
            Scalar::SerializedObject(payload) => Entry::Object(self.objects.decode(&payload)?),
            Scalar::Timestamp {
                millis,
                nanos,
                offset_minutes,
            } => {
                entries.push(Entry::DateTime(datetime(millis)?));
                entries.push(Entry::Int32(nanos));
                Entry::Int32(offset_minutes)
            }
        };
        entries.push(entry);
        Ok(())
    }
}

fn datetime(millis: i64) -> CodecResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| CodecError::Malformed(format!("DateTime out of range: {} ms", millis)))
}

// ============================================================================
// Decode Loop
// ============================================================================

/// Cancels a running `MetaDumper` once its committed frames are drained.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Consumer side of a query: reads frames and decodes them in order.
#[derive(Debug)]
pub struct MetaDumper {
    decoder: MetaDecoder,
    reader: FrameReader,
    stop: StopHandle,
    entries: Vec<Entry>,
}

impl MetaDumper {
    pub fn new(decoder: MetaDecoder, reader: FrameReader) -> Self {
        Self {
            decoder,
            reader,
            stop: StopHandle::default(),
            entries: Vec::new(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Decode until the writer closes with nothing buffered, or until a stop
    /// request arrives and the buffer is empty.
    ///
    /// Entries decoded before an error stay in `entries()`. On error the
    /// reader is closed so a producer waiting for room fails with
    /// `TransportClosed` instead of waiting forever.
    pub async fn run(&mut self) -> CodecResult<()> {
        let result = self.drain().await;
        if result.is_err() {
            self.reader.close();
        }
        result
    }

    async fn drain(&mut self) -> CodecResult<()> {
        let stopped = loop {
            match self.reader.try_read() {
                TryRead::Frame(frame) => {
                    self.decoder.decode_frame(frame, &mut self.entries)?;
                }
                TryRead::Closed => break false,
                TryRead::Empty if self.stop.is_requested() => break true,
                TryRead::Empty => tokio::task::yield_now().await,
            }
        };

        let frames = self.decoder.frames();
        if stopped {
            tracing::debug!("Decode loop stopped on request after {} frames", frames);
        } else {
            tracing::debug!(
                "Decode loop drained {} frames into {} entries",
                frames,
                self.entries.len()
            );
        }
        self.decoder.observer.drained(frames);
        Ok(())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}
