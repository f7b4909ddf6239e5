//! Stage orchestration.
//!
//! Wires a producer (source adapter + encoder) to a spawned decode task over
//! a frame pipe and collects the decoded sequence.

use std::fmt;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};

use crate::config::StageConfig;
use crate::error::CodecError;
use crate::meta::decoder::{MetaDecoder, MetaDumper};
use crate::meta::encoder::MetaEncoder;
use crate::meta::framer::RowWriter;
use crate::meta::object::{JsonObjectCodec, ObjectCodec};
use crate::meta::types::Entry;
use crate::pipe::{frame_pipe, FrameWriter};
use crate::schema::{pump, RowCursor};
use crate::sqlite::{QuerySpec, SqliteError, SqliteSource};

/// Result of a completed stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub entries: Vec<Entry>,
    /// Rows the producer encoded
    pub rows: u64,
}

/// A failed stage, with everything decoded before the failure.
#[derive(Debug)]
pub struct StageError<E> {
    pub partial: Vec<Entry>,
    pub source: E,
}

impl<E> StageError<E> {
    fn new(partial: Vec<Entry>, source: E) -> Self {
        Self { partial, source }
    }
}

impl<E: fmt::Display> fmt::Display for StageError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} entries decoded before failure)",
            self.source,
            self.partial.len()
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for StageError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

type Decoded = (Vec<Entry>, Result<(), CodecError>);
type DecodeTask = JoinHandle<Decoded>;

/// Spawn the decode side of a stage and build the producer's half.
fn spawn_dumper(
    config: &StageConfig,
    objects: Arc<dyn ObjectCodec>,
) -> Result<(RowWriter, FrameWriter, DecodeTask), CodecError> {
    let catalog = config.load_catalog()?;
    let writer = RowWriter::new(
        MetaEncoder::new(catalog.clone()).with_object_codec(objects.clone()),
        config.emit_field_names,
        config.emit_row_markers,
    )?;
    let (sink, reader) = frame_pipe(config.pipe_capacity);
    let decoder = MetaDecoder::new(catalog)
        .with_unnamed_nulls(config.unnamed_nulls)
        .with_object_codec(objects);
    let mut dumper = MetaDumper::new(decoder, reader);

    let handle = tokio::spawn(async move {
        let result = dumper.run().await;
        (dumper.into_entries(), result)
    });
    Ok((writer, sink, handle))
}

/// Pick the error to report. A decode failure closes the reader, which makes
/// the producer fail with `TransportClosed`; the decode error is the cause.
fn settle<E>(
    produced: Result<u64, E>,
    joined: Result<Decoded, JoinError>,
) -> Result<StageOutput, StageError<E>>
where
    E: From<CodecError>,
{
    let (entries, decoded) = match joined {
        Ok(pair) => pair,
        Err(e) => {
            return Err(StageError::new(
                Vec::new(),
                CodecError::Task(e.to_string()).into(),
            ))
        }
    };

    match (produced, decoded) {
        (Ok(rows), Ok(())) => {
            tracing::debug!("Stage finished: {} rows, {} entries", rows, entries.len());
            Ok(StageOutput { entries, rows })
        }
        (_, Err(e)) => {
            tracing::error!("Stage failed while decoding: {}", e);
            Err(StageError::new(entries, e.into()))
        }
        (Err(e), Ok(())) => {
            tracing::error!("Stage failed while producing rows");
            Err(StageError::new(entries, e))
        }
    }
}

/// Stream every row of `cursor` through the codec.
///
/// The cursor runs on a blocking thread; decoding runs as an async task.
pub async fn run_cursor<C>(
    cursor: C,
    config: &StageConfig,
) -> Result<StageOutput, StageError<C::Error>>
where
    C: RowCursor + Send + 'static,
    C::Error: Send + 'static,
{
    run_cursor_with(cursor, config, Arc::new(JsonObjectCodec)).await
}

/// `run_cursor` with a custom payload codec for object columns.
pub async fn run_cursor_with<C>(
    cursor: C,
    config: &StageConfig,
    objects: Arc<dyn ObjectCodec>,
) -> Result<StageOutput, StageError<C::Error>>
where
    C: RowCursor + Send + 'static,
    C::Error: Send + 'static,
{
    let (mut writer, mut sink, handle) =
        spawn_dumper(config, objects).map_err(|e| StageError::new(Vec::new(), e.into()))?;

    let producer = tokio::task::spawn_blocking(move || {
        let mut cursor = cursor;
        let rows = pump(&mut cursor, &mut writer, &mut sink);
        sink.close();
        rows
    });

    let produced = match producer.await {
        Ok(rows) => rows,
        Err(e) => Err(CodecError::Task(e.to_string()).into()),
    };
    settle(produced, handle.await)
}

/// Run a query against `source` and return the decoded sequence.
pub async fn run_query(
    source: &SqliteSource,
    spec: QuerySpec,
    config: &StageConfig,
) -> Result<StageOutput, StageError<SqliteError>> {
    run_query_with(source, spec, config, Arc::new(JsonObjectCodec)).await
}

/// `run_query` with a custom payload codec for object columns.
pub async fn run_query_with(
    source: &SqliteSource,
    spec: QuerySpec,
    config: &StageConfig,
    objects: Arc<dyn ObjectCodec>,
) -> Result<StageOutput, StageError<SqliteError>> {
    let (writer, sink, handle) =
        spawn_dumper(config, objects).map_err(|e| StageError::new(Vec::new(), e.into()))?;

    let produced = source.stream_query(spec, writer, sink).await;
    settle(produced, handle.await)
}
