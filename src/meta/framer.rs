//! Row framing.
//!
//! A `RowWriter` turns one row into its frames: an optional BeginGroup, one
//! message per column, an optional EndGroup. Name emission and row markers
//! are fixed when the writer is built and hold for the whole query.

use bytes::Bytes;

use super::catalog::Catalog;
use super::encoder::MetaEncoder;
use super::protocol::MetaMessage;
use super::types::MetaValue;
use crate::error::{CodecError, CodecResult};
use crate::schema::ColumnMeta;

/// Destination for encoded frames.
pub trait FrameSink {
    fn send(&mut self, frame: Bytes) -> CodecResult<()>;
}

impl FrameSink for Vec<Bytes> {
    fn send(&mut self, frame: Bytes) -> CodecResult<()> {
        self.push(frame);
        Ok(())
    }
}

/// Emits the group markers around a row when enabled.
#[derive(Debug, Clone)]
pub struct GroupFramer {
    // Pre-encoded marker frames, present only when markers are on
    markers: Option<(Bytes, Bytes)>,
}

impl GroupFramer {
    pub fn new(catalog: &Catalog, emit_row_markers: bool) -> CodecResult<Self> {
        let markers = if emit_row_markers {
            let begin = MetaMessage::BeginGroup.encode(catalog)?.freeze();
            let end = MetaMessage::EndGroup.encode(catalog)?.freeze();
            Some((begin, end))
        } else {
            None
        };
        Ok(Self { markers })
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.markers.is_some()
    }

    pub fn begin_row<S: FrameSink + ?Sized>(&self, sink: &mut S) -> CodecResult<()> {
        match &self.markers {
            Some((begin, _)) => sink.send(begin.clone()),
            None => Ok(()),
        }
    }

    pub fn end_row<S: FrameSink + ?Sized>(&self, sink: &mut S) -> CodecResult<()> {
        match &self.markers {
            Some((_, end)) => sink.send(end.clone()),
            None => Ok(()),
        }
    }
}

/// Encoder plus framing policy for one query.
#[derive(Debug, Clone)]
pub struct RowWriter {
    encoder: MetaEncoder,
    framer: GroupFramer,
    emit_field_names: bool,
    rows: u64,
}

impl RowWriter {
    pub fn new(
        encoder: MetaEncoder,
        emit_field_names: bool,
        emit_row_markers: bool,
    ) -> CodecResult<Self> {
        let framer = GroupFramer::new(encoder.catalog(), emit_row_markers)?;
        Ok(Self {
            encoder,
            framer,
            emit_field_names,
            rows: 0,
        })
    }

    /// Shorthand for a writer over the built-in catalog.
    pub fn builtin(emit_field_names: bool, emit_row_markers: bool) -> CodecResult<Self> {
        Self::new(
            MetaEncoder::new(Catalog::builtin()),
            emit_field_names,
            emit_row_markers,
        )
    }

    /// Encode one row and push its frames into `sink`.
    ///
    /// Frames already sent stay sent if a later column fails.
    pub fn encode_row<S: FrameSink + ?Sized>(
        &mut self,
        columns: &[ColumnMeta],
        values: &[MetaValue],
        sink: &mut S,
    ) -> CodecResult<()> {
        if columns.len() != values.len() {
            return Err(CodecError::ColumnCountMismatch {
                expected: columns.len(),
                found: values.len(),
            });
        }

        self.framer.begin_row(sink)?;
        for (column, value) in columns.iter().zip(values) {
            let name = self.emit_field_names.then_some(column.name.as_str());
            sink.send(self.encoder.encode(column, name, value)?)?;
        }
        self.framer.end_row(sink)?;

        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn encoder(&self) -> &MetaEncoder {
        &self.encoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::types::ScalarKind;

    #[test]
    fn test_markers_bracket_each_row() {
        let mut writer = RowWriter::builtin(false, true).unwrap();
        let columns = [ColumnMeta::new(0, "A", ScalarKind::Integer)];
        let mut frames: Vec<Bytes> = Vec::new();

        writer
            .encode_row(&columns, &[MetaValue::Int(1)], &mut frames)
            .unwrap();
        writer
            .encode_row(&columns, &[MetaValue::Int(2)], &mut frames)
            .unwrap();

        assert_eq!(frames.len(), 6);
        assert_eq!(&frames[0][..], &144u32.to_be_bytes());
        assert_eq!(&frames[2][..], &146u32.to_be_bytes());
        assert_eq!(&frames[3][..], &144u32.to_be_bytes());
        assert_eq!(writer.rows(), 2);
    }

    #[test]
    fn test_no_markers_when_disabled() {
        let mut writer = RowWriter::builtin(false, false).unwrap();
        let columns = [ColumnMeta::new(0, "A", ScalarKind::Integer)];
        let mut frames: Vec<Bytes> = Vec::new();
        writer
            .encode_row(&columns, &[MetaValue::Int(1)], &mut frames)
            .unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_column_count_must_match() {
        let mut writer = RowWriter::builtin(false, false).unwrap();
        let columns = [ColumnMeta::new(0, "A", ScalarKind::Integer)];
        let mut frames: Vec<Bytes> = Vec::new();
        let err = writer
            .encode_row(&columns, &[], &mut frames)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::ColumnCountMismatch {
                expected: 1,
                found: 0
            }
        ));
        assert!(frames.is_empty());
    }
}
