//! Self-describing row stream codec.
//!
//! Architecture:
//! - `catalog`: Template registry (ID bands, lookup, JSON artifacts)
//! - `protocol`: Wire encoding/decoding of one message
//! - `types`: Source values, decoded entries, decimals
//! - `encoder`: Column kind to template selection
//! - `framer`: Row framing with optional group markers
//! - `decoder`: Frame dispatch and the decode loop
//! - `object`: Opaque object payload codec

pub mod catalog;
pub mod protocol;
pub mod types;
pub mod encoder;
pub mod framer;
pub mod decoder;
pub mod object;


// Public API re-exports for library consumers
pub use catalog::{Catalog, Category, Shape, Template, TemplateEntry, TemplateId};
pub use decoder::{DecodeObserver, MetaDecoder, MetaDumper, StopHandle, UnnamedNullPolicy};
pub use encoder::MetaEncoder;
pub use framer::{FrameSink, RowWriter};
#[allow(unused_imports)]
pub use object::{JsonObjectCodec, ObjectCodec};
#[allow(unused_imports)]
pub use protocol::{MetaMessage, Scalar};
pub use types::{Decimal, Entry, MetaValue, ScalarKind, BEGIN_GROUP, END_GROUP};
