//! Conversion between spans and InfluxDB rows.
//!
//! Everything here is pure: no I/O, no shared state.
//!
//! ```text
//! Span ──encode──► Point ──to_line──► line protocol
//!  ▲
//!  └──decode── ResultTable rows ◄── query transport
//! ```

pub mod decode;
pub mod encode;
pub mod point;
pub mod table;
pub mod timestamp;
pub mod value;

pub use decode::{decode_log, decode_span, parse_references, DecodedLog};
pub use encode::{encode_meta, encode_span, EncodeWarning, EncodedSpan};
pub use point::{FieldValue, Point};
pub use table::{Datum, ResultTable};
