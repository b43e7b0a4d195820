//! Binary schema compiler and codec for the ARGUS control network.
//!
//! Every service and command on the network declares its payload with a tiny
//! textual format grammar (`"I:3;F:2;C"` and friends). This crate compiles
//! such format strings into immutable [`Schema`]s and provides the byte-exact
//! conversions built on them:
//!
//! - [`Schema::encode`] — console argument line to wire record,
//! - [`Schema::decode`] / [`Schema::decode_values`] — wire record back to
//!   text or typed [`Value`]s,
//! - [`Schema::to_column_layout`] / [`Schema::column_format`] — bridge to
//!   big-endian column files,
//! - [`hex_dump`] — diagnostics rendering.
//!
//! The same schema drives the wire protocol and the file output, so encode
//! and decode agree on layout by construction.

mod column;
mod decode;
mod encode;
mod error;
mod hex;
mod schema;

pub use column::ColumnSpec;
pub use decode::Value;
pub use error::CodecError;
pub use hex::hex_dump;
pub use schema::{Field, FieldKind, Repeat, Schema};
