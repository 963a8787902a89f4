//! Self-describing structured binary container (GFF) codec.
//!
//! The container stores a tree of typed, labelled fields behind an
//! eight-byte type/version header and six (offset, count) section pairs.
//! This module is independent of dialogue semantics; the mapping to the
//! graph model lives in [`crate::adapter`].
//!
//! # Contracts
//! - **Decoding** validates every offset and count against the remaining
//!   file size before allocating, and returns [`GffError`] for any
//!   malformed input instead of panicking.
//! - **Encoding** is the left inverse of decoding and produces
//!   deterministic bytes.

mod decode;
mod encode;
mod text;
mod value;

pub use decode::{decode, decode_with_type, GffError, MAX_NESTING_DEPTH};
pub use encode::{encode, encode_with_type};
pub use text::{from_text, text_schema, to_text};
pub use value::{
    FieldKind, GffField, GffStruct, GffValue, LocString, ResRef, NO_STRREF, ROOT_STRUCT_TYPE,
};
