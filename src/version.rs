//! Format tag constants for the binary container.
//!
//! The container is self-describing: the first eight bytes name the file
//! type and the layout version, and readers reject anything else.

/// File type tag for dialogue containers.
pub const DIALOG_FILE_TYPE: [u8; 4] = *b"DLG ";

/// Container layout version tag. The codec reads and writes exactly this
/// revision of the layout.
pub const CONTAINER_VERSION: [u8; 4] = *b"V3.2";

/// Byte length of the container header: two 4-byte tags plus six
/// little-endian (offset, count) pairs.
pub const HEADER_LEN: usize = 8 + 6 * 8;

/// Byte length of one struct record.
pub const STRUCT_RECORD_LEN: usize = 12;

/// Byte length of one field record.
pub const FIELD_RECORD_LEN: usize = 12;

/// Byte length of one label entry.
pub const LABEL_LEN: usize = 16;

/// Maximum byte length of a resource reference.
pub const RESREF_MAX_LEN: usize = 16;
