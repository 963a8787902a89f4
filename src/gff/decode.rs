//! Binary container decoding.
//!
//! Every offset and count coming from the file is validated against the
//! remaining byte length before any buffer is sized from it. Malformed
//! input of any shape returns [`GffError`]; the decoder never panics and
//! never allocates against an unchecked count. Struct references are
//! budgeted so a file cannot make the decoder expand shared records
//! exponentially: a well-formed container decodes each struct exactly
//! once.

use std::collections::BTreeMap;

use thiserror::Error;

use super::value::{FieldKind, GffField, GffStruct, GffValue, LocString, ResRef, NO_STRREF};
use crate::version::{
    CONTAINER_VERSION, DIALOG_FILE_TYPE, FIELD_RECORD_LEN, HEADER_LEN, LABEL_LEN,
    STRUCT_RECORD_LEN,
};

/// Maximum struct nesting the codec accepts, in either direction.
pub const MAX_NESTING_DEPTH: u32 = 64;

/// Errors produced by the container codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GffError {
    #[error("container smaller than its header")]
    TooSmall,
    #[error("bad file type tag")]
    BadFileType,
    #[error("unsupported container version")]
    BadVersion,
    #[error("{0} section does not fit in the file")]
    SectionOutOfBounds(&'static str),
    #[error("{kind} index {index} out of range")]
    IndexOutOfRange { kind: &'static str, index: u32 },
    #[error("field data truncated at offset {0}")]
    Truncated(u32),
    #[error("unknown field type tag {0}")]
    UnknownFieldType(u32),
    #[error("struct nesting exceeds the depth limit")]
    TooDeep,
    #[error("struct graph contains a cycle")]
    Cyclic,
    #[error("struct graph is not a tree")]
    NotATree,
    #[error("container exceeds the 4 GiB layout limit")]
    TooLarge,
    #[error("text interchange parse failed: {0}")]
    Text(String),
}

/// Decodes a binary container into its root struct.
pub fn decode(bytes: &[u8]) -> Result<GffStruct, GffError> {
    decode_with_type(bytes, DIALOG_FILE_TYPE)
}

/// Decodes a binary container, checking for the given 4-byte file type tag.
pub fn decode_with_type(bytes: &[u8], file_type: [u8; 4]) -> Result<GffStruct, GffError> {
    let sections = read_header(bytes, file_type)?;
    if sections.struct_count == 0 {
        return Err(GffError::IndexOutOfRange {
            kind: "struct",
            index: 0,
        });
    }
    let mut decoder = Decoder {
        in_path: vec![false; sections.struct_count as usize],
        decoded: 0,
        sections,
    };
    decoder.decode_struct(0, 0)
}

/// The six sections as validated sub-slices of the input.
struct Sections<'a> {
    structs: &'a [u8],
    struct_count: u32,
    fields: &'a [u8],
    field_count: u32,
    labels: &'a [u8],
    label_count: u32,
    field_data: &'a [u8],
    field_indices: &'a [u8],
    list_indices: &'a [u8],
}

fn read_header(bytes: &[u8], file_type: [u8; 4]) -> Result<Sections<'_>, GffError> {
    if bytes.len() < HEADER_LEN {
        return Err(GffError::TooSmall);
    }
    if bytes[0..4] != file_type {
        return Err(GffError::BadFileType);
    }
    if bytes[4..8] != CONTAINER_VERSION {
        return Err(GffError::BadVersion);
    }

    let pair = |index: usize| -> (u32, u32) {
        let base = 8 + index * 8;
        (le_u32_at(bytes, base), le_u32_at(bytes, base + 4))
    };

    let (struct_off, struct_count) = pair(0);
    let (field_off, field_count) = pair(1);
    let (label_off, label_count) = pair(2);
    let (data_off, data_len) = pair(3);
    let (fidx_off, fidx_len) = pair(4);
    let (lidx_off, lidx_len) = pair(5);

    // Record sections scale their count by the record size; the byte
    // sections use the count directly. Either way the product is checked
    // before a slice is taken.
    let structs = section(
        bytes,
        struct_off,
        struct_count,
        STRUCT_RECORD_LEN as u32,
        "struct",
    )?;
    let fields = section(bytes, field_off, field_count, FIELD_RECORD_LEN as u32, "field")?;
    let labels = section(bytes, label_off, label_count, LABEL_LEN as u32, "label")?;
    let field_data = section(bytes, data_off, data_len, 1, "field data")?;
    let field_indices = section(bytes, fidx_off, fidx_len, 1, "field index")?;
    let list_indices = section(bytes, lidx_off, lidx_len, 1, "list index")?;

    Ok(Sections {
        structs,
        struct_count,
        fields,
        field_count,
        labels,
        label_count,
        field_data,
        field_indices,
        list_indices,
    })
}

/// Validates that `count * unit` bytes starting at `offset` lie inside the
/// file, and returns that region.
fn section<'a>(
    bytes: &'a [u8],
    offset: u32,
    count: u32,
    unit: u32,
    what: &'static str,
) -> Result<&'a [u8], GffError> {
    let len = (count as u64)
        .checked_mul(unit as u64)
        .ok_or(GffError::SectionOutOfBounds(what))?;
    let end = (offset as u64)
        .checked_add(len)
        .ok_or(GffError::SectionOutOfBounds(what))?;
    if end > bytes.len() as u64 {
        return Err(GffError::SectionOutOfBounds(what));
    }
    Ok(&bytes[offset as usize..end as usize])
}

struct Decoder<'a> {
    sections: Sections<'a>,
    /// Struct indices on the current decode path, for cycle detection.
    in_path: Vec<bool>,
    /// Total struct expansions so far. A well-formed container decodes
    /// each struct once, so the budget is the struct count itself.
    decoded: u32,
}

impl Decoder<'_> {
    fn decode_struct(&mut self, struct_index: u32, depth: u32) -> Result<GffStruct, GffError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(GffError::TooDeep);
        }
        if struct_index >= self.sections.struct_count {
            return Err(GffError::IndexOutOfRange {
                kind: "struct",
                index: struct_index,
            });
        }
        if self.in_path[struct_index as usize] {
            return Err(GffError::Cyclic);
        }
        self.decoded += 1;
        if self.decoded > self.sections.struct_count {
            return Err(GffError::NotATree);
        }
        self.in_path[struct_index as usize] = true;

        let base = struct_index as usize * STRUCT_RECORD_LEN;
        let struct_type = le_u32_at(self.sections.structs, base);
        let data = le_u32_at(self.sections.structs, base + 4);
        let field_count = le_u32_at(self.sections.structs, base + 8);

        let result = self.decode_struct_fields(struct_type, data, field_count, depth);
        self.in_path[struct_index as usize] = false;
        result
    }

    fn decode_struct_fields(
        &mut self,
        struct_type: u32,
        data: u32,
        field_count: u32,
        depth: u32,
    ) -> Result<GffStruct, GffError> {
        // A struct cannot have more fields than the file has field
        // records, so the allocation below is bounded by an
        // already-validated count.
        if field_count > self.sections.field_count {
            return Err(GffError::IndexOutOfRange {
                kind: "field",
                index: field_count,
            });
        }

        let mut out = GffStruct::new(struct_type);
        out.fields.reserve(field_count as usize);

        if field_count == 1 {
            let field = self.decode_field(data, depth)?;
            out.fields.push(field);
            return Ok(out);
        }

        // The data word is a byte offset into the field-index block.
        for slot in 0..field_count {
            let index_pos = (data as u64)
                .checked_add(slot as u64 * 4)
                .ok_or(GffError::Truncated(data))?;
            let field_index = read_le_u32(self.sections.field_indices, index_pos)?;
            let field = self.decode_field(field_index, depth)?;
            out.fields.push(field);
        }
        Ok(out)
    }

    fn decode_field(&mut self, field_index: u32, depth: u32) -> Result<GffField, GffError> {
        if field_index >= self.sections.field_count {
            return Err(GffError::IndexOutOfRange {
                kind: "field",
                index: field_index,
            });
        }
        let base = field_index as usize * FIELD_RECORD_LEN;
        let type_tag = le_u32_at(self.sections.fields, base);
        let label_index = le_u32_at(self.sections.fields, base + 4);
        let data = le_u32_at(self.sections.fields, base + 8);

        let kind = FieldKind::from_tag(type_tag).ok_or(GffError::UnknownFieldType(type_tag))?;
        let label = self.decode_label(label_index)?;
        let value = self.decode_value(kind, data, depth)?;
        Ok(GffField { label, value })
    }

    fn decode_label(&self, label_index: u32) -> Result<String, GffError> {
        if label_index >= self.sections.label_count {
            return Err(GffError::IndexOutOfRange {
                kind: "label",
                index: label_index,
            });
        }
        let base = label_index as usize * LABEL_LEN;
        let raw = &self.sections.labels[base..base + LABEL_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(LABEL_LEN);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    fn decode_value(
        &mut self,
        kind: FieldKind,
        data: u32,
        depth: u32,
    ) -> Result<GffValue, GffError> {
        let field_data = self.sections.field_data;
        Ok(match kind {
            FieldKind::Byte => GffValue::Byte(data as u8),
            FieldKind::Char => GffValue::Char(data as u8 as i8),
            FieldKind::Word => GffValue::Word(data as u16),
            FieldKind::Short => GffValue::Short(data as u16 as i16),
            FieldKind::Dword => GffValue::Dword(data),
            FieldKind::Int => GffValue::Int(data as i32),
            FieldKind::Float => GffValue::Float(f32::from_bits(data)),
            FieldKind::Dword64 => GffValue::Dword64(read_le_u64(field_data, data as u64)?),
            FieldKind::Int64 => GffValue::Int64(read_le_u64(field_data, data as u64)? as i64),
            FieldKind::Double => {
                GffValue::Double(f64::from_bits(read_le_u64(field_data, data as u64)?))
            }
            FieldKind::String => {
                let len = read_le_u32(field_data, data as u64)?;
                let bytes = read_bytes(field_data, data as u64 + 4, len as u64)?;
                GffValue::String(String::from_utf8_lossy(bytes).into_owned())
            }
            FieldKind::ResRef => {
                let len = read_bytes(field_data, data as u64, 1)?[0];
                let bytes = read_bytes(field_data, data as u64 + 1, len as u64)?;
                GffValue::ResRef(ResRef::new(String::from_utf8_lossy(bytes).as_ref()))
            }
            FieldKind::LocString => GffValue::LocString(decode_locstring(field_data, data)?),
            FieldKind::Binary => {
                let len = read_le_u32(field_data, data as u64)?;
                let bytes = read_bytes(field_data, data as u64 + 4, len as u64)?;
                GffValue::Binary(bytes.to_vec())
            }
            FieldKind::Struct => {
                let inner = self.decode_struct(data, depth + 1)?;
                GffValue::Struct(Box::new(inner))
            }
            FieldKind::List => {
                let count = read_le_u32(self.sections.list_indices, data as u64)?;
                // Each list entry names a struct record, so the list
                // cannot be longer than the struct array it indexes into.
                if count > self.sections.struct_count {
                    return Err(GffError::IndexOutOfRange {
                        kind: "struct",
                        index: count,
                    });
                }
                let mut items = Vec::with_capacity(count as usize);
                for slot in 0..count {
                    let pos = data as u64 + 4 + slot as u64 * 4;
                    let struct_index = read_le_u32(self.sections.list_indices, pos)?;
                    items.push(self.decode_struct(struct_index, depth + 1)?);
                }
                GffValue::List(items)
            }
        })
    }
}

fn decode_locstring(field_data: &[u8], offset: u32) -> Result<LocString, GffError> {
    let total = read_le_u32(field_data, offset as u64)?;
    let region = read_bytes(field_data, offset as u64 + 4, total as u64)?;
    if region.len() < 8 {
        return Err(GffError::Truncated(offset));
    }
    let strref = le_u32_at(region, 0);
    let count = le_u32_at(region, 4);

    let mut texts = BTreeMap::new();
    let mut pos = 8u64;
    for _ in 0..count {
        let language = read_le_u32(region, pos)?;
        let len = read_le_u32(region, pos + 4)?;
        let bytes = read_bytes(region, pos + 8, len as u64)?;
        // Duplicate language ids resolve last-write-wins.
        texts.insert(language, String::from_utf8_lossy(bytes).into_owned());
        pos += 8 + len as u64;
    }

    Ok(LocString {
        strref: if strref == NO_STRREF {
            None
        } else {
            Some(strref)
        },
        texts,
    })
}

// =============================================================================
// Raw readers
// =============================================================================

/// Reads a little-endian u32 at a position already known to be in bounds.
fn le_u32_at(bytes: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}

fn read_bytes(bytes: &[u8], pos: u64, len: u64) -> Result<&[u8], GffError> {
    let end = pos.checked_add(len).ok_or(GffError::Truncated(pos as u32))?;
    if end > bytes.len() as u64 {
        return Err(GffError::Truncated(pos.min(u32::MAX as u64) as u32));
    }
    Ok(&bytes[pos as usize..end as usize])
}

fn read_le_u32(bytes: &[u8], pos: u64) -> Result<u32, GffError> {
    let slice = read_bytes(bytes, pos, 4)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_le_u64(bytes: &[u8], pos: u64) -> Result<u64, GffError> {
    let slice = read_bytes(bytes, pos, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Ok(u64::from_le_bytes(buf))
}
