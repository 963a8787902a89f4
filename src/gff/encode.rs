//! Binary container encoding.
//!
//! Encoding flattens the struct tree back into the six on-disk sections and
//! is the left inverse of decoding: `decode(encode(x))` reproduces `x`
//! field-for-field. Output is deterministic, with labels interned in
//! first-seen order.

use std::collections::HashMap;

use super::decode::MAX_NESTING_DEPTH;
use super::value::{fit_to_bytes, FieldKind, GffField, GffStruct, GffValue, LocString, NO_STRREF};
use super::GffError;
use crate::version::{CONTAINER_VERSION, DIALOG_FILE_TYPE, HEADER_LEN, LABEL_LEN};

/// Encodes a struct tree into a dialogue container.
pub fn encode(root: &GffStruct) -> Result<Vec<u8>, GffError> {
    encode_with_type(root, DIALOG_FILE_TYPE)
}

/// Encodes a struct tree with the given 4-byte file type tag.
pub fn encode_with_type(root: &GffStruct, file_type: [u8; 4]) -> Result<Vec<u8>, GffError> {
    let mut encoder = Encoder::default();
    encoder.encode_struct(root, 0)?;
    encoder.assemble(file_type)
}

#[derive(Default)]
struct Encoder {
    struct_records: Vec<StructRecord>,
    field_records: Vec<FieldRecord>,
    labels: Vec<[u8; LABEL_LEN]>,
    label_lookup: HashMap<String, u32>,
    field_data: Vec<u8>,
    field_indices: Vec<u8>,
    list_indices: Vec<u8>,
}

struct StructRecord {
    struct_type: u32,
    data: u32,
    field_count: u32,
}

struct FieldRecord {
    type_tag: u32,
    label_index: u32,
    data: u32,
}

impl Encoder {
    fn encode_struct(&mut self, st: &GffStruct, depth: u32) -> Result<u32, GffError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(GffError::TooDeep);
        }
        let struct_index = as_u32(self.struct_records.len())?;
        self.struct_records.push(StructRecord {
            struct_type: st.struct_type,
            data: 0,
            field_count: as_u32(st.fields.len())?,
        });

        let mut indices = Vec::with_capacity(st.fields.len());
        for field in &st.fields {
            indices.push(self.encode_field(field, depth)?);
        }

        let data = match indices.as_slice() {
            [] => 0,
            [only] => *only,
            many => {
                let offset = as_u32(self.field_indices.len())?;
                for index in many {
                    self.field_indices.extend_from_slice(&index.to_le_bytes());
                }
                offset
            }
        };
        self.struct_records[struct_index as usize].data = data;
        Ok(struct_index)
    }

    fn encode_field(&mut self, field: &GffField, depth: u32) -> Result<u32, GffError> {
        let label_index = self.intern_label(&field.label);
        let data = match &field.value {
            GffValue::Byte(v) => u32::from(*v),
            GffValue::Char(v) => u32::from(*v as u8),
            GffValue::Word(v) => u32::from(*v),
            GffValue::Short(v) => u32::from(*v as u16),
            GffValue::Dword(v) => *v,
            GffValue::Int(v) => *v as u32,
            GffValue::Float(v) => v.to_bits(),
            GffValue::Dword64(v) => self.push_data(&v.to_le_bytes())?,
            GffValue::Int64(v) => self.push_data(&v.to_le_bytes())?,
            GffValue::Double(v) => self.push_data(&v.to_bits().to_le_bytes())?,
            GffValue::String(v) => {
                let offset = as_u32(self.field_data.len())?;
                let len = as_u32(v.len())?;
                self.field_data.extend_from_slice(&len.to_le_bytes());
                self.field_data.extend_from_slice(v.as_bytes());
                offset
            }
            GffValue::ResRef(v) => {
                let offset = as_u32(self.field_data.len())?;
                self.field_data.push(v.as_str().len() as u8);
                self.field_data.extend_from_slice(v.as_str().as_bytes());
                offset
            }
            GffValue::LocString(v) => self.push_locstring(v)?,
            GffValue::Binary(v) => {
                let offset = as_u32(self.field_data.len())?;
                let len = as_u32(v.len())?;
                self.field_data.extend_from_slice(&len.to_le_bytes());
                self.field_data.extend_from_slice(v);
                offset
            }
            GffValue::Struct(inner) => self.encode_struct(inner, depth + 1)?,
            GffValue::List(items) => {
                let offset = as_u32(self.list_indices.len())?;
                let count = as_u32(items.len())?;
                self.list_indices.extend_from_slice(&count.to_le_bytes());
                let patch_base = self.list_indices.len();
                self.list_indices.resize(patch_base + items.len() * 4, 0);
                for (slot, item) in items.iter().enumerate() {
                    let struct_index = self.encode_struct(item, depth + 1)?;
                    let at = patch_base + slot * 4;
                    self.list_indices[at..at + 4].copy_from_slice(&struct_index.to_le_bytes());
                }
                offset
            }
        };

        let record_index = as_u32(self.field_records.len())?;
        self.field_records.push(FieldRecord {
            type_tag: field.value.kind() as u32,
            label_index,
            data,
        });
        Ok(record_index)
    }

    fn push_data(&mut self, bytes: &[u8]) -> Result<u32, GffError> {
        let offset = as_u32(self.field_data.len())?;
        self.field_data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn push_locstring(&mut self, loc: &LocString) -> Result<u32, GffError> {
        let offset = as_u32(self.field_data.len())?;
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&loc.strref.unwrap_or(NO_STRREF).to_le_bytes());
        body.extend_from_slice(&as_u32(loc.texts.len())?.to_le_bytes());
        for (language, text) in &loc.texts {
            body.extend_from_slice(&language.to_le_bytes());
            body.extend_from_slice(&as_u32(text.len())?.to_le_bytes());
            body.extend_from_slice(text.as_bytes());
        }
        let total = as_u32(body.len())?;
        self.field_data.extend_from_slice(&total.to_le_bytes());
        self.field_data.extend_from_slice(&body);
        Ok(offset)
    }

    fn intern_label(&mut self, label: &str) -> u32 {
        let fitted = fit_to_bytes(label, LABEL_LEN);
        if let Some(&index) = self.label_lookup.get(&fitted) {
            return index;
        }
        let mut padded = [0u8; LABEL_LEN];
        padded[..fitted.len()].copy_from_slice(fitted.as_bytes());
        let index = self.labels.len() as u32;
        self.labels.push(padded);
        self.label_lookup.insert(fitted, index);
        index
    }

    fn assemble(self, file_type: [u8; 4]) -> Result<Vec<u8>, GffError> {
        let struct_bytes = self.struct_records.len() * 12;
        let field_bytes = self.field_records.len() * 12;
        let label_bytes = self.labels.len() * LABEL_LEN;

        let total = HEADER_LEN
            + struct_bytes
            + field_bytes
            + label_bytes
            + self.field_data.len()
            + self.field_indices.len()
            + self.list_indices.len();
        if u32::try_from(total).is_err() {
            return Err(GffError::TooLarge);
        }

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&file_type);
        out.extend_from_slice(&CONTAINER_VERSION);

        let mut offset = HEADER_LEN as u32;
        let mut pair = |out: &mut Vec<u8>, count: u32, section_len: usize| {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            offset += section_len as u32;
        };
        pair(&mut out, self.struct_records.len() as u32, struct_bytes);
        pair(&mut out, self.field_records.len() as u32, field_bytes);
        pair(&mut out, self.labels.len() as u32, label_bytes);
        pair(&mut out, self.field_data.len() as u32, self.field_data.len());
        pair(
            &mut out,
            self.field_indices.len() as u32,
            self.field_indices.len(),
        );
        pair(
            &mut out,
            self.list_indices.len() as u32,
            self.list_indices.len(),
        );

        for record in &self.struct_records {
            out.extend_from_slice(&record.struct_type.to_le_bytes());
            out.extend_from_slice(&record.data.to_le_bytes());
            out.extend_from_slice(&record.field_count.to_le_bytes());
        }
        for record in &self.field_records {
            out.extend_from_slice(&record.type_tag.to_le_bytes());
            out.extend_from_slice(&record.label_index.to_le_bytes());
            out.extend_from_slice(&record.data.to_le_bytes());
        }
        for label in &self.labels {
            out.extend_from_slice(label);
        }
        out.extend_from_slice(&self.field_data);
        out.extend_from_slice(&self.field_indices);
        out.extend_from_slice(&self.list_indices);
        Ok(out)
    }
}

fn as_u32(value: usize) -> Result<u32, GffError> {
    u32::try_from(value).map_err(|_| GffError::TooLarge)
}

// FieldKind's discriminants are the wire tags, so the cast in
// `encode_field` must stay in sync with `FieldKind::from_tag`.
const _: () = assert!(FieldKind::List as u32 == 15);
