//! Generic container tree: structs, fields, and the field value types.
//!
//! The container knows nothing about dialogues. It stores a tree of typed
//! fields under 16-byte labels, exactly as the binary layout represents
//! them. The dialogue mapping lives in [`crate::adapter`].

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::version::RESREF_MAX_LEN;

/// Struct type tag of the root struct.
pub const ROOT_STRUCT_TYPE: u32 = 0xFFFF_FFFF;

/// Sentinel meaning "no external string reference" in a localized string.
pub const NO_STRREF: u32 = 0xFFFF_FFFF;

// =============================================================================
// Field type tags
// =============================================================================

/// Binary type tag of a field, as stored in the field record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum FieldKind {
    Byte = 0,
    Char = 1,
    Word = 2,
    Short = 3,
    Dword = 4,
    Int = 5,
    Dword64 = 6,
    Int64 = 7,
    Float = 8,
    Double = 9,
    String = 10,
    ResRef = 11,
    LocString = 12,
    Binary = 13,
    Struct = 14,
    List = 15,
}

impl FieldKind {
    /// Maps a stored type tag back to a field kind.
    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => Self::Byte,
            1 => Self::Char,
            2 => Self::Word,
            3 => Self::Short,
            4 => Self::Dword,
            5 => Self::Int,
            6 => Self::Dword64,
            7 => Self::Int64,
            8 => Self::Float,
            9 => Self::Double,
            10 => Self::String,
            11 => Self::ResRef,
            12 => Self::LocString,
            13 => Self::Binary,
            14 => Self::Struct,
            15 => Self::List,
            _ => return None,
        })
    }

    /// Whether the field value lives in the field-data block rather than
    /// inline in the field record's data word.
    pub fn is_complex(self) -> bool {
        matches!(
            self,
            Self::Dword64
                | Self::Int64
                | Self::Double
                | Self::String
                | Self::ResRef
                | Self::LocString
                | Self::Binary
        )
    }
}

// =============================================================================
// ResRef
// =============================================================================

/// A fixed-size resource reference: at most 16 bytes of text, truncated
/// (not rejected) on construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ResRef(String);

impl ResRef {
    /// Builds a resource reference, truncating to the 16-byte limit on a
    /// character boundary.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(fit_to_bytes(value.as_ref(), RESREF_MAX_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Truncates `value` to at most `max` bytes without splitting a character.
pub(crate) fn fit_to_bytes(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

// =============================================================================
// Localized strings
// =============================================================================

/// A localized string: zero or more (language id, text) pairs plus an
/// optional external string-table reference used as fallback when no inline
/// text exists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct LocString {
    /// External string-table reference, if any.
    pub strref: Option<u32>,
    /// Inline texts keyed by language id.
    pub texts: BTreeMap<u32, String>,
}

impl LocString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a localized string with a single inline text.
    pub fn with_text(language: u32, text: impl Into<String>) -> Self {
        let mut texts = BTreeMap::new();
        texts.insert(language, text.into());
        Self {
            strref: None,
            texts,
        }
    }

    /// Returns the text for `language` if present.
    pub fn text(&self, language: u32) -> Option<&str> {
        self.texts.get(&language).map(String::as_str)
    }

    /// Returns the lowest-language inline text, the usual display fallback.
    pub fn first_text(&self) -> Option<&str> {
        self.texts.values().next().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.strref.is_none() && self.texts.is_empty()
    }
}

// =============================================================================
// Values, fields, structs
// =============================================================================

/// A typed field value. The tag distinguishes same-width types (`Dword` vs
/// `Int`) so the text interchange round-trips exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum GffValue {
    Byte(u8),
    Char(i8),
    Word(u16),
    Short(i16),
    Dword(u32),
    Int(i32),
    Dword64(u64),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    ResRef(ResRef),
    LocString(LocString),
    Binary(Vec<u8>),
    Struct(Box<GffStruct>),
    List(Vec<GffStruct>),
}

impl GffValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Byte(_) => FieldKind::Byte,
            Self::Char(_) => FieldKind::Char,
            Self::Word(_) => FieldKind::Word,
            Self::Short(_) => FieldKind::Short,
            Self::Dword(_) => FieldKind::Dword,
            Self::Int(_) => FieldKind::Int,
            Self::Dword64(_) => FieldKind::Dword64,
            Self::Int64(_) => FieldKind::Int64,
            Self::Float(_) => FieldKind::Float,
            Self::Double(_) => FieldKind::Double,
            Self::String(_) => FieldKind::String,
            Self::ResRef(_) => FieldKind::ResRef,
            Self::LocString(_) => FieldKind::LocString,
            Self::Binary(_) => FieldKind::Binary,
            Self::Struct(_) => FieldKind::Struct,
            Self::List(_) => FieldKind::List,
        }
    }
}

/// A labelled field inside a struct. Label order is preserved so encoding
/// reproduces the decoded layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GffField {
    pub label: String,
    pub value: GffValue,
}

/// A struct in the container tree: a type tag and an ordered field list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GffStruct {
    pub struct_type: u32,
    pub fields: Vec<GffField>,
}

impl GffStruct {
    /// Creates an empty struct with the given type tag.
    pub fn new(struct_type: u32) -> Self {
        Self {
            struct_type,
            fields: Vec::new(),
        }
    }

    /// Creates the top-level struct.
    pub fn root() -> Self {
        Self::new(ROOT_STRUCT_TYPE)
    }

    /// Appends a field, truncating the label to the 16-byte limit.
    pub fn add(&mut self, label: &str, value: GffValue) -> &mut Self {
        self.fields.push(GffField {
            label: fit_to_bytes(label, crate::version::LABEL_LEN),
            value,
        });
        self
    }

    /// Looks up the first field with the given label.
    pub fn field(&self, label: &str) -> Option<&GffValue> {
        self.fields
            .iter()
            .find(|field| field.label == label)
            .map(|field| &field.value)
    }

    pub fn get_u8(&self, label: &str) -> Option<u8> {
        match self.field(label)? {
            GffValue::Byte(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_u32(&self, label: &str) -> Option<u32> {
        match self.field(label)? {
            GffValue::Dword(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_str(&self, label: &str) -> Option<&str> {
        match self.field(label)? {
            GffValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_resref(&self, label: &str) -> Option<&ResRef> {
        match self.field(label)? {
            GffValue::ResRef(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_locstring(&self, label: &str) -> Option<&LocString> {
        match self.field(label)? {
            GffValue::LocString(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_list(&self, label: &str) -> Option<&[GffStruct]> {
        match self.field(label)? {
            GffValue::List(value) => Some(value),
            _ => None,
        }
    }
}

// =============================================================================
// Arbitrary (fuzzing support)
// =============================================================================

#[cfg(feature = "arbitrary")]
mod arb {
    use super::{GffField, GffStruct, GffValue, LocString, ResRef};
    use arbitrary::{Arbitrary, Unstructured};

    // Generation is depth-bounded so fuzz inputs cannot build trees the
    // codec itself would refuse.
    const MAX_GEN_DEPTH: u32 = 6;
    const MAX_GEN_FIELDS: usize = 8;

    fn arb_label(u: &mut Unstructured<'_>) -> arbitrary::Result<String> {
        let len = u.int_in_range(1..=16u8)? as usize;
        let mut label = String::with_capacity(len);
        for _ in 0..len {
            let byte = u.int_in_range(b'A'..=b'Z')?;
            label.push(byte as char);
        }
        Ok(label)
    }

    fn arb_value(u: &mut Unstructured<'_>, depth: u32) -> arbitrary::Result<GffValue> {
        let max_variant = if depth >= MAX_GEN_DEPTH { 13 } else { 15 };
        Ok(match u.int_in_range(0..=max_variant)? {
            0 => GffValue::Byte(u.arbitrary()?),
            1 => GffValue::Char(u.arbitrary()?),
            2 => GffValue::Word(u.arbitrary()?),
            3 => GffValue::Short(u.arbitrary()?),
            4 => GffValue::Dword(u.arbitrary()?),
            5 => GffValue::Int(u.arbitrary()?),
            6 => GffValue::Dword64(u.arbitrary()?),
            7 => GffValue::Int64(u.arbitrary()?),
            8 => GffValue::Float(u.arbitrary()?),
            9 => GffValue::Double(u.arbitrary()?),
            10 => GffValue::String(u.arbitrary()?),
            11 => GffValue::ResRef(ResRef::new(String::arbitrary(u)?)),
            12 => GffValue::LocString(LocString::arbitrary(u)?),
            13 => GffValue::Binary(u.arbitrary()?),
            14 => GffValue::Struct(Box::new(arb_struct(u, depth + 1)?)),
            _ => {
                let len = u.int_in_range(0..=4u8)? as usize;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(arb_struct(u, depth + 1)?);
                }
                GffValue::List(items)
            }
        })
    }

    fn arb_struct(u: &mut Unstructured<'_>, depth: u32) -> arbitrary::Result<GffStruct> {
        let field_count = u.int_in_range(0..=MAX_GEN_FIELDS as u8)? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(GffField {
                label: arb_label(u)?,
                value: arb_value(u, depth)?,
            });
        }
        Ok(GffStruct {
            struct_type: u.arbitrary()?,
            fields,
        })
    }

    impl<'a> Arbitrary<'a> for GffStruct {
        fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
            arb_struct(u, 0)
        }
    }
}
