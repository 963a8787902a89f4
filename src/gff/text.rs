//! Plain-text interchange for the container tree.
//!
//! Same logical schema as the binary layout, rendered as pretty JSON with
//! explicitly tagged field types so same-width types (`Dword` vs `Int`)
//! survive the trip. Intended for tooling and debugging; not bit-critical.

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::value::GffStruct;
use super::GffError;
use crate::version::{CONTAINER_VERSION, DIALOG_FILE_TYPE};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct TextEnvelope {
    file_type: String,
    version: String,
    root: GffStruct,
}

/// Renders a struct tree as the JSON interchange text.
pub fn to_text(root: &GffStruct) -> Result<String, GffError> {
    let envelope = TextEnvelope {
        file_type: String::from_utf8_lossy(&DIALOG_FILE_TYPE).into_owned(),
        version: String::from_utf8_lossy(&CONTAINER_VERSION).into_owned(),
        root: root.clone(),
    };
    serde_json::to_string_pretty(&envelope).map_err(|err| GffError::Text(err.to_string()))
}

/// Parses the JSON interchange text back into a struct tree.
pub fn from_text(input: &str) -> Result<GffStruct, GffError> {
    let envelope: TextEnvelope =
        serde_json::from_str(input).map_err(|err| GffError::Text(err.to_string()))?;
    if envelope.version.as_bytes() != CONTAINER_VERSION {
        return Err(GffError::BadVersion);
    }
    Ok(envelope.root)
}

/// JSON schema of the interchange format, for external tooling.
pub fn text_schema() -> serde_json::Value {
    let schema = schema_for!(TextEnvelope);
    serde_json::to_value(schema).unwrap_or_default()
}
