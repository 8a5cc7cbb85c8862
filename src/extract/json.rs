//! JSON list extraction

use crate::identifier::{is_numeric, uri_suffix};
use crate::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default key for the record list inside a JSON object
pub const DEFAULT_LIST_KEY: &str = "items";

/// How the identifier field is turned into an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdMode {
    /// Take the segment after the last `:` (`spotify:show:ABC` -> `ABC`)
    #[default]
    UriSuffix,
    /// Use the value as-is
    Raw,
    /// Use the value only if it is a non-zero run of digits
    ///
    /// Directories such as PodcastIndex report a missing Apple id as
    /// `null` or `0`.
    Numeric,
}

/// Maps JSON element fields onto [`Record`] fields
///
/// Defaults describe the Spotify chart API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    /// Key holding the list in object payloads
    pub list_key: String,
    /// Identifier field
    pub id: String,
    /// Identifier derivation
    pub id_mode: IdMode,
    /// Display name field
    pub name: String,
    /// Publisher field
    pub publisher: String,
    /// Artwork URL field
    pub image_url: Option<String>,
    /// Description field
    pub description: Option<String>,
    /// Chart movement field
    pub movement: Option<String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            list_key: DEFAULT_LIST_KEY.to_string(),
            id: "showUri".to_string(),
            id_mode: IdMode::UriSuffix,
            name: "showName".to_string(),
            publisher: "showPublisher".to_string(),
            image_url: Some("showImageUrl".to_string()),
            description: Some("showDescription".to_string()),
            movement: Some("chartRankMove".to_string()),
        }
    }
}

impl FieldMap {
    /// Extract one record per list element
    ///
    /// Elements that are not objects still produce a record (with every
    /// field empty) so positions stay aligned with the source list.
    pub fn extract(&self, items: &[Value]) -> Vec<Record> {
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| self.record(item.as_object(), idx as u32 + 1))
            .collect()
    }

    fn record(&self, item: Option<&Map<String, Value>>, rank: u32) -> Record {
        let Some(item) = item else {
            return Record {
                rank,
                ..Default::default()
            };
        };

        let raw_id = text(item, &self.id);
        let id = match self.id_mode {
            IdMode::UriSuffix => uri_suffix(&raw_id).to_string(),
            IdMode::Raw => raw_id.trim().to_string(),
            IdMode::Numeric => {
                let id = raw_id.trim();
                if is_numeric(id) && id.bytes().any(|b| b != b'0') {
                    id.to_string()
                } else {
                    String::new()
                }
            }
        };

        Record {
            id,
            name: text(item, &self.name),
            publisher: text(item, &self.publisher),
            rank,
            image_url: optional(item, self.image_url.as_deref()),
            description: optional(item, self.description.as_deref()),
            movement: optional(item, self.movement.as_deref()),
        }
    }
}

/// String form of a field; numbers are stringified, anything else is empty
fn text(item: &Map<String, Value>, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn optional(item: &Map<String, Value>, key: Option<&str>) -> Option<String> {
    let value = text(item, key?);
    (!value.is_empty()).then_some(value)
}
