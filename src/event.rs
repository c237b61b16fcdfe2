use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key we set on every object we replaced.
pub const COMPRESSED_KEY: &str = "compressed";
pub const COMPRESSED_VALUE: &str = "yes";

const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/svg+xml",
];

/// Only exact matches count, no wildcards, no case folding.
pub fn is_allowed_content_type(content_type: &str) -> bool {
    ALLOWED_CONTENT_TYPES.contains(&content_type)
}

/// A notification that an object in a bucket was created or overwritten.
/// Field names follow the object resource the storage trigger delivers, anything missing is
/// treated as empty.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageEvent {
    pub bucket: String,
    pub name: String,
    pub content_type: String,
    pub cache_control: String,
    pub content_encoding: String,
    pub content_language: String,
    pub content_disposition: String,
    #[serde(deserialize_with = "deserialize_metadata")]
    pub metadata: HashMap<String, String>,
}

// The trigger sends `"metadata": null` for objects without custom metadata.
fn deserialize_metadata<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let metadata: Option<HashMap<String, String>> = Option::deserialize(deserializer)?;
    Ok(metadata.unwrap_or_default())
}

impl StorageEvent {
    /// Replacing an object triggers a new event for the same object. The marker we write on
    /// replace is what stops us from compressing our own output forever.
    pub fn is_already_processed(&self) -> bool {
        self.metadata
            .get(COMPRESSED_KEY)
            .is_some_and(|value| value == COMPRESSED_VALUE)
    }

    /// The event's metadata plus the compressed marker. The marker always wins.
    pub fn compressed_metadata(&self) -> HashMap<String, String> {
        let mut metadata = self.metadata.clone();
        metadata.insert(COMPRESSED_KEY.to_string(), COMPRESSED_VALUE.to_string());
        metadata
    }
}
