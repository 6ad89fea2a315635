//! Identity rewriting for migrated posts
//!
//! Only the fields the pipeline inspects are typed; everything else in a post
//! is carried through untouched in the flattened `extra` maps.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

use crate::services::errors::{MigrationError, MigrationResult};

/// A field that may be absent, explicitly null, or set
///
/// The outer `Option` tracks presence so an explicit null is written back.
pub type Nullable<T> = Option<Option<T>>;

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub entity: Nullable<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Post identifiers are strings on most servers, numbers on some
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostId {
    Text(String),
    Number(Number),
}

/// A post (or one version of a post) as exchanged with identity servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostItem {
    pub id: PostId,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub entity: Nullable<String>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub post_type: Nullable<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub version: Nullable<i64>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub mentions: Nullable<Vec<Mention>>,
    /// Repost content carries the reposted author's entity
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PostItem {
    pub fn from_value(value: Value) -> MigrationResult<Self> {
        serde_json::from_value(value).map_err(|e| MigrationError::malformed("post", e.to_string()))
    }

    pub fn into_value(self) -> MigrationResult<Value> {
        serde_json::to_value(self).map_err(|e| MigrationError::malformed("post", e.to_string()))
    }
}

/// Replaces the source identity with the destination identity in a post
#[derive(Debug, Clone)]
pub struct EntityRewriter {
    source: String,
    destination: String,
}

impl EntityRewriter {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    fn swap(&self, entity: &mut String) {
        if *entity == self.source {
            *entity = self.destination.clone();
        }
    }

    /// Rewrite owner, repost owner and mentions in place
    pub fn rewrite(&self, post: &mut PostItem) {
        if let Some(Some(entity)) = post.entity.as_mut() {
            self.swap(entity);
        }

        if let Some(Value::Object(content)) = post.content.as_mut() {
            if content.get("entity").and_then(Value::as_str) == Some(self.source.as_str()) {
                content.insert(
                    "entity".to_string(),
                    Value::String(self.destination.clone()),
                );
            }
        }

        for mention in post.mentions.iter_mut().flatten().flatten() {
            if let Some(Some(entity)) = mention.entity.as_mut() {
                self.swap(entity);
            }
        }
    }
}
