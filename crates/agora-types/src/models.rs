use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::Collection;

/// A document as the backend stores it: an envelope plus free-form attributes.
/// Typed models are produced with [`Document::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$collection")]
    pub collection: Collection,
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "$updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    /// Decode into a typed model. Envelope fields are visible to the model
    /// as `$id`, `$createdAt` and `$updatedAt`.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }

    /// Look up an attribute by name, including the `$`-prefixed envelope fields.
    pub fn field(&self, name: &str) -> Option<Cow<'_, Value>> {
        match name {
            "$id" => Some(Cow::Owned(Value::String(self.id.clone()))),
            "$createdAt" => Some(Cow::Owned(Value::String(self.created_at.to_rfc3339()))),
            "$updatedAt" => Some(Cow::Owned(Value::String(self.updated_at.to_rfc3339()))),
            _ => self.data.get(name).map(Cow::Borrowed),
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
}

/// Serialize a model's attributes into a document body, dropping envelope fields.
pub fn to_attributes<T: Serialize>(value: &T) -> serde_json::Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(mut map) => {
            map.retain(|k, _| !k.starts_with('$'));
            Ok(map)
        }
        other => Err(serde::ser::Error::custom(format!(
            "expected an object, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "$id")]
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
}

impl User {
    pub fn follows(&self, other: &str) -> bool {
        self.following.iter().any(|id| id == other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "$id")]
    pub id: String,
    pub creator: String,
    pub caption: String,
    pub image_url: String,
    pub image_id: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A bookmark of a post by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Save {
    #[serde(rename = "$id")]
    pub id: String,
    pub user: String,
    pub post: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "$id")]
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub last_message: String,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether the participant set equals `participants`, ignoring order.
    pub fn has_participants(&self, participants: &[String]) -> bool {
        self.participants.len() == participants.len()
            && participants.iter().all(|p| self.participants.contains(p))
    }
}

/// A chat message in a conversation or forum stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "$id")]
    pub id: String,
    /// `conversationId` for direct messages, `forumId` for forum messages.
    #[serde(alias = "conversationId", alias = "forumId")]
    pub stream_id: String,
    pub sender_id: String,
    pub text: String,
    /// Display name carried by forum messages.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForumTheme {
    #[serde(rename = "Refugee crises")]
    RefugeeCrises,
    #[serde(rename = "Cultural conflicts")]
    CulturalConflicts,
    #[serde(rename = "Social problems")]
    SocialProblems,
    #[serde(rename = "International relations")]
    InternationalRelations,
}

impl ForumTheme {
    pub const ALL: [ForumTheme; 4] = [
        Self::RefugeeCrises,
        Self::CulturalConflicts,
        Self::SocialProblems,
        Self::InternationalRelations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefugeeCrises => "Refugee crises",
            Self::CulturalConflicts => "Cultural conflicts",
            Self::SocialProblems => "Social problems",
            Self::InternationalRelations => "International relations",
        }
    }
}

impl fmt::Display for ForumTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForumTheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid theme selected: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forum {
    #[serde(rename = "$id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub theme: ForumTheme,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "$id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub country: String,
    pub date: DateTime<Utc>,
    /// Storage file id of the cover image.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub location: String,
    pub organizer: String,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: String,
    pub account_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issued by a password recovery request; `secret` is what the reset link carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryToken {
    pub user_id: String,
    pub secret: String,
    pub expires_at: DateTime<Utc>,
    /// Redirect URL with `userId` and `secret` query parameters appended.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub sha256: String,
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
}
