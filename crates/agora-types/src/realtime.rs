use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::models::Document;

/// What happened to the document carried by a [`RealtimeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A change notification pushed by the backend's realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// Event names, most specific first, e.g.
    /// `databases.main.collections.direct_messages.documents.<id>.create`.
    pub events: Vec<String>,
    /// Channels the event is published on.
    pub channels: Vec<String>,
    pub payload: Document,
}

/// Channel carrying every document event of one collection.
pub fn documents_channel(database_id: &str, collection: Collection) -> String {
    format!("databases.{}.collections.{}.documents", database_id, collection)
}

impl RealtimeEvent {
    pub fn new(database_id: &str, kind: EventKind, payload: Document) -> Self {
        let channel = documents_channel(database_id, payload.collection);
        let events = vec![
            format!("{}.{}.{}", channel, payload.id, kind.as_str()),
            format!("{}.*.{}", channel, kind.as_str()),
            format!("databases.*.collections.*.documents.*.{}", kind.as_str()),
        ];
        Self {
            events,
            channels: vec![channel, "documents".to_string()],
            payload,
        }
    }

    /// The change kind, read from the event names.
    pub fn kind(&self) -> Option<EventKind> {
        let last = self.events.first()?.rsplit('.').next()?;
        match last {
            "create" => Some(EventKind::Create),
            "update" => Some(EventKind::Update),
            "delete" => Some(EventKind::Delete),
            _ => None,
        }
    }

    pub fn is(&self, kind: EventKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn on_channel(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }
}
