use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named document collections exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Posts,
    Saves,
    Conversations,
    DirectMessages,
    Forums,
    ForumMessages,
    Events,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Self::Users,
        Self::Posts,
        Self::Saves,
        Self::Conversations,
        Self::DirectMessages,
        Self::Forums,
        Self::ForumMessages,
        Self::Events,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Posts => "posts",
            Self::Saves => "saves",
            Self::Conversations => "conversations",
            Self::DirectMessages => "direct_messages",
            Self::Forums => "forums",
            Self::ForumMessages => "forum_messages",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}
