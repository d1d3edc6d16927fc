use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use agora_types::models::{Conversation, Message, User, to_attributes};
use agora_types::{Collection, Query};

use crate::error::{ClientError, Result};
use crate::session::SessionContext;
use crate::stream::{MessageStream, StreamKind};

/// Profile summary of the other side of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub username: String,
    pub image_url: String,
    pub nationality: String,
}

impl From<User> for Participant {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            image_url: user.image_url,
            nationality: user.nationality,
        }
    }
}

pub struct Conversations {
    ctx: Arc<SessionContext>,
}

impl Conversations {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// The conversation between the signed-in user and `peer_id`, created
    /// on first use. An existing conversation is reused only when its
    /// participant set is exactly the pair.
    pub async fn open_with(&self, peer_id: &str) -> Result<Conversation> {
        let me = self.ctx.require_user().await?;
        if me.id == peer_id {
            return Err(ClientError::validation("Cannot start a conversation with yourself."));
        }
        let pair = vec![me.id.clone(), peer_id.to_string()];

        let existing = self
            .ctx
            .backend()
            .list_documents(Collection::Conversations, &[Query::contains("participants", me.id.as_str())])
            .await?;
        for doc in &existing.documents {
            let conversation: Conversation = doc.decode()?;
            if conversation.has_participants(&pair) {
                return Ok(conversation);
            }
        }

        // make sure the peer exists before creating anything
        self.ctx.backend().get_document(Collection::Users, peer_id).await?;

        let body = to_attributes(&Conversation {
            id: String::new(),
            participants: pair,
            last_message: String::new(),
            updated_at: Utc::now(),
        })?;
        let doc = self
            .ctx
            .backend()
            .create_document(Collection::Conversations, None, body)
            .await?;
        info!("Started conversation {} between {} and {}", doc.id, me.id, peer_id);
        Ok(doc.decode()?)
    }

    /// Conversations of the signed-in user, most recently active first.
    pub async fn list_mine(&self) -> Result<Vec<Conversation>> {
        let me = self.ctx.require_user().await?;
        let list = self
            .ctx
            .backend()
            .list_documents(Collection::Conversations, &[Query::contains("participants", me.id.as_str())])
            .await?;
        let mut conversations: Vec<Conversation> = crate::decode_all(&list.documents)?;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    pub async fn details(&self, conversation_id: &str) -> Result<Conversation> {
        let doc = self
            .ctx
            .backend()
            .get_document(Collection::Conversations, conversation_id)
            .await?;
        Ok(doc.decode()?)
    }

    pub async fn other_participant(&self, conversation: &Conversation) -> Result<Participant> {
        let me = self.ctx.require_user().await?;
        let other = conversation
            .participants
            .iter()
            .find(|p| **p != me.id)
            .ok_or_else(|| ClientError::NotFound(format!("peer in conversation {}", conversation.id)))?;
        let doc = self.ctx.backend().get_document(Collection::Users, other).await?;
        Ok(doc.decode::<User>()?.into())
    }

    pub async fn message(&self, message_id: &str) -> Result<Message> {
        let doc = self
            .ctx
            .backend()
            .get_document(Collection::DirectMessages, message_id)
            .await?;
        Ok(doc.decode()?)
    }

    pub async fn open_stream(&self, conversation_id: &str) -> Result<MessageStream> {
        let conversation = self.details(conversation_id).await?;
        let me = self.ctx.require_user().await?;
        if !conversation.participants.contains(&me.id) {
            return Err(ClientError::Forbidden(format!("conversation {}", conversation_id)));
        }
        MessageStream::open(self.ctx.clone(), StreamKind::Conversation, conversation_id).await
    }
}
