use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use agora_types::api::NewForum;
use agora_types::models::Forum;
use agora_types::{Collection, Query};

use crate::error::{ClientError, Result};
use crate::session::SessionContext;
use crate::stream::{MessageStream, StreamKind};
use crate::validation;

pub struct Forums {
    ctx: Arc<SessionContext>,
}

impl Forums {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, forum: NewForum) -> Result<Forum> {
        let theme = validation::validate_new_forum(&forum)?;
        let me = self.ctx.require_user().await?;

        let body = crate::attributes(json!({
            "title": forum.title.trim(),
            "description": forum.description,
            "theme": theme,
            "createdBy": me.id,
            "createdAt": Utc::now(),
        }));
        let doc = self
            .ctx
            .backend()
            .create_document(Collection::Forums, None, body)
            .await?;
        info!("Created forum {} ({})", doc.id, theme);
        Ok(doc.decode()?)
    }

    /// All forums, newest first.
    pub async fn list(&self) -> Result<Vec<Forum>> {
        let list = self
            .ctx
            .backend()
            .list_documents(Collection::Forums, &[])
            .await?;
        let mut forums: Vec<Forum> = crate::decode_all(&list.documents)?;
        forums.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(forums)
    }

    pub async fn details(&self, forum_id: &str) -> Result<Forum> {
        let doc = self.ctx.backend().get_document(Collection::Forums, forum_id).await?;
        Ok(doc.decode()?)
    }

    /// Forums created by the signed-in user.
    pub async fn mine(&self) -> Result<Vec<Forum>> {
        let me = self.ctx.require_user().await?;
        let list = self
            .ctx
            .backend()
            .list_documents(Collection::Forums, &[Query::equal("createdBy", me.id.as_str())])
            .await?;
        crate::decode_all(&list.documents)
    }

    pub async fn update(&self, forum_id: &str, title: &str, description: &str) -> Result<Forum> {
        if title.trim().is_empty() {
            return Err(ClientError::validation("Forum title is required."));
        }
        self.owned(forum_id).await?;

        let patch = crate::attributes(json!({
            "title": title.trim(),
            "description": description,
        }));
        let doc = self
            .ctx
            .backend()
            .update_document(Collection::Forums, forum_id, patch)
            .await?;
        Ok(doc.decode()?)
    }

    /// Delete a forum and its messages. Creator only.
    pub async fn delete(&self, forum_id: &str) -> Result<()> {
        self.owned(forum_id).await?;
        let backend = self.ctx.backend();
        backend.delete_document(Collection::Forums, forum_id).await?;

        let messages = backend
            .list_documents(Collection::ForumMessages, &[Query::equal("forumId", forum_id)])
            .await?;
        for doc in &messages.documents {
            if let Err(e) = backend.delete_document(Collection::ForumMessages, &doc.id).await {
                warn!("Failed to delete message {} of forum {}: {}", doc.id, forum_id, e);
            }
        }
        info!("Deleted forum {} with {} messages", forum_id, messages.documents.len());
        Ok(())
    }

    pub async fn open_stream(&self, forum_id: &str) -> Result<MessageStream> {
        self.details(forum_id).await?;
        MessageStream::open(self.ctx.clone(), StreamKind::Forum, forum_id).await
    }

    async fn owned(&self, forum_id: &str) -> Result<Forum> {
        let me = self.ctx.require_user().await?;
        let forum = self.details(forum_id).await?;
        if forum.created_by != me.id {
            return Err(ClientError::Forbidden(format!(
                "forum {} belongs to another user",
                forum_id
            )));
        }
        Ok(forum)
    }
}
