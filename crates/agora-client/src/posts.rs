use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use agora_types::api::{NewPost, UpdatePost};
use agora_types::models::{Post, Save};
use agora_types::{Collection, Query};

use crate::error::{ClientError, Result};
use crate::session::SessionContext;

pub struct Posts {
    ctx: Arc<SessionContext>,
}

impl Posts {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Upload the image, then write the post. The upload is removed again if
    /// the post cannot be written.
    pub async fn create(&self, post: NewPost) -> Result<Post> {
        let me = self.ctx.require_user().await?;
        if post.user_id != me.id {
            return Err(ClientError::Forbidden("posts are created by the signed-in user".into()));
        }
        let backend = self.ctx.backend();
        let file = backend.create_file(post.file).await?;
        let image_url = backend.get_file_preview(&file.id);

        let body = crate::attributes(json!({
            "creator": post.user_id,
            "caption": post.caption,
            "imageUrl": image_url,
            "imageId": file.id,
            "location": post.location,
            "tags": parse_tags(post.tags.as_deref()),
            "likes": [],
        }));
        let doc = match backend.create_document(Collection::Posts, None, body).await {
            Ok(doc) => doc,
            Err(e) => {
                self.discard_file(&file.id).await;
                return Err(e.into());
            }
        };
        info!("Created post {}", doc.id);
        Ok(doc.decode()?)
    }

    /// Edit a post, optionally swapping its image. On failure the new upload
    /// is removed; on success the replaced image is.
    pub async fn update(&self, post: UpdatePost) -> Result<Post> {
        let current = self.authored(&post.post_id).await?;
        let backend = self.ctx.backend();

        let replacement = match post.file {
            Some(file) => {
                let stored = backend.create_file(file).await?;
                let url = backend.get_file_preview(&stored.id);
                Some((stored.id, url))
            }
            None => None,
        };
        let (image_id, image_url) = match &replacement {
            Some((id, url)) => (id.clone(), url.clone()),
            None => (current.image_id.clone(), current.image_url.clone()),
        };

        let patch = crate::attributes(json!({
            "caption": post.caption,
            "imageUrl": image_url,
            "imageId": image_id,
            "location": post.location,
            "tags": parse_tags(post.tags.as_deref()),
        }));
        let doc = match backend.update_document(Collection::Posts, &post.post_id, patch).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Some((id, _)) = &replacement {
                    self.discard_file(id).await;
                }
                return Err(e.into());
            }
        };

        if replacement.is_some() {
            self.discard_file(&current.image_id).await;
        }
        Ok(doc.decode()?)
    }

    /// Delete one of the signed-in user's posts together with its image.
    pub async fn delete(&self, post_id: &str) -> Result<()> {
        let post = self.authored(post_id).await?;
        self.ctx.backend().delete_document(Collection::Posts, post_id).await?;
        self.discard_file(&post.image_id).await;
        info!("Deleted post {}", post_id);
        Ok(())
    }

    /// Replace the post's like set.
    pub async fn like(&self, post_id: &str, likes: &[String]) -> Result<Post> {
        self.ctx.require_user().await?;
        let mut unique: Vec<&String> = Vec::with_capacity(likes.len());
        for id in likes {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        let doc = self
            .ctx
            .backend()
            .update_document(Collection::Posts, post_id, crate::attributes(json!({ "likes": unique })))
            .await?;
        Ok(doc.decode()?)
    }

    /// Bookmark a post. Saving twice returns the existing bookmark.
    pub async fn save(&self, user_id: &str, post_id: &str) -> Result<Save> {
        let me = self.ctx.require_user().await?;
        if user_id != me.id {
            return Err(ClientError::Forbidden("bookmarks belong to the signed-in user".into()));
        }
        let backend = self.ctx.backend();
        let existing = backend
            .list_documents(
                Collection::Saves,
                &[Query::equal("user", user_id), Query::equal("post", post_id), Query::limit(1)],
            )
            .await?;
        if let Some(doc) = existing.documents.first() {
            return Ok(doc.decode()?);
        }

        let doc = backend
            .create_document(
                Collection::Saves,
                None,
                crate::attributes(json!({ "user": user_id, "post": post_id })),
            )
            .await?;
        Ok(doc.decode()?)
    }

    pub async fn unsave(&self, save_id: &str) -> Result<()> {
        self.ctx.backend().delete_document(Collection::Saves, save_id).await?;
        Ok(())
    }

    pub async fn saved_by(&self, user_id: &str) -> Result<Vec<Save>> {
        let list = self
            .ctx
            .backend()
            .list_documents(Collection::Saves, &[Query::equal("user", user_id)])
            .await?;
        crate::decode_all(&list.documents)
    }

    pub async fn by_id(&self, post_id: &str) -> Result<Post> {
        let doc = self.ctx.backend().get_document(Collection::Posts, post_id).await?;
        Ok(doc.decode()?)
    }

    pub async fn by_creator(&self, user_id: &str) -> Result<Vec<Post>> {
        let list = self
            .ctx
            .backend()
            .list_documents(
                Collection::Posts,
                &[Query::equal("creator", user_id), Query::order_desc("$createdAt")],
            )
            .await?;
        crate::decode_all(&list.documents)
    }

    pub async fn liked_by(&self, user_id: &str) -> Result<Vec<Post>> {
        let list = self
            .ctx
            .backend()
            .list_documents(Collection::Posts, &[Query::contains("likes", user_id)])
            .await?;
        crate::decode_all(&list.documents)
    }

    async fn authored(&self, post_id: &str) -> Result<Post> {
        let me = self.ctx.require_user().await?;
        let post = self.by_id(post_id).await?;
        if post.creator != me.id {
            return Err(ClientError::Forbidden(format!("post {} belongs to another user", post_id)));
        }
        Ok(post)
    }

    async fn discard_file(&self, file_id: &str) {
        if let Err(e) = self.ctx.backend().delete_file(file_id).await {
            warn!("Failed to delete file {}: {}", file_id, e);
        }
    }
}

/// Split a comma separated tag string, dropping whitespace and empty tags.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|tag| tag.split_whitespace().collect::<String>())
        .filter(|tag| !tag.is_empty())
        .collect()
}
