use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use agora_types::Collection;
use agora_types::api::UpdateUser;
use agora_types::models::User;

use crate::error::{ClientError, Result};
use crate::feed;
use crate::session::SessionContext;
use crate::validation::NATIONALITIES;

pub struct Users {
    ctx: Arc<SessionContext>,
}

impl Users {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    pub async fn by_id(&self, user_id: &str) -> Result<User> {
        let doc = self.ctx.backend().get_document(Collection::Users, user_id).await?;
        Ok(doc.decode()?)
    }

    /// Everyone except the signed-in user.
    pub async fn others(&self, limit: Option<usize>) -> Result<Vec<User>> {
        let me = self.ctx.require_user().await?;
        let users = feed::list_users(&self.ctx, limit).await?;
        Ok(feed::users_excluding(&users, &me.id))
    }

    /// Edit a profile, optionally replacing its image. The old image is only
    /// deleted once the profile points at the new one.
    pub async fn update(&self, update: UpdateUser) -> Result<User> {
        if !update.nationality.is_empty() && !NATIONALITIES.contains(&update.nationality.as_str()) {
            return Err(ClientError::validation(format!(
                "Unsupported nationality: {}",
                update.nationality
            )));
        }
        let backend = self.ctx.backend();

        let replacement = match update.file {
            Some(file) => {
                let stored = backend.create_file(file).await?;
                let url = backend.get_file_preview(&stored.id);
                Some((stored.id, url))
            }
            None => None,
        };
        let (image_id, image_url) = match &replacement {
            Some((id, url)) => (Some(id.clone()), url.clone()),
            None => (update.image_id.clone(), update.image_url.clone()),
        };

        let patch = crate::attributes(json!({
            "name": update.name,
            "bio": update.bio,
            "nationality": update.nationality,
            "imageId": image_id,
            "imageUrl": image_url,
        }));
        let doc = match backend.update_document(Collection::Users, &update.user_id, patch).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Some((id, _)) = &replacement {
                    if let Err(e) = backend.delete_file(id).await {
                        warn!("Failed to delete file {}: {}", id, e);
                    }
                }
                return Err(e.into());
            }
        };

        if let (Some(_), Some(old)) = (&replacement, &update.image_id) {
            if let Err(e) = backend.delete_file(old).await {
                warn!("Failed to delete file {}: {}", old, e);
            }
        }

        let user: User = doc.decode()?;
        self.ctx.replace_user(user.clone()).await;
        info!("Updated profile {}", user.id);
        Ok(user)
    }
}
