use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use agora_types::api::{NewEvent, UpdateEvent};
use agora_types::models::Event;
use agora_types::{Collection, Query};

use crate::error::{ClientError, Result};
use crate::feed;
use crate::session::SessionContext;
use crate::validation;

pub struct Events {
    ctx: Arc<SessionContext>,
}

impl Events {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Validate, upload the cover image, then write the event. Nothing is
    /// uploaded when a required field is missing.
    pub async fn create(&self, event: NewEvent) -> Result<Event> {
        let date = validation::validate_new_event(&event)?;
        let me = self.ctx.require_user().await?;
        let backend = self.ctx.backend();

        let image = backend.create_file(event.image).await?;
        let body = crate::attributes(json!({
            "title": event.title.trim(),
            "description": event.description,
            "country": event.country,
            "date": date,
            "image": image.id,
            "location": event.location,
            "organizer": me.id,
            "attendees": [],
            "createdAt": Utc::now(),
        }));
        let doc = match backend.create_document(Collection::Events, None, body).await {
            Ok(doc) => doc,
            Err(e) => {
                self.discard_file(&image.id).await;
                return Err(e.into());
            }
        };
        info!("Created event {} in {}", doc.id, event.country);
        Ok(doc.decode()?)
    }

    /// Events in `country`, or all events, soonest first.
    pub async fn list_by_country(&self, country: Option<&str>) -> Result<Vec<Event>> {
        let queries: Vec<Query> = country.map(|c| Query::equal("country", c)).into_iter().collect();
        let list = self
            .ctx
            .backend()
            .list_documents(Collection::Events, &queries)
            .await?;
        let mut events: Vec<Event> = crate::decode_all(&list.documents)?;
        events.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(events)
    }

    pub async fn countries(&self) -> Result<Vec<String>> {
        let events = self.list_by_country(None).await?;
        Ok(feed::event_countries(&events))
    }

    pub fn image_url(&self, event: &Event) -> Option<String> {
        event
            .image
            .as_deref()
            .map(|id| self.ctx.backend().get_file_preview(id))
    }

    pub async fn get(&self, event_id: &str) -> Result<Event> {
        let doc = self.ctx.backend().get_document(Collection::Events, event_id).await?;
        Ok(doc.decode()?)
    }

    pub async fn attend(&self, event_id: &str) -> Result<Event> {
        let me = self.ctx.require_user().await?;
        let event = self.get(event_id).await?;
        if event.attendees.contains(&me.id) {
            return Ok(event);
        }
        let mut attendees = event.attendees;
        attendees.push(me.id);
        self.set_attendees(event_id, attendees).await
    }

    pub async fn unattend(&self, event_id: &str) -> Result<Event> {
        let me = self.ctx.require_user().await?;
        let event = self.get(event_id).await?;
        let attendees: Vec<String> = event.attendees.into_iter().filter(|a| *a != me.id).collect();
        self.set_attendees(event_id, attendees).await
    }

    /// Events organized by the signed-in user.
    pub async fn mine(&self) -> Result<Vec<Event>> {
        let me = self.ctx.require_user().await?;
        let list = self
            .ctx
            .backend()
            .list_documents(Collection::Events, &[Query::equal("organizer", me.id.as_str())])
            .await?;
        crate::decode_all(&list.documents)
    }

    pub async fn update(&self, event_id: &str, update: UpdateEvent) -> Result<Event> {
        if update.title.trim().is_empty() || update.country.trim().is_empty() {
            return Err(ClientError::validation("Required fields are missing"));
        }
        let current = self.organized(event_id).await?;
        let backend = self.ctx.backend();

        let replacement = match update.image {
            Some(file) => Some(backend.create_file(file).await?.id),
            None => None,
        };

        let mut patch = crate::attributes(json!({
            "title": update.title.trim(),
            "description": update.description,
            "country": update.country,
            "date": update.date,
            "location": update.location,
        }));
        if let Some(id) = &replacement {
            patch.insert("image".into(), json!(id));
        }

        let doc = match backend.update_document(Collection::Events, event_id, patch).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Some(id) = &replacement {
                    self.discard_file(id).await;
                }
                return Err(e.into());
            }
        };
        if let (Some(_), Some(old)) = (&replacement, &current.image) {
            self.discard_file(old).await;
        }
        Ok(doc.decode()?)
    }

    /// Delete an event and its image. Organizer only.
    pub async fn delete(&self, event_id: &str) -> Result<()> {
        let event = self.organized(event_id).await?;
        self.ctx.backend().delete_document(Collection::Events, event_id).await?;
        if let Some(image) = &event.image {
            self.discard_file(image).await;
        }
        info!("Deleted event {}", event_id);
        Ok(())
    }

    async fn set_attendees(&self, event_id: &str, attendees: Vec<String>) -> Result<Event> {
        let doc = self
            .ctx
            .backend()
            .update_document(
                Collection::Events,
                event_id,
                crate::attributes(json!({ "attendees": attendees })),
            )
            .await?;
        Ok(doc.decode()?)
    }

    async fn organized(&self, event_id: &str) -> Result<Event> {
        let me = self.ctx.require_user().await?;
        let event = self.get(event_id).await?;
        if event.organizer != me.id {
            return Err(ClientError::Forbidden(format!(
                "event {} is organized by another user",
                event_id
            )));
        }
        Ok(event)
    }

    async fn discard_file(&self, file_id: &str) {
        if let Err(e) = self.ctx.backend().delete_file(file_id).await {
            warn!("Failed to delete file {}: {}", file_id, e);
        }
    }
}
