//! Read-only projections: the paged post feed and the filtered lists behind
//! the explore, events, forums and people pages.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use agora_types::models::{Event, Forum, ForumTheme, Post, User};
use agora_gateway::GatewayError;
use agora_types::{Collection, Query};

use crate::error::Result;
use crate::session::SessionContext;

pub const RECENT_POSTS: usize = 20;

/// Cursor pager over posts, most recently updated first. Pages are disjoint;
/// an empty page ends the feed.
///
/// Every post handed out stays a candidate cursor. If the current cursor post
/// was deleted the backend rejects it, and the pager falls back to the
/// previous post it handed out; posts between the two are gone as well, so
/// nothing is repeated or skipped.
pub struct PostFeed {
    ctx: Arc<SessionContext>,
    page_size: usize,
    anchors: Vec<String>,
    exhausted: bool,
}

impl PostFeed {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        let page_size = ctx.config().feed_page_size;
        Self {
            ctx,
            page_size,
            anchors: Vec::new(),
            exhausted: false,
        }
    }

    pub async fn next_page(&mut self) -> Result<Vec<Post>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let list = loop {
            let mut queries = vec![Query::order_desc("$updatedAt"), Query::limit(self.page_size)];
            if let Some(cursor) = self.anchors.last() {
                queries.push(Query::cursor_after(cursor));
            }

            match self.ctx.backend().list_documents(Collection::Posts, &queries).await {
                Ok(list) => break list,
                Err(GatewayError::InvalidInput(reason)) if !self.anchors.is_empty() => {
                    if let Some(gone) = self.anchors.pop() {
                        debug!("Feed cursor {} rejected ({}), stepping back", gone, reason);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };
        let posts: Vec<Post> = crate::decode_all(&list.documents)?;

        if posts.is_empty() {
            debug!("Post feed exhausted");
            self.exhausted = true;
        }
        self.anchors.extend(posts.iter().map(|p| p.id.clone()));
        Ok(posts)
    }

    pub fn has_next_page(&self) -> bool {
        !self.exhausted
    }

    pub fn reset(&mut self) {
        self.anchors.clear();
        self.exhausted = false;
    }
}

pub async fn recent_posts(ctx: &SessionContext) -> Result<Vec<Post>> {
    let list = ctx
        .backend()
        .list_documents(
            Collection::Posts,
            &[Query::order_desc("$createdAt"), Query::limit(RECENT_POSTS)],
        )
        .await?;
    crate::decode_all(&list.documents)
}

/// Posts whose caption contains `term`, case-insensitively.
pub async fn search_posts(ctx: &SessionContext, term: &str) -> Result<Vec<Post>> {
    let list = ctx
        .backend()
        .list_documents(Collection::Posts, &[Query::search("caption", term)])
        .await?;
    crate::decode_all(&list.documents)
}

pub async fn list_users(ctx: &SessionContext, limit: Option<usize>) -> Result<Vec<User>> {
    let mut queries = vec![Query::order_desc("$createdAt")];
    if let Some(limit) = limit {
        queries.push(Query::limit(limit));
    }
    let list = ctx.backend().list_documents(Collection::Users, &queries).await?;
    crate::decode_all(&list.documents)
}

/// Events in `country` (all countries when `None`) whose title contains
/// `search`, case-insensitively.
pub fn filter_events(events: &[Event], country: Option<&str>, search: &str) -> Vec<Event> {
    let needle = search.trim().to_lowercase();
    events
        .iter()
        .filter(|e| country.is_none_or(|c| e.country == c))
        .filter(|e| needle.is_empty() || e.title.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Distinct countries with at least one event, sorted.
pub fn event_countries(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| e.country.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn filter_forums(forums: &[Forum], theme: Option<ForumTheme>, search: &str) -> Vec<Forum> {
    let needle = search.trim().to_lowercase();
    forums
        .iter()
        .filter(|f| theme.is_none_or(|t| f.theme == t))
        .filter(|f| {
            needle.is_empty()
                || f.title.to_lowercase().contains(&needle)
                || f.description.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

pub fn users_excluding(users: &[User], user_id: &str) -> Vec<User> {
    users.iter().filter(|u| u.id != user_id).cloned().collect()
}
