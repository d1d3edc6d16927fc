use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::{debug, error, warn};

use agora_types::Collection;
use agora_types::models::User;

use crate::error::{ClientError, Result};
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FollowStats {
    pub followers: usize,
    pub following: usize,
}

#[derive(Clone, Copy)]
enum Edge {
    Follow,
    Unfollow,
}

/// Toggles follow edges between users.
///
/// The local flag flips first so the UI can react immediately; the edge is
/// then written to both user documents (follower's `following`, followee's
/// `followers`). The two writes are not atomic: when the second fails the
/// first is not compensated, only the local flag is reverted, so the flag
/// and the stored graph can disagree until a fresh graph is built.
pub struct FollowGraph {
    ctx: Arc<SessionContext>,
    flags: Mutex<HashMap<(String, String), bool>>,
}

impl FollowGraph {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            flags: Mutex::new(HashMap::new()),
        }
    }

    pub async fn follow(&self, follower: &str, followee: &str) -> Result<()> {
        self.toggle(follower, followee, Edge::Follow).await
    }

    pub async fn unfollow(&self, follower: &str, followee: &str) -> Result<()> {
        self.toggle(follower, followee, Edge::Unfollow).await
    }

    /// The locally known state of the edge, falling back to the follower's
    /// document when nothing has been toggled here.
    pub async fn is_following(&self, follower: &str, followee: &str) -> Result<bool> {
        if let Some(flag) = self.flag(follower, followee) {
            return Ok(flag);
        }
        Ok(self.user(follower).await?.follows(followee))
    }

    pub async fn stats(&self, user_id: &str) -> Result<FollowStats> {
        let user = self.user(user_id).await?;
        Ok(FollowStats {
            followers: with_member(&user.followers, None).len(),
            following: with_member(&user.following, None).len(),
        })
    }

    async fn toggle(&self, follower: &str, followee: &str, edge: Edge) -> Result<()> {
        if follower == followee {
            return Err(ClientError::validation("Users cannot follow themselves."));
        }

        let previous = self.is_following(follower, followee).await?;
        self.set_flag(follower, followee, matches!(edge, Edge::Follow));

        let result = self.write_edge(follower, followee, edge).await;
        if let Err(e) = &result {
            warn!(
                "Follow update {} -> {} failed, reverting: {}",
                follower, followee, e
            );
            self.set_flag(follower, followee, previous);
        }
        result
    }

    async fn write_edge(&self, follower: &str, followee: &str, edge: Edge) -> Result<()> {
        let backend = self.ctx.backend();

        let source = self.user(follower).await?;
        let following = apply_edge(&source.following, followee, edge);
        let updated = backend
            .update_document(
                Collection::Users,
                follower,
                crate::attributes(json!({ "following": following })),
            )
            .await?;
        self.ctx.replace_user(updated.decode()?).await;

        let target = match self.user(followee).await {
            Ok(user) => user,
            Err(e) => {
                error!("Follow graph {} -> {} left one-sided: {}", follower, followee, e);
                return Err(e);
            }
        };
        let followers = apply_edge(&target.followers, follower, edge);
        if let Err(e) = backend
            .update_document(
                Collection::Users,
                followee,
                crate::attributes(json!({ "followers": followers })),
            )
            .await
        {
            error!("Follow graph {} -> {} left one-sided: {}", follower, followee, e);
            return Err(e.into());
        }

        debug!("Follow edge {} -> {} written", follower, followee);
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Result<User> {
        let doc = self.ctx.backend().get_document(Collection::Users, user_id).await?;
        Ok(doc.decode()?)
    }

    fn flag(&self, follower: &str, followee: &str) -> Option<bool> {
        let flags = self.flags.lock().ok()?;
        flags.get(&(follower.to_string(), followee.to_string())).copied()
    }

    fn set_flag(&self, follower: &str, followee: &str, value: bool) {
        if let Ok(mut flags) = self.flags.lock() {
            flags.insert((follower.to_string(), followee.to_string()), value);
        }
    }
}

fn apply_edge(list: &[String], id: &str, edge: Edge) -> Vec<String> {
    match edge {
        Edge::Follow => with_member(list, Some(id)),
        Edge::Unfollow => without_member(list, id),
    }
}

/// Deduplicated copy of `list`, plus `id` if given. Order of first
/// appearance is kept.
fn with_member(list: &[String], id: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(list.len() + 1);
    for item in list.iter().map(String::as_str).chain(id) {
        if !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn without_member(list: &[String], id: &str) -> Vec<String> {
    with_member(list, None).into_iter().filter(|o| o != id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn following_twice_keeps_one_entry() {
        let once = apply_edge(&ids(&["x"]), "b", Edge::Follow);
        let twice = apply_edge(&once, "b", Edge::Follow);
        assert_eq!(twice, ids(&["x", "b"]));
    }

    #[test]
    fn unfollow_removes_every_copy() {
        let list = ids(&["b", "x", "b"]);
        assert_eq!(apply_edge(&list, "b", Edge::Unfollow), ids(&["x"]));
        assert_eq!(apply_edge(&list, "zz", Edge::Unfollow), ids(&["b", "x"]));
    }
}
