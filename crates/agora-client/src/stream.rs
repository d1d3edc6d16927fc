use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use agora_gateway::Subscription;
use agora_types::models::Message;
use agora_types::{Collection, Query};

use crate::error::{ClientError, Result};
use crate::reconciler::{Entry, MessageList, StreamScope};
use crate::session::SessionContext;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Direct messages between two users.
    Conversation,
    Forum,
}

impl StreamKind {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Conversation => Collection::DirectMessages,
            Self::Forum => Collection::ForumMessages,
        }
    }

    /// Attribute naming the stream on each message document.
    pub fn stream_field(&self) -> &'static str {
        match self {
            Self::Conversation => "conversationId",
            Self::Forum => "forumId",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Loading,
    Ready,
    /// The last load failed; `reload` tries again.
    Failed(String),
}

struct StreamState {
    list: MessageList,
    status: StreamStatus,
}

/// What `reload` and the event pump share.
#[derive(Clone)]
struct Shared {
    ctx: Arc<SessionContext>,
    kind: StreamKind,
    scope: StreamScope,
    state: Arc<RwLock<StreamState>>,
    changes: Arc<watch::Sender<u64>>,
}

impl Shared {
    fn notify(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Load the full message set and merge it. The list stays readable and
    /// writable while the backend call runs; status reads `Loading` until
    /// the result is merged.
    async fn resync(&self) -> Result<()> {
        let point = {
            let mut state = self.state.write().await;
            state.status = StreamStatus::Loading;
            state.list.begin_sync()
        };
        self.notify();

        let queries = [
            Query::equal(self.kind.stream_field(), self.scope.stream_id.as_str()),
            Query::order_asc("$createdAt"),
        ];
        let loaded = match self
            .ctx
            .backend()
            .list_documents(self.scope.collection, &queries)
            .await
        {
            Ok(list) => crate::decode_all::<Message>(&list.documents),
            Err(e) => Err(e.into()),
        };

        let mut state = self.state.write().await;
        let result = match loaded {
            Ok(messages) => {
                debug!("Loaded {} messages for {}", messages.len(), self.scope.stream_id);
                state.list.finish_sync(point, messages);
                state.status = StreamStatus::Ready;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load stream {}: {}", self.scope.stream_id, e);
                state.list.abandon_sync(point);
                state.status = StreamStatus::Failed(e.to_string());
                Err(e)
            }
        };
        drop(state);
        self.notify();
        result
    }
}

/// A live view of one conversation or forum.
///
/// Opening subscribes to the stream's collection and then loads the current
/// messages; a background task folds realtime events into the list until the
/// stream is closed or dropped. The stream owns its subscription.
pub struct MessageStream {
    shared: Shared,
    pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream").finish_non_exhaustive()
    }
}

impl MessageStream {
    pub async fn open(ctx: Arc<SessionContext>, kind: StreamKind, stream_id: &str) -> Result<Self> {
        let user = ctx.require_user().await?;
        let scope = StreamScope {
            collection: kind.collection(),
            stream_id: stream_id.to_string(),
            local_user: user.id,
            echo: ctx.config().echo_policy,
        };

        let channel = ctx.backend().documents_channel(scope.collection);
        let subscription = ctx.backend().subscribe(&[channel]).await?;

        let state = Arc::new(RwLock::new(StreamState {
            list: MessageList::new(),
            status: StreamStatus::Loading,
        }));
        let (changes, _) = watch::channel(0u64);
        let changes = Arc::new(changes);

        let shared = Shared {
            ctx,
            kind,
            scope,
            state,
            changes,
        };
        let pump = tokio::spawn(pump_events(subscription, shared.clone()));

        let stream = Self {
            shared,
            pump: Mutex::new(Some(pump)),
            closed: AtomicBool::new(false),
        };

        if stream.reload().await.is_err() {
            debug!("Stream {} opened without messages", stream_id);
        }
        Ok(stream)
    }

    pub fn kind(&self) -> StreamKind {
        self.shared.kind
    }

    pub fn stream_id(&self) -> &str {
        &self.shared.scope.stream_id
    }

    /// Fetch the full message set and merge it into the list. Sends and
    /// realtime events carry on while the fetch runs.
    pub async fn reload(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::StreamClosed);
        }
        self.shared.resync().await
    }

    /// Post a message. It is shown at once as a pending entry, then either
    /// replaced by the confirmed message or removed if the backend refuses.
    pub async fn send(&self, text: &str) -> Result<Message> {
        if self.is_closed() {
            return Err(ClientError::StreamClosed);
        }
        validation::validate_message_text(text)?;
        let user = self.shared.ctx.require_user().await?;

        let local = self.shared.ctx.next_local_id();
        let now = Utc::now();
        let username = match self.shared.kind {
            StreamKind::Forum => Some(user.username.clone()),
            StreamKind::Conversation => None,
        };
        let placeholder = Message {
            id: String::new(),
            stream_id: self.shared.scope.stream_id.clone(),
            sender_id: user.id.clone(),
            text: text.to_string(),
            username: username.clone(),
            created_at: now,
        };
        self.shared.state.write().await.list.push_pending(local, placeholder);
        self.notify();

        let mut body = Map::new();
        body.insert(
            self.shared.kind.stream_field().to_string(),
            Value::String(self.shared.scope.stream_id.clone()),
        );
        body.insert("senderId".into(), Value::String(user.id.clone()));
        body.insert("text".into(), Value::String(text.to_string()));
        body.insert("createdAt".into(), json!(now));
        if let Some(username) = username {
            body.insert("username".into(), Value::String(username));
        }

        let created = self
            .shared
            .ctx
            .backend()
            .create_document(self.shared.scope.collection, None, body)
            .await
            .map_err(ClientError::from)
            .and_then(|doc| doc.decode::<Message>().map_err(ClientError::from));

        let message = match created {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Send {} to {} failed, rolling back: {}",
                    local, self.shared.scope.stream_id, e
                );
                self.shared.state.write().await.list.reject(local);
                self.notify();
                return Err(e);
            }
        };

        if self.shared.state.write().await.list.confirm(local, message.clone()) {
            self.notify();
        }
        trace!("Send {} confirmed as {}", local, message.id);

        if self.shared.kind == StreamKind::Conversation {
            self.touch_conversation(&message).await;
        }
        Ok(message)
    }

    /// Refresh the conversation's last-message cache. The message is already
    /// confirmed, so a failure here is only logged.
    async fn touch_conversation(&self, message: &Message) {
        let patch = crate::attributes(json!({
            "lastMessage": message.text,
            "updatedAt": message.created_at,
        }));
        if let Err(e) = self
            .shared
            .ctx
            .backend()
            .update_document(Collection::Conversations, &self.shared.scope.stream_id, patch)
            .await
        {
            warn!(
                "Failed to update last message of conversation {}: {}",
                self.shared.scope.stream_id, e
            );
        }
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.shared.state.read().await.list.messages()
    }

    pub async fn entries(&self) -> Vec<Entry> {
        self.shared.state.read().await.list.entries().to_vec()
    }

    pub async fn status(&self) -> StreamStatus {
        self.shared.state.read().await.status.clone()
    }

    /// A counter bumped on every visible change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop merging events and release the subscription. Once this returns
    /// no further event reaches the list.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = self.pump.lock().ok().and_then(|mut pump| pump.take());
        if let Some(handle) = handle {
            handle.abort();
            // Cancelled is the expected outcome; the subscription drops with the task
            let _ = handle.await;
        }
        info!("Closed stream {}", self.shared.scope.stream_id);
    }

    fn notify(&self) {
        self.shared.notify();
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(handle) = pump.take() {
                handle.abort();
            }
        }
    }
}

async fn pump_events(mut subscription: Subscription, shared: Shared) {
    let stream_id = shared.scope.stream_id.clone();
    while let Some(event) = subscription.next().await {
        let applied = shared.state.write().await.list.apply_event(&event, &shared.scope);
        trace!("Stream {} event {:?}: {:?}", stream_id, event.events.first(), applied);
        if applied.changed() {
            shared.notify();
        }

        let missed = subscription.take_missed();
        if missed > 0 {
            info!("Stream {} missed {} events, reloading", stream_id, missed);
            // a failure is reported through the stream status
            let _ = shared.resync().await;
        }
    }
    debug!("Event pump for {} finished", stream_id);
}
