//! Merge logic for one message stream.
//!
//! A [`MessageList`] folds three unordered inputs into a single view: the
//! initial load, locally originated sends (shown as pending placeholders until
//! the backend answers), and realtime events. Every operation is a plain
//! state transition so the stream task and tests drive it the same way.
//!
//! The list never holds two entries with the same server id, and a pending
//! placeholder is dropped as soon as its confirmed message is present.
//! Entries keep arrival order; nothing is re-sorted by timestamp.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use agora_types::models::Message;
use agora_types::{Collection, EventKind, RealtimeEvent};

/// Correlates an optimistic placeholder with the send that produced it.
/// Drawn from a monotonic per-session counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u64);

impl LocalId {
    /// Id shown on the placeholder until the server id is known.
    pub fn temp_id(&self) -> String {
        format!("local-{}", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub message: Message,
    /// Set while the entry is an unconfirmed local send.
    pub pending: Option<LocalId>,
}

impl Entry {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// What to do with a create event authored by the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Drop it; the optimistic entry already shows the message.
    #[default]
    Ignore,
    /// Let it supersede the oldest pending entry with the same text, or
    /// append it when nothing is pending (e.g. sent from another device).
    Reconcile,
}

/// Which events belong to a stream and who "we" are.
#[derive(Debug, Clone)]
pub struct StreamScope {
    pub collection: Collection,
    pub stream_id: String,
    pub local_user: String,
    pub echo: EchoPolicy,
}

/// Outcome of [`MessageList::apply_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended,
    Updated,
    Removed,
    /// A pending entry was replaced by its confirmed message.
    Superseded(LocalId),
    /// The id is already present.
    Duplicate,
    OtherStream,
    OwnEcho,
    /// Unknown kind, undecodable payload, or an update/delete for an id we
    /// do not hold.
    Ignored,
}

impl Applied {
    /// Whether the visible list changed.
    pub fn changed(&self) -> bool {
        matches!(
            self,
            Self::Appended | Self::Updated | Self::Removed | Self::Superseded(_)
        )
    }
}

/// State captured when a full load starts, handed back to
/// [`MessageList::finish_sync`] with the loaded snapshot.
#[derive(Debug)]
pub struct SyncPoint {
    known: HashSet<String>,
    journal_from: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MessageList {
    entries: Vec<Entry>,
    /// Update (`Some`) and delete (`None`) events seen while a load is in
    /// flight, replayed over its snapshot.
    journal: Vec<(String, Option<Message>)>,
    syncs: usize,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a confirmed entry carries this server id.
    pub fn contains_id(&self, id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.pending.is_none() && e.message.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    /// Replace the confirmed contents with a fresh load. Sends still in
    /// flight keep their placeholders after the loaded messages.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        let point = self.begin_sync();
        self.finish_sync(point, messages);
    }

    /// Mark the start of a load that runs without holding the list.
    pub fn begin_sync(&mut self) -> SyncPoint {
        self.syncs += 1;
        SyncPoint {
            known: self.confirmed_ids(),
            journal_from: self.journal.len(),
        }
    }

    /// Merge the snapshot of a load started at `point`.
    ///
    /// The snapshot replaces what was confirmed when the load started.
    /// Confirmed entries that arrived while it ran are kept after it, edits
    /// and deletions seen meanwhile win over the snapshot, and pending
    /// placeholders stay last.
    pub fn finish_sync(&mut self, point: SyncPoint, messages: Vec<Message>) {
        let mut replayed: HashMap<&str, Option<&Message>> = HashMap::new();
        for (id, state) in &self.journal[point.journal_from.min(self.journal.len())..] {
            replayed.insert(id.as_str(), state.as_ref());
        }

        let mut merged: Vec<Entry> = Vec::with_capacity(messages.len());
        let mut seen = HashSet::new();
        for message in messages {
            let message = match replayed.get(message.id.as_str()) {
                Some(None) => continue,
                Some(Some(edited)) => (*edited).clone(),
                None => message,
            };
            if seen.insert(message.id.clone()) {
                merged.push(Entry {
                    message,
                    pending: None,
                });
            }
        }

        let mut pending = Vec::new();
        for entry in self.entries.drain(..) {
            if entry.is_pending() {
                pending.push(entry);
            } else if !point.known.contains(&entry.message.id) && seen.insert(entry.message.id.clone()) {
                merged.push(entry);
            }
        }
        merged.extend(pending);
        self.entries = merged;
        self.end_sync();
    }

    /// A load started at `point` failed; nothing is merged.
    pub fn abandon_sync(&mut self, _point: SyncPoint) {
        self.end_sync();
    }

    fn end_sync(&mut self) {
        self.syncs = self.syncs.saturating_sub(1);
        if self.syncs == 0 {
            self.journal.clear();
        }
    }

    fn confirmed_ids(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_pending())
            .map(|e| e.message.id.clone())
            .collect()
    }

    fn record(&mut self, id: &str, state: Option<Message>) {
        if self.syncs > 0 {
            self.journal.push((id.to_string(), state));
        }
    }

    /// Show a local send before the backend has answered.
    pub fn push_pending(&mut self, local: LocalId, mut message: Message) {
        message.id = local.temp_id();
        self.entries.push(Entry {
            message,
            pending: Some(local),
        });
    }

    /// The backend accepted the send. The placeholder becomes the confirmed
    /// message in place, or is dropped if the confirmed message already
    /// arrived by another route. Returns whether the list changed.
    pub fn confirm(&mut self, local: LocalId, confirmed: Message) -> bool {
        let slot = self.position_of(local);
        let present = self.contains_id(&confirmed.id);

        match (slot, present) {
            (Some(idx), true) => {
                self.entries.remove(idx);
                true
            }
            (Some(idx), false) => {
                self.entries[idx] = Entry {
                    message: confirmed,
                    pending: None,
                };
                true
            }
            (None, true) => false,
            (None, false) => {
                self.entries.push(Entry {
                    message: confirmed,
                    pending: None,
                });
                true
            }
        }
    }

    /// The send failed: remove its placeholder and hand it back.
    pub fn reject(&mut self, local: LocalId) -> Option<Message> {
        let idx = self.position_of(local)?;
        Some(self.entries.remove(idx).message)
    }

    /// Fold one realtime event into the list.
    pub fn apply_event(&mut self, event: &RealtimeEvent, scope: &StreamScope) -> Applied {
        if event.payload.collection != scope.collection {
            return Applied::OtherStream;
        }
        let Some(kind) = event.kind() else {
            return Applied::Ignored;
        };
        let message: Message = match event.payload.decode() {
            Ok(message) => message,
            Err(e) => {
                debug!("Skipping undecodable message {}: {}", event.payload.id, e);
                return Applied::Ignored;
            }
        };
        if message.stream_id != scope.stream_id {
            return Applied::OtherStream;
        }

        match kind {
            EventKind::Create => self.apply_create(message, scope),
            EventKind::Update => {
                self.record(&message.id, Some(message.clone()));
                match self.confirmed_position(&message.id) {
                    Some(idx) => {
                        self.entries[idx].message = message;
                        Applied::Updated
                    }
                    None => Applied::Ignored,
                }
            }
            EventKind::Delete => {
                self.record(&message.id, None);
                match self.confirmed_position(&message.id) {
                    Some(idx) => {
                        self.entries.remove(idx);
                        Applied::Removed
                    }
                    None => Applied::Ignored,
                }
            }
        }
    }

    fn apply_create(&mut self, message: Message, scope: &StreamScope) -> Applied {
        if self.contains_id(&message.id) {
            return Applied::Duplicate;
        }

        if message.sender_id == scope.local_user {
            match scope.echo {
                EchoPolicy::Ignore => return Applied::OwnEcho,
                EchoPolicy::Reconcile => {
                    let matched = self.entries.iter().position(|e| {
                        e.is_pending()
                            && e.message.sender_id == message.sender_id
                            && e.message.text == message.text
                    });
                    if let Some(idx) = matched {
                        let local = self.entries[idx].pending;
                        self.entries[idx] = Entry {
                            message,
                            pending: None,
                        };
                        if let Some(local) = local {
                            return Applied::Superseded(local);
                        }
                        return Applied::Appended;
                    }
                }
            }
        }

        self.entries.push(Entry {
            message,
            pending: None,
        });
        Applied::Appended
    }

    fn position_of(&self, local: LocalId) -> Option<usize> {
        self.entries.iter().position(|e| e.pending == Some(local))
    }

    fn confirmed_position(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.pending.is_none() && e.message.id == id)
    }
}
