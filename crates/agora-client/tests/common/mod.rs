#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;

use agora_client::{ClientConfig, MessageStream, SessionContext};
use agora_gateway::{Backend, DocumentList, EmbeddedBackend, EmbeddedConfig, GatewayError, Result, Subscription};
use agora_types::api::{FileUpload, NewAccount, NewUser};
use agora_types::models::{Account, Message, RecoveryToken, Session, StoredFile};
use agora_types::{Collection, Document, Query};

#[derive(Default)]
struct Faults {
    create_in: Option<Collection>,
    update_of: Option<String>,
    list_in: Option<Collection>,
    /// Creates wait for a permit while set.
    create_gate: Option<Arc<Semaphore>>,
    list_gate: Option<Arc<Semaphore>>,
}

/// Wraps an [`EmbeddedBackend`] and fails selected calls on demand.
pub struct FlakyBackend {
    inner: EmbeddedBackend,
    faults: Mutex<Faults>,
}

impl FlakyBackend {
    pub fn new(inner: EmbeddedBackend) -> Arc<Self> {
        Arc::new(Self {
            inner,
            faults: Mutex::new(Faults::default()),
        })
    }

    pub fn fail_creates_in(&self, collection: Option<Collection>) {
        self.faults.lock().unwrap().create_in = collection;
    }

    pub fn fail_updates_of(&self, id: Option<&str>) {
        self.faults.lock().unwrap().update_of = id.map(String::from);
    }

    pub fn fail_lists_in(&self, collection: Option<Collection>) {
        self.faults.lock().unwrap().list_in = collection;
    }

    /// Hold every create until a permit is added to the returned semaphore.
    pub fn hold_creates(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.faults.lock().unwrap().create_gate = Some(gate.clone());
        gate
    }

    /// Hold every list call until a permit is added to the returned semaphore.
    pub fn hold_lists(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.faults.lock().unwrap().list_gate = Some(gate.clone());
        gate
    }

    fn unavailable(what: &str) -> GatewayError {
        GatewayError::Unavailable(format!("injected failure: {}", what))
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    fn database_id(&self) -> &str {
        self.inner.database_id()
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        self.inner.create_account(account).await
    }

    async fn create_email_session(&self, email: &str, password: &str) -> Result<Session> {
        self.inner.create_email_session(email, password).await
    }

    async fn get_account(&self) -> Result<Account> {
        self.inner.get_account().await
    }

    async fn delete_session(&self) -> Result<()> {
        self.inner.delete_session().await
    }

    async fn create_recovery(&self, email: &str, redirect_url: &str) -> Result<RecoveryToken> {
        self.inner.create_recovery(email, redirect_url).await
    }

    async fn update_recovery(&self, user_id: &str, secret: &str, password: &str) -> Result<()> {
        self.inner.update_recovery(user_id, secret, password).await
    }

    async fn create_document(
        &self,
        collection: Collection,
        id: Option<String>,
        data: Map<String, Value>,
    ) -> Result<Document> {
        let (fail, gate) = {
            let faults = self.faults.lock().unwrap();
            (faults.create_in == Some(collection), faults.create_gate.clone())
        };
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        if fail {
            return Err(Self::unavailable("create"));
        }
        self.inner.create_document(collection, id, data).await
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Document> {
        self.inner.get_document(collection, id).await
    }

    async fn list_documents(&self, collection: Collection, queries: &[Query]) -> Result<DocumentList> {
        let (fail, gate) = {
            let faults = self.faults.lock().unwrap();
            (faults.list_in == Some(collection), faults.list_gate.clone())
        };
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        if fail {
            return Err(Self::unavailable("list"));
        }
        self.inner.list_documents(collection, queries).await
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Document> {
        if self.faults.lock().unwrap().update_of.as_deref() == Some(id) {
            return Err(Self::unavailable("update"));
        }
        self.inner.update_document(collection, id, patch).await
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<()> {
        self.inner.delete_document(collection, id).await
    }

    async fn create_file(&self, file: FileUpload) -> Result<StoredFile> {
        self.inner.create_file(file).await
    }

    fn get_file_preview(&self, file_id: &str) -> String {
        self.inner.get_file_preview(file_id)
    }

    async fn get_file_bytes(&self, file_id: &str) -> Result<Bytes> {
        self.inner.get_file_bytes(file_id).await
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.inner.delete_file(file_id).await
    }

    async fn subscribe(&self, channels: &[String]) -> Result<Subscription> {
        self.inner.subscribe(channels).await
    }
}

pub fn config() -> ClientConfig {
    ClientConfig {
        feed_page_size: 3,
        ..ClientConfig::default()
    }
}

pub fn embedded() -> EmbeddedBackend {
    EmbeddedBackend::in_memory(config().embedded()).unwrap()
}

/// A store whose subscribers start losing events after `capacity` unread ones.
pub fn embedded_with_event_capacity(capacity: usize) -> EmbeddedBackend {
    let config = EmbeddedConfig {
        event_capacity: capacity,
        ..config().embedded()
    };
    EmbeddedBackend::in_memory(config).unwrap()
}

pub fn new_user(username: &str) -> NewUser {
    NewUser {
        name: format!("{} Tester", username),
        email: format!("{}@example.com", username),
        username: username.to_string(),
        password: "password123".into(),
        nationality: "Germany".into(),
    }
}

/// Sign up `username` through `backend` and return its context.
pub async fn signed_up(backend: Arc<dyn Backend>, username: &str) -> Arc<SessionContext> {
    let ctx = SessionContext::new(backend, config());
    ctx.sign_up(new_user(username)).await.unwrap();
    ctx
}

pub async fn user_id(ctx: &SessionContext) -> String {
    ctx.current_user().await.unwrap().id
}

/// Wait until the stream's messages satisfy `done`.
pub async fn wait_for<F>(stream: &MessageStream, done: F) -> Vec<Message>
where
    F: Fn(&[Message]) -> bool,
{
    let mut changes = stream.changes();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let messages = stream.messages().await;
            if done(&messages) {
                return messages;
            }
            changes.changed().await.unwrap();
        }
    })
    .await
    .expect("stream did not reach the expected state")
}

pub fn upload(name: &str) -> FileUpload {
    FileUpload::new(name, "image/png", vec![0x89, b'P', b'N', b'G', 1, 2, 3])
}
