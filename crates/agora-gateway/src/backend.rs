use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

use agora_types::api::{FileUpload, NewAccount};
use agora_types::models::{Account, RecoveryToken, Session, StoredFile};
use agora_types::realtime::documents_channel;
use agora_types::{Collection, Document, Query};

use crate::error::Result;
use crate::subscription::Subscription;

/// Result of a list call. `total` counts every match before paging.
#[derive(Debug, Clone, Default)]
pub struct DocumentList {
    pub total: usize,
    pub documents: Vec<Document>,
}

/// Everything the client layer needs from the hosted backend.
///
/// One value represents one client session: account calls act on the
/// session it holds, document and storage calls are shared state.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Database id, used to name realtime channels.
    fn database_id(&self) -> &str;

    fn documents_channel(&self, collection: Collection) -> String {
        documents_channel(self.database_id(), collection)
    }

    // -- Accounts --

    async fn create_account(&self, account: NewAccount) -> Result<Account>;

    /// Sign in; the session is retained for later account calls.
    async fn create_email_session(&self, email: &str, password: &str) -> Result<Session>;

    async fn get_account(&self) -> Result<Account>;

    /// Sign out of the current session.
    async fn delete_session(&self) -> Result<()>;

    async fn create_recovery(&self, email: &str, redirect_url: &str) -> Result<RecoveryToken>;

    async fn update_recovery(&self, user_id: &str, secret: &str, password: &str) -> Result<()>;

    // -- Documents --

    /// Create a document. A fresh unique id is assigned when `id` is `None`.
    async fn create_document(
        &self,
        collection: Collection,
        id: Option<String>,
        data: Map<String, Value>,
    ) -> Result<Document>;

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Document>;

    async fn list_documents(&self, collection: Collection, queries: &[Query]) -> Result<DocumentList>;

    /// Merge `patch` into the document's attributes.
    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Document>;

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<()>;

    // -- Storage --

    async fn create_file(&self, file: FileUpload) -> Result<StoredFile>;

    /// Public preview URL of a stored image. Does not check that it exists.
    fn get_file_preview(&self, file_id: &str) -> String;

    async fn get_file_bytes(&self, file_id: &str) -> Result<Bytes>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;

    // -- Realtime --

    /// Open a realtime subscription on the given channels. The handle must be
    /// kept for as long as events are wanted; dropping it unsubscribes.
    async fn subscribe(&self, channels: &[String]) -> Result<Subscription>;
}
