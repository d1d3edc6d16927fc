use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agora_db::Database;
use agora_db::models::{DocumentRow, FileRow};
use agora_types::api::{FileUpload, NewAccount};
use agora_types::models::{Account, RecoveryToken, Session, StoredFile};
use agora_types::query::apply_queries;
use agora_types::{Collection, Document, EventKind, Query, RealtimeEvent};

use crate::backend::{Backend, DocumentList};
use crate::dispatcher::Dispatcher;
use crate::error::{GatewayError, Result};
use crate::subscription::Subscription;

/// 50 MB upload limit for files
const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct EmbeddedConfig {
    pub database_id: String,
    /// Base URL used when building file preview links.
    pub endpoint: String,
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub recovery_ttl: Duration,
    /// Realtime events buffered per subscriber before it starts to lag.
    pub event_capacity: usize,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            database_id: "main".into(),
            endpoint: "http://localhost:8080/v1".into(),
            jwt_secret: "dev-secret-change-me".into(),
            session_ttl: Duration::days(365),
            recovery_ttl: Duration::hours(1),
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    sid: String,
    exp: usize,
}

struct Store {
    db: Database,
    dispatcher: Dispatcher,
    config: EmbeddedConfig,
}

/// A [`Backend`] running in-process on SQLite.
///
/// Every clone shares the current session. [`EmbeddedBackend::connect`] hands
/// out a second client over the same store with its own session, which is how
/// several users are simulated against one backend.
#[derive(Clone)]
pub struct EmbeddedBackend {
    store: Arc<Store>,
    session: Arc<RwLock<Option<Session>>>,
}

impl EmbeddedBackend {
    pub fn open(path: &Path, config: EmbeddedConfig) -> anyhow::Result<Self> {
        let db = Database::open(path)?;
        Ok(Self::with_database(db, config))
    }

    pub fn in_memory(config: EmbeddedConfig) -> anyhow::Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db, config))
    }

    fn with_database(db: Database, config: EmbeddedConfig) -> Self {
        Self {
            store: Arc::new(Store {
                db,
                dispatcher: Dispatcher::with_capacity(config.event_capacity),
                config,
            }),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// A new client over the same store, without a session.
    pub fn connect(&self) -> Self {
        Self {
            store: self.store.clone(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.store.dispatcher
    }

    /// Run blocking DB work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                GatewayError::Internal(anyhow!("blocking task failed: {}", e))
            })?
            .map_err(GatewayError::Internal)
    }

    fn publish(&self, kind: EventKind, doc: &Document) {
        self.store
            .dispatcher
            .publish(RealtimeEvent::new(&self.store.config.database_id, kind, doc.clone()));
    }

    fn create_token(&self, account_id: &str, session_id: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: account_id.to_string(),
            sid: session_id.to_string(),
            exp: expires_at.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.store.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| GatewayError::Internal(e.into()))
    }
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn unique_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("password hashing failed: {}", e))
}

fn document_from_row(row: DocumentRow) -> anyhow::Result<Document> {
    let collection: Collection = row.collection.parse().map_err(|e: String| anyhow!(e))?;
    let data = match serde_json::from_str::<Value>(&row.data)? {
        Value::Object(map) => map,
        other => return Err(anyhow!("document {} holds non-object data: {}", row.id, other)),
    };

    Ok(Document {
        id: row.id,
        collection,
        created_at: parse_time(&row.created_at)?,
        updated_at: parse_time(&row.updated_at)?,
        data,
    })
}

fn stored_file_from_row(row: &FileRow) -> anyhow::Result<StoredFile> {
    Ok(StoredFile {
        id: row.id.clone(),
        name: row.name.clone(),
        mime_type: row.mime_type.clone(),
        size: row.size as u64,
        sha256: row.sha256.clone(),
        created_at: parse_time(&row.created_at)?,
    })
}

fn check_attributes(data: &Map<String, Value>) -> Result<()> {
    match data.keys().find(|k| k.starts_with('$')) {
        Some(key) => Err(GatewayError::InvalidInput(format!(
            "attribute names may not start with '$': {}",
            key
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl Backend for EmbeddedBackend {
    fn database_id(&self) -> &str {
        &self.store.config.database_id
    }

    // -- Accounts --

    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        if !account.email.contains('@') {
            return Err(GatewayError::InvalidInput("invalid email address".into()));
        }
        if account.password.len() < MIN_PASSWORD_LEN {
            return Err(GatewayError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let id = unique_id();
        let NewAccount { email, password, name } = account;
        let (aid, mail, display) = (id.clone(), email.clone(), name.clone());

        let created = self
            .blocking(move |db| {
                if db.get_account_by_email(&mail)?.is_some() {
                    return Ok(false);
                }
                let hash = hash_password(&password)?;
                db.create_account(&aid, &mail, &display, &hash)?;
                Ok(true)
            })
            .await?;

        if !created {
            return Err(GatewayError::Conflict(format!("account {} already exists", email)));
        }

        info!("Account {} created", id);
        Ok(Account { id, name, email })
    }

    async fn create_email_session(&self, email: &str, password: &str) -> Result<Session> {
        let mail = email.to_string();
        let password = password.to_string();
        let session_id = unique_id();
        let expires_at = Utc::now() + self.store.config.session_ttl;
        let sid = session_id.clone();
        let expires = expires_at.to_rfc3339_opts(SecondsFormat::Micros, true);

        let account_id = self
            .blocking(move |db| {
                let Some(account) = db.get_account_by_email(&mail)? else {
                    return Ok(None);
                };
                let parsed = PasswordHash::new(&account.password)
                    .map_err(|e| anyhow!("stored hash unreadable: {}", e))?;
                if Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_err()
                {
                    return Ok(None);
                }
                db.create_session(&sid, &account.id, &expires)?;
                Ok(Some(account.id))
            })
            .await?
            .ok_or_else(|| GatewayError::Unauthorized("invalid credentials".into()))?;

        let token = self.create_token(&account_id, &session_id, expires_at)?;
        let session = Session {
            id: session_id,
            account_id,
            token,
            expires_at,
        };

        *self.session.write().await = Some(session.clone());
        info!("Session {} opened for account {}", session.id, session.account_id);
        Ok(session)
    }

    async fn get_account(&self) -> Result<Account> {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or_else(|| GatewayError::Unauthorized("no active session".into()))?;

        let claims = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(self.store.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| GatewayError::Unauthorized(format!("invalid session token: {}", e)))?
        .claims;

        self.blocking(move |db| {
            if db.get_session(&claims.sid)?.is_none() {
                return Ok(None);
            }
            Ok(db.get_account_by_id(&claims.sub)?)
        })
        .await?
        .map(|row| Account {
            id: row.id,
            name: row.name,
            email: row.email,
        })
        .ok_or_else(|| GatewayError::Unauthorized("session revoked".into()))
    }

    async fn delete_session(&self) -> Result<()> {
        let session = self
            .session
            .write()
            .await
            .take()
            .ok_or_else(|| GatewayError::Unauthorized("no active session".into()))?;

        let sid = session.id.clone();
        self.blocking(move |db| db.delete_session(&sid)).await?;
        info!("Session {} closed", session.id);
        Ok(())
    }

    async fn create_recovery(&self, email: &str, redirect_url: &str) -> Result<RecoveryToken> {
        let mail = email.to_string();
        let secret = unique_id();
        let expires_at = Utc::now() + self.store.config.recovery_ttl;
        let (sec, expires) = (secret.clone(), expires_at.to_rfc3339_opts(SecondsFormat::Micros, true));

        let account_id = self
            .blocking(move |db| {
                let Some(account) = db.get_account_by_email(&mail)? else {
                    return Ok(None);
                };
                db.insert_recovery(&sec, &account.id, &expires)?;
                Ok(Some(account.id))
            })
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("no account for {}", email)))?;

        let separator = if redirect_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}userId={}&secret={}", redirect_url, separator, account_id, secret);

        debug!("Recovery issued for account {}", account_id);
        Ok(RecoveryToken {
            user_id: account_id,
            secret,
            expires_at,
            url,
        })
    }

    async fn update_recovery(&self, user_id: &str, secret: &str, password: &str) -> Result<()> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(GatewayError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let (uid, sec, password) = (user_id.to_string(), secret.to_string(), password.to_string());
        let updated = self
            .blocking(move |db| {
                let Some(recovery) = db.take_recovery(&sec, &uid)? else {
                    return Ok(false);
                };
                if parse_time(&recovery.expires_at)? < Utc::now() {
                    return Ok(false);
                }
                let hash = hash_password(&password)?;
                db.update_account_password(&uid, &hash)?;
                Ok(true)
            })
            .await?;

        if !updated {
            return Err(GatewayError::Unauthorized("invalid or expired recovery secret".into()));
        }
        info!("Password reset for account {}", user_id);
        Ok(())
    }

    // -- Documents --

    async fn create_document(
        &self,
        collection: Collection,
        id: Option<String>,
        data: Map<String, Value>,
    ) -> Result<Document> {
        check_attributes(&data)?;

        let id = id.unwrap_or_else(unique_id);
        let now = now_string();
        let body = serde_json::to_string(&data).map_err(|e| GatewayError::Internal(e.into()))?;
        let (did, stamp) = (id.clone(), now.clone());

        let inserted = self
            .blocking(move |db| db.insert_document(collection.as_str(), &did, &body, &stamp))
            .await?;
        if !inserted {
            return Err(GatewayError::Conflict(format!("{} document {} already exists", collection, id)));
        }

        let created_at = parse_time(&now)?;
        let doc = Document {
            id,
            collection,
            created_at,
            updated_at: created_at,
            data,
        };

        debug!("Created {} document {}", collection, doc.id);
        self.publish(EventKind::Create, &doc);
        Ok(doc)
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Document> {
        let did = id.to_string();
        let row = self
            .blocking(move |db| db.get_document(collection.as_str(), &did))
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("{} document {}", collection, id)))?;
        Ok(document_from_row(row)?)
    }

    async fn list_documents(&self, collection: Collection, queries: &[Query]) -> Result<DocumentList> {
        let rows = self
            .blocking(move |db| db.list_documents(collection.as_str()))
            .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            match document_from_row(row) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!("Skipping corrupt {} document: {}", collection, e),
            }
        }

        let total = docs
            .iter()
            .filter(|d| queries.iter().all(|q| q.matches(d)))
            .count();

        let documents = apply_queries(docs, queries)
            .map_err(|e| GatewayError::InvalidInput(format!("{} list: {}", collection, e)))?;
        Ok(DocumentList { total, documents })
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Document> {
        check_attributes(&patch)?;

        let did = id.to_string();
        let row = self
            .blocking(move |db| {
                db.update_document(collection.as_str(), &did, &now_string(), |stored| {
                    let mut data: Map<String, Value> = serde_json::from_str(stored)?;
                    data.extend(patch);
                    Ok(serde_json::to_string(&data)?)
                })
            })
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("{} document {}", collection, id)))?;

        let doc = document_from_row(row).map_err(GatewayError::Internal)?;
        self.publish(EventKind::Update, &doc);
        Ok(doc)
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<()> {
        let doc = self.get_document(collection, id).await?;
        let did = id.to_string();
        let deleted = self
            .blocking(move |db| db.delete_document(collection.as_str(), &did))
            .await?;
        if !deleted {
            return Err(GatewayError::NotFound(format!("{} document {}", collection, id)));
        }

        debug!("Deleted {} document {}", collection, id);
        self.publish(EventKind::Delete, &doc);
        Ok(())
    }

    // -- Storage --

    async fn create_file(&self, file: FileUpload) -> Result<StoredFile> {
        if file.bytes.is_empty() {
            return Err(GatewayError::InvalidInput("empty file".into()));
        }
        if file.bytes.len() > MAX_FILE_SIZE {
            return Err(GatewayError::InvalidInput(format!(
                "file exceeds {} bytes",
                MAX_FILE_SIZE
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(&file.bytes);

        let row = FileRow {
            id: unique_id(),
            name: file.name,
            mime_type: file.mime_type,
            size: file.bytes.len() as i64,
            sha256: hex::encode(hasher.finalize()),
            data: file.bytes.to_vec(),
            created_at: now_string(),
        };
        let stored = stored_file_from_row(&row)?;

        self.blocking(move |db| db.insert_file(&row)).await?;
        info!("Stored file {} ({} bytes)", stored.id, stored.size);
        Ok(stored)
    }

    fn get_file_preview(&self, file_id: &str) -> String {
        format!(
            "{}/storage/files/{}/preview?width=2000&height=2000&gravity=top&quality=100",
            self.store.config.endpoint.trim_end_matches('/'),
            file_id
        )
    }

    async fn get_file_bytes(&self, file_id: &str) -> Result<Bytes> {
        let fid = file_id.to_string();
        self.blocking(move |db| db.get_file(&fid))
            .await?
            .map(|row| Bytes::from(row.data))
            .ok_or_else(|| GatewayError::NotFound(format!("file {}", file_id)))
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let fid = file_id.to_string();
        if self.blocking(move |db| db.delete_file(&fid)).await? {
            info!("Deleted file {}", file_id);
            Ok(())
        } else {
            Err(GatewayError::NotFound(format!("file {}", file_id)))
        }
    }

    // -- Realtime --

    async fn subscribe(&self, channels: &[String]) -> Result<Subscription> {
        Ok(self.store.dispatcher.subscribe(channels))
    }
}
