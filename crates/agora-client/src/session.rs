use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Url;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use agora_gateway::{Backend, GatewayError};
use agora_types::api::{NewAccount, NewUser};
use agora_types::models::{RecoveryToken, User, to_attributes};
use agora_types::{Collection, Query};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::reconciler::LocalId;
use crate::validation;

/// The signed-in user plus everything a component needs to talk to the
/// backend. Created once at startup and shared by `Arc`; every service and
/// stream takes it in its constructor.
pub struct SessionContext {
    backend: Arc<dyn Backend>,
    config: ClientConfig,
    user: RwLock<Option<User>>,
    local_ids: AtomicU64,
}

impl SessionContext {
    pub fn new(backend: Arc<dyn Backend>, config: ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            backend,
            config,
            user: RwLock::new(None),
            local_ids: AtomicU64::new(0),
        })
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register an account, create its profile document and sign in.
    pub async fn sign_up(&self, new_user: NewUser) -> Result<User> {
        validation::validate_new_user(&new_user)?;

        let account = self
            .backend
            .create_account(NewAccount {
                email: new_user.email.clone(),
                password: new_user.password.clone(),
                name: new_user.name.clone(),
            })
            .await?;

        let avatar = self.initials_avatar(&new_user.name)?;
        let profile = User {
            id: String::new(),
            account_id: account.id.clone(),
            name: new_user.name.clone(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            image_url: avatar,
            image_id: None,
            bio: String::new(),
            nationality: new_user.nationality.clone(),
            followers: Vec::new(),
            following: Vec::new(),
        };
        let body = to_attributes(&profile)?;
        let doc = self.backend.create_document(Collection::Users, None, body).await?;
        info!("Signed up {} as user {}", account.email, doc.id);

        self.sign_in(&new_user.email, &new_user.password).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        self.backend.create_email_session(email, password).await?;
        match self.refresh().await? {
            Some(user) => {
                info!("Signed in as {}", user.username);
                Ok(user)
            }
            None => Err(ClientError::NotFound(format!("profile for {}", email))),
        }
    }

    /// Re-read the current account and its profile document. Returns `None`
    /// (and clears the context) when there is no valid session.
    pub async fn refresh(&self) -> Result<Option<User>> {
        let account = match self.backend.get_account().await {
            Ok(account) => account,
            Err(GatewayError::Unauthorized(reason)) => {
                debug!("No active session: {}", reason);
                *self.user.write().await = None;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let list = self
            .backend
            .list_documents(
                Collection::Users,
                &[Query::equal("accountId", account.id.as_str()), Query::limit(1)],
            )
            .await?;

        let user = match list.documents.first() {
            Some(doc) => Some(doc.decode::<User>()?),
            None => {
                warn!("Account {} has no profile document", account.id);
                None
            }
        };
        *self.user.write().await = user.clone();
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<()> {
        let result = self.backend.delete_session().await;
        *self.user.write().await = None;
        match result {
            Ok(()) | Err(GatewayError::Unauthorized(_)) => {
                info!("Signed out");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send a recovery link pointing at the configured reset page.
    pub async fn forgot_password(&self, email: &str) -> Result<RecoveryToken> {
        validation::validate_email(email)?;
        let token = self
            .backend
            .create_recovery(email, &self.config.recovery_url)
            .await?;
        info!("Recovery requested for {}", email);
        Ok(token)
    }

    pub async fn reset_password(
        &self,
        user_id: &str,
        secret: &str,
        password: &str,
        confirm: &str,
    ) -> Result<()> {
        if password != confirm {
            return Err(ClientError::validation("Passwords do not match."));
        }
        validation::validate_password(password)?;
        self.backend.update_recovery(user_id, secret, password).await?;
        Ok(())
    }

    pub async fn current_user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    /// The signed-in user, or `Unauthorized`.
    pub async fn require_user(&self) -> Result<User> {
        self.current_user().await.ok_or(ClientError::Unauthorized)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.user.read().await.is_some()
    }

    pub fn next_local_id(&self) -> LocalId {
        LocalId(self.local_ids.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Swap in a fresher copy of the signed-in user's profile. Ignored for
    /// other users.
    pub(crate) async fn replace_user(&self, user: User) {
        let mut current = self.user.write().await;
        if current.as_ref().is_some_and(|u| u.id == user.id) {
            *current = Some(user);
        }
    }

    fn initials_avatar(&self, name: &str) -> Result<String> {
        let base = format!("{}/avatars/initials", self.config.endpoint);
        Url::parse_with_params(&base, &[("name", name)])
            .map(String::from)
            .map_err(|e| ClientError::Config(format!("endpoint {}: {}", self.config.endpoint, e)))
    }
}
