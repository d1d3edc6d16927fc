use std::path::PathBuf;

use agora_gateway::EmbeddedConfig;

use crate::error::{ClientError, Result};
use crate::reconciler::EchoPolicy;

pub const DEFAULT_TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub db_path: PathBuf,
    pub endpoint: String,
    pub database_id: String,
    pub jwt_secret: String,
    pub translate_url: String,
    pub translate_key: Option<String>,
    /// Posts per page of the main feed.
    pub feed_page_size: usize,
    /// Where password reset links point.
    pub recovery_url: String,
    pub echo_policy: EchoPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: "agora.db".into(),
            endpoint: "http://localhost:8080/v1".into(),
            database_id: "main".into(),
            jwt_secret: "dev-secret-change-me".into(),
            translate_url: DEFAULT_TRANSLATE_URL.into(),
            translate_key: None,
            feed_page_size: 9,
            recovery_url: "http://localhost:5173/reset-password".into(),
            echo_policy: EchoPolicy::Ignore,
        }
    }
}

impl ClientConfig {
    /// Read `AGORA_*` variables, falling back to defaults for anything unset.
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let feed_page_size = match var("AGORA_FEED_PAGE_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ClientError::Config(format!("AGORA_FEED_PAGE_SIZE: {}", raw)))?,
            None => defaults.feed_page_size,
        };

        let echo_policy = match var("AGORA_ECHO_POLICY").as_deref() {
            None | Some("ignore") => EchoPolicy::Ignore,
            Some("reconcile") => EchoPolicy::Reconcile,
            Some(other) => {
                return Err(ClientError::Config(format!("AGORA_ECHO_POLICY: {}", other)));
            }
        };

        Ok(Self {
            db_path: var("AGORA_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            endpoint: var("AGORA_ENDPOINT").unwrap_or(defaults.endpoint),
            database_id: var("AGORA_DATABASE_ID").unwrap_or(defaults.database_id),
            jwt_secret: var("AGORA_JWT_SECRET").unwrap_or(defaults.jwt_secret),
            translate_url: var("AGORA_TRANSLATE_URL").unwrap_or(defaults.translate_url),
            translate_key: var("AGORA_TRANSLATE_KEY"),
            feed_page_size,
            recovery_url: var("AGORA_RECOVERY_URL").unwrap_or(defaults.recovery_url),
            echo_policy,
        })
    }

    /// Settings for an in-process backend matching this client.
    pub fn embedded(&self) -> EmbeddedConfig {
        EmbeddedConfig {
            database_id: self.database_id.clone(),
            endpoint: self.endpoint.clone(),
            jwt_secret: self.jwt_secret.clone(),
            ..EmbeddedConfig::default()
        }
    }
}
