//! Client layer of the social network: session context, message streams with
//! optimistic sends, the follow graph, feeds and the per-collection services.

pub mod config;
pub mod conversations;
pub mod error;
pub mod events;
pub mod feed;
pub mod follow;
pub mod forums;
pub mod posts;
pub mod reconciler;
pub mod session;
pub mod stream;
pub mod translate;
pub mod users;
pub mod validation;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session::SessionContext;
pub use stream::{MessageStream, StreamKind, StreamStatus};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use agora_types::Document;

pub(crate) fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> Result<Vec<T>> {
    docs.iter()
        .map(|d| d.decode().map_err(ClientError::from))
        .collect()
}

/// Unwrap a `json!({...})` literal into a document body.
pub(crate) fn attributes(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
