//! Remote data gateway: the narrow surface the client layer uses to reach the
//! backend (accounts, documents, file storage, realtime), plus an embedded
//! implementation backed by SQLite.

pub mod backend;
pub mod dispatcher;
pub mod embedded;
pub mod error;
pub mod subscription;

pub use backend::{Backend, DocumentList};
pub use dispatcher::Dispatcher;
pub use embedded::{EmbeddedBackend, EmbeddedConfig};
pub use error::{GatewayError, Result};
pub use subscription::Subscription;
