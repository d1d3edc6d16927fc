pub mod api;
pub mod collection;
pub mod models;
pub mod query;
pub mod realtime;

pub use collection::Collection;
pub use models::Document;
pub use query::Query;
pub use realtime::{EventKind, RealtimeEvent};
