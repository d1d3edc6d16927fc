/// Database row types, mapped directly from SQLite rows.
/// Timestamps are RFC 3339 strings written by the caller.

pub struct DocumentRow {
    pub seq: i64,
    pub collection: String,
    pub id: String,
    /// JSON object holding the document attributes.
    pub data: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct AccountRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
}

pub struct SessionRow {
    pub id: String,
    pub account_id: String,
    pub expires_at: String,
}

pub struct RecoveryRow {
    pub secret: String,
    pub account_id: String,
    pub expires_at: String,
}

pub struct FileRow {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub sha256: String,
    pub data: Vec<u8>,
    pub created_at: String,
}
