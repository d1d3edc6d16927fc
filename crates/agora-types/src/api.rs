use bytes::Bytes;
use chrono::{DateTime, Utc};

// -- Auth --

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub nationality: String,
}

#[derive(Debug, Clone)]
pub struct UpdateUser {
    pub user_id: String,
    pub name: String,
    pub bio: String,
    pub nationality: String,
    pub image_id: Option<String>,
    pub image_url: String,
    /// Replacement profile image, if any.
    pub file: Option<FileUpload>,
}

// -- Storage --

/// Raw bytes handed to the storage service.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

// -- Posts --

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: String,
    pub caption: String,
    pub file: FileUpload,
    pub location: Option<String>,
    /// Comma separated, e.g. `"travel, food"`.
    pub tags: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub post_id: String,
    pub caption: String,
    /// Replacement image; the current one is kept when absent.
    pub file: Option<FileUpload>,
    pub location: Option<String>,
    pub tags: Option<String>,
}

// -- Forums --

#[derive(Debug, Clone)]
pub struct NewForum {
    pub title: String,
    pub description: String,
    /// Must name one of the allowed forum themes.
    pub theme: String,
}

// -- Events --

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub country: String,
    pub date: Option<DateTime<Utc>>,
    pub image: FileUpload,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct UpdateEvent {
    pub title: String,
    pub description: String,
    pub country: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub image: Option<FileUpload>,
}
