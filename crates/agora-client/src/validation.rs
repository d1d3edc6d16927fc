use chrono::{DateTime, Utc};

use agora_types::api::{NewEvent, NewForum, NewUser};
use agora_types::models::ForumTheme;

use crate::error::{ClientError, Result};

/// Nationalities offered at sign-up.
pub const NATIONALITIES: &[&str] = &[
    "United Kingdom",
    "Bulgaria",
    "Germany",
    "Russia",
    "France",
    "Spain",
    "Italy",
    "Netherlands",
    "Poland",
    "Greece",
    "Portugal",
    "Sweden",
    "Denmark",
    "Norway",
    "Finland",
    "Japan",
    "China",
    "Brazil",
    "Mexico",
    "United States",
    "Canada",
    "India",
];

pub const MIN_NAME_LEN: usize = 2;
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_new_user(user: &NewUser) -> Result<()> {
    if user.name.trim().chars().count() < MIN_NAME_LEN {
        return Err(ClientError::validation("Name must be at least 2 characters."));
    }
    if user.username.trim().chars().count() < MIN_NAME_LEN {
        return Err(ClientError::validation("Username must be at least 2 characters."));
    }
    validate_email(&user.email)?;
    validate_password(&user.password)?;
    if !NATIONALITIES.contains(&user.nationality.as_str()) {
        return Err(ClientError::validation(format!(
            "Unsupported nationality: {}",
            user.nationality
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ClientError::validation("Invalid email address."))
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::validation("Password must be at least 8 characters."));
    }
    Ok(())
}

pub fn validate_new_forum(forum: &NewForum) -> Result<ForumTheme> {
    if forum.title.trim().is_empty() {
        return Err(ClientError::validation("Forum title is required."));
    }
    forum.theme.parse::<ForumTheme>().map_err(ClientError::Validation)
}

/// Checks the required event fields and returns the event date.
pub fn validate_new_event(event: &NewEvent) -> Result<DateTime<Utc>> {
    match event.date {
        Some(date) if !event.title.trim().is_empty() && !event.country.trim().is_empty() => Ok(date),
        _ => Err(ClientError::validation("Required fields are missing")),
    }
}

pub fn validate_message_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ClientError::validation("Message cannot be empty."));
    }
    Ok(())
}
