// src/validators.rs
//! Field validation shared by the course, lesson and user handlers.
//!
//! Free-text fields may only link to YouTube; anything else is reported as
//! a field error and surfaces as a 400 response.
use crate::error::{ApiError, FieldErrors, field_errors};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use url::Url;
use validator::{Validate, ValidationError};

pub const EXTERNAL_LINK_MESSAGE: &str =
    "Links to external resources other than YouTube are not allowed.";
pub const VIDEO_LINK_MESSAGE: &str = "Only YouTube video links are allowed.";
pub const INVALID_URL_MESSAGE: &str = "Enter a valid URL.";
pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const BLANK_MESSAGE: &str = "This field may not be blank.";
pub const NUMERIC_PASSWORD_MESSAGE: &str = "This password is entirely numeric.";

const ALLOWED_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("URL pattern is valid"));

/// `youtube.com`, `youtu.be` and their subdomains.
pub fn is_allowed_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    ALLOWED_HOSTS.iter().any(|allowed| {
        host == *allowed
            || host
                .strip_suffix(allowed)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn url_host_allowed(candidate: &str) -> bool {
    Url::parse(candidate)
        .ok()
        .and_then(|url| url.host_str().map(is_allowed_host))
        .unwrap_or(false)
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

pub fn validate_no_external_links(text: &str) -> Result<(), ValidationError> {
    match URL_PATTERN
        .find_iter(text)
        .find(|found| !url_host_allowed(found.as_str()))
    {
        Some(found) => {
            tracing::debug!("Rejected external link: {}", found.as_str());
            Err(invalid("external_link", EXTERNAL_LINK_MESSAGE))
        }
        None => Ok(()),
    }
}

/// An empty link clears the field and passes.
pub fn validate_video_link(link: &str) -> Result<(), ValidationError> {
    let link = link.trim();
    if link.is_empty() {
        return Ok(());
    }
    let url = Url::parse(link).map_err(|_| invalid("url", INVALID_URL_MESSAGE))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("url", INVALID_URL_MESSAGE));
    }
    match url.host_str() {
        Some(host) if is_allowed_host(host) => Ok(()),
        _ => Err(invalid("video_link", VIDEO_LINK_MESSAGE)),
    }
}

pub fn validate_not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(invalid("blank", BLANK_MESSAGE));
    }
    Ok(())
}

pub fn validate_not_numeric(password: &str) -> Result<(), ValidationError> {
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("password_entirely_numeric", NUMERIC_PASSWORD_MESSAGE));
    }
    Ok(())
}

/// Field errors from a payload's declared rules, plus the checks that
/// depend on the request (required on full update, related rows).
#[derive(Debug, Default)]
pub struct FieldCheck {
    errors: FieldErrors,
}

impl FieldCheck {
    pub fn of(payload: &impl Validate) -> Self {
        let errors = match payload.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => field_errors(&e),
        };
        Self { errors }
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn require<T>(&mut self, field: &str, value: &Option<T>) {
        if value.is_none() {
            self.add(field, REQUIRED_MESSAGE);
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}
