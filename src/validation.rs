use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::models::GenerationRequest;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".webp", ".gif"];
const MIN_API_KEY_LEN: usize = 10;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Image URL is required")]
    MissingImageUrl,
    #[error("URL must start with https:// or http://")]
    BadScheme,
    #[error("URL must contain a valid image extension (.jpg, .png, .webp, .gif)")]
    NoImageExtension,
    #[error("Invalid URL format")]
    MalformedUrl,
    #[error("API Key is required")]
    MissingApiKey,
    #[error("API Key must be at least 10 characters long")]
    ApiKeyTooShort,
    #[error("Invalid email format")]
    BadEmail,
}

pub type Validation = std::result::Result<(), ValidationError>;

/// Form fields that can be checked on their own while the user types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ImageUrl,
    ApiKey,
    Email,
}

pub fn validate_image_url(url: &str) -> Validation {
    if url.trim().is_empty() {
        return Err(ValidationError::MissingImageUrl);
    }

    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(ValidationError::BadScheme);
    }

    // Substring match so that query strings after the extension still pass.
    let lower = url.to_lowercase();
    if !IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
        return Err(ValidationError::NoImageExtension);
    }

    Url::parse(url).map_err(|_| ValidationError::MalformedUrl)?;
    Ok(())
}

pub fn validate_api_key(key: &str) -> Validation {
    if key.trim().is_empty() {
        return Err(ValidationError::MissingApiKey);
    }

    if key.chars().count() < MIN_API_KEY_LEN {
        return Err(ValidationError::ApiKeyTooShort);
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Validation {
    if email.trim().is_empty() {
        return Ok(());
    }

    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    });

    if !re.is_match(email) {
        return Err(ValidationError::BadEmail);
    }

    Ok(())
}

pub fn validate_field(field: Field, value: &str) -> Validation {
    match field {
        Field::ImageUrl => validate_image_url(value),
        Field::ApiKey => validate_api_key(value),
        Field::Email => validate_email(value),
    }
}

/// Checks URL, key and email in that order and reports the first failure.
pub fn validate_request(request: &GenerationRequest) -> Validation {
    validate_image_url(&request.image_url)?;
    validate_api_key(&request.api_key)?;
    validate_email(&request.email)?;
    Ok(())
}
