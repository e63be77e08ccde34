//! Sign-in credentials and their local validation.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Minimum password length accepted by the sign-in form.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Minimum length of the top-level domain label in an email address.
const MIN_TLD_LENGTH: usize = 2;

/// An email/password pair collected by a sign-in form.
///
/// Lives only for the duration of one submit attempt and is never persisted.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Email,
    Password,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Email => "email",
            Field::Password => "password",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: &'static str,
}

/// One or more field-level validation failures, in form order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", summarize(.errors))]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// Message for a given field, if that field failed
    pub fn get(&self, field: Field) -> Option<&'static str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field.name(), e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate a sign-in candidate without touching the network.
///
/// Returns the credentials unchanged on success. Each field reports at most
/// one error; an empty field reports "required" rather than a format error.
pub fn validate(candidate: Credentials) -> Result<Credentials, FieldErrors> {
    let mut errors = Vec::new();

    if candidate.email.is_empty() {
        errors.push(FieldError {
            field: Field::Email,
            message: "Email is required!",
        });
    } else if !is_valid_email(&candidate.email) {
        errors.push(FieldError {
            field: Field::Email,
            message: "Email must be a valid email address!",
        });
    }

    if candidate.password.is_empty() {
        errors.push(FieldError {
            field: Field::Password,
            message: "Password is required!",
        });
    } else if candidate.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError {
            field: Field::Password,
            message: "Password must be at least 6 characters!",
        });
    }

    if errors.is_empty() {
        Ok(candidate)
    } else {
        Err(FieldErrors { errors })
    }
}

/// Check an address against a practical `local@domain.tld` grammar.
pub fn is_valid_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if domain.contains('@') {
        return false;
    }
    is_valid_local_part(local) && is_valid_domain(domain)
}

fn is_valid_local_part(local: &str) -> bool {
    if local.is_empty() || local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    local.chars().all(|c| {
        !c.is_whitespace()
            && !c.is_control()
            && !matches!(c, '(' | ')' | '<' | '>' | ',' | ';' | ':' | '\\' | '"' | '[' | ']')
    })
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .map(|tld| tld.len() >= MIN_TLD_LENGTH && tld.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);
    labels_ok && tld_ok
}
