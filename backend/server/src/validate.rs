use std::fmt;

use serde::Deserialize;
use thiserror::Error;

pub const NO_COMMENTS: &str = "No comments provided";

/// Contact form body as posted by the browser.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub comments: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    FirstName,
    LastName,
    Email,
    Phone,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Field::FirstName => "first name",
            Field::LastName => "last name",
            Field::Email => "email",
            Field::Phone => "phone",
        };

        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(Field),
}

/// Presence checks only, no format checks: an odd looking email is still stored.
pub fn validate(form: ContactForm) -> Result<ContactSubmission, ValidationError> {
    let first_name = require(form.first_name, Field::FirstName)?;
    let last_name = require(form.last_name, Field::LastName)?;
    let email = require(form.email, Field::Email)?;
    let phone = require(form.phone, Field::Phone)?;

    Ok(ContactSubmission {
        name: format!("{first_name} {last_name}"),
        email: email.to_lowercase(),
        phone,
        message: optional(form.comments).unwrap_or_else(|| NO_COMMENTS.to_string()),
        address: optional(form.address),
        city: optional(form.city),
        state: optional(form.state),
        source_url: optional(form.source_url),
    })
}

fn require(value: Option<String>, field: Field) -> Result<String, ValidationError> {
    optional(value).ok_or(ValidationError::MissingField(field))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ContactForm {
        ContactForm {
            first_name: Some("  Ada ".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some(" Ada@Example.COM ".to_string()),
            phone: Some(" 555-1234 ".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_complete_form() {
        let submission = validate(complete()).unwrap();

        assert_eq!(submission.name, "Ada Lovelace");
        assert_eq!(submission.email, "ada@example.com");
        assert_eq!(submission.phone, "555-1234");
        assert_eq!(submission.message, NO_COMMENTS);
        assert_eq!(submission.address, None);
    }

    #[test]
    fn keeps_trimmed_optional_fields() {
        let form = ContactForm {
            comments: Some("  call after 5  ".to_string()),
            city: Some(" Springfield".to_string()),
            state: Some("   ".to_string()),
            ..complete()
        };

        let submission = validate(form).unwrap();

        assert_eq!(submission.message, "call after 5");
        assert_eq!(submission.city.as_deref(), Some("Springfield"));
        assert_eq!(submission.state, None);
    }

    #[test]
    fn reports_first_missing_field() {
        let form = ContactForm {
            phone: None,
            ..complete()
        };
        assert_eq!(
            validate(form).unwrap_err(),
            ValidationError::MissingField(Field::Phone)
        );

        let form = ContactForm {
            last_name: Some(" ".to_string()),
            email: None,
            ..complete()
        };
        assert_eq!(
            validate(form).unwrap_err(),
            ValidationError::MissingField(Field::LastName)
        );
    }

    #[test]
    fn missing_field_message_names_field() {
        let err = ValidationError::MissingField(Field::Phone);

        assert_eq!(err.to_string(), "phone is required");
    }

    #[test]
    fn unverifiable_email_still_accepted() {
        let form = ContactForm {
            email: Some("not-an-email".to_string()),
            ..complete()
        };

        assert_eq!(validate(form).unwrap().email, "not-an-email");
    }

    #[test]
    fn decodes_camel_case_body() {
        let form: ContactForm = serde_json::from_str(
            r#"{"firstName":"A","lastName":"B","email":"a@b.com","phone":"555-1234","sourceUrl":"https://site/contact"}"#,
        )
        .unwrap();

        let submission = validate(form).unwrap();
        assert_eq!(submission.name, "A B");
        assert_eq!(submission.source_url.as_deref(), Some("https://site/contact"));
    }
}
