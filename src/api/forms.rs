//! Request forms
//!
//! Field-level rules are declared with `validator`. Rules that need the
//! database (taken usernames, unknown e-mails) live in the services. Every
//! field defaults to empty so a missing field reports "This field is
//! required." instead of a deserialization failure.

use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::services::parse_tags;

pub const REQUIRED: &str = "This field is required.";

fn required(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegistrationForm {
    #[validate(
        custom(function = "required", message = "This field is required."),
        length(min = 3, max = 25, message = "Field must be between 3 and 25 characters long.")
    )]
    pub username: String,

    #[validate(
        custom(function = "required", message = "This field is required."),
        email(message = "Invalid email address.")
    )]
    pub email: String,

    #[validate(
        custom(function = "required", message = "This field is required."),
        must_match(other = "confirm", message = "Passwords must match")
    )]
    pub password: String,

    #[validate(custom(function = "required", message = "This field is required."))]
    pub confirm: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginForm {
    #[validate(
        custom(function = "required", message = "This field is required."),
        email(message = "Invalid email address.")
    )]
    pub email: String,

    #[validate(custom(function = "required", message = "This field is required."))]
    pub password: String,

    pub remember: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RequestResetForm {
    #[validate(
        custom(function = "required", message = "This field is required."),
        email(message = "Invalid email address.")
    )]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ResetPasswordForm {
    #[validate(
        custom(function = "required", message = "This field is required."),
        must_match(other = "confirm", message = "Passwords must match")
    )]
    pub password: String,

    #[validate(custom(function = "required", message = "This field is required."))]
    pub confirm: String,
}

/// Text fields of the profile form. The picture arrives as a separate
/// multipart part and is checked by the avatar store.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateProfileForm {
    #[validate(
        custom(function = "required", message = "This field is required."),
        length(min = 3, max = 25, message = "Field must be between 3 and 25 characters long.")
    )]
    pub username: String,

    #[validate(length(max = 128, message = "Field cannot be longer than 128 characters."))]
    pub about_me: String,

    #[validate(
        custom(function = "required", message = "This field is required."),
        email(message = "Invalid email address.")
    )]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PostForm {
    #[validate(
        custom(function = "required", message = "This field is required."),
        length(max = 128, message = "Field cannot be longer than 128 characters.")
    )]
    pub title: String,

    pub content: String,

    /// Comma-separated tag names
    pub tags: Option<String>,
}

impl PostForm {
    pub fn tag_names(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|t| parse_tags(t, ','))
            .unwrap_or_default()
    }
}

/// Admin: rename a user, change their e-mail or role set
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct AdminUserForm {
    #[validate(length(min = 3, max = 25, message = "Field must be between 3 and 25 characters long."))]
    pub username: Option<String>,

    #[validate(email(message = "Invalid email address."))]
    pub email: Option<String>,

    #[validate(length(max = 128, message = "Field cannot be longer than 128 characters."))]
    pub about_me: Option<String>,

    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RoleForm {
    #[validate(
        custom(function = "required", message = "This field is required."),
        length(max = 64, message = "Field cannot be longer than 64 characters.")
    )]
    pub name: String,

    pub description: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RoleDescriptionForm {
    pub description: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct TagForm {
    #[validate(
        custom(function = "required", message = "This field is required."),
        length(max = 64, message = "Field cannot be longer than 64 characters.")
    )]
    pub name: String,
}

/// Flatten validation errors into `{ field: [message, ..] }`
pub fn error_details(errors: &ValidationErrors) -> serde_json::Value {
    let mut details = serde_json::Map::new();
    for (field, field_errors) in errors.field_errors() {
        let messages: Vec<serde_json::Value> = field_errors
            .iter()
            .map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                serde_json::Value::String(message)
            })
            .collect();
        details.insert(field.to_string(), serde_json::Value::Array(messages));
    }
    serde_json::Value::Object(details)
}

/// Details object for one field and message
pub fn field_detail(field: &str, message: &str) -> serde_json::Value {
    let mut details = serde_json::Map::new();
    details.insert(field.to_string(), serde_json::json!([message]));
    serde_json::Value::Object(details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str, password: &str, confirm: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            confirm: confirm.into(),
        }
    }

    #[test]
    fn test_valid_registration() {
        assert!(registration("ana", "ana@example.com", "pw", "pw").validate().is_ok());
    }

    #[test]
    fn test_registration_field_errors() {
        let errors = registration("an", "not-an-email", "pw", "other")
            .validate()
            .unwrap_err();
        let details = error_details(&errors);

        assert_eq!(
            details["username"][0],
            "Field must be between 3 and 25 characters long."
        );
        assert_eq!(details["email"][0], "Invalid email address.");
        assert_eq!(details["password"][0], "Passwords must match");
    }

    #[test]
    fn test_missing_fields_are_required() {
        let form: RegistrationForm = serde_json::from_str("{}").unwrap();
        let details = error_details(&form.validate().unwrap_err());

        for field in ["username", "email", "password", "confirm"] {
            let messages = details[field].as_array().unwrap();
            assert!(messages.iter().any(|m| m == REQUIRED), "{}", field);
        }
    }

    #[test]
    fn test_login_form_remember_defaults_to_false() {
        let form: LoginForm =
            serde_json::from_str(r#"{"email":"ana@example.com","password":"pw"}"#).unwrap();
        assert!(form.validate().is_ok());
        assert!(!form.remember);
    }

    #[test]
    fn test_profile_about_me_limit() {
        let form = UpdateProfileForm {
            username: "ana".into(),
            about_me: "x".repeat(129),
            email: "ana@example.com".into(),
        };
        let details = error_details(&form.validate().unwrap_err());
        assert!(details.get("about_me").is_some());
    }

    #[test]
    fn test_post_form_tags() {
        let form = PostForm {
            title: "Hello".into(),
            content: String::new(),
            tags: Some("rust, web, rust,".into()),
        };
        assert!(form.validate().is_ok());
        assert_eq!(form.tag_names(), vec!["rust", "web"]);

        let untagged = PostForm {
            title: "Hello".into(),
            ..Default::default()
        };
        assert!(untagged.tag_names().is_empty());
    }

    #[test]
    fn test_post_form_requires_title() {
        let details = error_details(&PostForm::default().validate().unwrap_err());
        assert_eq!(details["title"][0], REQUIRED);
    }

    #[test]
    fn test_field_detail_shape() {
        assert_eq!(
            field_detail("email", "taken"),
            serde_json::json!({"email": ["taken"]})
        );
    }
}
