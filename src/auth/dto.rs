use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::claims::{Session, SessionUser};

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 50;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// One failing input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Request body for user registration. Missing fields deserialize as empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        let name_len = self.name.chars().count();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        } else if name_len < NAME_MIN_LEN {
            errors.push(FieldError::new(
                "name",
                format!("Name must be at least {NAME_MIN_LEN} characters"),
            ));
        } else if name_len > NAME_MAX_LEN {
            errors.push(FieldError::new(
                "name",
                format!("Name must be no more than {NAME_MAX_LEN} characters"),
            ));
        }

        if self.email.is_empty() {
            errors.push(FieldError::new("email", "Email is required"));
        } else if self.email.chars().count() > EMAIL_MAX_LEN {
            errors.push(FieldError::new(
                "email",
                format!("Email must be no more than {EMAIL_MAX_LEN} characters"),
            ));
        } else if !is_valid_email(&self.email) {
            errors.push(FieldError::new("email", "Invalid email address"));
        }

        let password_len = self.password.chars().count();
        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        } else if password_len < PASSWORD_MIN_LEN {
            errors.push(FieldError::new(
                "password",
                format!("Password must be at least {PASSWORD_MIN_LEN} characters"),
            ));
        } else if password_len > PASSWORD_MAX_LEN {
            errors.push(FieldError::new(
                "password",
                format!("Password must be no more than {PASSWORD_MAX_LEN} characters"),
            ));
        }

        if self.confirm_password.is_empty() {
            errors.push(FieldError::new(
                "confirmPassword",
                "Password confirmation is required",
            ));
        } else if self.confirm_password != self.password {
            errors.push(FieldError::new("confirmPassword", "Passwords don't match"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.email.is_empty() {
            errors.push(FieldError::new("email", "Email is required"));
        } else if !is_valid_email(&self.email) {
            errors.push(FieldError::new("email", "Invalid email address"));
        }
        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl PublicUser {
    pub fn session_user(&self) -> SessionUser {
        SessionUser {
            user_id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Response returned after login or register. The token travels in the cookie.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: Session,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}
