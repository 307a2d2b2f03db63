use thiserror::Error;

use crate::api::ApiError;

use super::signup::{SignupStep, MIN_PASSWORD_LENGTH};

/// Errors that can mean the session is no longer usable.
///
/// Only `TokenInvalid` and `TokenExpired` invalidate the session; every other
/// failure is reported to the user and leaves the session alone.
pub trait SessionFault {
    fn invalidates_session(&self) -> bool;
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No account exists for this email")]
    EmailUnknown,

    #[error("Incorrect password")]
    InvalidPassword,

    #[error("Invalid token - please log in again")]
    TokenInvalid,

    #[error("Token expired - please log in again")]
    TokenExpired,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Unexpected server response (status {0})")]
    Unexpected(u16),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// Map a failed `POST /account/security/token`
    pub fn from_login_status(status: u16) -> Self {
        match status {
            400 => AuthError::InvalidCredentials,
            401 => AuthError::EmailUnknown,
            403 => AuthError::InvalidPassword,
            other => AuthError::Unexpected(other),
        }
    }

    /// Map a failed call made with the bearer token
    pub fn from_token_status(status: u16) -> Self {
        match status {
            401 => AuthError::TokenInvalid,
            403 => AuthError::TokenExpired,
            other => AuthError::Unexpected(other),
        }
    }
}

impl SessionFault for AuthError {
    fn invalidates_session(&self) -> bool {
        matches!(self, AuthError::TokenInvalid | AuthError::TokenExpired)
    }
}

#[derive(Error, Debug)]
pub enum SignupError {
    #[error("Invalid email address")]
    InvalidEmailFormat,

    #[error("This email is already in use")]
    EmailAlreadyUsed,

    #[error("No account exists for this email")]
    EmailUnknown,

    #[error("Invalid temporary code")]
    InvalidCode,

    #[error("Invalid temporary code or password")]
    InvalidCodeOrPassword,

    #[error("Password must be at least {} characters", MIN_PASSWORD_LENGTH)]
    PasswordTooShort,

    #[error("Signup step out of order: expected {expected}, flow is at {actual}")]
    OutOfOrder {
        expected: SignupStep,
        actual: SignupStep,
    },

    #[error("Unexpected server response (status {0})")]
    Unexpected(u16),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SignupError {
    /// Map a failed response for the request made at `step`
    pub fn from_status(step: SignupStep, status: u16) -> Self {
        match (step, status) {
            (SignupStep::CreateAccount, 400) => SignupError::InvalidEmailFormat,
            (SignupStep::CreateAccount, 409) => SignupError::EmailAlreadyUsed,
            (SignupStep::RequestCode, 400) => SignupError::InvalidEmailFormat,
            (SignupStep::RequestCode, 401) => SignupError::EmailUnknown,
            (SignupStep::SetPassword, 400) => SignupError::InvalidCodeOrPassword,
            (SignupStep::SetPassword, 401) => SignupError::EmailUnknown,
            (SignupStep::SetPassword, 403) => SignupError::InvalidCode,
            (_, other) => SignupError::Unexpected(other),
        }
    }
}

impl SessionFault for SignupError {
    fn invalidates_session(&self) -> bool {
        false
    }
}
