use thiserror::Error;

use crate::api::ApiError;
use crate::auth::SessionFault;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid token - please log in again")]
    TokenInvalid,

    #[error("Token expired - please log in again")]
    TokenExpired,

    #[error("Picture not found")]
    NotFound,

    #[error("Invalid picture filename: {0:?}")]
    InvalidFilename(String),

    #[error("Unexpected server response (status {0})")]
    Unexpected(u16),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl FetchError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => FetchError::TokenInvalid,
            403 => FetchError::TokenExpired,
            404 => FetchError::NotFound,
            other => FetchError::Unexpected(other),
        }
    }
}

impl SessionFault for FetchError {
    fn invalidates_session(&self) -> bool {
        matches!(self, FetchError::TokenInvalid | FetchError::TokenExpired)
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid token - please log in again")]
    TokenInvalid,

    #[error("Token expired - please log in again")]
    TokenExpired,

    #[error("Unsupported image format")]
    UnsupportedMediaType,

    #[error("Choose a username before uploading pictures")]
    UsernameNotSet,

    #[error("Invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Image is empty")]
    EmptyImage,

    #[error("Unexpected server response (status {0})")]
    Unexpected(u16),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl UploadError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => UploadError::TokenInvalid,
            403 => UploadError::TokenExpired,
            415 => UploadError::UnsupportedMediaType,
            422 => UploadError::UsernameNotSet,
            other => UploadError::Unexpected(other),
        }
    }
}

impl SessionFault for UploadError {
    fn invalidates_session(&self) -> bool {
        matches!(self, UploadError::TokenInvalid | UploadError::TokenExpired)
    }
}
