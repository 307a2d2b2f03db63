//! Account profile: email address and public username.

use reqwest::Method;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ApiError, RequestOptions};
use crate::auth::{SessionFault, SessionManager};
use crate::models::Profile;

const ACCOUNT_PATH: &str = "/account";

/// Longest username accepted locally
pub const MAX_USERNAME_LENGTH: usize = 50;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Usernames may only contain letters, digits and underscores")]
    InvalidFormat,

    #[error("This username is already taken")]
    AlreadyTaken,

    #[error("Invalid token - please log in again")]
    TokenInvalid,

    #[error("Token expired - please log in again")]
    TokenExpired,

    #[error("Unexpected server response (status {0})")]
    Unexpected(u16),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ProfileError {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ProfileError::InvalidFormat,
            401 => ProfileError::TokenInvalid,
            403 => ProfileError::TokenExpired,
            409 => ProfileError::AlreadyTaken,
            other => ProfileError::Unexpected(other),
        }
    }
}

impl SessionFault for ProfileError {
    fn invalidates_session(&self) -> bool {
        matches!(self, ProfileError::TokenInvalid | ProfileError::TokenExpired)
    }
}

/// Check a username without contacting the server.
///
/// Letters, digits and `_` only, 1 to 50 characters.
pub fn validate_username(name: &str) -> Result<(), ProfileError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_USERNAME_LENGTH
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ProfileError::InvalidFormat)
    }
}

#[derive(Serialize)]
struct SetUsernameRequest<'a> {
    user_name: &'a str,
}

#[derive(Clone)]
pub struct UserProfileClient {
    session: SessionManager,
}

impl UserProfileClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    /// Fetch the account; a missing username is a normal state
    pub async fn fetch_profile(&self) -> Result<Profile, ProfileError> {
        let response = self
            .session
            .http()
            .send(Method::GET, ACCOUNT_PATH, RequestOptions::authenticated())
            .await?;

        if !response.is_success() {
            let error = ProfileError::from_status(response.status_code());
            return self.session.reject(&response, error).await;
        }

        let profile: Profile = response.datas()?;
        if let Some(token) = response.bearer() {
            let (email, username) = (profile.email.clone(), profile.username.clone());
            let applied = self
                .session
                .http()
                .session()
                .update_if_token(token, |s| {
                    s.email = Some(email);
                    s.username = username;
                })
                .await;
            if applied.is_none() {
                debug!("Session changed during profile fetch, not applying");
            }
        }

        Ok(profile)
    }

    /// Pick the public username shown on pictures
    pub async fn set_username(&self, name: &str) -> Result<(), ProfileError> {
        validate_username(name)?;

        let body = SetUsernameRequest { user_name: name };
        let response = self
            .session
            .http()
            .send(
                Method::POST,
                ACCOUNT_PATH,
                RequestOptions::authenticated().json(&body)?,
            )
            .await?;

        if !response.is_success() {
            let error = ProfileError::from_status(response.status_code());
            return self.session.reject(&response, error).await;
        }

        info!("Username updated");
        if let Some(token) = response.bearer() {
            let username = name.to_string();
            self.session
                .http()
                .session()
                .update_if_token(token, |s| s.username = Some(username))
                .await;
        }
        Ok(())
    }
}
