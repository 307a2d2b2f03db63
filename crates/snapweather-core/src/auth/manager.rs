use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{ApiError, HttpClient, HttpResponse, RequestOptions};
use crate::config::{Config, TokenExpiryEndpoint};
use crate::pictures::PictureClient;
use crate::profile::UserProfileClient;

use super::signup::SignupFlow;
use super::token_store::{open_token_store, TokenStore};
use super::{AuthError, Session, SessionCell, SessionFault, SignupError, Token};

const LOGIN_PATH: &str = "/account/security/token";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email_address: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenPayload {
    value: String,
}

/// Owns the session: login, logout, server-side expiry, signup flows.
///
/// Construct one per process and hand clones to the UI; every clone (and every
/// client created from it) shares the same session and connection pool.
#[derive(Clone)]
pub struct SessionManager {
    http: HttpClient,
    store: Arc<dyn TokenStore>,
    expiry_endpoint: TokenExpiryEndpoint,
}

impl SessionManager {
    /// Restore any saved token and connect to the configured API.
    ///
    /// A saved token is trusted until an authenticated call says otherwise.
    pub fn new(config: &Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let session = match store.load() {
            Ok(Some(token)) if !token.is_empty() => {
                info!("Restored saved session");
                Session::with_token(Token::new(token))
            }
            Ok(_) => {
                debug!("No saved session found");
                Session::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load saved token, starting logged out");
                Session::default()
            }
        };

        let http = HttpClient::new(config, SessionCell::new(session))?;

        Ok(Self {
            http,
            store,
            expiry_endpoint: config.token_expiry_endpoint,
        })
    }

    /// Like `new`, with the token store backend named in the config
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = open_token_store(config.token_store)?;
        Self::new(config, store)
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub async fn session(&self) -> Session {
        self.http.session().snapshot().await
    }

    pub async fn token(&self) -> Option<Token> {
        self.http.session().token().await
    }

    pub async fn has_token(&self) -> bool {
        self.token().await.is_some()
    }

    pub fn profile(&self) -> UserProfileClient {
        UserProfileClient::new(self.clone())
    }

    pub fn pictures(&self) -> PictureClient {
        PictureClient::new(self.clone())
    }

    /// Start creating a new account
    pub fn begin_signup(&self) -> SignupFlow {
        SignupFlow::new(self.http.clone())
    }

    /// Start a password reset: same protocol as signup, minus account creation
    pub fn begin_password_reset(&self, email: &str) -> Result<SignupFlow, SignupError> {
        SignupFlow::for_existing_account(self.http.clone(), email)
    }

    /// Exchange credentials for a bearer token and persist it.
    pub async fn login(&self, email: &str, password: &str) -> Result<Token, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let body = LoginRequest {
            email_address: &email,
            password,
        };
        let response = self
            .http
            .send(Method::POST, LOGIN_PATH, RequestOptions::public().json(&body)?)
            .await?;

        if !response.is_success() {
            let error = AuthError::from_login_status(response.status_code());
            info!(status = response.status_code(), error = %error, "Login rejected");
            return Err(error);
        }

        let payload: TokenPayload = response.datas()?;
        if payload.value.is_empty() {
            return Err(ApiError::MalformedResponse("Empty token in login response".to_string()).into());
        }
        let token = Token::new(payload.value);

        // Memory and store change under one write lock so a concurrent logout
        // cannot land between them
        self.http
            .session()
            .update(|session| {
                *session = Session {
                    token: Some(token.clone()),
                    email: Some(email),
                    username: None,
                };
                if let Err(e) = self.store.save(token.as_str()) {
                    warn!(error = %e, "Failed to persist token, session will not survive a restart");
                }
            })
            .await;

        info!("Login successful");
        Ok(token)
    }

    /// Forget the session locally. Safe to call when already logged out.
    pub async fn logout(&self) {
        self.http
            .session()
            .update(|session| {
                *session = Session::default();
                self.clear_store();
            })
            .await;
        info!("Logged out");
    }

    /// Invalidate the current token on the server, then log out locally.
    pub async fn expire_token(&self) -> Result<(), AuthError> {
        if !self.has_token().await {
            return Err(AuthError::NotLoggedIn);
        }

        let response = self
            .http
            .send(
                Method::DELETE,
                self.expiry_endpoint.path(),
                RequestOptions::authenticated(),
            )
            .await?;

        if response.is_success() {
            info!("Token expired on server");
            self.logout().await;
            Ok(())
        } else {
            let error = AuthError::from_token_status(response.status_code());
            self.reject(&response, error).await
        }
    }

    /// Return `error`, first tearing the session down if the error says the
    /// token behind `response` is no longer accepted.
    ///
    /// A fault reported for a token that has since been replaced by a newer
    /// login leaves the new session alone.
    pub async fn reject<T, E>(&self, response: &HttpResponse, error: E) -> Result<T, E>
    where
        E: SessionFault + fmt::Display,
    {
        if error.invalidates_session() {
            match response.bearer() {
                Some(token) => {
                    let cleared = self
                        .http
                        .session()
                        .update_if_token(token, |session| {
                            *session = Session::default();
                            self.clear_store();
                        })
                        .await;
                    if cleared.is_some() {
                        warn!(error = %error, "Session rejected by server, logged out");
                    } else {
                        debug!("Session fault for a replaced token, ignoring");
                    }
                }
                None => debug!(error = %error, "Session fault on a request sent without token"),
            }
        }
        Err(error)
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear saved token");
        }
    }
}
