//! Account creation protocol.
//!
//! Signing up takes three server round trips that must happen in order:
//!
//! 1. `POST /account/create` registers the email
//! 2. `POST /account/security/temporary-code` mails a 6-digit code
//! 3. `POST /account/security/password` sets the password using that code
//!
//! [`SignupFlow`] holds the state between steps and refuses out-of-order calls
//! before anything is sent. A failed step keeps the flow where it was so the
//! same step can simply be retried.

use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::{HttpClient, RequestOptions};

use super::SignupError;

/// Minimum password length, checked locally and again by the server
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Temporary codes are exactly this many ASCII digits
pub const TEMPORARY_CODE_LENGTH: usize = 6;

/// RFC 5321 upper bound for an address
const MAX_EMAIL_LENGTH: usize = 320;

const CREATE_ACCOUNT_PATH: &str = "/account/create";
const TEMPORARY_CODE_PATH: &str = "/account/security/temporary-code";
const PASSWORD_PATH: &str = "/account/security/password";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SignupStep {
    CreateAccount,
    RequestCode,
    SetPassword,
    Finished,
}

impl fmt::Display for SignupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignupStep::CreateAccount => write!(f, "create account"),
            SignupStep::RequestCode => write!(f, "request code"),
            SignupStep::SetPassword => write!(f, "set password"),
            SignupStep::Finished => write!(f, "finished"),
        }
    }
}

/// Where a signup flow is and what it has collected so far.
#[derive(Clone, PartialEq)]
pub struct SignupState {
    pub step: SignupStep,
    pub email: Option<String>,
    pub temporary_code: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for SignupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupState")
            .field("step", &self.step)
            .field("email", &self.email)
            .field("temporary_code", &self.temporary_code)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    email_address: &'a str,
}

#[derive(Serialize)]
struct SetPasswordRequest<'a> {
    email_address: &'a str,
    temporary_code: &'a str,
    password: &'a str,
}

/// Lower-case and check an email address.
///
/// Accepts `local@domain.tld` where the local part uses `[0-9a-z._%+-]`, the
/// domain `[a-z0-9.-]` and the final label is at least two letters.
pub fn normalize_email(email: &str) -> Result<String, SignupError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return Err(SignupError::InvalidEmailFormat);
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or(SignupError::InvalidEmailFormat)?;
    let (host, tld) = domain
        .rsplit_once('.')
        .ok_or(SignupError::InvalidEmailFormat)?;

    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || "._%+-".contains(c));
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || c == '.' || c == '-');
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_lowercase());

    if local_ok && host_ok && tld_ok {
        Ok(email)
    } else {
        Err(SignupError::InvalidEmailFormat)
    }
}

pub fn validate_password(password: &str) -> Result<(), SignupError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(SignupError::PasswordTooShort);
    }
    Ok(())
}

pub fn validate_temporary_code(code: &str) -> Result<(), SignupError> {
    if code.len() != TEMPORARY_CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(SignupError::InvalidCode);
    }
    Ok(())
}

/// A signup (or password reset) in progress.
///
/// Obtained from `SessionManager::begin_signup` or
/// `SessionManager::begin_password_reset`. The flow only moves forward.
pub struct SignupFlow {
    http: HttpClient,
    state: SignupState,
}

impl SignupFlow {
    pub(crate) fn new(http: HttpClient) -> Self {
        Self {
            http,
            state: SignupState {
                step: SignupStep::CreateAccount,
                email: None,
                temporary_code: None,
                password: None,
            },
        }
    }

    /// Start at `RequestCode` for an account that already exists
    pub(crate) fn for_existing_account(http: HttpClient, email: &str) -> Result<Self, SignupError> {
        let email = normalize_email(email)?;
        let mut flow = Self::new(http);
        flow.state.email = Some(email);
        flow.state.step = SignupStep::RequestCode;
        Ok(flow)
    }

    pub fn step(&self) -> SignupStep {
        self.state.step
    }

    pub fn state(&self) -> &SignupState {
        &self.state
    }

    pub fn email(&self) -> Option<&str> {
        self.state.email.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.state.step == SignupStep::Finished
    }

    /// Step 1: register `email`.
    ///
    /// Can be retried with a different address until it succeeds.
    pub async fn create_account(&mut self, email: &str) -> Result<(), SignupError> {
        self.expect_step(SignupStep::CreateAccount)?;
        let email = normalize_email(email)?;

        self.post(
            SignupStep::CreateAccount,
            CREATE_ACCOUNT_PATH,
            &EmailRequest {
                email_address: &email,
            },
        )
        .await?;

        info!("Account created, awaiting temporary code request");
        self.state.email = Some(email);
        self.advance(SignupStep::RequestCode);
        Ok(())
    }

    /// Step 2: ask the server to mail a temporary code to the flow's email.
    pub async fn request_temporary_code(&mut self) -> Result<(), SignupError> {
        self.expect_step(SignupStep::RequestCode)?;
        self.send_temporary_code().await?;
        self.advance(SignupStep::SetPassword);
        Ok(())
    }

    /// Ask for another code while waiting at `SetPassword`.
    ///
    /// Does not move the flow.
    pub async fn resend_temporary_code(&mut self) -> Result<(), SignupError> {
        self.expect_step(SignupStep::SetPassword)?;
        self.send_temporary_code().await
    }

    /// Step 3: set the password with the code received by email.
    pub async fn set_password(
        &mut self,
        temporary_code: &str,
        password: &str,
    ) -> Result<(), SignupError> {
        self.expect_step(SignupStep::SetPassword)?;
        let temporary_code = temporary_code.trim();
        validate_temporary_code(temporary_code)?;
        validate_password(password)?;

        self.state.temporary_code = Some(temporary_code.to_string());
        self.state.password = Some(password.to_string());

        let sent = match self.flow_email() {
            Ok(email) => {
                self.post(
                    SignupStep::SetPassword,
                    PASSWORD_PATH,
                    &SetPasswordRequest {
                        email_address: &email,
                        temporary_code,
                        password,
                    },
                )
                .await
            }
            Err(e) => Err(e),
        };
        // The password only lives in the state for the duration of the request
        self.state.password = None;
        sent?;

        info!("Password set, signup finished");
        self.state.temporary_code = None;
        self.advance(SignupStep::Finished);
        Ok(())
    }

    async fn send_temporary_code(&self) -> Result<(), SignupError> {
        let email = self.flow_email()?;
        self.post(
            SignupStep::RequestCode,
            TEMPORARY_CODE_PATH,
            &EmailRequest {
                email_address: &email,
            },
        )
        .await?;
        info!("Temporary code requested");
        Ok(())
    }

    async fn post<B: Serialize>(
        &self,
        step: SignupStep,
        path: &str,
        body: &B,
    ) -> Result<(), SignupError> {
        let response = self
            .http
            .send(Method::POST, path, RequestOptions::public().json(body)?)
            .await?;

        if response.is_success() {
            Ok(())
        } else {
            let error = SignupError::from_status(step, response.status_code());
            debug!(%step, status = response.status_code(), error = %error, "Signup step rejected");
            Err(error)
        }
    }

    fn flow_email(&self) -> Result<String, SignupError> {
        self.state.email.clone().ok_or(SignupError::OutOfOrder {
            expected: SignupStep::CreateAccount,
            actual: self.state.step,
        })
    }

    fn expect_step(&self, expected: SignupStep) -> Result<(), SignupError> {
        if self.state.step == expected {
            Ok(())
        } else {
            Err(SignupError::OutOfOrder {
                expected,
                actual: self.state.step,
            })
        }
    }

    fn advance(&mut self, next: SignupStep) {
        debug!(from = %self.state.step, to = %next, "Signup advanced");
        self.state.step = next;
    }
}
