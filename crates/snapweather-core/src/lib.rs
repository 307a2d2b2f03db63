//! Core library for SnapWeather: session handling and API access for a
//! photo-sharing service that tags every picture with its location and the
//! weather at the time it was taken.
//!
//! Start from a [`SessionManager`], which restores any saved token, then use
//! it to sign up, log in, and create the [`UserProfileClient`] and
//! [`PictureClient`] that share its session.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use snapweather_core::{Config, SessionManager};
//!
//! let config = Config::load()?;
//! let session = SessionManager::from_config(&config)?;
//! session.login("a@b.com", "password1").await?;
//! let pictures = session.pictures().list_pictures().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod pictures;
pub mod profile;

pub use api::{ApiError, HttpClient};
pub use auth::{
    AuthError, Session, SessionFault, SessionManager, SignupError, SignupFlow, SignupStep, Token,
    TokenStore,
};
pub use config::Config;
pub use models::{Picture, Profile};
pub use pictures::{FetchError, PictureClient, PictureUpload, UploadError};
pub use profile::{ProfileError, UserProfileClient};
