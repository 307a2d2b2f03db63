//! Picture feed: metadata listing, image download and upload.
//!
//! Every call here needs a session. A 401/403 answer logs the session out
//! before the error is returned, so the caller only has to send the user back
//! to the login screen.

pub mod client;
pub mod error;

pub use client::{PictureClient, PictureUpload};
pub use error::{FetchError, UploadError};
