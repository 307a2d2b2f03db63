//! REST plumbing shared by every SnapWeather endpoint.
//!
//! This module provides the `HttpClient` request executor, the `{success,
//! datas}` envelope, a multipart encoder for uploads, and `ApiError` for
//! transport and protocol failures.
//!
//! Authenticated requests carry `Authorization: Bearer <token>` read from the
//! shared session just before they are sent.

pub mod client;
pub mod error;
pub mod multipart;

pub use client::{Envelope, HttpClient, HttpResponse, RequestOptions};
pub use error::ApiError;
pub use multipart::MultipartBody;
