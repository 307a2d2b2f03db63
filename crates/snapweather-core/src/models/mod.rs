//! Data models for SnapWeather resources.
//!
//! - `Picture`: photo metadata with location, author and weather snapshot
//! - `Profile`: the signed-in account

pub mod picture;
pub mod profile;

pub use picture::{Picture, PictureAuthor, WeatherDetails};
pub use profile::Profile;
