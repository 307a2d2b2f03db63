use std::collections::HashSet;

use reqwest::Method;
use tracing::{debug, error, info};

use crate::api::{ApiError, MultipartBody, RequestOptions};
use crate::auth::SessionManager;
use crate::models::Picture;

use super::{FetchError, UploadError};

const PICTURES_PATH: &str = "/pictures";

/// Media type of images produced by the camera
pub const DEFAULT_MEDIA_TYPE: &str = "image/heic";

/// Filename sent with the image part
pub const DEFAULT_UPLOAD_FILENAME: &str = "picture.heic";

/// An image and the place it was taken, ready to upload.
#[derive(Debug, Clone)]
pub struct PictureUpload {
    pub image: Vec<u8>,
    pub latitude: f64,
    pub longitude: f64,
    pub media_type: String,
    pub filename: String,
}

impl PictureUpload {
    /// A HEIC image, as captured by the camera
    pub fn heic(image: Vec<u8>, latitude: f64, longitude: f64) -> Self {
        Self {
            image,
            latitude,
            longitude,
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            filename: DEFAULT_UPLOAD_FILENAME.to_string(),
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>, filename: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self.filename = filename.into();
        self
    }

    fn validate(&self) -> Result<(), UploadError> {
        if self.image.is_empty() {
            return Err(UploadError::EmptyImage);
        }
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if !lat_ok || !lon_ok {
            return Err(UploadError::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        Ok(())
    }

    /// Encode as `multipart/form-data`: image, latitude, longitude
    fn encode(&self) -> (String, Vec<u8>) {
        MultipartBody::new()
            .file("picture", &self.filename, &self.media_type, &self.image)
            .text("latitude", &self.latitude.to_string())
            .text("longitude", &self.longitude.to_string())
            .finish()
    }
}

/// Reject names that would escape `/pictures/{filename}`
fn check_filename(filename: &str) -> Result<(), FetchError> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '?', '#']);
    if bad {
        Err(FetchError::InvalidFilename(filename.to_string()))
    } else {
        Ok(())
    }
}

/// Fail the whole list on any bad entry rather than drop it: a partial list
/// would silently hide pictures from the map.
fn check_listing(pictures: &[Picture]) -> Result<(), ApiError> {
    let mut seen = HashSet::with_capacity(pictures.len());
    for picture in pictures {
        picture.validate().map_err(ApiError::MalformedResponse)?;
        if !seen.insert(picture.id()) {
            return Err(ApiError::MalformedResponse(format!(
                "duplicate picture id '{}'",
                picture.id()
            )));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct PictureClient {
    session: SessionManager,
}

impl PictureClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    /// All pictures, in the order the server returns them
    pub async fn list_pictures(&self) -> Result<Vec<Picture>, FetchError> {
        let response = self
            .session
            .http()
            .send(Method::GET, PICTURES_PATH, RequestOptions::authenticated())
            .await?;

        if !response.is_success() {
            let error = FetchError::from_status(response.status_code());
            return self.session.reject(&response, error).await;
        }

        let pictures: Vec<Picture> = response.datas()?;
        if let Err(e) = check_listing(&pictures) {
            error!(error = %e, "Rejecting picture list");
            return Err(e.into());
        }

        debug!(count = pictures.len(), "Pictures listed");
        Ok(pictures)
    }

    /// Raw image bytes for one picture
    pub async fn fetch_picture_buffer(&self, filename: &str) -> Result<Vec<u8>, FetchError> {
        check_filename(filename)?;
        let path = format!("{}/{}", PICTURES_PATH, filename);

        let response = self
            .session
            .http()
            .send(Method::GET, &path, RequestOptions::authenticated())
            .await?;

        if !response.is_success() {
            let error = FetchError::from_status(response.status_code());
            return self.session.reject(&response, error).await;
        }

        let bytes = response.into_bytes();
        debug!(filename, bytes = bytes.len(), "Picture downloaded");
        Ok(bytes)
    }

    /// Upload a HEIC image taken at `latitude`, `longitude`.
    ///
    /// Not idempotent: a retried upload may create a second picture.
    pub async fn upload_picture(
        &self,
        image: Vec<u8>,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), UploadError> {
        self.upload(PictureUpload::heic(image, latitude, longitude)).await
    }

    pub async fn upload(&self, upload: PictureUpload) -> Result<(), UploadError> {
        upload.validate()?;
        let (content_type, body) = upload.encode();

        let response = self
            .session
            .http()
            .send(
                Method::PUT,
                PICTURES_PATH,
                RequestOptions::authenticated().raw(body, content_type),
            )
            .await?;

        if !response.is_success() {
            let error = UploadError::from_status(response.status_code());
            return self.session.reject(&response, error).await;
        }

        info!(bytes = upload.image.len(), media_type = %upload.media_type, "Picture uploaded");
        Ok(())
    }
}
