//! Minimal `multipart/form-data` encoder.
//!
//! The encoded body goes through `HttpClient`'s raw-body path with the content
//! type returned by [`MultipartBody::content_type`].

use rand::{distributions::Alphanumeric, Rng};

/// Length of the random part of a boundary
const BOUNDARY_RANDOM_LEN: usize = 32;

pub struct MultipartBody {
    boundary: String,
    buffer: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BOUNDARY_RANDOM_LEN)
            .map(char::from)
            .collect();
        Self::with_boundary(format!("snapweather-{}", random))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buffer: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Append a plain text field
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part();
        self.buffer.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        self.buffer.extend_from_slice(value.as_bytes());
        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Append a binary file field
    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.open_part();
        self.buffer.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, filename
            )
            .as_bytes(),
        );
        self.buffer
            .extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        self.buffer.extend_from_slice(bytes);
        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Write the closing delimiter and return `(content_type, body)`
    pub fn finish(mut self) -> (String, Vec<u8>) {
        let content_type = self.content_type();
        self.buffer
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (content_type, self.buffer)
    }

    fn open_part(&mut self) {
        self.buffer
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}
