//! Upload finished clips to public file hosts.
//!
//! The service catalog and local size check live here; the network side is
//! behind the [`Uploader`] trait so the size rule can be exercised without
//! any request being made.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// How a service reports the uploaded file's URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Plain-text body that is the URL itself
    BareUrl,
    /// JSON `{"files": [{"url": ...}]}`
    FilesJson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadService {
    pub key: &'static str,
    pub display_name: &'static str,
    pub endpoint_url: &'static str,
    pub form_field: &'static str,
    pub extra_fields: &'static [(&'static str, &'static str)],
    pub max_size_mb: u64,
    pub expiration: &'static str,
    pub response: ResponseFormat,
}

impl fmt::Display for UploadService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (max {} MB, expires: {})",
            self.display_name, self.max_size_mb, self.expiration
        )
    }
}

pub const SERVICES: &[UploadService] = &[
    UploadService {
        key: "catbox",
        display_name: "catbox.moe",
        endpoint_url: "https://catbox.moe/user/api.php",
        form_field: "fileToUpload",
        extra_fields: &[("reqtype", "fileupload")],
        max_size_mb: 200,
        expiration: "Indefinite",
        response: ResponseFormat::BareUrl,
    },
    UploadService {
        key: "uguu",
        display_name: "uguu.se",
        endpoint_url: "https://uguu.se/upload",
        form_field: "files[]",
        extra_fields: &[],
        max_size_mb: 134,
        expiration: "~3 hours",
        response: ResponseFormat::FilesJson,
    },
    UploadService {
        key: "tempsh",
        display_name: "temp.sh",
        endpoint_url: "https://temp.sh/upload",
        form_field: "file",
        extra_fields: &[],
        max_size_mb: 4096,
        expiration: "3 days",
        response: ResponseFormat::BareUrl,
    },
];

pub const DEFAULT_SERVICE: &str = "catbox";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unknown upload service '{0}' (expected catbox, uguu or tempsh)")]
    UnknownService(String),

    #[error("File is too large for {service}: {size_mb:.2} MB exceeds the {max_mb} MB limit")]
    FileTooLarge {
        service: &'static str,
        size_mb: f64,
        max_mb: u64,
    },

    #[error("Cannot read file for upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error while uploading: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Upload service returned an unexpected response: {0}")]
    Remote(String),
}

pub fn by_key(key: &str) -> Result<&'static UploadService, UploadError> {
    let wanted = key.trim().to_ascii_lowercase();
    SERVICES
        .iter()
        .find(|s| s.key == wanted || s.display_name == wanted)
        .ok_or_else(|| UploadError::UnknownService(key.to_string()))
}

/// File size in MiB
pub fn file_size_mb(path: &Path) -> std::io::Result<f64> {
    let bytes = std::fs::metadata(path)?.len();
    Ok(bytes as f64 / (1024.0 * 1024.0))
}

/// Reject files above the service limit before any network traffic.
pub fn check_file_size(path: &Path, service: &UploadService) -> Result<f64, UploadError> {
    let size_mb = file_size_mb(path)?;
    if size_mb > service.max_size_mb as f64 {
        return Err(UploadError::FileTooLarge {
            service: service.display_name,
            size_mb,
            max_mb: service.max_size_mb,
        });
    }
    Ok(size_mb)
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    #[serde(default)]
    files: Vec<UploadedFile>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    url: String,
}

/// Extract the public URL from a service's response body
pub fn parse_upload_response(service: &UploadService, body: &str) -> Result<String, UploadError> {
    let body = body.trim();
    match service.response {
        ResponseFormat::BareUrl => {
            if body.starts_with("http") {
                Ok(body.to_string())
            } else {
                Err(UploadError::Remote(body.to_string()))
            }
        }
        ResponseFormat::FilesJson => {
            let parsed: FilesResponse = serde_json::from_str(body)
                .map_err(|e| UploadError::Remote(format!("{}: {}", e, body)))?;
            parsed
                .files
                .into_iter()
                .next()
                .map(|f| f.url)
                .ok_or_else(|| UploadError::Remote(body.to_string()))
        }
    }
}

/// Sends one file to one service and returns the raw response body.
pub trait Uploader {
    fn send(&self, service: &UploadService, path: &Path) -> Result<String, UploadError>;
}

/// Multipart POST over HTTPS
pub struct HttpUploader {
    client: reqwest::blocking::Client,
}

impl HttpUploader {
    pub fn new(timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ffclip/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Uploader for HttpUploader {
    fn send(&self, service: &UploadService, path: &Path) -> Result<String, UploadError> {
        let mut form = reqwest::blocking::multipart::Form::new();
        for (name, value) in service.extra_fields {
            form = form.text(*name, *value);
        }
        let form = form.file(service.form_field, path)?;

        debug!("POST {} ({})", service.endpoint_url, path.display());
        let response = self
            .client
            .post(service.endpoint_url)
            .multipart(form)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(UploadError::Remote(format!("HTTP {}: {}", status, body.trim())));
        }
        Ok(body)
    }
}

/// Size-check `path`, upload it with `uploader` and return the public URL.
pub fn upload_file(
    uploader: &dyn Uploader,
    path: &Path,
    service_key: &str,
) -> Result<String, UploadError> {
    let service = by_key(service_key)?;
    let size_mb = check_file_size(path, service)?;
    info!(
        "Uploading {} ({:.2} MB) to {}",
        path.display(),
        size_mb,
        service.display_name
    );

    let body = uploader.send(service, path)?;
    let url = parse_upload_response(service, &body)?;
    info!("Uploaded to {}", url);
    Ok(url)
}
