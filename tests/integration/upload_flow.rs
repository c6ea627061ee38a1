// Upload catalog and size limits, with the network side replaced

use ffclip::upload::{
    DEFAULT_SERVICE, SERVICES, UploadError, UploadService, Uploader, by_key, upload_file,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Records what would have been sent
struct RecordingUploader {
    sent: Mutex<Vec<(String, PathBuf)>>,
}

impl RecordingUploader {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl Uploader for RecordingUploader {
    fn send(&self, service: &UploadService, path: &Path) -> Result<String, UploadError> {
        self.sent
            .lock()
            .unwrap()
            .push((service.key.to_string(), path.to_path_buf()));
        Ok(match service.key {
            "uguu" => r#"{"success":true,"files":[{"url":"https://a.uguu.se/x.mp4"}]}"#.to_string(),
            _ => format!("https://{}/x.mp4\n", service.display_name),
        })
    }
}

fn sized_file(dir: &TempDir, name: &str, mb: u64) -> PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(mb * 1024 * 1024).unwrap();
    path
}

#[test]
fn test_every_service_returns_a_url() {
    let dir = TempDir::new().unwrap();
    let clip = sized_file(&dir, "clip.mp4", 1);
    let uploader = RecordingUploader::new();

    for service in SERVICES {
        let url = upload_file(&uploader, &clip, service.key).unwrap();
        assert!(url.starts_with("https://"), "{}: {}", service.key, url);
    }
    assert_eq!(uploader.sent.lock().unwrap().len(), SERVICES.len());
}

#[test]
fn test_limits_are_per_service() {
    let dir = TempDir::new().unwrap();
    let clip = sized_file(&dir, "big.mp4", 150);
    let uploader = RecordingUploader::new();

    // 150 MB: over uguu's limit, under catbox's
    let err = upload_file(&uploader, &clip, "uguu").unwrap_err();
    assert!(matches!(err, UploadError::FileTooLarge { max_mb: 134, .. }));
    assert!(err.to_string().contains("uguu.se"));
    assert!(uploader.sent.lock().unwrap().is_empty());

    upload_file(&uploader, &clip, "catbox").unwrap();
    let sent = uploader.sent.lock().unwrap();
    assert_eq!(sent.as_slice(), &[("catbox".to_string(), clip.clone())]);
}

#[test]
fn test_file_exactly_at_limit_is_accepted() {
    let dir = TempDir::new().unwrap();
    let clip = sized_file(&dir, "edge.mp4", 200);
    let uploader = RecordingUploader::new();
    assert!(upload_file(&uploader, &clip, "catbox").is_ok());
}

#[test]
fn test_unknown_service_is_rejected() {
    let uploader = RecordingUploader::new();
    let err = upload_file(&uploader, Path::new("/tmp/none.mp4"), "mega").unwrap_err();
    assert!(matches!(err, UploadError::UnknownService(ref key) if key == "mega"));
    assert!(by_key(DEFAULT_SERVICE).is_ok());
}
