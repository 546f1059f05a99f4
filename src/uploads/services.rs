use bytes::Bytes;
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{state::AppState, storage::StorageError};

const MAX_BASE_NAME_LEN: usize = 50;
const RANDOM_SUFFIX_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file type not allowed: {0}")]
    InvalidType(String),
    #[error("file too large (max {max} bytes)")]
    TooLarge { max: usize },
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("invalid filename: {0}")]
    InvalidName(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for UploadError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => UploadError::NotFound(key),
            StorageError::Io(io) => UploadError::Io(io),
        }
    }
}

pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: usize,
    pub url: String,
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "application/pdf" => Some("pdf"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        _ => None,
    }
}

pub fn is_allowed_type(ct: &str) -> bool {
    ext_from_mime(ct).is_some()
}

/// `<sanitized base>-<unix millis>-<suffix>.<ext>`; `None` for types outside
/// the allow-list.
pub fn storage_filename(original_name: &str, content_type: &str, millis: i128, suffix: &str) -> Option<String> {
    lazy_static! {
        static ref NON_ALNUM: Regex = Regex::new(r"[^A-Za-z0-9]").unwrap();
    }
    let ext = ext_from_mime(content_type)?;
    let stem = match original_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original_name,
    };
    let mut base: String = NON_ALNUM.replace_all(stem, "").into_owned();
    base.truncate(MAX_BASE_NAME_LEN);
    if base.is_empty() {
        base.push_str("file");
    }
    Some(format!("{base}-{millis}-{suffix}.{ext}"))
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Plain file names only: no separators, no parent refs, no hidden files.
pub fn validate_filename(filename: &str) -> Result<(), UploadError> {
    let bad = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
        || filename.contains("..");
    if bad {
        return Err(UploadError::InvalidName(filename.to_string()));
    }
    Ok(())
}

/// Filename part of `url` when it points into the uploads prefix.
pub fn filename_from_url<'a>(url_prefix: &str, url: &'a str) -> Option<&'a str> {
    let prefix = url_prefix.trim_end_matches('/');
    let rest = url.strip_prefix(prefix)?.strip_prefix('/')?;
    validate_filename(rest).ok().map(|_| rest)
}

pub async fn upload(st: &AppState, file: IncomingFile) -> Result<UploadedFile, UploadError> {
    let max = st.config.uploads.max_bytes;
    let size = file.body.len();
    if size > max {
        return Err(UploadError::TooLarge { max });
    }
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let name = storage_filename(&file.original_name, &file.content_type, millis, &random_suffix())
        .ok_or_else(|| UploadError::InvalidType(file.content_type.clone()))?;

    st.storage.put_object(&name, file.body, &file.content_type).await?;

    info!(%name, size, content_type = %file.content_type, "file uploaded");
    Ok(UploadedFile {
        url: st.storage.public_url(&name),
        name,
        content_type: file.content_type,
        size,
    })
}

pub async fn remove(st: &AppState, filename: &str) -> Result<(), UploadError> {
    validate_filename(filename)?;
    st.storage.delete_object(filename).await?;
    info!(%filename, "file removed");
    Ok(())
}

/// Cleanup after a referencing record goes away. Never fails the caller.
pub async fn remove_by_url(st: &AppState, url: Option<&str>) {
    let Some(url) = url else { return };
    let Some(filename) = filename_from_url(&st.config.uploads.url_prefix, url) else {
        return;
    };
    match remove(st, filename).await {
        Ok(()) => {}
        Err(UploadError::NotFound(_)) => warn!(%filename, "referenced upload already gone"),
        Err(e) => warn!(%filename, error = %e, "failed to remove upload"),
    }
}

#[cfg(test)]
mod upload_tests {
    use super::*;

    fn file(name: &str, ct: &str, len: usize) -> IncomingFile {
        IncomingFile {
            original_name: name.into(),
            content_type: ct.into(),
            body: Bytes::from(vec![7u8; len]),
        }
    }

    fn entries(dir: &std::path::Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(rd) => rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("application/pdf"), Some("pdf"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
        assert_eq!(ext_from_mime("text/html"), None);
    }

    #[test]
    fn filename_is_sanitized_and_typed_by_mime() {
        let name = storage_filename("../../etc/My Résumé (final).PDF", "application/pdf", 1700000000000, "ab12cd")
            .unwrap();
        assert_eq!(name, "etcMyRsumfinal-1700000000000-ab12cd.pdf");

        let name = storage_filename("....", "image/png", 1, "zzzzzz").unwrap();
        assert_eq!(name, "file-1-zzzzzz.png");

        assert!(storage_filename("x.exe", "application/x-msdownload", 1, "a").is_none());
    }

    #[test]
    fn filename_validation() {
        assert!(validate_filename("cv-1-abc.pdf").is_ok());
        for bad in ["", ".hidden", "../x.pdf", "a/b.pdf", "a\\b.pdf", "a..b"] {
            assert!(validate_filename(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn url_outside_prefix_is_ignored() {
        assert_eq!(filename_from_url("/uploads", "/uploads/a-1-x.png"), Some("a-1-x.png"));
        assert_eq!(filename_from_url("/uploads/", "/uploads/a-1-x.png"), Some("a-1-x.png"));
        assert_eq!(filename_from_url("/uploads", "https://cdn.example.com/a.png"), None);
        assert_eq!(filename_from_url("/uploads", "/uploads/../secret"), None);
        assert_eq!(filename_from_url("/uploads", "/uploadsx/a.png"), None);
    }

    #[tokio::test]
    async fn rejects_disallowed_type_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let st = AppState::fake(&root);
        let err = upload(&st, file("x.html", "text/html", 10)).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidType(_)));
        assert!(entries(&root).is_empty());
    }

    #[tokio::test]
    async fn rejects_oversized_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let st = AppState::fake(&root);
        let max = st.config.uploads.max_bytes;
        let err = upload(&st, file("big.png", "image/png", max + 1)).await.unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { .. }));
        assert!(entries(&root).is_empty());
    }

    #[tokio::test]
    async fn upload_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let st = AppState::fake(dir.path());
        let saved = upload(&st, file("Photo.jpeg", "image/jpeg", 1024)).await.unwrap();
        assert!(saved.url.starts_with("/uploads/Photo-"));
        assert!(saved.name.ends_with(".jpg"));
        assert_eq!(saved.size, 1024);
        assert!(dir.path().join(&saved.name).exists());

        remove(&st, &saved.name).await.unwrap();
        assert!(!dir.path().join(&saved.name).exists());
        assert!(matches!(remove(&st, &saved.name).await, Err(UploadError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_by_url_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let st = AppState::fake(dir.path());
        let saved = upload(&st, file("cert.png", "image/png", 8)).await.unwrap();

        remove_by_url(&st, Some("https://elsewhere.example/cert.png")).await;
        assert!(dir.path().join(&saved.name).exists());

        remove_by_url(&st, Some(&saved.url)).await;
        assert!(!dir.path().join(&saved.name).exists());

        // already gone and absent URLs are both silent
        remove_by_url(&st, Some(&saved.url)).await;
        remove_by_url(&st, None).await;
    }
}
