//! Uploaded file storage (report photos, ID documents)

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::models::errors::{AppError, AppResult};

/// Decode a base64 payload, accepting `data:<mime>;base64,` prefixes
pub fn decode_base64_payload(payload: &str) -> AppResult<Vec<u8>> {
    let data = payload.rsplit(',').next().unwrap_or(payload).trim();
    Ok(STANDARD.decode(data)?)
}

/// Files under MEDIA_ROOT, served under MEDIA_URL
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStore {
    pub fn new(root: PathBuf, url_prefix: impl Into<String>) -> Self {
        Self {
            root,
            url_prefix: url_prefix.into(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Write `{root}/{subdir}/{prefix}_{uuid}.jpg`, returning its public URL
    pub async fn save(&self, subdir: &str, prefix: &str, bytes: &[u8]) -> AppResult<String> {
        let dir = self.root.join(subdir);
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!("{}_{}.jpg", prefix, Uuid::new_v4().simple());
        let path = dir.join(&filename);
        tokio::fs::write(&path, bytes).await?;

        debug!(path = %path.display(), size = bytes.len(), "Media saved");
        Ok(format!("{}/{}/{}", self.url_prefix, subdir, filename))
    }

    /// Delete a file previously returned by [`MediaStore::save`]
    pub async fn remove(&self, url: &str) -> AppResult<()> {
        let relative = url
            .strip_prefix(self.url_prefix.as_str())
            .map(|rest| Path::new(rest.trim_start_matches('/')))
            .filter(|rest| rest.components().all(|c| matches!(c, Component::Normal(_))))
            .ok_or_else(|| AppError::bad_request(format!("Not a media URL: {}", url)))?;

        let path = self.root.join(relative);
        tokio::fs::remove_file(&path).await?;
        debug!(path = %path.display(), "Media removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_data_url_prefix() {
        let plain = STANDARD.encode(b"hello");
        assert_eq!(decode_base64_payload(&plain).unwrap(), b"hello");
        let data_url = format!("data:image/png;base64,{}", plain);
        assert_eq!(decode_base64_payload(&data_url).unwrap(), b"hello");
        assert!(decode_base64_payload("not base64 !!").is_err());
    }

    #[tokio::test]
    async fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path().to_path_buf(), "/media");

        let url = media.save("potholes", "pothole", b"jpeg-bytes").await.unwrap();
        assert!(url.starts_with("/media/potholes/pothole_"));
        assert!(url.ends_with(".jpg"));

        let file = url.trim_start_matches("/media/");
        let written = std::fs::read(dir.path().join(file)).unwrap();
        assert_eq!(written, b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_remove_deletes_saved_file() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path().to_path_buf(), "/media");

        let url = media.save("potholes", "pothole", b"jpeg-bytes").await.unwrap();
        media.remove(&url).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("potholes")).unwrap().count(), 0);

        assert!(media.remove("/media/../secret.txt").await.is_err());
        assert!(media.remove("/elsewhere/potholes/x.jpg").await.is_err());
    }
}
