//! Profile picture storage
//!
//! Uploaded pictures are stored under a random hex name that keeps the
//! original extension. Removing a picture never touches the shared default
//! image.

use anyhow::{anyhow, Context};
use data_encoding::HEXLOWER;
use std::path::Path;
use tokio::fs;

use crate::config::UploadConfig;
use crate::models::DEFAULT_IMAGE;

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// Extension missing or not in the allowed list
    #[error("File does not have an approved extension: {0}")]
    InvalidExtension(String),

    #[error("File too large. Maximum size: {0} bytes")]
    TooLarge(u64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct AvatarStore {
    config: UploadConfig,
}

impl AvatarStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.config.path
    }

    /// Largest accepted picture in bytes
    pub fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }

    /// Check an uploaded file name, returning its lower-cased extension
    pub fn check_extension(&self, original_name: &str) -> Result<String, AvatarError> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| AvatarError::InvalidExtension(original_name.to_string()))?;

        if self.config.is_extension_allowed(&ext) {
            Ok(ext)
        } else {
            Err(AvatarError::InvalidExtension(original_name.to_string()))
        }
    }

    /// Store a new picture and return its file name
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<String, AvatarError> {
        let ext = self.check_extension(original_name)?;
        if data.len() as u64 > self.config.max_file_size {
            return Err(AvatarError::TooLarge(self.config.max_file_size));
        }

        let dir = self.dir();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;

        let filename = format!("{}.{}", random_hex()?, ext);
        fs::write(dir.join(&filename), data)
            .await
            .with_context(|| format!("Failed to save picture {}", filename))?;

        tracing::debug!("Saved profile picture {}", filename);
        Ok(filename)
    }

    /// Delete a stored picture. The default image and missing files are left
    /// alone; failures are only logged.
    pub async fn remove(&self, filename: &str) {
        if filename == DEFAULT_IMAGE || filename.contains(['/', '\\']) || filename.contains("..") {
            return;
        }
        let path = self.dir().join(filename);
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove picture {}: {}", path.display(), e);
            }
        }
    }
}

fn random_hex() -> anyhow::Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).map_err(|e| anyhow!("Failed to generate file name: {}", e))?;
    Ok(HEXLOWER.encode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> AvatarStore {
        let config = UploadConfig {
            path: dir.path().join("pics"),
            max_file_size: 16,
            ..UploadConfig::default()
        };
        AvatarStore::new(&config)
    }

    #[test]
    fn test_check_extension() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.check_extension("me.JPG").unwrap(), "jpg");
        assert_eq!(store.check_extension("a.b.png").unwrap(), "png");
        assert!(matches!(store.check_extension("me.gif"), Err(AvatarError::InvalidExtension(_))));
        assert!(matches!(store.check_extension("noext"), Err(AvatarError::InvalidExtension(_))));
    }

    #[tokio::test]
    async fn test_save_uses_random_hex_name() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let name = store.save("face.png", b"png-bytes").await.unwrap();

        let (stem, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "png");
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(std::fs::read(store.dir().join(&name)).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_save_rejects_large_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let result = store.save("big.jpg", &[0u8; 17]).await;
        assert!(matches!(result, Err(AvatarError::TooLarge(16))));
    }

    #[tokio::test]
    async fn test_remove_keeps_default_image() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join(DEFAULT_IMAGE), b"default").unwrap();

        store.remove(DEFAULT_IMAGE).await;
        store.remove("missing.jpg").await;

        assert!(store.dir().join(DEFAULT_IMAGE).exists());
    }
}
