// 媒体存储
// 上传的文件交给 `MediaStorage` 保存，业务层只记录返回的引用

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::models::post::{MediaKind, MediaRef};

/// 单个文件大小上限 50 MiB
pub const MAX_FILE_BYTES: usize = 50 * 1024 * 1024;
/// 每个帖子最多附带的文件数
pub const MAX_FILES_PER_POST: usize = 5;

const ALLOWED: &[(&str, MediaKind, &[&str])] = &[
    ("jpg", MediaKind::Image, &["image/jpeg", "image/jpg"]),
    ("jpeg", MediaKind::Image, &["image/jpeg", "image/jpg"]),
    ("png", MediaKind::Image, &["image/png"]),
    ("gif", MediaKind::Image, &["image/gif"]),
    ("mp4", MediaKind::Video, &["video/mp4"]),
    ("mov", MediaKind::Video, &["video/quicktime", "video/mov"]),
    ("avi", MediaKind::Video, &["video/x-msvideo", "video/avi", "video/msvideo"]),
];

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Only image and video files are allowed (got {0})")]
    UnsupportedType(String),
    #[error("File too large, maximum size is {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Too many files, at most {0} are allowed")]
    TooManyFiles(usize),
    #[error("media io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 一个待保存的上传文件
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl MediaUpload {
    /// 校验扩展名、MIME 类型和大小，返回媒体类别和规范化的扩展名
    pub fn inspect(&self) -> Result<(MediaKind, &'static str), MediaError> {
        if self.bytes.len() > MAX_FILE_BYTES {
            return Err(MediaError::TooLarge {
                limit: MAX_FILE_BYTES,
            });
        }

        let filename = self.filename.as_deref().unwrap_or_default();
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let Some((ext, kind, mime_types)) = ALLOWED.iter().find(|(ext, _, _)| *ext == extension)
        else {
            return Err(MediaError::UnsupportedType(display_name(filename)));
        };

        // 未声明类型时只看扩展名
        if let Some(content_type) = self.content_type.as_deref() {
            let content_type = content_type.to_lowercase();
            if !mime_types.contains(&content_type.as_str()) {
                return Err(MediaError::UnsupportedType(content_type));
            }
        }

        Ok((*kind, ext))
    }
}

fn display_name(filename: &str) -> String {
    if filename.is_empty() {
        "unnamed file".to_string()
    } else {
        filename.to_string()
    }
}

#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// 保存文件，返回可访问的引用
    async fn store(&self, upload: MediaUpload) -> Result<MediaRef, MediaError>;

    /// 删除文件，文件不存在时视为成功
    async fn delete(&self, public_id: &str) -> Result<(), MediaError>;
}

/// 保存到本地目录，通过静态文件路由对外提供
pub struct LocalMediaStorage {
    dir: PathBuf,
    base_url: String,
}

impl LocalMediaStorage {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.upload_dir.clone(), config.upload_base_url.clone())
    }

    fn path_for(&self, public_id: &str) -> Option<PathBuf> {
        // 只接受单个文件名，避免越出上传目录
        let name = Path::new(public_id).file_name()?;
        (name == public_id).then(|| self.dir.join(name))
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn store(&self, upload: MediaUpload) -> Result<MediaRef, MediaError> {
        let (kind, extension) = upload.inspect()?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let public_id = format!("{}.{}", Uuid::new_v4(), extension);
        tokio::fs::write(self.dir.join(&public_id), &upload.bytes).await?;

        tracing::debug!("Stored {} bytes as {}", upload.bytes.len(), public_id);
        Ok(MediaRef {
            kind,
            url: format!("{}/{}", self.base_url.trim_end_matches('/'), public_id),
            public_id,
            filename: upload.filename,
            size: upload.bytes.len() as u64,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        let Some(path) = self.path_for(public_id) else {
            tracing::warn!("Refusing to delete media with invalid id: {}", public_id);
            return Ok(());
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn upload(filename: &str, content_type: Option<&str>, len: usize) -> MediaUpload {
        MediaUpload {
            filename: Some(filename.to_string()),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    #[rstest]
    #[case("photo.JPG", Some("image/jpeg"), MediaKind::Image, "jpg")]
    #[case("clip.mp4", Some("video/mp4"), MediaKind::Video, "mp4")]
    #[case("clip.mov", Some("video/quicktime"), MediaKind::Video, "mov")]
    #[case("anim.gif", None, MediaKind::Image, "gif")]
    fn accepts_images_and_videos(
        #[case] filename: &str,
        #[case] content_type: Option<&str>,
        #[case] kind: MediaKind,
        #[case] extension: &str,
    ) {
        let (found_kind, found_ext) = upload(filename, content_type, 10).inspect().unwrap();
        assert_eq!(found_kind, kind);
        assert_eq!(found_ext, extension);
    }

    #[rstest]
    #[case("notes.pdf", Some("application/pdf"))]
    #[case("photo.png", Some("application/octet-stream"))]
    #[case("noextension", Some("image/png"))]
    fn rejects_other_files(#[case] filename: &str, #[case] content_type: Option<&str>) {
        assert!(matches!(
            upload(filename, content_type, 10).inspect(),
            Err(MediaError::UnsupportedType(_))
        ));
    }

    #[test]
    fn rejects_oversized_files() {
        assert!(matches!(
            upload("big.mp4", Some("video/mp4"), MAX_FILE_BYTES + 1).inspect(),
            Err(MediaError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn local_storage_writes_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalMediaStorage::new(dir.path(), "/uploads/");

        let media = storage
            .store(upload("cat.png", Some("image/png"), 16))
            .await
            .unwrap();

        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.size, 16);
        assert_eq!(media.url, format!("/uploads/{}", media.public_id));
        assert!(dir.path().join(&media.public_id).exists());

        storage.delete(&media.public_id).await.unwrap();
        assert!(!dir.path().join(&media.public_id).exists());
        // 重复删除不报错
        storage.delete(&media.public_id).await.unwrap();
    }

    #[tokio::test]
    async fn delete_ignores_paths_outside_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalMediaStorage::new(dir.path().join("media"), "/uploads");
        let outside = dir.path().join("keep.txt");
        std::fs::write(&outside, b"keep").unwrap();

        storage.delete("../keep.txt").await.unwrap();
        assert!(outside.exists());
    }
}
