//! Host capabilities the front end can offer to the chat core.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};

use crate::core::config::data::path_display;
use crate::core::message::ImageAttachment;

#[derive(Debug)]
pub enum ImageError {
    UnsupportedType(PathBuf),
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::UnsupportedType(path) => {
                write!(f, "{} is not a supported image type", path_display(path))
            }
            ImageError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path_display(path), source)
            }
        }
    }
}

impl StdError for ImageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ImageError::Io { source, .. } => Some(source),
            ImageError::UnsupportedType(_) => None,
        }
    }
}

/// Turns a user-chosen file into an inline image payload.
#[async_trait]
pub trait ImageReader: Send + Sync {
    async fn read_image(&self, path: &Path) -> Result<ImageAttachment, ImageError>;
}

/// Reads images from the local filesystem.
pub struct FsImageReader;

#[async_trait]
impl ImageReader for FsImageReader {
    async fn read_image(&self, path: &Path) -> Result<ImageAttachment, ImageError> {
        let mime_type =
            mime_from_extension(path).ok_or_else(|| ImageError::UnsupportedType(path.into()))?;
        let bytes = tokio::fs::read(path).await.map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(ImageAttachment {
            base64: BASE64_STANDARD.encode(bytes),
            mime_type: mime_type.to_string(),
        })
    }
}

pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "bmp" => "image/bmp",
        _ => return None,
    };
    Some(mime)
}

#[derive(Debug)]
pub enum SpeechError {
    PermissionDenied,
    Unavailable(String),
}

impl fmt::Display for SpeechError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeechError::PermissionDenied => write!(f, "Microphone access was denied"),
            SpeechError::Unavailable(reason) => write!(f, "Speech input unavailable: {reason}"),
        }
    }
}

impl StdError for SpeechError {}

/// Captures one spoken utterance and returns its transcript.
///
/// No terminal implementation ships; hosts with a microphone can inject one.
#[async_trait]
pub trait SpeechInputSource: Send + Sync {
    async fn listen(&self) -> Result<String, SpeechError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(mime_from_extension(Path::new("cat.PNG")), Some("image/png"));
        assert_eq!(mime_from_extension(Path::new("a/b/photo.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_from_extension(Path::new("notes.txt")), None);
        assert_eq!(mime_from_extension(Path::new("README")), None);
    }

    #[tokio::test]
    async fn fs_reader_encodes_file_contents() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("pixel.png");
        std::fs::write(&path, b"\x89PNG").expect("write image");

        let image = FsImageReader.read_image(&path).await.expect("read image");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.base64, "iVBORw==");
    }

    #[tokio::test]
    async fn fs_reader_rejects_unknown_types_before_reading() {
        let err = FsImageReader
            .read_image(Path::new("/nonexistent/archive.zip"))
            .await
            .expect_err("unsupported");
        assert!(matches!(err, ImageError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn fs_reader_reports_missing_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let err = FsImageReader
            .read_image(&temp_dir.path().join("missing.gif"))
            .await
            .expect_err("missing");
        assert!(matches!(err, ImageError::Io { .. }));
    }
}
