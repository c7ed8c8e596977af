use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use campus_types::api::ImageUpload;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Namespace (sub-directory) profile pictures are stored under.
pub const PROFILE_PICTURES: &str = "profile-pictures";

/// 5 MB upload limit for profile pictures
pub const MAX_IMAGE_KIB: usize = 5120;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("payload is not valid base64")]
    NotBase64,
    #[error("payload is not an image")]
    NotAnImage,
    #[error("image type not accepted")]
    UnsupportedType,
    #[error("image exceeds {} KiB", MAX_IMAGE_KIB)]
    TooLarge,
}

/// A decoded, type-checked image ready to be written.
#[derive(Debug)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

impl Image {
    /// Decode the base64 payload and identify the image by its content, not
    /// by the client-supplied file name.
    pub fn decode(upload: &ImageUpload) -> Result<Self, ImageError> {
        let bytes = B64.decode(upload.content.trim()).map_err(|_| ImageError::NotBase64)?;
        if bytes.len() > MAX_IMAGE_KIB * 1024 {
            return Err(ImageError::TooLarge);
        }

        let extension = match sniff(&bytes) {
            Sniffed::Png => "png",
            Sniffed::Gif => "gif",
            Sniffed::Svg => "svg",
            // Keep the client's spelling of JPEG when it used one
            Sniffed::Jpeg if client_extension(&upload.filename).as_deref() == Some("jpeg") => "jpeg",
            Sniffed::Jpeg => "jpg",
            Sniffed::OtherImage => return Err(ImageError::UnsupportedType),
            Sniffed::Unknown => return Err(ImageError::NotAnImage),
        };

        Ok(Self { bytes, extension })
    }
}

enum Sniffed {
    Png,
    Jpeg,
    Gif,
    Svg,
    OtherImage,
    Unknown,
}

fn sniff(bytes: &[u8]) -> Sniffed {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Sniffed::Png;
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Sniffed::Jpeg;
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Sniffed::Gif;
    }
    if bytes.starts_with(b"BM") || (bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP") {
        return Sniffed::OtherImage;
    }

    // SVG is text: look for the root element near the start
    let head = &bytes[..bytes.len().min(1024)];
    if let Ok(text) = std::str::from_utf8(head) {
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if (text.starts_with("<svg") || text.starts_with("<?xml")) && text.contains("<svg") {
            return Sniffed::Svg;
        }
    }
    Sniffed::Unknown
}

fn client_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// On-disk blob storage.
///
/// Files live at `{root}/{namespace}/{name}`; the relative `{namespace}/{name}`
/// string is what gets recorded on the account.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(root.join(PROFILE_PICTURES)).await?;
        info!("File storage directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a profile picture under a `<unix_ts>_<random>.<ext>` name and
    /// return its relative path.
    pub async fn store_profile_picture(&self, image: &Image) -> Result<String> {
        let dir = self.root.join(PROFILE_PICTURES);
        fs::create_dir_all(&dir).await?;

        let filename = format!(
            "{}_{}.{}",
            chrono::Utc::now().timestamp(),
            random_alphanumeric(10),
            image.extension
        );
        let path = dir.join(&filename);

        // create_new: never clobber an existing upload
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(&path).await?;
        file.write_all(&image.bytes).await?;
        file.flush().await?;

        Ok(format!("{PROFILE_PICTURES}/{filename}"))
    }

    /// Delete a stored file by its relative path. Missing files are fine.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        let path = self.root.join(relative);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted stored file {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Stored file {} already gone", relative);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn random_alphanumeric(len: usize) -> String {
    rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn upload(filename: &str, bytes: &[u8]) -> ImageUpload {
        ImageUpload { filename: filename.into(), content: B64.encode(bytes) }
    }

    #[test]
    fn content_decides_the_type() {
        let img = Image::decode(&upload("holiday.txt", PNG)).unwrap();
        assert_eq!(img.extension, "png");

        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0];
        assert_eq!(Image::decode(&upload("me.JPEG", &jpeg)).unwrap().extension, "jpeg");
        assert_eq!(Image::decode(&upload("me.bin", &jpeg)).unwrap().extension, "jpg");

        let svg = b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>";
        assert_eq!(Image::decode(&upload("logo.svg", svg)).unwrap().extension, "svg");
    }

    #[test]
    fn rejects_non_images_and_oversized_payloads() {
        assert_eq!(Image::decode(&upload("a.png", b"hello world")).unwrap_err(), ImageError::NotAnImage);
        assert_eq!(Image::decode(&upload("a.bmp", b"BM\0\0\0\0")).unwrap_err(), ImageError::UnsupportedType);

        let bad = ImageUpload { filename: "a.png".into(), content: "***".into() };
        assert_eq!(Image::decode(&bad).unwrap_err(), ImageError::NotBase64);

        let mut big = PNG.to_vec();
        big.resize(MAX_IMAGE_KIB * 1024 + 1, 0);
        assert_eq!(Image::decode(&upload("big.png", &big)).unwrap_err(), ImageError::TooLarge);
    }

    #[tokio::test]
    async fn stores_and_deletes_profile_pictures() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();
        let image = Image::decode(&upload("me.png", PNG)).unwrap();

        let first = storage.store_profile_picture(&image).await.unwrap();
        let second = storage.store_profile_picture(&image).await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("profile-pictures/"));
        assert!(first.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&first)).unwrap(), PNG);

        storage.delete(&first).await.unwrap();
        assert!(!dir.path().join(&first).exists());
        // already gone is not an error
        storage.delete(&first).await.unwrap();
    }

    #[tokio::test]
    async fn write_failure_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();
        std::fs::remove_dir(dir.path().join(PROFILE_PICTURES)).unwrap();
        std::fs::write(dir.path().join(PROFILE_PICTURES), b"not a directory").unwrap();

        let image = Image::decode(&upload("me.png", PNG)).unwrap();
        assert!(storage.store_profile_picture(&image).await.is_err());
    }

    #[test]
    fn random_names_use_the_alphanumeric_alphabet() {
        let name = random_alphanumeric(32);
        assert_eq!(name.len(), 32);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_names_draw_every_character_evenly() {
        let mut counts = std::collections::HashMap::new();
        for c in random_alphanumeric(248_000).chars() {
            *counts.entry(c).or_insert(0u32) += 1;
        }
        assert_eq!(counts.len(), 62);

        // 4000 expected per character; a modulo bias shows up as a ~25% gap
        let max = *counts.values().max().unwrap() as f64;
        let min = *counts.values().min().unwrap() as f64;
        assert!(max / min < 1.15, "max {max} min {min}");
    }
}
