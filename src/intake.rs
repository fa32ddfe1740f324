//! Request intake: multipart parsing, upload storage and image decoding.

use crate::model::RgbImage;
use axum::{
    body::Bytes,
    extract::{Multipart, multipart::MultipartError},
};
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// Multipart field carrying the question.
pub const TEXT_FIELD: &str = "text";
/// Multipart field carrying the image file.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("no image was provided")]
    MissingImage,
    #[error("unsupported image format, expected JPEG or PNG")]
    UnsupportedFormat,
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("malformed multipart form: {0}")]
    Multipart(#[from] MultipartError),
    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Detects the format from the leading bytes of the file.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Jpeg) => Some(ImageFormat::Jpeg),
            Ok(image::ImageFormat::Png) => Some(ImageFormat::Png),
            _ => None,
        }
    }

    fn codec(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// An uploaded image file as received from the client.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// The fields of a `/send_check` or `/send_per_check` form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub text: Option<String>,
    pub image: Option<ImageUpload>,
}

impl UploadForm {
    /// Reads every field of the form. Unknown fields are skipped and an empty
    /// file part counts as no image at all.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, IntakeError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(TEXT_FIELD) => form.text = Some(field.text().await?),
                Some(IMAGE_FIELD) => {
                    let file_name = field.file_name().map(str::to_owned);
                    let bytes = field.bytes().await?;
                    if bytes.is_empty() {
                        log::debug!("Ignoring empty image part {:?}", file_name);
                        continue;
                    }
                    form.image = Some(ImageUpload { file_name, bytes });
                }
                other => log::debug!("Ignoring multipart field {:?}", other),
            }
        }

        Ok(form)
    }

    /// Returns the image or fails with `MissingImage`.
    pub fn require_image(&mut self) -> Result<ImageUpload, IntakeError> {
        self.image.take().ok_or(IntakeError::MissingImage)
    }
}

/// Where uploads are written before decoding.
#[derive(Clone, Debug)]
pub struct UploadStore {
    root: PathBuf,
    keep: bool,
}

impl UploadStore {
    /// Opens a store rooted at `root`, creating the directory if needed. Without
    /// a root the system temporary directory is used.
    pub fn open(root: Option<&Path>, keep: bool) -> std::io::Result<Self> {
        let root = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                root.to_path_buf()
            }
            None => std::env::temp_dir(),
        };
        Ok(Self { root, keep })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keeps_uploads(&self) -> bool {
        self.keep
    }

    /// Writes the upload under a collision-free name derived from the client
    /// file name.
    pub fn persist(
        &self,
        upload: &ImageUpload,
        format: ImageFormat,
    ) -> Result<StoredUpload, IntakeError> {
        let prefix = format!("{}-", secure_stem(upload.file_name.as_deref()));
        let suffix = format!(".{}", format.extension());

        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(&self.root)?;
        file.write_all(&upload.bytes)?;
        file.flush()?;

        if self.keep {
            let (_, path) = file.keep().map_err(|e| IntakeError::Storage(e.error))?;
            log::info!("Kept upload at {}", path.display());
            Ok(StoredUpload::Kept(path))
        } else {
            Ok(StoredUpload::Transient(file))
        }
    }

    /// Persists the upload and decodes it into an RGB raster. Blocking.
    pub fn decode(&self, upload: &ImageUpload) -> Result<RgbImage, IntakeError> {
        let format = ImageFormat::sniff(&upload.bytes).ok_or(IntakeError::UnsupportedFormat)?;
        let stored = self.persist(upload, format)?;
        read_image(stored.path(), format)
    }
}

/// An upload on disk. Transient uploads are removed when dropped.
#[derive(Debug)]
pub enum StoredUpload {
    Transient(NamedTempFile),
    Kept(PathBuf),
}

impl StoredUpload {
    pub fn path(&self) -> &Path {
        match self {
            StoredUpload::Transient(file) => file.path(),
            StoredUpload::Kept(path) => path,
        }
    }
}

fn read_image(path: &Path, format: ImageFormat) -> Result<RgbImage, IntakeError> {
    let reader = BufReader::new(File::open(path)?);
    let rgb = image::load(reader, format.codec())
        .map_err(|e| IntakeError::Decode(e.to_string()))?
        .to_rgb8();

    // any colour type or bit depth ends up as packed 8-bit RGB
    let size = ImageSize {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
    };
    Image::new(size, rgb.into_raw(), CpuAllocator)
        .map_err(|e| IntakeError::Decode(e.to_string()))
}

/// Reduces a client file name to a safe stem made of ASCII letters, digits,
/// `-` and `_`.
pub fn secure_stem(file_name: Option<&str>) -> String {
    let base = file_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .unwrap_or_default();
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(dot) => &base[..dot],
    };

    let cleaned: String = stem
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .take(64)
        .collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 40) as u8, (y * 40) as u8, 128])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    pub(crate) fn rgb_fixture(width: u32, height: u32) -> RgbImage {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(Some(dir.path()), false).unwrap();
        store
            .decode(&ImageUpload {
                file_name: Some("fixture.png".to_string()),
                bytes: Bytes::from(png_bytes(width, height)),
            })
            .unwrap()
    }

    fn upload(name: &str, bytes: Vec<u8>) -> ImageUpload {
        ImageUpload {
            file_name: Some(name.to_string()),
            bytes: Bytes::from(bytes),
        }
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(ImageFormat::sniff(&png_bytes(1, 1)), Some(ImageFormat::Png));
        assert_eq!(
            ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::sniff(b"hello, world"), None);
        assert_eq!(ImageFormat::sniff(&[]), None);
    }

    #[test]
    fn test_secure_stem() {
        assert_eq!(secure_stem(Some("dog.jpg")), "dog");
        assert_eq!(secure_stem(Some("../../etc/passwd")), "passwd");
        assert_eq!(secure_stem(Some("C:\\photos\\my dog.png")), "my_dog");
        assert_eq!(secure_stem(Some("archive.tar.gz")), "archivetar");
        assert_eq!(secure_stem(Some(".hidden")), "hidden");
        assert_eq!(secure_stem(Some("사진.jpg")), "upload");
        assert_eq!(secure_stem(None), "upload");
    }

    #[test]
    fn test_decode_png_removes_transient_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(Some(dir.path()), false).unwrap();

        let image = store.decode(&upload("cat.png", png_bytes(5, 2))).unwrap();

        assert_eq!(image.size().width, 5);
        assert_eq!(image.size().height, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    fn encode(img: image::DynamicImage, format: image::ImageOutputFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn assert_rgb(store: &UploadStore, name: &str, bytes: Vec<u8>, width: usize, height: usize) {
        let image = store.decode(&upload(name, bytes)).unwrap();
        assert_eq!(image.size().width, width, "{name}");
        assert_eq!(image.size().height, height, "{name}");
        assert_eq!(image.as_slice().len(), width * height * 3, "{name}");
    }

    #[test]
    fn test_decode_converts_colour_types_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(Some(dir.path()), false).unwrap();

        let rgba = image::RgbaImage::from_pixel(4, 3, image::Rgba([200, 100, 50, 128]));
        let gray = image::GrayImage::from_fn(5, 2, |x, _| image::Luma([(x * 50) as u8]));
        let gray16 = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_pixel(
            3,
            3,
            image::Luma([40_000]),
        );

        assert_rgb(
            &store,
            "rgba.png",
            encode(rgba.into(), image::ImageOutputFormat::Png),
            4,
            3,
        );
        assert_rgb(
            &store,
            "gray.png",
            encode(gray.clone().into(), image::ImageOutputFormat::Png),
            5,
            2,
        );
        assert_rgb(
            &store,
            "gray16.png",
            encode(gray16.into(), image::ImageOutputFormat::Png),
            3,
            3,
        );
        assert_rgb(
            &store,
            "gray.jpg",
            encode(gray.into(), image::ImageOutputFormat::Jpeg(90)),
            5,
            2,
        );
    }

    #[test]
    fn test_decode_rgba_png_keeps_colour_channels() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(Some(dir.path()), false).unwrap();
        let rgba = image::RgbaImage::from_pixel(1, 1, image::Rgba([200, 100, 50, 255]));

        let image = store
            .decode(&upload(
                "pixel.png",
                encode(rgba.into(), image::ImageOutputFormat::Png),
            ))
            .unwrap();

        assert_eq!(image.as_slice(), &[200, 100, 50]);
    }

    #[test]
    fn test_decode_keeps_upload_with_detected_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(Some(dir.path()), true).unwrap();

        store.decode(&upload("cat.jpeg", png_bytes(2, 2))).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("cat-"));
        assert!(names[0].ends_with(".png"));
    }

    #[test]
    fn test_decode_rejects_text_renamed_to_jpg() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(Some(dir.path()), false).unwrap();

        let err = store
            .decode(&upload("notes.jpg", b"just some notes".to_vec()))
            .unwrap_err();

        assert!(matches!(err, IntakeError::UnsupportedFormat));
    }

    #[test]
    fn test_decode_rejects_truncated_png() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(Some(dir.path()), false).unwrap();
        let mut bytes = png_bytes(8, 8);
        bytes.truncate(24);

        let err = store.decode(&upload("broken.png", bytes)).unwrap_err();

        assert!(matches!(err, IntakeError::Decode(_)));
    }

    #[test]
    fn test_open_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads").join("today");

        let store = UploadStore::open(Some(&root), false).unwrap();

        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
        assert!(!store.keeps_uploads());
    }
}
