//! Turns base64 image payloads embedded in notebook outputs into static
//! WebP files served from the media directory.
//!
//! Files are content-addressed by the SHA-256 of the base64 text, so the
//! same payload always lands at the same path and re-materialising it simply
//! overwrites the file with identical bytes.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, ImageReader, codecs::webp::WebPEncoder};
use metrics::counter;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Extension of every persisted image.
pub const MATERIALIZED_EXTENSION: &str = "webp";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported image format `{0}`")]
    UnsupportedFormat(String),
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image payload could not be decoded: {0}")]
    Decode(#[source] image::ImageError),
    #[error("image could not be encoded as webp: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image storage failed: {0}")]
    Io(#[from] io::Error),
}

/// Decoder lookup keyed by the declared file extension.
///
/// Extensions missing from the table are rejected instead of guessed.
#[derive(Debug, Clone)]
pub struct DecoderTable {
    formats: HashMap<String, ImageFormat>,
}

impl DecoderTable {
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    pub fn with_format(mut self, extension: &str, format: ImageFormat) -> Self {
        self.formats.insert(extension.to_ascii_lowercase(), format);
        self
    }

    pub fn lookup(&self, extension: &str) -> Option<ImageFormat> {
        self.formats.get(&extension.to_ascii_lowercase()).copied()
    }
}

impl Default for DecoderTable {
    fn default() -> Self {
        Self::empty()
            .with_format("png", ImageFormat::Png)
            .with_format("jpg", ImageFormat::Jpeg)
            .with_format("jpeg", ImageFormat::Jpeg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedImage {
    pub path: PathBuf,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ImageMaterializer {
    directory: PathBuf,
    public_base_url: String,
    decoders: DecoderTable,
}

impl ImageMaterializer {
    /// Create a materializer writing into `directory`, creating it if necessary.
    ///
    /// `public_base_url` is the URL the directory is served under.
    pub fn new(directory: PathBuf, public_base_url: impl Into<String>) -> io::Result<Self> {
        fs::create_dir_all(&directory)?;
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            directory,
            public_base_url,
            decoders: DecoderTable::default(),
        })
    }

    pub fn with_decoders(mut self, decoders: DecoderTable) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Decode `payload`, re-encode it as lossless WebP, and return where it landed.
    ///
    /// The returned URL is built from the content hash; it is not checked
    /// against the served directory.
    pub fn materialize(
        &self,
        payload: &str,
        extension: &str,
    ) -> Result<MaterializedImage, ImageError> {
        let started_at = Instant::now();
        let format = self
            .decoders
            .lookup(extension)
            .ok_or_else(|| ImageError::UnsupportedFormat(extension.to_string()))?;

        let key = content_key(payload);
        let compact: String = payload
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();
        let bytes = STANDARD.decode(compact.as_bytes())?;

        // Transient copy of the original bytes; removed when dropped.
        let mut intermediate = tempfile::Builder::new()
            .prefix(&key)
            .suffix(&format!(".{}", extension.to_ascii_lowercase()))
            .tempfile_in(&self.directory)?;
        intermediate.write_all(&bytes)?;
        intermediate.flush()?;

        let reader = BufReader::new(File::open(intermediate.path())?);
        let decoded = ImageReader::with_format(reader, format)
            .decode()
            .map_err(ImageError::Decode)?;
        let normalized = DynamicImage::ImageRgba8(decoded.to_rgba8());

        let mut encoded = tempfile::Builder::new()
            .prefix(&key)
            .suffix(&format!(".{MATERIALIZED_EXTENSION}.tmp"))
            .tempfile_in(&self.directory)?;
        {
            let mut writer = BufWriter::new(encoded.as_file_mut());
            normalized
                .write_with_encoder(WebPEncoder::new_lossless(&mut writer))
                .map_err(ImageError::Encode)?;
            writer.flush()?;
        }

        let filename = format!("{key}.{MATERIALIZED_EXTENSION}");
        let path = self.directory.join(&filename);
        encoded.persist(&path).map_err(|err| err.error)?;
        drop(intermediate);

        counter!("nbpress_images_materialized_total").increment(1);
        debug!(
            target = "application::images",
            op = "images::materialize",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            width = normalized.width(),
            height = normalized.height(),
            path = %path.display(),
            "Materialized notebook image"
        );

        Ok(MaterializedImage {
            url: format!("{}/{filename}", self.public_base_url),
            path,
        })
    }
}

fn content_key(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba, codecs::png::PngEncoder};
    use tempfile::TempDir;

    /// Base64 PNG of the given size with a simple gradient.
    pub(crate) fn png_payload(width: u32, height: u32) -> String {
        let buffer = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x * 40) as u8, (y * 40) as u8, 128, 255])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(buffer)
            .write_with_encoder(PngEncoder::new(&mut bytes))
            .expect("encode png");
        STANDARD.encode(bytes)
    }

    fn materializer(dir: &TempDir) -> ImageMaterializer {
        ImageMaterializer::new(dir.path().join("media"), "https://blog.example/media/")
            .expect("materializer")
    }

    fn files_in(path: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(path)
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn materializes_png_as_webp_with_same_dimensions() {
        let dir = TempDir::new().expect("temp dir");
        let materializer = materializer(&dir);
        let payload = png_payload(3, 2);

        let image = materializer.materialize(&payload, "png").expect("materialized");

        let key = content_key(&payload);
        assert_eq!(image.url, format!("https://blog.example/media/{key}.webp"));
        assert_eq!(files_in(materializer.directory()), vec![format!("{key}.webp")]);

        let bytes = fs::read(&image.path).expect("read webp");
        let decoded =
            image::load_from_memory_with_format(&bytes, ImageFormat::WebP).expect("decode webp");
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn materializing_twice_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let materializer = materializer(&dir);
        let payload = png_payload(4, 4);

        let first = materializer.materialize(&payload, "png").expect("first");
        let first_bytes = fs::read(&first.path).expect("first bytes");
        let second = materializer.materialize(&payload, "png").expect("second");
        let second_bytes = fs::read(&second.path).expect("second bytes");

        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(files_in(materializer.directory()).len(), 1);
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let dir = TempDir::new().expect("temp dir");
        let materializer = materializer(&dir);
        let payload = png_payload(2, 2);
        let wrapped = format!("{}\n{}", &payload[..10], &payload[10..]);

        materializer.materialize(&wrapped, "png").expect("materialized");
    }

    #[test]
    fn non_image_bytes_fail_and_leave_no_files() {
        let dir = TempDir::new().expect("temp dir");
        let materializer = materializer(&dir);
        let payload = STANDARD.encode(b"definitely not a png");

        let err = materializer
            .materialize(&payload, "png")
            .expect_err("decode should fail");

        assert!(matches!(err, ImageError::Decode(_)), "unexpected: {err:?}");
        assert!(files_in(materializer.directory()).is_empty());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let err = materializer(&dir)
            .materialize("***", "png")
            .expect_err("base64 should fail");
        assert!(matches!(err, ImageError::Base64(_)));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = TempDir::new().expect("temp dir");
        let err = materializer(&dir)
            .materialize(&png_payload(1, 1), "tiff")
            .expect_err("tiff unsupported");
        assert!(matches!(err, ImageError::UnsupportedFormat(ext) if ext == "tiff"));
    }

    #[test]
    fn decoder_table_limits_accepted_extensions() {
        let dir = TempDir::new().expect("temp dir");
        let png_only = materializer(&dir)
            .with_decoders(DecoderTable::empty().with_format("PNG", ImageFormat::Png));

        assert!(png_only.materialize(&png_payload(1, 1), "png").is_ok());
        let err = png_only
            .materialize(&png_payload(1, 1), "jpg")
            .expect_err("jpg not registered");
        assert!(matches!(err, ImageError::UnsupportedFormat(ext) if ext == "jpg"));
    }
}
