use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageReader};
use rayon::prelude::*;

use crate::config::CoverConfig;
use crate::error::{IoContext, QuireError, Result};
use crate::paths::to_portable_path;
use crate::types::{VariantRecord, VariantTable};
use crate::walk::{has_extension, list_all_files};

pub const COVER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

pub type CodecResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantFormat {
    WebP,
    Jpeg,
}

impl VariantFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpg",
        }
    }
}

/// Decodes source images and encodes resized renditions of them.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, path: &Path) -> CodecResult<DynamicImage>;

    /// Never upscales: a target wider than the image keeps the native width.
    fn encode(
        &self,
        image: &DynamicImage,
        target_width: u32,
        format: VariantFormat,
        quality: u8,
    ) -> CodecResult<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn decode(&self, path: &Path) -> CodecResult<DynamicImage> {
        Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        target_width: u32,
        format: VariantFormat,
        quality: u8,
    ) -> CodecResult<Vec<u8>> {
        let resized = resize_to_width(image, target_width);

        match format {
            VariantFormat::WebP => {
                let rgba_image = resized.to_rgba8();
                let encoder =
                    webp::Encoder::from_rgba(rgba_image.as_raw(), resized.width(), resized.height());
                let encoded = encoder
                    .encode_simple(false, f32::from(quality))
                    .map_err(|error| {
                        format!(
                            "WebP encoding of {}x{} rendition failed: {error:?}",
                            resized.width(),
                            resized.height()
                        )
                    })?;
                Ok(encoded.to_vec())
            }
            VariantFormat::Jpeg => {
                let mut bytes = Vec::new();
                let rgb_image = resized.to_rgb8();
                JpegEncoder::new_with_quality(&mut bytes, quality).write_image(
                    rgb_image.as_raw(),
                    resized.width(),
                    resized.height(),
                    image::ExtendedColorType::Rgb8,
                )?;
                Ok(bytes)
            }
        }
    }
}

pub fn resize_to_width(image: &DynamicImage, target_width: u32) -> Cow<'_, DynamicImage> {
    let original_width = image.width();
    if target_width >= original_width || original_width == 0 {
        return Cow::Borrowed(image);
    }
    let scale_factor = f64::from(target_width) / f64::from(original_width);
    let target_height = ((f64::from(image.height()) * scale_factor).round() as u32).max(1);
    Cow::Owned(image.resize_exact(target_width, target_height, FilterType::Lanczos3))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeRole {
    Small,
    Large,
}

struct GeneratedCover {
    key: String,
    record: VariantRecord,
    files_written: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VariantSummary {
    pub table: VariantTable,
    pub files_written: usize,
}

/// Renders every cover under `cover_dir` at the small and large widths in
/// both formats, below `output_dir/<covers.output>`. Any failing image fails
/// the whole stage.
pub fn generate_variants(
    cover_dir: &Path,
    output_dir: &Path,
    config: &CoverConfig,
    codec: &dyn ImageCodec,
) -> Result<VariantSummary> {
    if !cover_dir.is_dir() {
        tracing::warn!(dir = %cover_dir.display(), "cover directory not found, no variants generated");
        return Ok(VariantSummary::default());
    }

    let cover_root = std::path::absolute(cover_dir)?;
    let mut covers: Vec<PathBuf> = list_all_files(&cover_root)?
        .into_iter()
        .filter(|path| has_extension(path, COVER_EXTENSIONS))
        .collect();
    covers.sort();

    let generated: Vec<GeneratedCover> = covers
        .par_iter()
        .map(|cover| generate_cover(cover, &cover_root, output_dir, config, codec))
        .collect::<Result<Vec<_>>>()?;

    let mut summary = VariantSummary::default();
    for cover in generated {
        summary.files_written += cover.files_written;
        summary.table.insert(cover.key, cover.record);
    }

    tracing::info!(
        covers = summary.table.len(),
        files = summary.files_written,
        "generated cover variants"
    );
    Ok(summary)
}

fn generate_cover(
    cover: &Path,
    cover_root: &Path,
    output_dir: &Path,
    config: &CoverConfig,
    codec: &dyn ImageCodec,
) -> Result<GeneratedCover> {
    let image_error = |message: String| QuireError::ImageProcessing {
        path: cover.to_path_buf(),
        message,
    };

    let relative = cover
        .strip_prefix(cover_root)
        .map_err(|_| QuireError::InvalidPath {
            path: cover.to_path_buf(),
        })?;
    let stem = relative
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| QuireError::InvalidPath {
            path: cover.to_path_buf(),
        })?;
    let relative_dir = relative.parent().unwrap_or(Path::new(""));
    let output_prefix = Path::new(&config.output).join(relative_dir);

    let source_image = codec.decode(cover).map_err(|error| image_error(error.to_string()))?;

    let mut record = VariantRecord::default();
    let mut files_written = 0;

    for (width, role) in [
        (config.small_width, SizeRole::Small),
        (config.large_width, SizeRole::Large),
    ] {
        for format in [VariantFormat::WebP, VariantFormat::Jpeg] {
            let relative_variant =
                output_prefix.join(format!("{stem}-{width}w.{}", format.extension()));
            let variant_path = output_dir.join(&relative_variant);

            let encoded = codec
                .encode(&source_image, width, format, config.quality)
                .map_err(|error| image_error(error.to_string()))?;

            if let Some(parent) = variant_path.parent() {
                fs::create_dir_all(parent).io_context("creating directory", parent)?;
            }
            fs::write(&variant_path, encoded).io_context("writing variant", &variant_path)?;
            files_written += 1;

            let portable = to_portable_path(&relative_variant);
            let slot = match (role, format) {
                (SizeRole::Small, VariantFormat::WebP) => &mut record.webp_small,
                (SizeRole::Large, VariantFormat::WebP) => &mut record.webp_large,
                (SizeRole::Small, VariantFormat::Jpeg) => &mut record.jpeg_small,
                (SizeRole::Large, VariantFormat::Jpeg) => &mut record.jpeg_large,
            };
            *slot = Some(portable);
        }
    }

    tracing::debug!(cover = %cover.display(), "rendered variants");

    Ok(GeneratedCover {
        key: to_portable_path(&output_prefix.join(stem)),
        record,
        files_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_cover(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([180, 90, 40]))
            .save(path)
            .unwrap();
    }

    fn width_of(path: &Path) -> u32 {
        ImageReader::open(path)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .decode()
            .unwrap()
            .width()
    }

    #[test]
    fn test_resize_to_width_never_upscales() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(300, 450));
        let resized = resize_to_width(&image, 900);
        assert!(matches!(resized, Cow::Borrowed(_)));
        assert_eq!(resized.width(), 300);
    }

    #[test]
    fn test_resize_to_width_keeps_aspect_ratio() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(1200, 1800));
        let resized = resize_to_width(&image, 480);
        assert_eq!(resized.width(), 480);
        assert_eq!(resized.height(), 720);
    }

    #[test]
    fn test_generate_variants_writes_four_files() {
        let dir = TempDir::new().unwrap();
        let covers = dir.path().join("public/images/fotos");
        let dist = dir.path().join("dist");
        write_cover(&covers.join("b1.png"), 1200, 1600);

        let summary =
            generate_variants(&covers, &dist, &CoverConfig::default(), &RasterCodec).unwrap();

        assert_eq!(summary.files_written, 4);
        let record = summary.table.get("fotos/b1").unwrap();
        assert_eq!(record.webp_small.as_deref(), Some("fotos/b1-480w.webp"));
        assert_eq!(record.webp_large.as_deref(), Some("fotos/b1-900w.webp"));
        assert_eq!(record.jpeg_small.as_deref(), Some("fotos/b1-480w.jpg"));
        assert_eq!(record.jpeg_large.as_deref(), Some("fotos/b1-900w.jpg"));

        assert_eq!(width_of(&dist.join("fotos/b1-480w.jpg")), 480);
        assert_eq!(width_of(&dist.join("fotos/b1-900w.jpg")), 900);
        assert_eq!(width_of(&dist.join("fotos/b1-480w.webp")), 480);
        assert_eq!(width_of(&dist.join("fotos/b1-900w.webp")), 900);
    }

    #[test]
    fn test_generate_variants_does_not_upscale_narrow_covers() {
        let dir = TempDir::new().unwrap();
        let covers = dir.path().join("fotos");
        let dist = dir.path().join("dist");
        write_cover(&covers.join("tiny.png"), 300, 400);

        generate_variants(&covers, &dist, &CoverConfig::default(), &RasterCodec).unwrap();

        assert_eq!(width_of(&dist.join("fotos/tiny-480w.jpg")), 300);
        assert_eq!(width_of(&dist.join("fotos/tiny-900w.webp")), 300);
    }

    #[test]
    fn test_generate_variants_keeps_subdirectories() {
        let dir = TempDir::new().unwrap();
        let covers = dir.path().join("fotos");
        let dist = dir.path().join("dist");
        write_cover(&covers.join("poesia/b2.png"), 600, 800);

        let summary =
            generate_variants(&covers, &dist, &CoverConfig::default(), &RasterCodec).unwrap();

        let record = summary.table.get("fotos/poesia/b2").unwrap();
        assert_eq!(record.webp_small.as_deref(), Some("fotos/poesia/b2-480w.webp"));
        assert!(dist.join("fotos/poesia/b2-900w.jpg").exists());
    }

    #[test]
    fn test_generate_variants_ignores_non_images() {
        let dir = TempDir::new().unwrap();
        let covers = dir.path().join("fotos");
        fs::create_dir_all(&covers).unwrap();
        fs::write(covers.join("README.txt"), "not a cover").unwrap();

        let summary = generate_variants(
            &covers,
            &dir.path().join("dist"),
            &CoverConfig::default(),
            &RasterCodec,
        )
        .unwrap();
        assert!(summary.table.is_empty());
    }

    #[test]
    fn test_missing_cover_dir_is_empty_table() {
        let dir = TempDir::new().unwrap();
        let summary = generate_variants(
            &dir.path().join("absent"),
            &dir.path().join("dist"),
            &CoverConfig::default(),
            &RasterCodec,
        )
        .unwrap();
        assert!(summary.table.is_empty());
        assert_eq!(summary.files_written, 0);
    }

    #[test]
    fn test_oversized_webp_rendition_is_an_error() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 17000, Rgb([10, 20, 30])));
        let result = RasterCodec.encode(&image, 480, VariantFormat::WebP, 82);
        assert!(result.is_err());
    }

    #[test]
    fn test_too_tall_cover_fails_the_stage_with_its_path() {
        let dir = TempDir::new().unwrap();
        let covers = dir.path().join("fotos");
        write_cover(&covers.join("tira.png"), 20, 17000);

        let error = generate_variants(
            &covers,
            &dir.path().join("dist"),
            &CoverConfig::default(),
            &RasterCodec,
        )
        .unwrap_err();
        match error {
            QuireError::ImageProcessing { path, message } => {
                assert!(path.ends_with("tira.png"));
                assert!(message.contains("WebP"));
            }
            other => panic!("expected ImageProcessing, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_cover_fails_the_stage() {
        let dir = TempDir::new().unwrap();
        let covers = dir.path().join("fotos");
        write_cover(&covers.join("good.png"), 500, 500);
        fs::write(covers.join("broken.jpg"), b"definitely not a jpeg").unwrap();

        let error = generate_variants(
            &covers,
            &dir.path().join("dist"),
            &CoverConfig::default(),
            &RasterCodec,
        )
        .unwrap_err();
        match error {
            QuireError::ImageProcessing { path, .. } => assert!(path.ends_with("broken.jpg")),
            other => panic!("expected ImageProcessing, got {other:?}"),
        }
    }
}
