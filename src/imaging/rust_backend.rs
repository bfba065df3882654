//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image` crate, format sniffed from content |
//! | Decode (SVG) | `resvg` (feature `svg`) |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Fill canvas | `image::imageops::overlay` onto a matte-colored canvas |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → JPEG | `jpeg_encoder::Encoder` (progressive, ICC) |

use super::backend::{BackendError, DecodedImage, ImageBackend};
use super::calculations::{blend_over, centered_offset, fit_within};
use super::params::{Canvas, EncodeParams, TransformParams};
use super::{PLACEHOLDER_BACKGROUND, PLACEHOLDER_TEXT_COLOR, PLACEHOLDER_TEXT_SIZE};
use crate::params::{Color, OutputFormat, Quality, SourceFormat};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageDecoder, ImageEncoder, ImageReader, Rgba, RgbaImage};
use std::borrow::Cow;
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a raster image, keeping its ICC profile.
fn decode_raster(data: &[u8]) -> Result<DecodedImage, BackendError> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    let mut decoder = reader.into_decoder()?;
    let icc_profile = decoder.icc_profile().ok().flatten();
    let image = DynamicImage::from_decoder(decoder)?;
    Ok(DecodedImage { image, icc_profile })
}

#[cfg(feature = "svg")]
fn decode_svg(data: &[u8]) -> Result<DecodedImage, BackendError> {
    Ok(DecodedImage::new(DynamicImage::ImageRgba8(
        super::svg::rasterize(data)?,
    )))
}

#[cfg(not(feature = "svg"))]
fn decode_svg(_data: &[u8]) -> Result<DecodedImage, BackendError> {
    Err(BackendError::SvgRendererUnavailable)
}

/// Center `image` on an exact-size canvas filled with the matte color.
fn pad_to_canvas(image: &DynamicImage, canvas: &Canvas) -> DynamicImage {
    let mut out = RgbaImage::from_pixel(canvas.width, canvas.height, Rgba(canvas.matte));
    let (x, y) = centered_offset(
        (canvas.width, canvas.height),
        (image.width(), image.height()),
    );
    imageops::overlay(&mut out, &image.to_rgba8(), x, y);
    DynamicImage::ImageRgba8(out)
}

/// Composite any transparency onto an opaque background.
fn flatten(image: &DynamicImage, background: Color) -> DynamicImage {
    let bg = [background.r, background.g, background.b];
    let rgba = image.to_rgba8();
    let flat = image::RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        image::Rgb(blend_over(rgba.get_pixel(x, y).0, bg))
    });
    DynamicImage::ImageRgb8(flat)
}

/// Reduce float images to 8-bit; the PNG encoder rejects float samples.
fn png_compatible(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image.color() {
        ColorType::Rgb32F => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        ColorType::Rgba32F => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        _ => Cow::Borrowed(image),
    }
}

fn encode_png(image: &DynamicImage, icc_profile: Option<&[u8]>) -> Result<Vec<u8>, BackendError> {
    let image = png_compatible(image);
    let mut buf = Vec::new();
    let mut encoder = PngEncoder::new(&mut buf);
    if let Some(icc) = icc_profile
        && let Err(e) = encoder.set_icc_profile(icc.to_vec())
    {
        tracing::debug!(error = %e, "PNG encoder refused ICC profile");
    }
    image.write_with_encoder(encoder)?;
    Ok(buf)
}

fn encode_jpeg(
    image: &DynamicImage,
    quality: Quality,
    progressive: bool,
    icc_profile: Option<&[u8]>,
) -> Result<Vec<u8>, BackendError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let too_large = || {
        BackendError::ProcessingFailed(format!("{width}x{height} exceeds the JPEG size limit"))
    };
    let w = u16::try_from(width).map_err(|_| too_large())?;
    let h = u16::try_from(height).map_err(|_| too_large())?;

    let mut buf = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut buf, quality.value());
    encoder.set_progressive(progressive);
    if let Some(icc) = icc_profile {
        encoder
            .add_icc_profile(icc)
            .map_err(|e| BackendError::ProcessingFailed(format!("JPEG ICC profile: {e}")))?;
    }
    encoder
        .encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn decode(&self, data: &[u8], format: &SourceFormat) -> Result<DecodedImage, BackendError> {
        match format {
            SourceFormat::Svg => decode_svg(data),
            _ => decode_raster(data),
        }
    }

    fn transform(
        &self,
        decoded: DecodedImage,
        params: &TransformParams,
    ) -> Result<DecodedImage, BackendError> {
        let DecodedImage { image, icc_profile } = decoded;
        let (src_w, src_h) = (image.width(), image.height());
        let (w, h) = fit_within((src_w, src_h), params.width, params.height, params.upscale);

        let resized = if (w, h) == (src_w, src_h) {
            image
        } else {
            image.resize_exact(w, h, FilterType::Lanczos3)
        };

        let image = match &params.canvas {
            Some(canvas) => pad_to_canvas(&resized, canvas),
            None => resized,
        };
        Ok(DecodedImage { image, icc_profile })
    }

    fn encode(&self, decoded: &DecodedImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
        let flattened;
        let image = match params.background {
            Some(bg) if decoded.image.color().has_alpha() => {
                flattened = flatten(&decoded.image, bg);
                &flattened
            }
            _ => &decoded.image,
        };
        let icc = decoded.icc_profile.as_deref();

        match params.format {
            OutputFormat::Png => encode_png(image, icc),
            OutputFormat::Jpeg => encode_jpeg(image, params.quality, params.progressive, icc),
        }
    }

    fn placeholder(
        &self,
        width: u32,
        height: u32,
        text: &str,
    ) -> Result<DecodedImage, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::MissingDimensions);
        }
        let [r, g, b] = PLACEHOLDER_BACKGROUND;
        #[allow(unused_mut)]
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));

        #[cfg(feature = "svg")]
        {
            let layer = super::svg::text_layer(
                width,
                height,
                text,
                PLACEHOLDER_TEXT_SIZE,
                PLACEHOLDER_TEXT_COLOR,
            )?;
            imageops::overlay(&mut canvas, &layer, 0, 0);
        }
        #[cfg(not(feature = "svg"))]
        {
            let _ = (text, PLACEHOLDER_TEXT_SIZE, PLACEHOLDER_TEXT_COLOR);
            tracing::debug!("placeholder text needs the `svg` feature; drawing background only");
        }

        Ok(DecodedImage::new(DynamicImage::ImageRgb8(
            DynamicImage::ImageRgba8(canvas).to_rgb8(),
        )))
    }
}
