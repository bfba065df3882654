//! Image processing: decode, fit/fill, flatten, encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** (JPEG, PNG, TIFF, WebP, GIF) | `image::ImageReader` with content sniffing |
//! | **Decode** (SVG) | `resvg` rasterization (feature `svg`) |
//! | **Resize** | `DynamicImage::resize_exact` with `Lanczos3` |
//! | **Fill canvas / flatten** | `imageops::overlay` onto a solid canvas |
//! | **Encode → PNG** | `image::codecs::png::PngEncoder` |
//! | **Encode → JPEG** | `jpeg-encoder` (baseline or progressive, ICC) |
//! | **Placeholder** | solid canvas + `resvg` text (feature `svg`) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing what to do to the pixels
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
pub mod calculations;
mod params;
pub mod rust_backend;
#[cfg(feature = "svg")]
mod svg;

pub use backend::{BackendError, DecodedImage, ImageBackend};
pub use params::{Canvas, EncodeParams, TransformParams};
pub use rust_backend::RustBackend;

/// Placeholder background, light grey.
pub const PLACEHOLDER_BACKGROUND: [u8; 3] = [220, 220, 220];
/// Placeholder text color, white.
pub const PLACEHOLDER_TEXT_COLOR: [u8; 3] = [255, 255, 255];
/// Placeholder text size in pixels.
pub const PLACEHOLDER_TEXT_SIZE: f32 = 36.0;
