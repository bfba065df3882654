//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the resize coordination layer (which owns the
//! [`TransformRequest`]) and the [`backend`](super::backend) (which does the
//! actual pixel work). This separation allows swapping backends (e.g. for
//! testing with a mock) without changing coordination logic.
//!
//! ## Types
//!
//! - [`TransformParams`]: fit box, upscale flag and optional fill canvas.
//! - [`Canvas`]: exact output size plus the matte color padding is filled with.
//! - [`EncodeParams`]: output format, JPEG quality/progressive, flatten color.

use crate::params::{Color, OutputFormat, Quality};
use crate::request::TransformRequest;

/// Exact-size canvas a fitted image is centered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    /// RGBA fill for the padding.
    pub matte: [u8; 4],
}

/// Geometry of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub upscale: bool,
    /// Set when filling: pad the fitted image to exactly this canvas.
    pub canvas: Option<Canvas>,
}

impl TransformParams {
    pub fn from_request(request: &TransformRequest) -> Self {
        let canvas = match (request.fill, request.width, request.height) {
            (true, Some(width), Some(height)) => Some(Canvas {
                width,
                height,
                matte: matte_color(request),
            }),
            _ => None,
        };
        Self {
            width: request.width,
            height: request.height,
            upscale: request.upscale,
            canvas,
        }
    }
}

/// Padding color: the explicit background, else opaque white for formats
/// without alpha, else fully transparent.
fn matte_color(request: &TransformRequest) -> [u8; 4] {
    match request.bgcolor {
        Some(color) => color.to_rgba(),
        None if request.format.supports_alpha() => [0, 0, 0, 0],
        None => Color::WHITE.to_rgba(),
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Quality,
    pub progressive: bool,
    /// Flatten any transparency onto this color before encoding.
    pub background: Option<Color>,
}

impl EncodeParams {
    pub fn from_request(request: &TransformRequest) -> Self {
        let background = match request.bgcolor {
            Some(color) => Some(color),
            None if request.format.supports_alpha() => None,
            None => Some(Color::WHITE),
        };
        Self {
            format: request.format,
            quality: request.quality,
            progressive: request.progressive,
            background,
        }
    }
}
