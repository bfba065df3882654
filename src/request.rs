//! Transform requests: caller-facing options and their validated form.
//!
//! [`TransformOptions`] mirrors the public `resolve` call and carries the
//! defaults callers expect (quality 80, upscale and progressive on).
//! [`TransformRequest::new`] turns options plus a source path into an
//! immutable, validated request. Validation happens entirely up front so
//! that no storage or cache I/O is ever performed for a bad request.

use crate::params::{Color, Dimensions, OutputFormat, Quality, SourceFormat, ValidationError};

/// Options for a single resize call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Target size. `None` means "re-encode without resizing".
    pub dimensions: Option<Dimensions>,
    /// Output format override (`jpeg`, `jpg`, `png`). Defaults to the source
    /// extension; SVG sources default to PNG.
    pub format: Option<String>,
    /// JPEG quality (1-100). Ignored for PNG.
    pub quality: u32,
    /// Fill the exact requested box instead of fitting within it.
    pub fill: bool,
    /// Background color used as matte and to flatten transparency.
    pub bgcolor: Option<Color>,
    /// Allow output larger than the source.
    pub upscale: bool,
    /// Progressive JPEG encoding.
    pub progressive: bool,
    /// Synthesize a placeholder when the source is missing.
    pub placeholder: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            dimensions: None,
            format: None,
            quality: 80,
            fill: false,
            bgcolor: None,
            upscale: true,
            progressive: true,
            placeholder: false,
        }
    }
}

impl TransformOptions {
    /// Options resizing to `dimensions`, everything else default.
    pub fn sized(dimensions: Dimensions) -> Self {
        Self {
            dimensions: Some(dimensions),
            ..Self::default()
        }
    }
}

/// A validated request for one derivative of one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub source_path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: OutputFormat,
    pub quality: Quality,
    pub fill: bool,
    pub bgcolor: Option<Color>,
    pub upscale: bool,
    pub progressive: bool,
    pub use_placeholder: bool,
}

impl TransformRequest {
    pub fn new(
        source_path: impl Into<String>,
        options: &TransformOptions,
    ) -> Result<Self, ValidationError> {
        let source_path = source_path.into();
        if source_path.is_empty() && !options.placeholder {
            return Err(ValidationError::EmptyImagePath);
        }

        let format =
            OutputFormat::resolve(&source_path, options.format.as_deref(), options.placeholder)?;
        let quality = Quality::new(options.quality)?;
        let (width, height) = options
            .dimensions
            .map(|d| (d.width(), d.height()))
            .unwrap_or((None, None));

        if options.fill && (width.is_none() || height.is_none()) {
            return Err(ValidationError::FillRequiresDimensions);
        }

        Ok(Self {
            source_path,
            width,
            height,
            format,
            quality,
            fill: options.fill,
            bgcolor: options.bgcolor,
            upscale: options.upscale,
            progressive: options.progressive,
            use_placeholder: options.placeholder,
        })
    }

    /// Whether any resizing was requested.
    pub fn resizes(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }

    /// Format of the source, by extension. An empty path can only ever yield
    /// a placeholder, which is PNG.
    pub fn source_format(&self) -> SourceFormat {
        if self.source_path.is_empty() {
            SourceFormat::Png
        } else {
            SourceFormat::from_path(&self.source_path)
        }
    }
}
