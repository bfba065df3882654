//! Request-level value types and their parsers.
//!
//! Everything here is pure: parsing never touches storage or the cache, so a
//! malformed request is rejected before any I/O happens.
//!
//! ## Types
//!
//! - [`Dimensions`]: requested width and/or height. Parsed from `"WxH"`,
//!   `"W"`, `"Wx"`, `"xH"` or an ordered pair.
//! - [`Color`]: background/matte color. Parsed from 3- or 6-digit hex with
//!   or without `#`, or an RGB triple. Always serialized as lowercase
//!   6-digit hex without the `#`.
//! - [`OutputFormat`]: the formats that can be generated (JPEG, PNG).
//! - [`SourceFormat`]: what the source file claims to be, by extension.
//! - [`Quality`]: JPEG encoding quality (1–100, default 80).

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty image path")]
    EmptyImagePath,
    #[error("Missing dimensions: {0}")]
    MissingDimensions(String),
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("Fill requires both width and height to be set")]
    FillRequiresDimensions,
    #[error("Invalid color: {0}")]
    InvalidColor(String),
    #[error("Unsupported image format `{0}`: JPEG and PNG are the only supported output formats")]
    UnsupportedFormat(String),
    #[error("Quality must be between 1 and 100, got {0}")]
    InvalidQuality(u32),
}

/// Requested output size. At least one side is always set, and a set side
/// is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    width: Option<u32>,
    height: Option<u32>,
}

impl Dimensions {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Result<Self, ValidationError> {
        let dims = Self { width, height };
        if width.is_none() && height.is_none() {
            return Err(ValidationError::MissingDimensions(dims.to_string()));
        }
        if width == Some(0) || height == Some(0) {
            return Err(ValidationError::InvalidDimensions(dims.to_string()));
        }
        Ok(dims)
    }

    /// Build from a sequence of components. Fewer than two components or
    /// all-empty is missing; more than two is invalid.
    pub fn from_components(components: &[Option<u32>]) -> Result<Self, ValidationError> {
        let describe = || format!("{components:?}");
        if components.iter().all(Option::is_none) || components.len() < 2 {
            return Err(ValidationError::MissingDimensions(describe()));
        }
        if components.len() > 2 {
            return Err(ValidationError::InvalidDimensions(describe()));
        }
        Self::new(components[0], components[1])
    }

    pub fn width(&self) -> Option<u32> {
        self.width
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn both(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

fn parse_dimension_component(raw: &str, whole: &str) -> Result<Option<u32>, ValidationError> {
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<u32>() {
        Ok(v) if v > 0 => Ok(Some(v)),
        _ => Err(ValidationError::InvalidDimensions(whole.to_string())),
    }
}

impl FromStr for Dimensions {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('x').collect();
        let mut components = Vec::with_capacity(parts.len().max(2));
        for part in &parts {
            components.push(parse_dimension_component(part, s)?);
        }
        // "100" means width only
        if components.len() == 1 {
            components.push(None);
        }
        Self::from_components(&components)
    }
}

impl TryFrom<(u32, u32)> for Dimensions {
    type Error = ValidationError;

    fn try_from((width, height): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(Some(width), Some(height))
    }
}

impl TryFrom<(Option<u32>, Option<u32>)> for Dimensions {
    type Error = ValidationError;

    fn try_from((width, height): (Option<u32>, Option<u32>)) -> Result<Self, Self::Error> {
        Self::new(width, height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();
        write!(f, "{}x{}", side(self.width), side(self.height))
    }
}

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Lowercase 6-digit hex without the leading `#`. This is the form that
    /// goes into unique keys.
    pub fn to_hex(self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

impl FromStr for Color {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidColor(s.to_string());
        let hex = s.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let full = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
            6 => hex.to_string(),
            _ => return Err(invalid()),
        };
        let channel = |i: usize| u8::from_str_radix(&full[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

/// Formats that can be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Canonical name, as used in unique keys.
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn supports_alpha(self) -> bool {
        matches!(self, OutputFormat::Png)
    }

    /// Resolve the output format for a source path.
    ///
    /// An explicit format wins, otherwise the source extension is used.
    /// SVG sources (or an explicit `svg`) produce PNG. When the path has no
    /// extension at all and placeholders are allowed, PNG is assumed since
    /// only a placeholder could ever be generated for it.
    pub fn resolve(
        source_path: &str,
        explicit: Option<&str>,
        placeholder_allowed: bool,
    ) -> Result<Self, ValidationError> {
        let raw = match explicit.map(str::trim).filter(|f| !f.is_empty()) {
            Some(f) => f.to_string(),
            None => file_extension(source_path).unwrap_or_default(),
        };
        if raw.is_empty() && placeholder_allowed {
            return Ok(OutputFormat::Png);
        }
        match raw.to_ascii_uppercase().as_str() {
            "JPEG" | "JPG" => Ok(OutputFormat::Jpeg),
            "PNG" | "SVG" => Ok(OutputFormat::Png),
            _ => Err(ValidationError::UnsupportedFormat(raw)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a source file is, judged by its extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Svg,
    /// Any other extension; decoding sniffs the content.
    Other(String),
    /// Empty path or no extension.
    Unknown,
}

impl SourceFormat {
    pub fn from_path(path: &str) -> Self {
        match file_extension(path) {
            None => SourceFormat::Unknown,
            Some(ext) => match ext.to_ascii_uppercase().as_str() {
                "JPG" | "JPEG" => SourceFormat::Jpeg,
                "PNG" => SourceFormat::Png,
                "SVG" => SourceFormat::Svg,
                other => SourceFormat::Other(other.to_string()),
            },
        }
    }
}

fn file_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_string)
}

/// JPEG encoding quality (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        match u8::try_from(value) {
            Ok(v) if (1..=100).contains(&v) => Ok(Self(v)),
            _ => Err(ValidationError::InvalidQuality(value)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
