//! Unique key derivation.
//!
//! A unique key names one rendered variant of one source image. The same
//! string is used as the cache-set member, the storage path of the
//! generated blob, and the scope of the generation lock.
//!
//! ## Canonical serialization
//!
//! The digest input is the plain concatenation (no separators) of these
//! components, in this order:
//!
//! | # | Component | Example |
//! |---|-----------|---------|
//! | 1 | source path | `photos/cat.png` |
//! | 2 | output format name | `JPEG` |
//! | 3 | quality, JPEG only | `80` or empty |
//! | 4 | width | `100` or `auto` |
//! | 5 | height | `50` or `auto` |
//! | 6 | fill marker | `fill` or empty |
//! | 7 | fill flag | `fill` or `no-fill` |
//! | 8 | upscale flag | `upscale` or `no-upscale` |
//! | 9 | background color | `ff00cc` or empty |
//!
//! The order is fixed. Changing it (or the string forms) re-keys every
//! artifact ever generated, so existing storage would be orphaned.
//!
//! The key itself is `<target_directory>/<hex digest>.<ext>`.

use crate::request::TransformRequest;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fmt;
use std::str::FromStr;

/// Default directory (storage prefix) for generated images.
pub const DEFAULT_TARGET_DIRECTORY: &str = "resized-images";

/// Digest used to name generated images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMethod {
    #[default]
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashMethod {
    pub fn name(self) -> &'static str {
        match self {
            HashMethod::Sha1 => "sha1",
            HashMethod::Sha224 => "sha224",
            HashMethod::Sha256 => "sha256",
            HashMethod::Sha384 => "sha384",
            HashMethod::Sha512 => "sha512",
        }
    }

    /// Hex digest of `data`.
    pub fn hex_digest(self, data: &[u8]) -> String {
        match self {
            HashMethod::Sha1 => hex::<sha1::Sha1>(data),
            HashMethod::Sha224 => hex::<sha2::Sha224>(data),
            HashMethod::Sha256 => hex::<sha2::Sha256>(data),
            HashMethod::Sha384 => hex::<sha2::Sha384>(data),
            HashMethod::Sha512 => hex::<sha2::Sha512>(data),
        }
    }
}

fn marker(on: bool, yes: &str, no: &str) -> String {
    if on { yes.to_string() } else { no.to_string() }
}

fn hex<D: Digest>(data: &[u8]) -> String {
    D::digest(data).iter().map(|b| format!("{b:02x}")).collect()
}

impl FromStr for HashMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashMethod::Sha1),
            "sha224" => Ok(HashMethod::Sha224),
            "sha256" => Ok(HashMethod::Sha256),
            "sha384" => Ok(HashMethod::Sha384),
            "sha512" => Ok(HashMethod::Sha512),
            other => Err(format!("unknown hash method `{other}`")),
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The canonical storage path of a generated image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueKey(String);

impl UniqueKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UniqueKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The ordered key components for `request`. See the
/// [module docs](self) for the table.
pub fn unique_key_args(request: &TransformRequest) -> [String; 9] {
    let is_jpeg = request.format == crate::params::OutputFormat::Jpeg;
    let side = |v: Option<u32>| v.map_or_else(|| "auto".to_string(), |n| n.to_string());
    [
        request.source_path.clone(),
        request.format.name().to_string(),
        marker(is_jpeg, &request.quality.to_string(), ""),
        side(request.width),
        side(request.height),
        marker(request.fill, "fill", ""),
        marker(request.fill, "fill", "no-fill"),
        marker(request.upscale, "upscale", "no-upscale"),
        request.bgcolor.map(|c| c.to_hex()).unwrap_or_default(),
    ]
}

/// Derive the unique key for `request`. Pure: no I/O, same input, same key.
pub fn derive_unique_key(
    request: &TransformRequest,
    hash_method: HashMethod,
    target_directory: &str,
) -> UniqueKey {
    let serialized = unique_key_args(request).concat();
    let name = hash_method.hex_digest(serialized.as_bytes());
    UniqueKey(format!(
        "{}/{}.{}",
        target_directory,
        name,
        request.format.extension()
    ))
}
