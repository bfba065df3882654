//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations every backend must
//! support: decode, transform, encode, and placeholder.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate with statically linked codecs.

use super::params::{EncodeParams, TransformParams};
use crate::params::SourceFormat;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("SVG input requires the `svg` feature")]
    SvgRendererUnavailable,
    #[error("Specify at least one of width or height for a placeholder")]
    MissingDimensions,
}

/// Decoded pixels plus the color profile they came with.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    /// ICC profile of the source, re-embedded on encode.
    pub icc_profile: Option<Vec<u8>>,
}

impl DecodedImage {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            icc_profile: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Trait for image processing backends.
///
/// `Send + Sync` so one backend can be shared by every resize running on a
/// rayon pool.
pub trait ImageBackend: Send + Sync {
    /// Decode source bytes. `format` is a hint taken from the path; raster
    /// formats are sniffed from the content.
    fn decode(&self, data: &[u8], format: &SourceFormat) -> Result<DecodedImage, BackendError>;

    /// Fit (and optionally pad) the image.
    fn transform(
        &self,
        image: DecodedImage,
        params: &TransformParams,
    ) -> Result<DecodedImage, BackendError>;

    /// Encode the image into the output format.
    fn encode(&self, image: &DecodedImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError>;

    /// Synthesize a `width` x `height` stand-in carrying `text`.
    fn placeholder(&self, width: u32, height: u32, text: &str)
    -> Result<DecodedImage, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::calculations::fit_within;
    use std::sync::Mutex;

    /// Mock backend that records operations without touching real codecs.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    ///
    /// Decoding yields a blank image of `source_dimensions`; encoding yields
    /// `"<FORMAT> <w>x<h>"` as bytes.
    pub struct MockBackend {
        pub source_dimensions: (u32, u32),
        pub fail_encode: bool,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode {
            len: usize,
            format: SourceFormat,
        },
        Transform {
            width: Option<u32>,
            height: Option<u32>,
            fill: bool,
        },
        Encode {
            format: &'static str,
            quality: u8,
            width: u32,
            height: u32,
        },
        Placeholder {
            width: u32,
            height: u32,
            text: String,
        },
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::with_source_dimensions(200, 100)
        }
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_source_dimensions(width: u32, height: u32) -> Self {
            Self {
                source_dimensions: (width, height),
                fail_encode: false,
                operations: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_encode() -> Self {
            Self {
                fail_encode: true,
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        fn record(&self, op: RecordedOp) {
            self.operations.lock().unwrap().push(op);
        }
    }

    impl ImageBackend for MockBackend {
        fn decode(
            &self,
            data: &[u8],
            format: &SourceFormat,
        ) -> Result<DecodedImage, BackendError> {
            self.record(RecordedOp::Decode {
                len: data.len(),
                format: format.clone(),
            });
            let (w, h) = self.source_dimensions;
            Ok(DecodedImage::new(DynamicImage::new_rgba8(w, h)))
        }

        fn transform(
            &self,
            image: DecodedImage,
            params: &TransformParams,
        ) -> Result<DecodedImage, BackendError> {
            self.record(RecordedOp::Transform {
                width: params.width,
                height: params.height,
                fill: params.canvas.is_some(),
            });
            let (w, h) = match params.canvas {
                Some(canvas) => (canvas.width, canvas.height),
                None => fit_within(
                    (image.width(), image.height()),
                    params.width,
                    params.height,
                    params.upscale,
                ),
            };
            Ok(DecodedImage::new(DynamicImage::new_rgba8(w, h)))
        }

        fn encode(
            &self,
            image: &DecodedImage,
            params: &EncodeParams,
        ) -> Result<Vec<u8>, BackendError> {
            self.record(RecordedOp::Encode {
                format: params.format.name(),
                quality: params.quality.value(),
                width: image.width(),
                height: image.height(),
            });
            if self.fail_encode {
                return Err(BackendError::ProcessingFailed("mock encode failure".into()));
            }
            Ok(format!("{} {}x{}", params.format.name(), image.width(), image.height()).into_bytes())
        }

        fn placeholder(
            &self,
            width: u32,
            height: u32,
            text: &str,
        ) -> Result<DecodedImage, BackendError> {
            self.record(RecordedOp::Placeholder {
                width,
                height,
                text: text.to_string(),
            });
            Ok(DecodedImage::new(DynamicImage::new_rgb8(width, height)))
        }
    }

    #[test]
    fn mock_records_decode_and_transform() {
        let backend = MockBackend::with_source_dimensions(800, 600);
        let decoded = backend.decode(b"abc", &SourceFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 600));

        let params = TransformParams {
            width: Some(400),
            height: None,
            upscale: true,
            canvas: None,
        };
        let resized = backend.transform(decoded, &params).unwrap();
        assert_eq!((resized.width(), resized.height()), (400, 300));

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], RecordedOp::Decode { len: 3, .. }));
        assert!(matches!(
            &ops[1],
            RecordedOp::Transform {
                width: Some(400),
                fill: false,
                ..
            }
        ));
    }

    #[test]
    fn mock_encode_failure() {
        use crate::params::{OutputFormat, Quality};

        let backend = MockBackend::failing_encode();
        let image = DecodedImage::new(DynamicImage::new_rgb8(1, 1));
        let params = EncodeParams {
            format: OutputFormat::Png,
            quality: Quality::default(),
            progressive: false,
            background: None,
        };
        assert!(backend.encode(&image, &params).is_err());
        assert_eq!(backend.get_operations().len(), 1);
    }
}
