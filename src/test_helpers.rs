//! Shared test utilities for the resize-cache test suite.
//!
//! Provides in-memory image fixtures, a storage wrapper that counts calls,
//! and resizer builders wired to the mock image backend.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let storage = Arc::new(MemoryStorage::new());
//! storage.save("a.png", &make_png_bytes(40, 20)).unwrap();
//! let resizer = real_resizer(storage, Arc::new(MemoryCache::new()));
//! let url = resizer.resolve("a.png", &TransformOptions::default()).unwrap();
//! ```

use crate::cache::Cache;
use crate::imaging::RustBackend;
use crate::imaging::backend::tests::MockBackend;
use crate::resizing::{Resizer, ResizerSettings};
use crate::storage::{MemoryStorage, Storage, StorageError};
use image::{ImageEncoder, RgbImage, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =========================================================================
// Image fixtures
// =========================================================================

/// Opaque RGB gradient PNG.
pub fn make_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// RGBA PNG where every pixel is `pixel`.
pub fn make_rgba_png_bytes(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba(pixel));
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

/// Small valid JPEG with the given dimensions.
pub fn make_test_jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    image::codecs::jpeg::JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf.into_inner()
}

pub fn decode_png_rgba(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .unwrap()
        .to_rgba8()
}

/// Top-left pixel.
pub fn corner_pixel(img: &RgbaImage) -> [u8; 4] {
    img.get_pixel(0, 0).0
}

// =========================================================================
// Backends
// =========================================================================

/// Memory storage that counts every call made to it.
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    calls: AtomicUsize,
    saves: AtomicUsize,
}

impl CountingStorage {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Storage for CountingStorage {
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.tick();
        self.inner.exists(key)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.tick();
        self.inner.get(key)
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.tick();
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(key, data)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.tick();
        self.inner.delete(key)
    }

    fn list_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.tick();
        self.inner.list_tree(prefix)
    }

    fn delete_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.tick();
        self.inner.delete_tree(prefix)
    }
}

/// Resizer over the given backends and the mock image backend.
pub fn mock_resizer(
    storage: Arc<dyn Storage>,
    cache: Arc<dyn Cache>,
    settings: ResizerSettings,
) -> Resizer {
    Resizer::new(storage, cache, Arc::new(MockBackend::new()), settings)
}

/// Resizer over the given backends and the real image backend, default
/// settings.
pub fn real_resizer(storage: Arc<dyn Storage>, cache: Arc<dyn Cache>) -> Resizer {
    Resizer::new(
        storage,
        cache,
        Arc::new(RustBackend::new()),
        ResizerSettings::default(),
    )
}
