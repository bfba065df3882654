//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the size of `source` fitted within the requested box.
///
/// With both sides given the image is scaled by the smaller of the two
/// ratios, so it fits entirely within `width` x `height`. With one side the
/// image is scaled to match that side. Aspect ratio is always preserved.
///
/// When `upscale` is false the source size is returned unchanged unless the
/// fitted size is strictly smaller on both axes.
///
/// # Examples
/// ```
/// # use resize_cache::imaging::calculations::fit_within;
/// assert_eq!(fit_within((1000, 500), Some(100), Some(100), true), (100, 50));
/// assert_eq!(fit_within((1000, 500), None, Some(100), true), (200, 100));
/// assert_eq!(fit_within((50, 50), Some(100), None, false), (50, 50));
/// ```
pub fn fit_within(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    upscale: bool,
) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return source;
    }

    let ratio = match (width, height) {
        (Some(w), Some(h)) => (w as f64 / src_w as f64).min(h as f64 / src_h as f64),
        (Some(w), None) => w as f64 / src_w as f64,
        (None, Some(h)) => h as f64 / src_h as f64,
        (None, None) => return source,
    };

    let new_w = ((src_w as f64 * ratio).round() as u32).max(1);
    let new_h = ((src_h as f64 * ratio).round() as u32).max(1);

    if !upscale && !(new_w < src_w && new_h < src_h) {
        return source;
    }
    (new_w, new_h)
}

/// Offset that centers an `inner` image on an `outer` canvas.
///
/// Negative when the inner image is larger; the overflow is clipped evenly.
pub fn centered_offset(outer: (u32, u32), inner: (u32, u32)) -> (i64, i64) {
    (
        (outer.0 as i64 - inner.0 as i64) / 2,
        (outer.1 as i64 - inner.1 as i64) / 2,
    )
}

/// Size of a placeholder for the requested sides. A missing side copies the
/// present one, making the placeholder square. `None` when neither is set.
pub fn placeholder_dimensions(width: Option<u32>, height: Option<u32>) -> Option<(u32, u32)> {
    match (width, height) {
        (Some(w), Some(h)) => Some((w, h)),
        (Some(w), None) => Some((w, w)),
        (None, Some(h)) => Some((h, h)),
        (None, None) => None,
    }
}

/// Alpha-composite one straight-alpha RGBA pixel over an opaque background.
pub fn blend_over(pixel: [u8; 4], background: [u8; 3]) -> [u8; 3] {
    let alpha = pixel[3] as u32;
    let mut out = [0u8; 3];
    for i in 0..3 {
        let fg = pixel[i] as u32 * alpha;
        let bg = background[i] as u32 * (255 - alpha);
        out[i] = ((fg + bg + 127) / 255) as u8;
    }
    out
}
