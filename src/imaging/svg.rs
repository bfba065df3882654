//! SVG rasterization through resvg.
//!
//! Used for SVG sources and to draw placeholder text. System fonts are
//! loaded once and shared by every parse.

use super::backend::BackendError;
use image::RgbaImage;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg;
use std::sync::{Arc, LazyLock};

static FONTS: LazyLock<Arc<usvg::fontdb::Database>> = LazyLock::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    tracing::debug!(faces = db.len(), "loaded system fonts");
    Arc::new(db)
});

fn options() -> usvg::Options<'static> {
    usvg::Options {
        fontdb: Arc::clone(&FONTS),
        ..Default::default()
    }
}

fn parse(data: &[u8]) -> Result<usvg::Tree, BackendError> {
    usvg::Tree::from_data(data, &options())
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to parse SVG: {e}")))
}

/// Render `tree` into a straight-alpha RGBA buffer.
fn render(tree: &usvg::Tree, width: u32, height: u32) -> Result<RgbaImage, BackendError> {
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        BackendError::ProcessingFailed(format!("Failed to allocate {width}x{height} pixmap"))
    })?;
    resvg::render(tree, Transform::default(), &mut pixmap.as_mut());

    let mut data = pixmap.take();
    demultiply(&mut data);
    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| BackendError::ProcessingFailed("SVG raster size mismatch".into()))
}

/// tiny-skia stores premultiplied alpha; `image` expects straight alpha.
fn demultiply(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

/// Rasterize an SVG document at its intrinsic size.
pub fn rasterize(data: &[u8]) -> Result<RgbaImage, BackendError> {
    let tree = parse(data)?;
    let size = tree.size().to_int_size();
    render(&tree, size.width(), size.height())
}

/// Render `text` centered on a transparent `width` x `height` layer.
pub fn text_layer(
    width: u32,
    height: u32,
    text: &str,
    size: f32,
    color: [u8; 3],
) -> Result<RgbaImage, BackendError> {
    let document = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}">"#,
            r##"<text x="{cx}" y="{cy}" font-family="sans-serif" font-size="{size}" "##,
            r##"fill="#{r:02x}{g:02x}{b:02x}" text-anchor="middle" dominant-baseline="central">"##,
            "{text}</text></svg>"
        ),
        w = width,
        h = height,
        cx = width as f32 / 2.0,
        cy = height as f32 / 2.0,
        size = size,
        r = color[0],
        g = color[1],
        b = color[2],
        text = escape(text),
    );
    let tree = parse(document.as_bytes())?;
    render(&tree, width, height)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
