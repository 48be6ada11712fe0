use std::cell::RefCell;

use crate::error::RasterError;
use crate::types::map::MapCanvas;

thread_local! {
    static FONT_DB: RefCell<usvg::fontdb::Database> = RefCell::new(load_font_db());
}

pub fn rasterize(svg: &str, canvas: &MapCanvas) -> Result<Vec<u8>, RasterError> {
    FONT_DB.with(|fontdb| {
        let fontdb = fontdb.borrow();
        rasterize_with_fontdb(svg, canvas, &fontdb)
    })
}

fn load_font_db() -> usvg::fontdb::Database {
    let mut fontdb = usvg::fontdb::Database::new();
    // Captions render in slim containers too, where system fonts may be missing.
    for path in [
        "./assets/fonts/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    ] {
        if fontdb.load_font_file(path).is_ok() {
            tracing::debug!("Loaded font {}", path);
        }
    }
    fontdb.load_system_fonts();
    fontdb
}

fn rasterize_with_fontdb(
    svg: &str,
    canvas: &MapCanvas,
    fontdb: &usvg::fontdb::Database,
) -> Result<Vec<u8>, RasterError> {
    let options = usvg::Options::default();
    let tree = usvg::Tree::from_str(svg, &options, fontdb)
        .map_err(|e| RasterError::RenderFailed(format!("Failed to parse SVG: {}", e)))?;

    let mut pixmap = tiny_skia::Pixmap::new(canvas.width, canvas.height)
        .ok_or_else(|| RasterError::RenderFailed("Failed to create pixmap".to_string()))?;

    if let Some((r, g, b, a)) = canvas.background {
        pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, a));
    }

    let transform = tiny_skia::Transform::from_scale(
        canvas.width as f32 / tree.size().width(),
        canvas.height as f32 / tree.size().height(),
    );

    resvg::render(&tree, transform, &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| RasterError::RenderFailed(format!("Failed to encode PNG: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn rasterizes_simple_svg() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20" viewBox="0 0 40 20"><circle cx="10" cy="10" r="5" fill="#FF3366"/></svg>"##;
        let png = rasterize(
            svg,
            &MapCanvas {
                width: 40,
                height: 20,
                background: Some((255, 255, 255, 255)),
            },
        )
        .expect("png");
        assert_eq!(&png[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn broken_svg_is_an_error() {
        let result = rasterize(
            "<svg",
            &MapCanvas {
                width: 10,
                height: 10,
                background: None,
            },
        );
        assert!(matches!(result, Err(RasterError::RenderFailed(_))));
    }
}
