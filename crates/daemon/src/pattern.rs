//! Pattern generator for tiled watermark overlays.
//!
//! An [`Overlay`] is a vector description of the watermark: a regular grid
//! of tile anchors, each carrying the same rotated, semi-transparent text.
//! The grid extends `padding_tiles` beyond the visible edge on the right and
//! bottom so rotation never leaves a corner bare.
//!
//! Rasterisation lives in [`crate::render`]; this module is pure geometry.

use tilemark_config::{parse_hex_color, Rgb, WatermarkConfig};
use thiserror::Error;

/// Errors raised when the caller contract of [`Overlay::generate`] is broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Overlay canvas must be non-empty, got {width}x{height}")]
    EmptyCanvas { width: u32, height: u32 },

    #[error("Watermark text must not be empty")]
    EmptyText,
}

/// Geometry and appearance of the tiled pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkStyle {
    pub tile_size: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub padding_tiles: u32,
    /// SVG convention: negative values rotate counter-clockwise on screen.
    pub rotation_degrees: f32,
    pub opacity: f32,
    pub font_size: f32,
    pub color: Rgb,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            tile_size: 200,
            offset_x: 20,
            offset_y: 50,
            padding_tiles: 2,
            rotation_degrees: -45.0,
            opacity: 0.15,
            font_size: 28.0,
            color: Rgb::BLACK,
        }
    }
}

impl WatermarkStyle {
    /// Build the style from the `[watermark]` config section.
    ///
    /// The config is expected to be validated; an unparseable color falls back
    /// to black.
    pub fn from_config(config: &WatermarkConfig) -> Self {
        Self {
            tile_size: config.tile_size.max(1),
            offset_x: config.offset_x,
            offset_y: config.offset_y,
            padding_tiles: config.padding_tiles,
            rotation_degrees: config.rotation_degrees,
            opacity: config.opacity.clamp(0.0, 1.0),
            font_size: config.font_size,
            color: parse_hex_color(&config.color).unwrap_or(Rgb::BLACK),
        }
    }
}

/// One repeated unit of the pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub row: u32,
    pub col: u32,
    /// Text anchor: horizontal centre of the text, on its baseline. Also the
    /// rotation pivot.
    pub x: i64,
    pub y: i64,
}

/// Full-canvas description of the watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub width: u32,
    pub height: u32,
    pub text: String,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub tiles: Vec<Tile>,
    pub style: WatermarkStyle,
}

/// Number of tiles along one axis: `ceil(extent / tile_size) + padding`.
pub fn tile_count(extent: u32, tile_size: u32, padding: u32) -> u32 {
    extent.div_ceil(tile_size.max(1)).saturating_add(padding)
}

impl Overlay {
    /// Generate the tile grid for a `width` x `height` canvas.
    ///
    /// Tiles are emitted row-major; tile `(row, col)` is anchored at
    /// `(col * tile_size + offset_x, row * tile_size + offset_y)`.
    pub fn generate(
        width: u32,
        height: u32,
        text: &str,
        style: &WatermarkStyle,
    ) -> Result<Self, PatternError> {
        if width == 0 || height == 0 {
            return Err(PatternError::EmptyCanvas { width, height });
        }
        if text.is_empty() {
            return Err(PatternError::EmptyText);
        }

        let tile = i64::from(style.tile_size.max(1));
        let tiles_x = tile_count(width, style.tile_size, style.padding_tiles);
        let tiles_y = tile_count(height, style.tile_size, style.padding_tiles);

        let mut tiles = Vec::with_capacity(tiles_x as usize * tiles_y as usize);
        for row in 0..tiles_y {
            for col in 0..tiles_x {
                tiles.push(Tile {
                    row,
                    col,
                    x: i64::from(col) * tile + i64::from(style.offset_x),
                    y: i64::from(row) * tile + i64::from(style.offset_y),
                });
            }
        }

        Ok(Self {
            width,
            height,
            text: text.to_string(),
            tiles_x,
            tiles_y,
            tiles,
            style: style.clone(),
        })
    }

    /// Serialise the description as an SVG document.
    ///
    /// Mirrors what the rasteriser draws, which makes the geometry easy to
    /// inspect in a browser.
    pub fn to_svg(&self) -> String {
        let text = escape_xml(&self.text);
        let Rgb { r, g, b } = self.style.color;
        let mut svg = format!(
            r#"<svg width="{}" height="{}" xmlns="http://www.w3.org/2000/svg">"#,
            self.width, self.height
        );

        for tile in &self.tiles {
            svg.push_str(&format!(
                r##"<g opacity="{}" transform="rotate({} {} {})"><text x="{}" y="{}" font-size="{}" fill="#{:02x}{:02x}{:02x}" font-family="DejaVu Sans, Arial, sans-serif" font-weight="bold" text-anchor="middle">{}</text></g>"##,
                self.style.opacity,
                self.style.rotation_degrees,
                tile.x,
                tile.y,
                tile.x,
                tile.y,
                self.style.font_size,
                r,
                g,
                b,
                text
            ));
        }

        svg.push_str("</svg>");
        svg
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tile_grid_for_512_square() {
        let overlay = Overlay::generate(512, 512, "NQJACK", &WatermarkStyle::default()).unwrap();

        // ceil(512 / 200) + 2 = 5
        assert_eq!(overlay.tiles_x, 5);
        assert_eq!(overlay.tiles_y, 5);
        assert_eq!(overlay.tiles.len(), 25);

        assert_eq!(overlay.tiles[0], Tile { row: 0, col: 0, x: 20, y: 50 });
        assert_eq!(overlay.tiles[1], Tile { row: 0, col: 1, x: 220, y: 50 });
        assert_eq!(overlay.tiles[5], Tile { row: 1, col: 0, x: 20, y: 250 });
        assert_eq!(
            overlay.tiles.last().copied(),
            Some(Tile { row: 4, col: 4, x: 820, y: 850 })
        );
    }

    #[test]
    fn test_tile_count_saturates_on_huge_padding() {
        assert_eq!(tile_count(u32::MAX, 1, u32::MAX), u32::MAX);
        assert_eq!(tile_count(512, 200, 2), 5);
    }

    #[test]
    fn test_exact_multiple_of_tile_size() {
        let overlay = Overlay::generate(400, 200, "X", &WatermarkStyle::default()).unwrap();
        assert_eq!(overlay.tiles_x, 4);
        assert_eq!(overlay.tiles_y, 3);
    }

    #[test]
    fn test_single_pixel_canvas() {
        let overlay = Overlay::generate(1, 1, "X", &WatermarkStyle::default()).unwrap();
        assert_eq!(overlay.tiles_x, 3);
        assert_eq!(overlay.tiles_y, 3);
    }

    #[test]
    fn test_rejects_empty_canvas_and_text() {
        let style = WatermarkStyle::default();
        assert_eq!(
            Overlay::generate(0, 10, "X", &style),
            Err(PatternError::EmptyCanvas { width: 0, height: 10 })
        );
        assert_eq!(Overlay::generate(10, 10, "", &style), Err(PatternError::EmptyText));
    }

    #[test]
    fn test_style_from_config() {
        let config = WatermarkConfig {
            tile_size: 150,
            color: "#fff".to_string(),
            ..WatermarkConfig::default()
        };
        let style = WatermarkStyle::from_config(&config);
        assert_eq!(style.tile_size, 150);
        assert_eq!(style.color, Rgb { r: 255, g: 255, b: 255 });
        assert!((style.opacity - 0.15).abs() < f32::EPSILON);
    }

    #[test]
    fn test_custom_tile_size_changes_grid() {
        let style = WatermarkStyle {
            tile_size: 100,
            ..WatermarkStyle::default()
        };
        let overlay = Overlay::generate(250, 100, "X", &style).unwrap();
        assert_eq!(overlay.tiles_x, 5);
        assert_eq!(overlay.tiles_y, 3);
        assert_eq!(overlay.tiles[1].x, 120);
    }

    #[test]
    fn test_svg_description() {
        let overlay = Overlay::generate(200, 200, "A&B", &WatermarkStyle::default()).unwrap();
        let svg = overlay.to_svg();

        assert!(svg.starts_with(r#"<svg width="200" height="200""#));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(r#"transform="rotate(-45 20 50)""#));
        assert!(svg.contains(r#"opacity="0.15""#));
        assert!(svg.contains(r#"text-anchor="middle""#));
        assert!(svg.contains(r#"font-weight="bold""#));
        assert!(svg.contains("A&amp;B"));
        assert_eq!(svg.matches("<text ").count(), overlay.tiles.len());
    }

    // *For any* positive canvas size, the tile grid SHALL reach past the far
    // edge: tiles_x * tile_size >= width + offset_x and
    // tiles_y * tile_size >= height + offset_y.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_grid_covers_canvas(width in 1u32..8000, height in 1u32..8000) {
            let overlay = Overlay::generate(width, height, "NQJACK", &WatermarkStyle::default())
                .unwrap();

            prop_assert!(u64::from(overlay.tiles_x) * 200 >= u64::from(width) + 20);
            prop_assert!(u64::from(overlay.tiles_y) * 200 >= u64::from(height) + 50);
            prop_assert_eq!(
                overlay.tiles.len(),
                overlay.tiles_x as usize * overlay.tiles_y as usize
            );

            // Last tile anchor lies beyond the visible canvas in both axes
            let last = overlay.tiles.last().unwrap();
            prop_assert!(last.x >= i64::from(width));
            prop_assert!(last.y >= i64::from(height));
        }
    }
}
