//! Built-in garment placeholder rendered with resvg/usvg.
//!
//! Shown as the surface background when the content service has no
//! garment asset to offer. The silhouette is filled with the selected
//! color and outlined in a darker shade of it.

use image::{Rgba, RgbaImage};
use palette::{Hsl, IntoColor, Srgb};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

/// Garment silhouette on a 400x400 canvas.
const GARMENT_SILHOUETTE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="400" viewBox="0 0 400 400"><path d="M100 120 L100 80 Q100 60 120 60 L160 60 Q170 40 200 40 Q230 40 240 60 L280 60 Q300 60 300 80 L300 120 L260 140 L260 300 Q260 320 240 320 L160 320 Q140 320 140 300 L140 140 Z" fill="#000000" stroke="#000000" stroke-width="3" opacity="0.8"/></svg>"##;

/// Lightness removed from the fill color to get the outline color.
const OUTLINE_DARKEN: f32 = 0.15;

/// Renders the placeholder garment in `color`, fitted to `size x size`.
///
/// Returns `None` if the SVG cannot be rendered at that size.
pub fn render_placeholder(color: Srgb<u8>, size: u32) -> Option<RgbaImage> {
    let fill = to_hex(color);
    let outline = to_hex(darken_color(color, OUTLINE_DARKEN));

    let svg = replace_color_attr(GARMENT_SILHOUETTE, "fill", &fill);
    let svg = replace_color_attr(&svg, "stroke", &outline);
    render_svg(&svg, size)
}

/// Renders an SVG string to an RGBA image at the specified size.
///
/// The SVG is scaled to fit within `size x size` pixels while preserving
/// aspect ratio (the larger dimension will be `size`).
///
/// Returns `None` if the SVG cannot be parsed or rendered.
pub fn render_svg(svg_data: &str, size: u32) -> Option<RgbaImage> {
    let opts = Options::default();
    let tree = Tree::from_str(svg_data, &opts).ok()?;

    let svg_size = tree.size();
    let scale = (size as f32) / svg_size.width().max(svg_size.height());
    let width = (svg_size.width() * scale).ceil() as u32;
    let height = (svg_size.height() * scale).ceil() as u32;

    let mut pixmap = Pixmap::new(width, height)?;
    let transform = Transform::from_scale(scale, scale);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    Some(pixmap_to_rgba_image(&pixmap))
}

/// Darkens a color by reducing its HSL lightness.
pub fn darken_color(color: Srgb<u8>, amount: f32) -> Srgb<u8> {
    let rgb: Srgb = color.into_format();
    let mut hsl: Hsl = rgb.into_color();
    hsl.lightness = (hsl.lightness - amount).max(0.0);
    let darkened: Srgb = hsl.into_color();
    darkened.into_format()
}

fn to_hex(color: Srgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue)
}

/// Replaces a color attribute value, preserving "none" values.
fn replace_color_attr(svg: &str, attr: &str, new_color: &str) -> String {
    let mut result = String::with_capacity(svg.len());
    let pattern = format!("{}=\"", attr);
    let mut remaining = svg;

    while let Some(start) = remaining.find(&pattern) {
        result.push_str(&remaining[..start + pattern.len()]);
        remaining = &remaining[start + pattern.len()..];

        let Some(end) = remaining.find('"') else {
            break;
        };
        let value = &remaining[..end];
        if value == "none" || value == "transparent" {
            result.push_str(value);
        } else {
            result.push_str(new_color);
        }
        remaining = &remaining[end..];
    }

    result.push_str(remaining);
    result
}

/// Converts a tiny_skia Pixmap to an image::RgbaImage.
fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let width = pixmap.width();
    let height = pixmap.height();
    let mut img = RgbaImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let Some(pixel) = pixmap.pixel(x, y) else {
                continue;
            };
            // tiny_skia stores premultiplied alpha
            let (r, g, b, a) =
                unpremultiply(pixel.red(), pixel.green(), pixel.blue(), pixel.alpha());
            img.put_pixel(x, y, Rgba([r, g, b, a]));
        }
    }

    img
}

fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}
