//! Drawing images onto the surface bitmap.
//!
//! All drawing is source-over alpha blending. Transformed draws map each
//! destination pixel back into source space and sample bilinearly, so the
//! output depends only on the inputs.

use image::{Rgba, RgbaImage};

use super::LayerTransform;

// ============================================================================
// Compositing
// ============================================================================

/// Composites a source image onto a destination image at the specified position.
///
/// Uses standard alpha blending (source over destination).
pub fn composite_over(dest: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    let dest_width = i64::from(dest.width());
    let dest_height = i64::from(dest.height());

    for sy in 0..src.height() {
        for sx in 0..src.width() {
            let dx = i64::from(x) + i64::from(sx);
            let dy = i64::from(y) + i64::from(sy);

            if dx < 0 || dy < 0 || dx >= dest_width || dy >= dest_height {
                continue;
            }

            let src_pixel = src.get_pixel(sx, sy);
            let dst_pixel = dest.get_pixel(dx as u32, dy as u32);
            let blended = alpha_blend(*src_pixel, *dst_pixel);
            dest.put_pixel(dx as u32, dy as u32, blended);
        }
    }
}

/// Alpha blends two RGBA pixels (source over destination).
pub(crate) fn alpha_blend(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;

    let out_a = sa + da * (1.0 - sa);

    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| -> u8 {
        let sf = s as f32 / 255.0;
        let df = d as f32 / 255.0;
        let out = (sf * sa + df * da * (1.0 - sa)) / out_a;
        (out * 255.0).round() as u8
    };

    Rgba([
        blend(src[0], dst[0]),
        blend(src[1], dst[1]),
        blend(src[2], dst[2]),
        (out_a * 255.0).round() as u8,
    ])
}

// ============================================================================
// Transformed drawing
// ============================================================================

/// Draws `src` onto `dest` using a layer transform.
///
/// The forward mapping is `dest = position + R(rotation) * S(scale) * (src - pivot)`.
/// Unrotated draws at unit scale on integer positions take the plain
/// [`composite_over`] path.
pub fn draw_transformed(dest: &mut RgbaImage, src: &RgbaImage, transform: &LayerTransform) {
    let sw = src.width() as f32;
    let sh = src.height() as f32;
    if sw == 0.0 || sh == 0.0 {
        return;
    }
    let (pivot_x, pivot_y) = transform.origin.pivot(sw, sh);

    if let Some((x, y)) = integer_placement(transform, pivot_x, pivot_y) {
        composite_over(dest, src, x, y);
        return;
    }

    let theta = transform.rotation_degrees.to_radians();
    let (sin, cos) = theta.sin_cos();
    let (sx, sy) = (transform.scale_x, transform.scale_y);
    let (px, py) = (transform.position_x, transform.position_y);

    let forward = |u: f32, v: f32| -> (f32, f32) {
        let lx = (u - pivot_x) * sx;
        let ly = (v - pivot_y) * sy;
        (px + lx * cos - ly * sin, py + lx * sin + ly * cos)
    };

    // Destination bounding box of the four transformed corners.
    let corners = [forward(0.0, 0.0), forward(sw, 0.0), forward(0.0, sh), forward(sw, sh)];
    let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
    let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
    let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
    let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(dest.width());
    let y1 = (max_y.ceil().max(0.0) as u32).min(dest.height());

    for dy in y0..y1 {
        for dx in x0..x1 {
            // Inverse mapping of the destination pixel center.
            let ox = dx as f32 + 0.5 - px;
            let oy = dy as f32 + 0.5 - py;
            let u = (ox * cos + oy * sin) / sx + pivot_x;
            let v = (-ox * sin + oy * cos) / sy + pivot_y;

            if u < 0.0 || v < 0.0 || u >= sw || v >= sh {
                continue;
            }

            if let Some(sample) = sample_bilinear(src, u, v) {
                let dst_pixel = dest.get_pixel(dx, dy);
                let blended = alpha_blend(sample, *dst_pixel);
                dest.put_pixel(dx, dy, blended);
            }
        }
    }
}

/// Draws `src` scaled to fit inside `dest` (aspect preserved) and centered.
pub fn draw_contained(dest: &mut RgbaImage, src: &RgbaImage) {
    if src.width() == 0 || src.height() == 0 {
        return;
    }
    let scale = (dest.width() as f32 / src.width() as f32)
        .min(dest.height() as f32 / src.height() as f32);
    let transform = LayerTransform {
        position_x: dest.width() as f32 / 2.0,
        position_y: dest.height() as f32 / 2.0,
        scale_x: scale,
        scale_y: scale,
        ..LayerTransform::default()
    };
    draw_transformed(dest, src, &transform);
}

/// Returns the top-left integer offset when the transform is a pure
/// whole-pixel translation.
fn integer_placement(transform: &LayerTransform, pivot_x: f32, pivot_y: f32) -> Option<(i32, i32)> {
    let rotation = transform.rotation_degrees.rem_euclid(360.0);
    if rotation != 0.0 || transform.scale_x != 1.0 || transform.scale_y != 1.0 {
        return None;
    }
    let x = transform.position_x - pivot_x;
    let y = transform.position_y - pivot_y;
    // Offsets past i32 range take the general path, which clips them away.
    let fits = |v: f32| v.fract() == 0.0 && v.abs() < i32::MAX as f32 / 2.0;
    (fits(x) && fits(y)).then_some((x as i32, y as i32))
}

/// Bilinear sample at source coordinates `(u, v)` with premultiplied
/// interpolation. Samples outside the image count as transparent.
fn sample_bilinear(src: &RgbaImage, u: f32, v: f32) -> Option<Rgba<u8>> {
    let fx = u - 0.5;
    let fy = v - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;

    let mut acc = [0.0f32; 4];
    let taps = [
        (x0, y0, (1.0 - tx) * (1.0 - ty)),
        (x0 + 1.0, y0, tx * (1.0 - ty)),
        (x0, y0 + 1.0, (1.0 - tx) * ty),
        (x0 + 1.0, y0 + 1.0, tx * ty),
    ];

    for (x, y, weight) in taps {
        if weight == 0.0 || x < 0.0 || y < 0.0 {
            continue;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= src.width() || y >= src.height() {
            continue;
        }
        let p = src.get_pixel(x, y);
        let a = p[3] as f32 * weight;
        acc[0] += p[0] as f32 * a;
        acc[1] += p[1] as f32 * a;
        acc[2] += p[2] as f32 * a;
        acc[3] += a;
    }

    if acc[3] <= 0.0 {
        return None;
    }
    let channel = |c: f32| (c / acc[3]).round().clamp(0.0, 255.0) as u8;
    Some(Rgba([
        channel(acc[0]),
        channel(acc[1]),
        channel(acc[2]),
        acc[3].round().clamp(0.0, 255.0) as u8,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::OriginMode;

    #[test]
    fn composite_simple() {
        // 10x10 red background, 4x4 blue overlay at (3, 3)
        let mut dest = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let src = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));

        composite_over(&mut dest, &src, 3, 3);

        assert_eq!(dest.get_pixel(5, 5).0, [0, 0, 255, 255]);
        assert_eq!(dest.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn composite_with_transparency() {
        let mut dest = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let src = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 128]));

        composite_over(&mut dest, &src, 0, 0);

        let pixel = dest.get_pixel(0, 0);
        assert!(pixel[0] > 0, "Should have some red");
        assert!(pixel[2] > 0, "Should have some blue");
    }

    #[test]
    fn scaled_draw_covers_expected_area() {
        let mut dest = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let src = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let transform = LayerTransform {
            position_x: 50.0,
            position_y: 50.0,
            scale_x: 2.0,
            scale_y: 2.0,
            ..LayerTransform::default()
        };

        draw_transformed(&mut dest, &src, &transform);

        // 20x20 square centered on (50, 50): spans 40..60
        assert_eq!(dest.get_pixel(50, 50).0, [0, 0, 0, 255]);
        assert_eq!(dest.get_pixel(42, 42).0, [0, 0, 0, 255]);
        assert_eq!(dest.get_pixel(35, 50).0, [255, 255, 255, 255]);
        assert_eq!(dest.get_pixel(65, 50).0, [255, 255, 255, 255]);
    }

    #[test]
    fn rotation_swaps_extent() {
        let mut dest = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        // Wide bar: 40x4
        let src = RgbaImage::from_pixel(40, 4, Rgba([0, 0, 0, 255]));
        let transform = LayerTransform {
            position_x: 50.0,
            position_y: 50.0,
            rotation_degrees: 90.0,
            ..LayerTransform::default()
        };

        draw_transformed(&mut dest, &src, &transform);

        // After a quarter turn the bar is vertical.
        assert_eq!(dest.get_pixel(50, 35).0, [0, 0, 0, 255]);
        assert_eq!(dest.get_pixel(50, 65).0, [0, 0, 0, 255]);
        assert_eq!(dest.get_pixel(35, 50).0, [255, 255, 255, 255]);
    }

    #[test]
    fn top_left_origin_integer_offset_uses_plain_composite() {
        let mut dest = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        let src = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]));
        let transform = LayerTransform {
            position_x: 4.0,
            position_y: 6.0,
            origin: OriginMode::TopLeft,
            ..LayerTransform::default()
        };

        draw_transformed(&mut dest, &src, &transform);

        assert_eq!(dest.get_pixel(4, 6).0, [9, 9, 9, 255]);
        assert_eq!(dest.get_pixel(5, 7).0, [9, 9, 9, 255]);
        assert_eq!(dest.get_pixel(6, 6).0, [0, 0, 0, 0]);
    }

    #[test]
    fn contained_draw_preserves_aspect() {
        let mut dest = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        // 2:1 source becomes 100x50, centered vertically (25..75)
        let src = RgbaImage::from_pixel(20, 10, Rgba([0, 0, 0, 255]));

        draw_contained(&mut dest, &src);

        assert_eq!(dest.get_pixel(50, 50).0, [0, 0, 0, 255]);
        assert_eq!(dest.get_pixel(50, 10).0, [255, 255, 255, 255]);
        assert_eq!(dest.get_pixel(50, 90).0, [255, 255, 255, 255]);
    }

    #[test]
    fn far_offscreen_placement_draws_nothing() {
        let src = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let background = RgbaImage::from_pixel(32, 32, Rgba([1, 2, 3, 255]));

        for (x, y) in [(3.0e9, 20.0), (-3.0e9, 20.0), (16.0, 3.0e9), (f32::MAX, f32::MIN)] {
            let transform = LayerTransform {
                position_x: x,
                position_y: y,
                scale_x: 1.0,
                scale_y: 1.0,
                rotation_degrees: 0.0,
                origin: OriginMode::Center,
            };
            let mut dest = background.clone();
            draw_transformed(&mut dest, &src, &transform);
            assert_eq!(dest, background);
        }
    }

    #[test]
    fn composite_near_i32_limits_does_not_overflow() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let mut dest = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        composite_over(&mut dest, &src, i32::MAX, i32::MIN);
        assert!(dest.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn transformed_draw_is_deterministic() {
        let src = RgbaImage::from_fn(16, 9, |x, y| Rgba([x as u8 * 10, y as u8 * 20, 77, 200]));
        let transform = LayerTransform {
            position_x: 31.3,
            position_y: 18.7,
            scale_x: 1.7,
            scale_y: 0.9,
            rotation_degrees: 33.0,
            origin: OriginMode::Center,
        };

        let mut a = RgbaImage::from_pixel(64, 64, Rgba([240, 240, 240, 255]));
        let mut b = a.clone();
        draw_transformed(&mut a, &src, &transform);
        draw_transformed(&mut b, &src, &transform);

        assert_eq!(a, b);
    }
}
