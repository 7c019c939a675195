//! Calibration overlay drawn over the displayed screenshot

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use serde::Serialize;
use std::io::Cursor;

use crate::error::{CalibrationError, CalibrationResult};
use crate::grid::GridCell;
use crate::scale::DisplaySize;
use crate::session::CalibrationSessionState;

const MARKER_RADIUS: i32 = 8;
const MARKER_COLOUR: Rgba<u8> = Rgba([0, 255, 0, 255]);
/// Alpha of the dark wash laid over the whole image
const WASH_ALPHA: f32 = 0.2;

/// A cell's current position in displayed-image pixels
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Marker {
    pub col: u32,
    pub row: u32,
    pub x: f64,
    pub y: f64,
}

/// Where every cell sits right now: scaled position plus manual offset
pub fn markers(state: &CalibrationSessionState, cells: &[GridCell]) -> Vec<Marker> {
    cells
        .iter()
        .map(|cell| {
            let (x, y) = state.scale.map_cell(cell);
            Marker {
                col: cell.col,
                row: cell.row,
                x: x + state.offset_x as f64,
                y: y + state.offset_y as f64,
            }
        })
        .collect()
}

/// Draw the overlay onto a copy of `image` resized to the rendered size
pub fn draw_overlay(image: &DynamicImage, display: DisplaySize, markers: &[Marker]) -> RgbaImage {
    let width = display.width.max(1);
    let height = display.height.max(1);
    let mut canvas = image
        .resize_exact(width, height, image::imageops::FilterType::Triangle)
        .to_rgba8();

    for p in canvas.pixels_mut() {
        p[0] = (p[0] as f32 * (1.0 - WASH_ALPHA)).round() as u8;
        p[1] = (p[1] as f32 * (1.0 - WASH_ALPHA)).round() as u8;
        p[2] = (p[2] as f32 * (1.0 - WASH_ALPHA)).round() as u8;
    }

    for m in markers {
        let cx = m.x.round() as i32;
        let cy = m.y.round() as i32;
        draw_filled_circle_mut(&mut canvas, (cx, cy), MARKER_RADIUS, MARKER_COLOUR);
        draw_label(&mut canvas, &format!("{},{}", m.col, m.row), cx + 10, cy - 5);
    }

    canvas
}

/// Overlay as PNG bytes
pub fn overlay_png(image: &DynamicImage, display: DisplaySize, markers: &[Marker]) -> CalibrationResult<Vec<u8>> {
    let canvas = draw_overlay(image, display, markers);
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .map_err(|e| CalibrationError::Image(format!("PNG encode: {e}")))?;
    Ok(out)
}

// 5x5 bitmap digits, plus a comma
const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111],
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110],
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110],
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100],
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110],
];
const COMMA: [u8; 5] = [0b00000, 0b00000, 0b00000, 0b00100, 0b01000];

fn draw_label(canvas: &mut RgbaImage, text: &str, x: i32, y: i32) {
    let (w, h) = canvas.dimensions();
    for (i, c) in text.chars().enumerate() {
        let glyph = match c {
            '0'..='9' => DIGITS[(c as u8 - b'0') as usize],
            ',' => COMMA,
            _ => continue,
        };
        let gx = x + i as i32 * 6;
        for (row, &bits) in glyph.iter().enumerate() {
            for bit in 0..5 {
                if (bits >> (4 - bit)) & 1 == 0 {
                    continue;
                }
                let px = gx + bit;
                let py = y + row as i32;
                if px >= 0 && py >= 0 && (px as u32) < w && (py as u32) < h {
                    canvas.put_pixel(px as u32, py as u32, MARKER_COLOUR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::DisplayScale;

    fn state(offset_x: i64, offset_y: i64) -> CalibrationSessionState {
        CalibrationSessionState {
            offset_x,
            offset_y,
            scale: DisplayScale { scale_x: 2.0, scale_y: 0.5 },
            display: DisplaySize::new(40, 40),
        }
    }

    #[test]
    fn test_markers_follow_offset() {
        let cells = [GridCell { col: 2, row: 3, rel_x: 10, rel_y: 40 }];
        let m = markers(&state(-3, 4), &cells);
        assert_eq!(m, vec![Marker { col: 2, row: 3, x: 17.0, y: 24.0 }]);
    }

    #[test]
    fn test_draw_overlay_marks_cell() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([100, 100, 100, 255])));
        let m = [Marker { col: 1, row: 1, x: 10.0, y: 10.0 }];
        let canvas = draw_overlay(&image, DisplaySize::new(40, 40), &m);

        assert_eq!(canvas.dimensions(), (40, 40));
        assert_eq!(*canvas.get_pixel(10, 10), MARKER_COLOUR);
        // Away from markers the wash darkens the image
        assert_eq!(canvas.get_pixel(2, 38)[0], 80);
    }

    #[test]
    fn test_offscreen_markers_do_not_panic() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(10, 10));
        let m = [Marker { col: 9, row: 9, x: -500.0, y: 9000.0 }];
        let png = overlay_png(&image, DisplaySize::new(10, 10), &m).unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
