//! Alert annotation drawn straight onto frame pixels.
//!
//! No font assets: text uses a built-in 5x7 glyph table covering the
//! characters that appear in alert captions (uppercase letters, digits and a
//! little punctuation). Everything is plain `put_pixel` work on `RgbImage`.

use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};

use crate::classify::{Detection, Region};

const ALERT_RED: Rgb<u8> = Rgb([220, 20, 20]);
const CAPTION_WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BORDER_THICKNESS: u32 = 6;
const BOX_THICKNESS: u32 = 3;
const TEXT_SCALE: u32 = 2;

/// Copy the frame and draw the alert overlay onto it: red border, detection
/// bounding box, and caption lines (label, confidence, timestamp).
pub fn annotate(image: &RgbImage, detection: &Detection, at: DateTime<Local>) -> RgbImage {
    let mut out = image.clone();
    draw_border(&mut out, BORDER_THICKNESS, ALERT_RED);
    draw_rect(&mut out, &detection.region, BOX_THICKNESS, ALERT_RED);

    let caption = format!(
        "{} {:.0}%",
        detection.label.to_uppercase(),
        (detection.confidence * 100.0).round()
    );
    let stamp = at.format("%Y-%m-%d %H:%M:%S").to_string();
    let line_height = 8 * TEXT_SCALE + 2;
    draw_text(&mut out, &caption, BORDER_THICKNESS + 4, BORDER_THICKNESS + 4);
    draw_text(
        &mut out,
        &stamp,
        BORDER_THICKNESS + 4,
        BORDER_THICKNESS + 4 + line_height,
    );
    out
}

fn draw_border(image: &mut RgbImage, thickness: u32, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    let t = thickness.min(w / 2).min(h / 2);
    for y in 0..h {
        for x in 0..w {
            if x < t || y < t || x >= w - t || y >= h - t {
                image.put_pixel(x, y, color);
            }
        }
    }
}

fn draw_rect(image: &mut RgbImage, region: &Region, thickness: u32, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    let x0 = region.x.min(w.saturating_sub(1));
    let y0 = region.y.min(h.saturating_sub(1));
    let x1 = region.x.saturating_add(region.width).min(w);
    let y1 = region.y.saturating_add(region.height).min(h);
    for y in y0..y1 {
        for x in x0..x1 {
            let on_edge = x < x0 + thickness
                || y < y0 + thickness
                || x >= x1.saturating_sub(thickness)
                || y >= y1.saturating_sub(thickness);
            if on_edge {
                image.put_pixel(x, y, color);
            }
        }
    }
}

fn draw_text(image: &mut RgbImage, text: &str, x: u32, y: u32) {
    let mut cursor = x;
    for ch in text.chars() {
        let rows = glyph(ch.to_ascii_uppercase());
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..5u32 {
                if bits & (0b10000 >> col) == 0 {
                    continue;
                }
                for dy in 0..TEXT_SCALE {
                    for dx in 0..TEXT_SCALE {
                        let px = cursor + col * TEXT_SCALE + dx;
                        let py = y + row as u32 * TEXT_SCALE + dy;
                        if px < image.width() && py < image.height() {
                            image.put_pixel(px, py, CAPTION_WHITE);
                        }
                    }
                }
            }
        }
        cursor += 6 * TEXT_SCALE;
    }
}

/// 5x7 bitmap rows, MSB-left in the low 5 bits. Unknown characters render
/// as a filled block so missing coverage is visible rather than silent.
fn glyph(ch: char) -> [u8; 7] {
    match ch {
        ' ' => [0; 7],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b00100, 0b00000, 0b00000, 0b00100, 0b00000, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000],
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        _ => [0b11111; 7],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection() -> Detection {
        Detection {
            region: Region {
                x: 20,
                y: 20,
                width: 24,
                height: 24,
            },
            confidence: 0.91,
            label: "person".to_string(),
        }
    }

    #[test]
    fn annotate_does_not_mutate_the_source() {
        let original = RgbImage::from_pixel(80, 60, Rgb([10, 10, 10]));
        let annotated = annotate(&original, &detection(), Local::now());
        assert_eq!(original.get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(annotated.get_pixel(0, 0), &ALERT_RED);
        assert_eq!(annotated.dimensions(), original.dimensions());
    }

    #[test]
    fn border_and_box_are_alert_red() {
        let image = RgbImage::from_pixel(80, 60, Rgb([0, 0, 0]));
        let annotated = annotate(&image, &detection(), Local::now());
        // Border corner.
        assert_eq!(annotated.get_pixel(79, 59), &ALERT_RED);
        // Bounding box top edge.
        assert_eq!(annotated.get_pixel(30, 20), &ALERT_RED);
        // Box interior stays untouched.
        assert_eq!(annotated.get_pixel(32, 32), &Rgb([0, 0, 0]));
    }

    #[test]
    fn tiny_frames_do_not_panic() {
        let image = RgbImage::new(4, 3);
        let _ = annotate(&image, &detection(), Local::now());
    }

    #[test]
    fn oversized_region_is_clamped_not_overflowed() {
        let image = RgbImage::new(80, 60);
        let oversized = Detection {
            region: Region {
                x: u32::MAX - 4,
                y: 10,
                width: u32::MAX,
                height: u32::MAX,
            },
            confidence: 0.5,
            label: "person".to_string(),
        };
        let annotated = annotate(&image, &oversized, Local::now());
        assert_eq!(annotated.dimensions(), (80, 60));
    }
}
