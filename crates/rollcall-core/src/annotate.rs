//! Annotated attendance photo: a box and roll-number label per accepted match.

use std::io::Cursor;

use ab_glyph::{FontVec, PxScale};
use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::matcher::AcceptedMatch;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 22.0;
const LABEL_GAP: i32 = 10;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("image decode/encode: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("imaging worker exited")]
    WorkerGone,
}

/// Persists the most recent annotated attendance photo.
#[async_trait]
pub trait ImageSink: Send + Sync {
    async fn store_annotated(&self, image: Vec<u8>, matches: Vec<AcceptedMatch>) -> Result<(), AnnotateError>;
}

/// Draw every match onto `img`. Labels need a font; without one only boxes are drawn.
pub fn draw_matches(img: &mut RgbImage, matches: &[AcceptedMatch], font: Option<&FontVec>) {
    for m in matches {
        let x = m.bbox.x.round() as i32;
        let y = m.bbox.y.round() as i32;
        let w = m.bbox.width.round().max(1.0) as u32;
        let h = m.bbox.height.round().max(1.0) as u32;

        for t in 0..BOX_THICKNESS {
            let rect = Rect::at(x - t, y - t).of_size(w + 2 * t as u32, h + 2 * t as u32);
            draw_hollow_rect_mut(img, rect, BOX_COLOR);
        }

        if let Some(font) = font {
            let label_y = y - LABEL_GAP - LABEL_SCALE as i32;
            draw_text_mut(img, BOX_COLOR, x, label_y, PxScale::from(LABEL_SCALE), font, &m.roll_no);
        }
    }
}

/// Decode `image`, draw `matches`, and re-encode as JPEG.
pub fn annotate_jpeg(image: &[u8], matches: &[AcceptedMatch], font: Option<&FontVec>) -> Result<Vec<u8>, AnnotateError> {
    let mut canvas = image::load_from_memory(image)?.to_rgb8();
    draw_matches(&mut canvas, matches, font);

    let mut out = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn accepted(x: f32, y: f32, w: f32, h: f32) -> AcceptedMatch {
        AcceptedMatch {
            roll_no: "R1".into(),
            bbox: BoundingBox { x, y, width: w, height: h },
            distance: 0.1,
        }
    }

    #[test]
    fn test_draw_matches_outlines_box() {
        let mut img = RgbImage::new(64, 64);
        draw_matches(&mut img, &[accepted(10.0, 10.0, 20.0, 20.0)], None);
        assert_eq!(*img.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*img.get_pixel(29, 29), BOX_COLOR);
        // Outer ring from the second pass.
        assert_eq!(*img.get_pixel(9, 9), BOX_COLOR);
        // Interior untouched.
        assert_eq!(*img.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_matches_clips_at_edges() {
        let mut img = RgbImage::new(16, 16);
        draw_matches(&mut img, &[accepted(-5.0, -5.0, 40.0, 40.0)], None);
        draw_matches(&mut img, &[accepted(0.0, 0.0, 0.0, 0.0)], None);
    }

    #[test]
    fn test_annotate_jpeg_round_trip() {
        let img = RgbImage::from_pixel(32, 24, Rgb([200, 200, 200]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();

        let out = annotate_jpeg(&png, &[accepted(4.0, 4.0, 8.0, 8.0)], None).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_annotate_rejects_garbage() {
        assert!(matches!(annotate_jpeg(b"not an image", &[], None), Err(AnnotateError::Image(_))));
    }
}
