//! Certificate compositing: overlay text and QR code onto the template raster.
//!
//! ## Placement rules
//!
//! - The text anchor is the horizontal **centre** of the text and its top edge.
//!   The run is measured in the configured font and drawn starting at
//!   `anchor.x - width / 2`.
//! - The QR anchor is the top-left corner of the QR code. The QR raster is
//!   resized to the configured edge length with nearest-neighbour sampling and
//!   alpha-blended, so any transparent margin lets the template show through.
//! - The template is borrowed and never modified; every certificate is drawn on
//!   a fresh clone.
//!
//! Glyph work sits behind [`TextPainter`] so the geometry can be exercised
//! without a font file.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use common::model::design::{DesignParameters, Point};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid font file {}", .0.display())]
    InvalidFont(PathBuf),
    #[error("Invalid colour '{0}', expected #rrggbb")]
    InvalidColor(String),
}

/// Measures and draws a single line of text.
pub trait TextPainter: Send + Sync {
    /// Advance width of `text` at `size` pixels.
    fn measure(&self, text: &str, size: f32) -> f32;

    /// Draws `text` with its left edge at `x` and its top at `y`.
    fn draw(&self, canvas: &mut RgbaImage, x: i32, y: i32, size: f32, color: Rgba<u8>, text: &str);
}

/// [`TextPainter`] backed by a TrueType/OpenType font.
pub struct FontPainter {
    font: FontVec,
}

impl FontPainter {
    pub fn from_bytes(bytes: Vec<u8>, origin: &Path) -> Result<Self, CompositeError> {
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| CompositeError::InvalidFont(origin.to_path_buf()))?;
        Ok(Self { font })
    }

    pub fn load(path: &Path) -> Result<Self, CompositeError> {
        Self::from_bytes(std::fs::read(path)?, path)
    }
}

impl TextPainter for FontPainter {
    fn measure(&self, text: &str, size: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(size));
        let mut width = 0.0f32;
        let mut prev: Option<ab_glyph::GlyphId> = None;

        for ch in text.chars() {
            let glyph_id = scaled.glyph_id(ch);
            if let Some(prev) = prev {
                width += scaled.kern(prev, glyph_id);
            }
            width += scaled.h_advance(glyph_id);
            prev = Some(glyph_id);
        }

        width
    }

    fn draw(&self, canvas: &mut RgbaImage, x: i32, y: i32, size: f32, color: Rgba<u8>, text: &str) {
        draw_text_mut(canvas, color, x, y, PxScale::from(size), &self.font, text);
    }
}

/// Where and how the per-row overlays are drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub text_anchor: Point,
    pub text_size: f32,
    pub text_color: Rgba<u8>,
    pub qr_anchor: Point,
    pub qr_size: u32,
}

impl Placement {
    pub fn from_design(design: &DesignParameters) -> Result<Self, CompositeError> {
        Ok(Self {
            text_anchor: design.text_center_coordinates,
            text_size: design.text_size,
            text_color: parse_hex_color(&design.text_color)?,
            qr_anchor: design.qr_position,
            qr_size: design.qr_size,
        })
    }
}

/// Parses `#rrggbb` (the leading `#` is optional) into an opaque colour.
pub fn parse_hex_color(value: &str) -> Result<Rgba<u8>, CompositeError> {
    let hex = value.trim().trim_start_matches('#');
    let invalid = || CompositeError::InvalidColor(value.to_string());
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

/// Left edge of a text run of `width` centred on `anchor_x`.
pub fn centered_left(anchor_x: f32, width: f32) -> f32 {
    anchor_x - width / 2.0
}

/// Draws `text` and `qr` onto a copy of `template`.
pub fn composite_certificate(
    template: &RgbaImage,
    text: &str,
    qr: &RgbaImage,
    placement: &Placement,
    painter: &dyn TextPainter,
) -> RgbaImage {
    let mut canvas = template.clone();

    let width = painter.measure(text, placement.text_size);
    let left = centered_left(placement.text_anchor.x, width);
    painter.draw(
        &mut canvas,
        left.round() as i32,
        placement.text_anchor.y.round() as i32,
        placement.text_size,
        placement.text_color,
        text,
    );

    let qr = imageops::resize(qr, placement.qr_size, placement.qr_size, FilterType::Nearest);
    imageops::overlay(
        &mut canvas,
        &qr,
        placement.qr_anchor.x.round() as i64,
        placement.qr_anchor.y.round() as i64,
    );

    canvas
}

/// Encodes a finished certificate as PNG.
pub fn write_certificate(certificate: &RgbaImage, path: &Path) -> Result<(), CompositeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    certificate.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
