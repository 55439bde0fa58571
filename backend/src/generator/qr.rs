//! QR code generation for verification URLs.

use image::{Rgba, RgbaImage};
use qrcode::types::QrError;
use qrcode::{EcLevel, QrCode, Version};

/// Symbol version tried first; keeps module density constant across jobs.
pub const QR_VERSION: Version = Version::Normal(8);
pub const QR_EC_LEVEL: EcLevel = EcLevel::H;
/// Pixels per module in the rendered raster, before resizing onto the template.
pub const QR_MODULE_PIXELS: u32 = 40;

/// Encodes `payload` as a black-on-white QR raster without a quiet zone.
///
/// Payloads that do not fit version 8 at level H fall back to the smallest
/// version that does.
pub fn encode_payload(payload: &str) -> Result<RgbaImage, QrError> {
    let code = match QrCode::with_version(payload.as_bytes(), QR_VERSION, QR_EC_LEVEL) {
        Ok(code) => code,
        Err(QrError::DataTooLong) => {
            QrCode::with_error_correction_level(payload.as_bytes(), QR_EC_LEVEL)?
        }
        Err(e) => return Err(e),
    };

    Ok(code
        .render::<Rgba<u8>>()
        .quiet_zone(false)
        .module_dimensions(QR_MODULE_PIXELS, QR_MODULE_PIXELS)
        .dark_color(Rgba([0, 0, 0, 255]))
        .light_color(Rgba([255, 255, 255, 255]))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Version 8 is 49 modules wide.
    const V8_SIDE: u32 = 49 * QR_MODULE_PIXELS;

    #[test]
    fn short_payload_uses_version_eight() {
        let img = encode_payload("https://example.org/verify/?id=adaRFBM0001").unwrap();
        assert_eq!(img.width(), img.height());
        assert_eq!(img.width(), V8_SIDE);
    }

    #[test]
    fn corners_are_dark_finder_patterns() {
        let img = encode_payload("abc").unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        let last = img.width() - 1;
        assert_eq!(img.get_pixel(last, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn long_payload_grows_the_symbol() {
        let payload = format!("https://example.org/verify/?id={}", "x".repeat(200));
        let img = encode_payload(&payload).unwrap();
        assert!(img.width() > V8_SIDE);
    }
}
