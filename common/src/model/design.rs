use serde::{Deserialize, Serialize};

/// Font size used when the designer does not send one.
pub const DEFAULT_TEXT_SIZE: f32 = 90.0;
/// Text colour used when the designer does not send one.
pub const DEFAULT_TEXT_COLOR: &str = "#4c0d82";
/// Edge length of the composited QR code, in template pixels.
pub const DEFAULT_QR_SIZE: u32 = 399;

/// A point in template pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Pixel dimensions of the raster certificate template.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Placement and styling of the overlay text and QR code for one job.
///
/// Deserialized from the `design_data` form field. Keys are camelCase because
/// the payload is produced by the browser designer; extra keys it sends (such
/// as the `templateImage` preview) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignParameters {
    #[serde(default = "default_text_size")]
    pub text_size: f32,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    pub image_size: ImageSize,
    /// `x` is the horizontal centre of the text, `y` its top edge.
    pub text_center_coordinates: Point,
    #[serde(default = "default_qr_size")]
    pub qr_size: u32,
    /// Top-left corner of the QR code.
    pub qr_position: Point,
}

fn default_text_size() -> f32 {
    DEFAULT_TEXT_SIZE
}

fn default_text_color() -> String {
    DEFAULT_TEXT_COLOR.to_string()
}

fn default_qr_size() -> u32 {
    DEFAULT_QR_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn designer_payload_fills_in_defaults() {
        let json = r#"{
            "templateImage": "data:image/png;base64,AAAA",
            "imageSize": {"width": 3508, "height": 2480},
            "textCenterCoordinates": {"x": 1750, "y": 1169},
            "qrPosition": {"x": 1550, "y": 1720}
        }"#;

        let design: DesignParameters = serde_json::from_str(json).unwrap();

        assert_eq!(design.text_size, DEFAULT_TEXT_SIZE);
        assert_eq!(design.text_color, DEFAULT_TEXT_COLOR);
        assert_eq!(design.qr_size, DEFAULT_QR_SIZE);
        assert_eq!(design.image_size.width, 3508);
        assert_eq!(design.text_center_coordinates, Point { x: 1750.0, y: 1169.0 });
    }

    #[test]
    fn explicit_values_override_defaults() {
        let json = r##"{
            "textSize": 64,
            "textColor": "#112233",
            "imageSize": {"width": 800, "height": 600},
            "textCenterCoordinates": {"x": 400.5, "y": 100},
            "qrSize": 120,
            "qrPosition": {"x": 10, "y": 20}
        }"##;

        let design: DesignParameters = serde_json::from_str(json).unwrap();

        assert_eq!(design.text_size, 64.0);
        assert_eq!(design.text_color, "#112233");
        assert_eq!(design.qr_size, 120);
        assert_eq!(design.text_center_coordinates.x, 400.5);
    }

    #[test]
    fn missing_geometry_is_rejected() {
        let json = r#"{"textSize": 64}"#;
        assert!(serde_json::from_str::<DesignParameters>(json).is_err());
    }
}
