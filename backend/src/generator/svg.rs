//! Turns an uploaded SVG certificate into the reusable verification template.
//!
//! The document is parsed with `roxmltree` only to validate it and read the
//! root `viewBox`; the rewrite itself is a splice on the input text so that
//! everything the author put in the file is preserved byte for byte. The root
//! start tag is made responsive and hidden, and two elements are appended
//! before `</svg>`:
//!
//! - `<text id="certificate-holder">` centred on the scaled text anchor, which
//!   the browser fills with the holder's name;
//! - a `<foreignObject>` at the scaled QR anchor holding an XHTML
//!   `<div id="certificate-qr">` for the client-rendered QR code.
//!
//! Design coordinates are template pixels; they are mapped to viewBox units
//! with `scale = viewBox / pixels` per axis.

use common::model::design::{DesignParameters, Point};
use regex::Regex;
use thiserror::Error;

/// ViewBox assumed when the document has none (A4 landscape in points, the
/// page size the certificate templates were first authored at).
pub const FALLBACK_VIEWBOX: (f64, f64) = (841.92, 595.5);

pub const HOLDER_ELEMENT_ID: &str = "certificate-holder";
pub const QR_ELEMENT_ID: &str = "certificate-qr";

#[derive(Debug, Error)]
pub enum SvgError {
    #[error("SVG parse error: {0}")]
    Parse(#[from] roxmltree::Error),
    #[error("Root element is <{0}>, expected <svg>")]
    NotSvg(String),
    #[error("Template pixel size must be non-zero, got {0}x{1}")]
    ZeroTemplateSize(u32, u32),
    #[error("Malformed <svg> start tag")]
    MalformedRoot,
}

/// ViewBox units per template pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgScale {
    pub x: f64,
    pub y: f64,
}

impl SvgScale {
    pub fn point(&self, p: Point) -> (f64, f64) {
        (f64::from(p.x) * self.x, f64::from(p.y) * self.y)
    }
}

#[derive(Debug, Clone)]
pub struct AnnotatedSvg {
    pub scale: SvgScale,
    pub document: String,
}

/// Checks that `svg` parses and has an `<svg>` root.
pub fn validate(svg: &str) -> Result<(), SvgError> {
    let doc = roxmltree::Document::parse(svg)?;
    let root = doc.root_element();
    if !root.has_tag_name("svg") {
        return Err(SvgError::NotSvg(root.tag_name().name().to_string()));
    }
    Ok(())
}

/// Parses a `viewBox` attribute into its width and height.
pub fn parse_view_box(value: &str) -> Option<(f64, f64)> {
    let parts: Vec<f64> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [_, _, w, h] if *w > 0.0 && *h > 0.0 => Some((*w, *h)),
        _ => None,
    }
}

/// Injects the holder text node and QR container into `svg`.
pub fn annotate(
    svg: &str,
    holder: &str,
    design: &DesignParameters,
) -> Result<AnnotatedSvg, SvgError> {
    let doc = roxmltree::Document::parse(svg)?;
    let root = doc.root_element();
    if !root.has_tag_name("svg") {
        return Err(SvgError::NotSvg(root.tag_name().name().to_string()));
    }

    let size = design.image_size;
    if size.width == 0 || size.height == 0 {
        return Err(SvgError::ZeroTemplateSize(size.width, size.height));
    }

    let view_box = root.attribute("viewBox").and_then(parse_view_box);
    let (vb_w, vb_h) = view_box.unwrap_or(FALLBACK_VIEWBOX);
    let scale = SvgScale {
        x: vb_w / f64::from(size.width),
        y: vb_h / f64::from(size.height),
    };

    let range = root.range();
    let start_tag_end = find_start_tag_end(svg, range.start).ok_or(SvgError::MalformedRoot)?;
    let self_closing = svg[..start_tag_end].ends_with("/>");
    let attrs_end = if self_closing { start_tag_end - 2 } else { start_tag_end - 1 };

    let start_tag = rewrite_root_attributes(&svg[range.start..attrs_end], view_box.is_none())?;

    let (body, close_at) = if self_closing {
        ("", range.end)
    } else {
        let close = svg[..range.end].rfind("</").ok_or(SvgError::MalformedRoot)?;
        (&svg[start_tag_end..close], close)
    };

    let mut document = String::with_capacity(svg.len() + 512);
    document.push_str(&svg[..range.start]);
    document.push_str(&start_tag);
    document.push('>');
    document.push_str(body);
    document.push_str(&overlay_elements(holder, design, scale));
    if self_closing {
        document.push_str("</svg>");
    } else {
        document.push_str(&svg[close_at..range.end]);
    }
    document.push_str(&svg[range.end..]);

    Ok(AnnotatedSvg { scale, document })
}

/// Byte offset just past the `>` closing the start tag that begins at `from`,
/// skipping `>` inside quoted attribute values.
fn find_start_tag_end(svg: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, ch) in svg[from..].char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '>') => return Some(from + offset + 1),
            _ => {}
        }
    }
    None
}

/// Rewrites the root start tag. With `fallback_view_box` any existing
/// (unusable) `viewBox` is dropped and replaced by [`FALLBACK_VIEWBOX`].
fn rewrite_root_attributes(open_tag: &str, fallback_view_box: bool) -> Result<String, SvgError> {
    let names = if fallback_view_box {
        "width|height|visibility|preserveAspectRatio|viewBox"
    } else {
        "width|height|visibility|preserveAspectRatio"
    };
    let re = Regex::new(&format!(r#"\s(?:{names})\s*=\s*(?:"[^"]*"|'[^']*')"#))
        .map_err(|_| SvgError::MalformedRoot)?;
    let mut tag = re.replace_all(open_tag, "").trim_end().to_string();
    if fallback_view_box {
        tag.push_str(&format!(
            r#" viewBox="0 0 {} {}""#,
            fmt_num(FALLBACK_VIEWBOX.0),
            fmt_num(FALLBACK_VIEWBOX.1)
        ));
    }
    tag.push_str(r#" width="100%" preserveAspectRatio="xMidYMid meet" visibility="hidden""#);
    Ok(tag)
}

fn overlay_elements(holder: &str, design: &DesignParameters, scale: SvgScale) -> String {
    let (text_x, _) = scale.point(design.text_center_coordinates);
    let text_top = f64::from(design.text_center_coordinates.y);
    let text_y = (text_top + f64::from(design.text_size) / 2.0) * scale.y;
    let (qr_x, qr_y) = scale.point(design.qr_position);
    let qr_w = f64::from(design.qr_size) * scale.x;
    let qr_h = f64::from(design.qr_size) * scale.y;

    format!(
        concat!(
            r#"<text id="{holder_id}" x="{tx}" y="{ty}" text-anchor="middle" "#,
            r#"dominant-baseline="middle" fill="{fill}">{holder}</text>"#,
            r#"<foreignObject x="{qx}" y="{qy}" width="{qw}" height="{qh}">"#,
            r#"<div xmlns="http://www.w3.org/1999/xhtml" id="{qr_id}" "#,
            r#"style="width:100%;height:100%"></div>"#,
            r#"</foreignObject>"#,
        ),
        holder_id = HOLDER_ELEMENT_ID,
        qr_id = QR_ELEMENT_ID,
        tx = fmt_num(text_x),
        ty = fmt_num(text_y),
        fill = escape_xml(&format!("#{}", design.text_color.trim().trim_start_matches('#'))),
        holder = escape_xml(holder),
        qx = fmt_num(qr_x),
        qy = fmt_num(qr_y),
        qw = fmt_num(qr_w),
        qh = fmt_num(qr_h),
    )
}

/// Formats with at most four decimals and no trailing zeros.
pub fn fmt_num(value: f64) -> String {
    let s = format!("{value:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::design::ImageSize;

    fn design() -> DesignParameters {
        DesignParameters {
            text_size: 90.0,
            text_color: "#4c0d82".to_string(),
            image_size: ImageSize { width: 3508, height: 2480 },
            text_center_coordinates: Point { x: 1754.0, y: 1200.0 },
            qr_size: 400,
            qr_position: Point { x: 100.0, y: 200.0 },
        }
    }

    fn attr(doc: &roxmltree::Document, id: &str, name: &str) -> f64 {
        doc.descendants()
            .find(|n| n.attribute("id") == Some(id))
            .and_then(|n| n.attribute(name))
            .unwrap()
            .parse()
            .unwrap()
    }

    const SVG: &str = r#"<?xml version="1.0"?>
<svg xmlns="http://www.w3.org/2000/svg" width="1754" height="1240" viewBox="0 0 1754 1240" stroke-width="2">
  <rect width="10" height="10" data-note="a > b"/>
</svg>
"#;

    #[test]
    fn scale_is_view_box_over_pixels() {
        let out = annotate(SVG, "Sam", &design()).unwrap();
        assert_eq!(out.scale, SvgScale { x: 1754.0 / 3508.0, y: 1240.0 / 2480.0 });
    }

    #[test]
    fn missing_view_box_uses_fallback() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><g/></svg>"#;
        let out = annotate(svg, "Sam", &design()).unwrap();

        assert_eq!(out.scale.x, 841.92 / 3508.0);
        assert_eq!(out.scale.y, 595.5 / 2480.0);
        assert!(out.document.contains(r#"viewBox="0 0 841.92 595.5""#));
    }

    #[test]
    fn unusable_view_box_is_replaced_not_duplicated() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 0 0"><g/></svg>"#;
        let out = annotate(svg, "Sam", &design()).unwrap();

        let doc = roxmltree::Document::parse(&out.document).unwrap();
        assert_eq!(doc.root_element().attribute("viewBox"), Some("0 0 841.92 595.5"));
        assert_eq!(out.document.matches("viewBox=").count(), 1);
        assert_eq!(out.scale.x, 841.92 / 3508.0);
    }

    #[test]
    fn injects_scaled_text_and_qr_container() {
        let out = annotate(SVG, "Sam", &design()).unwrap();
        let doc = roxmltree::Document::parse(&out.document).unwrap();

        assert_eq!(attr(&doc, HOLDER_ELEMENT_ID, "x"), 877.0);
        assert_eq!(attr(&doc, HOLDER_ELEMENT_ID, "y"), (1200.0 + 45.0) * 0.5);

        let container = doc
            .descendants()
            .find(|n| n.has_tag_name("foreignObject"))
            .unwrap();
        assert_eq!(container.attribute("x"), Some("50"));
        assert_eq!(container.attribute("y"), Some("100"));
        assert_eq!(container.attribute("width"), Some("200"));
        assert!(container
            .descendants()
            .any(|n| n.attribute("id") == Some(QR_ELEMENT_ID)));
    }

    #[test]
    fn root_is_responsive_and_hidden() {
        let out = annotate(SVG, "Sam", &design()).unwrap();
        let doc = roxmltree::Document::parse(&out.document).unwrap();
        let root = doc.root_element();

        assert_eq!(root.attribute("width"), Some("100%"));
        assert_eq!(root.attribute("height"), None);
        assert_eq!(root.attribute("visibility"), Some("hidden"));
        assert_eq!(root.attribute("stroke-width"), Some("2"));
        assert_eq!(root.attribute("viewBox"), Some("0 0 1754 1240"));
        // Children are kept, including attributes holding '>'.
        assert!(out.document.contains(r#"data-note="a > b""#));
        assert!(out.document.starts_with("<?xml"));
    }

    #[test]
    fn holder_text_is_escaped() {
        let out = annotate(SVG, "Tom & <Jerry>", &design()).unwrap();
        let doc = roxmltree::Document::parse(&out.document).unwrap();
        let text = doc
            .descendants()
            .find(|n| n.attribute("id") == Some(HOLDER_ELEMENT_ID))
            .and_then(|n| n.text())
            .unwrap();
        assert_eq!(text, "Tom & <Jerry>");
    }

    #[test]
    fn self_closing_root_gets_children() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 50"/>"#;
        let out = annotate(svg, "Sam", &design()).unwrap();
        let doc = roxmltree::Document::parse(&out.document).unwrap();
        assert!(doc.descendants().any(|n| n.has_tag_name("foreignObject")));
    }

    #[test]
    fn rejects_non_svg_documents() {
        assert!(matches!(
            annotate("<html/>", "Sam", &design()),
            Err(SvgError::NotSvg(name)) if name == "html"
        ));
        assert!(matches!(annotate("not xml", "Sam", &design()), Err(SvgError::Parse(_))));
        assert!(validate(SVG).is_ok());
    }

    #[test]
    fn view_box_parsing() {
        assert_eq!(parse_view_box("0 0 841.92 595.5"), Some((841.92, 595.5)));
        assert_eq!(parse_view_box("0,0,100,50"), Some((100.0, 50.0)));
        assert_eq!(parse_view_box("0 0 100"), None);
        assert_eq!(parse_view_box("0 0 -1 10"), None);
    }

    #[test]
    fn numbers_are_trimmed() {
        assert_eq!(fmt_num(50.0), "50");
        assert_eq!(fmt_num(0.24), "0.24");
        assert_eq!(fmt_num(1.0 / 3.0), "0.3333");
    }
}
