//! Static verification site emitted next to the certificates.
//!
//! The site is four files in a directory named after the last path segment of
//! the verification base URL:
//!
//! | File | Source |
//! |---|---|
//! | `index.html` | rendered with `maud` from [`SiteParameters`] |
//! | `verify.js` | fixed asset embedded in the binary |
//! | `style.css` | size custom properties + fixed asset |
//! | `data.json` | the job manifest |
//!
//! The lookup happens in the browser: `verify.js` reads the `id` query
//! parameter, finds the matching record in `data.json`, writes the holder into
//! the page and draws the QR code for `base_url + code`. The QR and name sizes
//! in `style.css` are derived from the same [`SvgScale`] that positioned the
//! placeholders in the SVG, so the browser rendering matches the raster.

use crate::generator::svg::{fmt_num, AnnotatedSvg, SvgScale};
use common::model::certificate::CertificateRecord;
use common::model::design::DesignParameters;
use include_dir::{include_dir, Dir};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

static SITE_ASSETS: Dir = include_dir!("$CARGO_MANIFEST_DIR/assets/site");

pub const INDEX_FILE: &str = "index.html";
pub const SCRIPT_FILE: &str = "verify.js";
pub const STYLESHEET_FILE: &str = "style.css";
pub const MANIFEST_FILE: &str = "data.json";

const DEFAULT_SITE_DIR: &str = "site";

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Embedded site asset missing: {0}")]
    MissingAsset(&'static str),
}

/// Everything the site templates need.
pub struct SiteParameters<'a> {
    pub base_url: &'a str,
    pub date: &'a str,
    pub qr_script_url: &'a str,
    pub annotated: &'a AnnotatedSvg,
    pub design: &'a DesignParameters,
    pub manifest: &'a [CertificateRecord],
}

/// Display sizes in SVG user units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteSizes {
    pub qr: f64,
    pub holder: f64,
}

impl SiteSizes {
    pub fn new(design: &DesignParameters, scale: SvgScale) -> Self {
        Self {
            qr: f64::from(design.qr_size) * scale.x,
            holder: f64::from(design.text_size) * scale.y,
        }
    }
}

/// Directory name for the site: the last non-empty path segment of
/// `base_url`, reduced to a safe single path component.
pub fn site_directory_name(base_url: &str) -> String {
    let url = base_url.split(['?', '#']).next().unwrap_or_default();
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or_default(),
        None => url,
    };

    let segment = path.split('/').filter(|s| !s.is_empty()).last().unwrap_or_default();
    let name: String = segment
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        DEFAULT_SITE_DIR.to_string()
    } else {
        name
    }
}

fn asset(name: &'static str) -> Result<&'static str, SiteError> {
    SITE_ASSETS
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .ok_or(SiteError::MissingAsset(name))
}

/// The annotated document without any XML prolog, ready to inline in HTML.
fn inline_svg(document: &str) -> &str {
    document.find("<svg").map(|i| &document[i..]).unwrap_or(document)
}

pub fn render_index(params: &SiteParameters) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Certificate verification" }
                link rel="stylesheet" href=(STYLESHEET_FILE);
                script src=(params.qr_script_url) defer {}
                script src=(SCRIPT_FILE) defer {}
            }
            body data-base-url=(params.base_url) {
                header {
                    h1 { "Certificate of " span id="holder-name" {} }
                    @if !params.date.is_empty() {
                        p class="issued" { "Issued " (params.date) }
                    }
                }
                p id="not-found" hidden { "No certificate matches this verification code." }
                main id="certificate" hidden {
                    (PreEscaped(inline_svg(&params.annotated.document)))
                }
            }
        }
    }
}

pub fn render_stylesheet(params: &SiteParameters) -> Result<String, SiteError> {
    let sizes = SiteSizes::new(params.design, params.annotated.scale);
    Ok(format!(
        ":root {{\n  --qr-size: {}px;\n  --holder-size: {}px;\n}}\n\n{}",
        fmt_num(sizes.qr),
        fmt_num(sizes.holder),
        asset(STYLESHEET_FILE)?
    ))
}

/// Writes the site into `parent/<site_directory_name(base_url)>` and returns
/// that directory.
pub fn emit_site(parent: &Path, params: &SiteParameters) -> Result<PathBuf, SiteError> {
    let dir = parent.join(site_directory_name(params.base_url));
    fs::create_dir_all(&dir)?;

    fs::write(dir.join(INDEX_FILE), render_index(params).into_string())?;
    fs::write(dir.join(SCRIPT_FILE), asset(SCRIPT_FILE)?)?;
    fs::write(dir.join(STYLESHEET_FILE), render_stylesheet(params)?)?;
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(params.manifest)?)?;

    Ok(dir)
}
