//! # Certificate Generation Job
//!
//! Runs one generation job end to end on the calling thread. The HTTP layer
//! (`services::certificates::generate`) does the `ReceivingInputs` and
//! `Loading` steps before acknowledging the request, then hands the loaded
//! [`JobInputs`] to [`Generator::run`] on the blocking pool.
//!
//! ## Workflow
//!
//! 1.  **Loading**: [`JobInputs::load`] decodes the raster template once,
//!     parses the roster and checks the optional SVG template.
//!
//! 2.  **Per-row processing**: rows are handled strictly in roster order. For
//!     each row the verification code is derived, the QR code for
//!     `base_url + code` is encoded, the overlay format is rendered, and the
//!     certificate is composited onto a copy of the template and written as
//!     `<code>.png`. A formatting error stops the job at that row before any
//!     file is written for it; certificates already on disk stay there.
//!
//! 3.  **Manifest**: after the last row, `data.json` is written with one
//!     `{code, holder}` record per certificate, in processing order.
//!
//! 4.  **Site emission**: when an SVG template was uploaded it is annotated
//!     once with the job's design parameters and the last processed holder
//!     text, and the verification site is written next to the certificates.

use crate::generator::codes::verification_code;
use crate::generator::compositor::{
    composite_certificate, write_certificate, CompositeError, Placement, TextPainter,
};
use crate::generator::qr;
use crate::generator::roster::{Roster, RosterError, RosterFormat};
use crate::generator::site::{self, SiteError, SiteParameters, MANIFEST_FILE};
use crate::generator::svg::{self, SvgError};
use crate::generator::text::{normalize_name, FormatError, OverlayFormat};
use common::model::certificate::{CertificateRecord, Manifest};
use common::model::design::DesignParameters;
use image::RgbaImage;
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Template image error: {0}")]
    Template(#[from] image::ImageError),
    #[error("Roster error: {0}")]
    Roster(#[from] RosterError),
    #[error("SVG template error: {0}")]
    Svg(#[from] SvgError),
    #[error("SVG template is not valid UTF-8")]
    SvgEncoding,
    #[error("Row {row} ('{name}'): {source}")]
    Format {
        row: usize,
        name: String,
        #[source]
        source: FormatError,
    },
    #[error("QR encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),
    #[error("Certificate error: {0}")]
    Composite(#[from] CompositeError),
    #[error("Site error: {0}")]
    Site(#[from] SiteError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stages of a job, in order. `Failed` can follow any stage after
/// `ReceivingInputs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    ReceivingInputs,
    Loading,
    PerRowProcessing,
    SiteEmission,
    Done,
    Failed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::ReceivingInputs => "receiving inputs",
            JobPhase::Loading => "loading",
            JobPhase::PerRowProcessing => "processing rows",
            JobPhase::SiteEmission => "emitting site",
            JobPhase::Done => "done",
            JobPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress reported by [`Generator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationUpdate {
    Phase(JobPhase),
    Row { row_index: usize, total_rows: usize },
}

/// Job-wide settings taken from the request form.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub base_url: String,
    pub code_serial: String,
    pub codes_start_number: u32,
    pub design: DesignParameters,
    pub overlay_format: OverlayFormat,
    pub date: String,
}

/// Decoded uploads, loaded once per job.
#[derive(Debug, Clone)]
pub struct JobInputs {
    pub template: RgbaImage,
    pub roster: Roster,
    pub svg_template: Option<String>,
}

impl JobInputs {
    pub fn load(
        template: &[u8],
        roster: &[u8],
        roster_format: RosterFormat,
        svg_template: Option<&[u8]>,
    ) -> Result<Self, GenerationError> {
        let template = image::load_from_memory(template)?.to_rgba8();
        let roster = Roster::from_bytes(roster, roster_format)?;
        let svg_template = match svg_template {
            Some(bytes) => {
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| GenerationError::SvgEncoding)?;
                svg::validate(&text)?;
                Some(text)
            }
            None => None,
        };
        Ok(Self {
            template,
            roster,
            svg_template,
        })
    }
}

/// What a successful run wrote.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub site_dir: Option<PathBuf>,
}

/// File name of the certificate image for `code`.
pub fn certificate_file_name(code: &str) -> String {
    let stem: String = code
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{stem}.png")
}

pub struct Generator<'a> {
    pub painter: &'a dyn TextPainter,
    pub qr_script_url: &'a str,
}

impl Generator<'_> {
    pub fn run(
        &self,
        request: &JobRequest,
        inputs: &JobInputs,
        output_dir: &Path,
        progress: &mut dyn FnMut(GenerationUpdate),
    ) -> Result<JobOutcome, GenerationError> {
        let placement = Placement::from_design(&request.design)?;
        let size = request.design.image_size;
        if inputs.template.dimensions() != (size.width, size.height) {
            warn!(
                "Template is {}x{} but the design was made for {}x{}",
                inputs.template.width(),
                inputs.template.height(),
                size.width,
                size.height
            );
        }

        fs::create_dir_all(output_dir)?;
        progress(GenerationUpdate::Phase(JobPhase::PerRowProcessing));

        let total_rows = inputs.roster.len();
        let mut manifest: Manifest = Vec::with_capacity(total_rows);

        for (index, row) in inputs.roster.rows.iter().enumerate() {
            let name = row.name();
            let fname = normalize_name(name);
            let code = verification_code(
                name,
                &request.code_serial,
                request.codes_start_number,
                index,
            );
            let qr = qr::encode_payload(&format!("{}{}", request.base_url, code))?;

            let holder = request
                .overlay_format
                .render(row, &fname, &request.date)
                .map_err(|source| GenerationError::Format {
                    row: index + 1,
                    name: name.to_string(),
                    source,
                })?;

            let certificate =
                composite_certificate(&inputs.template, &holder, &qr, &placement, self.painter);
            let path = output_dir.join(certificate_file_name(&code));
            write_certificate(&certificate, &path)?;
            debug!("Certificate for {} written to {}", fname, path.display());

            manifest.push(CertificateRecord { code, holder });
            progress(GenerationUpdate::Row {
                row_index: index,
                total_rows,
            });
        }

        let manifest_path = output_dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
        info!("{} certificates written to {}", manifest.len(), output_dir.display());

        let site_dir = match &inputs.svg_template {
            Some(svg_text) => {
                progress(GenerationUpdate::Phase(JobPhase::SiteEmission));
                let holder = manifest.last().map(|r| r.holder.as_str()).unwrap_or_default();
                let annotated = svg::annotate(svg_text, holder, &request.design)?;
                let params = SiteParameters {
                    base_url: &request.base_url,
                    date: &request.date,
                    qr_script_url: self.qr_script_url,
                    annotated: &annotated,
                    design: &request.design,
                    manifest: &manifest,
                };
                let dir = site::emit_site(output_dir, &params)?;
                info!("Verification site written to {}", dir.display());
                Some(dir)
            }
            None => None,
        };

        progress(GenerationUpdate::Phase(JobPhase::Done));
        Ok(JobOutcome {
            manifest,
            manifest_path,
            site_dir,
        })
    }
}
