//! # Certificate Generation Service
//!
//! `POST /api/generate-certificates` accepts a multipart form and starts a
//! background job that writes one certificate per roster row.
//!
//! ## Workflow
//!
//! 1.  **Form**: `read_form` drains the multipart stream into text fields and
//!     the `template`, `excel` and optional `svg_template` files.
//!
//! 2.  **Validation**: `job_request` checks every field. Anything wrong is a
//!     400 and no job is created.
//!
//! 3.  **Workspace and loading**: a job id is drawn, the uploads are saved
//!     under the job directory and decoded on the blocking pool. A file that
//!     does not decode is still a 400; the job directory is removed again.
//!
//! 4.  **Background run**: the job is registered as `Queued` and the id is
//!     returned. A spawned task runs [`Generator::run`] on the blocking pool
//!     and relays its progress to the job controller as `Running(percent)`,
//!     then records `Succeeded` or `Failed`.

use crate::generator::compositor::Placement;
use crate::generator::job::{
    GenerationError, GenerationUpdate, Generator, JobInputs, JobOutcome, JobPhase, JobRequest,
};
use crate::generator::roster::RosterFormat;
use crate::generator::text::OverlayFormat;
use crate::job_controller::state::{JobUpdate, JobsState};
use crate::job_controller::workspace::{relative_output_dir, JobWorkspace, WorkspaceError};
use crate::services::certificates::GeneratorContext;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use common::jobs::{JobStatus, JobSummary};
use common::model::design::DesignParameters;
use common::requests::GenerateCertificatesResponse;
use futures_util::StreamExt;
use log::{error, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

const TEMPLATE_FIELD: &str = "template";
const ROSTER_FIELD: &str = "excel";
const SVG_FIELD: &str = "svg_template";
const FILE_FIELDS: [&str; 3] = [TEMPLATE_FIELD, ROSTER_FIELD, SVG_FIELD];

const PROGRESS_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Multipart error: {0}")]
    Multipart(#[from] actix_multipart::MultipartError),
    #[error("Missing field '{0}'")]
    MissingField(&'static str),
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Load(#[from] GenerationError),
    #[error("Loading task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl UploadError {
    fn invalid(field: &str, reason: impl ToString) -> Self {
        UploadError::InvalidField {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Failures caused by the server rather than by the submitted form.
    fn is_internal(&self) -> bool {
        matches!(
            self,
            UploadError::Workspace(WorkspaceError::Io(_)) | UploadError::Join(_)
        )
    }
}

struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

impl UploadedFile {
    fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl UploadForm {
    fn text(&self, name: &'static str) -> Result<&str, UploadError> {
        self.fields
            .get(name)
            .map(|v| v.as_str())
            .ok_or(UploadError::MissingField(name))
    }

    fn optional_text(&self, name: &str) -> &str {
        self.fields.get(name).map(|v| v.as_str()).unwrap_or_default()
    }

    fn take_file(&mut self, name: &'static str) -> Result<UploadedFile, UploadError> {
        self.files.remove(name).ok_or(UploadError::MissingField(name))
    }
}

/// The actix handler for `POST /api/generate-certificates`.
pub(crate) async fn process(
    state: web::Data<JobsState>,
    context: web::Data<GeneratorContext>,
    payload: Multipart,
) -> impl Responder {
    match schedule_generation_job(state, context, payload).await {
        Ok(job_id) => HttpResponse::Ok().json(GenerateCertificatesResponse {
            message: "Certificate generation started".to_string(),
            job_id,
        }),
        Err(e) if e.is_internal() => {
            error!("Could not start certificate job: {}", e);
            HttpResponse::InternalServerError().body(format!("Error: {}", e))
        }
        Err(e) => HttpResponse::BadRequest().body(format!("Error: {}", e)),
    }
}

async fn read_form(mut payload: Multipart) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename().map(|f| f.to_string()));

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        let Some(name) = name else { continue };
        if FILE_FIELDS.contains(&name.as_str()) {
            // Browsers send an empty part for an unselected file input.
            if !bytes.is_empty() {
                let filename = filename.unwrap_or_default();
                form.files.insert(name, UploadedFile { filename, bytes });
            }
        } else {
            let value = String::from_utf8(bytes)
                .map_err(|_| UploadError::invalid(&name, "not valid UTF-8"))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// Validates the text fields and builds the job settings plus the output
/// directory relative to the job directory.
fn job_request(form: &UploadForm) -> Result<(JobRequest, PathBuf), UploadError> {
    let base_url = form.text("base_url")?.trim();
    if base_url.is_empty() {
        return Err(UploadError::invalid("base_url", "must not be empty"));
    }

    let output_dir = relative_output_dir(form.text("output_directory")?)?;
    let code_serial = form.text("code_serial")?.trim().to_string();

    let codes_start_number = form
        .text("codes_start_number")?
        .trim()
        .parse::<u32>()
        .map_err(|e| UploadError::invalid("codes_start_number", e))?;

    let design: DesignParameters = serde_json::from_str(form.text("design_data")?)
        .map_err(|e| UploadError::invalid("design_data", e))?;
    if design.image_size.width == 0 || design.image_size.height == 0 {
        return Err(UploadError::invalid("design_data", "image size must be non-zero"));
    }
    Placement::from_design(&design).map_err(|e| UploadError::invalid("design_data", e))?;

    let overlay_format = OverlayFormat::parse(form.optional_text("overlay_format"))
        .map_err(|e| UploadError::invalid("overlay_format", e))?;

    let request = JobRequest {
        base_url: base_url.to_string(),
        code_serial,
        codes_start_number,
        design,
        overlay_format,
        date: form.optional_text("date").trim().to_string(),
    };
    Ok((request, output_dir))
}

async fn schedule_generation_job(
    state: web::Data<JobsState>,
    context: web::Data<GeneratorContext>,
    payload: Multipart,
) -> Result<String, UploadError> {
    let mut form = read_form(payload).await?;
    let (request, output_rel) = job_request(&form)?;
    let template = form.take_file(TEMPLATE_FIELD)?;
    let roster = form.take_file(ROSTER_FIELD)?;
    let svg = form.files.remove(SVG_FIELD);
    let roster_format =
        RosterFormat::from_filename(&roster.filename).map_err(GenerationError::from)?;

    let job_id = Uuid::new_v4().to_string();
    info!("Job {}: {}", job_id, JobPhase::ReceivingInputs);
    let workspace = JobWorkspace::create(&context.work_dir, &job_id)?;
    let persisted = persist_uploads(&workspace, &template, &roster, roster_format, svg.as_ref());

    info!("Job {}: {}", job_id, JobPhase::Loading);
    let loaded = match persisted {
        Ok(()) => tokio::task::spawn_blocking(move || {
            JobInputs::load(
                &template.bytes,
                &roster.bytes,
                roster_format,
                svg.as_ref().map(|f| f.bytes.as_slice()),
            )
        })
        .await
        .map_err(UploadError::from)
        .and_then(|r| r.map_err(UploadError::from)),
        Err(e) => Err(e),
    };

    let inputs = match loaded {
        Ok(inputs) => inputs,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(workspace.root()) {
                warn!("Could not remove {}: {}", workspace.root().display(), cleanup);
            }
            return Err(e);
        }
    };

    state.register(&job_id, JobStatus::Queued).await;
    info!(
        "Job {} queued: {} rows into {}",
        job_id,
        inputs.roster.len(),
        output_rel.display()
    );

    let output_dir = workspace.output_dir(&output_rel);
    spawn_generation(&state, &context, job_id.clone(), workspace, output_dir, request, inputs);
    Ok(job_id)
}

fn persist_uploads(
    workspace: &JobWorkspace,
    template: &UploadedFile,
    roster: &UploadedFile,
    roster_format: RosterFormat,
    svg: Option<&UploadedFile>,
) -> Result<(), UploadError> {
    let template_ext = template.extension().unwrap_or_else(|| "png".to_string());
    workspace.persist_upload("template", &template_ext, &template.bytes)?;
    let roster_ext = roster
        .extension()
        .unwrap_or_else(|| roster_format.extension().to_string());
    workspace.persist_upload("roster", &roster_ext, &roster.bytes)?;
    if let Some(svg) = svg {
        workspace.persist_upload("design", "svg", &svg.bytes)?;
    }
    Ok(())
}

fn progress_percent(row_index: usize, total_rows: usize) -> u32 {
    if total_rows > 0 {
        ((row_index + 1) as f32 / total_rows as f32 * 100.0) as u32
    } else {
        0
    }
}

fn summarize(workspace: &JobWorkspace, output_dir: &Path, outcome: &JobOutcome) -> JobSummary {
    JobSummary {
        certificates: outcome.manifest.len(),
        output_directory: workspace.display_relative(output_dir),
        manifest: workspace.display_relative(&outcome.manifest_path),
        site_directory: outcome.site_dir.as_deref().map(|d| workspace.display_relative(d)),
    }
}

fn spawn_generation(
    state: &JobsState,
    context: &GeneratorContext,
    job_id: String,
    workspace: JobWorkspace,
    output_dir: PathBuf,
    request: JobRequest,
    inputs: JobInputs,
) {
    let tx = state.tx.clone();
    let painter = context.painter.clone();
    let qr_script_url = context.qr_script_url.clone();

    tokio::spawn(async move {
        let (progress_tx, mut progress_rx) =
            mpsc::channel::<GenerationUpdate>(PROGRESS_CHANNEL_CAPACITY);

        // Translates generator progress into job controller updates.
        let updater_tx = tx.clone();
        let listener_job_id = job_id.clone();
        let listener = tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                let status = match update {
                    GenerationUpdate::Phase(phase) => {
                        info!("Job {}: {}", listener_job_id, phase);
                        if phase != JobPhase::PerRowProcessing {
                            continue;
                        }
                        JobStatus::Running(0)
                    }
                    GenerationUpdate::Row {
                        row_index,
                        total_rows,
                    } => JobStatus::Running(progress_percent(row_index, total_rows)),
                };
                let _ = updater_tx
                    .send(JobUpdate {
                        job_id: listener_job_id.clone(),
                        status,
                    })
                    .await;
            }
        });

        let handle = tokio::task::spawn_blocking(move || {
            let generator = Generator {
                painter: painter.as_ref(),
                qr_script_url: &qr_script_url,
            };
            let outcome = generator.run(&request, &inputs, &output_dir, &mut |update| {
                let _ = progress_tx.blocking_send(update);
            })?;
            Ok::<_, GenerationError>(summarize(&workspace, &output_dir, &outcome))
        });

        let status = match handle.await {
            Ok(Ok(summary)) => {
                info!("Job {} finished: {} certificates", job_id, summary.certificates);
                JobStatus::Succeeded(summary)
            }
            Ok(Err(e)) => {
                error!("Job {} {}: {}", job_id, JobPhase::Failed, e);
                JobStatus::Failed(e.to_string())
            }
            Err(e) => {
                error!("Job {} {}: task join error: {}", job_id, JobPhase::Failed, e);
                JobStatus::Failed(format!("Task join error: {}", e))
            }
        };

        // Progress must land before the final status.
        let _ = listener.await;
        let _ = tx.send(JobUpdate { job_id, status }).await;
    });
}
