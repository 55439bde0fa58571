pub(crate) mod generate;

use crate::generator::compositor::TextPainter;
use crate::services::certificates::generate::process;
use actix_web::web;
use std::path::PathBuf;
use std::sync::Arc;

const API_PATH: &str = "/api";

/// Server-wide resources every generation job needs.
#[derive(Clone)]
pub struct GeneratorContext {
    pub work_dir: PathBuf,
    pub painter: Arc<dyn TextPainter>,
    pub qr_script_url: String,
}

pub fn configure_routes() -> actix_web::Scope {
    web::scope(API_PATH).route("/generate-certificates", web::post().to(process))
}
