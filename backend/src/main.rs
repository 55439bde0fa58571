mod config;
mod generator;
mod job_controller;
mod services;

use crate::config::ServerConfig;
use crate::generator::compositor::FontPainter;
use crate::job_controller::state::{start_job_updater, JobsState};
use crate::job_controller::workspace::jobs_root;
use crate::services::certificates::GeneratorContext;
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{error, info};
use std::io;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = ServerConfig::load().map_err(|e| {
        error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let painter = FontPainter::load(&config.font_path).map_err(|e| {
        error!("Could not load font {}: {}", config.font_path.display(), e);
        io::Error::new(io::ErrorKind::InvalidData, e.to_string())
    })?;

    let jobs_dir = jobs_root(&config.work_dir);
    std::fs::create_dir_all(&jobs_dir)?;

    let (jobs_state, rx) = JobsState::new(config.job_channel_capacity);
    let updater_state = jobs_state.clone();
    let retained_jobs = config.retained_jobs;
    tokio::spawn(async move {
        start_job_updater(updater_state, rx, retained_jobs).await;
    });

    let context = GeneratorContext {
        work_dir: config.work_dir.clone(),
        painter: Arc::new(painter),
        qr_script_url: config.qr_script_url.clone(),
    };

    let (host, port) = config.bind_address();
    info!("Server running at http://{}:{}", host, port);
    info!("Job outputs under {}", jobs_dir.display());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(jobs_state.clone()))
            .app_data(web::Data::new(context.clone()))
            .service(services::certificates::configure_routes())
            .service(services::jobs::configure_routes())
            .service(services::jobs::job_outputs(&jobs_dir))
    })
    .bind((host, port))?
    .run()
    .await
}
