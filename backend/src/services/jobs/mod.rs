mod get_status;

use crate::job_controller::workspace::is_public_path;
use crate::services::jobs::get_status::process;
use actix_files::Files;
use actix_web::web;
use std::path::Path;

const API_PATH: &str = "/api/jobs";
const OUTPUTS_PATH: &str = "/jobs";

pub fn configure_routes() -> actix_web::Scope {
    web::scope(API_PATH).route("/{job_id}", web::get().to(process))
}

/// Static serving of job outputs under `/jobs/<job_id>/...`, so generated
/// sites can be previewed. Uploads are filtered out and directories are not
/// listed.
pub fn job_outputs(jobs_dir: &Path) -> Files {
    Files::new(OUTPUTS_PATH, jobs_dir)
        .index_file("index.html")
        .path_filter(|path, _| is_public_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use std::fs;

    #[actix_web::test]
    async fn serves_outputs_but_not_uploads() {
        let jobs = tempfile::tempdir().unwrap();
        fs::create_dir_all(jobs.path().join("abc/uploads")).unwrap();
        fs::create_dir_all(jobs.path().join("abc/certs")).unwrap();
        fs::write(jobs.path().join("abc/uploads/roster.csv"), "Name\nSam\n").unwrap();
        fs::write(jobs.path().join("abc/certs/data.json"), "[]").unwrap();

        let app = test::init_service(App::new().service(job_outputs(jobs.path()))).await;

        let req = test::TestRequest::get().uri("/jobs/abc/certs/data.json").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/jobs/abc/uploads/roster.csv").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(!resp.status().is_success());

        let req = test::TestRequest::get().uri("/jobs/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(!resp.status().is_success());
    }
}
