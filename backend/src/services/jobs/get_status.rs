use crate::job_controller::state::JobsState;
use actix_web::{web, HttpResponse, Responder};

/// `GET /api/jobs/{job_id}`: the job's current `JobStatus`, or 404.
pub(crate) async fn process(
    job_id: web::Path<String>,
    state: web::Data<JobsState>,
) -> impl Responder {
    match state.status(&job_id.into_inner()).await {
        Some(status) => HttpResponse::Ok().json(status),
        None => HttpResponse::NotFound().body("Job ID not found"),
    }
}

#[cfg(test)]
mod tests {
    use crate::job_controller::state::JobsState;
    use crate::services::jobs::configure_routes;
    use actix_web::{http::StatusCode, test, web, App};
    use common::jobs::JobStatus;

    #[actix_web::test]
    async fn returns_registered_status() {
        let (state, _rx) = JobsState::new(1);
        state.register("abc", JobStatus::Running(25)).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(configure_routes()),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/jobs/abc").to_request();
        let status: JobStatus = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status, JobStatus::Running(25));
    }

    #[actix_web::test]
    async fn unknown_job_is_not_found() {
        let (state, _rx) = JobsState::new(1);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(configure_routes()),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/jobs/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
