use serde::{Deserialize, Serialize};

/// Acknowledgement returned by `POST /api/generate-certificates`.
///
/// Generation continues in the background; poll `/api/jobs/{job_id}` for the
/// outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateCertificatesResponse {
    pub message: String,
    pub job_id: String,
}
