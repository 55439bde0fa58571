use serde::{Deserialize, Serialize};

/// Lifecycle of a certificate generation job as seen by API clients.
///
/// Serialized with an explicit `state` tag so that a client polling
/// `/api/jobs/{job_id}` can switch on a single field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    /// Percentage of roster rows processed so far.
    Running(u32),
    Succeeded(JobSummary),
    Failed(String),
}

/// What a finished job produced. Paths are relative to the job directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub certificates: usize,
    pub output_directory: String,
    pub manifest: String,
    pub site_directory: Option<String>,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded(_) | JobStatus::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_state_tag() {
        let json = serde_json::to_value(JobStatus::Running(40)).unwrap();
        assert_eq!(json, serde_json::json!({"state": "running", "detail": 40}));

        let json = serde_json::to_value(JobStatus::Queued).unwrap();
        assert_eq!(json, serde_json::json!({"state": "queued"}));
    }

    #[test]
    fn failed_status_carries_reason() {
        let status = JobStatus::Failed("missing column 'Nope'".to_string());
        let json = serde_json::to_string(&status).unwrap();
        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
        assert!(back.is_finished());
        assert!(!JobStatus::Queued.is_finished());
    }
}
