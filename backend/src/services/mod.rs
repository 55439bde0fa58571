pub mod certificates;
pub mod jobs;
