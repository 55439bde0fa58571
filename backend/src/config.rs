//! Server configuration.
//!
//! Values are layered: built-in defaults, then `certgen.toml` in the working
//! directory if present, then `CERTGEN_*` environment variables.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8000
//! work_dir = "/var/lib/certgen"
//! font_path = "static/fonts/baskervi.ttf"
//! ```

use confique::Config;
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "certgen.toml";

#[derive(Debug, Config)]
pub struct ServerConfig {
    #[config(env = "CERTGEN_HOST", default = "127.0.0.1")]
    pub host: String,

    #[config(env = "CERTGEN_PORT", default = 8000)]
    pub port: u16,

    /// Root for per-job uploads and outputs.
    #[config(env = "CERTGEN_WORK_DIR", default = "work")]
    pub work_dir: PathBuf,

    /// TrueType/OpenType font used for the overlay text.
    #[config(env = "CERTGEN_FONT", default = "static/fonts/baskervi.ttf")]
    pub font_path: PathBuf,

    /// QR library loaded by the verification site.
    #[config(
        env = "CERTGEN_QR_SCRIPT",
        default = "https://cdn.jsdelivr.net/npm/qrcodejs@1.0.0/qrcode.min.js"
    )]
    pub qr_script_url: String,

    #[config(env = "CERTGEN_JOB_CHANNEL", default = 100)]
    pub job_channel_capacity: usize,

    /// Finished job statuses kept for `GET /api/jobs/{job_id}`; older ones
    /// are forgotten. Output files are not touched.
    #[config(env = "CERTGEN_RETAINED_JOBS", default = 1000)]
    pub retained_jobs: usize,
}

impl ServerConfig {
    pub fn load() -> Result<Self, confique::Error> {
        Self::builder().env().file(CONFIG_FILE).load()
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "port = 9100\nwork_dir = \"/srv/certgen\"\n").unwrap();

        let config = ServerConfig::builder().file(&path).load().unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.work_dir, PathBuf::from("/srv/certgen"));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.job_channel_capacity, 100);
        assert_eq!(config.retained_jobs, 1000);
        assert!(config.qr_script_url.ends_with("qrcode.min.js"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::builder()
            .file(dir.path().join("absent.toml"))
            .load()
            .unwrap();

        assert_eq!(config.bind_address(), ("127.0.0.1".to_string(), 8000));
        assert_eq!(config.font_path, PathBuf::from("static/fonts/baskervi.ttf"));
    }
}
