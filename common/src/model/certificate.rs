use serde::{Deserialize, Serialize};

/// One issued certificate, as published in the `data.json` manifest.
///
/// The verification site looks records up by `code` and shows `holder`, so
/// `holder` must be exactly the text composited onto the certificate image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub code: String,
    pub holder: String,
}

/// Ordered list of records, in roster processing order.
pub type Manifest = Vec<CertificateRecord>;
