//! Types shared between the certificate backend and anything that talks to it.
//!
//! Everything here is plain serde data: the design parameters sent by the
//! designer UI, the manifest records written next to the certificates, the
//! status of background generation jobs, and the request/response payloads of
//! the HTTP API.

pub mod jobs;
pub mod model;
pub mod requests;
