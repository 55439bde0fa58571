//! Certificate generation pipeline.

pub mod codes;
pub mod compositor;
pub mod job;
pub mod qr;
pub mod roster;
pub mod site;
pub mod svg;
pub mod text;
