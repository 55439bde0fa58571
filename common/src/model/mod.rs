pub mod certificate;
pub mod design;
